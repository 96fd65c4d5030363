//! Reply sanitization for spoken and on-screen delivery.
//!
//! Model output tends to carry markdown (`**bold**`, `# headings`,
//! `` `code` ``, `[links](url)`) and emoji. None of it reads well on a
//! terminal that paces words, and the speech engine would either spell the
//! symbols out or choke on them. [`sanitize`] reduces a reply to words,
//! whitespace and a handful of punctuation marks.
//!
//! The output only ever contains allow-listed characters separated by
//! single spaces, so running it twice changes nothing.

/// Punctuation kept by the sanitizer in addition to letters, digits and spaces.
pub const ALLOWED_PUNCTUATION: &[char] = &[',', '.', '!', '?', '-', '\''];

/// Strip markup and disallowed characters from `text`.
///
/// # Examples
///
/// ```
/// use saiyaara::sanitize::sanitize;
///
/// assert_eq!(sanitize("## **Hi** there"), "Hi there");
/// assert_eq!(sanitize("see [the docs](https://x.y/z)"), "see the docs");
/// ```
pub fn sanitize(text: &str) -> String {
    let unmarked = strip_markers(text);
    let unlinked = replace_links(&unmarked);
    let allowed: String = unlinked.chars().filter(|c| is_allowed(*c)).collect();
    join_words(&allowed)
}

/// Marks that close a sentence or clause and never start a word.
const CLOSING_PUNCTUATION: &[char] = &[',', '.', '!', '?'];

/// Join words with single spaces, attaching a run of closing punctuation
/// to the word before it (`"time !"` becomes `"time!"`).
fn join_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        let closing = word.chars().all(|c| CLOSING_PUNCTUATION.contains(&c));
        if !out.is_empty() && !closing {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Whether `c` survives sanitization.
pub fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(&c)
}

/// Remove emphasis (`*`, `_`), inline code (`` ` ``) and heading markers.
///
/// A run of `#` swallows the whitespace that follows it so `"## Title"`
/// becomes `"Title"` rather than `" Title"`.
fn strip_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut after_heading = false;
    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' => {}
            '#' => after_heading = true,
            c if after_heading && c.is_whitespace() => {}
            c => {
                after_heading = false;
                out.push(c);
            }
        }
    }
    out
}

/// Replace `[label](target)` with `label`.
///
/// Brackets that do not form a complete link are left for the allow-list
/// filter to drop.
fn replace_links(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '['
            && let Some((label_end, link_end)) = match_link(&chars, i)
        {
            out.extend(&chars[i + 1..label_end]);
            i = link_end + 1;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Match a link starting at `open` (a `[`).
///
/// Returns the index of the closing `]` and of the closing `)`.
fn match_link(chars: &[char], open: usize) -> Option<(usize, usize)> {
    let label_end = chars[open + 1..].iter().position(|c| *c == ']')? + open + 1;
    if label_end == open + 1 {
        return None;
    }
    if chars.get(label_end + 1) != Some(&'(') {
        return None;
    }
    let target_start = label_end + 2;
    let target_len = chars.get(target_start..)?.iter().position(|c| *c == ')')?;
    if target_len == 0 {
        return None;
    }
    Some((label_end, target_start + target_len))
}
