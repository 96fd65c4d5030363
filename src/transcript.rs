//! Transcript archival.
//!
//! Each finished session is written as one JSON document:
//!
//! ```json
//! {
//!   "title": "Chess Openings",
//!   "date": "2026-10-16 18:42",
//!   "messages": [{"me": "Hello", "saiyaara": "Hi there"}]
//! }
//! ```
//!
//! The file name is derived from keywords in the first few user turns plus
//! a timestamp.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpeechError};
use crate::history::{Role, Turn};

/// Receives the history of a session when it ends.
pub trait TranscriptSink: Send + Sync {
    /// Persist `turns`. Returns where they went, if anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Transcript`] or an I/O error if the transcript
    /// cannot be written.
    fn archive(&self, turns: &[Turn]) -> Result<Option<PathBuf>>;
}

/// One user/assistant exchange in a stored transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// What the user said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<String>,
    /// What the assistant replied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saiyaara: Option<String>,
}

/// A stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Human-readable title.
    pub title: String,
    /// Local time the session ended, `YYYY-MM-DD HH:MM`.
    pub date: String,
    /// Exchanges in conversation order.
    pub messages: Vec<Exchange>,
}

impl Transcript {
    /// Build a transcript from turns, pairing each user turn with the
    /// assistant turn that follows it.
    pub fn from_turns(turns: &[Turn], now: DateTime<Local>) -> Self {
        let mut messages = Vec::new();
        let mut iter = turns.iter().peekable();
        while let Some(turn) = iter.next() {
            let mut exchange = Exchange::default();
            match turn.role() {
                Role::User => {
                    exchange.me = Some(turn.text().to_owned());
                    if let Some(next) = iter.next_if(|t| t.role() == Role::Assistant) {
                        exchange.saiyaara = Some(next.text().to_owned());
                    }
                }
                Role::Assistant => exchange.saiyaara = Some(turn.text().to_owned()),
            }
            messages.push(exchange);
        }

        let slug = keyword_slug(turns);
        let title = match &slug {
            Some(slug) => slug
                .split('-')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(" "),
            None => format!("Chat {}", now.format("%Y-%m-%d %H:%M")),
        };
        Self {
            title,
            date: now.format("%Y-%m-%d %H:%M").to_string(),
            messages,
        }
    }

    /// Turns back in conversation order.
    pub fn to_turns(&self) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(self.messages.len() * 2);
        for exchange in &self.messages {
            if let Some(me) = &exchange.me {
                turns.push(Turn::user(me.clone()));
            }
            if let Some(reply) = &exchange.saiyaara {
                turns.push(Turn::assistant(reply.clone()));
            }
        }
        turns
    }
}

const STOPWORDS: &[&str] = &[
    "the", "are", "was", "were", "been", "being", "have", "has", "had", "does", "did", "will",
    "would", "could", "should", "can", "may", "might", "shall", "must", "and", "but", "for",
    "with", "from", "about", "into", "through", "what", "how", "why", "when", "where", "who",
    "which", "that", "this", "these", "those", "there", "here", "not", "yes", "just", "like",
    "also", "then", "than", "more", "some", "any", "hey", "hello", "okay", "please", "thanks",
    "thank", "tell", "know", "think", "want", "need", "get", "got", "going", "you", "your",
    "they", "them", "she", "saiyaara", "user",
];

/// Up to three most frequent keywords from the first three user turns,
/// joined with `-`. Ties break alphabetically.
fn keyword_slug(turns: &[Turn]) -> Option<String> {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for turn in turns
        .iter()
        .take(6)
        .filter(|t| t.role() == Role::User)
        .take(3)
    {
        for word in turn
            .text()
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| w.len() >= 3)
        {
            let word = word.to_ascii_lowercase();
            if !stopwords.contains(word.as_str()) {
                *counts.entry(word).or_default() += 1;
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top: Vec<String> = ranked.into_iter().take(3).map(|(w, _)| w).collect();
    (!top.is_empty()).then(|| top.join("-"))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Summary of a stored transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// File holding the transcript.
    pub path: PathBuf,
    /// Stored title.
    pub title: String,
    /// Stored date.
    pub date: String,
}

/// Writes transcripts as pretty-printed JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonTranscriptStore {
    dir: PathBuf,
}

impl JsonTranscriptStore {
    /// Create a store rooted at `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding transcripts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `turns` using `now` for the title fallback, date and file name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn archive_at(&self, turns: &[Turn], now: DateTime<Local>) -> Result<Option<PathBuf>> {
        if turns.is_empty() {
            return Ok(None);
        }
        let transcript = Transcript::from_turns(turns, now);
        let stamp = now.format("%Y-%m-%d_%H-%M");
        let stem = match keyword_slug(turns) {
            Some(slug) => format!("{slug}_{stamp}"),
            None => format!("chat_{stamp}"),
        };

        std::fs::create_dir_all(&self.dir)?;
        let path = unique_path(&self.dir, &stem);
        let json = serde_json::to_string_pretty(&transcript)
            .map_err(|e| SpeechError::Transcript(format!("cannot encode transcript: {e}")))?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.display(), exchanges = transcript.messages.len(), "transcript saved");
        Ok(Some(path))
    }

    /// Most recent transcripts, newest first.
    ///
    /// Unreadable files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn recent(&self, limit: usize) -> Result<Vec<TranscriptEntry>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut found = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load(&path) {
                Ok(transcript) => found.push(TranscriptEntry {
                    path,
                    title: transcript.title,
                    date: transcript.date,
                }),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "skipping transcript"),
            }
        }
        found.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.path.cmp(&a.path)));
        found.truncate(limit);
        Ok(found)
    }

    /// Read one transcript.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Transcript> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            SpeechError::Transcript(format!("cannot parse {}: {e}", path.display()))
        })
    }
}

impl TranscriptSink for JsonTranscriptStore {
    fn archive(&self, turns: &[Turn]) -> Result<Option<PathBuf>> {
        self.archive_at(turns, Local::now())
    }
}

/// `dir/stem.json`, or `dir/stem-N.json` if that already exists.
fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.json"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| dir.join(format!("{stem}-{n}.json")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}
