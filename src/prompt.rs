//! Prompt construction: persona, remembered facts, and the message list
//! sent with every generation request.

use std::path::Path;

use serde::Deserialize;

use crate::config::PersonaConfig;
use crate::history::HistoryWindow;
use crate::llm::types::Message;

/// Header introducing remembered facts in the system prompt.
pub const FACTS_HEADER: &str = "THINGS YOU KNOW ABOUT THE USER (long-term memory):";

fn persona_prompt(name: &str) -> String {
    format!(
        "You are {name}, a friendly companion who chats with the user.\n\
         \n\
         PERSONALITY:\n\
         - Talk like a supportive, caring friend.\n\
         - Be warm, casual and conversational; show empathy.\n\
         - Use natural language, never robotic phrasing.\n\
         - Do not describe yourself as an AI or a language model.\n\
         - Address the user as \"sir\" most of the time and by name now and then, \
         but not in every reply.\n\
         \n\
         RULES:\n\
         - Keep replies concise and natural, usually 2 to 4 sentences.\n\
         - Be helpful without being formal.\n\
         - Your replies are read aloud, so avoid markdown, lists and emoji.\n\
         - If the user asks you to remember something, confirm it warmly."
    )
}

/// The assistant's persona plus what it remembers about the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    name: String,
    addendum: String,
    facts: Vec<String>,
}

impl Persona {
    /// Create a persona.
    pub fn new(name: impl Into<String>, addendum: impl Into<String>, facts: Vec<String>) -> Self {
        Self {
            name: name.into(),
            addendum: addendum.into(),
            facts,
        }
    }

    /// Build a persona from config, loading facts from `facts_file` if set.
    pub fn from_config(config: &PersonaConfig) -> Self {
        let facts = config
            .facts_file
            .as_deref()
            .map(load_facts)
            .unwrap_or_default();
        Self::new(config.assistant_name.clone(), config.system_prompt.clone(), facts)
    }

    /// Name the assistant answers to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remembered facts, in file order.
    pub fn facts(&self) -> &[String] {
        &self.facts
    }

    /// Full system prompt text.
    pub fn system_prompt(&self) -> String {
        let mut prompt = persona_prompt(&self.name);
        let addendum = self.addendum.trim();
        if !addendum.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(addendum);
        }
        if !self.facts.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(FACTS_HEADER);
            for fact in &self.facts {
                prompt.push_str("\n- ");
                prompt.push_str(fact);
            }
        }
        prompt
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::new("Saiyaara", "", Vec::new())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FactsFile {
    #[serde(default)]
    facts: Vec<String>,
}

/// Read facts from a `{"facts": [...]}` JSON file.
///
/// A missing or malformed file yields no facts; memory is best-effort.
pub fn load_facts(path: &Path) -> Vec<String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read facts file");
            return Vec::new();
        }
    };
    match serde_json::from_str::<FactsFile>(&raw) {
        Ok(file) => file
            .facts
            .into_iter()
            .map(|f| f.trim().to_owned())
            .filter(|f| !f.is_empty())
            .collect(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed facts file");
            Vec::new()
        }
    }
}

/// Build the request messages: the system prompt followed by the history.
pub fn build_messages(persona: &Persona, history: &HistoryWindow) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(persona.system_prompt()));
    messages.extend(history.iter().map(Message::from));
    messages
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::history::Turn;
    use crate::llm::types::MessageRole;

    #[test]
    fn system_prompt_names_the_assistant() {
        let prompt = Persona::default().system_prompt();
        assert!(prompt.starts_with("You are Saiyaara"));
        assert!(!prompt.contains(FACTS_HEADER));
    }

    #[test]
    fn facts_and_addendum_are_appended() {
        let persona = Persona::new(
            "Nova",
            "  Speak softly.  ",
            vec!["User's name is Arun".into(), "Likes tea".into()],
        );
        let prompt = persona.system_prompt();
        assert!(prompt.contains("You are Nova"));
        assert!(prompt.contains("\n\nSpeak softly."));
        assert!(prompt.ends_with(&format!("{FACTS_HEADER}\n- User's name is Arun\n- Likes tea")));
    }

    #[test]
    fn messages_start_with_system_then_history_in_order() {
        let mut history = HistoryWindow::new(5);
        history.push(Turn::user("Hello"));
        history.push(Turn::assistant("Hi there"));
        history.push(Turn::user("How are you?"));

        let messages = build_messages(&Persona::default(), &history);
        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(messages[3].content, "How are you?");
    }

    #[test]
    fn load_facts_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, r#"{"facts": ["Likes chess", "  ", "Lives in Pune"]}"#).unwrap();
        assert_eq!(load_facts(&path), vec!["Likes chess", "Lives in Pune"]);
    }

    #[test]
    fn load_facts_tolerates_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_facts(&dir.path().join("absent.json")).is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "not json").unwrap();
        assert!(load_facts(&bad).is_empty());
    }

    #[test]
    fn from_config_without_facts_file() {
        let config = PersonaConfig {
            facts_file: None,
            ..PersonaConfig::default()
        };
        let persona = Persona::from_config(&config);
        assert_eq!(persona.name(), "Saiyaara");
        assert!(persona.facts().is_empty());
    }
}
