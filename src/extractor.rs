//! Professor extraction: one completion per chunk, filtered down to
//! `Name, Email` lines with an academic address.
use serde::Serialize;

use crate::llm::{Completion, CompletionOptions, LlmError};

pub const EXTRACTION_SYSTEM: &str = "Extract a list of professor names and emails. \
    If there are no professors listed, don't respond with anything. \
    Respond ONLY with lines in the format: Full Name, Email Address. \
    If there are no professors listed, don't respond with anything. \
    Do not explain or add any extra text. \
    If there are no professors listed, don't respond with anything.";

const EXTRACTION_PROMPT_TEMPLATE: &str = "From the following text, extract names and emails \
    for all Professors, Associate Professors, or Assistant Professors. \
    If there are no professors listed, don't respond with anything.\n\n{chunk}";

const EXTRACTION_OPTIONS: CompletionOptions = CompletionOptions {
    max_tokens: 512,
    temperature: 0.0,
};

/// A faculty member found on a directory page. Only constructible with an
/// academic (`edu`) email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfessorEntry {
    name: String,
    email: String,
}

impl ProfessorEntry {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Option<Self> {
        let email = email.into();
        if !email.contains("edu") {
            return None;
        }
        Some(Self {
            name: name.into(),
            email,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Runs the extraction prompt over one chunk.
pub async fn extract_entries(
    llm: &dyn Completion,
    chunk: &str,
) -> Result<Vec<ProfessorEntry>, LlmError> {
    let prompt = EXTRACTION_PROMPT_TEMPLATE.replace("{chunk}", chunk);
    let answer = llm
        .complete(EXTRACTION_SYSTEM, &prompt, EXTRACTION_OPTIONS)
        .await?;
    Ok(parse_entries(&answer))
}

/// Keeps lines shaped like `Name, email` whose email part mentions `edu`.
/// The name/email split happens at the first comma.
pub fn parse_entries(text: &str) -> Vec<ProfessorEntry> {
    text.lines()
        .filter_map(|line| line.split_once(','))
        .filter_map(|(name, email)| ProfessorEntry::new(name.trim(), email.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct ScriptedLlm {
        answer: Result<String, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Ok(answer.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                answer: Err(status),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Completion for ScriptedLlm {
        async fn complete(
            &self,
            system: &str,
            user: &str,
            options: CompletionOptions,
        ) -> Result<String, LlmError> {
            assert_eq!(system, EXTRACTION_SYSTEM);
            assert_eq!(options.max_tokens, 512);
            self.prompts.lock().unwrap().push(user.to_string());
            match &self.answer {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(LlmError::Api {
                    status: *status,
                    message: "model overloaded".into(),
                }),
            }
        }
    }

    #[test]
    fn keeps_only_edu_addresses() {
        let entries = parse_entries("Jane Doe, jane@uni.edu\nBob, bob@gmail.com");
        assert_eq!(entries, vec![ProfessorEntry::new("Jane Doe", "jane@uni.edu").unwrap()]);
    }

    #[test]
    fn drops_lines_without_comma() {
        let text = "Here are the professors:\n\nJane Doe jane@uni.edu\nAmy Lin, amy.lin@tufts.edu";
        let entries = parse_entries(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), "Amy Lin");
        assert_eq!(entries[0].email(), "amy.lin@tufts.edu");
    }

    #[test]
    fn trims_and_splits_on_first_comma() {
        let entries = parse_entries("   Doe, Jane ,  jane.doe@cs.uni.edu  ");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), "Doe");
        assert_eq!(entries[0].email(), "Jane ,  jane.doe@cs.uni.edu");
    }

    #[test]
    fn empty_answer_yields_nothing() {
        assert!(parse_entries("").is_empty());
        assert!(parse_entries("\n\n").is_empty());
    }

    #[test]
    fn entry_requires_edu() {
        assert!(ProfessorEntry::new("Bob", "bob@example.com").is_none());
        assert!(ProfessorEntry::new("Kai", "kai@ox.ac.uk").is_none());
        assert!(ProfessorEntry::new("Ana", "ana@mit.edu").is_some());
    }

    #[tokio::test]
    async fn extract_sends_chunk_and_parses_answer() {
        let llm = ScriptedLlm::answering("Dr. Amy Lin, amy.lin@tufts.edu\nnot a professor");
        let entries = extract_entries(&llm, "Amy Lin, Assistant Professor of CS").await.unwrap();
        assert_eq!(entries, vec![ProfessorEntry::new("Dr. Amy Lin", "amy.lin@tufts.edu").unwrap()]);

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("Amy Lin, Assistant Professor of CS"));
        assert!(prompts[0].contains("Associate Professors"));
    }

    #[tokio::test]
    async fn extract_surfaces_completion_failure() {
        let llm = ScriptedLlm::failing(503);
        let err = extract_entries(&llm, "chunk").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
    }
}
