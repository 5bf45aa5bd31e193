use candid::{CandidType, Principal};
use ic_llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MentorConfig;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ModelError {
    #[error("LLM canister rejected the call ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("malformed completion: {0}")]
    Malformed(String),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionMessage {
    pub content: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Choice {
    pub message: CompletionMessage,
}

/// Single-shot completion in the `choices[].message.content` shape.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub choices: Vec<Choice>,
}

impl Completion {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: CompletionMessage {
                    content: Some(text.into()),
                },
            }],
        }
    }

    /// Text of the first choice, if it carries anything but whitespace.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

/// A generative text model taking one prompt and returning one completion.
#[allow(async_fn_in_trait)]
pub trait CompletionModel {
    async fn complete(&self, prompt: &str) -> Result<Completion, ModelError>;
}

#[derive(CandidType)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

/// Calls the LLM canister once, no retries.
#[derive(Clone, Debug)]
pub struct LlmCanister {
    canister: Principal,
    model: String,
}

impl LlmCanister {
    pub fn from_config(config: &MentorConfig) -> Self {
        Self {
            canister: config.llm_canister,
            model: config.model.clone(),
        }
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: prompt.to_string(),
            }],
        }
    }
}

impl CompletionModel for LlmCanister {
    async fn complete(&self, prompt: &str) -> Result<Completion, ModelError> {
        let (text,): (String,) = ic_cdk::call(self.canister, "v0_chat", (self.request(prompt),))
            .await
            .map_err(|(code, message)| ModelError::Rejected {
                code: format!("{code:?}"),
                message,
            })?;
        Ok(Completion::from_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_content_should_skip_blank_text() {
        assert_eq!(Completion::default().first_content(), None);
        assert_eq!(Completion::from_text("   ").first_content(), None);
        let missing = Completion {
            choices: vec![Choice::default()],
        };
        assert_eq!(missing.first_content(), None);
        assert_eq!(
            Completion::from_text("Learn Rust.").first_content(),
            Some("Learn Rust.")
        );
    }

    #[test]
    fn completion_should_parse_chat_shape() {
        let completion: Completion = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"a"}},{"message":{"content":"b"}}]}"#,
        )
        .unwrap();
        assert_eq!(completion.first_content(), Some("a"));
    }

    #[test]
    fn request_should_carry_prompt_as_single_user_message() {
        let llm = LlmCanister::from_config(&MentorConfig::new(Principal::from_slice(&[1])));
        let request = llm.request("hello");
        assert_eq!(request.model, crate::config::default_model());
        assert_eq!(request.messages.len(), 1);
        assert!(matches!(request.messages[0].role, Role::User));
        assert_eq!(request.messages[0].content, "hello");
    }
}
