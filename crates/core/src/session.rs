use crate::orchestrator::ChatbotService;
use crate::{Answer, ConversationTurn};
use tracing::warn;
use uuid::Uuid;

/// One interactive conversation. History lives only as long as the session.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    history: Vec<ConversationTurn>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Asks through `service`. Answered and insufficient-context replies are
    /// appended to the history; failures come back as an error answer and
    /// leave the history untouched.
    pub async fn ask(&mut self, service: &ChatbotService, question: &str) -> Answer {
        match service.ask(question, &self.history).await {
            Ok(answer) => {
                self.history.push(ConversationTurn::user(question.trim()));
                self.history.push(ConversationTurn::assistant(answer.text.clone()));
                answer
            }
            Err(error) => {
                warn!(session = %self.id, %error, retryable = error.is_retryable(), "question failed");
                Answer::error(format!("Error: {error}"))
            }
        }
    }
}
