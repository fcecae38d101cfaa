use crate::error::ModelError;
use crate::models::{Answer, AnswerStatus, ConversationTurn, RetrievedChunk, Role};
use crate::traits::LanguageModel;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

pub const STRICT_FALLBACK: &str = "I don't know.";
pub const POLITE_FALLBACK: &str = "I'm sorry, I couldn't find anything about that in the uploaded \
documents. Please try rephrasing your question or upload the relevant brochure.";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStyle {
    #[default]
    Polite,
    Strict,
}

impl FallbackStyle {
    pub fn text(self) -> &'static str {
        match self {
            Self::Polite => POLITE_FALLBACK,
            Self::Strict => STRICT_FALLBACK,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ComposerConfig {
    pub assistant_role: String,
    pub include_reasoning: bool,
    pub include_conclusion: bool,
    pub fallback_style: FallbackStyle,
    pub use_conversation_memory: bool,
    /// Retrieved chunks beyond this count are left out of the prompt.
    pub max_context_chunks: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            assistant_role: "professional HR Policy Assistant".to_string(),
            include_reasoning: false,
            include_conclusion: true,
            fallback_style: FallbackStyle::Polite,
            use_conversation_memory: false,
            max_context_chunks: 3,
        }
    }
}

pub struct AnswerComposer {
    model: Arc<dyn LanguageModel>,
    config: ComposerConfig,
}

impl AnswerComposer {
    pub fn new(model: Arc<dyn LanguageModel>, config: ComposerConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Answers `question` from `chunks`. With no chunks the model is never
    /// called and the configured fallback text is returned.
    pub async fn compose(
        &self,
        question: &str,
        chunks: &[RetrievedChunk],
        history: &[ConversationTurn],
    ) -> Result<Answer, ModelError> {
        if chunks.is_empty() {
            return Ok(insufficient_context(self.config.fallback_style));
        }

        let context = &chunks[..chunks.len().min(self.config.max_context_chunks.max(1))];
        let prompt = build_prompt(&self.config, question, context, history);
        debug!(chunks = context.len(), prompt_chars = prompt.len(), "invoking model");

        let text = self.model.generate(&prompt).await?;
        let model_declined = is_decline(&text);

        Ok(Answer {
            status: AnswerStatus::Answered,
            text,
            sources: distinct_sources(context),
            model_declined,
        })
    }
}

pub fn insufficient_context(style: FallbackStyle) -> Answer {
    Answer {
        status: AnswerStatus::InsufficientContext,
        text: style.text().to_string(),
        sources: Vec::new(),
        model_declined: false,
    }
}

pub fn build_prompt(
    config: &ComposerConfig,
    question: &str,
    chunks: &[RetrievedChunk],
    history: &[ConversationTurn],
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "You are a {}.", config.assistant_role);
    prompt.push_str(
        "Your role is to answer questions strictly based on the provided context.\n",
    );
    let _ = writeln!(
        prompt,
        "If the answer is not in the context, respond only with: \"{STRICT_FALLBACK}\""
    );
    prompt.push_str("\nFollow these rules:\n");

    let mut rules = vec![
        "Never invent or assume information outside the context.",
        "Always include a source reference using the file name shown with each context block.",
        "If multiple sections are relevant, summarize them together in a structured way.",
        "Use neutral, professional language suitable for policy documentation.",
        "If the message is only a greeting, thanks, or farewell, reply with a short professional phrase and skip the format below.",
    ];
    if config.include_reasoning {
        rules.push("Explain your reasoning step by step before writing the Summary.");
    }
    if config.include_conclusion {
        rules.push("Keep the Summary under 120 words and the Conclusion under 200 words.");
    } else {
        rules.push("Keep the Summary under 120 words.");
    }
    for (position, rule) in rules.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {rule}", position + 1);
    }

    prompt.push_str("\nFormat your answer exactly like this:\n");
    if config.include_reasoning {
        prompt.push_str("**Reasoning:** <step-by-step explanation of how you derived the answer>\n");
    }
    prompt.push_str("**Summary:** <3-5 sentence explanation>\n");
    if config.include_conclusion {
        prompt.push_str("**Conclusion:** <final, actionable statement>\n");
    }
    prompt.push_str("*Source:* <filename>, Section <number or heading if available>\n");

    if config.use_conversation_memory && !history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for turn in history {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let _ = writeln!(prompt, "{speaker}: {}", turn.content);
        }
    }

    prompt.push_str("\nContext:\n");
    for chunk in chunks {
        let _ = writeln!(prompt, "[Source: {}]\n{}\n", chunk.chunk.source(), chunk.chunk.text);
    }

    let _ = write!(prompt, "Question:\n{question}\n");
    prompt
}

fn distinct_sources(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        let source = chunk.chunk.source();
        if !sources.iter().any(|seen| seen == source) {
            sources.push(source.to_string());
        }
    }
    sources
}

fn is_decline(text: &str) -> bool {
    let normalized = text.trim().to_lowercase().replace('\u{2019}', "'");
    normalized.starts_with("i don't know") || normalized.starts_with("i do not know")
}
