// Generation Node
// Produces the grounded answer; always leaves a non-empty answer in state

use async_trait::async_trait;

use crate::core::config::settings::GenerationConfig;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, StageOutcome};
use crate::graph::state::PipelineState;
use crate::llm::{ChatMessage, ChatRequest, LlmService};
use crate::rag::sources::format_sources_for_answer;

pub const GENERATION_ERROR_PREFIX: &str = "답변 생성 중 오류가 발생했습니다";

/// Which grounding instructions accompany the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    WebAndInternal,
    WebOnly,
    InternalOnly,
    NoEvidence,
}

impl PromptVariant {
    pub fn select(has_external: bool, has_internal: bool) -> Self {
        match (has_external, has_internal) {
            (true, true) => PromptVariant::WebAndInternal,
            (true, false) => PromptVariant::WebOnly,
            (false, true) => PromptVariant::InternalOnly,
            (false, false) => PromptVariant::NoEvidence,
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            PromptVariant::WebAndInternal => concat!(
                "The context holds fresh web results followed by internal archive documents. ",
                "Prefer the web results for recent facts and use the archive for background."
            ),
            PromptVariant::WebOnly => {
                "The context holds web search results. Base the answer on them."
            }
            PromptVariant::InternalOnly => {
                "The context holds documents from the internal archive. Base the answer on them."
            }
            PromptVariant::NoEvidence => concat!(
                "No documents were found for this question. Say so plainly, ",
                "then answer only what you can state with confidence."
            ),
        }
    }
}

pub struct GenerationNode {
    llm: LlmService,
    config: GenerationConfig,
}

impl GenerationNode {
    pub fn new(llm: LlmService, config: GenerationConfig) -> Self {
        Self { llm, config }
    }

    fn has_citations(&self, answer: &str) -> bool {
        self.config
            .citation_markers
            .iter()
            .any(|marker| answer.contains(marker.as_str()))
    }
}

#[async_trait]
impl Node for GenerationNode {
    fn id(&self) -> &'static str {
        "generation"
    }

    fn name(&self) -> &'static str {
        "Answer Generation"
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let variant = PromptVariant::select(state.has_external, state.has_internal);
        let request = ChatRequest::new(build_messages(state, variant));

        let (answer, outcome) = match self.llm.chat("answer generation", request).await {
            Ok(text) if !text.trim().is_empty() => {
                let mut answer = text.trim().to_string();
                if !state.sources.is_empty() && !self.has_citations(&answer) {
                    answer.push_str(&format_sources_for_answer(&state.sources));
                }
                (answer, StageOutcome::Ok)
            }
            Ok(_) => {
                let reason = "model returned an empty answer".to_string();
                ctx.logger.error(ctx.run_id, self.id(), &reason);
                (
                    format!("{}: {}", GENERATION_ERROR_PREFIX, reason),
                    StageOutcome::failed(reason),
                )
            }
            Err(err) => {
                ctx.logger.error(ctx.run_id, self.id(), &err.to_string());
                (
                    format!("{}: {}", GENERATION_ERROR_PREFIX, err),
                    StageOutcome::failed(err.to_string()),
                )
            }
        };

        state.answer = answer;
        Ok(NodeOutput::next(outcome))
    }
}

/// System instructions, prior turns, then the grounded question. Turns with
/// roles the chat endpoint does not accept (tool output and the like) are
/// skipped.
pub fn build_messages(state: &PipelineState, variant: PromptVariant) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(state.chat_history.len() + 2);
    messages.push(ChatMessage::system(concat!(
        "You answer questions using the supplied context. Cite the sources you rely on ",
        "by their number, do not invent facts, and reply in the language of the question."
    )));

    for turn in &state.chat_history {
        if matches!(turn.role.as_str(), "system" | "user" | "assistant") {
            messages.push(turn.clone());
        }
    }

    messages.push(ChatMessage::user(format!(
        "{}\n\n[Context]\n{}\n\n[Question]\n{}",
        variant.instructions(),
        state.context,
        state.user_query.trim()
    )));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::settings::LlmConfig;
    use crate::core::errors::PipelineError;
    use crate::llm::LlmProvider;
    use crate::pipeline::logger::NoopLogger;
    use crate::rag::sources::{Source, SOURCES_HEADER};
    use crate::tools::search::Provider;
    use std::sync::Arc;
    use std::time::Duration;

    struct Scripted(Result<String, PipelineError>);

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<String, PipelineError> {
            self.0.clone()
        }
    }

    fn node(reply: Result<String, PipelineError>) -> GenerationNode {
        let llm = LlmService::new(
            Arc::new(Scripted(reply)),
            LlmConfig::default(),
            Duration::from_secs(1),
        );
        GenerationNode::new(llm, GenerationConfig::default())
    }

    fn state_with_source() -> PipelineState {
        let mut state = PipelineState::new("question", Vec::new());
        state.sources = vec![Source {
            title: "Doc".to_string(),
            url: "https://doc".to_string(),
            snippet: String::new(),
            date: None,
            provider: Provider::Naver,
            score: 0.9,
        }];
        state
    }

    #[tokio::test]
    async fn appends_sources_when_answer_has_no_citations() {
        let mut state = state_with_source();
        let ctx = NodeContext { logger: &NoopLogger, run_id: "t" };
        let out = node(Ok("Plain answer.".to_string()))
            .execute(&mut state, &ctx)
            .await
            .unwrap();

        assert_eq!(out.outcome, StageOutcome::Ok);
        assert!(state.answer.starts_with("Plain answer."));
        assert!(state.answer.contains(SOURCES_HEADER));
        assert!(state.answer.contains("https://doc"));
    }

    #[tokio::test]
    async fn keeps_model_citations_as_is() {
        let mut state = state_with_source();
        let ctx = NodeContext { logger: &NoopLogger, run_id: "t" };
        node(Ok("Answer.\n\n출처: [1]".to_string()))
            .execute(&mut state, &ctx)
            .await
            .unwrap();
        assert_eq!(state.answer, "Answer.\n\n출처: [1]");
    }

    #[tokio::test]
    async fn failure_produces_error_string_answer() {
        let mut state = state_with_source();
        let ctx = NodeContext { logger: &NoopLogger, run_id: "t" };
        let out = node(Err(PipelineError::unavailable("model offline")))
            .execute(&mut state, &ctx)
            .await
            .unwrap();

        assert!(matches!(out.outcome, StageOutcome::Failed(_)));
        assert!(state.answer.starts_with(GENERATION_ERROR_PREFIX));
        assert!(state.answer.contains("model offline"));

        let mut state = PipelineState::new("q", Vec::new());
        node(Ok("   ".to_string())).execute(&mut state, &ctx).await.unwrap();
        assert!(!state.answer.trim().is_empty());
    }

    #[test]
    fn history_is_replayed_before_the_grounded_prompt() {
        let mut state = PipelineState::new(
            "new question",
            vec![
                ChatMessage::system("be brief"),
                ChatMessage::user("earlier"),
                ChatMessage::new("tool", "ignored"),
                ChatMessage::assistant("reply"),
            ],
        );
        state.context = "CTX".to_string();

        let messages = build_messages(&state, PromptVariant::select(true, false));
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "system", "user", "assistant", "user"]);
        assert_eq!(messages[1].content, "be brief");
        let last = &messages[4].content;
        assert!(last.contains("CTX") && last.contains("new question"));
        assert!(last.contains("web search results"));
    }

    #[test]
    fn variant_selection_covers_all_flag_combinations() {
        assert_eq!(PromptVariant::select(true, true), PromptVariant::WebAndInternal);
        assert_eq!(PromptVariant::select(false, true), PromptVariant::InternalOnly);
        assert_eq!(PromptVariant::select(false, false), PromptVariant::NoEvidence);
    }
}
