// Answer Verification Node
// Optional grading pass; records a verdict and never alters the answer

use async_trait::async_trait;
use serde_json::Value;

use crate::core::config::settings::GenerationConfig;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, StageOutcome};
use crate::graph::state::{PipelineState, Verification};
use crate::llm::{ChatRequest, LlmService};
use crate::rag::sources::truncate_chars;

use super::query_analysis::extract_json_object;

pub struct AnswerVerificationNode {
    llm: LlmService,
    config: GenerationConfig,
}

impl AnswerVerificationNode {
    pub fn new(llm: LlmService, config: GenerationConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl Node for AnswerVerificationNode {
    fn id(&self) -> &'static str {
        "answer_verification"
    }

    fn name(&self) -> &'static str {
        "Answer Verification"
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let prompt = verification_prompt(
            &state.user_query,
            &truncate_chars(&state.context, self.config.verification_context_chars),
            &state.answer,
        );

        let (verification, outcome) = match self
            .llm
            .chat("answer verification", ChatRequest::prompt(prompt).json())
            .await
        {
            Ok(text) => match parse_verification(&text) {
                Some(v) => (v, StageOutcome::Ok),
                None => (
                    Verification::neutral("verification response could not be parsed"),
                    StageOutcome::degraded("unparseable verification response"),
                ),
            },
            Err(err) => (
                Verification::neutral(format!("verification failed: {}", err)),
                StageOutcome::degraded(format!("verification call failed: {}", err)),
            ),
        };

        tracing::info!(
            overall_score = verification.overall_score as f64,
            issues = verification.issues.len(),
            "answer verified"
        );
        state.verification = Some(verification);
        Ok(NodeOutput::end(outcome))
    }
}

fn verification_prompt(question: &str, context: &str, answer: &str) -> String {
    format!(
        concat!(
            "Grade the answer against the context.\n\n",
            "[Question]\n{}\n\n[Context]\n{}\n\n[Answer]\n{}\n\n",
            "Reply with ONLY a JSON object: {{\"is_accurate\": bool, \"is_consistent\": bool, ",
            "\"is_complete\": bool, \"is_relevant\": bool, \"overall_score\": number between 0 and 1, ",
            "\"issues\": [strings]}}"
        ),
        question, context, answer
    )
}

pub fn parse_verification(text: &str) -> Option<Verification> {
    let object = extract_json_object(text)?;
    let flag = |key: &str| object.get(key).and_then(Value::as_bool).unwrap_or(false);

    let overall_score = object.get("overall_score").and_then(Value::as_f64)?;
    let issues = object
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Some(Verification {
        is_accurate: flag("is_accurate"),
        is_consistent: flag("is_consistent"),
        is_complete: flag("is_complete"),
        is_relevant: flag("is_relevant"),
        overall_score: overall_score.clamp(0.0, 1.0) as f32,
        issues,
    })
}
