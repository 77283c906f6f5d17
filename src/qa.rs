//! Grounded question answering over a finished SOP.
//!
//! The model is told to answer only from the supplied context and to reply
//! with a fixed sentence when the answer is not there; see
//! [`crate::prompts::QA_PROMPT`].

use crate::error::SopError;
use crate::pipeline::generate::Generator;
use crate::prompts::qa_prompt;
use tracing::{debug, info};

/// Answer `question` from `context` (an SOP body or transcript).
///
/// # Errors
/// [`SopError::InvalidConfig`] when either argument is blank;
/// [`SopError::Internal`] when the generator call fails.
pub async fn answer_question(
    generator: &dyn Generator,
    question: &str,
    context: &str,
) -> Result<String, SopError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(SopError::InvalidConfig("question must not be empty".into()));
    }
    if context.trim().is_empty() {
        return Err(SopError::InvalidConfig(
            "context must not be empty; run a job first".into(),
        ));
    }

    debug!("Q&A over {} chars of context", context.chars().count());
    let answer = generator
        .complete(&qa_prompt(question, context))
        .await
        .map_err(|e| SopError::Internal(format!("Q&A generation failed: {e}")))?;
    info!("Answered question ({} chars)", answer.len());
    Ok(answer.trim().to_string())
}
