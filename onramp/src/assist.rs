//! Code assist prompts: summary, explanation, and free chat.

use serde::{Deserialize, Serialize};

/// Heading the explanation prompt asks the model to put before a fix.
pub const CORRECTED_CODE_MARKER: &str = "Corrected Code:";

/// Explanation of a snippet, with a corrected version when the model found a bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeReview {
    pub is_correct: bool,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_code: Option<String>,
}

pub fn summarize_prompt(code: &str, context: &str) -> String {
    format!(
        "You are an expert code reviewer. Provide a concise summary of the following code. \
         Context: '{context}'.\n\n\
         Code:\n```\n{code}\n```"
    )
}

pub fn explain_prompt(code: &str, context: &str) -> String {
    format!(
        "You are an expert code debugger. Analyze the following code snippet. \n\
         If the code has errors, explain them clearly and provide a corrected version under a '{CORRECTED_CODE_MARKER}' heading.\n\
         If the code is correct, provide a clear, step-by-step explanation of what it does.\n\n\
         Context: '{context}'\n\
         Code:\n```\n{code}\n```"
    )
}

pub fn chat_prompt(message: &str) -> String {
    format!(
        "You are a helpful and knowledgeable AI assistant. \
         Your goal is to answer questions concisely and accurately.\n\n\
         User: {message}\n\
         AI:"
    )
}

impl CodeReview {
    /// Split a response on the first [`CORRECTED_CODE_MARKER`].
    ///
    /// Without the marker the snippet is taken as correct and the whole
    /// response is the explanation.
    pub fn from_response(raw: &str) -> Self {
        match raw.split_once(CORRECTED_CODE_MARKER) {
            Some((explanation, fix)) => Self {
                is_correct: false,
                explanation: explanation.trim().to_string(),
                corrected_code: Some(strip_fences(fix)),
            },
            None => Self {
                is_correct: true,
                explanation: raw.to_string(),
                corrected_code: None,
            },
        }
    }
}

/// Drop Markdown code fence lines (with or without a language tag).
fn strip_fences(block: &str) -> String {
    block
        .trim()
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_without_marker_is_correct() {
        let review = CodeReview::from_response("This function adds two numbers.");
        assert!(review.is_correct);
        assert_eq!(review.explanation, "This function adds two numbers.");
        assert!(review.corrected_code.is_none());
    }

    #[test]
    fn test_review_with_marker_splits_and_strips_fences() {
        let raw = "The loop is off by one.\n\nCorrected Code:\n```python\nfor i in range(n):\n    print(i)\n```\n";
        let review = CodeReview::from_response(raw);
        assert!(!review.is_correct);
        assert_eq!(review.explanation, "The loop is off by one.");
        assert_eq!(
            review.corrected_code.as_deref(),
            Some("for i in range(n):\n    print(i)")
        );
    }

    #[test]
    fn test_review_splits_on_first_marker_only() {
        let raw = "Bug.\nCorrected Code:\nx = 1  # Corrected Code: note";
        let review = CodeReview::from_response(raw);
        assert_eq!(
            review.corrected_code.as_deref(),
            Some("x = 1  # Corrected Code: note")
        );
    }

    #[test]
    fn test_explain_prompt_names_marker() {
        let prompt = explain_prompt("fn main() {}", "entry point");
        assert!(prompt.contains("'Corrected Code:' heading"));
        assert!(prompt.contains("Context: 'entry point'"));
    }

    #[test]
    fn test_chat_prompt_ends_with_turn_marker() {
        assert!(chat_prompt("hi").ends_with("User: hi\nAI:"));
    }
}
