// src/generation/prompt.rs
use serde::Serialize;

const SYSTEM_PROMPT: &str = "You are an expert in encouraging banking customers to engage with either \
home mortgage purchase, refinancing or home equity loan. Come up with {count} brief and powerful \
messages, each message has at least ten and at most thirty words, and be creative every time you \
are called; do not reuse the same verbiage. Do not make any offers or mention anything numeric, \
such as years, terms, interest rates or fees.";

/// Prompt sent to the generation service. `reference` doubles as the text
/// whose embedding candidates are ranked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationPrompt {
    pub system: String,
    pub reference: String,
    pub candidate_count: usize,
}

impl GenerationPrompt {
    pub fn for_profile(category_label: &str, rationale: &str, candidate_count: usize) -> Self {
        Self {
            system: SYSTEM_PROMPT.replace("{count}", &candidate_count.to_string()),
            reference: reference_text(category_label, rationale),
            candidate_count,
        }
    }

    /// Full user turn: the reference description plus output-format rules.
    /// The requested shape matches the `format` schema sent with the request.
    pub fn user_message(&self) -> String {
        format!(
            "{}\n\nReturn the output as a JSON object of the form {{\"messages\": [...]}} where \"messages\" is an array of {} strings, each containing one message. Do not include any extra text.",
            self.reference, self.candidate_count
        )
    }
}

pub fn reference_text(category_label: &str, rationale: &str) -> String {
    format!(
        "This message is for user that is interested in {}. Reasoning: {}.",
        category_label,
        rationale.trim().trim_end_matches('.')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_formats_category_and_rationale() {
        let prompt =
            GenerationPrompt::for_profile("Home Equity Line of Credit", "Long tenure, high equity.", 10);
        assert_eq!(
            prompt.reference,
            "This message is for user that is interested in Home Equity Line of Credit. Reasoning: Long tenure, high equity."
        );
        assert!(prompt.system.contains("Come up with 10 brief"));
        assert!(prompt.user_message().starts_with(&prompt.reference));
        assert!(prompt.user_message().contains(r#"{"messages": [...]}"#));
        assert!(prompt.user_message().contains("array of 10 strings"));
    }
}
