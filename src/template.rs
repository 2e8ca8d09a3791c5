//! Chat prompt convention
//!
//! The model sees a single role-tagged turn: the user text wrapped
//! between a user tag and an assistant tag. The reply is whatever the
//! model produced after the final assistant tag.

/// Tag opening the user turn.
pub const USER_TAG: &str = "<|user|>";

/// Tag opening the assistant turn.
pub const ASSISTANT_TAG: &str = "<|assistant|>";

/// Wrap user text as a role-tagged turn ready for tokenization.
///
/// Surrounding whitespace is dropped so stray newlines from text boxes
/// do not leak into the prompt.
pub fn format_turn(user_text: &str) -> String {
    format!("{}\n{}\n{}\n", USER_TAG, user_text.trim(), ASSISTANT_TAG)
}

/// Pull the assistant's reply out of a full decoded sequence.
///
/// Decoded output normally echoes the prompt, so the reply is the
/// segment after the last assistant tag. When the tag was consumed by
/// special-token stripping, fall back to removing the formatted prompt
/// from the decoded text.
pub fn extract_reply(decoded: &str, formatted_prompt: &str) -> String {
    match decoded.rsplit_once(ASSISTANT_TAG) {
        Some((_, tail)) => tail.trim().to_string(),
        None => decoded.replace(formatted_prompt, "").trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_turn() {
        let prompt = format_turn("What is photosynthesis?");
        assert_eq!(prompt, "<|user|>\nWhat is photosynthesis?\n<|assistant|>\n");
    }

    #[test]
    fn test_format_turn_trims_input() {
        let prompt = format_turn("  hello \n");
        assert_eq!(prompt, "<|user|>\nhello\n<|assistant|>\n");
    }

    #[test]
    fn test_extract_reply_after_tag() {
        let prompt = format_turn("hi");
        let decoded = format!("{}Hello there!", prompt);
        assert_eq!(extract_reply(&decoded, &prompt), "Hello there!");
    }

    #[test]
    fn test_extract_reply_takes_last_tag() {
        let decoded = "<|user|>\nexplain <|assistant|> tags\n<|assistant|>\nThey mark turns.";
        assert_eq!(extract_reply(decoded, ""), "They mark turns.");
    }

    #[test]
    fn test_extract_reply_without_tag() {
        let prompt = format_turn("hi");
        let decoded = "hi\nHello there!";
        assert_eq!(extract_reply(decoded, &prompt), "hi\nHello there!");
    }
}
