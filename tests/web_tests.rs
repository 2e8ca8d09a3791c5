//! Wire-format tests for the chat API types. These run without a model
//! so they only cover request parsing, option merging and response
//! shapes.

use stonechat::sampling::SamplerOptions;
use stonechat::web::{merge_request_options, ChatRequest, ChatResponse, ErrorResponse};

#[cfg(test)]
mod request_tests {
    use super::*;

    #[test]
    fn test_minimal_request() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(request.message, "hi");
        assert!(request.max_new_tokens.is_none());
        assert!(request.temperature.is_none());
        assert!(request.top_p.is_none());
    }

    #[test]
    fn test_full_request() {
        let json = r#"{"message": "hi", "max_new_tokens": 200, "temperature": 0.5, "top_p": 0.8}"#;
        let request: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.max_new_tokens, Some(200));
        assert_eq!(request.temperature, Some(0.5));
        assert_eq!(request.top_p, Some(0.8));
    }

    #[test]
    fn test_request_without_message_is_rejected() {
        let result: Result<ChatRequest, _> = serde_json::from_str(r#"{"temperature": 0.5}"#);
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod merge_tests {
    use super::*;

    fn request(json: &str) -> ChatRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_absent_knobs_keep_defaults() {
        let defaults = SamplerOptions::default();
        let merged = merge_request_options(&defaults, &request(r#"{"message": "hi"}"#));
        assert_eq!(merged, defaults);
    }

    #[test]
    fn test_present_knobs_override_defaults() {
        let defaults = SamplerOptions::default();
        let merged = merge_request_options(
            &defaults,
            &request(r#"{"message": "hi", "temperature": 1.5, "top_p": 0.5}"#),
        );
        assert_eq!(merged.temperature, 1.5);
        assert_eq!(merged.top_p, 0.5);
        assert_eq!(merged.max_new_tokens, defaults.max_new_tokens);
    }

    #[test]
    fn test_overrides_clamp_to_slider_bounds() {
        let defaults = SamplerOptions::default();
        let merged = merge_request_options(
            &defaults,
            &request(r#"{"message": "hi", "max_new_tokens": 100000, "temperature": 0.0, "top_p": 2.0}"#),
        );
        assert_eq!(merged.max_new_tokens, 1024);
        assert_eq!(merged.temperature, 0.1);
        assert_eq!(merged.top_p, 1.0);
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn test_chat_response_shape() {
        let response = ChatResponse {
            reply: "hello".to_string(),
            exchanges: vec![],
            prompt_tokens: 12,
            completion_tokens: 34,
            generation_time_ms: 560,
            finish_reason: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""reply":"hello""#));
        assert!(json.contains(r#""completion_tokens":34"#));
        // Absent finish reason stays off the wire
        assert!(!json.contains("finish_reason"));
    }

    #[test]
    fn test_error_response_shape() {
        let response = ErrorResponse {
            error: "bad request".to_string(),
            code: "BAD_REQUEST".to_string(),
            status: 400,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""error":"bad request""#));
        assert!(json.contains(r#""status":400"#));
    }
}

#[cfg(test)]
mod page_tests {
    const CHAT_PAGE: &str = include_str!("../assets/chat.html");

    #[test]
    fn test_chat_page_ships_the_six_example_prompts() {
        let prompts = [
            "Explain machine learning in simple terms",
            "Write a Python function to sort a list",
            "What are the benefits of renewable energy?",
            "Create a short story about space exploration",
            "How does photosynthesis work?",
            "Write a professional email template",
        ];
        for prompt in prompts {
            assert!(CHAT_PAGE.contains(prompt), "chat page is missing the example prompt {prompt:?}");
        }
        // The prompt buttons render into this container on load
        assert!(CHAT_PAGE.contains(r#"id="examples""#));
    }

    #[test]
    fn test_chat_page_slider_bounds_match_sampler_defaults() {
        assert!(CHAT_PAGE.contains(r#"id="max-tokens" min="50" max="1024" step="50" value="512""#));
        assert!(CHAT_PAGE.contains(r#"id="temperature" min="0.1" max="2.0" step="0.1" value="0.7""#));
        assert!(CHAT_PAGE.contains(r#"id="top-p" min="0.1" max="1.0" step="0.05" value="0.9""#));
    }
}
