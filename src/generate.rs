//! The prompt-format-and-generate routine
//!
//! Stateless per call: wrap the user text in the chat template, run one
//! forward pass over the prompt, then sample token by token against a
//! fresh KV cache until EOS or the length cap. Callers never share
//! generation state between requests.

use std::time::Instant;

use candle_core::Tensor;
use serde::Serialize;
use tracing::debug;

use crate::error::ChatError;
use crate::model::LoadedModel;
use crate::sampling::SamplerOptions;
use crate::template;
use crate::token_stream::TokenOutputStream;

/// Prompt token budget. Longer prompts are cut at the head-side limit
/// before the forward pass.
pub const MAX_PROMPT_TOKENS: usize = 1024;

/// Why a generation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model emitted an end-of-sequence token.
    Eos,
    /// The length cap was reached.
    Length,
    /// The consumer asked to stop mid-stream.
    Stopped,
}

/// Outcome of one generation run.
#[derive(Debug, Clone)]
pub struct Generated {
    pub reply: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub elapsed_ms: u64,
    pub finish_reason: FinishReason,
}

/// Generate a reply for one user message.
pub fn generate_reply(
    model: &LoadedModel,
    user_text: &str,
    options: &SamplerOptions,
) -> Result<Generated, ChatError> {
    generate_reply_with(model, user_text, options, |_| true)
}

/// Generation with a per-chunk text callback for streaming consumers.
///
/// The callback receives decoded text as it completes; returning false
/// stops the run early.
pub fn generate_reply_with<F>(
    model: &LoadedModel,
    user_text: &str,
    options: &SamplerOptions,
    mut on_text: F,
) -> Result<Generated, ChatError>
where
    F: FnMut(&str) -> bool,
{
    let started = Instant::now();

    let formatted = template::format_turn(user_text);
    let encoding = model
        .tokenizer
        .encode(formatted.as_str(), true)
        .map_err(|e| ChatError::TokenizationError(e.to_string()))?;
    let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
    tokens.truncate(MAX_PROMPT_TOKENS);
    let prompt_tokens = tokens.len();

    let mut cache = model.new_cache()?;
    let mut processor = options.logits_processor();
    let mut decoder = TokenOutputStream::new(model.tokenizer.clone());

    let mut completion_tokens = 0usize;
    let mut index_pos = 0usize;
    let mut finish_reason = FinishReason::Length;

    for index in 0..options.max_new_tokens {
        // First pass feeds the whole prompt, later passes one token
        // against the warm KV cache.
        let (context_size, context_index) = if index > 0 {
            (1, index_pos)
        } else {
            (tokens.len(), 0)
        };
        let context = &tokens[tokens.len().saturating_sub(context_size)..];
        let input = Tensor::new(context, &model.device)?.unsqueeze(0)?;
        let logits = model.model.forward(&input, context_index, &mut cache)?;
        let logits = logits.squeeze(0)?;
        let logits = if options.repeat_penalty == 1.0 {
            logits
        } else {
            let start_at = tokens.len().saturating_sub(options.repeat_last_n);
            candle_transformers::utils::apply_repeat_penalty(
                &logits,
                options.repeat_penalty,
                &tokens[start_at..],
            )?
        };
        index_pos += context.len();

        let next_token = processor.sample(&logits)?;
        tokens.push(next_token);
        completion_tokens += 1;

        if model.is_eos(next_token) {
            finish_reason = FinishReason::Eos;
            break;
        }
        if let Some(text) = decoder.next_token(next_token)? {
            if !on_text(&text) {
                finish_reason = FinishReason::Stopped;
                break;
            }
        }
    }

    if let Some(rest) = decoder.decode_rest()? {
        if finish_reason != FinishReason::Stopped {
            on_text(&rest);
        }
    }

    // Reassemble the full sequence so reply extraction sees the same
    // shape a whole-sequence decode would produce.
    let completion = decoder.decode_all()?;
    let full = format!("{}{}", formatted, completion);
    let reply = template::extract_reply(&full, &formatted);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let tokens_per_sec = if elapsed_ms > 0 {
        completion_tokens as f64 * 1000.0 / elapsed_ms as f64
    } else {
        0.0
    };
    debug!(
        prompt_tokens,
        completion_tokens,
        elapsed_ms,
        "generation finished: {:.1} tok/s ({:?})",
        tokens_per_sec,
        finish_reason
    );

    Ok(Generated {
        reply,
        prompt_tokens,
        completion_tokens,
        elapsed_ms,
        finish_reason,
    })
}
