//! Incremental token decoding
//!
//! Byte-pair tokenizers may split a multi-byte character across tokens,
//! so decoding token-by-token can yield broken UTF-8 at the boundary.
//! The stream re-decodes a trailing window and only releases text once
//! it ends on an alphanumeric character, holding partial glyphs back
//! until they complete.

use tokenizers::Tokenizer;

use crate::error::ChatError;

pub struct TokenOutputStream {
    tokenizer: Tokenizer,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl TokenOutputStream {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, ChatError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| ChatError::TokenizationError(e.to_string()))
    }

    /// Push one generated token, returning any newly completed text.
    pub fn next_token(&mut self, token: u32) -> Result<Option<String>, ChatError> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])?
        };
        self.tokens.push(token);
        let text = self.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() && text.chars().last().is_some_and(|c| c.is_alphanumeric())
        {
            let text = text.split_at(prev_text.len());
            self.prev_index = self.current_index;
            self.current_index = self.tokens.len();
            Ok(Some(text.1.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Flush whatever text is still held back.
    pub fn decode_rest(&self) -> Result<Option<String>, ChatError> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])?
        };
        let text = self.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() {
            let text = text.split_at(prev_text.len());
            Ok(Some(text.1.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Decode the whole generated sequence in one go.
    pub fn decode_all(&self) -> Result<String, ChatError> {
        self.decode(&self.tokens)
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn into_tokenizer(self) -> Tokenizer {
        self.tokenizer
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
        self.prev_index = 0;
        self.current_index = 0;
    }
}
