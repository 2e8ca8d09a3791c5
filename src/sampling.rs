//! Sampling parameters for text generation
//!
//! The web UI exposes three knobs (response length, temperature and
//! nucleus threshold); the CLI and config add a top-k cutoff, repeat
//! penalty and seed on top. Options map onto a candle
//! [`LogitsProcessor`] right before each generation run.

use candle_transformers::generation::{LogitsProcessor, Sampling};

/// Slider bounds published by the chat UI.
pub const MAX_NEW_TOKENS_RANGE: (usize, usize) = (50, 1024);
pub const TEMPERATURE_RANGE: (f64, f64) = (0.1, 2.0);
pub const TOP_P_RANGE: (f64, f64) = (0.1, 1.0);

/// Generation-time knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerOptions {
    /// Upper bound on generated tokens per reply.
    pub max_new_tokens: usize,
    /// Softmax temperature. Zero or below selects greedy decoding.
    pub temperature: f64,
    /// Nucleus threshold. Values of 1.0 and above disable the cutoff.
    pub top_p: f64,
    /// Optional top-k cutoff applied before the nucleus filter.
    pub top_k: Option<usize>,
    /// Penalty applied to recently generated tokens. 1.0 disables it.
    pub repeat_penalty: f32,
    /// Window of recent tokens the penalty looks at.
    pub repeat_last_n: usize,
    /// RNG seed for the sampler.
    pub seed: u64,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            top_k: None,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            seed: 299792458,
        }
    }
}

impl SamplerOptions {
    /// Clamp user-supplied values into the ranges the UI publishes.
    ///
    /// Requests arriving over HTTP are not trusted to respect the
    /// slider bounds.
    pub fn clamped(mut self) -> Self {
        self.max_new_tokens = self
            .max_new_tokens
            .clamp(MAX_NEW_TOKENS_RANGE.0, MAX_NEW_TOKENS_RANGE.1);
        self.temperature = self.temperature.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        self.top_p = self.top_p.clamp(TOP_P_RANGE.0, TOP_P_RANGE.1);
        self
    }

    /// Pick the sampling mode these options describe.
    pub fn sampling(&self) -> Sampling {
        let temperature = self.temperature;
        if temperature <= 0.0 {
            return Sampling::ArgMax;
        }
        match (self.top_k, self.top_p) {
            (Some(k), p) if p < 1.0 => Sampling::TopKThenTopP { k, p, temperature },
            (Some(k), _) => Sampling::TopK { k, temperature },
            (None, p) if p < 1.0 => Sampling::TopP { p, temperature },
            (None, _) => Sampling::All { temperature },
        }
    }

    /// Build the logits processor used for one generation run.
    pub fn logits_processor(&self) -> LogitsProcessor {
        LogitsProcessor::from_sampling(self.seed, self.sampling())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = SamplerOptions::default();
        assert_eq!(opts.max_new_tokens, 512);
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.top_p, 0.9);
        assert_eq!(opts.repeat_penalty, 1.1);
        assert_eq!(opts.repeat_last_n, 64);
    }

    #[test]
    fn test_clamping() {
        let opts = SamplerOptions {
            max_new_tokens: 9000,
            temperature: 5.0,
            top_p: 0.0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(opts.max_new_tokens, 1024);
        assert_eq!(opts.temperature, 2.0);
        assert_eq!(opts.top_p, 0.1);
    }

    #[test]
    fn test_clamping_keeps_in_range_values() {
        let opts = SamplerOptions::default().clamped();
        assert_eq!(opts, SamplerOptions::default());
    }

    #[test]
    fn test_sampling_mode_selection() {
        let opts = SamplerOptions::default();
        assert!(matches!(opts.sampling(), Sampling::TopP { .. }));

        let greedy = SamplerOptions {
            temperature: 0.0,
            ..Default::default()
        };
        assert!(matches!(greedy.sampling(), Sampling::ArgMax));

        let no_nucleus = SamplerOptions {
            top_p: 1.0,
            ..Default::default()
        };
        assert!(matches!(no_nucleus.sampling(), Sampling::All { .. }));

        let with_k = SamplerOptions {
            top_k: Some(40),
            ..Default::default()
        };
        assert!(matches!(with_k.sampling(), Sampling::TopKThenTopP { .. }));
    }
}
