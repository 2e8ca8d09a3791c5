//! Configuration loading, validation and conversion tests.

use stonechat::config::{presets, AppConfig};

#[cfg(test)]
mod default_tests {
    use super::*;

    #[test]
    fn test_defaults_match_the_published_knobs() {
        let config = AppConfig::default();
        assert_eq!(config.model.model_id, "TinyLlama/TinyLlama-1.1B-Chat-v1.0");
        assert_eq!(config.model.revision, "main");
        assert_eq!(config.model.device, "auto");
        assert_eq!(config.sampling.max_new_tokens, 512);
        assert_eq!(config.sampling.temperature, 0.7);
        assert_eq!(config.sampling.top_p, 0.9);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 7860);
        assert!(!config.server.share);
        assert!(config.server.show_errors);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        assert!(presets::factual().validate().is_ok());
        assert!(presets::balanced().validate().is_ok());
        assert!(presets::creative().validate().is_ok());
    }

    #[test]
    fn test_factual_preset_lowers_temperature() {
        let config = presets::factual();
        assert!(config.sampling.temperature < AppConfig::default().sampling.temperature);
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.model.model_id = "org/model".to_string();
        config.sampling.temperature = 1.3;
        config.server.port = 9090;
        config.to_json_file(&path).unwrap();

        let loaded = AppConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.model.model_id, "org/model");
        assert_eq!(loaded.sampling.temperature, 1.3);
        assert_eq!(loaded.server.port, 9090);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"server": {"port": 8000}}"#).unwrap();

        let config = AppConfig::from_json_file(&path).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.sampling.max_new_tokens, 512);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(AppConfig::from_json_file(&path).is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(AppConfig::from_json_file(&path).is_err());
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_rejects_empty_model_id() {
        let mut config = AppConfig::default();
        config.model.model_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_device() {
        let mut config = AppConfig::default();
        config.model.device = "quantum".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_top_p() {
        let mut config = AppConfig::default();
        config.sampling.top_p = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_max_new_tokens() {
        let mut config = AppConfig::default();
        config.sampling.max_new_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}

#[cfg(test)]
mod conversion_tests {
    use super::*;

    #[test]
    fn test_sampler_options_mirror_sampling_section() {
        let mut config = AppConfig::default();
        config.sampling.temperature = 0.4;
        config.sampling.top_p = 0.8;
        config.sampling.max_new_tokens = 128;

        let options = config.to_sampler_options();
        assert_eq!(options.temperature, 0.4);
        assert_eq!(options.top_p, 0.8);
        assert_eq!(options.max_new_tokens, 128);
    }

    #[test]
    fn test_launch_options_mirror_server_section() {
        let mut config = AppConfig::default();
        config.server.port = 8080;
        config.server.share = true;
        config.server.quiet = true;

        let options = config.to_launch_options();
        assert_eq!(options.port, 8080);
        assert!(options.share);
        assert!(options.quiet);
    }

    #[test]
    fn test_model_ref_display() {
        let mut config = AppConfig::default();
        config.model.model_id = "org/model".to_string();
        assert_eq!(config.model_ref().to_string(), "org/model");

        config.model.revision = "v2".to_string();
        assert_eq!(config.model_ref().to_string(), "org/model@v2");
    }

    #[test]
    fn test_engine_options_carry_the_hub_section() {
        let mut config = AppConfig::default();
        config.model.model_id = "org/model".to_string();
        config.model.revision = "step-100".to_string();

        let options = config.to_engine_options().unwrap();
        assert_eq!(options.hub.model_id, "org/model");
        assert_eq!(options.hub.revision, "step-100");
    }

    #[test]
    fn test_engine_options_reject_bad_dtype() {
        let mut config = AppConfig::default();
        config.model.dtype = Some("int3".to_string());
        assert!(config.to_engine_options().is_err());
    }
}
