use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Concurrency is at least 1
/// - Ceiling is non-zero and bit depth is 8..=32
/// - Bitrate allow-list is non-empty and contains the default
/// - Timeouts are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.build.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "build.concurrency cannot be 0".to_string(),
        ));
    }

    let policy = &config.policy;
    if policy.max_sample_rate == 0 {
        return Err(ConfigError::ValidationError(
            "policy.max_sample_rate cannot be 0".to_string(),
        ));
    }
    if !(8..=24).contains(&policy.max_bit_depth) {
        return Err(ConfigError::ValidationError(format!(
            "policy.max_bit_depth must be between 8 and 24, got {}",
            policy.max_bit_depth
        )));
    }
    if policy.allowed_bitrates.is_empty() {
        return Err(ConfigError::ValidationError(
            "policy.allowed_bitrates cannot be empty".to_string(),
        ));
    }
    if !policy.allowed_bitrates.contains(&policy.default_bitrate_kbps) {
        return Err(ConfigError::ValidationError(format!(
            "policy.default_bitrate_kbps {} is not in allowed_bitrates {:?}",
            policy.default_bitrate_kbps, policy.allowed_bitrates
        )));
    }

    if config.encoder.timeout_secs == 0 || config.encoder.probe_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "encoder timeouts cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_validate_default_config() {
        assert_ok!(validate_config(&Config::default()));
    }

    #[test]
    fn test_validate_concurrency_zero_fails() {
        let mut config = Config::default();
        config.build.concurrency = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_bit_depth_range() {
        let mut config = Config::default();
        config.policy.max_bit_depth = 4;
        assert_err!(validate_config(&config));
        config.policy.max_bit_depth = 24;
        assert_ok!(validate_config(&config));
        // ALAC stores at most 24-bit samples.
        config.policy.max_bit_depth = 25;
        assert_err!(validate_config(&config));
    }

    #[test]
    fn test_validate_default_bitrate_must_be_allowed() {
        let mut config = Config::default();
        config.policy.default_bitrate_kbps = 160;
        assert_err!(validate_config(&config));

        config.policy.allowed_bitrates.clear();
        assert_err!(validate_config(&config));
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = Config::default();
        config.encoder.timeout_secs = 0;
        assert_err!(validate_config(&config));
    }

    #[test]
    fn test_policy_carries_output_root() {
        let mut config = Config::default();
        config.build.output_root = "/srv/ipod".into();
        config.policy.max_sample_rate = 48000;
        let policy = config.policy();
        assert_eq!(policy.output_root, std::path::PathBuf::from("/srv/ipod"));
        assert_eq!(policy.max_sample_rate, 48000);
    }
}
