use super::{types::Config, ConfigError};

/// Largest accepted `batch.max_parallel`.
pub const MAX_PARALLEL_LIMIT: usize = 32;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Batch parallelism is within 1..=32
/// - 3D task timeout is positive and not shorter than the poll interval
/// - Naming pattern is not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Batch validation
    let max_parallel = config.batch.max_parallel;
    if max_parallel == 0 || max_parallel > MAX_PARALLEL_LIMIT {
        return Err(ConfigError::ValidationError(format!(
            "batch.max_parallel must be between 1 and {}, got {}",
            MAX_PARALLEL_LIMIT, max_parallel
        )));
    }
    if config.batch.naming_pattern.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "batch.naming_pattern cannot be empty".to_string(),
        ));
    }

    // Pipeline validation
    let pipeline = &config.pipeline;
    if pipeline.model_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.model_timeout_secs cannot be 0".to_string(),
        ));
    }
    if pipeline.poll_interval_secs == 0 || pipeline.poll_interval_secs > pipeline.model_timeout_secs
    {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.poll_interval_secs must be between 1 and model_timeout_secs ({}), got {}",
            pipeline.model_timeout_secs, pipeline.poll_interval_secs
        )));
    }

    Ok(())
}
