use super::models::{Config, DeadLetterSinkKind};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transport.request_destination must not be empty")]
    EmptyRequestDestination,

    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },

    #[error("worker.transformer must not be empty")]
    EmptyTransformer,

    #[error("dead_letter.path must be set when the fjall sink is used")]
    MissingDeadLetterPath,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_transport(config)?;
    validate_worker(config)?;
    validate_dead_letter(config)?;
    validate_fetch(config)?;
    Ok(())
}

fn validate_transport(config: &Config) -> Result<(), ValidationError> {
    if config.transport.request_destination.trim().is_empty() {
        return Err(ValidationError::EmptyRequestDestination);
    }

    if config.transport.channel_capacity == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "transport.channel_capacity",
        });
    }

    if config.transport.max_message_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "transport.max_message_bytes",
        });
    }

    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.max_inflight_jobs == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "worker.max_inflight_jobs",
        });
    }

    if config.worker.transformer.trim().is_empty() {
        return Err(ValidationError::EmptyTransformer);
    }

    Ok(())
}

fn validate_dead_letter(config: &Config) -> Result<(), ValidationError> {
    if config.dead_letter.sink == DeadLetterSinkKind::Fjall
        && config.dead_letter.path.as_os_str().is_empty()
    {
        return Err(ValidationError::MissingDeadLetterPath);
    }

    Ok(())
}

fn validate_fetch(config: &Config) -> Result<(), ValidationError> {
    if config.fetch.max_retries == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "fetch.max_retries",
        });
    }

    Ok(())
}
