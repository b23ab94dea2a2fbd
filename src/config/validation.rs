use std::{collections::HashMap, net::SocketAddr};

use tracing_subscriber::EnvFilter;

use crate::config::models::GatewayConfig;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid route '{path}': {message}")]
    InvalidRoute { path: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, collecting every problem before failing.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.backend_host.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "backend_host".to_string(),
            });
        } else if let Err(e) = Self::validate_url(&config.backend_host, "backend_host") {
            errors.push(e);
        }

        let mut shapes: HashMap<String, &str> = HashMap::new();
        for path in &config.routes {
            if let Err(e) = Self::validate_route_path(path) {
                errors.push(e);
                continue;
            }
            // Routes differing only in capture names cannot be registered side by side.
            let shape = Self::route_shape(path);
            match shapes.get(shape.as_str()) {
                Some(existing) if *existing != path.as_str() => {
                    errors.push(ValidationError::InvalidRoute {
                        path: path.clone(),
                        message: format!("Conflicts with route '{existing}'"),
                    });
                }
                Some(_) => {}
                None => {
                    shapes.insert(shape, path.as_str());
                }
            }
        }

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        match config.shutdown.grace_period() {
            Ok(period) if period.is_zero() => errors.push(ValidationError::InvalidField {
                field: "shutdown.grace_period".to_string(),
                message: "Grace period must be greater than 0".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidField {
                field: "shutdown.grace_period".to_string(),
                message: format!(
                    "Invalid duration '{}': {e}",
                    config.shutdown.grace_period
                ),
            }),
        }

        if let Err(e) = EnvFilter::try_new(&config.logging.level) {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: format!("Invalid filter directive '{}': {e}", config.logging.level),
            });
        }

        if let Some(file) = &config.logging.file {
            if file.directory.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: "logging.file.directory".to_string(),
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            }),
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:80')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Forwarded paths are installed as router patterns, so they must be absolute and
    /// use the `{name}` capture syntax only.
    fn validate_route_path(path: &str) -> ValidationResult<()> {
        let invalid = |message: &str| ValidationError::InvalidRoute {
            path: path.to_string(),
            message: message.to_string(),
        };

        if !path.starts_with('/') {
            return Err(invalid("Route paths must start with '/'"));
        }
        if path.chars().any(char::is_whitespace) {
            return Err(invalid("Route paths must not contain whitespace"));
        }
        if path.contains('?') || path.contains('#') {
            return Err(invalid("Route paths must not carry a query or fragment"));
        }
        let segments: Vec<&str> = path.split('/').collect();
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            if segment.starts_with(':') || segment.starts_with('*') {
                return Err(invalid(
                    "Use '{name}' captures instead of ':name' or '*name' segments",
                ));
            }
            let opens = segment.matches('{').count();
            let closes = segment.matches('}').count();
            if opens != closes || opens > 1 {
                return Err(invalid("Unbalanced or nested '{}' capture"));
            }
            if opens == 0 {
                continue;
            }
            let Some(capture) = segment
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
            else {
                return Err(invalid("A capture must span the whole path segment"));
            };
            let (catch_all, name) = match capture.strip_prefix('*') {
                Some(name) => (true, name),
                None => (false, capture),
            };
            if name.is_empty() {
                return Err(invalid("Captures must be named"));
            }
            if catch_all && i != last {
                return Err(invalid("A '{*name}' catch-all must be the final segment"));
            }
        }
        Ok(())
    }

    fn route_shape(path: &str) -> String {
        path.split('/')
            .map(|segment| match segment.strip_prefix('{') {
                Some(rest) if rest.starts_with('*') => "{*}",
                Some(_) => "{}",
                None => segment,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                if url.query().is_some() || url.fragment().is_some() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "Backend URL must not carry a query or fragment".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
