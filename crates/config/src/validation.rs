use crate::ConfigResult;

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        if timeout_seconds == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout_seconds > 3600 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 3600"
            )));
        }
        Ok(())
    }

    /// Validate that a count is reasonable
    pub fn validate_count(count: usize, field_name: &str) -> ConfigResult<()> {
        if count == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > 10000 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 10000"
            )));
        }
        Ok(())
    }

    /// Validate an IANA time zone name such as `Asia/Shanghai`
    pub fn validate_time_zone(name: &str, field_name: &str) -> ConfigResult<()> {
        name.parse::<chrono_tz::Tz>().map_err(|_| {
            crate::ConfigError::Validation(format!("{field_name} is not a valid time zone: {name}"))
        })?;
        Ok(())
    }

    /// Validate a `host:port` socket address
    pub fn validate_socket_addr(addr: &str, field_name: &str) -> ConfigResult<()> {
        addr.parse::<std::net::SocketAddr>().map_err(|_| {
            crate::ConfigError::Validation(format!("{field_name} is not a valid address: {addr}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("test", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("  test  ", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("", "field").is_err());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_timeout_seconds() {
        assert!(ValidationUtils::validate_timeout_seconds(30, "t").is_ok());
        assert!(ValidationUtils::validate_timeout_seconds(3600, "t").is_ok());
        assert!(ValidationUtils::validate_timeout_seconds(0, "t").is_err());
        assert!(ValidationUtils::validate_timeout_seconds(3601, "t").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(10, "test").is_ok());
        assert!(ValidationUtils::validate_count(0, "test").is_err());
        assert!(ValidationUtils::validate_count(10001, "test").is_err());
    }

    #[test]
    fn test_validate_time_zone() {
        assert!(ValidationUtils::validate_time_zone("Asia/Shanghai", "tz").is_ok());
        assert!(ValidationUtils::validate_time_zone("UTC", "tz").is_ok());
        assert!(ValidationUtils::validate_time_zone("Mars/Olympus", "tz").is_err());
    }

    #[test]
    fn test_validate_socket_addr() {
        assert!(ValidationUtils::validate_socket_addr("0.0.0.0:9090", "addr").is_ok());
        assert!(ValidationUtils::validate_socket_addr("localhost", "addr").is_err());
    }
}
