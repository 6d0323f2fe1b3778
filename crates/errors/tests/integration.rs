//! Integration tests for error types

#[cfg(test)]
mod tests {
    use grouplimit_errors::*;

    #[test]
    fn test_error_conversion() {
        let cfg_err = ConfigError::InvalidLimit {
            group: "downloads".into(),
            value: "-3".into(),
        };
        let err: Error = cfg_err.into();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.user_code(), Some("config.invalid_limit"));
        assert!(err.user_hint().is_some());
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidValue {
            field: "GROUPLIMIT_DEFAULT_WAIT_MS".into(),
            value: "soon".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for GROUPLIMIT_DEFAULT_WAIT_MS: soon"
        );
    }

    #[test]
    fn test_io_error_keeps_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err = Error::io_with_path(&io_err, "/etc/grouplimit/config.toml");
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                path: Some(ref path),
                ..
            } if path == std::path::Path::new("/etc/grouplimit/config.toml")
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("limits = [");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Config(ConfigError::ParseError { .. })));
    }
}
