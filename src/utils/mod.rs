//! The `utils` module collects the pieces shared across `popbus`: the crate
//! error type and the logging bootstrap.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::error::Error;
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
    }

    #[test]
    fn parse_level_falls_back_to_info() {
        assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
        assert_eq!(logging::parse_level(" trace "), tracing::Level::TRACE);
        assert_eq!(logging::parse_level("loud"), tracing::Level::INFO);
    }

    #[test]
    fn error_messages_name_the_subscriber() {
        let err = Error::UnknownSubscriber("abc".to_string());
        assert_eq!(
            err.to_string(),
            "subscriber abc is not registered with this broker"
        );
        assert_eq!(Error::ChannelClosed.to_string(), "subscriber channel closed");
    }
}
