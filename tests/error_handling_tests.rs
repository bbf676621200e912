use atport::{AtPortError, AtPortResult, ExecutorError, TransportError};
use std::error::Error;
use std::time::Duration;

/// Error handling and resilience tests
#[cfg(test)]
mod error_handling_tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let errors = vec![
            AtPortError::Config { message: "Config error".to_string() },
            AtPortError::InvalidInput("Invalid input".to_string()),
            AtPortError::Output("Output error".to_string()),
            AtPortError::Transport(TransportError::NotOpen),
            AtPortError::Executor(ExecutorError::ExchangeInProgress),
            AtPortError::Executor(ExecutorError::StreamClosed),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty(), "Error display should not be empty");
        }

        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<AtPortError>();
        assert_send_sync::<ExecutorError>();
        assert_send_sync::<TransportError>();
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let atport_error: AtPortError = io_error.into();
        assert!(matches!(atport_error, AtPortError::Io(_)));

        let executor_error: ExecutorError = TransportError::AlreadyOpen.into();
        assert!(matches!(executor_error, ExecutorError::Transport(TransportError::AlreadyOpen)));

        let atport_error: AtPortError = ExecutorError::StreamClosed.into();
        assert!(matches!(atport_error, AtPortError::Executor(ExecutorError::StreamClosed)));
    }

    #[test]
    fn test_write_failure_keeps_cause() {
        let error = ExecutorError::WriteFailed(TransportError::DrainFailed {
            message: "tcdrain: I/O error".to_string(),
        });

        let source = error.source().expect("write failure carries its cause");
        assert!(source.to_string().contains("tcdrain"));
        assert!(error.to_string().contains("Command write failed"));
    }

    #[test]
    fn test_never_terminated_formatting() {
        let error = ExecutorError::ExchangeNeverTerminated {
            terminator: Some("OK".to_string()),
            waited: Duration::from_millis(2500),
        };

        let display = error.to_string();
        assert!(display.contains("2.5s"));
        assert!(display.contains("\"OK\""));
    }

    #[test]
    fn test_transparent_variants_keep_message() {
        let error: AtPortError = TransportError::OpenFailed {
            path: "/dev/ttyUSB9".to_string(),
            message: "No such file or directory".to_string(),
        }
        .into();

        assert_eq!(error.to_string(), "Failed to open '/dev/ttyUSB9': No such file or directory");
    }

    #[tokio::test]
    async fn test_async_error_propagation() {
        async fn failing_exchange() -> Result<String, ExecutorError> {
            Err(ExecutorError::StreamClosed)
        }

        async fn calling_function() -> AtPortResult<String> {
            Ok(failing_exchange().await?)
        }

        let error = calling_function().await.unwrap_err();
        assert!(error.to_string().contains("Line stream closed"));
    }

    #[test]
    fn test_error_size() {
        let error_size = std::mem::size_of::<AtPortError>();
        assert!(error_size <= 128, "AtPortError too large: {} bytes", error_size);
    }
}
