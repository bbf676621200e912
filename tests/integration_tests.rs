use atport::core::session::SessionStatus;
use atport::{AtPortConfig, LoopbackTransport, Session, SessionConfig, TransportError};
use std::sync::Arc;
use std::time::Duration;

/// Integration tests for the AtPort library
#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = AtPortConfig::default();
        let toml_str = toml::to_string(&config).expect("Failed to serialize config");
        let deserialized: AtPortConfig = toml::from_str(&toml_str).expect("Failed to deserialize config");

        assert_eq!(config.global.log_level, deserialized.global.log_level);
        assert_eq!(config.global.deadline_ms, deserialized.global.deadline_ms);
    }

    #[test]
    fn test_device_table_with_partial_session() {
        let config: AtPortConfig = toml::from_str(
            r#"
            [global]
            deadline_ms = 3000

            [[devices]]
            name = "gnss"
            port = "/dev/ttyUSB1"

            [devices.session]
            baud_rate = 9600
            line_terminator = "\n"
            "#,
        )
        .expect("Failed to parse config");

        let device = config.find_device("gnss").expect("device present");
        assert_eq!(device.session.baud_rate, 9600);
        assert_eq!(device.session.line_terminator, "\n");
        assert_eq!(device.session.quiet_timeout(), Duration::from_millis(1000));
        assert_eq!(config.global.deadline_ms, 3000);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (transport, device) = LoopbackTransport::pair();
        let session = Session::new("loop://lifecycle", SessionConfig::default(), Arc::new(transport));

        assert!(!session.is_open());
        assert!(matches!(session.close().await, Err(TransportError::NotOpen)));

        session.open().await.unwrap();
        assert!(session.is_open());
        assert_eq!(session.state().status, SessionStatus::Open);
        assert!(matches!(session.open().await, Err(TransportError::AlreadyOpen)));

        session.close().await.unwrap();
        assert!(!session.is_open());
        assert!(!device.is_connected());

        // Reopening gives a fresh connection
        session.open().await.unwrap();
        assert_eq!(device.open_count(), 2);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_on_reopened_session() {
        let (transport, device) = LoopbackTransport::pair();
        let device = Arc::new(device);
        let session = Session::new("loop://reopen", SessionConfig::default(), Arc::new(transport));

        for round in 0..2 {
            session.open().await.unwrap();

            let responder = {
                let device = Arc::clone(&device);
                tokio::spawn(async move {
                    device.next_write().await;
                    device.send_line(&format!("round {}", round));
                    device.send_line("OK");
                })
            };

            let response = session.execute("AT", Some("OK")).await.unwrap();
            responder.await.unwrap();
            assert_eq!(response, format!("round {}\nOK", round));

            session.close().await.unwrap();
        }

        assert_eq!(session.state().statistics.exchanges_completed, 2);
    }

    #[tokio::test]
    async fn test_line_stream_ends_on_close() {
        let (transport, device) = LoopbackTransport::pair();
        let session = Session::new("loop://stream", SessionConfig::default(), Arc::new(transport));
        session.open().await.unwrap();

        let mut lines = session.subscribe_lines();
        device.send(b"+CMTI: \"SM\",3\r\n\r\n");

        let line = lines.next().await.expect("one line");
        assert_eq!(line.as_str(), "+CMTI: \"SM\",3");

        session.close().await.unwrap();
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_open_session_releases_device() {
        let (transport, device) = LoopbackTransport::pair();
        let session = Session::new("loop://dropped", SessionConfig::default(), Arc::new(transport.clone()));
        session.open().await.unwrap();

        let mut lines = session.subscribe_lines();
        assert!(device.is_connected());

        drop(session);
        assert!(!device.is_connected());
        assert!(!device.send_line("RING"));
        assert!(lines.next().await.is_none());

        // The same device can be opened again straight away
        let reopened = Session::new("loop://dropped", SessionConfig::default(), Arc::new(transport));
        reopened.open().await.unwrap();
        assert!(device.is_connected());
        assert_eq!(device.open_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_connection_does_not_disconnect_newer_one() {
        let (transport, device) = LoopbackTransport::pair();
        let first = Session::new("loop://a", SessionConfig::default(), Arc::new(transport.clone()));
        let second = Session::new("loop://a", SessionConfig::default(), Arc::new(transport));

        first.open().await.unwrap();
        second.open().await.unwrap();
        drop(first);

        assert!(device.is_connected());
        let mut lines = second.subscribe_lines();
        assert!(device.send_line("+CREG: 1"));
        assert_eq!(lines.next().await.unwrap().as_str(), "+CREG: 1");
    }

    #[tokio::test]
    async fn test_open_failure_reported() {
        let (transport, device) = LoopbackTransport::pair();
        device.fail_open(true);
        let session = Session::new("loop://refuse", SessionConfig::default(), Arc::new(transport));

        let result = session.open().await;
        assert!(matches!(result, Err(TransportError::OpenFailed { .. })));
        assert!(!session.is_open());
    }
}
