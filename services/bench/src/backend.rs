//! Transport selection from configuration

use bench_config::{BackendConfig, BackendKind};
use message_sink::{MemoryKeyValue, MemoryTopic, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn transport_for(config: &BackendConfig) -> Arc<dyn Transport> {
    info!(kind = ?config.kind, target = %config.target, destination = %config.destination, "Selecting backend");

    match config.kind {
        BackendKind::MemoryTopic => Arc::new(MemoryTopic::with_name_and_capacity(
            config.target.clone(),
            config.queue_capacity,
        )),
        BackendKind::MemoryKv => Arc::new(MemoryKeyValue::with_visibility_delay(
            Duration::from_millis(config.visibility_delay_ms),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_selects_transport() {
        let mut config = BackendConfig::default();
        assert_eq!(transport_for(&config).name(), "memory://local");

        config.kind = BackendKind::MemoryKv;
        assert_eq!(transport_for(&config).name(), "memory-kv");
    }

    #[test]
    fn test_selected_transport_starts_disconnected() {
        let transport = transport_for(&BackendConfig::default());
        assert!(!transport.is_connected());

        tokio_test::block_on(transport.connect()).unwrap();
        assert!(transport.is_connected());
    }

    #[test]
    fn test_zero_queue_capacity_fails_on_connect() {
        let config = BackendConfig {
            queue_capacity: 0,
            ..BackendConfig::default()
        };
        let transport = transport_for(&config);

        let err = tokio_test::block_on(transport.connect()).unwrap_err();
        assert!(matches!(err, message_sink::SinkError::InvalidConfig(_)), "{}", err);
    }
}
