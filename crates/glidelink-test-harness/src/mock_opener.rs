//! Scripted [`PortOpener`] for registry tests.
//!
//! Register a [`MockTransport`] per [`PortConfig`]; `open_port` hands out the
//! first registered transport whose config equals the requested one and
//! records every attempt. Configs without a registered transport (or
//! registered with [`MockPortOpener::fail`]) fail with
//! [`Error::OpenFailed`].

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use glidelink_core::config::PortConfig;
use glidelink_core::error::{Error, Result};
use glidelink_core::transport::{PortOpener, Transport};

use crate::mock_transport::MockTransport;

#[derive(Debug, Default)]
pub struct MockPortOpener {
    ports: Mutex<Vec<(PortConfig, Option<MockTransport>)>>,
    attempts: Mutex<Vec<PortConfig>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `transport` the next time `config` is opened.
    pub fn with_port(self, config: PortConfig, transport: MockTransport) -> Self {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((config, Some(transport)));
        self
    }

    /// Make the next open of `config` fail.
    pub fn fail(self, config: PortConfig) -> Self {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((config, None));
        self
    }

    /// Every config `open_port` was called with, in order.
    pub fn attempts(&self) -> Vec<PortConfig> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PortOpener for MockPortOpener {
    async fn open_port(&self, config: &PortConfig) -> Result<Box<dyn Transport>> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config.clone());

        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        let position = ports.iter().position(|(c, _)| c == config);
        match position.map(|i| ports.remove(i)) {
            Some((_, Some(transport))) => Ok(Box::new(transport)),
            _ => Err(Error::OpenFailed(format!("no mock port for {config}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_registered_ports_once() {
        let config = PortConfig::Serial {
            index: 0,
            baud_rate: 4800,
        };
        let opener = MockPortOpener::new().with_port(config.clone(), MockTransport::new());

        assert!(opener.open_port(&config).await.is_ok());
        let second = opener.open_port(&config).await;
        assert!(matches!(second, Err(Error::OpenFailed(_))));
        assert_eq!(opener.attempts().len(), 2);
    }

    #[tokio::test]
    async fn fail_makes_open_fail() {
        let opener = MockPortOpener::new().fail(PortConfig::Internal);
        let result = opener.open_port(&PortConfig::Internal).await;
        assert!(matches!(result, Err(Error::OpenFailed(_))));
    }
}
