// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK configuration for serving invocations.

use std::env;
use std::net::{Ipv4Addr, SocketAddr};

use reprise_core::VmOptions;
use reprise_protocol::MAX_FRAME_SIZE;

use crate::error::{Result, SdkError};

/// Default address the endpoint listens on.
pub const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
    9080,
);

/// SDK configuration for the invocation endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkConfig {
    /// Listen address (default: "127.0.0.1:9080")
    pub bind_addr: SocketAddr,
    /// Largest accepted frame payload in bytes (default: 64 MiB)
    pub max_message_size: usize,
    /// Options of every invocation state machine
    pub vm: VmOptions,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            max_message_size: MAX_FRAME_SIZE,
            vm: VmOptions::default(),
        }
    }
}

impl SdkConfig {
    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `REPRISE_BIND_ADDR` - Listen address (default: "127.0.0.1:9080")
    /// - `REPRISE_MAX_MESSAGE_SIZE` - Largest frame payload in bytes (default: 67108864)
    /// - `REPRISE_RETRY_*` - Run retry policy, see [`VmOptions::from_env`]
    pub fn from_env() -> Result<Self> {
        let bind_addr = match env::var("REPRISE_BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| SdkError::Config(format!("invalid REPRISE_BIND_ADDR: {}", e)))?,
            Err(_) => DEFAULT_BIND_ADDR,
        };

        let max_message_size = match env::var("REPRISE_MAX_MESSAGE_SIZE") {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(SdkError::Config(format!(
                        "invalid REPRISE_MAX_MESSAGE_SIZE: {}",
                        raw
                    )));
                }
            },
            Err(_) => MAX_FRAME_SIZE,
        };

        Ok(Self {
            bind_addr,
            max_message_size,
            vm: VmOptions::from_env()?,
        })
    }

    /// Set the listen address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the largest accepted frame payload.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_vm_options(mut self, vm: VmOptions) -> Self {
        self.vm = vm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9080".parse().unwrap());
        assert_eq!(config.max_message_size, 64 * 1024 * 1024);
        assert_eq!(config.vm, VmOptions::default());
    }

    #[test]
    fn test_builder_pattern() {
        let config = SdkConfig::default()
            .with_bind_addr("0.0.0.0:8000".parse().unwrap())
            .with_max_message_size(1024);

        assert_eq!(config.bind_addr, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.max_message_size, 1024);
    }
}
