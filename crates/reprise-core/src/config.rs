// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! State machine options, loadable from environment variables.

use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Options of an invocation state machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmOptions {
    /// Policy used to build transient run failure proposals.
    pub retry_policy: RetryPolicy,
}

impl VmOptions {
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Load options from environment variables.
    ///
    /// Optional (with defaults):
    /// - `REPRISE_RETRY_INITIAL_INTERVAL_MS`: first retry delay (default: 50)
    /// - `REPRISE_RETRY_FACTOR`: exponential factor (default: 2.0)
    /// - `REPRISE_RETRY_MAX_INTERVAL_MS`: delay cap (default: none)
    /// - `REPRISE_RETRY_MAX_ATTEMPTS`: attempts before giving up (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let initial_interval_ms: u64 = parse_var(
            "REPRISE_RETRY_INITIAL_INTERVAL_MS",
            "must be a number of milliseconds",
        )?
        .unwrap_or(50);

        let factor: f64 = parse_var("REPRISE_RETRY_FACTOR", "must be a number >= 1.0")?
            .unwrap_or(2.0);
        if factor.is_nan() || factor < 1.0 {
            return Err(ConfigError::Invalid(
                "REPRISE_RETRY_FACTOR",
                "must be a number >= 1.0",
            ));
        }

        let max_interval_ms: Option<u64> = parse_var(
            "REPRISE_RETRY_MAX_INTERVAL_MS",
            "must be a number of milliseconds",
        )?;

        let max_attempts: Option<u32> =
            parse_var("REPRISE_RETRY_MAX_ATTEMPTS", "must be a positive integer")?;
        if max_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "REPRISE_RETRY_MAX_ATTEMPTS",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            retry_policy: RetryPolicy {
                initial_interval: Duration::from_millis(initial_interval_ms),
                factor,
                max_interval: max_interval_ms.map(Duration::from_millis),
                max_attempts,
            },
        })
    }
}

/// Reads and parses an optional environment variable.
pub fn parse_var<T: std::str::FromStr>(
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name, expected)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 4] = [
        "REPRISE_RETRY_INITIAL_INTERVAL_MS",
        "REPRISE_RETRY_FACTOR",
        "REPRISE_RETRY_MAX_INTERVAL_MS",
        "REPRISE_RETRY_MAX_ATTEMPTS",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        /// Starts from a clean slate for every variable read by `from_env`.
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for var in VARS {
                guard.remove(var);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_options_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let options = VmOptions::from_env().unwrap();
        assert_eq!(options, VmOptions::default());
    }

    #[test]
    fn test_options_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("REPRISE_RETRY_INITIAL_INTERVAL_MS", "100");
        guard.set("REPRISE_RETRY_FACTOR", "1.5");
        guard.set("REPRISE_RETRY_MAX_INTERVAL_MS", "2000");
        guard.set("REPRISE_RETRY_MAX_ATTEMPTS", "5");

        let policy = VmOptions::from_env().unwrap().retry_policy;
        assert_eq!(policy.initial_interval, Duration::from_millis(100));
        assert_eq!(policy.factor, 1.5);
        assert_eq!(policy.max_interval, Some(Duration::from_millis(2000)));
        assert_eq!(policy.max_attempts, Some(5));
    }

    #[test]
    fn test_invalid_factor() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("REPRISE_RETRY_FACTOR", "0.5");
        let err = VmOptions::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("REPRISE_RETRY_FACTOR", _)));

        guard.set("REPRISE_RETRY_FACTOR", "fast");
        assert!(VmOptions::from_env().is_err());
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("REPRISE_RETRY_MAX_ATTEMPTS", "0");
        let err = VmOptions::from_env().unwrap_err();
        assert!(err.to_string().contains("REPRISE_RETRY_MAX_ATTEMPTS"));
    }
}
