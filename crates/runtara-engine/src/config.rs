// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::env;
use std::time::Duration;

/// Tuning parameters for the asynchronous task executor's worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncTaskExecutorConfig {
    /// Worker threads of the pool's runtime.
    pub core_pool_size: usize,
    /// Upper bound on threads running tasks at the same time.
    pub max_pool_size: usize,
    /// How long an idle task thread waits for work before exiting.
    pub keep_alive: Duration,
    /// Tasks admitted beyond `max_pool_size` while every thread is busy.
    pub queue_capacity: usize,
    /// Worker thread name; `%d` is replaced by a per-pool counter.
    pub thread_name_format: String,
    /// Whether idle task threads exit after `keep_alive`; otherwise they
    /// live as long as the pool.
    pub allow_core_thread_timeout: bool,
    /// How long `shutdown` waits for in-flight work.
    pub await_termination: Duration,
}

impl Default for AsyncTaskExecutorConfig {
    fn default() -> Self {
        Self {
            core_pool_size: 8,
            max_pool_size: 8,
            keep_alive: Duration::from_secs(5),
            queue_capacity: 2048,
            thread_name_format: "runtara-engine-task-%d".to_string(),
            allow_core_thread_timeout: true,
            await_termination: Duration::from_secs(60),
        }
    }
}

impl AsyncTaskExecutorConfig {
    /// Set the core pool size.
    pub fn with_core_pool_size(mut self, size: usize) -> Self {
        self.core_pool_size = size;
        self
    }

    /// Set the maximum pool size.
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the idle keep-alive.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the bounded queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the worker thread name pattern.
    pub fn with_thread_name_format(mut self, format: impl Into<String>) -> Self {
        self.thread_name_format = format.into();
        self
    }

    /// Allow or forbid idle task threads to exit.
    pub fn with_allow_core_thread_timeout(mut self, allow: bool) -> Self {
        self.allow_core_thread_timeout = allow;
        self
    }

    /// Set the graceful shutdown wait.
    pub fn with_await_termination(mut self, wait: Duration) -> Self {
        self.await_termination = wait;
        self
    }

    /// Check the pool bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.core_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "core_pool_size",
                "must be at least 1",
            ));
        }
        if self.max_pool_size < self.core_pool_size {
            return Err(ConfigError::Invalid(
                "max_pool_size",
                "must not be smaller than core_pool_size",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `RUNTARA_ENGINE_CORE_POOL_SIZE` (default: 8)
    /// - `RUNTARA_ENGINE_MAX_POOL_SIZE` (default: 8)
    /// - `RUNTARA_ENGINE_QUEUE_CAPACITY` (default: 2048)
    /// - `RUNTARA_ENGINE_KEEP_ALIVE_MS` (default: 5000)
    /// - `RUNTARA_ENGINE_ALLOW_CORE_THREAD_TIMEOUT` (default: true)
    /// - `RUNTARA_ENGINE_THREAD_NAME_FORMAT` (default: `runtara-engine-task-%d`)
    /// - `RUNTARA_ENGINE_AWAIT_TERMINATION_MS` (default: 60000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            core_pool_size: parse_var(
                "RUNTARA_ENGINE_CORE_POOL_SIZE",
                defaults.core_pool_size,
                "must be a positive integer",
            )?,
            max_pool_size: parse_var(
                "RUNTARA_ENGINE_MAX_POOL_SIZE",
                defaults.max_pool_size,
                "must be a positive integer",
            )?,
            keep_alive: Duration::from_millis(parse_var(
                "RUNTARA_ENGINE_KEEP_ALIVE_MS",
                defaults.keep_alive.as_millis() as u64,
                "must be a duration in milliseconds",
            )?),
            queue_capacity: parse_var(
                "RUNTARA_ENGINE_QUEUE_CAPACITY",
                defaults.queue_capacity,
                "must be a positive integer",
            )?,
            thread_name_format: env::var("RUNTARA_ENGINE_THREAD_NAME_FORMAT")
                .unwrap_or(defaults.thread_name_format),
            allow_core_thread_timeout: parse_bool(
                "RUNTARA_ENGINE_ALLOW_CORE_THREAD_TIMEOUT",
                defaults.allow_core_thread_timeout,
            )?,
            await_termination: Duration::from_millis(parse_var(
                "RUNTARA_ENGINE_AWAIT_TERMINATION_MS",
                defaults.await_termination.as_millis() as u64,
                "must be a duration in milliseconds",
            )?),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool settings.
    pub executor: AsyncTaskExecutorConfig,
    /// Whether engine events (message received, compensate, ...) are dispatched.
    pub event_dispatcher_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executor: AsyncTaskExecutorConfig::default(),
            event_dispatcher_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the executor variables plus
    /// `RUNTARA_ENGINE_EVENT_DISPATCHER_ENABLED` (default: true).
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            executor: AsyncTaskExecutorConfig::from_env()?,
            event_dispatcher_enabled: parse_bool("RUNTARA_ENGINE_EVENT_DISPATCHER_ENABLED", true)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &'static str,
    default: T,
    hint: &'static str,
) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(key, hint)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid(key, "must be true or false")),
        },
        Err(_) => Ok(default),
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

    const KEYS: [&str; 8] = [
        "RUNTARA_ENGINE_CORE_POOL_SIZE",
        "RUNTARA_ENGINE_MAX_POOL_SIZE",
        "RUNTARA_ENGINE_QUEUE_CAPACITY",
        "RUNTARA_ENGINE_KEEP_ALIVE_MS",
        "RUNTARA_ENGINE_ALLOW_CORE_THREAD_TIMEOUT",
        "RUNTARA_ENGINE_THREAD_NAME_FORMAT",
        "RUNTARA_ENGINE_AWAIT_TERMINATION_MS",
        "RUNTARA_ENGINE_EVENT_DISPATCHER_ENABLED",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for key in KEYS {
                guard.remove(key);
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
    fn test_defaults() {
        let config = AsyncTaskExecutorConfig::default();
        assert_eq!(config.core_pool_size, 8);
        assert_eq!(config.max_pool_size, 8);
        assert_eq!(config.queue_capacity, 2048);
        assert_eq!(config.keep_alive, Duration::from_secs(5));
        assert_eq!(config.await_termination, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.executor, AsyncTaskExecutorConfig::default());
        assert!(config.event_dispatcher_enabled);
    }

    #[test]
    fn test_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("RUNTARA_ENGINE_CORE_POOL_SIZE", "2");
        guard.set("RUNTARA_ENGINE_MAX_POOL_SIZE", "4");
        guard.set("RUNTARA_ENGINE_QUEUE_CAPACITY", "16");
        guard.set("RUNTARA_ENGINE_KEEP_ALIVE_MS", "250");
        guard.set("RUNTARA_ENGINE_ALLOW_CORE_THREAD_TIMEOUT", "false");
        guard.set("RUNTARA_ENGINE_THREAD_NAME_FORMAT", "jobs-%d");
        guard.set("RUNTARA_ENGINE_AWAIT_TERMINATION_MS", "1000");
        guard.set("RUNTARA_ENGINE_EVENT_DISPATCHER_ENABLED", "0");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.executor.core_pool_size, 2);
        assert_eq!(config.executor.max_pool_size, 4);
        assert_eq!(config.executor.queue_capacity, 16);
        assert_eq!(config.executor.keep_alive, Duration::from_millis(250));
        assert!(!config.executor.allow_core_thread_timeout);
        assert_eq!(config.executor.thread_name_format, "jobs-%d");
        assert_eq!(config.executor.await_termination, Duration::from_secs(1));
        assert!(!config.event_dispatcher_enabled);
    }

    #[test]
    fn test_from_env_invalid_pool_size() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("RUNTARA_ENGINE_CORE_POOL_SIZE", "lots");

        let err = AsyncTaskExecutorConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("RUNTARA_ENGINE_CORE_POOL_SIZE", _)
        ));
    }

    #[test]
    fn test_from_env_max_below_core() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("RUNTARA_ENGINE_CORE_POOL_SIZE", "4");
        guard.set("RUNTARA_ENGINE_MAX_POOL_SIZE", "2");

        let err = AsyncTaskExecutorConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("max_pool_size"));
    }

    #[test]
    fn test_builder_setters_are_independent() {
        let config = AsyncTaskExecutorConfig::default()
            .with_core_pool_size(1)
            .with_max_pool_size(1)
            .with_queue_capacity(1);

        assert_eq!(config.core_pool_size, 1);
        assert_eq!(config.max_pool_size, 1);
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.keep_alive, Duration::from_secs(5));
        assert_eq!(config.thread_name_format, "runtara-engine-task-%d");
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let config = AsyncTaskExecutorConfig::default().with_queue_capacity(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("queue_capacity", _))
        ));
    }
}
