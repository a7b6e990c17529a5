// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Configuration for the collection mover

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::watch;

/// Default bind address for the HTTP server.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Mover configuration loaded from environment variables or JSON file
///
/// Configuration can be loaded from:
/// 1. Environment variables (primary method, see `from_env()`)
/// 2. JSON config file (for SIGUSR1-based reloading, see `from_file()`)
///
/// The JSON config file supports the fields that are safe to change at
/// runtime. New jobs pick up a reload; running jobs keep the settings they
/// were dispatched with.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MoverConfig {
    /// HTTP bind address
    /// Note: This field is NOT reloadable - changes require restart
    #[serde(skip)]
    pub bind_address: String,

    /// Number of demo companies seeded at start-up
    /// Note: This field is NOT reloadable - changes require restart
    #[serde(skip)]
    pub seed_company_count: u64,

    /// Per-subscriber event buffer; a subscriber further behind than this
    /// loses its oldest progress events
    /// Note: This field is NOT reloadable - changes require restart
    #[serde(skip)]
    pub event_buffer: usize,

    /// Companies per chunk
    pub chunk_size: usize,

    /// Retries of a failing chunk before the job fails
    pub max_chunk_retries: u32,

    /// First retry delay, doubled on every further retry
    pub retry_base_delay_ms: u64,

    /// Upper bound of the retry delay
    pub retry_max_delay_ms: u64,

    /// How long finished jobs stay queryable
    pub job_retention_secs: u64,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            seed_company_count: 10_000,
            event_buffer: 16,
            chunk_size: 100,
            max_chunk_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2_000,
            job_retention_secs: 300,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        None => Ok(default),
    }
}

impl MoverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source (`from_env` passes the
    /// process environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            seed_company_count: parse_var(
                &lookup,
                "SEED_COMPANY_COUNT",
                defaults.seed_company_count,
            )?,
            event_buffer: parse_var(&lookup, "EVENT_BUFFER", defaults.event_buffer)?,
            chunk_size: parse_var(&lookup, "CHUNK_SIZE", defaults.chunk_size)?,
            max_chunk_retries: parse_var(&lookup, "MAX_CHUNK_RETRIES", defaults.max_chunk_retries)?,
            retry_base_delay_ms: parse_var(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            )?,
            retry_max_delay_ms: parse_var(
                &lookup,
                "RETRY_MAX_DELAY_MS",
                defaults.retry_max_delay_ms,
            )?,
            job_retention_secs: parse_var(
                &lookup,
                "JOB_RETENTION_SECS",
                defaults.job_retention_secs,
            )?,
        };

        Ok(config.normalized())
    }

    /// Load configuration from a JSON file
    ///
    /// This is used for runtime configuration reloading via SIGUSR1.
    /// Non-reloadable fields keep their defaults here and are ignored by
    /// `merge_reloadable`.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Clamp sizes that must be at least one.
    fn normalized(mut self) -> Self {
        self.chunk_size = self.chunk_size.max(1);
        self.event_buffer = self.event_buffer.max(1);
        self
    }

    /// Merge runtime-reloadable fields from another config
    pub fn merge_reloadable(&mut self, other: &MoverConfig) {
        self.chunk_size = other.chunk_size.max(1);
        self.max_chunk_retries = other.max_chunk_retries;
        self.retry_base_delay_ms = other.retry_base_delay_ms;
        self.retry_max_delay_ms = other.retry_max_delay_ms;
        self.job_retention_secs = other.job_retention_secs;
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    /// Start watching for SIGUSR1 to reload config from file
    ///
    /// When SIGUSR1 is received, the config file is re-read and the merged
    /// configuration is sent to subscribers via the watch channel.
    #[cfg(unix)]
    pub async fn start_config_watcher(
        config_file: std::path::PathBuf,
        current_config: Self,
        config_tx: watch::Sender<Self>,
    ) {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigusr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGUSR1 handler");
                return;
            }
        };

        let mut config = current_config;

        loop {
            sigusr1.recv().await;
            tracing::info!(
                config_file = %config_file.display(),
                "Received SIGUSR1, reloading config"
            );

            match Self::from_file(&config_file).await {
                Ok(new_config) => {
                    config.merge_reloadable(&new_config);

                    if config_tx.send(config.clone()).is_err() {
                        tracing::warn!("No config subscribers, reload had no effect");
                    } else {
                        tracing::info!(
                            chunk_size = config.chunk_size,
                            max_chunk_retries = config.max_chunk_retries,
                            job_retention_secs = config.job_retention_secs,
                            "Config reloaded successfully"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        config_file = %config_file.display(),
                        "Failed to reload config"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = MoverConfig::from_lookup(|_| None).expect("defaults");
        assert_eq!(config, MoverConfig::default());
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
    }

    #[test]
    fn variables_override_defaults() {
        let config = MoverConfig::from_lookup(lookup_from(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("CHUNK_SIZE", "25"),
            ("EVENT_BUFFER", "0"),
            ("JOB_RETENTION_SECS", " 60 "),
        ]))
        .expect("parse");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.event_buffer, 1);
        assert_eq!(config.job_retention(), Duration::from_secs(60));
    }

    #[test]
    fn bad_number_names_the_variable() {
        let err = MoverConfig::from_lookup(lookup_from(&[("MAX_CHUNK_RETRIES", "lots")]))
            .expect_err("not a number");
        assert!(err.to_string().contains("MAX_CHUNK_RETRIES"));
    }

    #[test]
    fn file_config_only_needs_changed_fields() {
        let config: MoverConfig =
            serde_json::from_str(r#"{"chunk_size": 10, "bind_address": "ignored"}"#)
                .expect("parse");
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.max_chunk_retries, 3);
    }

    #[test]
    fn merge_reloadable_preserves_startup_fields() {
        let mut original = MoverConfig {
            bind_address: "127.0.0.1:1".to_string(),
            seed_company_count: 5,
            event_buffer: 4,
            ..Default::default()
        };
        let new_config = MoverConfig {
            bind_address: "0.0.0.0:2".to_string(),
            seed_company_count: 50,
            event_buffer: 64,
            chunk_size: 0,
            max_chunk_retries: 1,
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 50,
            job_retention_secs: 10,
        };

        original.merge_reloadable(&new_config);

        assert_eq!(original.bind_address, "127.0.0.1:1");
        assert_eq!(original.seed_company_count, 5);
        assert_eq!(original.event_buffer, 4);
        assert_eq!(original.chunk_size, 1);
        assert_eq!(original.max_chunk_retries, 1);
        assert_eq!(original.job_retention_secs, 10);
    }

    #[tokio::test]
    async fn from_file_reads_json() {
        let path = std::env::temp_dir().join(format!(
            "collection-mover-config-{}.json",
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&path, r#"{"job_retention_secs": 1}"#)
            .await
            .expect("write");

        let config = MoverConfig::from_file(&path).await.expect("load");
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(config.job_retention_secs, 1);
    }
}
