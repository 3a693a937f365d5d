use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

pub const MIB: u64 = 1024 * 1024;

/// Where the service under test lives and how patient to be with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Prefix for relative resource locators.
    pub storage_url: String,
    /// Default deadline for every request (connect + headers + body).
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            storage_url: "http://127.0.0.1:9000".to_string(),
            request_timeout: Some(Duration::from_secs(60)),
            connect_timeout: Some(Duration::from_secs(3)),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        for url in [&self.base_url, &self.storage_url] {
            let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::InvalidUrl {
                    url: url.clone(),
                    reason: "expected an http:// or https:// url".to_string(),
                });
            }
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidDuration("requestTimeout"));
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidDuration("connectTimeout"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Finite set of accounts shared out to workers by `(worker_id - 1) % len`.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    entries: Arc<[Credentials]>,
}

impl CredentialPool {
    pub fn new(entries: Vec<Credentials>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::EmptyCredentialPool);
        }
        Ok(Self {
            entries: entries.into(),
        })
    }

    /// `count` accounts built from a template where `{i}` is replaced by `start..start+count`.
    pub fn templated(email: &str, password: &str, start: u64, count: u64) -> Result<Self> {
        let entries = (start..start.saturating_add(count))
            .map(|i| Credentials {
                email: email.replace("{i}", &i.to_string()),
                password: password.replace("{i}", &i.to_string()),
            })
            .collect();
        Self::new(entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Credentials for a 1-based worker id.
    #[must_use]
    pub fn for_worker(&self, worker_id: u64) -> Credentials {
        let idx = (worker_id.saturating_sub(1) % self.entries.len() as u64) as usize;
        self.entries[idx].clone()
    }
}

impl Default for CredentialPool {
    fn default() -> Self {
        Self {
            entries: (1..=500)
                .map(|i| Credentials {
                    email: format!("testuser{i}@test.com"),
                    password: "123456ab".to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeConfig {
    /// Fixed resource; `None` picks one at random from the recommended list.
    pub resource_id: Option<i64>,
    /// Bytes requested by the partial download.
    pub range_bytes: u64,
}

impl Default for ConsumeConfig {
    fn default() -> Self {
        Self {
            resource_id: None,
            range_bytes: MIB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceConfig {
    pub payload_size: u64,
    /// Payloads at or above this size are checked by length only.
    pub hash_ceiling: u64,
    /// Pause after the upload and again before verification.
    pub settle_delay: Duration,
    pub styles: Vec<String>,
}

impl Default for ProduceConfig {
    fn default() -> Self {
        Self {
            payload_size: 30 * MIB,
            hash_ceiling: 100 * MIB,
            settle_delay: Duration::from_secs(1),
            styles: [
                "pop",
                "rock",
                "electronic",
                "classical",
                "jazz",
                "folk",
                "hiphop",
                "other",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractConfig {
    /// Operations per worker; collect and comment alternate, starting with collect.
    pub operations: u64,
    pub delay: Duration,
    /// Per-operation deadline.
    pub timeout: Duration,
    /// Target resources. Empty means "discover from the recommended list".
    pub pool: Vec<i64>,
}

impl Default for InteractConfig {
    fn default() -> Self {
        Self {
            operations: 10,
            delay: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
            pool: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowConfig {
    Consume(ConsumeConfig),
    Produce(ProduceConfig),
    Interact(InteractConfig),
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::Consume(ConsumeConfig::default())
    }
}

/// Produce workers each hold a full payload in memory, so an unbounded fan-out of them
/// scales memory with the worker count.
pub const DEFAULT_PRODUCE_CONCURRENCY: usize = 32;

impl WorkflowConfig {
    /// In-flight cap used when none is configured.
    #[must_use]
    pub fn default_concurrency(&self) -> Option<usize> {
        match self {
            Self::Produce(_) => Some(DEFAULT_PRODUCE_CONCURRENCY),
            Self::Consume(_) | Self::Interact(_) => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Consume(c) if c.range_bytes == 0 => Err(Error::InvalidCount("rangeBytes")),
            Self::Produce(p) if p.payload_size == 0 => Err(Error::InvalidCount("payloadSize")),
            Self::Produce(p) if p.styles.is_empty() => Err(Error::InvalidCount("styles")),
            Self::Interact(i) if i.operations == 0 => Err(Error::InvalidCount("operations")),
            Self::Interact(i) if i.timeout.is_zero() => Err(Error::InvalidDuration("timeout")),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn credentials_cycle_modulo_pool_size() {
        let pool = CredentialPool::templated("user{i}@test.com", "pw", 1, 3).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.for_worker(1).email, "user1@test.com");
        assert_eq!(pool.for_worker(3).email, "user3@test.com");
        assert_eq!(pool.for_worker(4).email, "user1@test.com");
        assert_eq!(pool.for_worker(8).email, "user2@test.com");
    }

    #[test]
    fn only_produce_is_bounded_by_default() {
        assert_eq!(
            WorkflowConfig::Produce(ProduceConfig::default()).default_concurrency(),
            Some(DEFAULT_PRODUCE_CONCURRENCY)
        );
        assert_eq!(WorkflowConfig::default().default_concurrency(), None);
        assert_eq!(
            WorkflowConfig::Interact(InteractConfig::default()).default_concurrency(),
            None
        );
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(
            CredentialPool::new(Vec::new()),
            Err(Error::EmptyCredentialPool)
        ));
        assert!(CredentialPool::templated("u{i}", "p", 1, 0).is_err());
    }

    #[test]
    fn default_pool_matches_seeded_accounts() {
        let pool = CredentialPool::default();
        assert_eq!(pool.len(), 500);
        assert_eq!(pool.for_worker(500).email, "testuser500@test.com");
        assert_eq!(pool.for_worker(501).email, "testuser1@test.com");
        assert_eq!(pool.for_worker(1).password, "123456ab");
    }

    #[test]
    fn service_config_rejects_bad_urls() {
        let cfg = ServiceConfig {
            base_url: "ftp://example.com".to_string(),
            ..ServiceConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidUrl { .. })));
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn workflow_validation() {
        let bad = WorkflowConfig::Interact(InteractConfig {
            operations: 0,
            ..InteractConfig::default()
        });
        assert!(bad.validate().is_err());
        assert!(WorkflowConfig::default().validate().is_ok());
    }
}
