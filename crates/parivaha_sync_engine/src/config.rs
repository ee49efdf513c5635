//! Configuration for the sync engine.
//!
//! [`SyncConfig`] is deserialized through [`SyncConfigFile`] and validated
//! on load, so an engine never runs with an inconsistent configuration.

use crate::error::{SyncError, SyncResult};
use crate::mapping::FieldMapping;
use parivaha_model::Side;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How conflicting changes are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// The side with the later change timestamp wins.
    #[default]
    LastWriteWins,
    /// Every conflict is deferred to the user.
    Manual,
    /// One-sided field changes merge; true conflicts fall back to last-write-wins.
    FieldMerge,
}

impl ConflictPolicy {
    /// Returns true if this policy resolves conflicts without the user.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictPolicy::Manual)
    }
}

/// Which sides a pass may write to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    /// Both ways.
    #[default]
    Bidirectional,
    /// Notion to vault only.
    Pull,
    /// Vault to Notion only.
    Push,
}

impl SyncDirection {
    /// Returns true if a pass in this direction may write to `side`.
    pub fn writes_to(self, side: Side) -> bool {
        match self {
            SyncDirection::Bidirectional => true,
            SyncDirection::Pull => side == Side::Vault,
            SyncDirection::Push => side == Side::Notion,
        }
    }
}

/// Configuration for sync passes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "SyncConfigFile")]
pub struct SyncConfig {
    /// Field mapping rules.
    pub field_mapping: FieldMapping,
    /// Conflict resolution policy.
    pub conflict_policy: ConflictPolicy,
    /// Winner when both change timestamps are equal.
    pub tie_breaker: Side,
    /// Maximum records written in parallel.
    pub concurrency_limit: usize,
    /// Retry configuration for adapter writes.
    pub retry: RetryConfig,
    /// Which sides may be written.
    pub direction: SyncDirection,
}

impl SyncConfig {
    /// Creates a configuration with default policies.
    pub fn new(field_mapping: FieldMapping) -> Self {
        Self {
            field_mapping,
            conflict_policy: ConflictPolicy::default(),
            tie_breaker: Side::Notion,
            concurrency_limit: 4,
            retry: RetryConfig::default(),
            direction: SyncDirection::default(),
        }
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the tie-breaking side.
    pub fn with_tie_breaker(mut self, side: Side) -> Self {
        self.tie_breaker = side;
        self
    }

    /// Sets the concurrency limit.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Checks the configuration for consistency.
    pub fn validate(&self) -> SyncResult<()> {
        if self.concurrency_limit == 0 {
            return Err(SyncError::Config("concurrency_limit must be at least 1".into()));
        }
        self.retry.validate()?;
        self.field_mapping
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(FieldMapping::default())
    }
}

/// Serialized form of [`SyncConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfigFile {
    /// Field mapping rules.
    pub field_mapping: FieldMapping,
    /// Conflict resolution policy.
    pub conflict_policy: ConflictPolicy,
    /// Winner when both change timestamps are equal.
    pub tie_breaker: Side,
    /// Maximum records written in parallel.
    pub concurrency_limit: usize,
    /// Retry policy.
    pub retry_policy: RetryPolicyFile,
    /// Which sides may be written.
    pub direction: SyncDirection,
}

impl Default for SyncConfigFile {
    fn default() -> Self {
        Self {
            field_mapping: FieldMapping::default(),
            conflict_policy: ConflictPolicy::default(),
            tie_breaker: Side::Notion,
            concurrency_limit: 4,
            retry_policy: RetryPolicyFile::default(),
            direction: SyncDirection::default(),
        }
    }
}

impl TryFrom<SyncConfigFile> for SyncConfig {
    type Error = SyncError;

    fn try_from(file: SyncConfigFile) -> SyncResult<Self> {
        let config = SyncConfig {
            field_mapping: file.field_mapping,
            conflict_policy: file.conflict_policy,
            tie_breaker: file.tie_breaker,
            concurrency_limit: file.concurrency_limit,
            retry: file.retry_policy.into(),
            direction: file.direction,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Serialized form of [`RetryConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicyFile {
    /// Maximum attempts, including the first one.
    pub max_attempts: u32,
    /// Initial backoff in milliseconds.
    pub backoff_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Whether to add jitter.
    pub jitter: bool,
}

impl Default for RetryPolicyFile {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            backoff_ms: retry.initial_delay.as_millis() as u64,
            max_backoff_ms: retry.max_delay.as_millis() as u64,
            multiplier: retry.backoff_multiplier,
            jitter: retry.add_jitter,
        }
    }
}

impl From<RetryPolicyFile> for RetryConfig {
    fn from(file: RetryPolicyFile) -> Self {
        RetryConfig {
            max_attempts: file.max_attempts,
            initial_delay: Duration::from_millis(file.backoff_ms),
            max_delay: Duration::from_millis(file.max_backoff_ms),
            backoff_multiplier: file.multiplier,
            add_jitter: file.jitter,
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    fn validate(&self) -> SyncResult<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config("retry max_attempts must be at least 1".into()));
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(SyncError::Config("retry multiplier must be >= 1".into()));
        }
        if self.max_delay < self.initial_delay {
            return Err(SyncError::Config(
                "retry max_backoff_ms must not be below backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
