//! Limit policies for address- and credential-based limiting.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::key::KeyKind;
use crate::error::{Result, TurnstileError};

/// Longest window, block or timeout accepted from configuration (365 days).
///
/// Keeps every deadline representable as an `Instant` and as a Redis expiry.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Reject a zero duration or one longer than [`MAX_DURATION`].
pub(crate) fn check_duration(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(TurnstileError::Config(format!("{} must be positive", name)));
    }
    if value > MAX_DURATION {
        return Err(TurnstileError::Config(format!(
            "{} of {:?} exceeds the maximum of {:?}",
            name, value, MAX_DURATION
        )));
    }
    Ok(())
}

/// A limit and the cool-down applied once the limit is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitPolicy {
    /// Maximum requests allowed within one window
    pub limit_per_window: u64,
    /// How long a subject stays blocked after exceeding the limit
    #[serde(with = "humantime_serde")]
    pub block_duration: Duration,
}

impl LimitPolicy {
    pub fn new(limit_per_window: u64, block_duration: Duration) -> Self {
        Self {
            limit_per_window,
            block_duration,
        }
    }

    fn validate(&self, kind: KeyKind) -> Result<()> {
        if self.limit_per_window == 0 {
            return Err(TurnstileError::Config(format!(
                "{} limit_per_window must be positive",
                kind
            )));
        }
        check_duration(&format!("{} block_duration", kind), self.block_duration)
    }
}

/// The two independent policies plus the fixed window length they count in.
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policies {
    /// Length of one counting window
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,

    /// Policy for requests limited by client address
    #[serde(default = "default_ip_policy")]
    pub ip: LimitPolicy,

    /// Policy for requests carrying an API credential
    #[serde(default = "default_token_policy")]
    pub token: LimitPolicy,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            window: default_window(),
            ip: default_ip_policy(),
            token: default_token_policy(),
        }
    }
}

fn default_window() -> Duration {
    Duration::from_secs(1)
}

fn default_ip_policy() -> LimitPolicy {
    LimitPolicy::new(10, Duration::from_secs(300))
}

fn default_token_policy() -> LimitPolicy {
    LimitPolicy::new(100, Duration::from_secs(300))
}

impl Policies {
    /// Select the policy bound to a key kind.
    pub fn for_kind(&self, kind: KeyKind) -> &LimitPolicy {
        match kind {
            KeyKind::Ip => &self.ip,
            KeyKind::Token => &self.token,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_duration("window", self.window)?;
        self.ip.validate(KeyKind::Ip)?;
        self.token.validate(KeyKind::Token)
    }
}
