#![forbid(unsafe_code)]

//! Window configuration.
//!
//! [`WindowConfig`] carries the knobs that shape how a window drives its
//! reactive containers. Defaults suit interactive use; every field can be
//! overridden programmatically or from the environment:
//!
//! ```text
//! KESTREL_NOTIFY_POLICY      deferred | immediate
//! KESTREL_MAX_DRAIN_PASSES   dispatcher passes per tick (>= 1)
//! KESTREL_IGNORE_DEFAULT     1 | 0 | true | false
//! ```
//!
//! Unparsable values are ignored with a warning and the previous value kept.

use std::env;
use std::fmt;
use std::str::FromStr;

/// When change notifications reach subscribers.
///
/// One policy applies to every delivery path of every container in a window:
/// contributor mutation, resolver change, per-frame re-evaluation, and
/// explicit re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NotifyPolicy {
    /// Enqueue delivery on the window's dispatcher. Pending deliveries for
    /// one container coalesce, and run later in the same tick.
    #[default]
    Deferred,
    /// Deliver synchronously, as soon as the cache changes.
    Immediate,
}

impl NotifyPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deferred => "deferred",
            Self::Immediate => "immediate",
        }
    }
}

impl fmt::Display for NotifyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`NotifyPolicy`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePolicyError(String);

impl fmt::Display for ParsePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown notify policy: {:?}", self.0)
    }
}

impl std::error::Error for ParsePolicyError {}

impl FromStr for NotifyPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" | "defer" => Ok(Self::Deferred),
            "immediate" | "sync" => Ok(Self::Immediate),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

/// Configuration for a [`Window`](crate::window::Window).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    /// Notification delivery policy. Default: [`NotifyPolicy::Deferred`].
    pub notify_policy: NotifyPolicy,

    /// Maximum dispatcher drain passes per tick. Each pass runs only the
    /// tasks queued when it started; work queued during the last pass waits
    /// for the next tick. Values below 1 are treated as 1. Default: 4.
    pub max_drain_passes: usize,

    /// Initial value of each container's default-exclusion flag: when more
    /// than one contributor exists, the constructor-installed default does
    /// not take part in resolution. Default: true.
    pub ignore_default_if_others_exist: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            notify_policy: NotifyPolicy::Deferred,
            max_drain_passes: 4,
            ignore_default_if_others_exist: true,
        }
    }
}

impl WindowConfig {
    pub const NOTIFY_POLICY_ENV: &'static str = "KESTREL_NOTIFY_POLICY";
    pub const MAX_DRAIN_PASSES_ENV: &'static str = "KESTREL_MAX_DRAIN_PASSES";
    pub const IGNORE_DEFAULT_ENV: &'static str = "KESTREL_IGNORE_DEFAULT";

    #[must_use]
    pub fn with_notify_policy(mut self, policy: NotifyPolicy) -> Self {
        self.notify_policy = policy;
        self
    }

    #[must_use]
    pub fn with_max_drain_passes(mut self, passes: usize) -> Self {
        self.max_drain_passes = passes;
        self
    }

    #[must_use]
    pub fn with_ignore_default(mut self, ignore: bool) -> Self {
        self.ignore_default_if_others_exist = ignore;
        self
    }

    /// Drain passes actually used per tick.
    #[must_use]
    pub fn effective_drain_passes(&self) -> usize {
        self.max_drain_passes.max(1)
    }

    /// Defaults with overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    #[must_use]
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup(Self::NOTIFY_POLICY_ENV) {
            match val.parse() {
                Ok(policy) => self.notify_policy = policy,
                Err(err) => tracing::warn!(key = Self::NOTIFY_POLICY_ENV, %err, "ignoring override"),
            }
        }
        if let Some(val) = lookup(Self::MAX_DRAIN_PASSES_ENV) {
            match val.trim().parse::<usize>() {
                Ok(n) if n >= 1 => self.max_drain_passes = n,
                _ => tracing::warn!(
                    key = Self::MAX_DRAIN_PASSES_ENV,
                    value = %val,
                    "ignoring override"
                ),
            }
        }
        if let Some(val) = lookup(Self::IGNORE_DEFAULT_ENV) {
            match parse_flag(&val) {
                Some(flag) => self.ignore_default_if_others_exist = flag,
                None => tracing::warn!(
                    key = Self::IGNORE_DEFAULT_ENV,
                    value = %val,
                    "ignoring override"
                ),
            }
        }
        self
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = WindowConfig::default();
        assert_eq!(cfg.notify_policy, NotifyPolicy::Deferred);
        assert_eq!(cfg.max_drain_passes, 4);
        assert!(cfg.ignore_default_if_others_exist);
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("deferred".parse(), Ok(NotifyPolicy::Deferred));
        assert_eq!(" Immediate ".parse(), Ok(NotifyPolicy::Immediate));
        assert!("later".parse::<NotifyPolicy>().is_err());
        assert_eq!(NotifyPolicy::Immediate.to_string(), "immediate");
    }

    #[test]
    fn overrides_apply() {
        let cfg = WindowConfig::default().apply_overrides(lookup(&[
            (WindowConfig::NOTIFY_POLICY_ENV, "immediate"),
            (WindowConfig::MAX_DRAIN_PASSES_ENV, "2"),
            (WindowConfig::IGNORE_DEFAULT_ENV, "off"),
        ]));
        assert_eq!(cfg.notify_policy, NotifyPolicy::Immediate);
        assert_eq!(cfg.max_drain_passes, 2);
        assert!(!cfg.ignore_default_if_others_exist);
    }

    #[test]
    fn invalid_overrides_keep_previous_values() {
        let cfg = WindowConfig::default().apply_overrides(lookup(&[
            (WindowConfig::NOTIFY_POLICY_ENV, "sometimes"),
            (WindowConfig::MAX_DRAIN_PASSES_ENV, "0"),
            (WindowConfig::IGNORE_DEFAULT_ENV, "maybe"),
        ]));
        assert_eq!(cfg, WindowConfig::default());
    }

    #[test]
    fn drain_passes_floor_at_one() {
        let cfg = WindowConfig::default().with_max_drain_passes(0);
        assert_eq!(cfg.effective_drain_passes(), 1);
    }
}
