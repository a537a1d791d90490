//! Pluggable pruning of snapshot history

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::time::Duration;

/// Decides how much of a record's history survives an upsert.
pub trait RetentionPolicy: Send + Sync + Debug {
    /// Given the history timestamps in ascending order (the snapshot being
    /// written included, as the last element), returns how many of the
    /// oldest entries to drop. Stores never drop the newest entry, whatever
    /// this returns.
    fn prune_count(&self, timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> usize;

    /// True when `prune_count` is always zero, letting stores skip gathering
    /// timestamps altogether.
    fn keeps_all(&self) -> bool {
        false
    }
}

/// Retains every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepAll;

impl RetentionPolicy for KeepAll {
    fn prune_count(&self, _timestamps: &[DateTime<Utc>], _now: DateTime<Utc>) -> usize {
        0
    }

    fn keeps_all(&self) -> bool {
        true
    }
}

/// Retains at most `n` snapshots.
#[derive(Debug, Clone, Copy)]
pub struct MaxEntries(pub usize);

impl RetentionPolicy for MaxEntries {
    fn prune_count(&self, timestamps: &[DateTime<Utc>], _now: DateTime<Utc>) -> usize {
        timestamps.len().saturating_sub(self.0.max(1))
    }
}

/// Retains snapshots no older than the given age relative to the newest write.
#[derive(Debug, Clone, Copy)]
pub struct MaxAge(pub Duration);

impl RetentionPolicy for MaxAge {
    fn prune_count(&self, timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> usize {
        let max_age = chrono::Duration::from_std(self.0).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(max_age).unwrap_or(DateTime::<Utc>::MIN_UTC);
        timestamps.partition_point(|ts| *ts < cutoff)
    }
}

/// Applies both limits; whichever prunes more wins.
#[derive(Debug, Clone, Copy)]
pub struct Combined {
    pub max_entries: MaxEntries,
    pub max_age: MaxAge,
}

impl RetentionPolicy for Combined {
    fn prune_count(&self, timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> usize {
        self.max_entries
            .prune_count(timestamps, now)
            .max(self.max_age.prune_count(timestamps, now))
    }
}

/// Clamps a policy's answer so at least the newest entry remains.
pub(crate) fn effective_prune_count(
    policy: &dyn RetentionPolicy,
    timestamps: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> usize {
    policy
        .prune_count(timestamps, now)
        .min(timestamps.len().saturating_sub(1))
}
