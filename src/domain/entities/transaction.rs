use std::collections::BTreeMap;
use std::fmt;

use crate::domain::entities::layer::FeatureId;

pub const INVALID_VALUE_KEY: &str = "InvalidValue";
pub const VALUE_TOO_LONG_KEY: &str = "ValueTooLong";
pub const MISSING_FEATURE_KEY: &str = "MissingFeature";
pub const STORE_FAILURE_KEY: &str = "StoreFailure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidValue,
    ValueTooLong,
    MissingFeature,
    Store,
}

impl FailureKind {
    pub fn key(self) -> &'static str {
        match self {
            FailureKind::InvalidValue => INVALID_VALUE_KEY,
            FailureKind::ValueTooLong => VALUE_TOO_LONG_KEY,
            FailureKind::MissingFeature => MISSING_FEATURE_KEY,
            FailureKind::Store => STORE_FAILURE_KEY,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one begin/commit unit of work, keyed by the feature that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionResult {
    pub total_success: usize,
    pub total_failure: usize,
    pub failure_reasons: BTreeMap<FeatureId, FailureReason>,
}

impl TransactionResult {
    pub fn record_success(&mut self) {
        self.total_success += 1;
    }

    pub fn record_failure(&mut self, feature_id: FeatureId, reason: FailureReason) {
        self.total_failure += 1;
        self.failure_reasons.insert(feature_id, reason);
    }

    /// Folds a later result into this one; a feature failing twice keeps the
    /// first reason and is only counted once.
    pub fn merge(&mut self, other: TransactionResult) {
        self.total_success += other.total_success;
        for (feature_id, reason) in other.failure_reasons {
            if !self.failure_reasons.contains_key(&feature_id) {
                self.record_failure(feature_id, reason);
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        self.total_failure > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    NothingToCommit,
    Committed,
    RolledBack,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_counts_each_failed_feature_once() {
        let mut first = TransactionResult::default();
        first.record_failure(
            FeatureId::from("1"),
            FailureReason::new(FailureKind::InvalidValue, "bad"),
        );

        let mut second = TransactionResult::default();
        second.record_success();
        second.record_failure(
            FeatureId::from("1"),
            FailureReason::new(FailureKind::ValueTooLong, "long"),
        );
        second.record_failure(
            FeatureId::from("2"),
            FailureReason::new(FailureKind::ValueTooLong, "long"),
        );

        first.merge(second);

        assert_eq!(first.total_success, 1);
        assert_eq!(first.total_failure, 2);
        assert_eq!(
            first.failure_reasons[&FeatureId::from("1")].kind,
            FailureKind::InvalidValue
        );
    }
}
