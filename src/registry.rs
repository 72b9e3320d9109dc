//! Ordered registry of QC checks

use crate::checks::{
    is_maybe_intermediate_subtype, is_missing_downstream_targets, is_missing_tiles,
    is_missing_too_many_target_sites, is_mixed_subtype, is_overall_coverage_low, CheckOutcome,
};
use crate::{ResultsTable, Subtype, SubtypingParams};
use std::fmt;

/// Uniform signature shared by every QC check
pub type CheckFn = fn(&Subtype, &ResultsTable, &SubtypingParams) -> CheckOutcome;

/// A named QC check
#[derive(Clone, Copy)]
pub struct QcCheck {
    pub name: &'static str,
    pub run: CheckFn,
}

impl fmt::Debug for QcCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QcCheck").field("name", &self.name).finish()
    }
}

impl QcCheck {
    pub const fn new(name: &'static str, run: CheckFn) -> Self {
        Self { name, run }
    }

    pub fn evaluate(&self, st: &Subtype, table: &ResultsTable, params: &SubtypingParams) -> CheckOutcome {
        (self.run)(st, table, params)
    }
}

/// Checks run by default, in message order
pub const DEFAULT_CHECKS: [QcCheck; 6] = [
    QcCheck::new("missing_tiles", is_missing_tiles),
    QcCheck::new("mixed_subtype", is_mixed_subtype),
    QcCheck::new("missing_too_many_target_sites", is_missing_too_many_target_sites),
    QcCheck::new("missing_downstream_targets", is_missing_downstream_targets),
    QcCheck::new("maybe_intermediate_subtype", is_maybe_intermediate_subtype),
    QcCheck::new("overall_coverage_low", is_overall_coverage_low),
];

/// Immutable, ordered sequence of checks.
///
/// The order decides how messages are concatenated; it has no effect on the
/// overall status.
#[derive(Debug, Clone)]
pub struct CheckRegistry {
    checks: Vec<QcCheck>,
}

impl CheckRegistry {
    pub fn new(checks: Vec<QcCheck>) -> Self {
        Self { checks }
    }

    pub fn iter(&self) -> impl Iterator<Item = &QcCheck> {
        self.checks.iter()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name).collect()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKS.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExpectedTiles, QcStatus};

    fn always_warn(_st: &Subtype, _table: &ResultsTable, _params: &SubtypingParams) -> CheckOutcome {
        CheckOutcome::fired(QcStatus::Warning, "always")
    }

    #[test]
    fn test_default_registry_order() {
        let registry = CheckRegistry::default();
        assert_eq!(registry.len(), 6);
        assert_eq!(
            registry.names(),
            vec![
                "missing_tiles",
                "mixed_subtype",
                "missing_too_many_target_sites",
                "missing_downstream_targets",
                "maybe_intermediate_subtype",
                "overall_coverage_low",
            ]
        );
    }

    #[test]
    fn test_custom_registry() {
        let registry = CheckRegistry::new(vec![QcCheck::new("always_warn", always_warn)]);
        assert!(!registry.is_empty());

        let st = Subtype::new("s1".to_string(), Some("1".to_string()), 10, ExpectedTiles::new(10));
        let outcome = registry
            .iter()
            .next()
            .map(|c| c.evaluate(&st, &ResultsTable::default(), &SubtypingParams::default()));
        assert_eq!(outcome, Some(CheckOutcome::fired(QcStatus::Warning, "always")));
    }
}
