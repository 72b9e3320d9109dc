//! QC aggregation: run the registry and fold verdicts into one status

use crate::checks::CheckOutcome;
use crate::registry::CheckRegistry;
use crate::{QcStatus, ResultsTable, Subtype, SubtypingParams};
use rayon::prelude::*;
use std::collections::HashMap;

pub const NO_SUBTYPE_RESULT: &str = "no subtype result";

/// Separator between individual check messages
pub const MESSAGE_DELIMITER: &str = " | ";

/// Overall QC verdict for one subtyping result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcVerdict {
    pub status: QcStatus,
    pub message: String,
}

impl QcVerdict {
    pub fn new(status: QcStatus, message: String) -> Self {
        Self { status, message }
    }

    pub fn no_subtype_result() -> Self {
        Self::new(QcStatus::Fail, NO_SUBTYPE_RESULT.to_string())
    }
}

impl Subtype {
    /// Copy a QC verdict onto this result
    pub fn apply_qc(&mut self, verdict: &QcVerdict) {
        self.qc_status = Some(verdict.status);
        self.qc_message = verdict.message.clone();
    }
}

/// Run every registered check against a subtyping result.
///
/// Fails immediately without running any check when there is no subtype
/// call or no tile results. Otherwise each fired check contributes a
/// `"<STATUS>: <message>"` entry in registry order and the overall status
/// is the most severe status among them.
pub fn perform_quality_checks(
    st: &Subtype,
    table: Option<&ResultsTable>,
    params: &SubtypingParams,
    registry: &CheckRegistry,
) -> QcVerdict {
    let table = match (st.called_subtype(), table) {
        (Some(_), Some(table)) if !table.is_empty() => table,
        _ => {
            log::warn!("Sample {}: {}", st.sample, NO_SUBTYPE_RESULT);
            return QcVerdict::no_subtype_result();
        }
    };

    let mut overall_status = QcStatus::Pass;
    let mut messages = Vec::new();

    for check in registry.iter() {
        if let CheckOutcome::Fired { status, message } = check.evaluate(st, table, params) {
            log::debug!("Sample {}: check {} -> {}", st.sample, check.name, status);
            messages.push(format!("{}: {}", status, message));
            overall_status = overall_status.max(status);
        }
    }

    QcVerdict::new(overall_status, messages.join(MESSAGE_DELIMITER))
}

/// Run QC and write the verdict back onto the subtyping result
pub fn annotate_subtype(
    st: &mut Subtype,
    table: Option<&ResultsTable>,
    params: &SubtypingParams,
    registry: &CheckRegistry,
) -> QcVerdict {
    let verdict = perform_quality_checks(st, table, params, registry);
    st.apply_qc(&verdict);
    verdict
}

/// Annotate many samples in parallel, pairing each with its own tile results
pub fn annotate_samples(
    subtypes: &mut [Subtype],
    tables: &HashMap<String, ResultsTable>,
    params: &SubtypingParams,
    registry: &CheckRegistry,
) -> Vec<QcVerdict> {
    subtypes
        .par_iter_mut()
        .map(|st| {
            let table = tables.get(&st.sample);
            if table.is_none() {
                log::warn!("Sample {}: no rows in the tile results", st.sample);
            }
            annotate_subtype(st, table, params, registry)
        })
        .collect()
}

/// Count samples per QC status
pub fn summarize_verdicts(verdicts: &[QcVerdict]) -> HashMap<QcStatus, usize> {
    let mut counts = HashMap::new();
    for verdict in verdicts {
        *counts.entry(verdict.status).or_insert(0) += 1;
    }
    counts
}
