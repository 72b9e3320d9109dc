//! Threshold checks over subtyping statistics and per-tile results

use crate::{QcError, QcResult, QcStatus, ResultsTable, SiteCoverage, Subtype, SubtypingParams};
use std::fmt;

/// Outcome of a single QC check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check detected a problem
    Fired { status: QcStatus, message: String },
    /// The check does not apply to this result
    NotApplicable,
}

impl CheckOutcome {
    pub fn fired(status: QcStatus, message: impl Into<String>) -> Self {
        CheckOutcome::Fired {
            status,
            message: message.into(),
        }
    }
}

/// Why a subtype call was judged to be mixed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixedReason {
    InconsistentCalls,
    ExcessTiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtypeConfidence {
    Confident,
    Mixed(MixedReason),
}

impl fmt::Display for SubtypeConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubtypeConfidence::Confident => f.write_str("OK"),
            SubtypeConfidence::Mixed(_) => f.write_str("Mixed subtype"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCount {
    Sufficient,
    Insufficient,
}

impl fmt::Display for TileCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileCount::Sufficient => f.write_str("OK"),
            TileCount::Insufficient => f.write_str("Insufficient number of tiles"),
        }
    }
}

/// Baseline number of tiles a clean sample of the called subtype should match
pub fn expected_tiles(st: &Subtype) -> u64 {
    st.n_tiles_matching_all_expected.primary
}

/// Decide whether the subtype call is confident or looks like a mixed sample.
///
/// Either an explicit upstream inconsistency or a tile count at least
/// `mixed_subtype_overage` above expectation marks the call as mixed.
pub fn check_is_confident_subtype(st: &Subtype, params: &SubtypingParams) -> SubtypeConfidence {
    let expected = expected_tiles(st) as f64;

    let inconsistent = st.are_subtypes_consistent == Some(false)
        || st.inconsistent_subtypes.is_some_and(|n| n > 0);

    if inconsistent {
        SubtypeConfidence::Mixed(MixedReason::InconsistentCalls)
    } else if st.n_tiles_matching_all as f64 >= expected + expected * params.mixed_subtype_overage {
        SubtypeConfidence::Mixed(MixedReason::ExcessTiles)
    } else {
        SubtypeConfidence::Confident
    }
}

/// Decide whether enough tiles matched relative to the expected baseline
pub fn check_min_tiles_reached(st: &Subtype, params: &SubtypingParams) -> TileCount {
    let expected = expected_tiles(st) as f64;

    if st.n_tiles_matching_all as f64 <= expected - expected * params.min_tiles_shortfall {
        TileCount::Insufficient
    } else {
        TileCount::Sufficient
    }
}

fn low_coverage_note(table: &ResultsTable, params: &SubtypingParams) -> Option<String> {
    table
        .mean_hit_coverage(params.min_kmer_freq)
        .filter(|&cov| cov < params.low_coverage_depth_freq)
        .map(|cov| {
            format!(
                "Low coverage depth ({:.1} < {:.1} expected); you may need more WGS data",
                cov, params.low_coverage_depth_freq
            )
        })
}

/// Fail when materially fewer tiles matched than the subtype predicts
pub fn is_missing_tiles(st: &Subtype, table: &ResultsTable, params: &SubtypingParams) -> CheckOutcome {
    let expected = expected_tiles(st);
    if expected == 0 {
        return CheckOutcome::NotApplicable;
    }

    match check_min_tiles_reached(st, params) {
        TileCount::Sufficient => CheckOutcome::NotApplicable,
        TileCount::Insufficient => {
            let observed = st.n_tiles_matching_all.min(expected);
            let perc_missing = (expected - observed) as f64 / expected as f64 * 100.0;
            let mut message = format!(
                "{:.2}% missing tiles ({} of {} expected tiles matched); more than {:.2}% missing tiles threshold",
                perc_missing,
                st.n_tiles_matching_all,
                expected,
                params.min_tiles_shortfall * 100.0
            );
            if let Some(note) = low_coverage_note(table, params) {
                message.push_str(". ");
                message.push_str(&note);
            }
            CheckOutcome::fired(QcStatus::Fail, message)
        }
    }
}

/// Fail when the subtype call looks like a mixture of subtypes
pub fn is_mixed_subtype(st: &Subtype, _table: &ResultsTable, params: &SubtypingParams) -> CheckOutcome {
    match check_is_confident_subtype(st, params) {
        SubtypeConfidence::Confident => CheckOutcome::NotApplicable,
        SubtypeConfidence::Mixed(MixedReason::InconsistentCalls) => {
            let message = match st.inconsistent_subtypes {
                Some(n) if n > 0 => format!(
                    "Mixed subtypes found: {} inconsistent subtype calls for subtype {}",
                    n,
                    st.called_subtype().unwrap_or("-")
                ),
                _ => format!(
                    "Mixed subtypes found: tile matches are not consistent with subtype {}",
                    st.called_subtype().unwrap_or("-")
                ),
            };
            CheckOutcome::fired(QcStatus::Fail, message)
        }
        SubtypeConfidence::Mixed(MixedReason::ExcessTiles) => CheckOutcome::fired(
            QcStatus::Fail,
            format!(
                "Mixed subtype; {} tiles matched but {} expected (at least {:.2}% over expected)",
                st.n_tiles_matching_all,
                expected_tiles(st),
                params.mixed_subtype_overage * 100.0
            ),
        ),
    }
}

/// Fail when too many target sites have no matching tile at all
pub fn is_missing_too_many_target_sites(
    _st: &Subtype,
    table: &ResultsTable,
    params: &SubtypingParams,
) -> CheckOutcome {
    let sites = SiteCoverage::from_tiles(table.iter(), params.min_kmer_freq);
    if sites.total == 0 {
        return CheckOutcome::NotApplicable;
    }

    if sites.missing_fraction() > params.max_perc_missing_target_sites {
        let mut message = format!(
            "{:.2}% of target sites missing ({} of {}); more than {:.2}% missing target sites threshold",
            sites.missing_fraction() * 100.0,
            sites.missing,
            sites.total,
            params.max_perc_missing_target_sites * 100.0
        );
        if let Some(note) = low_coverage_note(table, params) {
            message.push_str(". ");
            message.push_str(&note);
        }
        CheckOutcome::fired(QcStatus::Fail, message)
    } else {
        CheckOutcome::NotApplicable
    }
}

/// Warn when target sites below the called subtype were not observed
pub fn is_missing_downstream_targets(
    st: &Subtype,
    table: &ResultsTable,
    params: &SubtypingParams,
) -> CheckOutcome {
    let Some(subtype) = st.called_subtype() else {
        return CheckOutcome::NotApplicable;
    };

    let sites = SiteCoverage::from_tiles(table.downstream_of(subtype), params.min_kmer_freq);
    // terminal subtype
    if sites.total == 0 {
        return CheckOutcome::NotApplicable;
    }

    if sites.missing_fraction() > params.max_perc_missing_downstream {
        CheckOutcome::fired(
            QcStatus::Warning,
            format!(
                "Missing downstream targets for subtype {}; {} of {} target sites without tile matches. \
                 Possibly a novel subtype or low coverage",
                subtype, sites.missing, sites.total
            ),
        )
    } else {
        CheckOutcome::NotApplicable
    }
}

/// Warn when positive tiles of a downstream subtype matched without a downstream call
pub fn is_maybe_intermediate_subtype(
    st: &Subtype,
    table: &ResultsTable,
    params: &SubtypingParams,
) -> CheckOutcome {
    let Some(subtype) = st.called_subtype() else {
        return CheckOutcome::NotApplicable;
    };

    let mut downstream_subtypes: Vec<&str> = Vec::new();
    let mut n_pos_hits = 0usize;
    for tile in table
        .downstream_of(subtype)
        .filter(|t| t.is_pos_tile && t.is_hit(params.min_kmer_freq))
    {
        n_pos_hits += 1;
        if !downstream_subtypes.contains(&tile.subtype.as_str()) {
            downstream_subtypes.push(&tile.subtype);
        }
    }

    if n_pos_hits > 0 && n_pos_hits >= params.min_ambiguous_tiles {
        downstream_subtypes.sort_unstable();
        CheckOutcome::fired(
            QcStatus::Warning,
            format!(
                "Possible intermediate subtype; {} positive tiles matched for downstream subtypes ({}) of subtype {}",
                n_pos_hits,
                downstream_subtypes.join(", "),
                subtype
            ),
        )
    } else {
        CheckOutcome::NotApplicable
    }
}

/// Warn when the mean coverage of matched tiles is low
pub fn is_overall_coverage_low(
    _st: &Subtype,
    table: &ResultsTable,
    params: &SubtypingParams,
) -> CheckOutcome {
    match low_coverage_note(table, params) {
        Some(note) => CheckOutcome::fired(QcStatus::Warning, note),
        None => CheckOutcome::NotApplicable,
    }
}

/// Validate QC thresholds
pub fn validate_subtyping_params(params: &SubtypingParams) -> QcResult<()> {
    let fractions = [
        ("mixed_subtype_overage", params.mixed_subtype_overage),
        ("min_tiles_shortfall", params.min_tiles_shortfall),
        ("max_perc_missing_target_sites", params.max_perc_missing_target_sites),
        ("max_perc_missing_downstream", params.max_perc_missing_downstream),
    ];

    for (name, value) in fractions {
        if !(0.0..1.0).contains(&value) {
            return Err(QcError::InvalidConfig(format!(
                "{} must be between 0 and 1, got {}",
                name, value
            )));
        }
    }

    if !params.low_coverage_depth_freq.is_finite() || params.low_coverage_depth_freq < 0.0 {
        return Err(QcError::InvalidConfig(
            "low_coverage_depth_freq must be a non-negative number".to_string(),
        ));
    }

    Ok(())
}
