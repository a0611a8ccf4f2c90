use std::path::Path;

use serde::Serializer;
use tracing::debug;

use crate::domain::{ChainResult, ResidueFeature};
use crate::dssp::{GeometryAnalyzer, ResidueGeometry, residue_code};
use crate::error::PipelineError;
use crate::structure::ChainSubstructure;

const DECIMALS: f64 = 1e5;

/// Rounds half away from zero to five decimal digits.
pub fn round5(value: f64) -> f64 {
    (value * DECIMALS).round() / DECIMALS
}

/// Unavailable relative accessibility is stored as 0.0. This is a fill value,
/// not a measurement.
pub const UNAVAILABLE_RASA: f64 = 0.0;

pub fn residue_feature(geometry: &ResidueGeometry) -> ResidueFeature {
    ResidueFeature {
        resi: residue_code(geometry.residue).to_string(),
        sstr: geometry.secondary_structure.to_uppercase().collect(),
        rasa: geometry
            .relative_accessibility
            .map(round5)
            .unwrap_or(UNAVAILABLE_RASA),
        phi: round5(geometry.phi),
        psi: round5(geometry.psi),
    }
}

/// Runs the analyzer on one detached chain.
///
/// Any analyzer failure is returned as `Extraction`; callers drop the chain and
/// carry on with the others.
pub fn extract<A: GeometryAnalyzer + ?Sized>(
    chain: &ChainSubstructure,
    analyzer: &A,
    scratch: &Path,
) -> Result<ChainResult, PipelineError> {
    let residues = analyzer
        .analyze(&chain.path, scratch)
        .map_err(|err| match err {
            PipelineError::Extraction(message) => PipelineError::Extraction(message),
            other => PipelineError::Extraction(other.to_string()),
        })?;
    let rows = residues.iter().map(residue_feature).collect::<Vec<_>>();
    debug!(
        chain = %chain.source_chain,
        ordinal = chain.ordinal,
        rows = rows.len(),
        "chain analysed"
    );
    Ok(ChainResult {
        ordinal: chain.ordinal,
        rows,
    })
}

/// Extracts every chain, keeping the ones that yield rows.
///
/// Surviving results are renumbered `1..=k` in chain order so output files have
/// no ordinal gaps.
pub fn extract_all<A: GeometryAnalyzer + ?Sized>(
    chains: &[ChainSubstructure],
    analyzer: &A,
    scratch: &Path,
) -> Vec<ChainResult> {
    chains
        .iter()
        .filter_map(|chain| match extract(chain, analyzer, scratch) {
            Ok(result) if !result.is_empty() => Some(result),
            Ok(_) => None,
            Err(err) => {
                debug!(chain = %chain.source_chain, ordinal = chain.ordinal, "{err}");
                None
            }
        })
        .enumerate()
        .map(|(index, result)| ChainResult {
            ordinal: index + 1,
            rows: result.rows,
        })
        .collect()
}

/// Plain decimal text: no exponent, always a fractional part.
pub fn format_decimal(value: f64) -> String {
    let text = format!("{value}");
    if text.contains('.') || !value.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}

pub fn serialize_decimal<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_decimal(*value))
}
