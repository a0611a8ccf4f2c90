//! Coordinate parsing and per-chain decomposition.
//!
//! A structure is fetched as mmCIF first and legacy PDB second; the first format
//! that both downloads and parses wins. Only the first model is kept. Each chain
//! of that model is cloned out, relabelled [`CHAIN_LABEL`] and written as a
//! standalone single-chain file for DSSP.

use std::path::{Path, PathBuf};

use pdbtbx::{Format, Model, PDB, PDBError, ReadOptions, StrictnessLevel};
use tracing::{debug, trace};

use crate::domain::{PdbId, Stage, StructureFormat};
use crate::error::{FailureOrigin, PipelineError};
use crate::rcsb::StructureSource;

/// Chain id given to every detached chain.
pub const CHAIN_LABEL: &str = "A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSubstructure {
    /// 1-based position of the chain in the source model.
    pub ordinal: usize,
    pub source_chain: String,
    pub residue_count: usize,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct ParsedStructure {
    pub format: StructureFormat,
    pub pdb: PDB,
}

pub fn parse_structure(path: &Path, format: StructureFormat) -> Result<PDB, PipelineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| PipelineError::Filesystem(format!("non-utf8 path {}", path.display())))?;
    let pdb_format = match format {
        StructureFormat::Cif => Format::Mmcif,
        StructureFormat::Pdb => Format::Pdb,
    };
    let (pdb, warnings) = ReadOptions::default()
        .set_format(pdb_format)
        .set_level(StrictnessLevel::Loose)
        .set_only_first_model(true)
        .set_only_atomic_coords(true)
        .read(path_str)
        .map_err(|errors| PipelineError::Parse {
            format,
            message: join_errors(&errors),
        })?;
    for warning in &warnings {
        trace!("{warning}");
    }
    if pdb.model_count() == 0 {
        return Err(PipelineError::Parse {
            format,
            message: "structure contains no models".to_string(),
        });
    }
    Ok(pdb)
}

/// Downloads and parses `id`, falling back from mmCIF to PDB.
///
/// `on_stage` is told when each acquisition or parse begins.
pub fn acquire_structure<S: StructureSource + ?Sized>(
    id: &PdbId,
    source: &S,
    scratch: &Path,
    on_stage: &mut dyn FnMut(Stage),
) -> Result<ParsedStructure, PipelineError> {
    let mut origin = FailureOrigin::Download;
    for format in StructureFormat::FALLBACK_ORDER {
        on_stage(Stage::Acquiring);
        let path = match source.fetch(id, format, scratch) {
            Ok(path) => path,
            Err(err) => {
                debug!(%id, %format, "{err}");
                continue;
            }
        };
        on_stage(Stage::Parsing);
        match parse_structure(&path, format) {
            Ok(pdb) => return Ok(ParsedStructure { format, pdb }),
            Err(err) => {
                origin = FailureOrigin::Parse;
                debug!(%id, %format, "{err}");
            }
        }
    }
    Err(PipelineError::Structure {
        id: id.to_string(),
        origin,
    })
}

/// Writes every chain of the first model to `{dir}/{id}_{ordinal}.{ext}`.
pub fn split_chains(
    id: &PdbId,
    pdb: &PDB,
    dir: &Path,
    chain_format: StructureFormat,
) -> Result<Vec<ChainSubstructure>, PipelineError> {
    let model = pdb.model(0).ok_or_else(|| PipelineError::Parse {
        format: chain_format,
        message: "structure contains no models".to_string(),
    })?;

    model
        .chains()
        .enumerate()
        .map(|(index, chain)| {
            let ordinal = index + 1;
            let mut detached = chain.clone();
            if !detached.set_id(CHAIN_LABEL) {
                return Err(PipelineError::ChainWrite(format!(
                    "cannot relabel chain {} of {id}",
                    chain.id()
                )));
            }
            let mut wrapper_model = Model::new(model.serial_number());
            wrapper_model.add_chain(detached);
            let mut wrapper = PDB::new();
            wrapper.identifier = Some(id.to_upper());
            wrapper.add_model(wrapper_model);

            let path = dir.join(format!("{id}_{ordinal}.{}", chain_format.extension()));
            save_chain(&wrapper, &path, chain_format)?;
            Ok(ChainSubstructure {
                ordinal,
                source_chain: chain.id().to_string(),
                residue_count: chain.residue_count(),
                path,
            })
        })
        .collect()
}

/// Acquisition, parsing and splitting in one call.
pub fn parse_and_split<S: StructureSource + ?Sized>(
    id: &PdbId,
    source: &S,
    scratch: &Path,
    chain_format: StructureFormat,
) -> Result<Vec<ChainSubstructure>, PipelineError> {
    let parsed = acquire_structure(id, source, scratch, &mut |_| {})?;
    split_chains(id, &parsed.pdb, scratch, chain_format)
}

fn save_chain(pdb: &PDB, path: &Path, format: StructureFormat) -> Result<(), PipelineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| PipelineError::Filesystem(format!("non-utf8 path {}", path.display())))?;
    let result = match format {
        StructureFormat::Pdb => pdbtbx::save_pdb(pdb, path_str, StrictnessLevel::Loose),
        StructureFormat::Cif => pdbtbx::save_mmcif(pdb, path_str, StrictnessLevel::Loose),
    };
    result.map_err(|errors| PipelineError::ChainWrite(join_errors(&errors)))
}

fn join_errors(errors: &[PDBError]) -> String {
    if errors.is_empty() {
        return "unknown error".to_string();
    }
    errors
        .iter()
        .map(|err| err.short_description().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
