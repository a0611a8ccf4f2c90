#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use camino::Utf8PathBuf;

use dssp_batch::domain::{PdbId, ProgressEvent, Stage, StructureFormat};
use dssp_batch::dssp::{GeometryAnalyzer, ResidueGeometry};
use dssp_batch::error::PipelineError;
use dssp_batch::pipeline::{Pipeline, PipelineOptions, ProgressSink};
use dssp_batch::rcsb::StructureSource;
use dssp_batch::store::OutputStore;
use dssp_batch::structure::{CHAIN_LABEL, parse_structure};

const BACKBONE: [(&str, &str); 4] = [(" N  ", "N"), (" CA ", "C"), (" C  ", "C"), (" O  ", "O")];

/// PDB text with one chain per entry of `chains` (`(chain id, residue count)`).
pub fn pdb_text(chains: &[(char, usize)]) -> String {
    let mut text = String::new();
    let mut serial = 1;
    for (chain_index, (chain, residues)) in chains.iter().enumerate() {
        for residue in 1..=*residues {
            for (atom_index, (name, element)) in BACKBONE.iter().enumerate() {
                let x = 3.8 * residue as f64 + atom_index as f64 * 0.5;
                let y = 10.0 * chain_index as f64;
                let z = atom_index as f64 * 0.7;
                text.push_str(&format!(
                    "ATOM  {serial:>5} {name}{alt}{res:>3} {chain}{residue:>4}{icode}   {x:>8.3}{y:>8.3}{z:>8.3}{occ:>6.2}{b:>6.2}          {element:>2}  \n",
                    alt = ' ',
                    res = "ALA",
                    icode = ' ',
                    occ = 1.0,
                    b = 0.0,
                ));
                serial += 1;
            }
        }
        text.push_str("TER\n");
    }
    text.push_str("END\n");
    text
}

/// Serves a fixed body per format; `None` means the download fails.
pub struct MockSource {
    pub cif: Option<String>,
    pub pdb: Option<String>,
    pub calls: Mutex<Vec<StructureFormat>>,
}

impl MockSource {
    pub fn pdb_only(text: String) -> Self {
        Self {
            cif: None,
            pdb: Some(text),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            cif: None,
            pdb: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl StructureSource for MockSource {
    fn fetch(
        &self,
        id: &PdbId,
        format: StructureFormat,
        destination_dir: &Path,
    ) -> Result<PathBuf, PipelineError> {
        self.calls.lock().unwrap().push(format);
        let body = match format {
            StructureFormat::Cif => &self.cif,
            StructureFormat::Pdb => &self.pdb,
        };
        let Some(body) = body else {
            return Err(PipelineError::Download {
                id: id.to_string(),
                format,
                attempts: 100,
                last: "HTTP status 404".to_string(),
            });
        };
        let path = destination_dir.join(format!("{}.{}", id.to_upper(), format.extension()));
        fs::write(&path, body).unwrap();
        Ok(path)
    }
}

/// One row per residue of the chain file; fails for the listed ordinals.
#[derive(Default)]
pub struct MockAnalyzer {
    pub failing: HashSet<usize>,
    pub unavailable_rasa: bool,
    pub panic: bool,
    pub seen: Mutex<Vec<PathBuf>>,
}

impl MockAnalyzer {
    pub fn failing(ordinals: &[usize]) -> Self {
        Self {
            failing: ordinals.iter().copied().collect(),
            ..Self::default()
        }
    }
}

fn ordinal_of(path: &Path) -> usize {
    let stem = path.file_stem().unwrap().to_str().unwrap();
    stem.rsplit('_').next().unwrap().parse().unwrap()
}

impl GeometryAnalyzer for MockAnalyzer {
    fn analyze(
        &self,
        coordinates: &Path,
        scratch: &Path,
    ) -> Result<Vec<ResidueGeometry>, PipelineError> {
        assert!(coordinates.starts_with(scratch));
        self.seen.lock().unwrap().push(coordinates.to_path_buf());
        if self.panic {
            panic!("analyzer exploded");
        }
        let ordinal = ordinal_of(coordinates);
        if self.failing.contains(&ordinal) {
            return Err(PipelineError::Extraction(format!("chain {ordinal} rejected")));
        }

        let format = match coordinates.extension().and_then(|ext| ext.to_str()) {
            Some("cif") => StructureFormat::Cif,
            _ => StructureFormat::Pdb,
        };
        let structure = parse_structure(coordinates, format).unwrap();
        assert_eq!(structure.chain_count(), 1);
        assert!(structure.chains().all(|chain| chain.id() == CHAIN_LABEL));

        Ok((0..structure.residue_count())
            .map(|index| ResidueGeometry {
                residue_number: index as i32 + 1,
                insertion_code: None,
                chain: CHAIN_LABEL.to_string(),
                residue: 'K',
                secondary_structure: 'h',
                accessibility: 30.0,
                relative_accessibility: (!self.unavailable_rasa).then_some(0.2830188679),
                phi: -57.123456,
                psi: -47.5,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(PdbId, Stage)>>,
}

impl RecordingSink {
    pub fn stages(&self, id: &PdbId) -> Vec<Stage> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(event_id, _)| event_id == id)
            .map(|(_, stage)| *stage)
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push((event.id, event.stage));
    }
}

pub struct Workspace {
    pub temp: tempfile::TempDir,
    pub output: Utf8PathBuf,
    pub scratch: Utf8PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let output = Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap();
        let scratch = Utf8PathBuf::from_path_buf(temp.path().join("scratch")).unwrap();
        Self {
            temp,
            output,
            scratch,
        }
    }

    pub fn pipeline<S: StructureSource, A: GeometryAnalyzer>(
        &self,
        source: S,
        analyzer: A,
    ) -> Pipeline<S, A> {
        self.pipeline_with(source, analyzer, StructureFormat::Pdb)
    }

    pub fn pipeline_with<S: StructureSource, A: GeometryAnalyzer>(
        &self,
        source: S,
        analyzer: A,
        chain_format: StructureFormat,
    ) -> Pipeline<S, A> {
        let options = PipelineOptions {
            scratch_root: Some(self.scratch.clone()),
            chain_format,
        };
        Pipeline::new(source, analyzer, OutputStore::new(self.output.clone()), options)
    }

    /// File names in the output directory, sorted.
    pub fn outputs(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.output.as_std_path()) else {
            return Vec::new();
        };
        let mut names = entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn scratch_is_empty(&self) -> bool {
        match fs::read_dir(self.scratch.as_std_path()) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    pub fn read_output(&self, name: &str) -> String {
        fs::read_to_string(self.output.join(name).as_std_path()).unwrap()
    }
}
