use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::config::DsspSettings;
use crate::error::PipelineError;

/// One residue as reported by the geometry analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueGeometry {
    pub residue_number: i32,
    pub insertion_code: Option<char>,
    pub chain: String,
    /// One-letter residue code; DSSP writes bridged cysteines in lowercase.
    pub residue: char,
    pub secondary_structure: char,
    pub accessibility: f64,
    /// `None` when no maximum accessibility is known for the residue type.
    pub relative_accessibility: Option<f64>,
    pub phi: f64,
    pub psi: f64,
}

/// Runs secondary structure and accessibility analysis on a single-chain file.
///
/// `scratch` is private to the calling identifier; implementations may put
/// intermediate files there but must not touch anything else.
pub trait GeometryAnalyzer: Send + Sync {
    fn analyze(&self, coordinates: &Path, scratch: &Path)
    -> Result<Vec<ResidueGeometry>, PipelineError>;
}

/// `mkdssp` run as a child process, one invocation per chain.
#[derive(Debug, Clone)]
pub struct MkdsspAnalyzer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl MkdsspAnalyzer {
    /// Resolves `settings.program` on `PATH` unless it already names a file.
    pub fn new(settings: &DsspSettings) -> Result<Self, PipelineError> {
        let candidate = Path::new(&settings.program);
        let resolved = if candidate.components().count() > 1 || candidate.is_file() {
            candidate.is_file().then(|| candidate.to_path_buf())
        } else {
            find_in_path(&settings.program)
        };
        let program =
            resolved.ok_or_else(|| PipelineError::MissingTool(settings.program.clone()))?;
        Ok(Self {
            program,
            args: settings.args.clone(),
            timeout: settings.timeout,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.program).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!stdout.is_empty()).then_some(stdout)
    }

    fn run(&self, coordinates: &Path, output: &Path, scratch: &Path) -> Result<(), PipelineError> {
        let stem = coordinates
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("chain");
        let stderr_path = scratch.join(format!("{stem}.dssp.err"));
        let stderr =
            File::create(&stderr_path).map_err(|err| PipelineError::Filesystem(err.to_string()))?;

        trace!(program = %self.program.display(), input = %coordinates.display(), "running DSSP");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(coordinates)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|err| PipelineError::Extraction(err.to_string()))?;

        let status = match self.timeout {
            None => child
                .wait()
                .map_err(|err| PipelineError::Extraction(err.to_string()))?,
            Some(limit) => {
                let start = Instant::now();
                loop {
                    if let Some(status) = child
                        .try_wait()
                        .map_err(|err| PipelineError::Extraction(err.to_string()))?
                    {
                        break status;
                    }
                    if start.elapsed() >= limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PipelineError::Extraction(format!(
                            "{} timed out after {}s",
                            self.program.display(),
                            limit.as_secs()
                        )));
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        };

        if status.success() {
            return Ok(());
        }
        let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("{} exited with {status}", self.program.display())
        } else {
            stderr.to_string()
        };
        Err(PipelineError::Extraction(message))
    }
}

impl GeometryAnalyzer for MkdsspAnalyzer {
    fn analyze(
        &self,
        coordinates: &Path,
        scratch: &Path,
    ) -> Result<Vec<ResidueGeometry>, PipelineError> {
        let output = coordinates.with_extension("dssp");
        self.run(coordinates, &output, scratch)?;
        let text =
            fs::read_to_string(&output).map_err(|err| PipelineError::Extraction(err.to_string()))?;
        parse_dssp_output(&text)
    }
}

/// Parses the classic fixed-column DSSP format.
///
/// Chain-break records (`!`) are skipped. Relative accessibility uses the
/// Sander & Rost maxima and is capped at 1.
pub fn parse_dssp_output(text: &str) -> Result<Vec<ResidueGeometry>, PipelineError> {
    let mut lines = text.lines();
    if !lines.any(|line| line.starts_with("  #  RESIDUE")) {
        return Err(PipelineError::Extraction(
            "DSSP output has no residue table".to_string(),
        ));
    }

    let mut residues = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        if chars.get(13) == Some(&'!') {
            continue;
        }
        if chars.len() < 115 {
            return Err(PipelineError::Extraction(format!(
                "truncated DSSP record: {line:?}"
            )));
        }
        let column = |from: usize, to: usize| chars[from..to].iter().collect::<String>();

        let residue = chars[13];
        let number = column(5, 10);
        if number.trim().is_empty() {
            continue;
        }

        let residue_number = number
            .trim()
            .parse::<i32>()
            .map_err(|_| malformed("residue number", line))?;
        let insertion_code = Some(chars[10]).filter(|ch| *ch != ' ');
        let secondary_structure = match chars[16] {
            ' ' => '-',
            other => other,
        };
        let accessibility = column(34, 38)
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed("accessibility", line))?;
        let phi = column(103, 109)
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed("phi", line))?;
        let psi = column(109, 115)
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed("psi", line))?;

        residues.push(ResidueGeometry {
            residue_number,
            insertion_code,
            chain: chars[11].to_string(),
            residue,
            secondary_structure,
            accessibility,
            relative_accessibility: relative_accessibility(residue, accessibility),
            phi,
            psi,
        });
    }
    Ok(residues)
}

/// One-letter code of the residue DSSP reported.
///
/// DSSP writes SS-bridged cysteines as lowercase letters (`a`, `b`, ...) that
/// pair the bridge partners; all of them are cysteine.
pub fn residue_code(residue: char) -> char {
    if residue.is_ascii_lowercase() {
        'C'
    } else {
        residue.to_ascii_uppercase()
    }
}

/// Maximum accessible surface area in Å² (Sander & Rost 1994).
pub fn max_accessibility(residue: char) -> Option<f64> {
    let value = match residue_code(residue) {
        'A' => 106.0,
        'R' => 248.0,
        'N' => 157.0,
        'D' => 163.0,
        'C' => 135.0,
        'Q' => 198.0,
        'E' => 194.0,
        'G' => 84.0,
        'H' => 184.0,
        'I' => 169.0,
        'L' => 164.0,
        'K' => 205.0,
        'M' => 188.0,
        'F' => 197.0,
        'P' => 136.0,
        'S' => 130.0,
        'T' => 142.0,
        'W' => 227.0,
        'Y' => 222.0,
        'V' => 142.0,
        _ => return None,
    };
    Some(value)
}

pub fn relative_accessibility(residue: char, accessibility: f64) -> Option<f64> {
    max_accessibility(residue).map(|max| (accessibility / max).clamp(0.0, 1.0))
}

fn malformed(field: &str, line: &str) -> PipelineError {
    PipelineError::Extraction(format!("malformed {field} in DSSP record: {line:?}"))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_cysteine_uses_cysteine_maximum() {
        assert_eq!(max_accessibility('a'), Some(135.0));
        assert_eq!(max_accessibility('X'), None);
    }

    #[test]
    fn relative_accessibility_is_capped() {
        assert_eq!(relative_accessibility('G', 168.0), Some(1.0));
        assert_eq!(relative_accessibility('G', 42.0), Some(0.5));
        assert_eq!(relative_accessibility('X', 42.0), None);
    }

    #[test]
    fn output_without_table_is_an_error() {
        assert!(parse_dssp_output("HEADER    nothing here\n").is_err());
    }
}
