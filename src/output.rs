//! Output-directory resolution and output file naming.
//!
//! Every task writes into `<base>/<prefix>_<task>_outputs/`, where `<base>`
//! is the input's directory with any enclosing output directories stripped,
//! so re-processing an output never nests a new tree inside the old one.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{invalid, Result};

pub const DEFAULT_PREFIX: &str = "DFSPy";

/// Task names that own an output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Format,
    Denoise,
    Paraconv,
    Compress,
    Decompress,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Task::Format => "format",
            Task::Denoise => "denoise",
            Task::Paraconv => "paraconv",
            Task::Compress => "compress",
            Task::Decompress => "decompress",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocator {
    prefix: String,
}

impl Default for OutputLocator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl OutputLocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Whether `dir`'s base name looks like `<prefix>_<any task>_outputs`.
    pub fn is_output_dir(&self, dir: &Path) -> bool {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|rest| rest.ends_with("_outputs"))
    }

    /// Output directory for `task` given an input file or directory,
    /// created if absent.
    pub fn resolve(&self, input: &Path, task: Task) -> Result<PathBuf> {
        if input.as_os_str().is_empty() {
            return Err(invalid("input path is empty"));
        }
        let absolute = if input.is_absolute() {
            input.to_path_buf()
        } else {
            std::env::current_dir()?.join(input)
        };
        let start = if absolute.is_dir() {
            absolute.as_path()
        } else {
            absolute.parent().unwrap_or(&absolute)
        };

        let mut base = start;
        while self.is_output_dir(base) {
            match base.parent() {
                Some(parent) => base = parent,
                None => break,
            }
        }

        let dir = base.join(format!("{}_{task}_outputs", self.prefix));
        std::fs::create_dir_all(&dir)?;
        debug!("output directory for {} ({task}): {}", input.display(), dir.display());
        Ok(dir)
    }
}

/// `<dir>/<input stem><suffix><input extension>`; `default_ext` (with the
/// dot) is used when the input has none.
pub fn output_file(dir: &Path, input: &Path, suffix: &str, default_ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stream".into());
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| default_ext.to_string());
    dir.join(format!("{stem}{suffix}{ext}"))
}

/// Compact number text in the style of C's `%g`: six significant digits,
/// trailing zeros dropped, exponent form for very large or small values.
pub fn format_number(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    if v == 0.0 {
        return "0".into();
    }
    let sci = format!("{v:.5e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_zeros(mantissa), exp.abs())
    } else {
        let decimals = (5 - exp) as usize;
        trim_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_of_plain_input() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("data.txt");
        std::fs::write(&input, "1\n").unwrap();
        let dir = OutputLocator::default().resolve(&input, Task::Denoise).unwrap();
        assert_eq!(dir, tmp.path().join("DFSPy_denoise_outputs"));
        assert!(dir.is_dir());
    }

    #[test]
    fn nested_outputs_collapse_to_the_original_location() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = OutputLocator::default();
        let mut dir = tmp.path().to_path_buf();
        for task in [Task::Denoise, Task::Compress, Task::Decompress, Task::Denoise] {
            dir = dir.join(format!("DFSPy_{task}_outputs"));
        }
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("x_wd_db4.txt");

        let out = locator.resolve(&input, Task::Paraconv).unwrap();
        assert_eq!(out, tmp.path().join("DFSPy_paraconv_outputs"));
        // A directory input is its own starting point.
        let out = locator.resolve(&dir, Task::Format).unwrap();
        assert_eq!(out, tmp.path().join("DFSPy_format_outputs"));
    }

    #[test]
    fn resolving_twice_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("a.json");
        let locator = OutputLocator::default();
        let first = locator.resolve(&input, Task::Compress).unwrap();
        let second = locator.resolve(&input, Task::Compress).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(OutputLocator::default().resolve(Path::new(""), Task::Format).is_err());
    }

    #[test]
    fn custom_prefix_only_matches_its_own_dirs() {
        let locator = OutputLocator::new("Fibre");
        assert!(locator.is_output_dir(Path::new("/a/Fibre_denoise_outputs")));
        assert!(!locator.is_output_dir(Path::new("/a/DFSPy_denoise_outputs")));
        assert!(!locator.is_output_dir(Path::new("/a/Fibre_outputs")));
        assert!(!locator.is_output_dir(Path::new("/a/Fibre_denoise")));
    }

    #[test]
    fn output_names_keep_the_extension() {
        let dir = Path::new("/out");
        assert_eq!(
            output_file(dir, Path::new("/in/rec.json"), "_velocity", ".json"),
            PathBuf::from("/out/rec_velocity.json")
        );
        assert_eq!(
            output_file(dir, Path::new("/in/rec"), "_Bandpass", ".json"),
            PathBuf::from("/out/rec_Bandpass.json")
        );
    }

    #[test]
    fn numbers_print_like_percent_g() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(12.25), "12.25");
        assert_eq!(format_number(0.02), "0.02");
        assert_eq!(format_number(1_000_000.0), "1e+06");
        assert_eq!(format_number(0.00001), "1e-05");
        assert_eq!(format_number(123456.7), "123457");
        assert_eq!(format_number(-2.5), "-2.5");
    }
}
