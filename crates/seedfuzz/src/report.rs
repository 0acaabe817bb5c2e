use crate::SeedfuzzError;
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Final per-signature record handed to the persistence collaborator.
/// Every terminal path writes one, so batch output is always complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub signature: String,
    pub case_count: usize,
    pub method_covered: usize,
    pub method_total: usize,
    pub method_fraction: f64,
    pub package_covered: usize,
    pub package_total: usize,
    pub package_fraction: f64,
    pub unique_failures: String,
}

impl ResultRecord {
    /// All-zero record for a signature that failed before any trial ran,
    /// carrying the failure note in the unique-failure field.
    pub fn failed(signature: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            case_count: 0,
            method_covered: 0,
            method_total: 0,
            method_fraction: 0.0,
            package_covered: 0,
            package_total: 0,
            package_fraction: 0.0,
            unique_failures: note.into(),
        }
    }
}

impl fmt::Display for ResultRecord {
    /// One line per record: embedded newlines in the failure text are
    /// escaped so the append-only result file stays line-oriented. The
    /// JSON dump keeps the text verbatim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}",
            self.signature,
            self.case_count,
            self.method_covered,
            self.method_total,
            self.method_fraction,
            self.package_covered,
            self.package_total,
            self.package_fraction,
            self.unique_failures.replace('\n', "\\n")
        )
    }
}

/// Appends one record line to `<result_dir>/<lib_name>`.
pub fn append_record(
    result_dir: &Path,
    lib_name: &str,
    record: &ResultRecord,
) -> Result<(), SeedfuzzError> {
    std::fs::create_dir_all(result_dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(result_dir.join(lib_name))?;
    writeln!(file, "{record}")?;
    Ok(())
}

/// Appends one record as a JSON line to `<result_dir>/<lib_name>.jsonl`.
pub fn append_record_json(
    result_dir: &Path,
    lib_name: &str,
    record: &ResultRecord,
) -> Result<(), SeedfuzzError> {
    std::fs::create_dir_all(result_dir)?;
    let json = serde_json::to_string(record)
        .map_err(|err| SeedfuzzError::Io(std::io::Error::other(err)))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(result_dir.join(format!("{lib_name}.jsonl")))?;
    writeln!(file, "{json}")?;
    Ok(())
}
