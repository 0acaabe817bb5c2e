use crate::corpus::CandidateCase;
use crate::descriptor::MethodDescriptor;
use crate::synth::{synthesize, DriverArtifact};
use crate::SeedfuzzError;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub success: bool,
    pub stderr: String,
}

/// External compiler collaborator: blocking, returns diagnostics on failure.
pub trait Compiler {
    fn compile(&self, source: &Path) -> Result<CompileOutcome, SeedfuzzError>;
}

/// Compiles a driver with `rustc`, placing the runnable harness next to
/// the source file.
pub struct RustcCompiler {
    pub extra_args: Vec<String>,
}

impl Compiler for RustcCompiler {
    fn compile(&self, source: &Path) -> Result<CompileOutcome, SeedfuzzError> {
        let mut cmd = Command::new("rustc");
        cmd.arg(source);
        cmd.arg("--edition=2021");
        cmd.arg("--crate-type=bin");
        cmd.arg("-o");
        cmd.arg(source.with_extension(""));
        cmd.args(&self.extra_args);
        let output = cmd
            .output()
            .map_err(|err| SeedfuzzError::Compiler(format!("cannot launch rustc: {err}")))?;
        Ok(CompileOutcome {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Extracts the line number of the first diagnostic carrying a
/// `<file>.rs:<line>:` marker. Later diagnostics are deliberately ignored:
/// one failed attempt prunes exactly one fragment.
pub fn first_diagnostic_line(stderr: &str) -> Option<usize> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| Regex::new(r"\.rs:(\d+):\d+").expect("diagnostic marker"));
    marker
        .captures(stderr)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Drives repeated synthesis and compile attempts until a driver compiles
/// or the case sequence is exhausted.
///
/// Every failed attempt removes exactly one fragment: the import whose
/// recorded line the first diagnostic blames when that line precedes the
/// first case interval, otherwise the case whose interval contains it.
/// `|cases| + |imports|` strictly decreases per failed attempt, so the
/// loop finishes within `cases + imports + 1` attempts. At most one
/// artifact file exists on disk at a time.
pub fn repair_driver(
    descriptor: &MethodDescriptor,
    cases: &mut Vec<CandidateCase>,
    imports: &mut BTreeSet<String>,
    template: &str,
    gen_dir: &Path,
    compiler: &dyn Compiler,
) -> Result<DriverArtifact, SeedfuzzError> {
    while !cases.is_empty() {
        let artifact = synthesize(descriptor, cases, imports, template, gen_dir)?;
        let outcome = compiler.compile(&artifact.path)?;
        if outcome.success {
            return Ok(artifact);
        }
        std::fs::remove_file(&artifact.path)?;
        let Some(line) = first_diagnostic_line(&outcome.stderr) else {
            return Err(SeedfuzzError::DiagnosticUnparseable(truncated(
                &outcome.stderr,
            )));
        };
        if line < artifact.case_intervals[0].start {
            let Some(import) = artifact.import_lines.get(&line) else {
                return Err(SeedfuzzError::DiagnosticUnparseable(format!(
                    "line {line} precedes the cases but maps to no import"
                )));
            };
            imports.remove(import);
        } else {
            let Some(at) = artifact
                .case_intervals
                .iter()
                .position(|interval| interval.contains(line))
            else {
                return Err(SeedfuzzError::DiagnosticUnparseable(format!(
                    "line {line} falls outside every case interval"
                )));
            };
            cases.remove(at);
        }
    }
    Err(SeedfuzzError::SynthesisExhausted)
}

fn truncated(stderr: &str) -> String {
    const LIMIT: usize = 400;
    if stderr.len() <= LIMIT {
        stderr.to_string()
    } else {
        let mut end = LIMIT;
        while !stderr.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &stderr[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_marker_wins_over_later_diagnostics() {
        let stderr = "\
error[E0425]: cannot find value `x` in this scope
  --> target/gen/parse0.rs:17:5
error[E0433]: failed to resolve
  --> target/gen/parse0.rs:42:9
";
        assert_eq!(first_diagnostic_line(stderr), Some(17));
    }

    #[test]
    fn stderr_without_marker_yields_none() {
        assert_eq!(first_diagnostic_line("linker exited with code 1"), None);
        assert_eq!(first_diagnostic_line(""), None);
    }

    #[test]
    fn marker_requires_line_and_column() {
        assert_eq!(first_diagnostic_line("note: see parse0.rs:12 above"), None);
        assert_eq!(first_diagnostic_line("parse0.rs:12:1"), Some(12));
    }

    #[test]
    fn truncation_keeps_short_stderr_intact() {
        assert_eq!(truncated("short"), "short");
        let long = "x".repeat(500);
        assert!(truncated(&long).ends_with("..."));
    }
}
