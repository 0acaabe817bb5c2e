use seedfuzz::{
    parse_corpus, repair_driver, CompileOutcome, Compiler, Dispatch, MethodDescriptor, Param,
    SeedfuzzError, DEFAULT_TEMPLATE,
};
use std::cell::Cell;
use std::path::Path;

/// Compiler double that fails on the first line containing any marker,
/// with realistic rustc-shaped stderr, and succeeds otherwise.
struct MarkerCompiler {
    markers: Vec<&'static str>,
    attempts: Cell<usize>,
}

impl MarkerCompiler {
    fn new(markers: Vec<&'static str>) -> Self {
        Self {
            markers,
            attempts: Cell::new(0),
        }
    }
}

impl Compiler for MarkerCompiler {
    fn compile(&self, source: &Path) -> Result<CompileOutcome, SeedfuzzError> {
        self.attempts.set(self.attempts.get() + 1);
        let text = std::fs::read_to_string(source)?;
        for (i, line) in text.lines().enumerate() {
            if self.markers.iter().any(|marker| line.contains(marker)) {
                return Ok(CompileOutcome {
                    success: false,
                    stderr: format!(
                        "error[E0425]: cannot find value in this scope\n  --> {}:{}:5\n",
                        source.display(),
                        i + 1
                    ),
                });
            }
        }
        Ok(CompileOutcome {
            success: true,
            stderr: String::new(),
        })
    }
}

/// Compiler double that always fails without a recognizable line marker.
struct MarkerlessFailure;

impl Compiler for MarkerlessFailure {
    fn compile(&self, _source: &Path) -> Result<CompileOutcome, SeedfuzzError> {
        Ok(CompileOutcome {
            success: false,
            stderr: "error: linking with `cc` failed: exit status: 1".to_string(),
        })
    }
}

fn descriptor() -> MethodDescriptor {
    MethodDescriptor {
        signature: "mylib::json::Parser::parse(&str)".to_string(),
        type_path: "mylib::json::Parser".to_string(),
        method: "parse".to_string(),
        dispatch: Dispatch::Instance,
        params: vec![Param {
            name: "input".to_string(),
            ty: "&str".to_string(),
        }],
        returns: "()".to_string(),
    }
}

fn corpus(constructions: &[&str]) -> String {
    constructions
        .iter()
        .map(|construction| {
            format!(
                "Part1:\nlet parser = Parser::new();\n{construction}\nPart2:\nlet _unused = 0;\nPart3:\nuse mylib::json::Parser;\n"
            )
        })
        .collect::<Vec<_>>()
        .join("---------------\n")
}

#[test]
fn clean_corpus_compiles_on_first_attempt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = corpus(&[
        "let input = \"[1]\";",
        "let input = \"[2]\";",
        "let input = \"[3]\";",
    ]);
    let (mut cases, mut imports) = parse_corpus(&raw);
    let compiler = MarkerCompiler::new(vec!["NO_SUCH_MARKER"]);
    let artifact = repair_driver(
        &descriptor(),
        &mut cases,
        &mut imports,
        DEFAULT_TEMPLATE,
        dir.path(),
        &compiler,
    )
    .expect("repair");
    assert_eq!(compiler.attempts.get(), 1);
    assert_eq!(artifact.case_intervals.len(), 3);
    assert_eq!(cases.len(), 3);
}

#[test]
fn one_bad_case_costs_exactly_one_retry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = corpus(&[
        "let input = \"[1]\";",
        "let input = UNDEFINED_SYMBOL;",
        "let input = \"[3]\";",
    ]);
    let (mut cases, mut imports) = parse_corpus(&raw);
    let compiler = MarkerCompiler::new(vec!["UNDEFINED_SYMBOL"]);
    let artifact = repair_driver(
        &descriptor(),
        &mut cases,
        &mut imports,
        DEFAULT_TEMPLATE,
        dir.path(),
        &compiler,
    )
    .expect("repair");
    assert_eq!(compiler.attempts.get(), 2);
    assert_eq!(artifact.case_intervals.len(), 2);
    assert_eq!(cases.len(), 2);
    // Survivors keep their relative order.
    assert!(cases[0].construction.contains("[1]"));
    assert!(cases[1].construction.contains("[3]"));
}

#[test]
fn bad_import_is_pruned_without_losing_cases() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut raw = corpus(&["let input = \"[1]\";", "let input = \"[2]\";"]);
    raw.push_str("use missing_crate::Thing;\n");
    let (mut cases, mut imports) = parse_corpus(&raw);
    assert!(imports.contains("use missing_crate::Thing;"));
    let compiler = MarkerCompiler::new(vec!["missing_crate"]);
    let artifact = repair_driver(
        &descriptor(),
        &mut cases,
        &mut imports,
        DEFAULT_TEMPLATE,
        dir.path(),
        &compiler,
    )
    .expect("repair");
    assert_eq!(compiler.attempts.get(), 2);
    assert_eq!(cases.len(), 2, "no case may be lost to an import error");
    assert!(!imports.contains("use missing_crate::Thing;"));
    assert_eq!(artifact.case_intervals.len(), 2);
}

#[test]
fn all_bad_cases_exhaust_the_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = corpus(&[
        "let input = UNDEFINED_SYMBOL;",
        "let input = UNDEFINED_SYMBOL;",
        "let input = UNDEFINED_SYMBOL;",
    ]);
    let (mut cases, mut imports) = parse_corpus(&raw);
    let initial_total = cases.len() + imports.len();
    let compiler = MarkerCompiler::new(vec!["UNDEFINED_SYMBOL"]);
    let err = repair_driver(
        &descriptor(),
        &mut cases,
        &mut imports,
        DEFAULT_TEMPLATE,
        dir.path(),
        &compiler,
    )
    .expect_err("must exhaust");
    assert!(matches!(err, SeedfuzzError::SynthesisExhausted), "got {err:?}");
    assert!(cases.is_empty());
    // Every failed attempt removed exactly one fragment.
    assert_eq!(
        initial_total - (cases.len() + imports.len()),
        compiler.attempts.get()
    );
    assert!(compiler.attempts.get() <= initial_total + 1);
}

#[test]
fn failed_attempts_leave_no_artifact_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = corpus(&["let input = \"[1]\";", "let input = UNDEFINED_SYMBOL;"]);
    let (mut cases, mut imports) = parse_corpus(&raw);
    let compiler = MarkerCompiler::new(vec!["UNDEFINED_SYMBOL"]);
    let artifact = repair_driver(
        &descriptor(),
        &mut cases,
        &mut imports,
        DEFAULT_TEMPLATE,
        dir.path(),
        &compiler,
    )
    .expect("repair");
    let namespace_dir = artifact.path.parent().expect("namespace dir");
    let files: Vec<_> = std::fs::read_dir(namespace_dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").path())
        .collect();
    assert_eq!(files, vec![artifact.path.clone()]);
}

#[test]
fn unmarked_diagnostics_fail_fatally() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = corpus(&["let input = \"[1]\";"]);
    let (mut cases, mut imports) = parse_corpus(&raw);
    let err = repair_driver(
        &descriptor(),
        &mut cases,
        &mut imports,
        DEFAULT_TEMPLATE,
        dir.path(),
        &MarkerlessFailure,
    )
    .expect_err("must fail");
    assert!(
        matches!(err, SeedfuzzError::DiagnosticUnparseable(_)),
        "got {err:?}"
    );
}
