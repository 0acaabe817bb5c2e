use crate::corpus::CandidateCase;
use crate::descriptor::MethodDescriptor;
use crate::SeedfuzzError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Driver template used when the configuration names no custom one.
/// Placeholders are filled by literal substitution, no templating logic.
pub const DEFAULT_TEMPLATE: &str = "\
//! Generated harness for {namespace}. Do not edit.
{imports}

fn main() {
    let case: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .expect(\"usage: {driver_name} <case-index>\");
    match case {
{dispatch}
        other => panic!(\"unknown case index {other}\"),
    }
}

{cases}
";

/// Imports every driver needs regardless of what the corpus supplies.
const MANDATORY_IMPORTS: [&str; 1] = ["use std::hint::black_box;"];

/// Inclusive 1-based line interval covering one case body in the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInterval {
    pub start: usize,
    pub end: usize,
}

impl LineInterval {
    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }
}

/// A fully regenerated driver: rendered text plus metadata that is
/// guaranteed to match the emitted text exactly.
#[derive(Debug, Clone)]
pub struct DriverArtifact {
    pub source: String,
    pub path: PathBuf,
    pub case_intervals: Vec<LineInterval>,
    pub import_lines: BTreeMap<usize, String>,
}

impl DriverArtifact {
    /// Where the compiler places the runnable harness for this artifact.
    pub fn binary_path(&self) -> PathBuf {
        self.path.with_extension("")
    }
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub source: String,
    pub case_intervals: Vec<LineInterval>,
    pub import_lines: BTreeMap<usize, String>,
}

/// Appends text while tracking the 1-based line number the next append
/// lands on. Metadata is recorded as text is emitted, never recomputed
/// from the finished string.
struct LineWriter {
    out: String,
    line: usize,
}

impl LineWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            line: 1,
        }
    }

    fn push(&mut self, text: &str) {
        self.line += text.bytes().filter(|b| *b == b'\n').count();
        self.out.push_str(text);
    }

    fn current_line(&self) -> usize {
        self.line
    }
}

/// Deterministic namespace for the target type: its qualified path,
/// lowercased.
pub fn namespace_of(descriptor: &MethodDescriptor) -> String {
    descriptor.type_path.to_lowercase()
}

/// Renders a complete driver for the surviving cases. Identical inputs
/// produce byte-identical text and metadata.
pub fn render(
    descriptor: &MethodDescriptor,
    cases: &[CandidateCase],
    imports: &BTreeSet<String>,
    template: &str,
    driver_name: &str,
) -> Result<Rendered, SeedfuzzError> {
    let imports_at = template
        .find("{imports}")
        .ok_or_else(|| SeedfuzzError::Template("missing {imports} placeholder".to_string()))?;
    template
        .find("{dispatch}")
        .ok_or_else(|| SeedfuzzError::Template("missing {dispatch} placeholder".to_string()))?;
    let cases_at = template
        .find("{cases}")
        .ok_or_else(|| SeedfuzzError::Template("missing {cases} placeholder".to_string()))?;
    if cases_at < imports_at {
        return Err(SeedfuzzError::Template(
            "{imports} must precede {cases}".to_string(),
        ));
    }

    // One fixed enumeration order for this attempt: mandatory set unioned
    // with the corpus imports, in BTreeSet order.
    let mut all_imports: BTreeSet<String> = imports.clone();
    for mandatory in MANDATORY_IMPORTS {
        all_imports.insert(mandatory.to_string());
    }

    let namespace = namespace_of(descriptor);
    let call = descriptor.call_expression();

    let mut writer = LineWriter::new();
    let mut import_lines = BTreeMap::new();
    let mut case_intervals = Vec::with_capacity(cases.len());

    let mut rest = template;
    while let Some((literal, token, after)) = next_placeholder(rest) {
        writer.push(literal);
        match token {
            "{namespace}" => writer.push(&namespace),
            "{driver_name}" => writer.push(driver_name),
            "{imports}" => {
                for (i, import) in all_imports.iter().enumerate() {
                    if i > 0 {
                        writer.push("\n");
                    }
                    import_lines.insert(writer.current_line(), import.clone());
                    writer.push(import);
                }
            }
            "{dispatch}" => {
                for (i, _) in cases.iter().enumerate() {
                    if i > 0 {
                        writer.push("\n");
                    }
                    writer.push(&format!("        {i} => case_{i}(),"));
                }
            }
            "{cases}" => {
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        writer.push("\n\n");
                    }
                    let start = writer.current_line();
                    writer.push(&format!("fn case_{i}() {{\n"));
                    writer.push(&case.construction);
                    writer.push("\n");
                    writer.push(&case.arguments);
                    writer.push("\n");
                    writer.push(&format!("black_box({call});\n"));
                    let end = writer.current_line();
                    writer.push("}");
                    case_intervals.push(LineInterval { start, end });
                }
            }
            other => writer.push(other),
        }
        rest = after;
    }
    writer.push(rest);

    Ok(Rendered {
        source: writer.out,
        case_intervals,
        import_lines,
    })
}

const PLACEHOLDERS: [&str; 5] = [
    "{namespace}",
    "{driver_name}",
    "{imports}",
    "{dispatch}",
    "{cases}",
];

/// Finds the next known placeholder, returning the literal text before it,
/// the placeholder token, and the remainder after it.
fn next_placeholder(template: &str) -> Option<(&str, &str, &str)> {
    let mut best: Option<(usize, &str)> = None;
    for token in PLACEHOLDERS {
        if let Some(at) = template.find(token) {
            if best.map(|(b, _)| at < b).unwrap_or(true) {
                best = Some((at, token));
            }
        }
    }
    let (at, token) = best?;
    Some((&template[..at], token, &template[at + token.len()..]))
}

/// Picks a fresh output path under the namespace directory: the method
/// name plus the first unused numeric suffix, so repeated syntheses for
/// one signature never overwrite a prior attempt's file.
pub fn pick_artifact_path(
    gen_dir: &Path,
    descriptor: &MethodDescriptor,
) -> Result<PathBuf, SeedfuzzError> {
    let mut dir = gen_dir.to_path_buf();
    for segment in namespace_of(descriptor).split("::") {
        dir.push(segment);
    }
    std::fs::create_dir_all(&dir)?;
    let mut index = 0usize;
    loop {
        let candidate = dir.join(format!("{}{}.rs", descriptor.method, index));
        if !candidate.exists() {
            return Ok(candidate);
        }
        index += 1;
    }
}

/// Renders one attempt's driver and writes it to a fresh path.
pub fn synthesize(
    descriptor: &MethodDescriptor,
    cases: &[CandidateCase],
    imports: &BTreeSet<String>,
    template: &str,
    gen_dir: &Path,
) -> Result<DriverArtifact, SeedfuzzError> {
    let path = pick_artifact_path(gen_dir, descriptor)?;
    let driver_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(&descriptor.method)
        .to_string();
    let rendered = render(descriptor, cases, imports, template, &driver_name)?;
    std::fs::write(&path, &rendered.source)?;
    Ok(DriverArtifact {
        source: rendered.source,
        path,
        case_intervals: rendered.case_intervals,
        import_lines: rendered.import_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Dispatch, Param};

    fn descriptor() -> MethodDescriptor {
        MethodDescriptor {
            signature: "mylib::json::Parser::parse(&str, bool)".to_string(),
            type_path: "mylib::json::Parser".to_string(),
            method: "parse".to_string(),
            dispatch: Dispatch::Instance,
            params: vec![
                Param {
                    name: "input".to_string(),
                    ty: "&str".to_string(),
                },
                Param {
                    name: "strict".to_string(),
                    ty: "bool".to_string(),
                },
            ],
            returns: "()".to_string(),
        }
    }

    fn sample_cases() -> Vec<CandidateCase> {
        vec![
            CandidateCase {
                construction: "let parser = Parser::new();\nlet input = \"[1]\";".to_string(),
                arguments: "let strict = true;".to_string(),
            },
            CandidateCase {
                construction: "let parser = Parser::new();\nlet input = \"{}\";".to_string(),
                arguments: "let strict = false;".to_string(),
            },
        ]
    }

    fn sample_imports() -> BTreeSet<String> {
        let mut imports = BTreeSet::new();
        imports.insert("use mylib::json::Parser;".to_string());
        imports.insert("use mylib::json::Value;".to_string());
        imports
    }

    #[test]
    fn render_is_idempotent() {
        let cases = sample_cases();
        let imports = sample_imports();
        let a = render(&descriptor(), &cases, &imports, DEFAULT_TEMPLATE, "parse0")
            .expect("first render");
        let b = render(&descriptor(), &cases, &imports, DEFAULT_TEMPLATE, "parse0")
            .expect("second render");
        assert_eq!(a.source, b.source);
        assert_eq!(a.case_intervals, b.case_intervals);
        assert_eq!(a.import_lines, b.import_lines);
    }

    #[test]
    fn import_line_map_matches_emitted_text() {
        let rendered = render(
            &descriptor(),
            &sample_cases(),
            &sample_imports(),
            DEFAULT_TEMPLATE,
            "parse0",
        )
        .expect("render");
        let lines: Vec<&str> = rendered.source.lines().collect();
        assert_eq!(rendered.import_lines.len(), 3, "mandatory + 2 corpus imports");
        for (line_no, import) in &rendered.import_lines {
            assert_eq!(
                lines[line_no - 1],
                import.as_str(),
                "import map out of sync at line {line_no}"
            );
        }
    }

    #[test]
    fn case_intervals_cover_bodies_without_overlap() {
        let rendered = render(
            &descriptor(),
            &sample_cases(),
            &sample_imports(),
            DEFAULT_TEMPLATE,
            "parse0",
        )
        .expect("render");
        let lines: Vec<&str> = rendered.source.lines().collect();
        assert_eq!(rendered.case_intervals.len(), 2);
        for (i, interval) in rendered.case_intervals.iter().enumerate() {
            assert!(interval.start < interval.end);
            assert_eq!(lines[interval.start - 1], format!("fn case_{i}() {{"));
            assert_eq!(lines[interval.end - 1], "}");
        }
        let (a, b) = (rendered.case_intervals[0], rendered.case_intervals[1]);
        assert!(a.end < b.start, "intervals overlap: {a:?} vs {b:?}");
    }

    #[test]
    fn dispatch_table_lists_every_case() {
        let rendered = render(
            &descriptor(),
            &sample_cases(),
            &sample_imports(),
            DEFAULT_TEMPLATE,
            "parse0",
        )
        .expect("render");
        assert!(rendered.source.contains("        0 => case_0(),"));
        assert!(rendered.source.contains("        1 => case_1(),"));
        assert!(rendered.source.contains("black_box(parser.parse(input, strict));"));
    }

    #[test]
    fn static_dispatch_emits_type_qualified_call() {
        let mut descriptor = descriptor();
        descriptor.dispatch = Dispatch::Static;
        let rendered = render(
            &descriptor,
            &sample_cases(),
            &sample_imports(),
            DEFAULT_TEMPLATE,
            "parse0",
        )
        .expect("render");
        assert!(rendered.source.contains("black_box(Parser::parse(input, strict));"));
    }

    #[test]
    fn template_without_imports_placeholder_is_rejected() {
        let err = render(
            &descriptor(),
            &sample_cases(),
            &sample_imports(),
            "{dispatch}\n{cases}\n",
            "parse0",
        )
        .expect_err("should fail");
        assert!(matches!(err, SeedfuzzError::Template(_)), "got {err:?}");
    }

    #[test]
    fn artifact_paths_never_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = pick_artifact_path(dir.path(), &descriptor()).expect("first path");
        assert!(first.ends_with("mylib/json/parser/parse0.rs"));
        std::fs::write(&first, "// taken").expect("occupy");
        let second = pick_artifact_path(dir.path(), &descriptor()).expect("second path");
        assert!(second.ends_with("mylib/json/parser/parse1.rs"));
    }

    #[test]
    fn synthesize_writes_source_matching_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = synthesize(
            &descriptor(),
            &sample_cases(),
            &sample_imports(),
            DEFAULT_TEMPLATE,
            dir.path(),
        )
        .expect("synthesize");
        let on_disk = std::fs::read_to_string(&artifact.path).expect("read artifact");
        assert_eq!(on_disk, artifact.source);
        assert_eq!(artifact.binary_path().extension(), None);
    }
}
