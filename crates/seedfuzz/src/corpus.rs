use serde::Serialize;
use std::collections::BTreeSet;

/// Literal line separating candidate cases in the raw seed corpus.
pub const CASE_DELIMITER: &str = "---------------";

const CONSTRUCTION_LABEL: &str = "Part1:";
const ARGUMENTS_LABEL: &str = "Part2:";
const IMPORTS_LABEL: &str = "Part3:";

/// One candidate input: construction code plus invocation-argument code.
/// Its position in the parsed sequence is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateCase {
    pub construction: String,
    pub arguments: String,
}

/// Splits the raw corpus into an ordered case sequence and an import set.
///
/// Each fragment must carry its three labeled segments in fixed order;
/// fragments missing the construction label are generator noise and are
/// skipped silently. An empty result is the caller's `SeedUnusable`.
pub fn parse_corpus(raw: &str) -> (Vec<CandidateCase>, BTreeSet<String>) {
    let mut cases = Vec::new();
    let mut imports = BTreeSet::new();
    for fragment in raw.split(CASE_DELIMITER) {
        let Some(i1) = fragment.find(CONSTRUCTION_LABEL) else {
            continue;
        };
        let Some(i2) = fragment[i1..].find(ARGUMENTS_LABEL).map(|i| i + i1) else {
            continue;
        };
        let Some(i3) = fragment[i2..].find(IMPORTS_LABEL).map(|i| i + i2) else {
            continue;
        };
        let construction = trim_segment(&fragment[i1 + CONSTRUCTION_LABEL.len()..i2]);
        let arguments = trim_segment(&fragment[i2 + ARGUMENTS_LABEL.len()..i3]);
        for line in fragment[i3 + IMPORTS_LABEL.len()..].lines() {
            let line = line.trim();
            if !line.is_empty() {
                imports.insert(line.to_string());
            }
        }
        cases.push(CandidateCase {
            construction,
            arguments,
        });
    }
    (cases, imports)
}

fn trim_segment(segment: &str) -> String {
    segment.trim_matches('\n').to_string()
}
