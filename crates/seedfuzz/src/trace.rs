use crate::SeedfuzzError;
use std::collections::HashMap;
use std::path::Path;

/// One covered control-flow edge, delivered by the external
/// instrumentation runtime as a callback during a trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Branch {
        site: u64,
        arm: u32,
        /// Qualified path of the containing function.
        function: String,
        line: u32,
    },
    Call {
        site: u64,
        function: String,
        line: u32,
        callee: String,
    },
}

/// Read-only registry of instrumented-branch totals, built once per
/// process by the instrumentation collaborator and passed by reference
/// into reporting. Replaces process-wide static maps.
#[derive(Debug, Clone, Default)]
pub struct BranchRegistry {
    totals: HashMap<String, usize>,
}

impl BranchRegistry {
    pub fn new(totals: HashMap<String, usize>) -> Self {
        Self { totals }
    }

    /// Loads the registry from the JSON map the instrumentation tool
    /// writes: qualified function path to total branch count.
    pub fn from_json_file(path: &Path) -> Result<Self, SeedfuzzError> {
        let text = std::fs::read_to_string(path)?;
        let totals: HashMap<String, usize> = serde_json::from_str(&text).map_err(|err| {
            SeedfuzzError::Config(format!("cannot parse {}: {err}", path.display()))
        })?;
        Ok(Self { totals })
    }

    pub fn total_branches(&self, function: &str) -> usize {
        self.totals.get(function).copied().unwrap_or(0)
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.totals.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

/// Module prefix shared by every method of the declaring type: the
/// qualified function path minus its `Type::method` tail.
pub fn package_prefix(function: &str) -> &str {
    let segments: Vec<usize> = function.match_indices("::").map(|(i, _)| i).collect();
    match segments.len() {
        0 => function,
        1 => &function[..segments[0]],
        n => &function[..segments[n - 2]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_prefix_drops_type_and_method() {
        assert_eq!(
            package_prefix("mylib::json::Parser::parse"),
            "mylib::json"
        );
    }

    #[test]
    fn package_prefix_of_short_paths_degrades_gracefully() {
        assert_eq!(package_prefix("Parser::parse"), "Parser");
        assert_eq!(package_prefix("parse"), "parse");
    }

    #[test]
    fn registry_reports_zero_for_unknown_functions() {
        let registry = BranchRegistry::default();
        assert_eq!(registry.total_branches("a::B::c"), 0);
    }

    #[test]
    fn registry_loads_from_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("branches.json");
        std::fs::write(&path, r#"{"mylib::json::Parser::parse": 14}"#).expect("write");
        let registry = BranchRegistry::from_json_file(&path).expect("load");
        assert_eq!(registry.total_branches("mylib::json::Parser::parse"), 14);
    }
}
