use crate::SeedfuzzError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedfuzzToml {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_gen_dir")]
    pub gen_dir: String,
    #[serde(default)]
    pub rustc_args: Vec<String>,
    /// Path to a custom driver template; the embedded default is used when absent.
    #[serde(default)]
    pub template: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            gen_dir: default_gen_dir(),
            rustc_args: Vec::new(),
            template: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_result_dir")]
    pub result_dir: String,
    #[serde(default = "default_coverage_dump")]
    pub coverage_dump: String,
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            result_dir: default_result_dir(),
            coverage_dump: default_coverage_dump(),
            refresh_ms: default_refresh_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Command line that produces the seed corpus, argv style.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_corpus_file")]
    pub corpus_file: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            corpus_file: default_corpus_file(),
        }
    }
}

fn default_gen_dir() -> String {
    "target/seedfuzz-gen".to_string()
}

fn default_result_dir() -> String {
    "result".to_string()
}

fn default_coverage_dump() -> String {
    ".output/coverage".to_string()
}

fn default_refresh_ms() -> u64 {
    300
}

fn default_corpus_file() -> String {
    "input_corpus".to_string()
}

pub fn read_config(path: &Path) -> Result<SeedfuzzToml, SeedfuzzError> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text)
        .map_err(|err| SeedfuzzError::Config(format!("failed to parse {}: {err}", path.display())))
}

/// Reads `seedfuzz.toml` from `root` when present, otherwise falls back to defaults.
pub fn load_or_default(root: &Path) -> Result<SeedfuzzToml, SeedfuzzError> {
    let path = root.join("seedfuzz.toml");
    if path.exists() {
        read_config(&path)
    } else {
        Ok(SeedfuzzToml::default())
    }
}
