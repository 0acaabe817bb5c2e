pub mod config;
pub mod corpus;
pub mod descriptor;
pub mod guidance;
pub mod repair;
pub mod report;
pub mod runner;
pub mod synth;
pub mod trace;

pub use config::{load_or_default, read_config, SeedfuzzToml};
pub use corpus::{parse_corpus, CandidateCase, CASE_DELIMITER};
pub use descriptor::{
    split_signature, Dispatch, JsonAnalysis, MethodDescriptor, Param, SignatureAnalysis,
    SignatureParseError,
};
pub use guidance::{ExecutionGuidance, GuidancePhase, TrialOutcome, STATS_REFRESH_PERIOD};
pub use repair::{first_diagnostic_line, repair_driver, CompileOutcome, Compiler, RustcCompiler};
pub use report::{append_record, append_record_json, ResultRecord};
pub use runner::{CommandSeedGenerator, HarnessExecutor, Runner, SeedGenerator, TrialExecutor};
pub use synth::{
    pick_artifact_path, render, synthesize, DriverArtifact, LineInterval, DEFAULT_TEMPLATE,
};
pub use trace::{package_prefix, BranchRegistry, TraceEvent};

#[derive(Debug)]
pub enum SeedfuzzError {
    Io(std::io::Error),
    Config(String),
    InvalidCommand(String),
    Template(String),
    SeedUnusable,
    Analysis(String),
    SynthesisExhausted,
    DiagnosticUnparseable(String),
    Compiler(String),
    Generator(String),
    Executor(String),
}

impl std::fmt::Display for SeedfuzzError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedfuzzError::Io(err) => write!(f, "IO error: {err}"),
            SeedfuzzError::Config(msg) => write!(f, "Invalid configuration: {msg}"),
            SeedfuzzError::InvalidCommand(msg) => write!(f, "Invalid command: {msg}"),
            SeedfuzzError::Template(msg) => write!(f, "Invalid driver template: {msg}"),
            SeedfuzzError::SeedUnusable => write!(f, "Seed corpus contains no usable case"),
            SeedfuzzError::Analysis(msg) => write!(f, "Signature analysis failed: {msg}"),
            SeedfuzzError::SynthesisExhausted => {
                write!(f, "Every candidate case was pruned without a successful compile")
            }
            SeedfuzzError::DiagnosticUnparseable(msg) => {
                write!(f, "Compiler diagnostic has no usable line marker: {msg}")
            }
            SeedfuzzError::Compiler(msg) => write!(f, "Compiler invocation failed: {msg}"),
            SeedfuzzError::Generator(msg) => write!(f, "Seed generator failed: {msg}"),
            SeedfuzzError::Executor(msg) => write!(f, "Trial executor failed: {msg}"),
        }
    }
}

impl std::error::Error for SeedfuzzError {}

impl From<std::io::Error> for SeedfuzzError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
