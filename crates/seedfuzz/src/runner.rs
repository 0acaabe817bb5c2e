use crate::config::SeedfuzzToml;
use crate::corpus::parse_corpus;
use crate::descriptor::{MethodDescriptor, SignatureAnalysis};
use crate::guidance::{ExecutionGuidance, TrialOutcome};
use crate::repair::{repair_driver, Compiler};
use crate::report::{append_record, ResultRecord};
use crate::synth::{DriverArtifact, DEFAULT_TEMPLATE};
use crate::trace::{BranchRegistry, TraceEvent};
use crate::SeedfuzzError;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

/// External seed-fragment generator: produces the raw corpus text for one
/// descriptor. Blocking; a hang here hangs the signature.
pub trait SeedGenerator {
    fn generate(&self, descriptor: &MethodDescriptor) -> Result<String, SeedfuzzError>;
}

/// External trial executor: runs one embedded case against the compiled
/// harness, delivering trace events through the callback as they occur.
pub trait TrialExecutor {
    fn execute(
        &mut self,
        artifact: &DriverArtifact,
        case_index: u64,
        on_event: &mut dyn FnMut(TraceEvent),
    ) -> Result<TrialOutcome, SeedfuzzError>;
}

/// Runs the configured generator command, then reads the corpus file it
/// leaves behind. Subprocess output is surfaced when `SEEDFUZZ_LOG_EXTERNAL`
/// is set.
pub struct CommandSeedGenerator {
    pub command: Vec<String>,
    pub corpus_file: PathBuf,
}

impl SeedGenerator for CommandSeedGenerator {
    fn generate(&self, _descriptor: &MethodDescriptor) -> Result<String, SeedfuzzError> {
        if !self.command.is_empty() {
            let mut cmd = Command::new(&self.command[0]);
            cmd.args(&self.command[1..]);
            if !log_external() {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
            let status = cmd
                .status()
                .map_err(|err| SeedfuzzError::Generator(format!("cannot launch: {err}")))?;
            if !status.success() {
                return Err(SeedfuzzError::Generator(format!(
                    "generator exited with {status}"
                )));
            }
        }
        std::fs::read_to_string(&self.corpus_file).map_err(|err| {
            SeedfuzzError::Generator(format!(
                "cannot read corpus {}: {err}",
                self.corpus_file.display()
            ))
        })
    }
}

/// Launches the compiled harness once per trial with the case index as its
/// argument. Emits no trace events itself; coverage arrives only when the
/// instrumentation runtime wraps the execution.
pub struct HarnessExecutor;

impl TrialExecutor for HarnessExecutor {
    fn execute(
        &mut self,
        artifact: &DriverArtifact,
        case_index: u64,
        _on_event: &mut dyn FnMut(TraceEvent),
    ) -> Result<TrialOutcome, SeedfuzzError> {
        let output = Command::new(artifact.binary_path())
            .arg(case_index.to_string())
            .output()
            .map_err(|err| SeedfuzzError::Executor(format!("cannot launch harness: {err}")))?;
        if output.status.success() {
            Ok(TrialOutcome::default())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let description = stderr
                .lines()
                .find(|line| !line.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("harness exited with {}", output.status));
            Ok(TrialOutcome {
                error: Some(description),
            })
        }
    }
}

fn log_external() -> bool {
    std::env::var("SEEDFUZZ_LOG_EXTERNAL").is_ok_and(|value| value == "1")
}

/// Per-signature orchestration: analysis, seed generation, repair loop,
/// trial loop, final report. Strictly sequential; one signature at a time.
pub struct Runner<'a> {
    pub config: &'a SeedfuzzToml,
    pub analysis: &'a dyn SignatureAnalysis,
    pub generator: &'a dyn SeedGenerator,
    pub compiler: &'a dyn Compiler,
    pub lib_name: String,
}

impl<'a> Runner<'a> {
    /// Processes every signature in order. A failure fatal to one
    /// signature writes its zero record and never aborts the rest.
    pub fn run_batch(
        &self,
        signatures: &[String],
        executor: &mut dyn TrialExecutor,
        registry: &BranchRegistry,
    ) -> Result<(), SeedfuzzError> {
        let result_dir = PathBuf::from(&self.config.report.result_dir);
        for signature in signatures {
            let record = match self.run_signature(signature, executor, registry) {
                Ok(record) => record,
                Err(err) => {
                    eprintln!("seedfuzz: {signature}: {err}");
                    ResultRecord::failed(signature, failure_note(&err))
                }
            };
            append_record(&result_dir, &self.lib_name, &record)?;
        }
        Ok(())
    }

    pub fn run_signature(
        &self,
        signature: &str,
        executor: &mut dyn TrialExecutor,
        registry: &BranchRegistry,
    ) -> Result<ResultRecord, SeedfuzzError> {
        let descriptor = self.analysis.resolve(signature)?;
        let raw = self.generator.generate(&descriptor)?;
        let (mut cases, mut imports) = parse_corpus(&raw);
        if cases.is_empty() {
            return Err(SeedfuzzError::SeedUnusable);
        }
        imports.insert(format!("use {};", descriptor.type_path));

        let template = self.load_template()?;
        let gen_dir = PathBuf::from(&self.config.build.gen_dir);
        let artifact = repair_driver(
            &descriptor,
            &mut cases,
            &mut imports,
            &template,
            &gen_dir,
            self.compiler,
        )?;

        // The case sequence is frozen from here on.
        let mut guidance = ExecutionGuidance::new(
            signature,
            descriptor.target_function(),
            cases.len(),
            PathBuf::from(&self.config.report.coverage_dump),
            Duration::from_millis(self.config.report.refresh_ms),
        );
        while guidance.has_more_work() {
            let case_index = guidance.next_trial();
            let outcome = executor.execute(&artifact, case_index, &mut |event| {
                guidance.observe_event(&event)
            })?;
            guidance.handle_result(&outcome)?;
        }
        guidance.report_stats(true, registry).ok_or_else(|| {
            SeedfuzzError::Executor("forced report produced no record".to_string())
        })
    }

    fn load_template(&self) -> Result<String, SeedfuzzError> {
        match &self.config.build.template {
            Some(path) => Ok(std::fs::read_to_string(path)?),
            None => Ok(DEFAULT_TEMPLATE.to_string()),
        }
    }
}

/// Note recorded for a signature that produced no trials.
fn failure_note(err: &SeedfuzzError) -> String {
    match err {
        SeedfuzzError::SeedUnusable | SeedfuzzError::SynthesisExhausted => {
            "no valid input".to_string()
        }
        SeedfuzzError::Analysis(_) => "analysis failure".to_string(),
        SeedfuzzError::Generator(_) => "cannot generate inputs".to_string(),
        other => other.to_string(),
    }
}
