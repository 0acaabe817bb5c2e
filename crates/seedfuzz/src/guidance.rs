use crate::report::ResultRecord;
use crate::trace::{package_prefix, BranchRegistry, TraceEvent};
use crate::SeedfuzzError;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Minimum time between two dashboard refreshes, unless forced.
pub const STATS_REFRESH_PERIOD: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidancePhase {
    AwaitingTrial,
    TrialComplete,
    Exhausted,
}

/// Outcome of one trial as reported by the external executor. `error`
/// carries the raw stringified failure; absence means a valid input.
#[derive(Debug, Clone, Default)]
pub struct TrialOutcome {
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DescKey {
    Branch { site: u64, arm: u32 },
    Call { site: u64 },
}

/// Coverage-guided trial loop state for one signature: supplies trial
/// identity, consumes outcomes and trace events, maintains coverage sets
/// and failure dedup, throttles reporting, computes final statistics.
///
/// Created only after a successful compile; discarded after the final
/// report. Descriptor memoization is scoped to this instance.
pub struct ExecutionGuidance {
    signature: String,
    target_function: String,
    cases_num: usize,
    num_trials: u64,
    num_valid: u64,
    phase: GuidancePhase,
    run_coverage: BTreeSet<String>,
    total_coverage: BTreeSet<String>,
    desc_cache: HashMap<DescKey, String>,
    covered_by_function: HashMap<String, BTreeSet<String>>,
    unique_failures: HashMap<String, u64>,
    failure_order: Vec<String>,
    start_time: Instant,
    last_refresh: Instant,
    refresh_period: Duration,
    coverage_dump: PathBuf,
}

impl ExecutionGuidance {
    pub fn new(
        signature: impl Into<String>,
        target_function: impl Into<String>,
        cases_num: usize,
        coverage_dump: PathBuf,
        refresh_period: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            signature: signature.into(),
            target_function: target_function.into(),
            cases_num,
            num_trials: 0,
            num_valid: 0,
            phase: if cases_num == 0 {
                GuidancePhase::Exhausted
            } else {
                GuidancePhase::AwaitingTrial
            },
            run_coverage: BTreeSet::new(),
            total_coverage: BTreeSet::new(),
            desc_cache: HashMap::new(),
            covered_by_function: HashMap::new(),
            unique_failures: HashMap::new(),
            failure_order: Vec::new(),
            start_time: now,
            last_refresh: now,
            refresh_period,
            coverage_dump,
        }
    }

    pub fn has_more_work(&self) -> bool {
        self.num_trials < self.cases_num as u64
    }

    /// Identity of the next trial: the zero-based index of the case the
    /// executor must dispatch.
    pub fn next_trial(&self) -> u64 {
        self.num_trials
    }

    pub fn phase(&self) -> GuidancePhase {
        self.phase
    }

    pub fn num_trials(&self) -> u64 {
        self.num_trials
    }

    pub fn num_valid(&self) -> u64 {
        self.num_valid
    }

    pub fn cases_num(&self) -> usize {
        self.cases_num
    }

    pub fn total_coverage(&self) -> &BTreeSet<String> {
        &self.total_coverage
    }

    pub fn unique_failure_count(&self) -> usize {
        self.unique_failures.len()
    }

    /// Translates a raw trace event into its branch descriptor and adds it
    /// to the per-run coverage set. Descriptor text is computed once per
    /// `(site, arm)` or site key and memoized for this instance's lifetime.
    pub fn observe_event(&mut self, event: &TraceEvent) {
        let descriptor = match event {
            TraceEvent::Branch {
                site,
                arm,
                function,
                line,
            } => self
                .desc_cache
                .entry(DescKey::Branch {
                    site: *site,
                    arm: *arm,
                })
                .or_insert_with(|| format!("({site:09}) {function}:{line} [{arm}]"))
                .clone(),
            TraceEvent::Call {
                site,
                function,
                line,
                callee,
            } => self
                .desc_cache
                .entry(DescKey::Call { site: *site })
                .or_insert_with(|| format!("({site:09}) {function}:{line} --> {callee}"))
                .clone(),
        };
        self.run_coverage.insert(descriptor.clone());
        // Only branch edges count against the registry's instrumented-branch
        // totals; call edges still land in the coverage sets and the dump.
        if let TraceEvent::Branch { function, .. } = event {
            self.covered_by_function
                .entry(function.clone())
                .or_default()
                .insert(descriptor);
        }
    }

    /// Consumes one trial outcome: bumps counters, merges coverage,
    /// records first-seen failures, rewrites the coverage dump and issues
    /// a throttled dashboard refresh.
    pub fn handle_result(&mut self, outcome: &TrialOutcome) -> Result<(), SeedfuzzError> {
        self.phase = GuidancePhase::TrialComplete;
        self.num_trials += 1;
        self.total_coverage
            .extend(self.run_coverage.iter().cloned());
        match &outcome.error {
            None => self.num_valid += 1,
            Some(description) => {
                // First-seen trial index wins; later duplicates are dropped.
                if !self.unique_failures.contains_key(description) {
                    self.unique_failures
                        .insert(description.clone(), self.num_trials);
                    self.failure_order.push(description.clone());
                }
            }
        }
        self.write_coverage_dump()?;
        self.report_stats(false, &BranchRegistry::default());
        self.phase = if self.has_more_work() {
            GuidancePhase::AwaitingTrial
        } else {
            GuidancePhase::Exhausted
        };
        Ok(())
    }

    /// Whole-file rewrite, one descriptor per line, so a crash mid-run
    /// preserves the coverage gathered so far.
    fn write_coverage_dump(&self) -> Result<(), SeedfuzzError> {
        if let Some(parent) = self.coverage_dump.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut text = String::new();
        for descriptor in &self.run_coverage {
            text.push_str(descriptor);
            text.push('\n');
        }
        std::fs::write(&self.coverage_dump, text)?;
        Ok(())
    }

    /// Refreshes the dashboard when forced or when the refresh period has
    /// elapsed; a forced refresh also computes the final statistics and
    /// always returns a record.
    pub fn report_stats(&mut self, force: bool, registry: &BranchRegistry) -> Option<ResultRecord> {
        let now = Instant::now();
        if now.duration_since(self.last_refresh) < self.refresh_period && !force {
            return None;
        }
        self.last_refresh = now;
        let elapsed = now.duration_since(self.start_time);

        let valid_percent = if self.num_trials == 0 {
            0.0
        } else {
            self.num_valid as f64 * 100.0 / self.num_trials as f64
        };
        let mut display = String::new();
        display.push_str("Feedback-driven fuzzing\n-----------------------\n");
        display.push_str(&format!("Test signature:       {}\n", self.signature));
        display.push_str(&format!(
            "Elapsed time:         {}\n",
            format_duration(elapsed)
        ));
        display.push_str(&format!(
            "Number of executions: {} (total {})\n",
            self.num_trials, self.cases_num
        ));
        display.push_str(&format!(
            "Valid inputs:         {} ({valid_percent:.2}%)\n",
            self.num_valid
        ));
        display.push_str(&format!(
            "Unique failures:      {}\n",
            self.unique_failures.len()
        ));

        let mut record = ResultRecord {
            signature: self.signature.clone(),
            case_count: self.cases_num,
            method_covered: 0,
            method_total: 0,
            method_fraction: 0.0,
            package_covered: 0,
            package_total: 0,
            package_fraction: 0.0,
            unique_failures: String::new(),
        };

        if force {
            let (method_covered, method_total) = self.method_stats(registry);
            record.method_covered = method_covered;
            record.method_total = method_total;
            record.method_fraction = method_covered as f64 / method_total as f64;

            let (package_covered, package_total) = self.package_stats(registry);
            record.package_covered = package_covered;
            record.package_total = package_total;
            record.package_fraction = package_covered as f64 / package_total as f64;

            display.push_str(&format!(
                "Method coverage:      {} branches ({:.2}% of {} branches)\n",
                method_covered,
                record.method_fraction * 100.0,
                method_total
            ));
            display.push_str(&format!(
                "Package coverage:     {} branches ({:.2}% of {} branches)\n",
                package_covered,
                record.package_fraction * 100.0,
                package_total
            ));

            record.unique_failures = self.unique_failure_text();
        }

        eprint!("{display}");
        Some(record)
    }

    /// Covered branches of the target method over its known total, the
    /// total floored to 1 so an uninstrumented method reports 0% instead
    /// of an undefined fraction.
    fn method_stats(&self, registry: &BranchRegistry) -> (usize, usize) {
        let covered = self
            .covered_by_function
            .get(&self.target_function)
            .map(BTreeSet::len)
            .unwrap_or(0);
        let total = registry.total_branches(&self.target_function).max(1);
        (covered, total)
    }

    /// Same fraction aggregated over every function sharing the target's
    /// package prefix that has at least one recorded branch.
    fn package_stats(&self, registry: &BranchRegistry) -> (usize, usize) {
        let prefix = package_prefix(&self.target_function).to_string();
        let covered = self
            .covered_by_function
            .iter()
            .filter(|(function, _)| package_prefix(function) == prefix)
            .map(|(_, branches)| branches.len())
            .sum();
        let total: usize = registry
            .functions()
            .filter(|(function, _)| {
                package_prefix(function) == prefix
                    && self.covered_by_function.contains_key(*function)
            })
            .map(|(_, count)| count)
            .sum();
        (covered, total.max(1))
    }

    /// Concatenation of all distinct failure descriptions with their
    /// first-seen trial index, in first-seen order.
    fn unique_failure_text(&self) -> String {
        self.failure_order
            .iter()
            .map(|description| {
                let index = self.unique_failures[description];
                format!("{index}: {description}")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn format_duration(elapsed: Duration) -> String {
    let total_seconds = elapsed.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m "));
    }
    out.push_str(&format!("{seconds}s"));
    out
}
