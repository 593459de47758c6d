//! Condition evaluation report produced by every load.

use std::fmt;

use tracing::{debug, info};

use wired_support::rendering::render_bullets;

/// Outcome of one condition test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionEvaluation {
    pub provider: String,
    /// 1-based convergence round.
    pub round: usize,
    pub matched: bool,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

/// Summary of a load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionEvaluationReport {
    pub provider_count: usize,
    pub unconditional: usize,
    pub conditional: usize,
    /// Conditional providers registered by the convergence loop.
    pub applied: usize,
    pub rounds: usize,
    pub evaluations: Vec<ConditionEvaluation>,
    /// Providers whose registration failed.
    pub failures: Vec<String>,
    /// Conditional providers still unregistered when the loop stopped.
    pub unmatched: Vec<String>,
}

impl ConditionEvaluationReport {
    /// The latest evaluation of `provider`.
    pub fn last_evaluation_of(&self, provider: &str) -> Option<&ConditionEvaluation> {
        self.evaluations.iter().rev().find(|e| e.provider == provider)
    }
}

impl fmt::Display for ConditionEvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Condition evaluation report")?;
        writeln!(
            f,
            "  providers: {} ({} unconditional, {} conditional)",
            self.provider_count, self.unconditional, self.conditional
        )?;
        writeln!(f, "  applied: {} in {} round(s)", self.applied, self.rounds)?;

        for evaluation in &self.evaluations {
            let verdict = if evaluation.matched { "matched" } else { "did not match" };
            writeln!(
                f,
                "  [round {}] {} {}",
                evaluation.round, evaluation.provider, verdict
            )?;
            f.write_str(&render_bullets("positive", &evaluation.positive[..], 4))?;
            f.write_str(&render_bullets("negative", &evaluation.negative[..], 4))?;
        }

        f.write_str(&render_bullets("unmatched", &self.unmatched[..], 2))?;
        f.write_str(&render_bullets("failed", &self.failures[..], 2))
    }
}

/// Receives the report after a load when condition debugging is on.
pub trait ConditionEvaluationReporter: Send + Sync {
    fn report(&self, report: &ConditionEvaluationReport);
}

/// Prints the report to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReporter;

impl ConditionEvaluationReporter for StdoutReporter {
    fn report(&self, report: &ConditionEvaluationReport) {
        println!("{report}");
    }
}

/// Emits the report as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ConditionEvaluationReporter for TracingReporter {
    fn report(&self, report: &ConditionEvaluationReport) {
        info!(
            providers = report.provider_count,
            applied = report.applied,
            rounds = report.rounds,
            unmatched = report.unmatched.len(),
            "Condition evaluation finished"
        );
        for evaluation in &report.evaluations {
            debug!(
                provider = %evaluation.provider,
                round = evaluation.round,
                matched = evaluation.matched,
                positive = ?evaluation.positive,
                negative = ?evaluation.negative,
                "Condition evaluated"
            );
        }
    }
}
