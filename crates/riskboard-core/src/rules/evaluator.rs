use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::config::EngineConfig;
use crate::packages::MetricValue;

use super::expression::{CompileError, CompiledCondition, compile};
use super::types::Predicate;

/// How often the deadline is consulted, in evaluation steps.
const DEADLINE_CHECK_INTERVAL: u64 = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationFailure {
    #[error("evaluation exceeded its {0:?} time budget")]
    Timeout(Duration),
    #[error("evaluation exceeded {0} steps")]
    StepLimitExceeded(u64),
    #[error("cannot apply '{operation}' to {operand}")]
    TypeMismatch {
        operation: &'static str,
        operand: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("condition produced a {0} value instead of TRUE/FALSE")]
    NonBoolean(&'static str),
    #[error("condition produced NA")]
    MissingResult,
    #[error("condition does not compile: {0}")]
    NotCompiled(CompileError),
}

/// Resources left for one evaluation. Created per call and dropped with it,
/// so an exhausted budget can never affect another evaluation.
#[derive(Debug)]
pub struct Budget {
    limit: Duration,
    deadline: Option<Instant>,
    max_steps: u64,
    steps: u64,
}

impl Budget {
    pub fn start(limit: Duration, max_steps: u64) -> Self {
        Self {
            limit,
            // Unrepresentable deadlines mean "no deadline".
            deadline: Instant::now().checked_add(limit),
            max_steps,
            steps: 0,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Account for one evaluation step.
    pub fn charge(&mut self) -> Result<(), EvaluationFailure> {
        if self.steps % DEADLINE_CHECK_INTERVAL == 0
            && self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
        {
            return Err(EvaluationFailure::Timeout(self.limit));
        }
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EvaluationFailure::StepLimitExceeded(self.max_steps));
        }
        Ok(())
    }
}

/// Evaluates rule conditions under a wall-clock budget and a step cap.
///
/// The evaluator holds only its limits; every call gets a fresh [`Budget`], so
/// one instance can be shared freely between tasks and threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedEvaluator {
    budget: Duration,
    max_steps: u64,
}

impl Default for BoundedEvaluator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl BoundedEvaluator {
    pub fn new(budget: Duration, max_steps: u64) -> Self {
        Self { budget, max_steps }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.evaluation_budget(), config.max_evaluation_steps)
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn evaluate(
        &self,
        condition: &CompiledCondition,
        input: &MetricValue,
    ) -> Result<bool, EvaluationFailure> {
        let mut budget = Budget::start(self.budget, self.max_steps);
        condition.evaluate(input, &mut budget)
    }

    /// Compile and evaluate in one go. Compilation is not charged to the budget.
    pub fn evaluate_source(
        &self,
        source: &str,
        input: &MetricValue,
    ) -> Result<bool, EvaluationFailure> {
        let condition = compile(source).map_err(EvaluationFailure::NotCompiled)?;
        self.evaluate(&condition, input)
    }

    pub fn evaluate_predicate(
        &self,
        predicate: &Predicate,
        input: &MetricValue,
    ) -> Result<bool, EvaluationFailure> {
        match predicate {
            Predicate::Compiled(condition) => self.evaluate(condition, input),
            Predicate::Invalid(err) => Err(EvaluationFailure::NotCompiled(err.clone())),
            Predicate::Always => Ok(true),
        }
    }

    /// Whether `predicate` holds for `input`. Any evaluation failure is a
    /// non-match.
    pub fn matches(&self, predicate: &Predicate, input: &MetricValue) -> bool {
        match self.evaluate_predicate(predicate, input) {
            Ok(matched) => matched,
            Err(err) => {
                debug!(error = %err, input = %input, "condition did not evaluate; treating as no match");
                false
            }
        }
    }
}
