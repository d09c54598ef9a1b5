//! Validate/correct state machine
//!
//! ```text
//! SYNTHESIZED -> VALIDATING -> VALID                       (terminal, success)
//!                           -> CORRECTING -> VALIDATING    (attempts < budget)
//!                           -> EXHAUSTED                   (terminal, best effort)
//!                           -> ABORTED                     (transport failure, abort policy)
//! ```
//!
//! The first validation is a direct validator call. Only the current candidate and
//! the attempt counter survive between iterations.

use serde::Serialize;

use sqlthought_model::{SqlCandidate, ValidationResult};

use crate::error::PipelineError;
use crate::pipeline::TransportPolicy;
use crate::stages::{CorrectionContext, Corrector};
use crate::validator::{normalize, SqlValidator};

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopTerminal {
    Valid,
    Exhausted,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub sql: SqlCandidate,
    /// Last validation of `sql`
    pub validation: ValidationResult,
    /// Correction calls made
    pub attempts: usize,
    pub terminal: LoopTerminal,
}

enum State {
    Correcting,
    Done(LoopTerminal),
}

pub struct CorrectionLoop<'a> {
    validator: &'a dyn SqlValidator,
    corrector: &'a dyn Corrector,
    budget: usize,
    transport_policy: TransportPolicy,
}

impl<'a> CorrectionLoop<'a> {
    pub fn new(validator: &'a dyn SqlValidator, corrector: &'a dyn Corrector, budget: usize) -> Self {
        Self {
            validator,
            corrector,
            budget,
            transport_policy: TransportPolicy::Retry,
        }
    }

    pub fn with_transport_policy(mut self, policy: TransportPolicy) -> Self {
        self.transport_policy = policy;
        self
    }

    /// Drive `initial` to a terminal state.
    ///
    /// Never fails because of validation: exhaustion returns the last candidate and
    /// its errors. Reasoning failures inside a correction are propagated.
    pub async fn run(
        &self,
        ctx: &CorrectionContext<'_>,
        initial: SqlCandidate,
    ) -> Result<CorrectionOutcome, PipelineError> {
        let mut candidate = initial;
        let mut attempts = 0;
        let mut validation = self.validate(&candidate, attempts).await;
        let mut state = self.next_state(&validation, attempts);

        loop {
            state = match state {
                State::Correcting => {
                    attempts += 1;
                    tracing::info!(
                        attempt = attempts,
                        budget = self.budget,
                        errors = ?validation.errors,
                        "errors detected during dry run, attempting SQL correction"
                    );

                    let corrected = self.corrector.correct(ctx, &candidate, &validation.errors).await?;
                    if corrected == candidate {
                        tracing::warn!(attempt = attempts, "correction returned the same SQL");
                    }
                    candidate = corrected;

                    validation = self.validate(&candidate, attempts).await;
                    self.next_state(&validation, attempts)
                }
                State::Done(terminal) => {
                    match terminal {
                        LoopTerminal::Valid => {
                            tracing::info!(attempts, fingerprint = %candidate.fingerprint(), "SQL validated");
                        }
                        _ => {
                            tracing::warn!(
                                attempts,
                                terminal = ?terminal,
                                errors = ?validation.errors,
                                "returning SQL that failed validation"
                            );
                        }
                    }

                    return Ok(CorrectionOutcome {
                        sql: candidate,
                        validation,
                        attempts,
                        terminal,
                    });
                }
            };
        }
    }

    /// Transition out of VALIDATING
    fn next_state(&self, validation: &ValidationResult, attempts: usize) -> State {
        if validation.valid {
            State::Done(LoopTerminal::Valid)
        } else if validation.is_transport_failure() && self.transport_policy == TransportPolicy::Abort {
            tracing::warn!(errors = ?validation.errors, "validator transport failure, aborting corrections");
            State::Done(LoopTerminal::Aborted)
        } else if attempts >= self.budget {
            State::Done(LoopTerminal::Exhausted)
        } else {
            State::Correcting
        }
    }

    async fn validate(&self, candidate: &SqlCandidate, attempts: usize) -> ValidationResult {
        let result = normalize(self.validator.dry_run(candidate.as_str()).await);
        tracing::debug!(
            attempt = attempts,
            fingerprint = %candidate.fingerprint(),
            valid = result.valid,
            message = %result.message,
            "dry run"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlthought_model::SchemaLink;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AppendCorrector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Corrector for AppendCorrector {
        async fn correct(
            &self,
            _ctx: &CorrectionContext<'_>,
            sql: &SqlCandidate,
            _errors: &[String],
        ) -> Result<SqlCandidate, PipelineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SqlCandidate::from_model_output(&format!("{} -- fix {}", sql, n)))
        }
    }

    /// Valid once the SQL carries `needed` fixes
    struct FixCountValidator {
        needed: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SqlValidator for FixCountValidator {
        async fn dry_run(&self, sql: &str) -> ValidationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if sql.matches("-- fix").count() >= self.needed {
                ValidationResult::valid()
            } else {
                ValidationResult::rejected("Unrecognized name: x")
            }
        }
    }

    struct DownValidator;

    #[async_trait]
    impl SqlValidator for DownValidator {
        async fn dry_run(&self, _sql: &str) -> ValidationResult {
            ValidationResult::transport("503 Service Unavailable")
        }
    }

    fn link() -> SchemaLink {
        SchemaLink {
            tables: BTreeMap::from([("dataset.t".to_string(), vec!["a".to_string()])]),
            primary_keys: BTreeMap::new(),
            columns: BTreeMap::new(),
            joins: vec![],
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_valid() {
        let link = link();
        let ctx = CorrectionContext { question: "q", schema_link: &link, rules: &[], dialect: "bigquery" };
        let corrector = AppendCorrector { calls: AtomicUsize::new(0) };
        let validator = FixCountValidator { needed: 2, calls: AtomicUsize::new(0) };

        let outcome = CorrectionLoop::new(&validator, &corrector, 3)
            .run(&ctx, SqlCandidate::from_model_output("SELECT a FROM dataset.t"))
            .await
            .unwrap();

        assert_eq!(outcome.terminal, LoopTerminal::Valid);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(corrector.calls.load(Ordering::SeqCst), 2);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.sql.as_str(), "SELECT a FROM dataset.t -- fix 1 -- fix 2");
    }

    #[tokio::test]
    async fn test_zero_budget_validates_once() {
        let link = link();
        let ctx = CorrectionContext { question: "q", schema_link: &link, rules: &[], dialect: "bigquery" };
        let corrector = AppendCorrector { calls: AtomicUsize::new(0) };
        let validator = FixCountValidator { needed: 1, calls: AtomicUsize::new(0) };

        let outcome = CorrectionLoop::new(&validator, &corrector, 0)
            .run(&ctx, SqlCandidate::from_model_output("SELECT a FROM dataset.t"))
            .await
            .unwrap();

        assert_eq!(outcome.terminal, LoopTerminal::Exhausted);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(corrector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.validation.errors, vec!["Unrecognized name: x".to_string()]);
    }

    #[tokio::test]
    async fn test_abort_policy_skips_corrections_on_transport_failure() {
        let link = link();
        let ctx = CorrectionContext { question: "q", schema_link: &link, rules: &[], dialect: "bigquery" };
        let corrector = AppendCorrector { calls: AtomicUsize::new(0) };

        let outcome = CorrectionLoop::new(&DownValidator, &corrector, 3)
            .with_transport_policy(TransportPolicy::Abort)
            .run(&ctx, SqlCandidate::from_model_output("SELECT 1"))
            .await
            .unwrap();

        assert_eq!(outcome.terminal, LoopTerminal::Aborted);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(corrector.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.validation.errors[0].starts_with("Unexpected error"));
    }
}
