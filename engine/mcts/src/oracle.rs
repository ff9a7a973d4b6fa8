//! Oracle contract: the external judge / language model.
//!
//! The search core never talks to a model directly. It asks an [`Oracle`]
//! for candidate sub-questions, cheap usefulness estimates, and state
//! evaluations, and consumes the `(state, confidence)` results. Prompting,
//! answer extraction, and the terminal-marker heuristic all live behind
//! this trait.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by an oracle. Transport failures are retried by the
/// expander with bounded attempts and then degraded, never fatal.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle transport failure: {0}")]
    Transport(String),

    #[error("malformed oracle output: {0}")]
    Malformed(String),
}

/// One completed step along a reasoning path: a sub-question and the
/// sub-answer the judge settled on for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub sub_question: String,
    pub sub_answer: String,
}

/// Outcome of evaluating a node's state.
#[derive(Debug, Clone)]
pub struct StateEval {
    /// The sub-answer text ("" when no sample parsed).
    pub state: String,
    /// Fraction of evaluation samples agreeing on the extracted answer,
    /// in [0, 1]. Zero when no sample parsed.
    pub confidence: f64,
}

/// The external judge/language-model collaborator.
///
/// `trace` is always the list of completed steps for the non-root ancestors
/// of the node in question, in root-to-leaf order.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Candidate next sub-questions to ask after `trace`. May contain
    /// duplicates; the expander deduplicates preserving first-seen order.
    async fn generate_actions(
        &self,
        problem: &str,
        trace: &[Step],
    ) -> Result<Vec<String>, OracleError>;

    /// Cheap usefulness estimate in [0, 1] for asking `action` next.
    async fn fast_reward(
        &self,
        problem: &str,
        trace: &[Step],
        action: &str,
    ) -> Result<f64, OracleError>;

    /// Answer the sub-question `action` given the trace so far. When
    /// `forced` the oracle must produce a final answer to the root problem
    /// regardless of how much remains open.
    async fn evaluate_state(
        &self,
        problem: &str,
        trace: &[Step],
        action: &str,
        forced: bool,
    ) -> Result<StateEval, OracleError>;

    /// Whether `state` signals that a final answer to the root problem has
    /// been reached.
    fn is_terminal_state(&self, state: &str) -> bool;
}

/// Deterministic oracle for exercising the search without a language model.
///
/// Proposes the same weighted actions at every expansion and answers every
/// sub-question with a fixed text, turning the answer terminal once the
/// path reaches `terminal_depth` (or when forced).
#[derive(Debug, Clone)]
pub struct StaticOracle {
    actions: Vec<(String, f64)>,
    answer: String,
    confidence: f64,
    terminal_depth: u32,
}

impl StaticOracle {
    pub const MARKER: &'static str = "Now we can answer the question.";

    pub fn new(
        actions: Vec<(String, f64)>,
        answer: impl Into<String>,
        confidence: f64,
        terminal_depth: u32,
    ) -> Self {
        Self {
            actions,
            answer: answer.into(),
            confidence,
            terminal_depth,
        }
    }
}

#[async_trait]
impl Oracle for StaticOracle {
    async fn generate_actions(
        &self,
        _problem: &str,
        _trace: &[Step],
    ) -> Result<Vec<String>, OracleError> {
        Ok(self.actions.iter().map(|(action, _)| action.clone()).collect())
    }

    async fn fast_reward(
        &self,
        _problem: &str,
        _trace: &[Step],
        action: &str,
    ) -> Result<f64, OracleError> {
        Ok(self
            .actions
            .iter()
            .find(|(a, _)| a == action)
            .map(|(_, reward)| *reward)
            .unwrap_or(0.5))
    }

    async fn evaluate_state(
        &self,
        _problem: &str,
        trace: &[Step],
        _action: &str,
        forced: bool,
    ) -> Result<StateEval, OracleError> {
        // The node being evaluated sits one step past the trace.
        let depth = trace.len() as u32 + 1;
        let state = if forced || depth >= self.terminal_depth {
            format!("{} {}", Self::MARKER, self.answer)
        } else {
            self.answer.clone()
        };
        Ok(StateEval {
            state,
            confidence: self.confidence,
        })
    }

    fn is_terminal_state(&self, state: &str) -> bool {
        state.contains("Now we can answer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> StaticOracle {
        StaticOracle::new(
            vec![("first?".into(), 0.9), ("second?".into(), 0.4)],
            "The answer is 7.",
            0.8,
            2,
        )
    }

    #[tokio::test]
    async fn test_static_oracle_actions_and_rewards() {
        let oracle = oracle();
        let actions = oracle.generate_actions("p", &[]).await.unwrap();
        assert_eq!(actions, vec!["first?".to_string(), "second?".to_string()]);

        assert!((oracle.fast_reward("p", &[], "second?").await.unwrap() - 0.4).abs() < 1e-9);
        assert!((oracle.fast_reward("p", &[], "unknown?").await.unwrap() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_static_oracle_turns_terminal_at_depth() {
        let oracle = oracle();

        let shallow = oracle.evaluate_state("p", &[], "first?", false).await.unwrap();
        assert!(!oracle.is_terminal_state(&shallow.state));

        let step = Step {
            sub_question: "first?".into(),
            sub_answer: "The answer is 7.".into(),
        };
        let deep = oracle
            .evaluate_state("p", &[step], "second?", false)
            .await
            .unwrap();
        assert!(oracle.is_terminal_state(&deep.state));
    }

    #[tokio::test]
    async fn test_static_oracle_forced_is_always_terminal() {
        let oracle = oracle();
        let eval = oracle.evaluate_state("p", &[], "first?", true).await.unwrap();
        assert!(oracle.is_terminal_state(&eval.state));
        assert!((eval.confidence - 0.8).abs() < 1e-9);
    }
}
