//! Search configuration parameters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    ZeroField(&'static str),

    #[error("reward_blend_exponent must lie in [0, 1], got {0}")]
    ExponentOutOfRange(f64),

    #[error("exploration_weight must be non-negative, got {0}")]
    NegativeExplorationWeight(f64),
}

/// Configuration for the reasoning search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of select/expand/simulate/backprop iterations per search.
    /// The sole termination condition: no adaptive early stopping.
    pub iterations: u32,

    /// Maximum tree depth before the oracle is forced to answer.
    pub depth_limit: u32,

    /// Exploration weight `w` in the UCT formula. Higher values favor
    /// exploration, lower values favor exploitation.
    pub exploration_weight: f64,

    /// Number of candidate sub-questions sampled per expansion (M).
    pub branching_factor: usize,

    /// Number of yes/no usefulness judgments per candidate action (N).
    pub fast_reward_samples: usize,

    /// Number of independent completions per state evaluation (K).
    pub state_eval_samples: usize,

    /// Blend exponent alpha: reward = r_useful^alpha * confidence^(1-alpha).
    /// Usefulness is weighted more than confidence.
    pub reward_blend_exponent: f64,

    /// Number of in-context examples the task strategy prompts with; it
    /// only shifts the question numbering the strategies emit.
    pub n_shot: usize,

    /// Retries per logical oracle call before degrading to the
    /// zero-confidence / drop-this-action fallback.
    pub oracle_retries: u32,

    /// Bounded fan-out for the constituent samples of one oracle call.
    pub sample_fan_out: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            depth_limit: 4,
            exploration_weight: 1.0,
            branching_factor: 3,
            fast_reward_samples: 10,
            state_eval_samples: 5,
            reward_blend_exponent: 0.8,
            n_shot: 4,
            oracle_retries: 2,
            sample_fan_out: 4,
        }
    }
}

impl SearchConfig {
    /// Create a cheap config for testing: one iteration, minimal sampling.
    pub fn for_testing() -> Self {
        Self {
            iterations: 1,
            branching_factor: 2,
            fast_reward_samples: 2,
            state_eval_samples: 2,
            sample_fan_out: 1,
            ..Self::default()
        }
    }

    /// Builder pattern: set the iteration budget.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Builder pattern: set the depth limit.
    pub fn with_depth_limit(mut self, depth_limit: u32) -> Self {
        self.depth_limit = depth_limit;
        self
    }

    /// Builder pattern: set the exploration weight.
    pub fn with_exploration_weight(mut self, w: f64) -> Self {
        self.exploration_weight = w;
        self
    }

    /// Builder pattern: set the branching factor (M).
    pub fn with_branching_factor(mut self, m: usize) -> Self {
        self.branching_factor = m;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroField("iterations"));
        }
        if self.depth_limit == 0 {
            return Err(ConfigError::ZeroField("depth_limit"));
        }
        if self.branching_factor == 0 {
            return Err(ConfigError::ZeroField("branching_factor"));
        }
        if self.fast_reward_samples == 0 {
            return Err(ConfigError::ZeroField("fast_reward_samples"));
        }
        if self.state_eval_samples == 0 {
            return Err(ConfigError::ZeroField("state_eval_samples"));
        }
        if self.sample_fan_out == 0 {
            return Err(ConfigError::ZeroField("sample_fan_out"));
        }
        if !(0.0..=1.0).contains(&self.reward_blend_exponent) {
            return Err(ConfigError::ExponentOutOfRange(self.reward_blend_exponent));
        }
        if self.exploration_weight < 0.0 {
            return Err(ConfigError::NegativeExplorationWeight(
                self.exploration_weight,
            ));
        }
        Ok(())
    }
}
