//! Monte Carlo Tree Search for Reasoning-via-Planning (RAP).
//!
//! This crate implements the search core that decomposes a problem into
//! sub-questions, explores candidate reasoning paths, scores them with an
//! external judge, and selects a final path.
//!
//! # Overview
//!
//! Each search iteration runs four phases over a per-session tree:
//!
//! 1. **Selection**: Traverse the tree using UCT to balance exploration
//!    and exploitation, down to an expandable node
//! 2. **Expansion**: Lazily evaluate the node's state (sub-answer) and
//!    attach fast-reward-scored candidate sub-questions as children
//! 3. **Simulation**: Greedily roll the path out along the best fast
//!    rewards until a terminal or depth-limited node
//! 4. **Backpropagation**: Record cum-reward statistics along the path
//!    from leaf to root
//!
//! The iteration budget is the sole termination condition; the final path
//! is chosen once, afterwards, from the recorded candidates.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcts::{run_mcts, SearchConfig, StaticOracle};
//!
//! let oracle = StaticOracle::new(
//!     vec![("How many slices are there in total?".into(), 0.9)],
//!     "The answer is 14.",
//!     1.0,
//!     3,
//! );
//! let config = SearchConfig::default().with_iterations(8);
//!
//! let result = run_mcts("7 pizzas, 8 slices each, 4 people...", &oracle, config).await?;
//! println!("{}", result.final_answer);
//! ```
//!
//! # Oracles
//!
//! The search requires an [`Oracle`] for action generation, fast-reward
//! judgments, and state evaluation:
//!
//! - [`StaticOracle`]: deterministic canned answers (for testing)
//! - The `tasks` crate provides language-model-backed strategies per task
//!   kind, resolved through its registry

pub mod config;
pub mod node;
pub mod oracle;
pub mod search;
pub mod tree;

// Re-export main types
pub use config::{ConfigError, SearchConfig};
pub use node::{Node, NodeId};
pub use oracle::{Oracle, OracleError, StateEval, StaticOracle, Step};
pub use search::{run_mcts, Candidate, MctsSearch, SearchError, SearchResult};
pub use tree::{BackpropRecord, ChildSpec, SearchTree, TreeError, TreeStats};
