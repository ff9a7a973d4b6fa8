//! Task strategies for the RAP search core.
//!
//! The `mcts` crate drives the tree search; this crate supplies the
//! oracles that ground it in a concrete task. A strategy turns the
//! search's oracle calls into prompts against a [`CompletionClient`],
//! and the registry resolves strategies by task kind string.
//!
//! Typical usage goes through [`run_search`]:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tasks::{run_search, SearchConfig};
//!
//! let client: Arc<dyn tasks::CompletionClient> = Arc::new(my_llm_client);
//! let output = run_search(problem, "math", client, SearchConfig::default()).await?;
//! println!("{}", output.final_answer);
//! ```

pub mod client;
pub mod math;
pub mod registry;
pub mod run;

pub use client::{ClientError, CompletionClient};
pub use math::{MathOracle, MathPrompts, FINAL_ANSWER_MARKER};
pub use registry::{
    create_oracle, is_registered, list_registered_tasks, register_task, OracleFactory,
};
pub use run::{run_search, RunError, RunOutput};

pub use mcts::SearchConfig;
