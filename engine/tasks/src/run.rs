//! Entry point: resolve a task strategy and run one reasoning search.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use mcts::{ConfigError, MctsSearch, SearchConfig, SearchError, Step};

use crate::client::CompletionClient;
use crate::registry;

/// Errors surfaced by [`run_search`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no task strategy registered for kind {0:?}")]
    UnknownTask(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Outcome of one reasoning run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// State text of the chosen path's deepest node.
    pub final_answer: String,
    /// The chosen reasoning path as (sub-question, sub-answer) pairs.
    pub trace: Vec<Step>,
}

/// Run one search over `problem` with the strategy registered for
/// `task_kind`. The configuration is validated and the strategy resolved
/// before any tree is built.
pub async fn run_search(
    problem: &str,
    task_kind: &str,
    client: Arc<dyn CompletionClient>,
    config: SearchConfig,
) -> Result<RunOutput, RunError> {
    config.validate()?;
    let oracle = registry::create_oracle(task_kind, client, &config)
        .ok_or_else(|| RunError::UnknownTask(task_kind.to_string()))?;

    info!(task_kind, iterations = config.iterations, "starting search");
    let mut search = MctsSearch::new(problem, oracle.as_ref(), config);
    let result = search.run().await?;
    info!(
        chosen_iteration = result.chosen_iteration,
        trace_len = result.trace.len(),
        "search complete"
    );

    Ok(RunOutput {
        final_answer: result.final_answer,
        trace: result.trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ClientError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ClientError::Request("script exhausted".into()))
        }
    }

    #[tokio::test]
    async fn test_unknown_task_is_rejected_before_searching() {
        let client = ScriptedClient::new(vec![]);
        let err = run_search("problem", "chess", client, SearchConfig::for_testing())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::UnknownTask(kind) if kind == "chess"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let client = ScriptedClient::new(vec![]);
        let config = SearchConfig::for_testing().with_iterations(0);
        let err = run_search("problem", "math", client, config).await.unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[tokio::test]
    async fn test_math_search_end_to_end() {
        // for_testing: one iteration, two samples per oracle call. The
        // duplicate sub-question collapses to a single child, both
        // usefulness votes are Yes, and both sub-answers agree and close
        // out the root problem.
        let client = ScriptedClient::new(vec![
            "Question 5.1: How many slices are there in total?",
            "Question 5.1: How many slices are there in total?",
            "Yes",
            "Yes",
            "Now we can answer the question. The answer is 14.",
            "Now we can answer the question. The answer is 14.",
        ]);

        let output = run_search(
            "7 pizzas are cut into 8 slices each and shared by 4 people. \
             How many slices does each person get?",
            "math",
            client,
            SearchConfig::for_testing(),
        )
        .await
        .unwrap();

        assert_eq!(
            output.final_answer,
            "Now we can answer the question. The answer is 14."
        );
        assert_eq!(output.trace.len(), 1);
        assert_eq!(
            output.trace[0].sub_question,
            "How many slices are there in total?"
        );
        assert_eq!(output.trace[0].sub_answer, output.final_answer);
    }
}
