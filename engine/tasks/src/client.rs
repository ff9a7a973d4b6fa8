//! Completion transport used by task strategies.
//!
//! Real LLM clients are external collaborators: strategies only see this
//! trait. The helper below fans a batch of identical completions out with
//! bounded parallelism while preserving index order.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::warn;

use mcts::oracle::OracleError;

/// Errors raised by a completion transport.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("completion request failed: {0}")]
    Request(String),
}

impl From<ClientError> for OracleError {
    fn from(err: ClientError) -> Self {
        OracleError::Transport(err.to_string())
    }
}

/// Minimal surface of a chat/completion model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sample one completion for `prompt`, capped at `max_tokens`.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ClientError>;
}

/// Dispatch `count` independent completions of the same prompt with bounded
/// fan-out, joining them all before returning. Index order is preserved.
/// Failed samples are dropped from the result; the call errors only when
/// every sample failed.
pub(crate) async fn sample_completions(
    client: &dyn CompletionClient,
    prompt: &str,
    max_tokens: u32,
    count: usize,
    fan_out: usize,
) -> Result<Vec<String>, ClientError> {
    let results: Vec<Result<String, ClientError>> = stream::iter(0..count)
        .map(|_| client.complete(prompt, max_tokens))
        .buffered(fan_out.max(1))
        .collect()
        .await;

    let mut outputs = Vec::with_capacity(count);
    let mut last_err = None;
    for result in results {
        match result {
            Ok(text) => outputs.push(text),
            Err(err) => {
                warn!(%err, "completion sample failed");
                last_err = Some(err);
            }
        }
    }

    if outputs.is_empty() {
        if let Some(err) = last_err {
            return Err(err);
        }
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Client that pops scripted responses in dispatch order.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String, String>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(String::from).map_err(String::from))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ClientError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err("script exhausted".to_string()))
                .map_err(ClientError::Request)
        }
    }

    #[tokio::test]
    async fn test_sample_completions_preserves_order() {
        let client = ScriptedClient::new(vec![Ok("one"), Ok("two"), Ok("three")]);
        let samples = sample_completions(&client, "p", 16, 3, 1).await.unwrap();
        assert_eq!(samples, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_sample_completions_drops_failed_samples() {
        let client = ScriptedClient::new(vec![Ok("one"), Err("boom"), Ok("three")]);
        let samples = sample_completions(&client, "p", 16, 3, 1).await.unwrap();
        assert_eq!(samples, vec!["one", "three"]);
    }

    #[tokio::test]
    async fn test_sample_completions_errors_when_all_fail() {
        let client = ScriptedClient::new(vec![Err("a"), Err("b")]);
        let err = sample_completions(&client, "p", 16, 2, 1).await.unwrap_err();
        assert!(err.to_string().contains("b"));
    }

    #[tokio::test]
    async fn test_zero_count_yields_empty() {
        let client = ScriptedClient::new(vec![]);
        let samples = sample_completions(&client, "p", 16, 0, 1).await.unwrap();
        assert!(samples.is_empty());
    }
}
