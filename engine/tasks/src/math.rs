//! Math task strategy: GSM8K-style sub-question decomposition.
//!
//! Implements the [`Oracle`] contract on top of a completion transport.
//! Reasoning paths render as numbered question/answer lists (`Question
//! {qid}.{i}` / `Answer {qid}.{i}`, with `qid` offset past the in-context
//! examples), sub-question usefulness is judged by sampled yes/no votes,
//! and sub-answers are settled by majority vote over extracted
//! "The answer is ..." values.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use mcts::oracle::{Oracle, OracleError, StateEval, Step};
use mcts::SearchConfig;

use crate::client::{sample_completions, CompletionClient};

/// Marker prefixed onto answers that close out the root problem.
pub const FINAL_ANSWER_MARKER: &str = "Now we can answer the question.";

/// Substring that flags a state as terminal. Looser than the full marker so
/// free-form judge phrasing still terminates the path.
const TERMINAL_HINT: &str = "Now we can answer";

const COMPLETION_MAX_TOKENS: u32 = 2048;
const JUDGMENT_MAX_TOKENS: u32 = 1;

static ANSWER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".*The answer is .*?([ $.0-9,\-=]+).*\..*").expect("static pattern"));

/// Prompt preambles for the math strategy. Real deployments load few-shot
/// example files into these; the defaults are bare instructions.
#[derive(Debug, Clone)]
pub struct MathPrompts {
    /// Preamble for sub-question generation and sub-question answering.
    pub decomposition: String,
    /// Preamble for the yes/no usefulness judgment.
    pub usefulness: String,
}

impl Default for MathPrompts {
    fn default() -> Self {
        Self {
            decomposition: "Solve the question by decomposing it into smaller sub-questions. \
                Answer each sub-question with one sentence ending in \"The answer is <value>.\"."
                .to_string(),
            usefulness: "Given the question and the sub-questions asked so far, judge whether \
                the new sub-question is useful for reaching the final answer. Answer Yes or No."
                .to_string(),
        }
    }
}

/// Language-model-backed oracle for math word problems.
pub struct MathOracle {
    client: Arc<dyn CompletionClient>,
    config: SearchConfig,
    prompts: MathPrompts,
}

impl MathOracle {
    pub fn new(client: Arc<dyn CompletionClient>, config: SearchConfig) -> Self {
        Self {
            client,
            config,
            prompts: MathPrompts::default(),
        }
    }

    /// Builder pattern: replace the prompt preambles.
    pub fn with_prompts(mut self, prompts: MathPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// The question number assigned to the problem under search: the
    /// in-context examples occupy numbers 1..=n_shot.
    fn qid(&self) -> usize {
        self.config.n_shot + 1
    }

    /// `Question {qid}.{next}: ` prefix the model tends to echo back.
    fn question_prefix(&self, index: usize) -> String {
        format!("Question {}.{}: ", self.qid(), index)
    }

    fn actions_prompt(&self, problem: &str, trace: &[Step]) -> String {
        let qid = self.qid();
        let mut info = format!("Question {qid}: {problem}\n");
        for (i, step) in trace.iter().enumerate() {
            let idx = i + 1;
            info.push_str(&format!("Question {qid}.{idx}: {}\n", step.sub_question));
            info.push_str(&format!("Answer {qid}.{idx}: {}\n", step.sub_answer));
        }
        info.push_str(&format!("Question {qid}.{}:", trace.len() + 1));
        format!("{}\n\n{info}", self.prompts.decomposition)
    }

    fn usefulness_prompt(&self, problem: &str, trace: &[Step], action: &str) -> String {
        let qid = self.qid();
        let mut info = format!("Question {qid}: {problem}\n");
        for (i, step) in trace.iter().enumerate() {
            info.push_str(&format!("Question {qid}.{}: {}\n", i + 1, step.sub_question));
        }
        info.push_str(&format!(
            "New question {qid}.{}: {action}",
            trace.len() + 1
        ));
        format!("{}\n\n{info}", self.prompts.usefulness)
    }

    fn answer_prompt(&self, problem: &str, trace: &[Step], action: &str, forced: bool) -> String {
        let qid = self.qid();
        let next = trace.len() + 1;
        let mut info = format!("Question {qid}: {problem}\n");
        for (i, step) in trace.iter().enumerate() {
            let idx = i + 1;
            info.push_str(&format!("Question {qid}.{idx}: {}\n", step.sub_question));
            info.push_str(&format!("Answer {qid}.{idx}: {}\n", step.sub_answer));
        }
        info.push_str(&format!("Question {qid}.{next}: {action}\n"));
        info.push_str(&format!("Answer {qid}.{next}:"));
        if forced {
            // Steer the model into closing out the root problem.
            info.push_str(&format!(" {FINAL_ANSWER_MARKER}"));
        }
        format!("{}\n\n{info}", self.prompts.decomposition)
    }
}

#[async_trait]
impl Oracle for MathOracle {
    async fn generate_actions(
        &self,
        problem: &str,
        trace: &[Step],
    ) -> Result<Vec<String>, OracleError> {
        let prompt = self.actions_prompt(problem, trace);
        let samples = sample_completions(
            self.client.as_ref(),
            &prompt,
            COMPLETION_MAX_TOKENS,
            self.config.branching_factor,
            self.config.sample_fan_out,
        )
        .await?;

        let prefix = self.question_prefix(trace.len() + 1);
        Ok(samples
            .into_iter()
            .map(|sample| {
                let line = sample.lines().next().unwrap_or("").trim();
                line.replace(&prefix, "")
            })
            .collect())
    }

    async fn fast_reward(
        &self,
        problem: &str,
        trace: &[Step],
        action: &str,
    ) -> Result<f64, OracleError> {
        let prompt = self.usefulness_prompt(problem, trace, action);
        let samples = sample_completions(
            self.client.as_ref(),
            &prompt,
            JUDGMENT_MAX_TOKENS,
            self.config.fast_reward_samples,
            self.config.sample_fan_out,
        )
        .await?;

        let yes = samples.iter().filter(|s| s.contains("Yes")).count();
        Ok(yes as f64 / self.config.fast_reward_samples as f64)
    }

    async fn evaluate_state(
        &self,
        problem: &str,
        trace: &[Step],
        action: &str,
        forced: bool,
    ) -> Result<StateEval, OracleError> {
        let prompt = self.answer_prompt(problem, trace, action, forced);
        let samples = sample_completions(
            self.client.as_ref(),
            &prompt,
            COMPLETION_MAX_TOKENS,
            self.config.state_eval_samples,
            self.config.sample_fan_out,
        )
        .await?;

        // Majority vote over extracted answers. Groups keep first-seen
        // order so size ties resolve to the earliest answer.
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for sample in &samples {
            let line = sample.lines().next().unwrap_or("").trim().to_string();
            let Some(answer) = extract_answer(&line) else {
                continue;
            };
            match groups.iter_mut().find(|(a, _)| *a == answer) {
                Some((_, outputs)) => outputs.push(line),
                None => groups.push((answer, vec![line])),
            }
        }

        let mut modal: Option<&(String, Vec<String>)> = None;
        for group in &groups {
            match modal {
                Some(best) if group.1.len() <= best.1.len() => {}
                _ => modal = Some(group),
            }
        }

        match modal {
            Some((_, outputs)) => {
                let confidence = outputs.len() as f64 / self.config.state_eval_samples as f64;
                let mut state = outputs[0].clone();
                if forced {
                    state = format!("{FINAL_ANSWER_MARKER} {state}");
                }
                Ok(StateEval { state, confidence })
            }
            None => {
                warn!(
                    samples = samples.len(),
                    "no parseable answer among state evaluation samples"
                );
                let state = if forced {
                    FINAL_ANSWER_MARKER.to_string()
                } else {
                    String::new()
                };
                Ok(StateEval {
                    state,
                    confidence: 0.0,
                })
            }
        }
    }

    fn is_terminal_state(&self, state: &str) -> bool {
        state.contains(TERMINAL_HINT)
    }
}

/// Pull the final value out of a "... The answer is <value>." sentence.
/// Commas, dollar signs, and spaces are stripped; when the value is an
/// equation only the right-hand side of the last `=` is kept.
fn extract_answer(output: &str) -> Option<String> {
    let caps = ANSWER_RE.captures(output)?;
    let mut answer = caps.get(1)?.as_str().replace([',', '$', ' '], "");
    if let Some(idx) = answer.rfind('=') {
        answer = answer[idx + 1..].to_string();
    }
    Some(answer)
}
