//! Search driver implementing the RAP loop:
//! 1. Selection: UCT descent from the root to an expandable node
//! 2. Expansion: lazy state evaluation plus fast-reward-scored children
//! 3. Simulation: greedy rollout along the best fast rewards
//! 4. Backpropagation: cum-reward statistics along the realized path
//!
//! One rollout path is recorded per iteration; the reported path is chosen
//! once at the end.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::SearchConfig;
use crate::node::NodeId;
use crate::oracle::{Oracle, OracleError, StateEval, Step};
use crate::tree::{ChildSpec, SearchTree, TreeError};

/// Errors that can occur during a search run.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("search produced no candidate paths")]
    NoCandidates,
}

/// One finished rollout: the realized path plus the cum-reward entries
/// recorded for it during backpropagation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: Vec<NodeId>,
    /// Cum-reward entry recorded at the path's deepest node in this pass.
    pub leaf_cum_reward: f64,
    /// Total path reward recorded at the root in this pass.
    pub total_reward: f64,
}

/// Final outcome of a search run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// State text of the chosen path's deepest node.
    pub final_answer: String,

    /// The chosen path as ordered (sub-question, sub-answer) pairs.
    pub trace: Vec<Step>,

    /// Which iteration produced the chosen path.
    pub chosen_iteration: usize,

    /// Number of iterations performed.
    pub iterations: u32,
}

/// Search state for one reasoning session. Sessions never share trees;
/// node ids are scoped to this instance.
pub struct MctsSearch<'a, O: Oracle + ?Sized> {
    tree: SearchTree,
    oracle: &'a O,
    config: SearchConfig,
    candidates: Vec<Candidate>,
}

impl<'a, O: Oracle + ?Sized> MctsSearch<'a, O> {
    /// Create a search over a freshly rooted tree.
    pub fn new(problem: impl Into<String>, oracle: &'a O, config: SearchConfig) -> Self {
        Self {
            tree: SearchTree::new(problem),
            oracle,
            config,
            candidates: Vec::new(),
        }
    }

    /// Run the configured number of iterations and pick the final path.
    pub async fn run(&mut self) -> Result<SearchResult, SearchError> {
        for iteration in 0..self.config.iterations {
            let mut path = self.select();
            self.expand(&path).await?;
            self.simulate(&mut path).await?;

            let record = self.tree.backpropagate(&path);
            trace!(
                iteration,
                path_len = path.len(),
                total_reward = record.total_reward,
                "rollout complete"
            );
            self.candidates.push(Candidate {
                path,
                leaf_cum_reward: record.leaf_cum_reward,
                total_reward: record.total_reward,
            });
        }

        let chosen = self.final_path_index();
        let candidate = self.candidates.get(chosen).ok_or(SearchError::NoCandidates)?;
        let trace = self.tree.steps(&candidate.path);
        let final_answer = candidate
            .path
            .last()
            .and_then(|&id| self.tree.get(id).state.clone())
            .unwrap_or_default();

        let stats = self.tree.stats();
        debug!(
            chosen_iteration = chosen,
            total_nodes = stats.total_nodes,
            max_depth = stats.max_depth,
            "search finished"
        );

        Ok(SearchResult {
            final_answer,
            trace,
            chosen_iteration: chosen,
            iterations: self.config.iterations,
        })
    }

    /// UCT descent from the root. Stops at the first node that has no
    /// children attached, zero children, or sits at the depth limit.
    fn select(&self) -> Vec<NodeId> {
        let mut current = self.tree.root();
        let mut path = vec![current];

        loop {
            let node = self.tree.get(current);
            let expandable = match &node.children {
                None => true,
                Some(children) => children.is_empty(),
            };
            if expandable || node.depth >= self.config.depth_limit {
                break;
            }

            match self.tree.select_child(current, self.config.exploration_weight) {
                Some(child) => {
                    path.push(child);
                    current = child;
                }
                None => break,
            }
        }

        path
    }

    /// Expand the path's tip: evaluate its state if unset, then attach
    /// fast-reward-scored children if it has none and is not terminal.
    async fn expand(&mut self, path: &[NodeId]) -> Result<(), SearchError> {
        let Some(&leaf) = path.last() else {
            return Ok(());
        };
        self.evaluate_leaf(leaf, path).await;
        self.attach_children(leaf, path).await?;
        Ok(())
    }

    /// Lazy state evaluation: answer the leaf's sub-question and blend the
    /// stored fast reward with the judge's confidence into the realized
    /// reward. Oracle failure degrades to zero confidence.
    async fn evaluate_leaf(&mut self, leaf: NodeId, path: &[NodeId]) {
        let node = self.tree.get(leaf);
        if node.state.is_some() {
            return;
        }

        let action = node.action.clone().unwrap_or_default();
        let forced = node.depth >= self.config.depth_limit;
        let r_useful = node.fast_reward;
        let trace = self.tree.steps(&path[..path.len() - 1]);
        let problem = self.tree.problem().to_string();
        let oracle = self.oracle;

        let eval = match call_with_retries(self.config.oracle_retries, "evaluate_state", || {
            oracle.evaluate_state(&problem, &trace, &action, forced)
        })
        .await
        {
            Ok(eval) => eval,
            Err(err) => {
                warn!(%err, node = leaf.0, "state evaluation degraded to zero confidence");
                StateEval {
                    state: String::new(),
                    confidence: 0.0,
                }
            }
        };

        let reward = blended_reward(r_useful, eval.confidence, self.config.reward_blend_exponent);
        let terminal = self.oracle.is_terminal_state(&eval.state);

        let node = self.tree.get_mut(leaf);
        node.reward = reward;
        node.reward_details = BTreeMap::from([
            ("r_useful".to_string(), r_useful),
            ("r_conf".to_string(), eval.confidence),
        ]);
        node.state = Some(eval.state);
        if terminal {
            node.is_terminal = true;
        }
    }

    /// Generate candidate sub-questions, deduplicate them preserving
    /// first-seen order, score each with a fast reward, and attach the
    /// children. Failed actions are dropped; a failed generation leaves an
    /// empty (but expanded) child list.
    async fn attach_children(&mut self, leaf: NodeId, path: &[NodeId]) -> Result<(), SearchError> {
        let node = self.tree.get(leaf);
        if node.is_expanded() || node.is_terminal {
            return Ok(());
        }

        let problem = self.tree.problem().to_string();
        let trace = self.tree.steps(path);
        let oracle = self.oracle;

        let actions = match call_with_retries(self.config.oracle_retries, "generate_actions", || {
            oracle.generate_actions(&problem, &trace)
        })
        .await
        {
            Ok(actions) => actions,
            Err(err) => {
                warn!(%err, node = leaf.0, "action generation failed, node keeps no children");
                Vec::new()
            }
        };

        let mut specs = Vec::new();
        for action in dedup_preserving_order(actions) {
            let reward = call_with_retries(self.config.oracle_retries, "fast_reward", || {
                oracle.fast_reward(&problem, &trace, &action)
            })
            .await;

            match reward {
                Ok(fast_reward) => specs.push(ChildSpec {
                    fast_reward_details: BTreeMap::from([(
                        "r_useful".to_string(),
                        fast_reward,
                    )]),
                    action,
                    fast_reward,
                }),
                Err(err) => {
                    warn!(%err, action = %action, "fast reward failed, dropping action");
                }
            }
        }

        self.tree.add_children(leaf, specs)?;
        Ok(())
    }

    /// Greedy rollout: keep descending into the highest-fast-reward child,
    /// lazily expanding each step, until a terminal, childless, or
    /// depth-limited node is reached.
    async fn simulate(&mut self, path: &mut Vec<NodeId>) -> Result<(), SearchError> {
        loop {
            let Some(&tip) = path.last() else {
                return Ok(());
            };
            let node = self.tree.get(tip);
            let has_children = node.children.as_ref().is_some_and(|c| !c.is_empty());
            if node.is_terminal || !has_children || node.depth >= self.config.depth_limit {
                return Ok(());
            }

            let Some(next) = self.tree.best_child_by_fast_reward(tip) else {
                return Ok(());
            };
            path.push(next);
            self.expand(path).await?;
        }
    }

    /// Final path selection: the candidate whose deepest node recorded the
    /// highest cum reward in its own backprop pass. The earliest iteration
    /// wins ties.
    fn final_path_index(&self) -> usize {
        let mut best = 0;
        for (i, candidate) in self.candidates.iter().enumerate().skip(1) {
            if candidate.leaf_cum_reward > self.candidates[best].leaf_cum_reward {
                best = i;
            }
        }
        best
    }

    /// Get the search tree (for inspection/debugging).
    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    /// One candidate path per completed iteration.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

/// Realized reward: usefulness weighted against judge confidence.
/// `reward = r_useful^alpha * confidence^(1 - alpha)`
fn blended_reward(r_useful: f64, confidence: f64, alpha: f64) -> f64 {
    r_useful.powf(alpha) * confidence.powf(1.0 - alpha)
}

/// First-seen order, exact duplicates only.
fn dedup_preserving_order(actions: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    actions.into_iter().filter(|a| seen.insert(a.clone())).collect()
}

/// Retry one logical oracle call with bounded attempts. The caller decides
/// how to degrade once the attempts are exhausted.
async fn call_with_retries<T, F, Fut>(
    retries: u32,
    call: &str,
    mut f: F,
) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt > retries {
                    return Err(err);
                }
                warn!(%err, attempt, call, "oracle call failed, retrying");
            }
        }
    }
}

/// Convenience function to run a single search.
pub async fn run_mcts<O: Oracle + ?Sized>(
    problem: impl Into<String>,
    oracle: &O,
    config: SearchConfig,
) -> Result<SearchResult, SearchError> {
    let mut search = MctsSearch::new(problem, oracle, config);
    search.run().await
}
