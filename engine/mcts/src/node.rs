//! Reasoning-tree node representation.
//!
//! Each node represents one sub-question (the action) asked from the parent's
//! position and, once evaluated, the sub-answer (the state) the judge settled
//! on. Backprop history (`cum_rewards`) drives UCT selection.

use std::collections::BTreeMap;

use serde::Serialize;

/// Index into the node arena. Using a newtype for type safety; the index
/// doubles as the node id, which is monotonic and scoped to one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }
}

/// A node in the reasoning search tree.
#[derive(Debug, Clone)]
pub struct Node {
    /// Parent node index (NONE for root)
    pub parent: NodeId,

    /// Sub-question that led here from the parent. None only for the root.
    pub action: Option<String>,

    /// Sub-answer produced by state evaluation. None means "not evaluated
    /// yet"; the root is created with the problem statement as its state.
    pub state: Option<String>,

    /// Cheap usefulness estimate assigned at creation, before the state
    /// exists. Fraction of judge samples that considered the action useful.
    pub fast_reward: f64,

    /// Components of the fast reward, keyed by name.
    pub fast_reward_details: BTreeMap<String, f64>,

    /// Realized reward. Mirrors `fast_reward` until the state is evaluated,
    /// then holds the usefulness/confidence blend.
    pub reward: f64,

    /// Components of the realized reward. Empty until evaluation.
    pub reward_details: BTreeMap<String, f64>,

    /// Whether the state signals that the root problem has been answered.
    pub is_terminal: bool,

    /// One entry per backprop pass that touched this node: the reward sum
    /// from this node down to that rollout's leaf.
    pub cum_rewards: Vec<f64>,

    /// Distance from the root (root is 0).
    pub depth: u32,

    /// Children ids. None until expansion ran; Some (possibly empty)
    /// afterwards, and never reassigned.
    pub children: Option<Vec<NodeId>>,
}

impl Node {
    /// Create a new root node holding the problem statement.
    pub fn new_root(problem: String) -> Self {
        Self {
            parent: NodeId::NONE,
            action: None,
            state: Some(problem),
            fast_reward: 0.0,
            fast_reward_details: BTreeMap::new(),
            reward: 0.0,
            reward_details: BTreeMap::new(),
            is_terminal: false,
            cum_rewards: Vec::new(),
            depth: 0,
            children: None,
        }
    }

    /// Create a new unevaluated child node.
    pub fn new_child(
        parent: NodeId,
        depth: u32,
        action: String,
        fast_reward: f64,
        fast_reward_details: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            parent,
            action: Some(action),
            state: None,
            fast_reward,
            fast_reward_details,
            reward: fast_reward,
            reward_details: BTreeMap::new(),
            is_terminal: false,
            cum_rewards: Vec::new(),
            depth,
            children: None,
        }
    }

    /// Number of backprop passes that have touched this node.
    #[inline]
    pub fn visits(&self) -> usize {
        self.cum_rewards.len()
    }

    /// Q value: the best sampled outcome reachable from this node, or the
    /// fast reward while the state has not been evaluated yet.
    ///
    /// Querying Q on an evaluated node that no backprop pass has touched is
    /// a precondition violation.
    #[inline]
    pub fn q(&self) -> f64 {
        if self.state.is_none() {
            return self.fast_reward;
        }
        debug_assert!(
            !self.cum_rewards.is_empty(),
            "Q queried on an evaluated node with no backprop history"
        );
        self.cum_rewards
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// UCT score balancing exploitation (Q) against the visit-count bonus.
    /// `UCT(n) = Q(n) + w * sqrt(ln(N_parent) / max(1, N_n))`
    ///
    /// Note: takes the pre-computed (and clamped, see `SearchTree::select_child`)
    /// `ln(N_parent)` to avoid redundant work when comparing siblings.
    #[inline]
    pub fn uct_score(&self, ln_parent_visits: f64, exploration_weight: f64) -> f64 {
        let visits = self.visits().max(1) as f64;
        self.q() + exploration_weight * (ln_parent_visits / visits).sqrt()
    }

    /// Check if this node has been expanded (children attached, possibly none).
    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }
}
