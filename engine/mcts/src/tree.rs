//! Search tree with arena allocation.
//!
//! The tree uses arena allocation for node storage: nodes live in a
//! contiguous Vec and reference each other by `NodeId` indices, so child
//! edges are owned by the arena while `parent` stays a non-owning index.
//! Node ids are allocated per tree and never reset globally.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::node::{Node, NodeId};
use crate::oracle::Step;

/// Structural invariant violations. These cannot occur in the sequential
/// search driver given its `children == None` guard.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {} was already expanded", .0 .0)]
    AlreadyExpanded(NodeId),
}

/// Specification of one child to attach during expansion.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub action: String,
    pub fast_reward: f64,
    pub fast_reward_details: BTreeMap<String, f64>,
}

/// Cum-reward entries recorded for one rollout during backpropagation.
#[derive(Debug, Clone, Copy)]
pub struct BackpropRecord {
    /// Entry recorded at the rollout's deepest node (its own reward).
    pub leaf_cum_reward: f64,
    /// Entry recorded at the root: the total path reward for this sample.
    pub total_reward: f64,
}

/// Reasoning search tree with arena-based node storage.
///
/// One tree serves one reasoning session; independent sessions must build
/// independent trees.
#[derive(Debug)]
pub struct SearchTree {
    /// Arena storing all nodes
    nodes: Vec<Node>,

    /// Root node index (always 0 after initialization)
    root: NodeId,

    /// The original problem statement this tree decomposes.
    problem: String,
}

impl SearchTree {
    /// Create a new tree rooted at the given problem statement.
    pub fn new(problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self {
            nodes: vec![Node::new_root(problem.clone())],
            root: NodeId(0),
            problem,
        }
    }

    /// Get the root node ID.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The problem statement this tree was built for.
    #[inline]
    pub fn problem(&self) -> &str {
        &self.problem
    }

    /// Get a reference to a node by ID.
    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Get a mutable reference to a node by ID.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Get the total number of nodes in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty (should never be true after construction).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the arena slice for read access.
    #[inline]
    pub fn arena(&self) -> &[Node] {
        &self.nodes
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Attach children to `parent_id`. Expansion is at-most-once: a second
    /// call for the same node is a structural error, and the attached list
    /// (possibly empty) is never reassigned.
    pub fn add_children(
        &mut self,
        parent_id: NodeId,
        specs: Vec<ChildSpec>,
    ) -> Result<Vec<NodeId>, TreeError> {
        if self.get(parent_id).is_expanded() {
            return Err(TreeError::AlreadyExpanded(parent_id));
        }

        let depth = self.get(parent_id).depth + 1;
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let child = Node::new_child(
                parent_id,
                depth,
                spec.action,
                spec.fast_reward,
                spec.fast_reward_details,
            );
            ids.push(self.allocate(child));
        }

        self.get_mut(parent_id).children = Some(ids.clone());
        Ok(ids)
    }

    /// Select the child of `node_id` maximizing the UCT score. The first
    /// child in creation order wins ties, keeping selection deterministic.
    /// Returns None if the node has no children.
    pub fn select_child(&self, node_id: NodeId, exploration_weight: f64) -> Option<NodeId> {
        let node = self.get(node_id);
        let children = node.children.as_deref()?;

        // Clamp to one visit before the logarithm: a parent that no backprop
        // pass has touched yet must not poison every score with ln(0).
        let ln_parent = (node.visits().max(1) as f64).ln();

        let mut best: Option<(NodeId, f64)> = None;
        for &child_id in children {
            let score = self.get(child_id).uct_score(ln_parent, exploration_weight);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((child_id, score)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Child of `node_id` with the greatest fast reward (greedy rollout
    /// step). First in creation order wins ties.
    pub fn best_child_by_fast_reward(&self, node_id: NodeId) -> Option<NodeId> {
        let children = self.get(node_id).children.as_deref()?;

        let mut best: Option<(NodeId, f64)> = None;
        for &child_id in children {
            let fast_reward = self.get(child_id).fast_reward;
            match best {
                Some((_, best_reward)) if fast_reward <= best_reward => {}
                _ => best = Some((child_id, fast_reward)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Completed (sub-question, sub-answer) steps for the non-root nodes of
    /// `path`, in root-to-leaf order. Unset fields render as empty strings.
    pub fn steps(&self, path: &[NodeId]) -> Vec<Step> {
        path.iter()
            .filter(|&&id| id != self.root)
            .map(|&id| {
                let node = self.get(id);
                Step {
                    sub_question: node.action.clone().unwrap_or_default(),
                    sub_answer: node.state.clone().unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Backpropagate one rollout leaf-first: each node on the path records
    /// the reward sum from itself down to the rollout's leaf, so the root
    /// ends up with the total path reward for this sample.
    pub fn backpropagate(&mut self, path: &[NodeId]) -> BackpropRecord {
        let mut total = 0.0;
        let mut leaf_cum_reward = 0.0;

        for (i, &id) in path.iter().rev().enumerate() {
            let node = self.get_mut(id);
            total += node.reward;
            if i == 0 {
                leaf_cum_reward = total;
            }
            node.cum_rewards.push(total);
        }

        BackpropRecord {
            leaf_cum_reward,
            total_reward: total,
        }
    }

    /// Get statistics about the tree for debugging.
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            total_nodes: self.nodes.len(),
            root_visits: self.get(self.root).visits(),
            max_depth: self.nodes.iter().map(|n| n.depth).max().unwrap_or(0),
        }
    }
}

/// Statistics about a search tree.
#[derive(Debug, Clone)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub root_visits: usize,
    pub max_depth: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(action: &str, fast_reward: f64) -> ChildSpec {
        ChildSpec {
            action: action.into(),
            fast_reward,
            fast_reward_details: BTreeMap::from([("r_useful".to_string(), fast_reward)]),
        }
    }

    #[test]
    fn test_new_tree() {
        let tree = SearchTree::new("how many slices?");

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), NodeId(0));
        assert_eq!(tree.problem(), "how many slices?");

        let root = tree.get(tree.root());
        assert!(root.parent.is_none());
        assert_eq!(root.depth, 0);
        assert!(root.action.is_none());
        assert_eq!(root.state.as_deref(), Some("how many slices?"));
    }

    #[test]
    fn test_add_children_links_both_directions() {
        let mut tree = SearchTree::new("p");

        let ids = tree
            .add_children(tree.root(), vec![spec("a", 0.3), spec("b", 0.7)])
            .unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(ids, vec![NodeId(1), NodeId(2)]);
        assert_eq!(tree.get(tree.root()).children.as_deref(), Some(&ids[..]));

        for &id in &ids {
            let child = tree.get(id);
            assert_eq!(child.parent, tree.root());
            assert_eq!(child.depth, 1);
            assert!(child.state.is_none());
            assert!(!child.is_terminal);
        }
        assert_eq!(tree.get(ids[0]).action.as_deref(), Some("a"));
    }

    #[test]
    fn test_add_children_is_at_most_once() {
        let mut tree = SearchTree::new("p");
        tree.add_children(tree.root(), vec![spec("a", 0.5)]).unwrap();

        let err = tree
            .add_children(tree.root(), vec![spec("b", 0.9)])
            .unwrap_err();
        assert_eq!(err, TreeError::AlreadyExpanded(NodeId(0)));

        // The original child list survives untouched.
        assert_eq!(tree.get(tree.root()).children.as_deref(), Some(&[NodeId(1)][..]));
    }

    #[test]
    fn test_empty_expansion_still_marks_node_expanded() {
        let mut tree = SearchTree::new("p");
        tree.add_children(tree.root(), Vec::new()).unwrap();

        assert!(tree.get(tree.root()).is_expanded());
        assert_eq!(tree.add_children(tree.root(), Vec::new()), Err(TreeError::AlreadyExpanded(NodeId(0))));
    }

    #[test]
    fn test_backpropagate_chain() {
        let mut tree = SearchTree::new("p");
        let child = tree.add_children(tree.root(), vec![spec("a", 0.5)]).unwrap()[0];
        let grandchild = tree.add_children(child, vec![spec("b", 0.25)]).unwrap()[0];

        // Pretend both were evaluated with these realized rewards.
        tree.get_mut(child).reward = 0.5;
        tree.get_mut(grandchild).reward = 0.25;

        let record = tree.backpropagate(&[tree.root(), child, grandchild]);

        assert!((record.leaf_cum_reward - 0.25).abs() < 1e-9);
        assert!((record.total_reward - 0.75).abs() < 1e-9);
        assert_eq!(tree.get(grandchild).cum_rewards, vec![0.25]);
        assert_eq!(tree.get(child).cum_rewards, vec![0.75]);
        assert_eq!(tree.get(tree.root()).cum_rewards, vec![0.75]);
    }

    #[test]
    fn test_select_child_prefers_higher_q_and_breaks_ties_first() {
        let mut tree = SearchTree::new("p");
        let ids = tree
            .add_children(tree.root(), vec![spec("a", 0.4), spec("b", 0.4), spec("c", 0.6)])
            .unwrap();

        // Unvisited parent: ln is clamped, scores reduce to fast rewards.
        assert_eq!(tree.select_child(tree.root(), 1.0), Some(ids[2]));

        // Exact tie between the first two once "c" is removed from contention.
        tree.get_mut(ids[2]).fast_reward = 0.0;
        assert_eq!(tree.select_child(tree.root(), 1.0), Some(ids[0]));
    }

    #[test]
    fn test_select_child_exploration_bonus_favors_unvisited() {
        let mut tree = SearchTree::new("p");
        let ids = tree
            .add_children(tree.root(), vec![spec("a", 0.9), spec("b", 0.85)])
            .unwrap();

        // "a" was rolled out with a mediocre outcome; parent visited twice.
        tree.get_mut(ids[0]).state = Some("answer a".into());
        tree.get_mut(ids[0]).cum_rewards = vec![0.1, 0.1];
        tree.get_mut(tree.root()).cum_rewards = vec![0.1, 0.1];

        // The unvisited sibling keeps its fast reward plus a full bonus.
        assert_eq!(tree.select_child(tree.root(), 1.0), Some(ids[1]));
    }

    #[test]
    fn test_best_child_by_fast_reward_first_wins_ties() {
        let mut tree = SearchTree::new("p");
        let ids = tree
            .add_children(tree.root(), vec![spec("a", 0.8), spec("b", 0.8), spec("c", 0.2)])
            .unwrap();

        assert_eq!(tree.best_child_by_fast_reward(tree.root()), Some(ids[0]));
    }

    #[test]
    fn test_steps_skips_root() {
        let mut tree = SearchTree::new("p");
        let child = tree.add_children(tree.root(), vec![spec("sub?", 0.5)]).unwrap()[0];
        tree.get_mut(child).state = Some("sub answer".into());

        let steps = tree.steps(&[tree.root(), child]);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].sub_question, "sub?");
        assert_eq!(steps[0].sub_answer, "sub answer");
    }

    #[test]
    fn test_tree_stats() {
        let mut tree = SearchTree::new("p");
        let child = tree.add_children(tree.root(), vec![spec("a", 0.5)]).unwrap()[0];
        tree.backpropagate(&[tree.root(), child]);

        let stats = tree.stats();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.root_visits, 1);
        assert_eq!(stats.max_depth, 1);
    }
}
