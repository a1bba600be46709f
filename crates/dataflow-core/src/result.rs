//! Query surface of a finished analysis

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::cfg::{BlockId, ControlFlowGraph, GraphId};
use crate::lattice::{AbstractValue, Store};
use crate::node::{LocalVar, NodeId, TreeId};
use crate::transfer::TransferInput;

/// Re-runs one block of an analysed graph to answer store queries
pub(crate) trait BlockReplay<V, S>: Send + Sync {
    fn cfg(&self) -> &ControlFlowGraph;

    /// `(before, after)` stores around `target` in execution order, starting
    /// the block from `input`
    fn stores_around(&self, target: NodeId, input: &TransferInput<S>, node_values: &HashMap<NodeId, V>) -> Option<(S, S)>;
}

/// Values and stores computed by an analysis
///
/// Every query answers `None` when the analysis has no information: the node
/// was never reached, the tree was never mapped, or the node belongs to a
/// graph this result did not analyse.
pub struct AnalysisResult<V, S> {
    pub(crate) node_values: HashMap<NodeId, V>,
    pub(crate) tree_lookup: HashMap<TreeId, NodeId>,
    pub(crate) inputs: HashMap<BlockId, TransferInput<S>>,
    pub(crate) final_local_values: HashMap<LocalVar, V>,
    pub(crate) replays: HashMap<GraphId, Arc<dyn BlockReplay<V, S>>>,
}

impl<V: AbstractValue, S: Store> AnalysisResult<V, S> {
    /// An empty result, to `combine` others into
    pub fn new() -> Self {
        Self {
            node_values: HashMap::new(),
            tree_lookup: HashMap::new(),
            inputs: HashMap::new(),
            final_local_values: HashMap::new(),
            replays: HashMap::new(),
        }
    }

    pub fn value(&self, node: NodeId) -> Option<&V> {
        self.node_values.get(&node)
    }

    pub fn value_for_tree(&self, tree: TreeId) -> Option<&V> {
        self.value(self.node_for_tree(tree)?)
    }

    pub fn node_for_tree(&self, tree: TreeId) -> Option<NodeId> {
        self.tree_lookup.get(&tree).copied()
    }

    /// Store immediately before `node` executes
    pub fn store_before(&self, node: NodeId) -> Option<S> {
        self.stores_around(node).map(|(before, _)| before)
    }

    /// Store immediately after `node` executes
    pub fn store_after(&self, node: NodeId) -> Option<S> {
        self.stores_around(node).map(|(_, after)| after)
    }

    pub fn store_before_tree(&self, tree: TreeId) -> Option<S> {
        self.store_before(self.node_for_tree(tree)?)
    }

    pub fn store_after_tree(&self, tree: TreeId) -> Option<S> {
        self.store_after(self.node_for_tree(tree)?)
    }

    fn stores_around(&self, node: NodeId) -> Option<(S, S)> {
        let replay = self.replays.get(&node.graph)?;
        let block = replay.cfg().node(node)?.block();
        let input = self.inputs.get(&block)?;
        replay.stores_around(node, input, &self.node_values)
    }

    /// Recorded input of a block: its entry side forward, exit side backward
    pub fn input_of(&self, block: BlockId) -> Option<&TransferInput<S>> {
        self.inputs.get(&block)
    }

    pub fn final_local_value(&self, var: &LocalVar) -> Option<&V> {
        self.final_local_values.get(var)
    }

    pub fn final_local_values(&self) -> &HashMap<LocalVar, V> {
        &self.final_local_values
    }

    pub fn node_values(&self) -> &HashMap<NodeId, V> {
        &self.node_values
    }

    pub fn tree_lookup(&self) -> &HashMap<TreeId, NodeId> {
        &self.tree_lookup
    }

    pub fn block_inputs(&self) -> &HashMap<BlockId, TransferInput<S>> {
        &self.inputs
    }

    /// Merge `other` into this result; on overlapping keys `other` wins.
    ///
    /// Meant for stitching results of disjoint graphs, whose ids never overlap.
    pub fn combine(&mut self, other: &AnalysisResult<V, S>) {
        self.node_values
            .extend(other.node_values.iter().map(|(k, v)| (*k, v.clone())));
        self.tree_lookup.extend(other.tree_lookup.iter().map(|(k, v)| (*k, *v)));
        self.inputs
            .extend(other.inputs.iter().map(|(k, v)| (*k, v.clone())));
        self.final_local_values
            .extend(other.final_local_values.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.replays
            .extend(other.replays.iter().map(|(k, v)| (*k, Arc::clone(v))));
    }
}

impl<V: AbstractValue, S: Store> Default for AnalysisResult<V, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone, S: Clone> Clone for AnalysisResult<V, S> {
    fn clone(&self) -> Self {
        Self {
            node_values: self.node_values.clone(),
            tree_lookup: self.tree_lookup.clone(),
            inputs: self.inputs.clone(),
            final_local_values: self.final_local_values.clone(),
            replays: self.replays.clone(),
        }
    }
}

impl<V: PartialEq, S: PartialEq> PartialEq for AnalysisResult<V, S> {
    fn eq(&self, other: &Self) -> bool {
        self.node_values == other.node_values
            && self.tree_lookup == other.tree_lookup
            && self.inputs == other.inputs
            && self.final_local_values == other.final_local_values
    }
}

impl<V: fmt::Debug, S: fmt::Debug> fmt::Debug for AnalysisResult<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisResult")
            .field("node_values", &self.node_values)
            .field("tree_lookup", &self.tree_lookup)
            .field("inputs", &self.inputs)
            .field("final_local_values", &self.final_local_values)
            .field("graphs", &self.replays.keys().collect::<Vec<_>>())
            .finish()
    }
}
