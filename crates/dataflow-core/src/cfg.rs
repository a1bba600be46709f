//! Control Flow Graph model consumed by the engine
//!
//! Graphs are assembled with [`CfgBuilder`] by whatever lowers the source AST
//! (the lowering itself lives outside this crate). Blocks and nodes receive
//! stable integer ids at construction time; ids carry the [`GraphId`] of the
//! graph that created them so results of different graphs never collide.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{DfsPostOrder, EdgeRef};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::MalformedCfg;
use crate::node::{ExceptionType, LocalVar, Node, NodeId, NodeKind, TreeId};
use crate::solver::Direction;

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(0);

/// Process-unique identifier of a control-flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub u32);

impl GraphId {
    fn fresh() -> Self {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unique identifier for a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId {
    pub graph: GraphId,
    pub index: u32,
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}.{}", self.graph.0, self.index)
    }
}

/// The special blocks every graph has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialBlockKind {
    Entry,
    Exit,
    ExceptionalExit,
}

/// How a block behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Linear node sequence with a single successor
    Regular,
    /// At most one node, then/else successors
    Conditional,
    /// A single node that may throw; per-exception successors plus a fall-through
    Exceptional,
    /// Entry, exit or exceptional exit; never holds nodes
    Special(SpecialBlockKind),
}

/// Label of a CFG edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeLabel {
    Unconditional,
    Then,
    Else,
    Exception(ExceptionType),
}

/// Edge in the CFG connecting two blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: BlockId,
    pub target: BlockId,
    pub label: EdgeLabel,
}

/// A basic block in the CFG
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    kind: BlockKind,
    nodes: Vec<NodeId>,
    successors: SmallVec<[Edge; 2]>,
    predecessors: SmallVec<[Edge; 2]>,
}

impl Block {
    fn new(id: BlockId, kind: BlockKind) -> Self {
        Self {
            id,
            kind,
            nodes: Vec::new(),
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Nodes in execution order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn successors(&self) -> &[Edge] {
        &self.successors
    }

    pub fn predecessors(&self) -> &[Edge] {
        &self.predecessors
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// The successor along the edge labelled `label`
    pub fn successor(&self, label: &EdgeLabel) -> Option<BlockId> {
        self.successors
            .iter()
            .find(|edge| &edge.label == label)
            .map(|edge| edge.target)
    }
}

/// The AST region a graph was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnderlyingAst {
    Method {
        name: String,
        class_name: String,
        parameters: Vec<LocalVar>,
    },
    Lambda {
        parameters: Vec<LocalVar>,
    },
    ArbitraryCode {
        class_name: String,
    },
}

impl UnderlyingAst {
    pub fn method(name: impl Into<String>, class_name: impl Into<String>, parameters: Vec<LocalVar>) -> Self {
        UnderlyingAst::Method {
            name: name.into(),
            class_name: class_name.into(),
            parameters,
        }
    }

    /// Formal parameters (empty for arbitrary code such as initializers)
    pub fn parameters(&self) -> &[LocalVar] {
        match self {
            UnderlyingAst::Method { parameters, .. } | UnderlyingAst::Lambda { parameters } => parameters,
            UnderlyingAst::ArbitraryCode { .. } => &[],
        }
    }
}

/// Control Flow Graph
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    id: GraphId,
    ast: UnderlyingAst,
    blocks: Vec<Block>,
    nodes: Vec<Node>,
    entry: BlockId,
    regular_exit: BlockId,
    exceptional_exit: BlockId,
    effectively_final: HashSet<LocalVar>,
    return_nodes: Vec<NodeId>,
}

impl ControlFlowGraph {
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn underlying_ast(&self) -> &UnderlyingAst {
        &self.ast
    }

    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    pub fn regular_exit_block(&self) -> BlockId {
        self.regular_exit
    }

    pub fn exceptional_exit_block(&self) -> BlockId {
        self.exceptional_exit
    }

    /// Look up a block; `None` for ids of another graph
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        if id.graph != self.id {
            return None;
        }
        self.blocks.get(id.index as usize)
    }

    /// Look up a node; `None` for ids of another graph
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        if id.graph != self.id {
            return None;
        }
        self.nodes.get(id.index as usize)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Nodes of a block in execution order
    pub fn nodes_of(&self, block: BlockId) -> impl Iterator<Item = &Node> {
        self[block].nodes.iter().map(move |id| &self[*id])
    }

    /// Every `Return` node of the graph
    pub fn return_nodes(&self) -> Vec<&Node> {
        self.return_nodes.iter().map(|id| &self[*id]).collect()
    }

    pub fn is_effectively_final(&self, var: &LocalVar) -> bool {
        self.effectively_final.contains(var)
    }

    /// Get blocks in reverse postorder (useful for forward dataflow)
    ///
    /// Blocks unreachable from the entry follow, in id order.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.reachable_postorder();
        order.reverse();
        self.append_unreached(order)
    }

    /// Get blocks in postorder of a depth-first walk from the entry
    /// (useful for backward dataflow)
    ///
    /// Blocks unreachable from the entry follow, in id order.
    pub fn postorder(&self) -> Vec<BlockId> {
        let order = self.reachable_postorder();
        self.append_unreached(order)
    }

    fn reachable_postorder(&self) -> Vec<BlockId> {
        let (graph, root) = self.flow_graph(Direction::Forward);
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut dfs = DfsPostOrder::new(&graph, root);
        while let Some(index) = dfs.next(&graph) {
            if let Some(block) = graph[index] {
                postorder.push(block);
            }
        }
        postorder
    }

    fn append_unreached(&self, mut order: Vec<BlockId>) -> Vec<BlockId> {
        let reached: HashSet<BlockId> = order.iter().copied().collect();
        order.extend(self.blocks.iter().map(|b| b.id).filter(|id| !reached.contains(id)));
        order
    }

    /// Widening points when walking in `direction`: targets of the edges that
    /// retreat in a depth-first walk from the start blocks.
    ///
    /// Every cycle holds at least one retreating edge, so irreducible loops
    /// get a widening point too.
    pub fn loop_heads(&self, direction: Direction) -> HashSet<BlockId> {
        let (graph, root) = self.flow_graph(direction);
        let mut finished: Vec<Option<usize>> = vec![None; graph.node_count()];
        let mut dfs = DfsPostOrder::new(&graph, root);
        let mut order = 0;
        while let Some(index) = dfs.next(&graph) {
            finished[index.index()] = Some(order);
            order += 1;
        }

        // An edge retreats when its target finishes no earlier than its source
        graph
            .edge_references()
            .filter(|edge| match (finished[edge.source().index()], finished[edge.target().index()]) {
                (Some(source), Some(target)) => source <= target,
                _ => false,
            })
            .filter_map(|edge| graph[edge.target()])
            .collect()
    }

    /// The block graph oriented along `direction`, rooted at a virtual node
    /// that leads to the direction's start blocks.
    fn flow_graph(&self, direction: Direction) -> (DiGraph<Option<BlockId>, ()>, NodeIndex) {
        let mut graph = DiGraph::with_capacity(self.blocks.len() + 1, self.blocks.len() * 2);
        let indices: Vec<NodeIndex> = self.blocks.iter().map(|b| graph.add_node(Some(b.id))).collect();
        let root = graph.add_node(None);

        for start in direction.start_blocks(self) {
            graph.add_edge(root, indices[start.index as usize], ());
        }
        for block in &self.blocks {
            for edge in &block.successors {
                let (from, to) = match direction {
                    Direction::Forward => (edge.source, edge.target),
                    Direction::Backward => (edge.target, edge.source),
                };
                graph.add_edge(indices[from.index as usize], indices[to.index as usize], ());
            }
        }
        (graph, root)
    }
}

impl Index<BlockId> for ControlFlowGraph {
    type Output = Block;

    /// Panics on ids of another graph; use [`ControlFlowGraph::block`] to probe.
    fn index(&self, id: BlockId) -> &Block {
        assert_eq!(id.graph, self.id, "block {id} belongs to another graph");
        &self.blocks[id.index as usize]
    }
}

impl Index<NodeId> for ControlFlowGraph {
    type Output = Node;

    /// Panics on ids of another graph; use [`ControlFlowGraph::node`] to probe.
    fn index(&self, id: NodeId) -> &Node {
        assert_eq!(id.graph, self.id, "node {id} belongs to another graph");
        &self.nodes[id.index as usize]
    }
}

struct PendingNode {
    kind: NodeKind,
    trees: SmallVec<[TreeId; 1]>,
    placements: SmallVec<[BlockId; 1]>,
}

/// Builder for assembling a [`ControlFlowGraph`]
///
/// The entry, regular exit and exceptional exit blocks exist from the start.
/// Structural problems are reported by [`CfgBuilder::build`].
pub struct CfgBuilder {
    graph: GraphId,
    ast: UnderlyingAst,
    blocks: Vec<Block>,
    nodes: Vec<PendingNode>,
    edges: Vec<Edge>,
    effectively_final: HashSet<LocalVar>,
    /// Ids handed to `append` or `associate_tree` that this builder never created
    unknown_nodes: Vec<NodeId>,
    entry: BlockId,
    regular_exit: BlockId,
    exceptional_exit: BlockId,
}

impl CfgBuilder {
    pub fn new(ast: UnderlyingAst) -> Self {
        let graph = GraphId::fresh();
        let placeholder = BlockId { graph, index: 0 };
        let mut builder = Self {
            graph,
            ast,
            blocks: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            effectively_final: HashSet::new(),
            unknown_nodes: Vec::new(),
            entry: placeholder,
            regular_exit: placeholder,
            exceptional_exit: placeholder,
        };

        builder.entry = builder.add_block(BlockKind::Special(SpecialBlockKind::Entry));
        builder.regular_exit = builder.add_block(BlockKind::Special(SpecialBlockKind::Exit));
        builder.exceptional_exit = builder.add_block(BlockKind::Special(SpecialBlockKind::ExceptionalExit));
        builder
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn regular_exit(&self) -> BlockId {
        self.regular_exit
    }

    pub fn exceptional_exit(&self) -> BlockId {
        self.exceptional_exit
    }

    pub fn add_block(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId {
            graph: self.graph,
            index: self.blocks.len() as u32,
        };
        self.blocks.push(Block::new(id, kind));
        id
    }

    /// Create a node that is not yet placed in any block
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId {
            graph: self.graph,
            index: self.nodes.len() as u32,
        };
        self.nodes.push(PendingNode {
            kind,
            trees: SmallVec::new(),
            placements: SmallVec::new(),
        });
        id
    }

    /// Append an existing node to the end of `block`
    pub fn append(&mut self, block: BlockId, node: NodeId) {
        let Some(pending) = self.pending_mut(node) else {
            self.unknown_nodes.push(node);
            return;
        };
        pending.placements.push(block);
        if block.graph == self.graph {
            if let Some(b) = self.blocks.get_mut(block.index as usize) {
                b.nodes.push(node);
            }
        }
    }

    fn pending_mut(&mut self, node: NodeId) -> Option<&mut PendingNode> {
        if node.graph != self.graph {
            return None;
        }
        self.nodes.get_mut(node.index as usize)
    }

    /// Create a node and append it to `block`
    pub fn push(&mut self, block: BlockId, kind: NodeKind) -> NodeId {
        let node = self.create_node(kind);
        self.append(block, node);
        node
    }

    /// Map a source tree to `node`; the first tree becomes the node's primary tree
    pub fn associate_tree(&mut self, node: NodeId, tree: TreeId) {
        let Some(pending) = self.pending_mut(node) else {
            self.unknown_nodes.push(node);
            return;
        };
        if !pending.trees.contains(&tree) {
            pending.trees.push(tree);
        }
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId, label: EdgeLabel) {
        self.edges.push(Edge {
            source: from,
            target: to,
            label,
        });
    }

    pub fn mark_effectively_final(&mut self, var: LocalVar) {
        self.effectively_final.insert(var);
    }

    /// Validate and freeze the graph
    pub fn build(mut self) -> Result<ControlFlowGraph, MalformedCfg> {
        if let Some(node) = self.unknown_nodes.first() {
            return Err(MalformedCfg::UnknownNode(*node));
        }
        for edge in std::mem::take(&mut self.edges) {
            for end in [edge.source, edge.target] {
                if end.graph != self.graph || end.index as usize >= self.blocks.len() {
                    return Err(MalformedCfg::UnknownBlock(end));
                }
            }
            self.blocks[edge.target.index as usize].predecessors.push(edge.clone());
            self.blocks[edge.source.index as usize].successors.push(edge);
        }

        let node_count = self.nodes.len();
        let mut nodes = Vec::with_capacity(node_count);
        let mut return_nodes = Vec::new();
        for (index, pending) in self.nodes.into_iter().enumerate() {
            let id = NodeId {
                graph: self.graph,
                index: index as u32,
            };
            let block = match pending.placements.as_slice() {
                [] => return Err(MalformedCfg::NodeWithoutBlock(id)),
                [block] if block.graph == self.graph && (block.index as usize) < self.blocks.len() => *block,
                [block] => return Err(MalformedCfg::UnknownBlock(*block)),
                _ => return Err(MalformedCfg::NodeInMultipleBlocks(id)),
            };
            if let Some(operand) = pending
                .kind
                .operands()
                .into_iter()
                .find(|op| op.graph != self.graph || op.index as usize >= node_count)
            {
                return Err(MalformedCfg::UnknownNode(operand));
            }
            if matches!(pending.kind, NodeKind::Return(_)) {
                return_nodes.push(id);
            }
            nodes.push(Node {
                id,
                block,
                kind: pending.kind,
                trees: pending.trees,
            });
        }

        for block in &self.blocks {
            if let Some(node) = block
                .nodes
                .iter()
                .find(|n| n.graph != self.graph || n.index as usize >= node_count)
            {
                return Err(MalformedCfg::UnknownNode(*node));
            }
            validate_block_shape(block)?;
        }

        Ok(ControlFlowGraph {
            id: self.graph,
            ast: self.ast,
            blocks: self.blocks,
            nodes,
            entry: self.entry,
            regular_exit: self.regular_exit,
            exceptional_exit: self.exceptional_exit,
            effectively_final: self.effectively_final,
            return_nodes,
        })
    }
}

fn validate_block_shape(block: &Block) -> Result<(), MalformedCfg> {
    let invalid = |reason: &str| MalformedCfg::InvalidBlock {
        block: block.id,
        reason: reason.to_string(),
    };
    let count = |wanted: fn(&EdgeLabel) -> bool| block.successors.iter().filter(|e| wanted(&e.label)).count();
    let unconditional = count(|l| matches!(l, EdgeLabel::Unconditional));
    let then_edges = count(|l| matches!(l, EdgeLabel::Then));
    let else_edges = count(|l| matches!(l, EdgeLabel::Else));
    let exception_edges = count(|l| matches!(l, EdgeLabel::Exception(_)));

    match block.kind {
        BlockKind::Special(special) => {
            if !block.nodes.is_empty() {
                return Err(invalid("special blocks cannot hold nodes"));
            }
            match special {
                SpecialBlockKind::Entry => {
                    if unconditional > 1 || block.successors.len() != unconditional {
                        return Err(invalid("entry block needs at most one unconditional successor"));
                    }
                }
                SpecialBlockKind::Exit | SpecialBlockKind::ExceptionalExit => {
                    if !block.successors.is_empty() {
                        return Err(invalid("exit blocks cannot have successors"));
                    }
                }
            }
        }
        BlockKind::Regular => {
            if unconditional > 1 || block.successors.len() != unconditional {
                return Err(invalid("regular block needs at most one unconditional successor"));
            }
        }
        BlockKind::Conditional => {
            if block.nodes.len() > 1 {
                return Err(invalid("conditional block holds at most one node"));
            }
            if then_edges != 1 || else_edges != 1 || block.successors.len() != 2 {
                return Err(invalid("conditional block needs exactly one then and one else successor"));
            }
        }
        BlockKind::Exceptional => {
            if block.nodes.len() != 1 {
                return Err(invalid("exceptional block holds exactly one node"));
            }
            if unconditional > 1 || block.successors.len() != unconditional + exception_edges {
                return Err(invalid("exceptional block takes exception edges plus at most one fall-through"));
            }
            let mut seen = HashSet::new();
            for edge in &block.successors {
                if let EdgeLabel::Exception(ty) = &edge.label {
                    if !seen.insert(ty) {
                        return Err(invalid("duplicate exception edge"));
                    }
                }
            }
        }
    }
    Ok(())
}
