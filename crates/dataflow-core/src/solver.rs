//! Dataflow analysis framework with worklist-based fixpoint solver
//!
//! Forward and backward analyses share one engine; the [`Direction`] decides
//! where the iteration starts, which way stores flow along edges, the order
//! nodes of a block are walked in, and which side of a block its recorded
//! input belongs to.

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::cfg::{Block, BlockId, BlockKind, ControlFlowGraph, EdgeLabel};
use crate::config::AnalysisConfig;
use crate::error::{DataflowError, MalformedCfg, Result};
use crate::lattice::{is_upper_bound, AbstractValue, Store};
use crate::node::{ExceptionType, NodeId};
use crate::result::{AnalysisResult, BlockReplay};
use crate::transfer::{
    dispatch, BackwardTransferFunction, ForwardTransferFunction, TransferContext, TransferFunction, TransferInput,
};

/// Direction of dataflow analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Stores flow with execution, from the entry block
    Forward,
    /// Stores flow against execution, from both exit blocks
    Backward,
}

impl Direction {
    /// Blocks whose input is seeded before iteration starts
    pub fn start_blocks(self, cfg: &ControlFlowGraph) -> Vec<BlockId> {
        match self {
            Direction::Forward => vec![cfg.entry_block()],
            Direction::Backward => vec![cfg.regular_exit_block(), cfg.exceptional_exit_block()],
        }
    }

    /// Blocks a block's output flows into
    pub fn flow_successors(self, block: &Block) -> Vec<BlockId> {
        match self {
            Direction::Forward => block.successors().iter().map(|e| e.target).collect(),
            Direction::Backward => block.predecessors().iter().map(|e| e.source).collect(),
        }
    }

    /// Nodes of a block in the order they are transferred
    pub fn walk(self, block: &Block) -> Vec<NodeId> {
        match self {
            Direction::Forward => block.nodes().to_vec(),
            Direction::Backward => block.nodes().iter().rev().copied().collect(),
        }
    }

    /// Block visiting order: reverse postorder forward, postorder backward
    pub fn block_order(self, cfg: &ControlFlowGraph) -> Vec<BlockId> {
        match self {
            Direction::Forward => cfg.reverse_postorder(),
            Direction::Backward => cfg.postorder(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Pending blocks, popped by their rank in the direction's block order
struct Worklist {
    rank: HashMap<BlockId, usize>,
    queue: BTreeSet<(usize, BlockId)>,
    queued: HashSet<BlockId>,
}

impl Worklist {
    fn new(order: &[BlockId]) -> Self {
        Self {
            rank: order.iter().enumerate().map(|(rank, block)| (*block, rank)).collect(),
            queue: BTreeSet::new(),
            queued: HashSet::new(),
        }
    }

    /// Re-insertions of a queued block are no-ops
    fn push(&mut self, block: BlockId) {
        if self.queued.insert(block) {
            let rank = self.rank.get(&block).copied().unwrap_or(usize::MAX);
            self.queue.insert((rank, block));
        }
    }

    fn pop(&mut self) -> Option<BlockId> {
        let (_, block) = self.queue.pop_first()?;
        self.queued.remove(&block);
        Some(block)
    }
}

/// Then/else stores reaching a conditional block from behind
struct BranchSlots<S> {
    then_store: Option<S>,
    else_store: Option<S>,
}

/// Analysis surface shared by forward and backward analyses
pub trait Analysis<V: AbstractValue, S: Store> {
    /// Run to fixpoint; previous results are discarded first
    fn perform_analysis(&mut self, cfg: Arc<ControlFlowGraph>) -> Result<()>;

    /// Query surface of the last run
    fn result(&self) -> &AnalysisResult<V, S>;

    fn direction(&self) -> Direction;

    /// Block visits of the last run
    fn iterations(&self) -> usize;

    /// Recorded input of a block, for graph annotation
    fn input_of<'a>(&'a self, block: BlockId) -> Option<&'a TransferInput<S>>
    where
        V: 'a,
        S: 'a,
    {
        self.result().input_of(block)
    }

    /// Recorded value of a node, for graph annotation
    fn value_of<'a>(&'a self, node: NodeId) -> Option<&'a V>
    where
        V: 'a,
        S: 'a,
    {
        self.result().value(node)
    }
}

/// Forward analysis: stores flow from the entry block along execution
pub struct ForwardAnalysis<V, S, T> {
    engine: Engine<V, S, T>,
}

impl<V, S, T> ForwardAnalysis<V, S, T>
where
    V: AbstractValue,
    S: Store,
    T: ForwardTransferFunction<V, S> + Send + Sync + 'static,
{
    pub fn new(transfer: T) -> Self {
        Self::with_config(transfer, AnalysisConfig::default())
    }

    pub fn with_config(transfer: T, config: AnalysisConfig) -> Self {
        Self {
            engine: Engine::new(Direction::Forward, transfer, config),
        }
    }

    pub fn transfer_function(&self) -> &T {
        &self.engine.transfer
    }

    pub fn into_result(self) -> AnalysisResult<V, S> {
        self.engine.result
    }
}

impl<V, S, T> Analysis<V, S> for ForwardAnalysis<V, S, T>
where
    V: AbstractValue,
    S: Store,
    T: ForwardTransferFunction<V, S> + Send + Sync + 'static,
{
    fn perform_analysis(&mut self, cfg: Arc<ControlFlowGraph>) -> Result<()> {
        let ast = cfg.underlying_ast();
        let initial = self.engine.transfer.initial_store(ast, ast.parameters());
        self.engine.perform(cfg.clone(), vec![(cfg.entry_block(), initial)])
    }

    fn result(&self) -> &AnalysisResult<V, S> {
        &self.engine.result
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn iterations(&self) -> usize {
        self.engine.iterations
    }
}

/// Backward analysis: stores flow from the exit blocks against execution
pub struct BackwardAnalysis<V, S, T> {
    engine: Engine<V, S, T>,
}

impl<V, S, T> BackwardAnalysis<V, S, T>
where
    V: AbstractValue,
    S: Store,
    T: BackwardTransferFunction<V, S> + Send + Sync + 'static,
{
    pub fn new(transfer: T) -> Self {
        Self::with_config(transfer, AnalysisConfig::default())
    }

    pub fn with_config(transfer: T, config: AnalysisConfig) -> Self {
        Self {
            engine: Engine::new(Direction::Backward, transfer, config),
        }
    }

    pub fn transfer_function(&self) -> &T {
        &self.engine.transfer
    }

    pub fn into_result(self) -> AnalysisResult<V, S> {
        self.engine.result
    }
}

impl<V, S, T> Analysis<V, S> for BackwardAnalysis<V, S, T>
where
    V: AbstractValue,
    S: Store,
    T: BackwardTransferFunction<V, S> + Send + Sync + 'static,
{
    fn perform_analysis(&mut self, cfg: Arc<ControlFlowGraph>) -> Result<()> {
        let ast = cfg.underlying_ast();
        let transfer = &self.engine.transfer;
        let normal = transfer.initial_normal_exit_store(ast, &cfg.return_nodes());
        let exceptional = transfer.initial_exceptional_exit_store(ast);
        let seeds = vec![
            (cfg.regular_exit_block(), normal),
            (cfg.exceptional_exit_block(), exceptional),
        ];
        self.engine.perform(cfg, seeds)
    }

    fn result(&self) -> &AnalysisResult<V, S> {
        &self.engine.result
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn iterations(&self) -> usize {
        self.engine.iterations
    }
}

/// The direction-parameterised fixpoint driver
struct Engine<V, S, T> {
    direction: Direction,
    transfer: Arc<T>,
    config: AnalysisConfig,
    result: AnalysisResult<V, S>,
    iterations: usize,
}

impl<V, S, T> Engine<V, S, T>
where
    V: AbstractValue,
    S: Store,
    T: TransferFunction<V, S> + Send + Sync + 'static,
{
    fn new(direction: Direction, transfer: T, config: AnalysisConfig) -> Self {
        Self {
            direction,
            transfer: Arc::new(transfer),
            config,
            result: AnalysisResult::new(),
            iterations: 0,
        }
    }

    fn perform(&mut self, cfg: Arc<ControlFlowGraph>, seeds: Vec<(BlockId, S)>) -> Result<()> {
        debug!(
            graph = cfg.id().0,
            direction = %self.direction,
            blocks = cfg.block_count(),
            "starting dataflow analysis"
        );
        self.result = AnalysisResult::new();
        self.iterations = 0;

        let mut pass = Pass::new(&cfg, self.transfer.as_ref(), &self.config, self.direction, &mut self.result);
        for (block, store) in seeds {
            pass.seed(block, store);
        }
        let outcome = pass.run();
        self.iterations = pass.iterations;
        outcome?;

        let replay = Replay {
            cfg: cfg.clone(),
            transfer: self.transfer.clone(),
            direction: self.direction,
        };
        self.result.replays.insert(cfg.id(), Arc::new(replay));
        debug!(
            graph = cfg.id().0,
            iterations = self.iterations,
            nodes = self.result.node_values.len(),
            "reached fixpoint"
        );
        Ok(())
    }
}

/// State of a single run to fixpoint
struct Pass<'a, V, S, T: ?Sized> {
    cfg: &'a ControlFlowGraph,
    transfer: &'a T,
    config: &'a AnalysisConfig,
    direction: Direction,
    result: &'a mut AnalysisResult<V, S>,
    worklist: Worklist,
    loop_heads: HashSet<BlockId>,
    updates: HashMap<BlockId, usize>,
    branch_slots: HashMap<BlockId, BranchSlots<S>>,
    iterations: usize,
}

impl<'a, V, S, T> Pass<'a, V, S, T>
where
    V: AbstractValue,
    S: Store,
    T: TransferFunction<V, S> + ?Sized,
{
    fn new(
        cfg: &'a ControlFlowGraph,
        transfer: &'a T,
        config: &'a AnalysisConfig,
        direction: Direction,
        result: &'a mut AnalysisResult<V, S>,
    ) -> Self {
        Self {
            cfg,
            transfer,
            config,
            direction,
            result,
            worklist: Worklist::new(&direction.block_order(cfg)),
            loop_heads: cfg.loop_heads(direction),
            updates: HashMap::new(),
            branch_slots: HashMap::new(),
            iterations: 0,
        }
    }

    fn seed(&mut self, block: BlockId, store: S) {
        self.result.inputs.insert(block, TransferInput::Regular(store));
        self.worklist.push(block);
    }

    fn run(&mut self) -> Result<()> {
        while let Some(block) = self.worklist.pop() {
            self.iterations += 1;
            if self.iterations > self.config.max_iterations {
                warn!(
                    graph = self.cfg.id().0,
                    max_iterations = self.config.max_iterations,
                    "analysis did not converge, aborting"
                );
                return Err(MalformedCfg::NonTermination {
                    iterations: self.config.max_iterations,
                }
                .into());
            }
            self.visit_block(block)?;
        }
        Ok(())
    }

    fn visit_block(&mut self, id: BlockId) -> Result<()> {
        let cfg = self.cfg;
        let block = &cfg[id];
        let Some(mut current) = self.result.inputs.get(&id).cloned() else {
            return Ok(());
        };
        trace!(block = %id, nodes = block.nodes().len(), "visiting block");

        let mut values_changed = false;
        let mut thrown: Option<(IndexMap<ExceptionType, S>, S)> = None;
        for node_id in self.direction.walk(block) {
            let node = &cfg[node_id];
            for tree in node.trees() {
                self.result.tree_lookup.insert(*tree, node_id);
            }

            let mut ctx = TransferContext::new(
                cfg,
                &self.result.node_values,
                Some(&mut self.result.final_local_values),
            );
            let (value, stores, exceptional) = dispatch(self.transfer, node, current, &mut ctx).into_parts();

            if let Some(value) = value {
                if self.result.node_values.get(&node_id) != Some(&value) {
                    trace!(node = %node_id, kind = node.kind().variant_name(), ?value, "node value changed");
                    self.result.node_values.insert(node_id, value);
                    values_changed = true;
                }
            }
            if block.kind() == BlockKind::Exceptional {
                thrown = Some((exceptional, stores.regular_store()));
            }
            current = stores;
        }

        match self.direction {
            Direction::Forward => {
                for edge in block.successors() {
                    let contribution = match &edge.label {
                        EdgeLabel::Then => TransferInput::Regular(current.then_store().clone()),
                        EdgeLabel::Else => TransferInput::Regular(current.else_store().clone()),
                        EdgeLabel::Unconditional if cfg[edge.target].kind() == BlockKind::Conditional => current.clone(),
                        EdgeLabel::Unconditional => TransferInput::Regular(current.regular_store()),
                        EdgeLabel::Exception(exception) => TransferInput::Regular(match &thrown {
                            Some((stores, fallback)) => stores.get(exception).cloned().unwrap_or_else(|| fallback.clone()),
                            None => current.regular_store(),
                        }),
                    };
                    self.merge_input(edge.target, contribution)?;
                }
            }
            Direction::Backward => {
                let store = current.regular_store();
                for edge in block.predecessors() {
                    let into_conditional = cfg[edge.source].kind() == BlockKind::Conditional;
                    match edge.label {
                        EdgeLabel::Then if into_conditional => self.merge_branch(edge.source, true, store.clone())?,
                        EdgeLabel::Else if into_conditional => self.merge_branch(edge.source, false, store.clone())?,
                        _ => self.merge_input(edge.source, TransferInput::Regular(store.clone()))?,
                    }
                }
            }
        }

        if values_changed {
            for next in self.direction.flow_successors(block) {
                if self.result.inputs.contains_key(&next) {
                    self.worklist.push(next);
                }
            }
        }
        Ok(())
    }

    /// Join `contribution` into the recorded input of `target`
    fn merge_input(&mut self, target: BlockId, contribution: TransferInput<S>) -> Result<()> {
        let merged = match self.result.inputs.get(&target) {
            None => contribution,
            Some(old) => {
                let joined = old.least_upper_bound(&contribution);
                let merged = if self.should_widen(target) {
                    old.widened_upper_bound(&joined)
                } else {
                    joined
                };
                self.check_upper_bound(target, &merged, old, &contribution, TransferInput::least_upper_bound)?;
                if &merged == old {
                    return Ok(());
                }
                merged
            }
        };
        self.record_input(target, merged);
        Ok(())
    }

    /// Backward flow into a conditional block fills the slot of the edge taken
    fn merge_branch(&mut self, target: BlockId, then_branch: bool, store: S) -> Result<()> {
        let widen = self.should_widen(target);
        let slots = self.branch_slots.entry(target).or_insert(BranchSlots {
            then_store: None,
            else_store: None,
        });
        let slot = if then_branch {
            &mut slots.then_store
        } else {
            &mut slots.else_store
        };
        let merged = match slot.take() {
            None => store,
            Some(old) => {
                let joined = old.least_upper_bound(&store);
                let merged = if widen { old.widened_upper_bound(&joined) } else { joined };
                if self.config.check_lattice_contracts
                    && !(is_upper_bound(&merged, &old, S::least_upper_bound)
                        && is_upper_bound(&merged, &store, S::least_upper_bound))
                {
                    return Err(DataflowError::lattice_violation(target, "branch store join is not an upper bound"));
                }
                merged
            }
        };
        *slot = Some(merged);

        let input = match (&slots.then_store, &slots.else_store) {
            (Some(then_store), Some(else_store)) => TransferInput::conditional(then_store.clone(), else_store.clone()),
            (Some(store), None) | (None, Some(store)) => TransferInput::Regular(store.clone()),
            (None, None) => return Ok(()),
        };
        if self.result.inputs.get(&target) != Some(&input) {
            self.record_input(target, input);
        }
        Ok(())
    }

    fn record_input(&mut self, target: BlockId, input: TransferInput<S>) {
        let updates = self.updates.entry(target).or_default();
        *updates += 1;
        trace!(block = %target, updates = *updates, "block input updated");
        self.result.inputs.insert(target, input);
        self.worklist.push(target);
    }

    fn should_widen(&self, block: BlockId) -> bool {
        self.loop_heads.contains(&block)
            && self.updates.get(&block).copied().unwrap_or(0) >= self.config.widening_threshold
    }

    fn check_upper_bound<X, F>(&self, block: BlockId, merged: &X, old: &X, new: &X, join: F) -> Result<()>
    where
        X: PartialEq + fmt::Debug,
        F: Fn(&X, &X) -> X,
    {
        if !self.config.check_lattice_contracts {
            return Ok(());
        }
        if is_upper_bound(merged, old, &join) && is_upper_bound(merged, new, &join) {
            return Ok(());
        }
        warn!(block = %block, "join result is not an upper bound of its inputs");
        Err(DataflowError::lattice_violation(
            block,
            format!("{merged:?} is not an upper bound of {old:?} and {new:?}"),
        ))
    }
}

/// Re-runs single blocks of an analysed graph for store queries
struct Replay<T> {
    cfg: Arc<ControlFlowGraph>,
    transfer: Arc<T>,
    direction: Direction,
}

impl<V, S, T> BlockReplay<V, S> for Replay<T>
where
    V: AbstractValue,
    S: Store,
    T: TransferFunction<V, S> + Send + Sync,
{
    fn cfg(&self) -> &ControlFlowGraph {
        &self.cfg
    }

    fn stores_around(&self, target: NodeId, input: &TransferInput<S>, node_values: &HashMap<NodeId, V>) -> Option<(S, S)> {
        let cfg = self.cfg.as_ref();
        let block = &cfg[cfg.node(target)?.block()];
        let mut current = input.clone();
        for node_id in self.direction.walk(block) {
            let node = &cfg[node_id];
            let mut ctx = TransferContext::new(cfg, node_values, None);
            if node_id == target {
                let arriving = current.regular_store();
                let leaving = dispatch(self.transfer.as_ref(), node, current, &mut ctx).regular_store();
                // Backward, the store arriving at a node is the one after it
                return Some(match self.direction {
                    Direction::Forward => (arriving, leaving),
                    Direction::Backward => (leaving, arriving),
                });
            }
            let (_, stores, _) = dispatch(self.transfer.as_ref(), node, current, &mut ctx).into_parts();
            current = stores;
        }
        None
    }
}
