//! Live variables, a backward analysis
//!
//! The store at a program point is the set of locals whose current value may
//! still be read. Walking backwards, a node makes the locals read by its
//! direct operands live, and so does a bare read such as a branch condition;
//! an assignment first kills its target.

use dataflow_core::prelude::*;
use std::collections::BTreeSet;
use std::fmt;

/// Liveness attaches no value to nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoValue {}

impl AbstractValue for NoValue {
    fn least_upper_bound(&self, _other: &Self) -> Self {
        match *self {}
    }
}

/// Set of live locals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSet(BTreeSet<LocalVar>);

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, var: &LocalVar) -> bool {
        self.0.contains(var)
    }

    pub fn insert(&mut self, var: LocalVar) -> bool {
        self.0.insert(var)
    }

    pub fn remove(&mut self, var: &LocalVar) -> bool {
        self.0.remove(var)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVar> {
        self.0.iter()
    }

    /// Names of the live locals, sorted
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(LocalVar::name).collect()
    }
}

impl FromIterator<LocalVar> for LiveSet {
    fn from_iter<I: IntoIterator<Item = LocalVar>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Store for LiveSet {
    fn least_upper_bound(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }
}

impl fmt::Display for LiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.names().join(", "))
    }
}

pub type LivenessAnalysis = BackwardAnalysis<NoValue, LiveSet, LiveVariables>;

#[derive(Debug, Clone, Copy, Default)]
pub struct LiveVariables;

impl LiveVariables {
    pub fn analysis() -> LivenessAnalysis {
        BackwardAnalysis::new(LiveVariables)
    }
}

/// Add every local read directly by an operand of `node`
fn gen_operands(node: &Node, live: &mut LiveSet, ctx: &TransferContext<'_, NoValue>) {
    for operand in node.kind().operands() {
        if let Some(NodeKind::LocalVariable(var)) = ctx.node(operand).map(Node::kind) {
            live.insert(var.clone());
        }
    }
}

impl TransferFunction<NoValue, LiveSet> for LiveVariables {
    fn visit_node(
        &self,
        node: &Node,
        input: TransferInput<LiveSet>,
        ctx: &mut TransferContext<'_, NoValue>,
    ) -> TransferResult<NoValue, LiveSet> {
        let mut live = input.into_regular_store();
        gen_operands(node, &mut live, ctx);
        TransferResult::regular(None, live)
    }

    fn visit_local_variable(
        &self,
        _node: &Node,
        var: &LocalVar,
        input: TransferInput<LiveSet>,
        _ctx: &mut TransferContext<'_, NoValue>,
    ) -> TransferResult<NoValue, LiveSet> {
        let mut live = input.into_regular_store();
        live.insert(var.clone());
        TransferResult::regular(None, live)
    }

    fn visit_assignment(
        &self,
        node: &Node,
        target: &LocalVar,
        _value: NodeId,
        input: TransferInput<LiveSet>,
        ctx: &mut TransferContext<'_, NoValue>,
    ) -> TransferResult<NoValue, LiveSet> {
        let mut live = input.into_regular_store();
        live.remove(target);
        gen_operands(node, &mut live, ctx);
        TransferResult::regular(None, live)
    }
}

impl BackwardTransferFunction<NoValue, LiveSet> for LiveVariables {
    fn initial_normal_exit_store(&self, _ast: &UnderlyingAst, _return_nodes: &[&Node]) -> LiveSet {
        LiveSet::new()
    }

    fn initial_exceptional_exit_store(&self, _ast: &UnderlyingAst) -> LiveSet {
        LiveSet::new()
    }
}
