//! Transfer-function contract
//!
//! A transfer function is a visitor over [`NodeKind`]: one handler per node
//! variant, each taking the incoming [`TransferInput`] by value and returning
//! a [`TransferResult`]. Every handler defaults to [`TransferFunction::visit_node`],
//! which passes the store through unchanged and produces no value.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::cfg::{ControlFlowGraph, UnderlyingAst};
use crate::lattice::{AbstractValue, Store};
use crate::node::{BinaryOp, ComparisonOp, ExceptionType, Literal, LocalVar, LogicalOp, Node, NodeId, NodeKind};

/// The store(s) arriving at a node
///
/// A pair input carries separate stores for the then and else outcomes of
/// the condition just evaluated; it travels along the edges that lead into
/// and out of a conditional block.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferInput<S> {
    Regular(S),
    Conditional { then_store: S, else_store: S },
}

impl<S: Store> TransferInput<S> {
    pub fn regular(store: S) -> Self {
        TransferInput::Regular(store)
    }

    pub fn conditional(then_store: S, else_store: S) -> Self {
        TransferInput::Conditional { then_store, else_store }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, TransferInput::Conditional { .. })
    }

    /// The single store, or the join of then and else for a pair
    pub fn regular_store(&self) -> S {
        match self {
            TransferInput::Regular(store) => store.clone(),
            TransferInput::Conditional { then_store, else_store } => then_store.least_upper_bound(else_store),
        }
    }

    /// Like [`TransferInput::regular_store`], without copying a single store
    pub fn into_regular_store(self) -> S {
        match self {
            TransferInput::Regular(store) => store,
            TransferInput::Conditional { then_store, else_store } => then_store.least_upper_bound(&else_store),
        }
    }

    /// Store for the then outcome; a single store serves both outcomes
    pub fn then_store(&self) -> &S {
        match self {
            TransferInput::Regular(store) => store,
            TransferInput::Conditional { then_store, .. } => then_store,
        }
    }

    /// Store for the else outcome; a single store serves both outcomes
    pub fn else_store(&self) -> &S {
        match self {
            TransferInput::Regular(store) => store,
            TransferInput::Conditional { else_store, .. } => else_store,
        }
    }

    /// Split into `(then, else)`, duplicating a single store
    pub fn into_pair(self) -> (S, S) {
        match self {
            TransferInput::Regular(store) => (store.clone(), store),
            TransferInput::Conditional { then_store, else_store } => (then_store, else_store),
        }
    }

    /// Pointwise join; a single store is duplicated into both slots when the
    /// other side is a pair
    pub fn least_upper_bound(&self, other: &Self) -> Self {
        self.combine_with(other, S::least_upper_bound)
    }

    /// Pointwise [`Store::widened_upper_bound`], with the same duplication rule
    pub fn widened_upper_bound(&self, next: &Self) -> Self {
        self.combine_with(next, S::widened_upper_bound)
    }

    fn combine_with(&self, other: &Self, op: impl Fn(&S, &S) -> S) -> Self {
        match (self, other) {
            (TransferInput::Regular(a), TransferInput::Regular(b)) => TransferInput::Regular(op(a, b)),
            _ => TransferInput::Conditional {
                then_store: op(self.then_store(), other.then_store()),
                else_store: op(self.else_store(), other.else_store()),
            },
        }
    }
}

/// Outcome of transferring a single node
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult<V, S> {
    value: Option<V>,
    stores: TransferInput<S>,
    exceptional_stores: IndexMap<ExceptionType, S>,
}

impl<V: AbstractValue, S: Store> TransferResult<V, S> {
    pub fn regular(value: Option<V>, store: S) -> Self {
        Self::from_input(value, TransferInput::Regular(store))
    }

    pub fn conditional(value: Option<V>, then_store: S, else_store: S) -> Self {
        Self::from_input(value, TransferInput::conditional(then_store, else_store))
    }

    /// Keep the incoming store(s) as they are, pair or single
    pub fn from_input(value: Option<V>, stores: TransferInput<S>) -> Self {
        Self {
            value,
            stores,
            exceptional_stores: IndexMap::new(),
        }
    }

    /// Attach the store that flows along the edge for `exception`
    pub fn with_exceptional_store(mut self, exception: ExceptionType, store: S) -> Self {
        self.exceptional_stores.insert(exception, store);
        self
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: Option<V>) {
        self.value = value;
    }

    pub fn is_conditional(&self) -> bool {
        self.stores.is_conditional()
    }

    pub fn stores(&self) -> &TransferInput<S> {
        &self.stores
    }

    /// The outgoing store, joining then and else for a conditional result
    pub fn regular_store(&self) -> S {
        self.stores.regular_store()
    }

    pub fn then_store(&self) -> &S {
        self.stores.then_store()
    }

    pub fn else_store(&self) -> &S {
        self.stores.else_store()
    }

    /// Store along the edge for `exception`, falling back to the regular store
    pub fn exceptional_store(&self, exception: &ExceptionType) -> S {
        self.exceptional_stores
            .get(exception)
            .cloned()
            .unwrap_or_else(|| self.regular_store())
    }

    pub fn exceptional_stores(&self) -> &IndexMap<ExceptionType, S> {
        &self.exceptional_stores
    }

    pub(crate) fn into_parts(self) -> (Option<V>, TransferInput<S>, IndexMap<ExceptionType, S>) {
        (self.value, self.stores, self.exceptional_stores)
    }
}

/// Engine services available to a handler
pub struct TransferContext<'a, V> {
    cfg: &'a ControlFlowGraph,
    node_values: &'a HashMap<NodeId, V>,
    final_local_values: Option<&'a mut HashMap<LocalVar, V>>,
}

impl<'a, V> TransferContext<'a, V> {
    pub(crate) fn new(
        cfg: &'a ControlFlowGraph,
        node_values: &'a HashMap<NodeId, V>,
        final_local_values: Option<&'a mut HashMap<LocalVar, V>>,
    ) -> Self {
        Self {
            cfg,
            node_values,
            final_local_values,
        }
    }

    pub fn cfg(&self) -> &'a ControlFlowGraph {
        self.cfg
    }

    pub fn node(&self, id: NodeId) -> Option<&'a Node> {
        self.cfg.node(id)
    }

    /// Value recorded for an already transferred node
    pub fn value_of(&self, id: NodeId) -> Option<&V> {
        self.node_values.get(&id)
    }

    /// Record the value of an effectively final local; ignored while a
    /// result re-runs a block
    pub fn set_final_local_value(&mut self, var: LocalVar, value: V) {
        if let Some(values) = self.final_local_values.as_deref_mut() {
            values.insert(var, value);
        }
    }

    /// True while a result is re-running a block to answer a store query
    pub fn is_replay(&self) -> bool {
        self.final_local_values.is_none()
    }
}

/// Per-variant handlers of a transfer function
#[allow(unused_variables)]
pub trait TransferFunction<V: AbstractValue, S: Store> {
    /// Fallback for every variant: pass the store through, no value
    fn visit_node(&self, node: &Node, input: TransferInput<S>, ctx: &mut TransferContext<'_, V>) -> TransferResult<V, S> {
        TransferResult::regular(None, input.into_regular_store())
    }

    fn visit_literal(
        &self,
        node: &Node,
        literal: &Literal,
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_local_variable(
        &self,
        node: &Node,
        var: &LocalVar,
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_variable_declaration(
        &self,
        node: &Node,
        var: &LocalVar,
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_assignment(
        &self,
        node: &Node,
        target: &LocalVar,
        value: NodeId,
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_binary(
        &self,
        node: &Node,
        op: BinaryOp,
        operands: (NodeId, NodeId),
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_comparison(
        &self,
        node: &Node,
        op: ComparisonOp,
        operands: (NodeId, NodeId),
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_logical(
        &self,
        node: &Node,
        op: LogicalOp,
        operands: (NodeId, NodeId),
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_not(&self, node: &Node, operand: NodeId, input: TransferInput<S>, ctx: &mut TransferContext<'_, V>) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_negate(&self, node: &Node, operand: NodeId, input: TransferInput<S>, ctx: &mut TransferContext<'_, V>) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_field_access(
        &self,
        node: &Node,
        receiver: NodeId,
        field: &str,
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_method_invocation(
        &self,
        node: &Node,
        receiver: Option<NodeId>,
        method: &str,
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_object_creation(
        &self,
        node: &Node,
        class: &str,
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_return(
        &self,
        node: &Node,
        result: Option<NodeId>,
        input: TransferInput<S>,
        ctx: &mut TransferContext<'_, V>,
    ) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_throw(&self, node: &Node, exception: NodeId, input: TransferInput<S>, ctx: &mut TransferContext<'_, V>) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }

    fn visit_marker(&self, node: &Node, label: &str, input: TransferInput<S>, ctx: &mut TransferContext<'_, V>) -> TransferResult<V, S> {
        self.visit_node(node, input, ctx)
    }
}

/// Transfer function of a forward analysis
pub trait ForwardTransferFunction<V: AbstractValue, S: Store>: TransferFunction<V, S> {
    /// Store at the entry of the method
    fn initial_store(&self, ast: &UnderlyingAst, parameters: &[LocalVar]) -> S;
}

/// Transfer function of a backward analysis
pub trait BackwardTransferFunction<V: AbstractValue, S: Store>: TransferFunction<V, S> {
    /// Store at the regular exit
    fn initial_normal_exit_store(&self, ast: &UnderlyingAst, return_nodes: &[&Node]) -> S;

    /// Store at the exceptional exit
    fn initial_exceptional_exit_store(&self, ast: &UnderlyingAst) -> S;
}

/// Route a node to the handler for its variant
pub fn dispatch<V, S, T>(transfer: &T, node: &Node, input: TransferInput<S>, ctx: &mut TransferContext<'_, V>) -> TransferResult<V, S>
where
    V: AbstractValue,
    S: Store,
    T: TransferFunction<V, S> + ?Sized,
{
    match node.kind() {
        NodeKind::Literal(literal) => transfer.visit_literal(node, literal, input, ctx),
        NodeKind::LocalVariable(var) => transfer.visit_local_variable(node, var, input, ctx),
        NodeKind::VariableDeclaration(var) => transfer.visit_variable_declaration(node, var, input, ctx),
        NodeKind::Assignment { target, value } => transfer.visit_assignment(node, target, *value, input, ctx),
        NodeKind::Binary { op, left, right } => transfer.visit_binary(node, *op, (*left, *right), input, ctx),
        NodeKind::Comparison { op, left, right } => transfer.visit_comparison(node, *op, (*left, *right), input, ctx),
        NodeKind::Logical { op, left, right } => transfer.visit_logical(node, *op, (*left, *right), input, ctx),
        NodeKind::Not(operand) => transfer.visit_not(node, *operand, input, ctx),
        NodeKind::Negate(operand) => transfer.visit_negate(node, *operand, input, ctx),
        NodeKind::FieldAccess { receiver, field } => transfer.visit_field_access(node, *receiver, field, input, ctx),
        NodeKind::MethodInvocation { receiver, method, .. } => {
            transfer.visit_method_invocation(node, *receiver, method, input, ctx)
        }
        NodeKind::ObjectCreation { class, .. } => transfer.visit_object_creation(node, class, input, ctx),
        NodeKind::Return(result) => transfer.visit_return(node, *result, input, ctx),
        NodeKind::Throw(exception) => transfer.visit_throw(node, *exception, input, ctx),
        NodeKind::Marker(label) => transfer.visit_marker(node, label, input, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{Environment, Flat};

    type Env = Environment<&'static str, Flat<i64>>;

    fn env(pairs: &[(&'static str, i64)]) -> Env {
        pairs.iter().map(|(k, v)| (*k, Flat::Value(*v))).collect()
    }

    #[test]
    fn test_regular_store_of_pair_is_join() {
        let input = TransferInput::conditional(env(&[("x", 1)]), env(&[("x", 2)]));
        assert_eq!(input.regular_store().get(&"x"), Some(&Flat::Top));
        assert_eq!(input.then_store().get(&"x"), Some(&Flat::Value(1)));
    }

    #[test]
    fn test_single_store_serves_both_branches() {
        let input = TransferInput::regular(env(&[("x", 1)]));
        assert_eq!(input.then_store(), input.else_store());
        let (then_store, else_store) = input.into_pair();
        assert_eq!(then_store, else_store);
    }

    #[test]
    fn test_join_duplicates_single_into_pair() {
        let pair = TransferInput::conditional(env(&[("x", 1)]), env(&[("x", 2)]));
        let single = TransferInput::regular(env(&[("x", 1)]));

        let joined = pair.least_upper_bound(&single);
        assert!(joined.is_conditional());
        assert_eq!(joined.then_store().get(&"x"), Some(&Flat::Value(1)));
        assert_eq!(joined.else_store().get(&"x"), Some(&Flat::Top));
        assert_eq!(joined, single.least_upper_bound(&pair));
    }

    #[test]
    fn test_join_of_singles_stays_single() {
        let a = TransferInput::regular(env(&[("x", 1)]));
        let b = TransferInput::regular(env(&[("y", 2)]));
        let joined = a.least_upper_bound(&b);
        assert!(!joined.is_conditional());
        assert_eq!(joined.regular_store().len(), 2);
    }

    #[test]
    fn test_exceptional_store_falls_back_to_regular() {
        let result: TransferResult<Flat<i64>, Env> = TransferResult::regular(None, env(&[("x", 1)]))
            .with_exceptional_store(ExceptionType::new("IOException"), env(&[("x", 2)]));

        assert_eq!(
            result.exceptional_store(&ExceptionType::new("IOException")),
            env(&[("x", 2)])
        );
        assert_eq!(
            result.exceptional_store(&ExceptionType::new("NullPointerException")),
            env(&[("x", 1)])
        );
    }

    #[test]
    fn test_conditional_result_regular_store() {
        let result: TransferResult<Flat<i64>, Env> =
            TransferResult::conditional(Some(Flat::Top), env(&[("x", 1)]), env(&[("x", 1), ("y", 3)]));
        assert!(result.is_conditional());
        assert_eq!(result.regular_store(), env(&[("x", 1), ("y", 3)]));
        assert_eq!(result.value(), Some(&Flat::Top));
    }
}
