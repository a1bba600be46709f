//! Nullness of reference locals
//!
//! Comparisons of a local against `null` split the store so that each branch
//! knows the outcome. Dereferencing a local proves it non-null afterwards;
//! the `NullPointerException` edge keeps the fact from before the dereference.

use dataflow_core::prelude::*;
use std::fmt;

/// Exception raised by dereferencing `null`
pub const NULL_POINTER_EXCEPTION: &str = "NullPointerException";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullness {
    /// Definitely null
    Null,
    /// Definitely not null
    NonNull,
    /// Either
    MaybeNull,
}

impl AbstractValue for Nullness {
    fn least_upper_bound(&self, other: &Self) -> Self {
        if self == other {
            *self
        } else {
            Nullness::MaybeNull
        }
    }
}

impl fmt::Display for Nullness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nullness::Null => write!(f, "null"),
            Nullness::NonNull => write!(f, "non-null"),
            Nullness::MaybeNull => write!(f, "maybe-null"),
        }
    }
}

pub type NullnessStore = Environment<LocalVar, Nullness>;

pub type NullnessAnalysis = ForwardAnalysis<Nullness, NullnessStore, NullnessTransfer>;

#[derive(Debug, Clone, Copy, Default)]
pub struct NullnessTransfer;

impl NullnessTransfer {
    pub fn analysis() -> NullnessAnalysis {
        ForwardAnalysis::new(NullnessTransfer)
    }
}

fn is_null_literal(ctx: &TransferContext<'_, Nullness>, id: NodeId) -> bool {
    matches!(ctx.node(id).map(Node::kind), Some(NodeKind::Literal(Literal::Null)))
}

fn local_read<'a>(ctx: &TransferContext<'a, Nullness>, id: NodeId) -> Option<&'a LocalVar> {
    match ctx.node(id)?.kind() {
        NodeKind::LocalVariable(var) => Some(var),
        _ => None,
    }
}

impl NullnessTransfer {
    /// Mark the dereferenced local non-null; the exceptional edge keeps the
    /// store from before the dereference
    fn dereference(
        &self,
        receiver: NodeId,
        input: TransferInput<NullnessStore>,
        ctx: &TransferContext<'_, Nullness>,
    ) -> TransferResult<Nullness, NullnessStore> {
        let before = input.into_regular_store();
        let mut after = before.clone();
        if let Some(var) = local_read(ctx, receiver) {
            after.set(var.clone(), Nullness::NonNull);
        }
        TransferResult::regular(Some(Nullness::MaybeNull), after)
            .with_exceptional_store(ExceptionType::new(NULL_POINTER_EXCEPTION), before)
    }
}

impl TransferFunction<Nullness, NullnessStore> for NullnessTransfer {
    fn visit_literal(
        &self,
        _node: &Node,
        literal: &Literal,
        input: TransferInput<NullnessStore>,
        _ctx: &mut TransferContext<'_, Nullness>,
    ) -> TransferResult<Nullness, NullnessStore> {
        let value = match literal {
            Literal::Null => Nullness::Null,
            _ => Nullness::NonNull,
        };
        TransferResult::regular(Some(value), input.into_regular_store())
    }

    fn visit_object_creation(
        &self,
        _node: &Node,
        _class: &str,
        input: TransferInput<NullnessStore>,
        _ctx: &mut TransferContext<'_, Nullness>,
    ) -> TransferResult<Nullness, NullnessStore> {
        TransferResult::regular(Some(Nullness::NonNull), input.into_regular_store())
    }

    fn visit_local_variable(
        &self,
        _node: &Node,
        var: &LocalVar,
        input: TransferInput<NullnessStore>,
        _ctx: &mut TransferContext<'_, Nullness>,
    ) -> TransferResult<Nullness, NullnessStore> {
        let lookup = |store: &NullnessStore| store.get(var).copied().unwrap_or(Nullness::MaybeNull);
        let value = lookup(input.then_store()).least_upper_bound(&lookup(input.else_store()));
        TransferResult::from_input(Some(value), input)
    }

    fn visit_assignment(
        &self,
        _node: &Node,
        target: &LocalVar,
        value: NodeId,
        input: TransferInput<NullnessStore>,
        ctx: &mut TransferContext<'_, Nullness>,
    ) -> TransferResult<Nullness, NullnessStore> {
        let assigned = ctx.value_of(value).copied().unwrap_or(Nullness::MaybeNull);
        let mut store = input.into_regular_store();
        store.set(target.clone(), assigned);
        if ctx.cfg().is_effectively_final(target) {
            ctx.set_final_local_value(target.clone(), assigned);
        }
        TransferResult::regular(Some(assigned), store)
    }

    fn visit_comparison(
        &self,
        _node: &Node,
        op: ComparisonOp,
        (left, right): (NodeId, NodeId),
        input: TransferInput<NullnessStore>,
        ctx: &mut TransferContext<'_, Nullness>,
    ) -> TransferResult<Nullness, NullnessStore> {
        let null_on_then = match op {
            ComparisonOp::Equal => true,
            ComparisonOp::NotEqual => false,
            _ => return TransferResult::regular(Some(Nullness::NonNull), input.into_regular_store()),
        };
        let tested = if is_null_literal(ctx, right) {
            local_read(ctx, left)
        } else if is_null_literal(ctx, left) {
            local_read(ctx, right)
        } else {
            None
        };
        let Some(var) = tested else {
            return TransferResult::regular(Some(Nullness::NonNull), input.into_regular_store());
        };

        let (mut then_store, mut else_store) = input.into_pair();
        let (on_then, on_else) = if null_on_then {
            (Nullness::Null, Nullness::NonNull)
        } else {
            (Nullness::NonNull, Nullness::Null)
        };
        then_store.set(var.clone(), on_then);
        else_store.set(var.clone(), on_else);
        TransferResult::conditional(Some(Nullness::NonNull), then_store, else_store)
    }

    fn visit_field_access(
        &self,
        _node: &Node,
        receiver: NodeId,
        _field: &str,
        input: TransferInput<NullnessStore>,
        ctx: &mut TransferContext<'_, Nullness>,
    ) -> TransferResult<Nullness, NullnessStore> {
        self.dereference(receiver, input, ctx)
    }

    fn visit_method_invocation(
        &self,
        _node: &Node,
        receiver: Option<NodeId>,
        _method: &str,
        input: TransferInput<NullnessStore>,
        ctx: &mut TransferContext<'_, Nullness>,
    ) -> TransferResult<Nullness, NullnessStore> {
        match receiver {
            Some(receiver) => self.dereference(receiver, input, ctx),
            None => TransferResult::regular(Some(Nullness::MaybeNull), input.into_regular_store()),
        }
    }
}

impl ForwardTransferFunction<Nullness, NullnessStore> for NullnessTransfer {
    fn initial_store(&self, _ast: &UnderlyingAst, parameters: &[LocalVar]) -> NullnessStore {
        parameters.iter().map(|p| (p.clone(), Nullness::MaybeNull)).collect()
    }
}
