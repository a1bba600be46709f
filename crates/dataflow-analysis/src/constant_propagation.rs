//! Constant propagation over integer locals
//!
//! Values live in the flat lattice `⊥ < k < ⊤`. Comparisons `x == k` and
//! `x != k` refine `x` on the branch where the equality holds.

use dataflow_core::prelude::*;
use tracing::trace;

/// Abstract value of an integer expression
pub type Constant = Flat<i64>;

/// Constants bound to locals at a program point
pub type ConstantStore = Environment<LocalVar, Constant>;

/// Forward constant propagation
pub type ConstantPropagationAnalysis = ForwardAnalysis<Constant, ConstantStore, ConstantPropagation>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantPropagation;

impl ConstantPropagation {
    pub fn analysis() -> ConstantPropagationAnalysis {
        ForwardAnalysis::new(ConstantPropagation)
    }

    pub fn analysis_with_config(config: AnalysisConfig) -> ConstantPropagationAnalysis {
        ForwardAnalysis::with_config(ConstantPropagation, config)
    }
}

fn operand(ctx: &TransferContext<'_, Constant>, id: NodeId) -> Constant {
    ctx.value_of(id).cloned().unwrap_or(Flat::Top)
}

/// Fold an arithmetic operator; overflow and division by zero give ⊤
fn fold(op: BinaryOp, left: &Constant, right: &Constant) -> Constant {
    match (left, right) {
        (Flat::Bottom, _) | (_, Flat::Bottom) => Flat::Bottom,
        (Flat::Value(l), Flat::Value(r)) => {
            let folded = match op {
                BinaryOp::Add => l.checked_add(*r),
                BinaryOp::Subtract => l.checked_sub(*r),
                BinaryOp::Multiply => l.checked_mul(*r),
                BinaryOp::Divide => l.checked_div(*r),
                BinaryOp::Remainder => l.checked_rem(*r),
            };
            folded.map_or(Flat::Top, Flat::Value)
        }
        _ => Flat::Top,
    }
}

/// The local read by `id`, if that node is a plain read
fn local_read<'a>(ctx: &TransferContext<'a, Constant>, id: NodeId) -> Option<&'a LocalVar> {
    match ctx.node(id)?.kind() {
        NodeKind::LocalVariable(var) => Some(var),
        _ => None,
    }
}

impl TransferFunction<Constant, ConstantStore> for ConstantPropagation {
    fn visit_literal(
        &self,
        _node: &Node,
        literal: &Literal,
        input: TransferInput<ConstantStore>,
        _ctx: &mut TransferContext<'_, Constant>,
    ) -> TransferResult<Constant, ConstantStore> {
        let value = match literal {
            Literal::Integer(k) => Some(Flat::Value(*k)),
            _ => None,
        };
        TransferResult::regular(value, input.into_regular_store())
    }

    fn visit_local_variable(
        &self,
        _node: &Node,
        var: &LocalVar,
        input: TransferInput<ConstantStore>,
        _ctx: &mut TransferContext<'_, Constant>,
    ) -> TransferResult<Constant, ConstantStore> {
        let lookup = |store: &ConstantStore| store.get(var).cloned().unwrap_or(Flat::Top);
        let value = lookup(input.then_store()).join(&lookup(input.else_store()));
        // A read does not change the store, keep a pending then/else split
        TransferResult::from_input(Some(value), input)
    }

    fn visit_assignment(
        &self,
        _node: &Node,
        target: &LocalVar,
        value: NodeId,
        input: TransferInput<ConstantStore>,
        ctx: &mut TransferContext<'_, Constant>,
    ) -> TransferResult<Constant, ConstantStore> {
        let assigned = operand(ctx, value);
        let mut store = input.into_regular_store();
        store.set(target.clone(), assigned.clone());
        if ctx.cfg().is_effectively_final(target) {
            ctx.set_final_local_value(target.clone(), assigned.clone());
        }
        TransferResult::regular(Some(assigned), store)
    }

    fn visit_binary(
        &self,
        _node: &Node,
        op: BinaryOp,
        (left, right): (NodeId, NodeId),
        input: TransferInput<ConstantStore>,
        ctx: &mut TransferContext<'_, Constant>,
    ) -> TransferResult<Constant, ConstantStore> {
        let value = fold(op, &operand(ctx, left), &operand(ctx, right));
        TransferResult::regular(Some(value), input.into_regular_store())
    }

    fn visit_negate(
        &self,
        _node: &Node,
        operand_id: NodeId,
        input: TransferInput<ConstantStore>,
        ctx: &mut TransferContext<'_, Constant>,
    ) -> TransferResult<Constant, ConstantStore> {
        let value = match operand(ctx, operand_id) {
            Flat::Value(k) => k.checked_neg().map_or(Flat::Top, Flat::Value),
            other => other,
        };
        TransferResult::regular(Some(value), input.into_regular_store())
    }

    fn visit_comparison(
        &self,
        _node: &Node,
        op: ComparisonOp,
        (left, right): (NodeId, NodeId),
        input: TransferInput<ConstantStore>,
        ctx: &mut TransferContext<'_, Constant>,
    ) -> TransferResult<Constant, ConstantStore> {
        let equal_on_then = match op {
            ComparisonOp::Equal => true,
            ComparisonOp::NotEqual => false,
            _ => return TransferResult::regular(None, input.into_regular_store()),
        };
        let refinement = match (local_read(ctx, left), local_read(ctx, right)) {
            (Some(var), _) if operand(ctx, right).value().is_some() => Some((var.clone(), operand(ctx, right))),
            (_, Some(var)) if operand(ctx, left).value().is_some() => Some((var.clone(), operand(ctx, left))),
            _ => None,
        };
        let Some((var, constant)) = refinement else {
            return TransferResult::regular(None, input.into_regular_store());
        };

        let (mut then_store, mut else_store) = input.into_pair();
        let equal_store = if equal_on_then { &mut then_store } else { &mut else_store };
        let current = equal_store.get(&var).cloned().unwrap_or(Flat::Top);
        trace!(var = %var, constant = %constant, "refining on equality");
        equal_store.set(var, current.meet(&constant));
        TransferResult::conditional(None, then_store, else_store)
    }
}

impl ForwardTransferFunction<Constant, ConstantStore> for ConstantPropagation {
    fn initial_store(&self, _ast: &UnderlyingAst, parameters: &[LocalVar]) -> ConstantStore {
        parameters.iter().map(|p| (p.clone(), Flat::Top)).collect()
    }
}
