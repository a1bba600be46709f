//! Invariants every finished analysis satisfies, plus boundary behaviours

mod common;

use common::{constant, MethodBuilder};
use dataflow_analysis::prelude::*;
use dataflow_core::lattice::is_upper_bound;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

fn constants(cfg: &Arc<ControlFlowGraph>) -> AnalysisResult<Constant, ConstantStore> {
    let mut analysis = ConstantPropagation::analysis();
    analysis.perform_analysis(cfg.clone()).unwrap();
    analysis.into_result()
}

fn sample_graphs() -> Vec<Arc<ControlFlowGraph>> {
    vec![
        common::straight_line(),
        common::refining_diamond(),
        common::counting_loop(),
    ]
}

/// Store leaving `block` along an edge labelled `label`
fn outgoing(
    result: &AnalysisResult<Constant, ConstantStore>,
    cfg: &ControlFlowGraph,
    block: BlockId,
    label: &EdgeLabel,
) -> Option<ConstantStore> {
    if let Some(last) = cfg[block].last_node() {
        return result.store_after(last);
    }
    let input = result.input_of(block)?;
    Some(match label {
        EdgeLabel::Then => input.then_store().clone(),
        EdgeLabel::Else => input.else_store().clone(),
        _ => input.regular_store(),
    })
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_fixpoint_every_edge_is_covered() {
    for cfg in sample_graphs() {
        let result = constants(&cfg);
        for block in cfg.blocks() {
            for edge in block.successors() {
                let Some(leaving) = outgoing(&result, &cfg, block.id(), &edge.label) else {
                    continue;
                };
                let arriving = result.input_of(edge.target).unwrap().regular_store();
                assert!(
                    is_upper_bound(&arriving, &leaving, ConstantStore::least_upper_bound),
                    "edge {} -> {} not covered",
                    edge.source,
                    edge.target
                );
            }
        }
    }
}

#[test]
fn test_running_twice_gives_identical_results() {
    for cfg in sample_graphs() {
        let mut analysis = ConstantPropagation::analysis();
        analysis.perform_analysis(cfg.clone()).unwrap();
        let first = analysis.result().clone();
        analysis.perform_analysis(cfg).unwrap();

        assert_eq!(analysis.result().node_values(), first.node_values());
        assert_eq!(analysis.result().block_inputs(), first.block_inputs());
    }
}

#[test]
fn test_combine_with_itself_is_idempotent() {
    for cfg in sample_graphs() {
        let mut result = constants(&cfg);
        let copy = result.clone();
        result.combine(&copy);
        assert_eq!(result, copy);
    }
}

#[test]
fn test_tree_values_match_node_values() {
    for cfg in sample_graphs() {
        let result = constants(&cfg);
        assert!(!result.tree_lookup().is_empty());
        for (tree, node) in result.tree_lookup() {
            assert_eq!(result.value_for_tree(*tree), result.value(*node));
        }
    }
}

#[test]
fn test_store_after_last_node_reaches_single_predecessor_successors() {
    for cfg in sample_graphs() {
        let result = constants(&cfg);
        for block in cfg.blocks() {
            let Some(last) = block.last_node() else {
                continue;
            };
            let Some(after) = result.store_after(last) else {
                continue;
            };
            for edge in block.successors() {
                if cfg[edge.target].predecessors().len() == 1 {
                    let input = result.input_of(edge.target).unwrap();
                    assert_eq!(input.regular_store(), after);
                }
            }
        }
    }
}

// ============================================================================
// Boundary behaviours
// ============================================================================

#[test]
fn test_empty_method_keeps_initial_store() {
    let mut m = MethodBuilder::new(&["a"]);
    m.goto(m.entry(), m.exit());
    let cfg = m.finish();

    let result = constants(&cfg);
    let initial: ConstantStore = [(common::var("a"), Flat::Top)].into_iter().collect();
    assert_eq!(result.input_of(cfg.entry_block()).unwrap().regular_store(), initial);
    assert_eq!(result.input_of(cfg.regular_exit_block()).unwrap().regular_store(), initial);
    assert!(result.node_values().is_empty());
    assert!(result.input_of(cfg.exceptional_exit_block()).is_none());
}

#[test]
fn test_unreachable_node_has_no_value() {
    let mut m = MethodBuilder::new(&[]);
    let live = m.block();
    let reached = m.int(live, 1);
    let dead = m.block();
    let unreached = m.int(dead, 2);
    m.goto(m.entry(), live);
    m.goto(live, m.exit());
    m.goto(dead, m.exit());
    let cfg = m.finish();

    let result = constants(&cfg);
    assert_eq!(result.value(reached), Some(&Flat::Value(1)));
    assert_eq!(result.value(unreached), None);
    assert_eq!(result.store_before(unreached), None);
    assert_eq!(result.store_after(unreached), None);
}

#[test]
fn test_converging_branches_join_at_the_target() {
    // if (p == 3) {} else {} with both edges to the same block
    let mut m = MethodBuilder::new(&["p"]);
    let test = m.block();
    let p = m.read(test, "p");
    let three = m.int(test, 3);
    m.compare(test, ComparisonOp::Equal, p, three);
    let cond = m.conditional();
    let target = m.block();
    m.marker(target, "converged");
    m.goto(m.entry(), test);
    m.goto(test, cond);
    m.branch(cond, target, target);
    m.goto(target, m.exit());
    let cfg = m.finish();

    let result = constants(&cfg);
    let at_cond = result.input_of(cond).unwrap();
    assert!(at_cond.is_conditional());
    assert_eq!(constant(at_cond.then_store(), "p"), Some(Flat::Value(3)));

    let joined = at_cond.then_store().least_upper_bound(at_cond.else_store());
    assert_eq!(result.input_of(target).unwrap().regular_store(), joined);
}

#[test]
fn test_combine_stitches_disjoint_graphs() {
    let first_cfg = common::straight_line();
    let second_cfg = common::refining_diamond();
    let first = constants(&first_cfg);
    let second = constants(&second_cfg);

    let mut combined = AnalysisResult::new();
    combined.combine(&first);
    combined.combine(&second);

    for (source, cfg) in [(&first, &first_cfg), (&second, &second_cfg)] {
        for node in cfg.all_nodes() {
            assert_eq!(combined.value(node.id()), source.value(node.id()));
            assert_eq!(combined.store_before(node.id()), source.store_before(node.id()));
        }
    }
    assert_eq!(
        combined.node_values().len(),
        first.node_values().len() + second.node_values().len()
    );
}

#[test]
fn test_queries_for_unknown_graph_have_no_answer() {
    let analysed = common::straight_line();
    let other = common::straight_line();
    let result = constants(&analysed);

    for node in other.all_nodes() {
        assert_eq!(result.value(node.id()), None);
        assert_eq!(result.store_after(node.id()), None);
    }
}

// ============================================================================
// Constant propagation agrees with concrete evaluation on straight-line code
// ============================================================================

#[derive(Debug, Clone)]
enum Expr {
    Lit(i64),
    VarPlus(usize, i64),
}

const VARS: [&str; 3] = ["a", "b", "c"];

fn program() -> impl Strategy<Value = Vec<(usize, Expr)>> {
    let expr = prop_oneof![
        (-100i64..100).prop_map(Expr::Lit),
        (0..VARS.len(), -100i64..100).prop_map(|(v, k)| Expr::VarPlus(v, k)),
    ];
    prop::collection::vec((0..VARS.len(), expr), 1..12)
}

proptest! {
    #[test]
    fn prop_straight_line_matches_evaluation(statements in program()) {
        let mut m = MethodBuilder::new(&[]);
        let body = m.block();
        let mut expected: HashMap<&str, Option<i64>> = HashMap::new();

        for (target, expr) in &statements {
            let (value, concrete) = match expr {
                Expr::Lit(k) => (m.int(body, *k), Some(*k)),
                Expr::VarPlus(v, k) => {
                    let read = m.read(body, VARS[*v]);
                    let lit = m.int(body, *k);
                    let sum = m.binary(body, BinaryOp::Add, read, lit);
                    let known = expected.get(VARS[*v]).copied().flatten();
                    (sum, known.map(|x| x + k))
                }
            };
            m.assign(body, VARS[*target], value);
            expected.insert(VARS[*target], concrete);
        }
        m.goto(m.entry(), body);
        m.goto(body, m.exit());
        let cfg = m.finish();

        let result = constants(&cfg);
        let at_exit = result.input_of(cfg.regular_exit_block()).unwrap().regular_store();
        for (name, concrete) in expected {
            let want = concrete.map_or(Flat::Top, Flat::Value);
            prop_assert_eq!(constant(&at_exit, name), Some(want));
        }
    }
}
