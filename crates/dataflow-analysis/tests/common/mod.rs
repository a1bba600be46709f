//! Shared helper for assembling method graphs in tests
#![allow(dead_code)]

use dataflow_analysis::prelude::*;
use std::sync::Arc;

/// Thin wrapper over [`CfgBuilder`] with one-line node constructors
pub struct MethodBuilder {
    builder: CfgBuilder,
    next_tree: u64,
}

impl MethodBuilder {
    pub fn new(parameters: &[&str]) -> Self {
        let parameters = parameters.iter().map(|p| LocalVar::new(p)).collect();
        Self {
            builder: CfgBuilder::new(UnderlyingAst::method("test", "Test", parameters)),
            next_tree: 1,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.builder.entry()
    }

    pub fn exit(&self) -> BlockId {
        self.builder.regular_exit()
    }

    pub fn exceptional_exit(&self) -> BlockId {
        self.builder.exceptional_exit()
    }

    pub fn block(&mut self) -> BlockId {
        self.builder.add_block(BlockKind::Regular)
    }

    pub fn conditional(&mut self) -> BlockId {
        self.builder.add_block(BlockKind::Conditional)
    }

    pub fn exceptional(&mut self) -> BlockId {
        self.builder.add_block(BlockKind::Exceptional)
    }

    pub fn node(&mut self, block: BlockId, kind: NodeKind) -> NodeId {
        self.builder.push(block, kind)
    }

    pub fn int(&mut self, block: BlockId, k: i64) -> NodeId {
        self.node(block, NodeKind::Literal(Literal::Integer(k)))
    }

    pub fn null(&mut self, block: BlockId) -> NodeId {
        self.node(block, NodeKind::Literal(Literal::Null))
    }

    pub fn read(&mut self, block: BlockId, name: &str) -> NodeId {
        self.node(block, NodeKind::LocalVariable(LocalVar::new(name)))
    }

    pub fn declare(&mut self, block: BlockId, name: &str) -> NodeId {
        self.node(block, NodeKind::VariableDeclaration(LocalVar::new(name)))
    }

    pub fn assign(&mut self, block: BlockId, name: &str, value: NodeId) -> NodeId {
        self.node(
            block,
            NodeKind::Assignment {
                target: LocalVar::new(name),
                value,
            },
        )
    }

    pub fn binary(&mut self, block: BlockId, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        self.node(block, NodeKind::Binary { op, left, right })
    }

    pub fn compare(&mut self, block: BlockId, op: ComparisonOp, left: NodeId, right: NodeId) -> NodeId {
        self.node(block, NodeKind::Comparison { op, left, right })
    }

    pub fn ret(&mut self, block: BlockId, value: Option<NodeId>) -> NodeId {
        self.node(block, NodeKind::Return(value))
    }

    pub fn marker(&mut self, block: BlockId, label: &str) -> NodeId {
        self.node(block, NodeKind::Marker(label.to_string()))
    }

    /// Associate a fresh source tree with `node`
    pub fn tree(&mut self, node: NodeId) -> TreeId {
        let tree = TreeId(self.next_tree);
        self.next_tree += 1;
        self.builder.associate_tree(node, tree);
        tree
    }

    pub fn goto(&mut self, from: BlockId, to: BlockId) {
        self.builder.add_edge(from, to, EdgeLabel::Unconditional);
    }

    pub fn branch(&mut self, from: BlockId, then_block: BlockId, else_block: BlockId) {
        self.builder.add_edge(from, then_block, EdgeLabel::Then);
        self.builder.add_edge(from, else_block, EdgeLabel::Else);
    }

    pub fn throws(&mut self, from: BlockId, to: BlockId, exception: &str) {
        self.builder
            .add_edge(from, to, EdgeLabel::Exception(ExceptionType::new(exception)));
    }

    pub fn mark_final(&mut self, name: &str) {
        self.builder.mark_effectively_final(LocalVar::new(name));
    }

    pub fn finish(self) -> Arc<ControlFlowGraph> {
        Arc::new(self.builder.build().expect("test graph is well formed"))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn var(name: &str) -> LocalVar {
    LocalVar::new(name)
}

pub fn constant(store: &ConstantStore, name: &str) -> Option<Constant> {
    store.get(&var(name)).cloned()
}

/// `int x = 1; int y = x + 2; return y;`
pub fn straight_line() -> Arc<ControlFlowGraph> {
    let mut m = MethodBuilder::new(&[]);
    let body = m.block();
    let one = m.int(body, 1);
    m.assign(body, "x", one);
    let x = m.read(body, "x");
    let two = m.int(body, 2);
    let sum = m.binary(body, BinaryOp::Add, x, two);
    m.assign(body, "y", sum);
    let y = m.read(body, "y");
    let ret = m.ret(body, Some(y));
    m.tree(x);
    m.tree(y);
    m.tree(ret);
    m.goto(m.entry(), body);
    m.goto(body, m.exit());
    m.finish()
}

/// `if (p == 3) { r = p; } else { r = 0; } return r;`
pub fn refining_diamond() -> Arc<ControlFlowGraph> {
    let mut m = MethodBuilder::new(&["p"]);
    let test = m.block();
    let p = m.read(test, "p");
    let three = m.int(test, 3);
    let cmp = m.compare(test, ComparisonOp::Equal, p, three);
    m.tree(cmp);
    let cond = m.conditional();
    let then_block = m.block();
    let p_again = m.read(then_block, "p");
    m.tree(p_again);
    m.assign(then_block, "r", p_again);
    let else_block = m.block();
    let zero = m.int(else_block, 0);
    m.assign(else_block, "r", zero);
    let join = m.block();
    let r = m.read(join, "r");
    m.tree(r);
    m.ret(join, Some(r));

    m.goto(m.entry(), test);
    m.goto(test, cond);
    m.branch(cond, then_block, else_block);
    m.goto(then_block, join);
    m.goto(else_block, join);
    m.goto(join, m.exit());
    m.finish()
}

/// `i = 0; while (i < 100) i = i + 1;`
///
/// Trees: 1 the initial assignment, 2 the read in the test, 3 the increment
pub fn counting_loop() -> Arc<ControlFlowGraph> {
    let mut m = MethodBuilder::new(&[]);
    let init = m.block();
    let zero = m.int(init, 0);
    let start = m.assign(init, "i", zero);
    m.tree(start);
    let header = m.block();
    let i = m.read(header, "i");
    m.tree(i);
    let limit = m.int(header, 100);
    m.compare(header, ComparisonOp::Less, i, limit);
    let cond = m.conditional();
    let body = m.block();
    let current = m.read(body, "i");
    let one = m.int(body, 1);
    let sum = m.binary(body, BinaryOp::Add, current, one);
    let step = m.assign(body, "i", sum);
    m.tree(step);

    m.goto(m.entry(), init);
    m.goto(init, header);
    m.goto(header, cond);
    m.branch(cond, body, m.exit());
    m.goto(body, header);
    m.finish()
}
