//! CFG nodes: expressions and statements in three-address form
//!
//! Operands are other nodes, referenced by [`NodeId`]; every operand is
//! evaluated by its own node earlier in execution order.

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::sync::Arc;

use crate::cfg::{BlockId, GraphId};

/// Unique identifier for a node, qualified by the graph that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub graph: GraphId,
    pub index: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}.{}", self.graph.0, self.index)
    }
}

/// Opaque identity of a source AST tree, supplied by the CFG builder's caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeId(pub u64);

/// A local variable, identified by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalVar(Arc<str>);

impl LocalVar {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LocalVar {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for LocalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of an exception type routed along exceptional edges
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExceptionType(Arc<str>);

impl ExceptionType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExceptionType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Literal constants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Boolean(bool),
    String(String),
    Null,
}

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

/// Comparison operators (they produce a boolean and may split the store)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOp {
    /// The operator testing the opposite condition
    pub fn negate(self) -> Self {
        match self {
            ComparisonOp::Equal => ComparisonOp::NotEqual,
            ComparisonOp::NotEqual => ComparisonOp::Equal,
            ComparisonOp::Less => ComparisonOp::GreaterOrEqual,
            ComparisonOp::LessOrEqual => ComparisonOp::Greater,
            ComparisonOp::Greater => ComparisonOp::LessOrEqual,
            ComparisonOp::GreaterOrEqual => ComparisonOp::Less,
        }
    }
}

/// Short-circuit boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// The variant of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Literal constant
    Literal(Literal),
    /// Read of a local variable
    LocalVariable(LocalVar),
    /// Declaration of a local variable (no initializer)
    VariableDeclaration(LocalVar),
    /// Write of a local variable
    Assignment { target: LocalVar, value: NodeId },
    /// Binary arithmetic
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    /// Comparison
    Comparison {
        op: ComparisonOp,
        left: NodeId,
        right: NodeId,
    },
    /// Conditional and/or
    Logical {
        op: LogicalOp,
        left: NodeId,
        right: NodeId,
    },
    /// Boolean negation
    Not(NodeId),
    /// Arithmetic negation
    Negate(NodeId),
    /// Field read `receiver.field`
    FieldAccess { receiver: NodeId, field: String },
    /// Method call, `receiver` is absent for static calls
    MethodInvocation {
        receiver: Option<NodeId>,
        method: String,
        arguments: Vec<NodeId>,
    },
    /// `new Class(arguments)`
    ObjectCreation { class: String, arguments: Vec<NodeId> },
    /// Return from the method
    Return(Option<NodeId>),
    /// Throw an exception
    Throw(NodeId),
    /// No-op marker carrying a label
    Marker(String),
}

impl NodeKind {
    /// Operand nodes, in evaluation order
    pub fn operands(&self) -> SmallVec<[NodeId; 2]> {
        match self {
            NodeKind::Literal(_)
            | NodeKind::LocalVariable(_)
            | NodeKind::VariableDeclaration(_)
            | NodeKind::Marker(_) => SmallVec::new(),
            NodeKind::Assignment { value, .. } => smallvec![*value],
            NodeKind::Binary { left, right, .. }
            | NodeKind::Comparison { left, right, .. }
            | NodeKind::Logical { left, right, .. } => smallvec![*left, *right],
            NodeKind::Not(operand) | NodeKind::Negate(operand) | NodeKind::Throw(operand) => {
                smallvec![*operand]
            }
            NodeKind::FieldAccess { receiver, .. } => smallvec![*receiver],
            NodeKind::MethodInvocation {
                receiver, arguments, ..
            } => receiver.iter().chain(arguments.iter()).copied().collect(),
            NodeKind::ObjectCreation { arguments, .. } => arguments.iter().copied().collect(),
            NodeKind::Return(result) => result.iter().copied().collect(),
        }
    }

    /// Short variant name, used in logs
    pub fn variant_name(&self) -> &'static str {
        match self {
            NodeKind::Literal(_) => "literal",
            NodeKind::LocalVariable(_) => "local-variable",
            NodeKind::VariableDeclaration(_) => "variable-declaration",
            NodeKind::Assignment { .. } => "assignment",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Comparison { .. } => "comparison",
            NodeKind::Logical { .. } => "logical",
            NodeKind::Not(_) => "not",
            NodeKind::Negate(_) => "negate",
            NodeKind::FieldAccess { .. } => "field-access",
            NodeKind::MethodInvocation { .. } => "method-invocation",
            NodeKind::ObjectCreation { .. } => "object-creation",
            NodeKind::Return(_) => "return",
            NodeKind::Throw(_) => "throw",
            NodeKind::Marker(_) => "marker",
        }
    }
}

/// A node in the CFG, owned by exactly one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) block: BlockId,
    pub(crate) kind: NodeKind,
    pub(crate) trees: SmallVec<[TreeId; 1]>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The block containing this node
    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The primary source tree of this node
    pub fn tree(&self) -> Option<TreeId> {
        self.trees.first().copied()
    }

    /// All source trees mapped to this node (primary first)
    pub fn trees(&self) -> &[TreeId] {
        &self.trees
    }
}
