//! # Dataflow Core
//!
//! A generic abstract-interpretation framework: a worklist fixpoint engine
//! over control-flow graphs, parameterised by a value lattice `V`, a store
//! lattice `S` and a client transfer function.
//!
//! ## Modules
//!
//! - **[`lattice`]** - Contracts for abstract values and stores, plus the
//!   reusable [`Flat`] and [`Environment`] lattices
//! - **[`cfg`]** - The control-flow graph model and its builder
//! - **[`transfer`]** - TransferInput/TransferResult and the visitor contract
//! - **[`solver`]** - The forward/backward worklist engine
//! - **[`result`]** - The query surface published after fixpoint
//! - **[`config`]** - Engine configuration
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dataflow_core::prelude::*;
//!
//! // Counts the markers seen on the way to each program point
//! #[derive(Debug, Clone, PartialEq)]
//! struct Count(usize);
//!
//! impl Store for Count {
//!     fn least_upper_bound(&self, other: &Self) -> Self {
//!         Count(self.0.max(other.0))
//!     }
//! }
//!
//! struct Markers;
//!
//! impl TransferFunction<Flat<i64>, Count> for Markers {
//!     fn visit_marker(
//!         &self,
//!         _node: &Node,
//!         _label: &str,
//!         input: TransferInput<Count>,
//!         _ctx: &mut TransferContext<'_, Flat<i64>>,
//!     ) -> TransferResult<Flat<i64>, Count> {
//!         let count = input.into_regular_store().0 + 1;
//!         TransferResult::regular(Some(Flat::Value(count as i64)), Count(count))
//!     }
//! }
//!
//! impl ForwardTransferFunction<Flat<i64>, Count> for Markers {
//!     fn initial_store(&self, _ast: &UnderlyingAst, _parameters: &[LocalVar]) -> Count {
//!         Count(0)
//!     }
//! }
//!
//! let mut builder = CfgBuilder::new(UnderlyingAst::method("run", "Demo", vec![]));
//! let body = builder.add_block(BlockKind::Regular);
//! builder.push(body, NodeKind::Marker("first".into()));
//! let second = builder.push(body, NodeKind::Marker("second".into()));
//! builder.add_edge(builder.entry(), body, EdgeLabel::Unconditional);
//! builder.add_edge(body, builder.regular_exit(), EdgeLabel::Unconditional);
//! let cfg = Arc::new(builder.build().unwrap());
//!
//! let mut analysis = ForwardAnalysis::new(Markers);
//! analysis.perform_analysis(cfg).unwrap();
//! assert_eq!(analysis.result().value(second), Some(&Flat::Value(2)));
//! assert_eq!(analysis.result().store_before(second), Some(Count(1)));
//! ```

pub mod cfg;
pub mod config;
pub mod error;
pub mod lattice;
pub mod node;
pub mod result;
pub mod solver;
pub mod transfer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cfg::{
        Block, BlockId, BlockKind, CfgBuilder, ControlFlowGraph, Edge, EdgeLabel, GraphId, SpecialBlockKind,
        UnderlyingAst,
    };
    pub use crate::config::AnalysisConfig;
    pub use crate::error::{DataflowError, MalformedCfg};
    pub use crate::lattice::{AbstractValue, Environment, Flat, Store};
    pub use crate::node::{
        BinaryOp, ComparisonOp, ExceptionType, Literal, LocalVar, LogicalOp, Node, NodeId, NodeKind, TreeId,
    };
    pub use crate::result::AnalysisResult;
    pub use crate::solver::{Analysis, BackwardAnalysis, Direction, ForwardAnalysis};
    pub use crate::transfer::{
        BackwardTransferFunction, ForwardTransferFunction, TransferContext, TransferFunction, TransferInput,
        TransferResult,
    };
}

// Re-export main types at crate root for convenience
pub use cfg::{BlockId, BlockKind, CfgBuilder, ControlFlowGraph, EdgeLabel, GraphId, UnderlyingAst};
pub use config::AnalysisConfig;
pub use error::{DataflowError, MalformedCfg};
pub use lattice::{AbstractValue, Environment, Flat, Store};
pub use node::{Node, NodeId, NodeKind, TreeId};
pub use result::AnalysisResult;
pub use solver::{Analysis, BackwardAnalysis, Direction, ForwardAnalysis};
pub use transfer::{
    BackwardTransferFunction, ForwardTransferFunction, TransferContext, TransferFunction, TransferInput, TransferResult,
};
