//! # Dataflow Analysis
//!
//! Client analyses hosted by the `dataflow-core` engine.
//!
//! ## Modules
//!
//! - **[`constant_propagation`]** - Forward constant propagation over integer locals
//! - **[`nullness`]** - Forward nullness with refinement on `null` comparisons
//! - **[`liveness`]** - Backward live variables
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dataflow_analysis::prelude::*;
//!
//! // int x = 3; return x;
//! let x = LocalVar::new("x");
//! let mut builder = CfgBuilder::new(UnderlyingAst::method("f", "Demo", vec![]));
//! let body = builder.add_block(BlockKind::Regular);
//! let three = builder.push(body, NodeKind::Literal(Literal::Integer(3)));
//! builder.push(body, NodeKind::Assignment { target: x.clone(), value: three });
//! let read = builder.push(body, NodeKind::LocalVariable(x));
//! builder.push(body, NodeKind::Return(Some(read)));
//! builder.add_edge(builder.entry(), body, EdgeLabel::Unconditional);
//! builder.add_edge(body, builder.regular_exit(), EdgeLabel::Unconditional);
//! let cfg = Arc::new(builder.build().unwrap());
//!
//! let mut analysis = ConstantPropagation::analysis();
//! analysis.perform_analysis(cfg).unwrap();
//! assert_eq!(analysis.result().value(read), Some(&Flat::Value(3)));
//! ```

pub mod constant_propagation;
pub mod liveness;
pub mod nullness;

/// Prelude for convenient imports
pub mod prelude {
    pub use dataflow_core::prelude::*;

    pub use crate::constant_propagation::{Constant, ConstantPropagation, ConstantPropagationAnalysis, ConstantStore};
    pub use crate::liveness::{LiveSet, LiveVariables, LivenessAnalysis, NoValue};
    pub use crate::nullness::{Nullness, NullnessAnalysis, NullnessStore, NullnessTransfer, NULL_POINTER_EXCEPTION};
}

// Re-export main types at crate root for convenience
pub use constant_propagation::{Constant, ConstantPropagation, ConstantStore};
pub use liveness::{LiveSet, LiveVariables, NoValue};
pub use nullness::{Nullness, NullnessStore, NullnessTransfer};
