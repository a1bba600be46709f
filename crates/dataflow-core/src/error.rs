use thiserror::Error;

use crate::cfg::BlockId;
use crate::node::NodeId;

pub type Result<T> = std::result::Result<T, DataflowError>;

/// Structural faults of a control-flow graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedCfg {
    #[error("node {0} is not placed in any block")]
    NodeWithoutBlock(NodeId),

    #[error("node {0} is placed in more than one block")]
    NodeInMultipleBlocks(NodeId),

    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("invalid block {block}: {reason}")]
    InvalidBlock { block: BlockId, reason: String },

    #[error("no fixpoint after {iterations} block visits (cycle without a widening-capable lattice)")]
    NonTermination { iterations: usize },
}

/// Errors surfaced by the analysis engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataflowError {
    #[error("malformed CFG: {0}")]
    MalformedCfg(#[from] MalformedCfg),

    #[error("lattice contract violated at block {block}: {details}")]
    LatticeContractViolation { block: BlockId, details: String },
}

impl DataflowError {
    pub fn lattice_violation<D: std::fmt::Display>(block: BlockId, details: D) -> Self {
        Self::LatticeContractViolation {
            block,
            details: details.to_string(),
        }
    }
}
