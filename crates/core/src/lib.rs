#![forbid(unsafe_code)]

pub mod error;
pub mod ids;
pub mod model;
pub mod tree;

pub use error::TreeError;
pub use ids::{Identifier, IdentifierError, NodeId, NodeIdError};
pub use model::{Bounds, NewNode, Node, TreeSpec};
pub use tree::{
    IntegrityReport, MemoryStore, NestedSet, Placement, RebuildOptions, RebuildReport,
    TreeStorage, TreeTx, TxMode, Violation,
};
