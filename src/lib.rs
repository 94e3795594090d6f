mod batch;
mod error;
mod node;
mod pool;
mod query;
mod tree;
mod validation;
mod volume;

pub use batch::{BatchBuilder, BatchNode, BatchTree, DEFAULT_MAX_LEVELS};
pub use error::BvhError;
pub use node::{Node, NULL};
pub use pool::{NodePool, DEFAULT_CAPACITY};
pub use query::{Probe, Segment};
pub use tree::{Balance, DynamicTree, NoBalance};
pub use volume::{BoundingVolume, PARALLEL_EPSILON};
