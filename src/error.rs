use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BvhError {
    /// A bounding volume whose minimum corner exceeds its maximum corner
    /// (or holds a NaN) on some axis.
    #[error("invalid bounding volume on axis {axis}: min {min} > max {max}")]
    InvalidVolume { axis: usize, min: f64, max: f64 },

    /// The node pool could not grow past its current capacity.
    #[error("node pool exhausted at {capacity} slots")]
    PoolExhausted { capacity: usize },
}
