use crate::volume::BoundingVolume;

/// Per-node test that drives tree traversal: a node is descended (or, for a leaf,
/// reported) only if its volume passes.
pub trait Probe<const D: usize> {
    fn test(&self, volume: &BoundingVolume<D>) -> bool;
}

/// Segment from `from` to `to`, parameterized as `from + t * direction` for `t` in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment<const D: usize> {
    pub from: [f64; D],
    pub to: [f64; D],
}

impl<const D: usize> Segment<D> {
    #[must_use]
    pub fn new(from: [f64; D], to: [f64; D]) -> Segment<D> {
        Segment { from, to }
    }

    #[must_use]
    pub fn direction(&self) -> [f64; D] {
        let mut direction = [0.0; D];
        for (i, d) in direction.iter_mut().enumerate() {
            *d = self.to[i] - self.from[i];
        }
        direction
    }

    /// Entry parameter of the segment into `volume`, if it hits.
    #[must_use]
    pub fn hit(&self, volume: &BoundingVolume<D>) -> Option<f64> {
        volume.raycast(&self.from, &self.to)
    }

    #[must_use]
    pub fn at(&self, t: f64) -> [f64; D] {
        let mut point = self.from;
        for (i, p) in point.iter_mut().enumerate() {
            *p += (self.to[i] - self.from[i]) * t;
        }
        point
    }

    /// The box spanned by both endpoints.
    #[must_use]
    pub fn bounds(&self) -> BoundingVolume<D> {
        let mut volume = BoundingVolume::new(self.from, self.from);
        for i in 0..D {
            volume.min[i] = volume.min[i].min(self.to[i]);
            volume.max[i] = volume.max[i].max(self.to[i]);
        }
        volume
    }
}

// Exact slab test.
impl<const D: usize> Probe<D> for Segment<D> {
    fn test(&self, volume: &BoundingVolume<D>) -> bool {
        self.hit(volume).is_some()
    }
}

// Coarse overlap test.
impl<const D: usize> Probe<D> for BoundingVolume<D> {
    fn test(&self, volume: &BoundingVolume<D>) -> bool {
        volume.intersects(self)
    }
}
