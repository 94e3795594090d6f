use crate::error::BvhError;

/// Direction components below this magnitude are treated as parallel to the axis.
pub const PARALLEL_EPSILON: f64 = f64::EPSILON;

/// Axis-aligned bounding box given by its minimum and maximum corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingVolume<const D: usize> {
    pub min: [f64; D],
    pub max: [f64; D],
}

impl<const D: usize> BoundingVolume<D> {
    #[must_use]
    pub fn new(min: [f64; D], max: [f64; D]) -> BoundingVolume<D> {
        BoundingVolume { min, max }
    }

    /// Creates a volume, failing if `min > max` on any axis.
    pub fn try_new(min: [f64; D], max: [f64; D]) -> Result<BoundingVolume<D>, BvhError> {
        let volume = BoundingVolume { min, max };
        volume.validate()?;
        Ok(volume)
    }

    /// Smallest volume enclosing every point of the set, `None` if the set is empty.
    #[must_use]
    pub fn from_points(points: &[[f64; D]]) -> Option<BoundingVolume<D>> {
        let (first, rest) = points.split_first()?;
        let mut volume = BoundingVolume::new(*first, *first);
        for point in rest {
            for i in 0..D {
                volume.min[i] = volume.min[i].min(point[i]);
                volume.max[i] = volume.max[i].max(point[i]);
            }
        }
        Some(volume)
    }

    pub fn validate(&self) -> Result<(), BvhError> {
        for i in 0..D {
            // Negated so that NaN corners are rejected too.
            if !(self.min[i] <= self.max[i]) {
                return Err(BvhError::InvalidVolume {
                    axis: i,
                    min: self.min[i],
                    max: self.max[i],
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn center(&self) -> [f64; D] {
        let mut center = [0.0; D];
        for (i, c) in center.iter_mut().enumerate() {
            *c = (self.min[i] + self.max[i]) * 0.5;
        }
        center
    }

    #[must_use]
    pub fn size(&self) -> [f64; D] {
        let mut size = [0.0; D];
        for (i, s) in size.iter_mut().enumerate() {
            *s = self.max[i] - self.min[i];
        }
        size
    }

    /// Sum of the edge lengths over all axes, doubled. Used as the insertion cost measure.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        2.0 * self.size().iter().sum::<f64>()
    }

    #[must_use]
    pub fn union(&self, other: &BoundingVolume<D>) -> BoundingVolume<D> {
        let mut volume = *self;
        for i in 0..D {
            volume.min[i] = self.min[i].min(other.min[i]);
            volume.max[i] = self.max[i].max(other.max[i]);
        }
        volume
    }

    #[must_use]
    pub fn contains(&self, other: &BoundingVolume<D>) -> bool {
        (0..D).all(|i| self.min[i] <= other.min[i] && other.max[i] <= self.max[i])
    }

    /// True if the two volumes overlap or touch on every axis.
    #[must_use]
    pub fn intersects(&self, other: &BoundingVolume<D>) -> bool {
        (0..D).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    /// Slab test against the segment `from -> to`.
    ///
    /// Returns the entry parameter `t` in `[0, 1]`, or `None` when the segment misses.
    /// A segment starting inside the volume hits at `t = 0`.
    #[must_use]
    pub fn raycast(&self, from: &[f64; D], to: &[f64; D]) -> Option<f64> {
        let mut t_min: f64 = 0.0;
        let mut t_max: f64 = 1.0;
        for i in 0..D {
            let d = to[i] - from[i];
            if d.abs() < PARALLEL_EPSILON {
                if from[i] < self.min[i] || self.max[i] < from[i] {
                    return None;
                }
                continue;
            }

            let mut t1 = (self.min[i] - from[i]) / d;
            let mut t2 = (self.max[i] - from[i]) / d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }

            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        if t_min < 0.0 || t_min > 1.0 {
            return None;
        }
        Some(t_min)
    }
}

impl<const D: usize> Default for BoundingVolume<D> {
    fn default() -> Self {
        BoundingVolume {
            min: [0.0; D],
            max: [0.0; D],
        }
    }
}
