use std::fmt;

use crate::volume::BoundingVolume;

/// Marks an absent link, and as a height, a free slot.
pub const NULL: usize = usize::MAX;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node<const D: usize> {
    pub slot_id: usize,
    pub bounding: BoundingVolume<D>,
    pub data_id: usize,
    pub parent: usize,
    pub child_a: usize,
    pub child_b: usize,
    pub height: usize,
    pub next_free: usize,
}

impl<const D: usize> Node<D> {
    #[must_use]
    pub fn free(slot_id: usize, next_free: usize) -> Node<D> {
        Node {
            slot_id,
            bounding: BoundingVolume::default(),
            data_id: NULL,
            parent: NULL,
            child_a: NULL,
            child_b: NULL,
            height: NULL,
            next_free,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.child_a == NULL
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.height != NULL
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent == NULL
    }
}

impl<const D: usize> fmt::Display for Node<D> {
    /// One CSV row: slot, height, data id (empty for internal nodes), then min and max corners.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},", self.slot_id, self.height)?;
        if self.is_leaf() {
            write!(f, "{}", self.data_id)?;
        }
        for x in self.bounding.min.iter().chain(self.bounding.max.iter()) {
            write!(f, ",{x}")?;
        }
        Ok(())
    }
}
