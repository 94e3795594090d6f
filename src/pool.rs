use std::ops::{Index, IndexMut};

use tracing::debug;

use crate::{
    error::BvhError,
    node::{Node, NULL},
};

pub const DEFAULT_CAPACITY: usize = 16;

/// Growable arena of tree nodes with an intrusive free list.
///
/// Slots are addressed by index. Growth doubles the capacity and never moves a slot to
/// a different index, so issued indices stay valid until the slot is freed.
pub struct NodePool<const D: usize> {
    nodes: Vec<Node<D>>,
    next_free: usize,
    count: usize,
}

impl<const D: usize> Default for NodePool<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> NodePool<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::thread(Vec::with_capacity(DEFAULT_CAPACITY), DEFAULT_CAPACITY)
    }

    /// Creates a pool with `capacity` free slots, `None` if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        if capacity == 0 {
            return None;
        }
        Some(Self::thread(Vec::with_capacity(capacity), capacity))
    }

    fn thread(mut nodes: Vec<Node<D>>, capacity: usize) -> Self {
        Self::push_free_slots(&mut nodes, capacity);
        NodePool {
            nodes,
            next_free: 0,
            count: 0,
        }
    }

    // Appends free slots up to `capacity`, each linked to the next, the last to NULL.
    fn push_free_slots(nodes: &mut Vec<Node<D>>, capacity: usize) {
        for slot_id in nodes.len()..capacity {
            let next_free = if slot_id + 1 < capacity {
                slot_id + 1
            } else {
                NULL
            };
            nodes.push(Node::free(slot_id, next_free));
        }
    }

    /// Takes a slot off the free list, growing the pool when the list is empty.
    pub fn allocate(&mut self) -> Result<usize, BvhError> {
        if self.next_free == NULL {
            self.grow()?;
        }

        let slot_id = self.next_free;
        let node = &mut self.nodes[slot_id];
        self.next_free = node.next_free;

        node.bounding = Default::default();
        node.data_id = NULL;
        node.parent = NULL;
        node.child_a = NULL;
        node.child_b = NULL;
        node.next_free = NULL;
        node.height = 0;
        self.count += 1;
        Ok(slot_id)
    }

    /// Returns an active slot to the free list.
    pub fn free(&mut self, slot_id: usize) {
        debug_assert!(self.nodes[slot_id].is_active(), "slot {slot_id} freed twice");
        self.nodes[slot_id] = Node::free(slot_id, self.next_free);
        self.next_free = slot_id;
        self.count -= 1;
    }

    fn grow(&mut self) -> Result<(), BvhError> {
        let capacity = self.nodes.len();
        let exhausted = BvhError::PoolExhausted { capacity };
        let new_capacity = capacity.checked_mul(2).ok_or_else(|| exhausted.clone())?;
        self.nodes
            .try_reserve_exact(new_capacity - capacity)
            .map_err(|_| exhausted)?;

        Self::push_free_slots(&mut self.nodes, new_capacity);
        self.next_free = capacity;
        debug!(from = capacity, to = new_capacity, "node pool grown");
        Ok(())
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of active slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The slot at `slot_id` if it exists and is active.
    #[must_use]
    pub fn get(&self, slot_id: usize) -> Option<&Node<D>> {
        self.nodes.get(slot_id).filter(|node| node.is_active())
    }

    /// Iterates over active slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Node<D>> {
        self.nodes.iter().filter(|node| node.is_active())
    }

    /// Head of the free list, `NULL` when every slot is in use.
    #[must_use]
    pub fn next_free(&self) -> usize {
        self.next_free
    }
}

impl<const D: usize> Index<usize> for NodePool<D> {
    type Output = Node<D>;

    fn index(&self, slot_id: usize) -> &Node<D> {
        &self.nodes[slot_id]
    }
}

impl<const D: usize> IndexMut<usize> for NodePool<D> {
    fn index_mut(&mut self, slot_id: usize) -> &mut Node<D> {
        &mut self.nodes[slot_id]
    }
}
