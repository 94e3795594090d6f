use std::collections::HashSet;

use crate::{node::NULL, tree::DynamicTree};

impl<const D: usize, B> DynamicTree<D, B> {
    /// Panics if the tree isn't well-formed.
    ///
    /// Checks that every internal node has two children pointing back at it, that its
    /// height and volume are exactly recomputable from those children, that every active
    /// slot is reachable from the root, and that the free list threads exactly the
    /// inactive slots.
    ///
    /// This is mostly a utility for debugging and tests.
    pub fn assert_well_formed(&self) {
        let mut reachable = HashSet::new();
        if self.root != NULL {
            assert!(self.pool[self.root].is_root(), "root has a parent");
            let mut stack = vec![self.root];
            while let Some(node_id) = stack.pop() {
                assert!(reachable.insert(node_id), "node {node_id} reached twice");
                let node = &self.pool[node_id];
                assert!(node.is_active(), "free slot {node_id} linked into the tree");
                assert_eq!(node.slot_id, node_id);

                if node.is_leaf() {
                    assert_eq!(node.child_b, NULL, "leaf {node_id} has one child");
                    assert_eq!(node.height, 0, "leaf {node_id} has nonzero height");
                    continue;
                }

                assert_ne!(node.child_b, NULL, "internal node {node_id} has one child");
                let child_a = &self.pool[node.child_a];
                let child_b = &self.pool[node.child_b];
                assert_eq!(child_a.parent, node_id);
                assert_eq!(child_b.parent, node_id);
                assert_eq!(node.height, 1 + child_a.height.max(child_b.height));
                assert_eq!(node.bounding, child_a.bounding.union(&child_b.bounding));
                stack.push(node.child_a);
                stack.push(node.child_b);
            }
        }
        assert_eq!(reachable.len(), self.pool.len(), "unreachable active nodes");

        let mut free = HashSet::new();
        let mut current = self.pool.next_free();
        while current != NULL {
            assert!(free.insert(current), "free list cycle at {current}");
            assert!(!self.pool[current].is_active(), "active slot {current} on free list");
            current = self.pool[current].next_free;
        }
        assert_eq!(free.len() + self.pool.len(), self.pool.capacity());
    }
}
