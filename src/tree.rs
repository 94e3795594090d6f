use ordered_float::OrderedFloat;
use tracing::trace;

use crate::{
    error::BvhError,
    node::{Node, NULL},
    pool::NodePool,
    query::{Probe, Segment},
    volume::BoundingVolume,
};

/// Restructuring step run on every ancestor while refitting after an insertion.
pub trait Balance<const D: usize> {
    /// Balances the subtree at `index` and returns the slot now standing in its place.
    /// Implementations that rotate the root must update `root`.
    fn balance(&mut self, pool: &mut NodePool<D>, root: &mut usize, index: usize) -> usize;
}

/// Leaves the tree shape to the insertion heuristic alone.
///
/// Depth is not bounded: adversarial insertion orders can degrade queries toward a
/// linear scan, but every structural invariant still holds.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBalance;

impl<const D: usize> Balance<D> for NoBalance {
    fn balance(&mut self, _pool: &mut NodePool<D>, _root: &mut usize, index: usize) -> usize {
        index
    }
}

/// Dynamic bounding volume hierarchy over axis-aligned boxes.
///
/// Each leaf holds one external object, identified by an opaque `data_id`. Internal nodes
/// always have two children and bound both of them exactly.
pub struct DynamicTree<const D: usize, B = NoBalance> {
    pub(crate) root: usize,
    pub(crate) pool: NodePool<D>,
    balancer: B,
}

impl<const D: usize> DynamicTree<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_balance(NoBalance)
    }

    /// Creates a tree whose pool starts with `capacity` slots, `None` if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        Some(DynamicTree {
            root: NULL,
            pool: NodePool::with_capacity(capacity)?,
            balancer: NoBalance,
        })
    }
}

impl<const D: usize> Default for DynamicTree<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize, B: Balance<D>> DynamicTree<D, B> {
    #[must_use]
    pub fn with_balance(balancer: B) -> Self {
        DynamicTree {
            root: NULL,
            pool: NodePool::new(),
            balancer,
        }
    }

    /// Inserts a leaf for `data_id` and returns its slot index.
    ///
    /// The index stays valid for the lifetime of the tree, across pool growth.
    pub fn insert_leaf(
        &mut self,
        data_id: usize,
        bounding: BoundingVolume<D>,
    ) -> Result<usize, BvhError> {
        bounding.validate()?;

        let leaf = self.pool.allocate()?;
        self.pool[leaf].bounding = bounding;
        self.pool[leaf].data_id = data_id;

        if self.root == NULL {
            self.root = leaf;
            return Ok(leaf);
        }

        // Stage 1: find the best sibling for the new leaf
        let sibling = self.pick_best_sibling(&bounding);

        // Stage 2: splice a new parent in place of the sibling
        let new_parent = match self.pool.allocate() {
            Ok(slot_id) => slot_id,
            Err(err) => {
                self.pool.free(leaf);
                return Err(err);
            }
        };
        let old_parent = self.pool[sibling].parent;
        let sibling_height = self.pool[sibling].height;
        let combined = bounding.union(&self.pool[sibling].bounding);

        let node = &mut self.pool[new_parent];
        node.parent = old_parent;
        node.child_a = sibling;
        node.child_b = leaf;
        node.bounding = combined;
        node.height = sibling_height + 1;
        self.pool[sibling].parent = new_parent;
        self.pool[leaf].parent = new_parent;

        if old_parent == NULL {
            self.root = new_parent;
        } else if self.pool[old_parent].child_a == sibling {
            self.pool[old_parent].child_a = new_parent;
        } else {
            self.pool[old_parent].child_b = new_parent;
        }

        // Stage 3: walk back up to the root refitting heights and volumes
        self.refit(new_parent);
        Ok(leaf)
    }

    fn refit(&mut self, mut index: usize) {
        while index != NULL {
            index = self.balancer.balance(&mut self.pool, &mut self.root, index);

            let child_a = &self.pool[self.pool[index].child_a];
            let child_b = &self.pool[self.pool[index].child_b];
            let height = 1 + child_a.height.max(child_b.height);
            let bounding = child_a.bounding.union(&child_b.bounding);

            let node = &mut self.pool[index];
            node.height = height;
            node.bounding = bounding;
            index = node.parent;
        }
    }
}

impl<const D: usize, B> DynamicTree<D, B> {
    // Greedy descent: stop at the first node where pairing with the new leaf is strictly
    // cheaper than pushing it into either child.
    fn pick_best_sibling(&self, bounding: &BoundingVolume<D>) -> usize {
        let mut sibling = self.root;
        while !self.pool[sibling].is_leaf() {
            let (cost, cost_a, cost_b) = self.descent_costs(sibling, bounding);
            if cost < cost_a && cost < cost_b {
                break;
            }

            let node = &self.pool[sibling];
            sibling = if cost_b < cost_a {
                node.child_b
            } else {
                node.child_a
            };
        }
        trace!(sibling, "picked sibling");
        sibling
    }

    /// Costs at the internal node `index` of (pairing the new volume with this node,
    /// descending into `child_a`, descending into `child_b`).
    fn descent_costs(&self, index: usize, bounding: &BoundingVolume<D>) -> (f64, f64, f64) {
        let node = &self.pool[index];
        let area = node.bounding.perimeter();
        let combined_area = node.bounding.union(bounding).perimeter();

        // Cost of creating a new parent for this node and the new leaf
        let cost = 2.0 * combined_area;

        // Minimum cost every ancestor pays if the leaf goes further down
        let inheritance_cost = 2.0 * (combined_area - area);

        let child_cost = |child_id: usize| {
            let child = &self.pool[child_id];
            let new_area = child.bounding.union(bounding).perimeter();
            if child.is_leaf() {
                new_area + inheritance_cost
            } else {
                new_area - child.bounding.perimeter() + inheritance_cost
            }
        };
        (cost, child_cost(node.child_a), child_cost(node.child_b))
    }

    /// Depth-first traversal calling `visit` on every leaf whose volume passes `probe`.
    ///
    /// Subtrees whose volume fails are pruned. Returns whether any leaf was visited.
    pub fn query_with<P, F>(&self, probe: &P, mut visit: F) -> bool
    where
        P: Probe<D>,
        F: FnMut(&Node<D>),
    {
        if self.root == NULL {
            return false;
        }

        let mut hit = false;
        let mut stack = vec![self.root];
        while let Some(node_id) = stack.pop() {
            let node = &self.pool[node_id];
            if !probe.test(&node.bounding) {
                continue;
            }

            if node.is_leaf() {
                visit(node);
                hit = true;
            } else {
                stack.push(node.child_a);
                stack.push(node.child_b);
            }
        }
        hit
    }

    #[must_use]
    pub fn query<P: Probe<D>>(&self, probe: &P) -> Vec<Node<D>> {
        let mut result = Vec::new();
        self.query_with(probe, |node| result.push(*node));
        result
    }

    /// Leaves whose volume the segment `from -> to` passes through, in traversal order.
    #[must_use]
    pub fn raycast(&self, from: &[f64; D], to: &[f64; D]) -> Vec<Node<D>> {
        self.query(&Segment::new(*from, *to))
    }

    /// Calls `callback(origin, direction, leaf)` for every leaf the segment passes through.
    ///
    /// `direction` is `to - from`, so the leaf's entry point is `origin + t * direction`.
    pub fn raycast_with<F>(&self, from: &[f64; D], to: &[f64; D], mut callback: F) -> bool
    where
        F: FnMut(&[f64; D], &[f64; D], &Node<D>),
    {
        let segment = Segment::new(*from, *to);
        let direction = segment.direction();
        self.query_with(&segment, |node| callback(&segment.from, &direction, node))
    }

    /// The hit leaf with the smallest entry parameter, and that parameter.
    ///
    /// Reduces over every reported leaf; the traversal itself does not prune by distance.
    #[must_use]
    pub fn raycast_closest(&self, from: &[f64; D], to: &[f64; D]) -> Option<(Node<D>, f64)> {
        let segment = Segment::new(*from, *to);
        self.query(&segment)
            .into_iter()
            .filter_map(|node| segment.hit(&node.bounding).map(|t| (node, t)))
            .min_by_key(|(_, t)| OrderedFloat(*t))
    }

    /// Leaves overlapping the box spanned by `a` and `b`.
    #[must_use]
    pub fn intersects(&self, a: &[f64; D], b: &[f64; D]) -> Vec<Node<D>> {
        self.query(&Segment::new(*a, *b).bounds())
    }

    /// Calls `callback(query_box, leaf)` for every leaf overlapping the box spanned by `a` and `b`.
    pub fn intersects_with<F>(&self, a: &[f64; D], b: &[f64; D], mut callback: F) -> bool
    where
        F: FnMut(&BoundingVolume<D>, &Node<D>),
    {
        let query_box = Segment::new(*a, *b).bounds();
        self.query_with(&query_box, |node| callback(&query_box, node))
    }

    #[must_use]
    pub fn root(&self) -> Option<&Node<D>> {
        self.pool.get(self.root)
    }

    #[must_use]
    pub fn node(&self, slot_id: usize) -> Option<&Node<D>> {
        self.pool.get(slot_id)
    }

    /// Every active node, leaves and internal nodes alike, in slot order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<D>> {
        self.pool.iter()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.root().map_or(0, |node| node.height)
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        // A full binary tree with n leaves has 2n - 1 nodes
        (self.pool.len() + 1) / 2
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root == NULL
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Sum of internal node perimeters, the quantity the insertion heuristic keeps small.
    #[must_use]
    pub fn total_perimeter(&self) -> f64 {
        self.nodes()
            .filter(|node| !node.is_leaf())
            .map(|node| node.bounding.perimeter())
            .sum()
    }

    /// CSV rows of every active node, from the root level down to the leaves.
    #[must_use]
    pub fn nodes_to_string_rows(&self) -> Vec<String> {
        let mut rows = Vec::new();
        let height = self.height();
        for h in (0..=height).rev() {
            for node in self.nodes() {
                if node.height == h {
                    rows.push(node.to_string());
                }
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{Balance, DynamicTree};
    use crate::{
        node::{Node, NULL},
        pool::NodePool,
        volume::BoundingVolume,
    };

    fn cube(min: f64, edge: f64) -> BoundingVolume<3> {
        BoundingVolume::new([min; 3], [min + edge; 3])
    }

    fn random_box(rng: &mut StdRng) -> BoundingVolume<3> {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for i in 0..3 {
            min[i] = rng.gen_range(-100.0..100.0);
            max[i] = min[i] + rng.gen_range(0.5..3.0);
        }
        BoundingVolume::new(min, max)
    }

    #[test]
    fn first_leaf_is_root() {
        let mut tree = DynamicTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);

        let leaf = tree.insert_leaf(42, cube(0.0, 1.0)).unwrap();
        let root = tree.root().expect("root");
        assert_eq!(root.slot_id, leaf);
        assert_eq!(root.data_id, 42);
        assert!(root.is_leaf());
        assert!(root.is_root());
        assert_eq!(tree.len(), 1);
        tree.assert_well_formed();
    }

    #[test]
    fn invalid_volume_is_rejected() {
        let mut tree = DynamicTree::<3>::new();
        let inverted = BoundingVolume::new([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]);
        assert!(tree.insert_leaf(0, inverted).is_err());
        assert!(tree.is_empty());
        assert_eq!(tree.nodes().count(), 0);
    }

    #[test]
    fn sibling_next_to_nearby_leaf() {
        let mut tree = DynamicTree::new();
        let a = tree.insert_leaf(0, cube(0.0, 1.0)).unwrap();
        let b = tree.insert_leaf(1, cube(100.0, 1.0)).unwrap();
        let c = tree.insert_leaf(2, cube(0.5, 1.0)).unwrap();
        tree.assert_well_formed();

        // c pairs with a under the root's first child
        let parent = tree.node(c).unwrap().parent;
        let parent = tree.node(parent).unwrap();
        assert_eq!(parent.child_a, a);
        assert_eq!(parent.child_b, c);

        let root = tree.root().unwrap();
        assert_eq!(root.child_a, parent.slot_id);
        assert_eq!(root.child_b, b);
        assert_eq!(root.height, 2);
    }

    #[test]
    fn sibling_at_root_for_distant_leaf() {
        let mut tree = DynamicTree::new();
        tree.insert_leaf(0, cube(0.0, 1.0)).unwrap();
        tree.insert_leaf(1, cube(100.0, 1.0)).unwrap();
        let old_root = tree.root().unwrap().slot_id;
        let far = tree.insert_leaf(2, cube(1000.0, 1.0)).unwrap();
        tree.assert_well_formed();

        let root = tree.root().unwrap();
        assert_eq!(root.child_a, old_root);
        assert_eq!(root.child_b, far);
        assert_eq!(root.bounding, cube(0.0, 1001.0));
    }

    #[test]
    fn descent_only_when_cheaper() {
        let mut tree = DynamicTree::new();
        let mut rng = StdRng::seed_from_u64(0);
        for i in 0..200 {
            let bounding = random_box(&mut rng);
            if !tree.is_empty() {
                // No ancestor of the chosen sibling would have been a strictly cheaper stop
                let sibling = tree.pick_best_sibling(&bounding);
                let mut ancestor = tree.pool[sibling].parent;
                while ancestor != NULL {
                    let (cost, cost_a, cost_b) = tree.descent_costs(ancestor, &bounding);
                    assert!(!(cost < cost_a && cost < cost_b));
                    ancestor = tree.pool[ancestor].parent;
                }
            }
            tree.insert_leaf(i, bounding).unwrap();
        }
        tree.assert_well_formed();
    }

    #[test]
    fn invariants_after_random_inserts() {
        let mut tree = DynamicTree::new();
        let mut rng = StdRng::seed_from_u64(7);
        let mut leaves = Vec::new();
        for i in 0..500 {
            let bounding = random_box(&mut rng);
            let leaf = tree.insert_leaf(i, bounding).unwrap();
            leaves.push((leaf, bounding));

            // The root always bounds the latest leaf
            assert!(tree.root().unwrap().bounding.contains(&bounding));
        }
        tree.assert_well_formed();
        assert_eq!(tree.len(), 500);
        assert_eq!(tree.nodes().count(), 999);

        for (i, (leaf, bounding)) in leaves.iter().enumerate() {
            let node = tree.node(*leaf).unwrap();
            assert_eq!(node.data_id, i);
            assert_eq!(node.bounding, *bounding);
            assert_eq!(node.height, 0);
        }
    }

    #[test]
    fn pool_growth_keeps_leaf_indices() {
        let mut tree = DynamicTree::with_capacity(16).expect("Invalid capacity");
        let mut leaves = Vec::new();
        for i in 0..100 {
            let bounding = cube(i as f64 * 2.0, 1.0);
            leaves.push(tree.insert_leaf(i, bounding).unwrap());

            // Indices issued so far still map to the same objects
            for (j, leaf) in leaves.iter().enumerate() {
                assert_eq!(tree.node(*leaf).unwrap().data_id, j);
            }
        }
        assert!(tree.capacity() >= 199);
        assert_eq!(tree.capacity(), 256);
        assert!(DynamicTree::<3>::with_capacity(0).is_none());
    }

    #[derive(Default)]
    struct Recorder {
        visited: Vec<usize>,
    }

    impl Balance<3> for Recorder {
        fn balance(&mut self, _pool: &mut NodePool<3>, _root: &mut usize, index: usize) -> usize {
            self.visited.push(index);
            index
        }
    }

    #[test]
    fn balance_runs_on_every_ancestor() {
        let mut tree = DynamicTree::with_balance(Recorder::default());
        for i in 0..20 {
            tree.insert_leaf(i, cube(i as f64, 0.5)).unwrap();
        }
        tree.balancer.visited.clear();

        let leaf = tree.insert_leaf(20, cube(3.2, 0.5)).unwrap();
        let mut ancestors = Vec::new();
        let mut current = tree.pool[leaf].parent;
        while current != NULL {
            ancestors.push(current);
            current = tree.pool[current].parent;
        }
        assert_eq!(tree.balancer.visited, ancestors);
        tree.assert_well_formed();
    }

    #[test]
    fn single_leaf_queries() {
        let mut tree = DynamicTree::new();
        let leaf = tree.insert_leaf(9, cube(-1.0, 2.0)).unwrap();

        let hits = tree.raycast(&[0.0, 0.0, -10.0], &[0.0, 0.0, 10.0]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slot_id, leaf);
        assert_eq!(hits[0].data_id, 9);
        assert!(tree.raycast(&[10.0, 10.0, 10.0], &[20.0, 20.0, 20.0]).is_empty());

        let hits = tree.intersects(&[0.0, 0.0, 0.0], &[5.0, 5.0, 5.0]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].data_id, 9);
        assert!(tree.intersects(&[5.0, 5.0, 5.0], &[10.0, 10.0, 10.0]).is_empty());
    }

    #[test]
    fn empty_tree_queries() {
        let tree = DynamicTree::<3>::new();
        assert!(tree.raycast(&[0.0; 3], &[1.0; 3]).is_empty());
        assert!(tree.intersects(&[0.0; 3], &[1.0; 3]).is_empty());
        assert!(!tree.raycast_with(&[0.0; 3], &[1.0; 3], |_, _, _| panic!("no leaves")));
        assert!(!tree.intersects_with(&[0.0; 3], &[1.0; 3], |_, _| panic!("no leaves")));
        assert!(tree.raycast_closest(&[0.0; 3], &[1.0; 3]).is_none());
        assert!(tree.root().is_none());
    }

    #[test]
    fn callbacks_receive_segment() {
        let mut tree = DynamicTree::new();
        for i in 0..10 {
            tree.insert_leaf(i, cube(i as f64 * 3.0, 1.0)).unwrap();
        }

        let mut visited = Vec::new();
        let hit = tree.raycast_with(&[-1.0, 0.5, 0.5], &[5.0, 0.5, 0.5], |origin, direction, node| {
            assert_eq!(origin, &[-1.0, 0.5, 0.5]);
            assert_eq!(direction, &[6.0, 0.0, 0.0]);
            visited.push(node.data_id);
        });
        assert!(hit);
        visited.sort_unstable();
        assert_eq!(visited, vec![0]);

        let mut overlapping = Vec::new();
        tree.intersects_with(&[0.0; 3], &[7.0; 3], |query_box, node| {
            assert_eq!(query_box.max, [7.0; 3]);
            overlapping.push(node.data_id);
        });
        overlapping.sort_unstable();
        assert_eq!(overlapping, vec![0, 1, 2]);
    }

    #[test]
    fn closest_hit() {
        let mut tree = DynamicTree::new();
        for i in 0..10 {
            let x = i as f64 * 3.0;
            let bounding = BoundingVolume::new([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0]);
            tree.insert_leaf(i, bounding).unwrap();
        }

        // Cast from the far end back toward the origin, through every box
        let from = [40.0, 0.5, 0.5];
        let to = [-10.0, 0.5, 0.5];
        assert_eq!(tree.raycast(&from, &to).len(), 10);

        let (node, t) = tree.raycast_closest(&from, &to).expect("hit");
        assert_eq!(node.data_id, 9);
        assert!((t - 0.24).abs() < 1e-12);
    }

    #[test]
    fn repeated_queries_match() {
        let mut tree = DynamicTree::new();
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..300 {
            tree.insert_leaf(i, random_box(&mut rng)).unwrap();
        }

        let first = tree.raycast(&[-120.0, -120.0, -120.0], &[120.0, 120.0, 120.0]);
        let second = tree.raycast(&[-120.0, -120.0, -120.0], &[120.0, 120.0, 120.0]);
        assert_eq!(first, second);

        let first = tree.intersects(&[-20.0; 3], &[20.0; 3]);
        let second = tree.intersects(&[-20.0; 3], &[20.0; 3]);
        assert_eq!(first, second);
    }

    #[test]
    fn string_rows_by_level() {
        let mut tree = DynamicTree::new();
        tree.insert_leaf(0, cube(0.0, 1.0)).unwrap();
        tree.insert_leaf(1, cube(5.0, 1.0)).unwrap();
        tree.insert_leaf(2, cube(10.0, 1.0)).unwrap();

        let rows = tree.nodes_to_string_rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], tree.root().unwrap().to_string());

        let heights: Vec<usize> = rows
            .iter()
            .map(|row| row.split(',').nth(1).unwrap().parse().unwrap())
            .collect();
        assert_eq!(heights, vec![2, 1, 0, 0, 0]);
    }

    #[test]
    fn total_perimeter_counts_internal_nodes() {
        let mut tree = DynamicTree::new();
        assert_eq!(tree.total_perimeter(), 0.0);
        tree.insert_leaf(0, cube(0.0, 1.0)).unwrap();
        assert_eq!(tree.total_perimeter(), 0.0);
        tree.insert_leaf(1, cube(1.0, 1.0)).unwrap();
        assert_eq!(tree.total_perimeter(), cube(0.0, 2.0).perimeter());

        let internal: Vec<&Node<3>> = tree.nodes().filter(|node| !node.is_leaf()).collect();
        assert_eq!(internal.len(), 1);
    }
}
