use ordered_float::OrderedFloat;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, warn};

use crate::{
    error::BvhError,
    node::NULL,
    query::{Probe, Segment},
    volume::BoundingVolume,
};

pub const DEFAULT_MAX_LEVELS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchNode<const D: usize> {
    pub bounding: BoundingVolume<D>,
    pub data_id: usize,
    pub child_a: usize,
    pub child_b: usize,
    pub height: usize,
}

impl<const D: usize> BatchNode<D> {
    fn leaf(data_id: usize, bounding: BoundingVolume<D>) -> BatchNode<D> {
        BatchNode {
            bounding,
            data_id,
            child_a: NULL,
            child_b: NULL,
            height: 0,
        }
    }

    fn internal(child_a: usize, child_b: usize, nodes: &[BatchNode<D>]) -> BatchNode<D> {
        let (a, b) = (&nodes[child_a], &nodes[child_b]);
        BatchNode {
            bounding: a.bounding.union(&b.bounding),
            data_id: NULL,
            child_a,
            child_b,
            height: 1 + a.height.max(b.height),
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.child_a == NULL
    }
}

/// One-shot top-down builder for static scenes.
///
/// Each level sorts the current nodes by their center along a pseudo-random axis and pairs
/// neighbours under new parents; an odd node out is carried up unpaired. Pairing stops
/// after `max_levels` levels even if several nodes remain.
#[derive(Clone, Debug)]
pub struct BatchBuilder<const D: usize> {
    max_levels: usize,
    seed: u64,
}

impl<const D: usize> Default for BatchBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> BatchBuilder<D> {
    #[must_use]
    pub fn new() -> Self {
        BatchBuilder {
            max_levels: DEFAULT_MAX_LEVELS,
            seed: 0,
        }
    }

    #[must_use]
    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build<I>(&self, items: I) -> Result<BatchTree<D>, BvhError>
    where
        I: IntoIterator<Item = (usize, BoundingVolume<D>)>,
    {
        let mut nodes = Vec::new();
        for (data_id, bounding) in items {
            bounding.validate()?;
            nodes.push(BatchNode::leaf(data_id, bounding));
        }
        let leaf_count = nodes.len();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut level: Vec<usize> = (0..leaf_count).collect();
        let mut depth = 0;
        while level.len() > 1 && depth < self.max_levels {
            let axis = rng.gen_range(0..D);
            level.sort_by_key(|&node_id| OrderedFloat(nodes[node_id].bounding.center()[axis]));

            let mut next = Vec::with_capacity(level.len() / 2 + 1);
            for pair in level.chunks(2) {
                if let [a, b] = *pair {
                    let parent = BatchNode::internal(a, b, &nodes);
                    next.push(nodes.len());
                    nodes.push(parent);
                } else {
                    next.push(pair[0]);
                }
            }
            debug!(depth, axis, width = next.len(), "batch level built");

            level = next;
            depth += 1;
        }

        if level.len() > 1 {
            warn!(
                roots = level.len(),
                max_levels = self.max_levels,
                "batch build stopped at the level cap"
            );
        }

        Ok(BatchTree {
            nodes,
            roots: level,
            leaf_count,
        })
    }
}

/// Static hierarchy produced by [`BatchBuilder`], possibly with several roots.
pub struct BatchTree<const D: usize> {
    nodes: Vec<BatchNode<D>>,
    roots: Vec<usize>,
    leaf_count: usize,
}

impl<const D: usize> BatchTree<D> {
    #[must_use]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    #[must_use]
    pub fn nodes(&self) -> &[BatchNode<D>] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, node_id: usize) -> Option<&BatchNode<D>> {
        self.nodes.get(node_id)
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.roots
            .iter()
            .fold(0, |max, root| max.max(self.nodes[*root].height))
    }

    pub fn query_with<P, F>(&self, probe: &P, mut visit: F) -> bool
    where
        P: Probe<D>,
        F: FnMut(&BatchNode<D>),
    {
        let mut hit = false;
        let mut stack = self.roots.clone();
        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id];
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
    pub fn query<P: Probe<D>>(&self, probe: &P) -> Vec<BatchNode<D>> {
        let mut result = Vec::new();
        self.query_with(probe, |node| result.push(*node));
        result
    }

    #[must_use]
    pub fn raycast(&self, from: &[f64; D], to: &[f64; D]) -> Vec<BatchNode<D>> {
        self.query(&Segment::new(*from, *to))
    }

    #[must_use]
    pub fn intersects(&self, a: &[f64; D], b: &[f64; D]) -> Vec<BatchNode<D>> {
        self.query(&Segment::new(*a, *b).bounds())
    }
}
