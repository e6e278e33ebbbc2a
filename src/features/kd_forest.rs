//! Randomized kd-tree forest for approximate nearest-neighbour search.
//!
//! Several kd-trees are built over the same descriptors, each choosing its
//! split dimensions at random among the highest-variance dimensions. A query
//! descends every tree once, then keeps exploring the most promising
//! unexplored branches of all trees from one shared priority queue until a
//! budget of examined descriptors is spent. Descriptors already examined
//! through another tree are skipped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::features::base::{DescriptorSet, FeatureError, SetFingerprint};
use crate::features::distance::bounded_distance;

/// Rows sampled when estimating per-dimension mean and variance.
const SAMPLE_MEAN: usize = 100;
/// Split dimension is drawn from this many highest-variance dimensions.
const RAND_DIM: usize = 5;

/// Forest construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParams {
    /// Number of randomized trees
    pub tree_count: usize,
    /// Seed for the split-dimension generator
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            tree_count: 4,
            seed: 0x1234_5678,
        }
    }
}

/// A neighbour returned by a search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row index in the descriptor set the index was built from
    pub index: usize,
    /// Squared Euclidean distance to the query
    pub distance: f64,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { start: usize, end: usize },
    Split { dim: usize, value: f32, left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct KdTree {
    nodes: Vec<Node>,
    /// Local row ids, grouped by leaf
    rows: Vec<usize>,
    root: usize,
}

/// Approximate k-NN index over one descriptor set
#[derive(Debug, Clone)]
pub struct ProximityIndex {
    trees: Vec<KdTree>,
    /// Row-major copy of the indexed descriptors
    data: Vec<f32>,
    /// Local row -> row in the source set
    labels: Vec<usize>,
    length: usize,
    source: SetFingerprint,
}

impl ProximityIndex {
    /// Build a forest over every descriptor of `set`
    pub fn build(set: &DescriptorSet, params: &IndexParams) -> Result<Self, FeatureError> {
        Self::build_rows(set, (0..set.len()).collect(), params)
    }

    /// Build a forest over the given rows of `set` only
    pub fn build_rows(
        set: &DescriptorSet,
        rows: Vec<usize>,
        params: &IndexParams,
    ) -> Result<Self, FeatureError> {
        if rows.is_empty() {
            return Err(FeatureError::EmptyInput);
        }
        if params.tree_count == 0 {
            return Err(FeatureError::InvalidInput(
                "proximity index needs at least one tree".to_string(),
            ));
        }

        let length = set.length();
        let mut data = Vec::with_capacity(rows.len() * length);
        for &row in &rows {
            let desc = set.get(row).ok_or_else(|| {
                FeatureError::InvalidInput(format!("row {} out of range for {} descriptors", row, set.len()))
            })?;
            data.extend_from_slice(desc);
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.tree_count)
            .map(|_| build_tree(&data, length, rows.len(), &mut rng))
            .collect();

        Ok(Self {
            trees,
            data,
            labels: rows,
            length,
            source: set.fingerprint(),
        })
    }

    /// Number of indexed descriptors
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Descriptor length the index was built for
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn fingerprint(&self) -> SetFingerprint {
        self.source
    }

    /// Whether this index was built from exactly this set
    pub fn is_built_from(&self, set: &DescriptorSet) -> bool {
        self.source == set.fingerprint()
    }

    /// Up to `k` nearest neighbours of one descriptor, closest first.
    ///
    /// Once `k` neighbours are known, the search stops after `checks`
    /// descriptors have been examined.
    pub fn nearest(&self, query: &[f32], k: usize, checks: usize) -> Result<Vec<Neighbor>, FeatureError> {
        self.check_query(query)?;
        let mut visited = vec![0u32; self.len()];
        Ok(self.search(query, k, checks, &mut visited, 1))
    }

    /// Batched k-NN search over a row-major query matrix
    pub fn knn_search(
        &self,
        queries: &[f32],
        k: usize,
        checks: usize,
    ) -> Result<Vec<Vec<Neighbor>>, FeatureError> {
        if self.length == 0 || queries.len() % self.length != 0 {
            return Err(FeatureError::InvalidInput(format!(
                "query matrix of {} values is not a whole number of rows of length {}",
                queries.len(),
                self.length
            )));
        }

        let mut visited = vec![0u32; self.len()];
        Ok(queries
            .chunks_exact(self.length)
            .enumerate()
            .map(|(i, query)| self.search(query, k, checks, &mut visited, i as u32 + 1))
            .collect())
    }

    fn check_query(&self, query: &[f32]) -> Result<(), FeatureError> {
        if query.len() != self.length {
            return Err(FeatureError::InvalidInput(format!(
                "query has {} values, index expects {}",
                query.len(),
                self.length
            )));
        }
        Ok(())
    }

    fn row(&self, local: usize) -> &[f32] {
        let start = local * self.length;
        &self.data[start..start + self.length]
    }

    fn search(&self, query: &[f32], k: usize, checks: usize, visited: &mut [u32], stamp: u32) -> Vec<Neighbor> {
        self.search_counted(query, k, checks, visited, stamp).0
    }

    /// Neighbours plus the number of descriptors examined.
    ///
    /// `visited[row] == stamp` marks rows already examined for this query.
    fn search_counted(
        &self,
        query: &[f32],
        k: usize,
        checks: usize,
        visited: &mut [u32],
        stamp: u32,
    ) -> (Vec<Neighbor>, usize) {
        let mut search = Search {
            index: self,
            query,
            results: KnnResults::new(k),
            heap: BinaryHeap::new(),
            visited,
            stamp,
            checked: 0,
            checks,
        };

        for tree in 0..self.trees.len() {
            search.descend(tree, self.trees[tree].root, 0.0);
        }
        while let Some(branch) = search.heap.pop() {
            if search.budget_spent() {
                break;
            }
            search.descend(branch.tree, branch.node, branch.mindist);
        }

        let neighbors = search
            .results
            .items
            .into_iter()
            .map(|(distance, local)| Neighbor {
                index: self.labels[local],
                distance,
            })
            .collect();
        (neighbors, search.checked)
    }
}

/// A branch waiting in the priority queue, ordered so the closest pops first.
#[derive(Debug, Clone, Copy)]
struct Branch {
    mindist: f64,
    tree: usize,
    node: usize,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        other.mindist.total_cmp(&self.mindist)
    }
}

/// The `k` best `(distance, local row)` pairs seen so far, ascending.
#[derive(Debug)]
struct KnnResults {
    k: usize,
    items: Vec<(f64, usize)>,
}

impl KnnResults {
    fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k + 1),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    fn worst(&self) -> f64 {
        if self.is_full() {
            self.items.last().map(|item| item.0).unwrap_or(f64::INFINITY)
        } else {
            f64::INFINITY
        }
    }

    fn offer(&mut self, distance: f64, local: usize) {
        if self.k == 0 || distance >= self.worst() {
            return;
        }
        let pos = self.items.partition_point(|item| item.0 <= distance);
        self.items.insert(pos, (distance, local));
        self.items.truncate(self.k);
    }
}

struct Search<'a> {
    index: &'a ProximityIndex,
    query: &'a [f32],
    results: KnnResults,
    heap: BinaryHeap<Branch>,
    visited: &'a mut [u32],
    stamp: u32,
    checked: usize,
    checks: usize,
}

impl Search<'_> {
    fn budget_spent(&self) -> bool {
        self.checked >= self.checks && self.results.is_full()
    }

    /// Walk from `node` to a leaf, queueing the far side of every split.
    ///
    /// `mindist` is a lower bound on the squared distance from the query to
    /// any descriptor below `node`.
    fn descend(&mut self, tree: usize, mut node: usize, mindist: f64) {
        let index = self.index;
        let kd = &index.trees[tree];
        loop {
            if mindist > self.results.worst() {
                return;
            }
            match kd.nodes[node] {
                Node::Leaf { start, end } => {
                    if self.budget_spent() {
                        return;
                    }
                    for &local in &kd.rows[start..end] {
                        if self.visited[local] == self.stamp {
                            continue;
                        }
                        self.visited[local] = self.stamp;
                        self.checked += 1;
                        let dist = bounded_distance(self.query, index.row(local), self.results.worst());
                        self.results.offer(dist, local);
                    }
                    return;
                }
                Node::Split { dim, value, left, right } => {
                    let diff = (self.query[dim] - value) as f64;
                    let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                    let far_dist = mindist.max(diff * diff);
                    if far_dist <= self.results.worst() {
                        self.heap.push(Branch {
                            mindist: far_dist,
                            tree,
                            node: far,
                        });
                    }
                    node = near;
                }
            }
        }
    }
}

fn build_tree(data: &[f32], length: usize, count: usize, rng: &mut StdRng) -> KdTree {
    let mut rows: Vec<usize> = (0..count).collect();
    // Shuffle so each tree samples a different subset for its statistics.
    rows.shuffle(rng);

    let mut nodes = Vec::new();
    let root = divide(&mut nodes, &mut rows, 0, data, length, rng);
    KdTree { nodes, rows, root }
}

/// Split `rows` (which start at `offset` in the tree's row list) and return
/// the id of the created node.
fn divide(
    nodes: &mut Vec<Node>,
    rows: &mut [usize],
    offset: usize,
    data: &[f32],
    length: usize,
    rng: &mut StdRng,
) -> usize {
    let count = rows.len();
    if count <= 1 {
        nodes.push(Node::Leaf {
            start: offset,
            end: offset + count,
        });
        return nodes.len() - 1;
    }

    let (dim, mut value) = choose_split(rows, data, length, rng);
    let coord = |row: usize| data[row * length + dim];

    // Rows below `value` go left, the rest right.
    let mut lim = 0;
    for i in 0..count {
        if coord(rows[i]) < value {
            rows.swap(i, lim);
            lim += 1;
        }
    }
    if lim == 0 || lim == count {
        // Degenerate split: fall back to the median so both sides are
        // non-empty and still ordered around `value`.
        lim = count / 2;
        rows.select_nth_unstable_by(lim, |a, b| coord(*a).total_cmp(&coord(*b)));
        value = coord(rows[lim]);
    }

    let id = nodes.len();
    nodes.push(Node::Leaf { start: 0, end: 0 });
    let (left_rows, right_rows) = rows.split_at_mut(lim);
    let left = divide(nodes, left_rows, offset, data, length, rng);
    let right = divide(nodes, right_rows, offset + lim, data, length, rng);
    nodes[id] = Node::Split { dim, value, left, right };
    id
}

/// Pick a split dimension among the highest-variance ones and split at its
/// sample mean.
fn choose_split(rows: &[usize], data: &[f32], length: usize, rng: &mut StdRng) -> (usize, f32) {
    let sample = &rows[..rows.len().min(SAMPLE_MEAN)];
    let n = sample.len() as f64;

    let mut mean = vec![0.0f64; length];
    for &row in sample {
        for (m, v) in mean.iter_mut().zip(&data[row * length..(row + 1) * length]) {
            *m += *v as f64;
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut variance = vec![0.0f64; length];
    for &row in sample {
        for ((var, m), v) in variance
            .iter_mut()
            .zip(&mean)
            .zip(&data[row * length..(row + 1) * length])
        {
            let d = *v as f64 - m;
            *var += d * d;
        }
    }

    let mut dims: Vec<usize> = (0..length).collect();
    dims.sort_by(|a, b| variance[*b].total_cmp(&variance[*a]));
    let top = RAND_DIM.min(length);
    let dim = dims[rng.random_range(0..top)];
    (dim, mean[dim] as f32)
}
