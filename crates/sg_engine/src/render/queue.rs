//! Render bins and the per-frame render queue
//!
//! Bins are the coarse draw-order partition: every leaf belongs to exactly
//! one bin, bins draw in ascending number (same-number siblings in insertion
//! order), and a bin's negative-numbered children draw before its own
//! contents, non-negative children after. Within a bin the registered sort
//! mode decides leaf order: state-sorted bins walk their state groups in
//! insertion order, depth-sorted bins order leaves by eye distance.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::foundation::math::Mat4;
use crate::graph::Drawable;
use crate::state::{BinOrder, StateSet};

use super::state_graph::{LeafId, StateGraphArena, StateGraphId};

/// Index of a bin in the frame's bin arena
pub type BinId = usize;

/// The arena slot of the root render bin
pub const ROOT_BIN: BinId = 0;

/// Leaf ordering policy of one bin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// Walk state groups in insertion order; minimizes state changes
    StateSorted,
    /// Nearest leaves first, for early-depth rejection of opaque geometry
    FrontToBack,
    /// Farthest leaves first, for correct transparency blending
    BackToFront,
}

impl From<BinOrder> for SortMode {
    fn from(order: BinOrder) -> Self {
        match order {
            BinOrder::StateSorted => Self::StateSorted,
            BinOrder::DepthSorted => Self::BackToFront,
        }
    }
}

#[derive(Debug)]
struct BinNode {
    number: i32,
    sort: SortMode,
    /// Leaves bucketed by state graph node, buckets in first-leaf order
    groups: Vec<(StateGraphId, Vec<LeafId>)>,
    group_index: HashMap<StateGraphId, usize>,
    /// Child bins keyed by number; same-number bins keep insertion order
    children: BTreeMap<i32, Vec<BinId>>,
}

impl BinNode {
    fn new(number: i32, sort: SortMode) -> Self {
        Self {
            number,
            sort,
            groups: Vec::new(),
            group_index: HashMap::new(),
            children: BTreeMap::new(),
        }
    }
}

/// One cull pass's complete output, handed from cull to draw
///
/// Single writer (the cull traversal), single consumer (the draw replay);
/// each view/camera gets its own queue, and the threaded frame scheduler
/// rotates two of them so frame N can draw while frame N+1 culls.
#[derive(Debug)]
pub struct RenderQueue {
    pub(crate) graph: StateGraphArena,
    bins: Vec<BinNode>,
}

impl RenderQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            graph: StateGraphArena::new(),
            bins: vec![BinNode::new(0, SortMode::StateSorted)],
        }
    }

    /// Discard the frame's contents, keeping allocations where possible
    pub fn reset(&mut self) {
        self.graph.reset();
        self.bins.clear();
        self.bins.push(BinNode::new(0, SortMode::StateSorted));
    }

    /// The default bin leaves land in absent any redirection
    pub fn root_bin(&self) -> BinId {
        ROOT_BIN
    }

    /// Number of leaves across all bins
    pub fn leaf_count(&self) -> usize {
        self.graph.leaf_count()
    }

    /// True when the frame culled everything away
    pub fn is_empty(&self) -> bool {
        self.graph.leaf_count() == 0
    }

    /// Leaf accessor
    pub fn leaf(&self, id: LeafId) -> &super::state_graph::RenderLeaf {
        self.graph.leaf(id)
    }

    /// Find the numbered child of `parent`, creating it on first use
    ///
    /// Repeated requests for the same number return the first bin created
    /// for it; its sort mode is not changed by later requests.
    pub fn find_or_insert_bin(&mut self, parent: BinId, number: i32, order: BinOrder) -> BinId {
        if let Some(existing) = self.bins[parent]
            .children
            .get(&number)
            .and_then(|bins| bins.first())
        {
            return *existing;
        }
        let id = self.bins.len();
        self.bins.push(BinNode::new(number, order.into()));
        self.bins[parent].children.entry(number).or_default().push(id);
        id
    }

    /// Append a same-numbered sibling bin regardless of existing bins
    pub fn insert_bin(&mut self, parent: BinId, number: i32, sort: SortMode) -> BinId {
        let id = self.bins.len();
        self.bins.push(BinNode::new(number, sort));
        self.bins[parent].children.entry(number).or_default().push(id);
        id
    }

    /// Override a bin's sort mode
    pub fn set_bin_sort(&mut self, bin: BinId, sort: SortMode) {
        self.bins[bin].sort = sort;
    }

    /// Move the state cursor down along a pushed set
    pub fn push_set(&mut self, set: &Arc<StateSet>) {
        self.graph.push_set(set);
    }

    /// Move the state cursor back up
    pub fn pop_set(&mut self) {
        self.graph.pop_set();
    }

    /// File a leaf at the current state cursor into `bin`
    pub fn add_leaf(&mut self, bin: BinId, drawable: Arc<Drawable>, model_view: Mat4, depth: f32) {
        let cursor = self.graph.cursor();
        let (leaf_id, _) = self.graph.add_leaf(drawable, model_view, depth);
        let bin_node = &mut self.bins[bin];
        match bin_node.group_index.get(&cursor) {
            Some(index) => bin_node.groups[*index].1.push(leaf_id),
            None => {
                bin_node.group_index.insert(cursor, bin_node.groups.len());
                bin_node.groups.push((cursor, vec![leaf_id]));
            }
        }
    }

    /// Every leaf of the frame in final draw order
    pub fn leaves_in_draw_order(&self) -> Vec<LeafId> {
        let mut out = Vec::with_capacity(self.graph.leaf_count());
        self.collect_bin(ROOT_BIN, &mut out);
        out
    }

    fn collect_bin(&self, bin: BinId, out: &mut Vec<LeafId>) {
        let node = &self.bins[bin];
        for (number, children) in &node.children {
            if *number < 0 {
                for child in children {
                    self.collect_bin(*child, out);
                }
            }
        }
        self.collect_own(node, out);
        for (number, children) in &node.children {
            if *number >= 0 {
                for child in children {
                    self.collect_bin(*child, out);
                }
            }
        }
    }

    fn collect_own(&self, node: &BinNode, out: &mut Vec<LeafId>) {
        let start = out.len();
        for (_, leaves) in &node.groups {
            out.extend_from_slice(leaves);
        }
        let slice = &mut out[start..];
        match node.sort {
            SortMode::StateSorted => {}
            // stable sorts keep insertion order for equal depths
            SortMode::FrontToBack => slice.sort_by(|a, b| {
                self.graph
                    .leaf(*a)
                    .depth
                    .total_cmp(&self.graph.leaf(*b).depth)
            }),
            SortMode::BackToFront => slice.sort_by(|a, b| {
                self.graph
                    .leaf(*b)
                    .depth
                    .total_cmp(&self.graph.leaf(*a).depth)
            }),
        }
    }

    /// Bin number a bin was created with (diagnostics)
    pub fn bin_number(&self, bin: BinId) -> i32 {
        self.bins[bin].number
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::graph::box_drawable;
    use crate::state::{Mode, StateFlags};

    fn drawable() -> Arc<Drawable> {
        Arc::new(box_drawable(Vec3::zeros(), 1.0))
    }

    fn blend_set() -> Arc<StateSet> {
        let mut set = StateSet::new();
        set.set_mode(Mode::Blend, StateFlags::on());
        Arc::new(set)
    }

    #[test]
    fn test_bin_number_ordering() {
        let mut queue = RenderQueue::new();
        let root = queue.root_bin();
        let late = queue.find_or_insert_bin(root, 10, BinOrder::StateSorted);
        let early = queue.find_or_insert_bin(root, -1, BinOrder::StateSorted);

        // insert into bins out of order: default, then late, then early
        queue.add_leaf(root, drawable(), Mat4::identity(), 0.0); // leaf 0
        queue.add_leaf(late, drawable(), Mat4::identity(), 0.0); // leaf 1
        queue.add_leaf(early, drawable(), Mat4::identity(), 0.0); // leaf 2

        // negative bin first, default bin contents, then positive bin
        assert_eq!(queue.leaves_in_draw_order(), vec![2, 0, 1]);
    }

    #[test]
    fn test_back_to_front_sorting() {
        let mut queue = RenderQueue::new();
        let root = queue.root_bin();
        let transparent = queue.find_or_insert_bin(root, 10, BinOrder::DepthSorted);

        queue.push_set(&blend_set());
        queue.add_leaf(transparent, drawable(), Mat4::identity(), 1.0); // leaf 0 near
        queue.add_leaf(transparent, drawable(), Mat4::identity(), 9.0); // leaf 1 far
        queue.add_leaf(transparent, drawable(), Mat4::identity(), 5.0); // leaf 2 mid
        queue.pop_set();

        assert_eq!(queue.leaves_in_draw_order(), vec![1, 2, 0]);
    }

    #[test]
    fn test_front_to_back_sorting() {
        let mut queue = RenderQueue::new();
        let root = queue.root_bin();
        let bin = queue.insert_bin(root, 1, SortMode::FrontToBack);

        queue.add_leaf(bin, drawable(), Mat4::identity(), 9.0);
        queue.add_leaf(bin, drawable(), Mat4::identity(), 1.0);
        assert_eq!(queue.leaves_in_draw_order(), vec![1, 0]);
    }

    #[test]
    fn test_same_number_bins_insertion_order() {
        let mut queue = RenderQueue::new();
        let root = queue.root_bin();
        let first = queue.insert_bin(root, 5, SortMode::StateSorted);
        let second = queue.insert_bin(root, 5, SortMode::StateSorted);

        queue.add_leaf(second, drawable(), Mat4::identity(), 0.0); // leaf 0
        queue.add_leaf(first, drawable(), Mat4::identity(), 0.0); // leaf 1

        // both bins share number 5; the one inserted first draws first even
        // though its leaf arrived later
        assert_eq!(queue.leaves_in_draw_order(), vec![1, 0]);
        assert_eq!(queue.bin_number(first), queue.bin_number(second));
    }

    #[test]
    fn test_state_sorted_groups_by_state() {
        let mut queue = RenderQueue::new();
        let root = queue.root_bin();
        let set = blend_set();

        // interleave insertions between two states; draw order groups them
        queue.push_set(&set);
        queue.add_leaf(root, drawable(), Mat4::identity(), 0.0); // leaf 0, blend
        queue.pop_set();
        queue.add_leaf(root, drawable(), Mat4::identity(), 0.0); // leaf 1, plain
        queue.push_set(&set);
        queue.add_leaf(root, drawable(), Mat4::identity(), 0.0); // leaf 2, blend
        queue.pop_set();
        queue.add_leaf(root, drawable(), Mat4::identity(), 0.0); // leaf 3, plain

        assert_eq!(queue.leaves_in_draw_order(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_find_or_insert_reuses_bin() {
        let mut queue = RenderQueue::new();
        let root = queue.root_bin();
        let a = queue.find_or_insert_bin(root, 3, BinOrder::StateSorted);
        let b = queue.find_or_insert_bin(root, 3, BinOrder::DepthSorted);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reset_empties_queue() {
        let mut queue = RenderQueue::new();
        queue.add_leaf(ROOT_BIN, drawable(), Mat4::identity(), 0.0);
        assert!(!queue.is_empty());
        queue.reset();
        assert!(queue.is_empty());
        assert!(queue.leaves_in_draw_order().is_empty());
    }
}
