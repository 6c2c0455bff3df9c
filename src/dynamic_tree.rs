//! Dynamic AABB Tree (Incremental BVH)
//!
//! A self-balancing binary tree of fat AABBs backing the broad phase. Leaves
//! hold fixture proxies; internal nodes hold unions of their children.
//!
//! # Features
//!
//! - **Incremental updates**: insert/destroy/move proxies without a rebuild
//! - **Fat AABBs**: margin plus predicted displacement so slow proxies do
//!   not churn the tree every step
//! - **Tree rotations**: AVL-style balancing keeps queries O(log n)
//! - **Moved flags**: the broad phase uses these to suppress duplicate
//!   pairs when both proxies of a pair are in the move buffer

use crate::math::{Aabb, RayCastInput, Vec2};
use crate::settings::{AABB_MARGIN, AABB_MULTIPLIER};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Null node sentinel
pub const NULL_NODE: u32 = u32::MAX;

/// A node in the dynamic AABB tree
#[derive(Clone, Debug)]
struct TreeNode {
    /// Fat AABB (enlarged for movement prediction)
    aabb: Aabb,
    /// Parent node index (NULL_NODE if root or free)
    parent: u32,
    /// Left child (NULL_NODE if leaf)
    left: u32,
    /// Right child (NULL_NODE if leaf)
    right: u32,
    /// 0 for leaf, -1 for free, else 1 + max(children)
    height: i32,
    /// Fixture proxy payload for leaves
    user_data: u32,
    /// Set by move_proxy, cleared by the broad phase after pair search
    moved: bool,
}

impl TreeNode {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }

    fn new_leaf(aabb: Aabb, user_data: u32) -> Self {
        Self {
            aabb,
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            height: 0,
            user_data,
            moved: false,
        }
    }

    fn new_internal() -> Self {
        Self {
            aabb: Aabb::new(Vec2::ZERO, Vec2::ZERO),
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            height: -1,
            user_data: NULL_NODE,
            moved: false,
        }
    }
}

/// Dynamic AABB tree for the incremental broad phase.
pub struct DynamicTree {
    /// Node pool
    nodes: Vec<TreeNode>,
    /// Free list (indices of unused nodes)
    free_list: Vec<u32>,
    /// Root node index
    root: u32,
    proxy_count: usize,
}

impl DynamicTree {
    /// Create a new empty tree
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            proxy_count: 0,
        }
    }

    /// Insert a tight AABB; returns the proxy (node) ID. The stored AABB is
    /// fattened by [`AABB_MARGIN`].
    pub fn create_proxy(&mut self, aabb: Aabb, user_data: u32) -> u32 {
        let fat = aabb.fattened(AABB_MARGIN);
        let node_id = self.alloc_node();
        self.nodes[node_id as usize] = TreeNode::new_leaf(fat, user_data);
        self.nodes[node_id as usize].moved = true;
        self.insert_leaf(node_id);
        self.proxy_count += 1;
        node_id
    }

    /// Remove a proxy by its ID.
    pub fn destroy_proxy(&mut self, proxy_id: u32) {
        debug_assert!((proxy_id as usize) < self.nodes.len());
        debug_assert!(self.nodes[proxy_id as usize].is_leaf());
        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
        self.proxy_count -= 1;
    }

    /// Update a proxy's AABB after motion. Returns true if the proxy was
    /// re-inserted (the tight AABB escaped the stored fat AABB).
    ///
    /// `displacement` is the motion over the step; a multiple of it is
    /// folded into the new fat AABB so a proxy moving steadily in one
    /// direction is not re-inserted every step.
    pub fn move_proxy(&mut self, proxy_id: u32, aabb: Aabb, displacement: Vec2) -> bool {
        debug_assert!(self.nodes[proxy_id as usize].is_leaf());

        let mut fat = aabb.fattened(AABB_MARGIN);
        let d = AABB_MULTIPLIER * displacement;
        if d.x < 0.0 {
            fat.lower.x += d.x;
        } else {
            fat.upper.x += d.x;
        }
        if d.y < 0.0 {
            fat.lower.y += d.y;
        } else {
            fat.upper.y += d.y;
        }

        let tree_aabb = self.nodes[proxy_id as usize].aabb;
        if tree_aabb.contains(&aabb) {
            // The tight AABB still fits. Only re-insert if the stored fat
            // AABB has grown stale (much larger than needed).
            let huge = fat.fattened(4.0 * AABB_MARGIN);
            if huge.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(proxy_id);
        self.nodes[proxy_id as usize].aabb = fat;
        self.insert_leaf(proxy_id);
        self.nodes[proxy_id as usize].moved = true;
        true
    }

    /// Get user data for a proxy
    #[inline]
    #[must_use]
    pub fn user_data(&self, proxy_id: u32) -> u32 {
        self.nodes[proxy_id as usize].user_data
    }

    /// Get the fat AABB for a proxy
    #[inline]
    #[must_use]
    pub fn fat_aabb(&self, proxy_id: u32) -> Aabb {
        self.nodes[proxy_id as usize].aabb
    }

    /// Whether the proxy has been re-inserted since the flag was cleared
    #[inline]
    #[must_use]
    pub fn was_moved(&self, proxy_id: u32) -> bool {
        self.nodes[proxy_id as usize].moved
    }

    #[inline]
    pub fn set_moved(&mut self, proxy_id: u32) {
        self.nodes[proxy_id as usize].moved = true;
    }

    #[inline]
    pub fn clear_moved(&mut self, proxy_id: u32) {
        self.nodes[proxy_id as usize].moved = false;
    }

    /// Query all proxies whose fat AABB overlaps `aabb`. The callback
    /// returns false to terminate early.
    pub fn query<F: FnMut(u32) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        if self.root == NULL_NODE {
            return;
        }

        let mut stack: Vec<u32> = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(node_id) {
                    return;
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Ray cast against the leaves. The callback receives the clipped input
    /// and a proxy ID, and returns a new maximum fraction: 0 terminates the
    /// cast, and any smaller value narrows the segment for later nodes.
    pub fn ray_cast<F: FnMut(&RayCastInput, u32) -> f32>(
        &self,
        input: &RayCastInput,
        mut callback: F,
    ) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize();
        // Perpendicular of the ray direction, used for the segment/AABB
        // separation test.
        let v = crate::math::cross_sv(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let mut segment_aabb = segment_bounds(p1, p1 + max_fraction * (p2 - p1));

        let mut stack: Vec<u32> = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            if !node.aabb.overlaps(&segment_aabb) {
                continue;
            }

            // Separating axis: |dot(v, p1 - c)| > dot(|v|, h)
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = crate::math::abs(v.dot(p1 - c)) - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, node_id);
                if value == 0.0 {
                    return;
                }
                if value > 0.0 {
                    max_fraction = value;
                    segment_aabb = segment_bounds(p1, p1 + max_fraction * (p2 - p1));
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Number of active proxies (leaf nodes)
    #[inline]
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Tree height
    #[must_use]
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    /// Check structural invariants. Test support; O(n) per call.
    pub fn validate(&self) -> bool {
        self.validate_node(self.root, NULL_NODE)
    }

    fn validate_node(&self, node_id: u32, expected_parent: u32) -> bool {
        if node_id == NULL_NODE {
            return true;
        }
        let node = &self.nodes[node_id as usize];
        if node.parent != expected_parent {
            return false;
        }
        if node.is_leaf() {
            return node.right == NULL_NODE && node.height == 0;
        }
        let left = &self.nodes[node.left as usize];
        let right = &self.nodes[node.right as usize];
        if node.height != 1 + left.height.max(right.height) {
            return false;
        }
        if !node.aabb.contains(&left.aabb) || !node.aabb.contains(&right.aabb) {
            return false;
        }
        self.validate_node(node.left, node_id) && self.validate_node(node.right, node_id)
    }

    // =========== Internal methods ===========

    fn alloc_node(&mut self) -> u32 {
        if let Some(id) = self.free_list.pop() {
            id
        } else {
            let id = self.nodes.len() as u32;
            self.nodes.push(TreeNode::new_internal());
            id
        }
    }

    fn free_node(&mut self, node_id: u32) {
        self.nodes[node_id as usize] = TreeNode::new_internal();
        self.free_list.push(node_id);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Find the best sibling by the surface area heuristic.
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut sibling = self.root;

        while !self.nodes[sibling as usize].is_leaf() {
            let left = self.nodes[sibling as usize].left;
            let right = self.nodes[sibling as usize].right;

            let area = self.nodes[sibling as usize].aabb.perimeter();
            let combined_area = leaf_aabb.union(&self.nodes[sibling as usize].aabb).perimeter();

            let cost = 2.0 * combined_area;
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost_left = self.child_insertion_cost(left, &leaf_aabb, inheritance_cost);
            let cost_right = self.child_insertion_cost(right, &leaf_aabb, inheritance_cost);

            if cost < cost_left && cost < cost_right {
                break;
            }

            sibling = if cost_left < cost_right { left } else { right };
        }

        // Splice a new parent above the sibling.
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.alloc_node();
        self.nodes[new_parent as usize] = TreeNode::new_internal();
        self.nodes[new_parent as usize].parent = old_parent;
        self.nodes[new_parent as usize].aabb =
            leaf_aabb.union(&self.nodes[sibling as usize].aabb);
        self.nodes[new_parent as usize].height = self.nodes[sibling as usize].height + 1;

        if old_parent != NULL_NODE {
            if self.nodes[old_parent as usize].left == sibling {
                self.nodes[old_parent as usize].left = new_parent;
            } else {
                self.nodes[old_parent as usize].right = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        self.nodes[new_parent as usize].left = sibling;
        self.nodes[new_parent as usize].right = leaf;
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        self.fix_upwards(new_parent);
    }

    fn child_insertion_cost(&self, child: u32, leaf_aabb: &Aabb, inheritance: f32) -> f32 {
        let combined = leaf_aabb.union(&self.nodes[child as usize].aabb);
        if self.nodes[child as usize].is_leaf() {
            combined.perimeter() + inheritance
        } else {
            let old_area = self.nodes[child as usize].aabb.perimeter();
            combined.perimeter() - old_area + inheritance
        }
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };

        if grand_parent != NULL_NODE {
            // Reconnect the sibling to the grandparent.
            if self.nodes[grand_parent as usize].left == parent {
                self.nodes[grand_parent as usize].left = sibling;
            } else {
                self.nodes[grand_parent as usize].right = sibling;
            }
            self.nodes[sibling as usize].parent = grand_parent;
            self.free_node(parent);
            self.fix_upwards(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    fn fix_upwards(&mut self, start: u32) {
        let mut node_id = start;
        while node_id != NULL_NODE {
            node_id = self.balance(node_id);

            let left = self.nodes[node_id as usize].left;
            let right = self.nodes[node_id as usize].right;
            debug_assert!(left != NULL_NODE && right != NULL_NODE);

            let lh = self.nodes[left as usize].height;
            let rh = self.nodes[right as usize].height;
            self.nodes[node_id as usize].height = 1 + lh.max(rh);
            self.nodes[node_id as usize].aabb = self.nodes[left as usize]
                .aabb
                .union(&self.nodes[right as usize].aabb);

            node_id = self.nodes[node_id as usize].parent;
        }
    }

    /// AVL-style tree rotation for balancing
    fn balance(&mut self, node_id: u32) -> u32 {
        if self.nodes[node_id as usize].is_leaf() || self.nodes[node_id as usize].height < 2 {
            return node_id;
        }

        let left = self.nodes[node_id as usize].left;
        let right = self.nodes[node_id as usize].right;

        let balance_factor =
            self.nodes[right as usize].height - self.nodes[left as usize].height;

        if balance_factor > 1 {
            self.rotate_up(node_id, right)
        } else if balance_factor < -1 {
            self.rotate_up(node_id, left)
        } else {
            node_id
        }
    }

    /// Promote `child` above `node_id`, pushing the shallower of the
    /// child's children down onto `node_id`.
    fn rotate_up(&mut self, node_id: u32, child: u32) -> u32 {
        let child_left = self.nodes[child as usize].left;
        let child_right = self.nodes[child as usize].right;
        let parent = self.nodes[node_id as usize].parent;

        self.nodes[child as usize].parent = parent;
        self.nodes[node_id as usize].parent = child;

        if parent != NULL_NODE {
            if self.nodes[parent as usize].left == node_id {
                self.nodes[parent as usize].left = child;
            } else {
                self.nodes[parent as usize].right = child;
            }
        } else {
            self.root = child;
        }

        // Keep the taller grandchild under `child`; the shorter one takes
        // the demoted node's freed slot.
        let (keep, push_down) =
            if self.nodes[child_left as usize].height > self.nodes[child_right as usize].height {
                (child_left, child_right)
            } else {
                (child_right, child_left)
            };

        self.nodes[child as usize].left = node_id;
        self.nodes[child as usize].right = keep;
        if self.nodes[node_id as usize].left == child {
            self.nodes[node_id as usize].left = push_down;
        } else {
            self.nodes[node_id as usize].right = push_down;
        }
        self.nodes[push_down as usize].parent = node_id;

        // Refresh the demoted node, then the promoted one.
        let nl = self.nodes[node_id as usize].left;
        let nr = self.nodes[node_id as usize].right;
        self.nodes[node_id as usize].aabb =
            self.nodes[nl as usize].aabb.union(&self.nodes[nr as usize].aabb);
        self.nodes[node_id as usize].height =
            1 + self.nodes[nl as usize].height.max(self.nodes[nr as usize].height);

        let cl = self.nodes[child as usize].left;
        let cr = self.nodes[child as usize].right;
        self.nodes[child as usize].aabb =
            self.nodes[cl as usize].aabb.union(&self.nodes[cr as usize].aabb);
        self.nodes[child as usize].height =
            1 + self.nodes[cl as usize].height.max(self.nodes[cr as usize].height);

        child
    }
}

impl Default for DynamicTree {
    fn default() -> Self {
        Self::new()
    }
}

fn segment_bounds(p1: Vec2, p2: Vec2) -> Aabb {
    Aabb::new(p1.min(p2), p1.max(p2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_aabb(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    fn query_all(tree: &DynamicTree, aabb: &Aabb) -> Vec<u32> {
        let mut out = Vec::new();
        tree.query(aabb, |proxy| {
            out.push(tree.user_data(proxy));
            true
        });
        out.sort_unstable();
        out
    }

    #[test]
    fn insert_and_query() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(unit_aabb(0.0, 0.0), 0);
        tree.create_proxy(unit_aabb(10.0, 10.0), 1);
        tree.create_proxy(unit_aabb(20.0, 20.0), 2);

        assert_eq!(tree.proxy_count(), 3);
        assert!(tree.validate());

        let near_origin = query_all(&tree, &unit_aabb(-0.5, -0.5));
        assert!(near_origin.contains(&0));
        assert!(!near_origin.contains(&2));

        let everything = query_all(
            &tree,
            &Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0)),
        );
        assert_eq!(everything, vec![0, 1, 2]);
    }

    #[test]
    fn remove_proxy() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(unit_aabb(0.0, 0.0), 0);
        let p1 = tree.create_proxy(unit_aabb(5.0, 5.0), 1);
        tree.create_proxy(unit_aabb(10.0, 10.0), 2);

        tree.destroy_proxy(p1);
        assert_eq!(tree.proxy_count(), 2);
        assert!(tree.validate());

        let everything = query_all(
            &tree,
            &Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0)),
        );
        assert_eq!(everything, vec![0, 2]);
    }

    #[test]
    fn small_move_stays_in_fat_aabb() {
        let mut tree = DynamicTree::new();
        let p0 = tree.create_proxy(unit_aabb(0.0, 0.0), 0);
        tree.clear_moved(p0);

        let nudged = Aabb::new(Vec2::new(0.02, 0.0), Vec2::new(1.02, 1.0));
        assert!(!tree.move_proxy(p0, nudged, Vec2::new(0.02, 0.0)));
        assert!(!tree.was_moved(p0));
    }

    #[test]
    fn large_move_reinserts_and_flags() {
        let mut tree = DynamicTree::new();
        let p0 = tree.create_proxy(unit_aabb(0.0, 0.0), 0);

        assert!(tree.move_proxy(p0, unit_aabb(50.0, 50.0), Vec2::new(50.0, 50.0)));
        assert!(tree.was_moved(p0));
        tree.clear_moved(p0);
        assert!(!tree.was_moved(p0));

        let hits = query_all(&tree, &unit_aabb(49.5, 49.5));
        assert_eq!(hits, vec![0]);
        assert!(tree.validate());
    }

    #[test]
    fn predictive_fattening_covers_displacement() {
        let mut tree = DynamicTree::new();
        let p0 = tree.create_proxy(unit_aabb(0.0, 0.0), 0);
        tree.move_proxy(p0, unit_aabb(10.0, 0.0), Vec2::new(1.0, 0.0));

        let fat = tree.fat_aabb(p0);
        // Motion prediction extends the fat AABB along +x.
        assert!(fat.upper.x >= 11.0 + AABB_MULTIPLIER * 1.0 - 1e-3);
        assert!(fat.lower.x <= 10.0);
    }

    #[test]
    fn stays_balanced_under_many_inserts() {
        let mut tree = DynamicTree::new();
        for i in 0..200 {
            tree.create_proxy(unit_aabb(3.0 * i as f32, 0.0), i as u32);
        }
        assert_eq!(tree.proxy_count(), 200);
        assert!(tree.validate());
        assert!(tree.height() < 20, "height={}", tree.height());
    }

    #[test]
    fn removal_keeps_tree_valid() {
        let mut tree = DynamicTree::new();
        let mut proxies = Vec::new();
        for i in 0..50 {
            proxies.push(tree.create_proxy(unit_aabb(2.0 * i as f32, 0.0), i as u32));
        }
        for &p in proxies.iter().step_by(2) {
            tree.destroy_proxy(p);
            assert!(tree.validate());
        }
        assert_eq!(tree.proxy_count(), 25);
    }

    #[test]
    fn ray_cast_finds_closest_first_by_clipping() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(unit_aabb(5.0, -0.5), 0);
        tree.create_proxy(unit_aabb(10.0, -0.5), 1);
        tree.create_proxy(unit_aabb(5.0, 10.0), 2);

        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(20.0, 0.0),
            max_fraction: 1.0,
        };
        let mut hits = Vec::new();
        tree.ray_cast(&input, |sub, proxy| {
            hits.push(tree.user_data(proxy));
            sub.max_fraction // continue, unclipped
        });
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1], "off-ray proxy must not be visited");
    }

    #[test]
    fn ray_cast_terminates_on_zero() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(unit_aabb(5.0, -0.5), 0);
        tree.create_proxy(unit_aabb(10.0, -0.5), 1);

        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(20.0, 0.0),
            max_fraction: 1.0,
        };
        let mut count = 0;
        tree.ray_cast(&input, |_, _| {
            count += 1;
            0.0
        });
        assert_eq!(count, 1);
    }

    /// Seeded generator so the differential test is deterministic.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u32 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) as u32
        }

        fn range(&mut self, lo: f32, hi: f32) -> f32 {
            lo + (hi - lo) * (self.next() as f32 / u32::MAX as f32)
        }
    }

    fn random_aabb(rng: &mut Lcg) -> Aabb {
        let x = rng.range(-40.0, 40.0);
        let y = rng.range(-40.0, 40.0);
        Aabb::new(
            Vec2::new(x, y),
            Vec2::new(x + rng.range(0.2, 4.0), y + rng.range(0.2, 4.0)),
        )
    }

    /// Differential check against a linear scan: after every batch of
    /// random create/move/destroy edits, each query must return exactly
    /// the live proxies whose fat AABB overlaps the probe.
    #[test]
    fn query_matches_brute_force_over_random_edits() {
        let mut rng = Lcg(0x2545F4914F6CDD1D);
        let mut tree = DynamicTree::new();
        let mut live: Vec<u32> = Vec::new();
        let mut next_data = 0u32;

        for _ in 0..25 {
            for _ in 0..12 {
                let roll = rng.next() % 4;
                if live.is_empty() || roll == 0 {
                    let id = tree.create_proxy(random_aabb(&mut rng), next_data);
                    next_data += 1;
                    live.push(id);
                } else if roll == 1 {
                    let i = rng.next() as usize % live.len();
                    tree.destroy_proxy(live.swap_remove(i));
                } else {
                    let i = rng.next() as usize % live.len();
                    let d = Vec2::new(rng.range(-2.0, 2.0), rng.range(-2.0, 2.0));
                    tree.move_proxy(live[i], random_aabb(&mut rng), d);
                }
            }
            assert!(tree.validate());
            assert_eq!(tree.proxy_count(), live.len());

            for _ in 0..8 {
                let probe = random_aabb(&mut rng).fattened(rng.range(0.0, 6.0));
                let mut from_tree = Vec::new();
                tree.query(&probe, |proxy| {
                    from_tree.push(proxy);
                    true
                });
                from_tree.sort_unstable();

                let mut scanned: Vec<u32> = live
                    .iter()
                    .copied()
                    .filter(|&p| tree.fat_aabb(p).overlaps(&probe))
                    .collect();
                scanned.sort_unstable();
                assert_eq!(from_tree, scanned);
            }
        }
    }
}
