use crate::{
    envelope::Envelope,
    error::TreeError,
    index::SpatialIndex,
    node::{Entry, Node, NodeKind, Quadrant, NO_PARENT},
};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// Cap on worker-queue iterations for a single insertion. Reaching it means
/// the rebalancing cascade failed to settle, which is a structural bug, not
/// a caller error.
const MAX_REBALANCE_ITERATIONS: usize = 50_000;

struct Item<T> {
    payload: T,
    mbr: Envelope,
}

struct Task {
    node: usize,
    entry: Entry,
}

/// An MQR-Tree: a 2D spatial index whose nodes hold at most five entries,
/// one per quadrant slot (NW, NE, SW, SE, Center) relative to the node-MBR
/// centroid.
///
/// Inserting may move a node's centroid, dislodging children from their
/// recorded quadrants; the insertion engine requeues and replaces them until
/// the layout settles. The tree is not height-balanced. Not safe for
/// concurrent mutation; callers serialise access externally.
pub struct MqrTree<T> {
    items: Vec<Item<T>>,
    nodes: Vec<Node>,
    free_slots: Vec<usize>,
    root: usize,
}

/// Compute the slot an entry belongs to, comparing the entry centroid
/// against the node centroid. Comparison is exact: only arithmetically
/// coincident centroids route to Center, and axis ties resolve to the
/// east/north direction.
fn select_quadrant(entry_mbr: &Envelope, node_mbr: &Envelope) -> Quadrant {
    let [ex, ey] = entry_mbr.centroid();
    let [nx, ny] = node_mbr.centroid();
    if ex == nx && ey == ny {
        return Quadrant::Center;
    }
    if ex < nx {
        if ey < ny {
            Quadrant::Sw
        } else {
            Quadrant::Nw
        }
    } else if ey >= ny {
        Quadrant::Ne
    } else {
        Quadrant::Se
    }
}

impl<T> MqrTree<T> {
    #[must_use]
    pub fn new() -> MqrTree<T> {
        MqrTree {
            items: Vec::new(),
            nodes: Vec::new(),
            free_slots: Vec::new(),
            root: NO_PARENT,
        }
    }

    /// Number of stored payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The bounding rectangle of everything stored, or None when empty.
    #[must_use]
    pub fn mbr(&self) -> Option<Envelope> {
        (self.root != NO_PARENT).then(|| self.nodes[self.root].mbr)
    }

    /// Number of node levels on the longest root-to-leaf path.
    #[must_use]
    pub fn height(&self) -> usize {
        if self.root == NO_PARENT {
            return 0;
        }
        let mut max_depth = 1;
        let mut stack = vec![(self.root, 1)];
        while let Some((node, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            for entry in self.nodes[node].slots.iter().flatten() {
                if let Entry::Subtree(child) = entry {
                    stack.push((*child, depth + 1));
                }
            }
        }
        max_depth
    }

    /// Insert a payload under the given envelope. The envelope is copied on
    /// entry and treated as immutable from then on.
    ///
    /// # Errors
    ///
    /// `MalformedEnvelope` if the envelope has max < min on either axis (no
    /// mutation happens); `RebalanceOverflow` if the insertion cascade fails
    /// to settle, after which the tree must be discarded.
    pub fn insert(&mut self, payload: T, envelope: Envelope) -> Result<(), TreeError> {
        if envelope.is_malformed() {
            return Err(TreeError::MalformedEnvelope {
                min_x: envelope.min_x,
                max_x: envelope.max_x,
                min_y: envelope.min_y,
                max_y: envelope.max_y,
            });
        }
        let item_id = self.items.len();
        self.items.push(Item {
            payload,
            mbr: envelope,
        });
        if self.root == NO_PARENT {
            self.root = self.add_slot(NO_PARENT);
        }
        let mut tasks = VecDeque::new();
        tasks.push_back(Task {
            node: self.root,
            entry: Entry::Leaf(item_id),
        });
        self.drain_tasks(tasks)
    }

    /// Every payload whose envelope intersects `region`, in unspecified
    /// order.
    #[must_use]
    pub fn query(&self, region: &Envelope) -> Vec<&T> {
        let mut results = Vec::new();
        if self.root != NO_PARENT && self.nodes[self.root].mbr.intersects(region) {
            self.collect_intersecting(self.root, region, &mut results);
        }
        results
    }

    /// Up to `k` payloads whose envelope centroids are nearest to `point`,
    /// in ascending distance order. Ties at the k-th distance are broken
    /// arbitrarily.
    ///
    /// # Errors
    ///
    /// `InvalidNeighborCount` if `k` is zero.
    pub fn query_neighbors(&self, point: [f64; 2], k: usize) -> Result<Vec<&T>, TreeError> {
        if k == 0 {
            return Err(TreeError::InvalidNeighborCount);
        }
        if self.root == NO_PARENT {
            return Ok(Vec::new());
        }

        // Best-first search. The frontier is a min-heap over squared
        // distances: subtrees keyed by distance to their MBR (a lower bound
        // for every centroid inside), stored items keyed by distance to
        // their envelope centroid. `best` keeps the k closest items seen so
        // far as a max-heap, so its top is the current k-th distance.
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse((
            OrderedFloat(self.nodes[self.root].mbr.distance_sq(point)),
            Entry::Subtree(self.root),
        )));
        let mut best: BinaryHeap<(OrderedFloat<f64>, usize)> = BinaryHeap::new();

        while let Some(Reverse((dist_sq, entry))) = frontier.pop() {
            if best.len() == k {
                if let Some(&(kth, _)) = best.peek() {
                    if dist_sq >= kth {
                        break;
                    }
                }
            }
            match entry {
                Entry::Subtree(node) => {
                    for child in self.nodes[node].slots.iter().flatten() {
                        let key = match child {
                            Entry::Leaf(item) => {
                                self.items[*item].mbr.centroid_distance_sq(point)
                            }
                            Entry::Subtree(sub) => self.nodes[*sub].mbr.distance_sq(point),
                        };
                        frontier.push(Reverse((OrderedFloat(key), *child)));
                    }
                }
                Entry::Leaf(item) => {
                    if best.len() < k {
                        best.push((dist_sq, item));
                    } else if let Some(&(kth, _)) = best.peek() {
                        if dist_sq < kth {
                            best.pop();
                            best.push((dist_sq, item));
                        }
                    }
                }
            }
        }

        Ok(best
            .into_sorted_vec()
            .into_iter()
            .map(|(_, item)| &self.items[item].payload)
            .collect())
    }

    /// Read-only view of the root node, for structural inspection.
    #[must_use]
    pub fn root_view(&self) -> Option<NodeView<'_, T>> {
        (self.root != NO_PARENT).then(|| NodeView {
            tree: self,
            node: self.root,
        })
    }

    fn collect_intersecting<'a>(
        &'a self,
        node: usize,
        region: &Envelope,
        results: &mut Vec<&'a T>,
    ) {
        for entry in self.nodes[node].slots.iter().flatten() {
            match entry {
                Entry::Leaf(item) => {
                    if self.items[*item].mbr.intersects(region) {
                        results.push(&self.items[*item].payload);
                    }
                }
                Entry::Subtree(child) => {
                    if self.nodes[*child].mbr.intersects(region) {
                        self.collect_intersecting(*child, region, results);
                    }
                }
            }
        }
    }

    fn entry_mbr(&self, entry: Entry) -> Envelope {
        match entry {
            Entry::Leaf(item) => self.items[item].mbr,
            Entry::Subtree(node) => self.nodes[node].mbr,
        }
    }

    fn reparent(&mut self, entry: Entry, parent: usize) {
        if let Entry::Subtree(child) = entry {
            self.nodes[child].parent = parent;
        }
    }

    fn add_slot(&mut self, parent: usize) -> usize {
        if let Some(slot_id) = self.free_slots.pop() {
            self.nodes[slot_id] = Node::new(parent);
            slot_id
        } else {
            self.nodes.push(Node::new(parent));
            self.nodes.len() - 1
        }
    }

    fn drain_tasks(&mut self, mut tasks: VecDeque<Task>) -> Result<(), TreeError> {
        let mut collapses = Vec::new();
        let mut iterations = 0;
        while let Some(task) = tasks.pop_front() {
            iterations += 1;
            if iterations > MAX_REBALANCE_ITERATIONS {
                return Err(TreeError::RebalanceOverflow {
                    iterations: MAX_REBALANCE_ITERATIONS,
                });
            }
            self.insert_entry(task.node, task.entry, &mut tasks, &mut collapses);
        }
        // Hoists must wait for a settled tree: while tasks are pending, a
        // lone child's MBR can still lag behind its parent's.
        for node in collapses {
            self.collapse_lone_subtree(node);
        }
        Ok(())
    }

    /// Insert one entry into `node`: snapshot the MBR, expand it, queue the
    /// entry and every dislodged child, then drain the local queue.
    fn insert_entry(
        &mut self,
        node: usize,
        entry: Entry,
        tasks: &mut VecDeque<Task>,
        collapses: &mut Vec<usize>,
    ) {
        let entry_mbr = self.entry_mbr(entry);
        if self.nodes[node].is_empty() {
            // Single-entry sentinel: adopt the entry's MBR and hold it at
            // Center until a second insertion reclassifies the node.
            self.nodes[node].mbr = entry_mbr;
            self.nodes[node].kind = NodeKind::Center;
            self.nodes[node].put(Quadrant::Center, entry);
            self.reparent(entry, node);
            return;
        }

        let orig_mbr = self.nodes[node].mbr;
        self.nodes[node].mbr.expand_to_include(&entry_mbr);

        let mut queue = VecDeque::new();
        queue.push_back((
            select_quadrant(&entry_mbr, &self.nodes[node].mbr),
            entry,
        ));
        self.collect_shifted(node, &orig_mbr, &mut queue);
        self.place_queue(node, queue, tasks);

        if matches!(self.nodes[node].lone_entry(), Some(Entry::Subtree(_))) {
            collapses.push(node);
        }
    }

    /// Queue every child whose correct quadrant changed when the node MBR
    /// expanded from `orig_mbr`.
    fn collect_shifted(
        &mut self,
        node: usize,
        orig_mbr: &Envelope,
        queue: &mut VecDeque<(Quadrant, Entry)>,
    ) {
        // Exact comparison: an unmoved centroid cannot dislodge anything.
        if self.nodes[node].mbr.centroid() == orig_mbr.centroid() {
            return;
        }

        if self.nodes[node].kind == NodeKind::Center {
            // The entries were held together by centroid coincidence that
            // no longer holds; requeue all of them under the expanded MBR.
            for quad in Quadrant::ALL {
                if let Some(entry) = self.nodes[node].take(quad) {
                    let mbr = self.entry_mbr(entry);
                    queue.push_back((select_quadrant(&mbr, &self.nodes[node].mbr), entry));
                }
            }
            self.nodes[node].kind = NodeKind::Normal;
            return;
        }

        let mut center_shift = false;
        for quad in Quadrant::ALL {
            if let Some(entry) = self.nodes[node].get(quad) {
                let mbr = self.entry_mbr(entry);
                let correct = select_quadrant(&mbr, &self.nodes[node].mbr);
                if correct != quad {
                    self.nodes[node].take(quad);
                    queue.push_back((correct, entry));
                    if correct == Quadrant::Center {
                        center_shift = true;
                    }
                }
            }
        }
        if center_shift {
            self.nodes[node].kind = NodeKind::Center;
        }
    }

    /// Drain the local queue into the node's slots: promote to Center when
    /// required, write the Center slot through the chain rules, fill empty
    /// slots, push subtree recursions as tasks, and split on collision.
    fn place_queue(
        &mut self,
        node: usize,
        mut queue: VecDeque<(Quadrant, Entry)>,
        tasks: &mut VecDeque<Task>,
    ) {
        while let Some((quad, entry)) = queue.pop_front() {
            if quad == Quadrant::Center {
                if self.nodes[node].kind != NodeKind::Center {
                    self.nodes[node].kind = NodeKind::Center;
                }
                self.center_write(node, entry, tasks);
                continue;
            }
            match self.nodes[node].get(quad) {
                None => {
                    self.nodes[node].put(quad, entry);
                    self.reparent(entry, node);
                }
                Some(Entry::Subtree(child)) => {
                    tasks.push_back(Task { node: child, entry });
                }
                Some(Entry::Leaf(occupant)) => {
                    self.split_slot(node, quad, Entry::Leaf(occupant), entry);
                }
            }
        }
    }

    /// Write an entry routed to Center into a Center-typed node, chaining
    /// through a sub-node when the slot is already occupied.
    fn center_write(&mut self, node: usize, entry: Entry, tasks: &mut VecDeque<Task>) {
        match self.nodes[node].get(Quadrant::Center) {
            None => {
                self.nodes[node].put(Quadrant::Center, entry);
                self.reparent(entry, node);
            }
            Some(Entry::Subtree(chain)) => {
                tasks.push_back(Task { node: chain, entry });
            }
            Some(Entry::Leaf(occupant)) => {
                // Wrap the occupant together with the incoming entry in a
                // chained Center sub-node.
                let occupant_mbr = self.entry_mbr(Entry::Leaf(occupant));
                let entry_mbr = self.entry_mbr(entry);
                let chain = self.add_slot(node);
                self.nodes[chain].kind = NodeKind::Center;
                self.nodes[chain].mbr = occupant_mbr.expanded(&entry_mbr);
                self.nodes[chain].put(Quadrant::Nw, Entry::Leaf(occupant));
                self.nodes[chain].put(Quadrant::Ne, entry);
                self.reparent(entry, chain);
                self.nodes[node].put(Quadrant::Center, Entry::Subtree(chain));
            }
        }
    }

    /// Collision split: the slot holds a leaf and a second entry landed on
    /// it. Both entries move into a fresh child node, placed directly at the
    /// quadrants computed against the child's own MBR.
    fn split_slot(&mut self, node: usize, quad: Quadrant, occupant: Entry, incoming: Entry) {
        let occupant_mbr = self.entry_mbr(occupant);
        let incoming_mbr = self.entry_mbr(incoming);
        let child = self.add_slot(node);
        let child_mbr = occupant_mbr.expanded(&incoming_mbr);
        self.nodes[child].mbr = child_mbr;

        let occupant_quad = select_quadrant(&occupant_mbr, &child_mbr);
        let incoming_quad = select_quadrant(&incoming_mbr, &child_mbr);
        if occupant_quad == incoming_quad {
            // Coincident centroids, or a tie on the fresh child's centroid
            // lines. Either way the pair cannot separate by quadrant, so
            // the child starts as a Center chain.
            self.nodes[child].kind = NodeKind::Center;
            self.nodes[child].put(Quadrant::Nw, occupant);
            self.nodes[child].put(Quadrant::Ne, incoming);
        } else {
            self.nodes[child].put(occupant_quad, occupant);
            self.nodes[child].put(incoming_quad, incoming);
        }
        self.reparent(occupant, child);
        self.reparent(incoming, child);
        self.nodes[node].put(quad, Entry::Subtree(child));
    }

    /// A drain can funnel everything a node held into a single subtree. Such
    /// a node absorbs its lone child: their MBRs are equal at this point, so
    /// the child's slot layout and kind transfer verbatim.
    fn collapse_lone_subtree(&mut self, node: usize) {
        while let Some(Entry::Subtree(child)) = self.nodes[node].lone_entry() {
            let kind = self.nodes[child].kind;
            let slots = std::mem::replace(&mut self.nodes[child].slots, [None; 5]);
            self.nodes[node].kind = kind;
            self.nodes[node].slots = slots;
            for quad in Quadrant::ALL {
                if let Some(entry) = self.nodes[node].get(quad) {
                    self.reparent(entry, node);
                }
            }
            self.free_slots.push(child);
        }
    }
}

impl<T> Default for MqrTree<T> {
    fn default() -> Self {
        MqrTree::new()
    }
}

impl<T> SpatialIndex<T> for MqrTree<T> {
    fn insert(&mut self, payload: T, envelope: Envelope) -> Result<(), TreeError> {
        MqrTree::insert(self, payload, envelope)
    }

    fn query(&self, region: &Envelope) -> Vec<&T> {
        MqrTree::query(self, region)
    }

    fn query_neighbors(&self, point: [f64; 2], k: usize) -> Result<Vec<&T>, TreeError> {
        MqrTree::query_neighbors(self, point, k)
    }

    fn len(&self) -> usize {
        MqrTree::len(self)
    }
}

/// Read-only cursor over a node, used to inspect the tree's structure.
pub struct NodeView<'a, T> {
    tree: &'a MqrTree<T>,
    node: usize,
}

impl<T> Clone for NodeView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeView<'_, T> {}

/// A slot's content as seen through a [`NodeView`].
pub enum EntryView<'a, T> {
    Leaf { payload: &'a T, mbr: Envelope },
    Subtree(NodeView<'a, T>),
}

impl<'a, T> NodeView<'a, T> {
    #[must_use]
    pub fn mbr(&self) -> Envelope {
        self.tree.nodes[self.node].mbr
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.tree.nodes[self.node].kind
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.tree.nodes[self.node].entry_count()
    }

    /// The parent node, or None at the root. Parent links are non-owning
    /// back-references maintained for upward traversal.
    #[must_use]
    pub fn parent(&self) -> Option<NodeView<'a, T>> {
        let parent = self.tree.nodes[self.node].parent;
        (parent != NO_PARENT).then(|| NodeView {
            tree: self.tree,
            node: parent,
        })
    }

    #[must_use]
    pub fn slot(&self, quad: Quadrant) -> Option<EntryView<'a, T>> {
        self.tree.nodes[self.node].get(quad).map(|entry| match entry {
            Entry::Leaf(item) => EntryView::Leaf {
                payload: &self.tree.items[item].payload,
                mbr: self.tree.items[item].mbr,
            },
            Entry::Subtree(child) => EntryView::Subtree(NodeView {
                tree: self.tree,
                node: child,
            }),
        })
    }
}

impl<T> EntryView<'_, T> {
    #[must_use]
    pub fn mbr(&self) -> Envelope {
        match self {
            EntryView::Leaf { mbr, .. } => *mbr,
            EntryView::Subtree(node) => node.mbr(),
        }
    }
}
