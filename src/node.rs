use crate::envelope::Envelope;

/// The five slot labels of a node, identifying a child's position relative
/// to the node-MBR centroid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quadrant {
    Nw,
    Ne,
    Sw,
    Se,
    Center,
}

impl Quadrant {
    pub const ALL: [Quadrant; 5] = [
        Quadrant::Nw,
        Quadrant::Ne,
        Quadrant::Sw,
        Quadrant::Se,
        Quadrant::Center,
    ];

    pub(crate) fn slot(self) -> usize {
        match self {
            Quadrant::Nw => 0,
            Quadrant::Ne => 1,
            Quadrant::Sw => 2,
            Quadrant::Se => 3,
            Quadrant::Center => 4,
        }
    }
}

/// A Center node holds entries whose centroids coincide with the centroid of
/// its own MBR; its slots are exempt from quadrant placement. Normal nodes
/// place every child in the quadrant its centroid selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Normal,
    Center,
}

/// A child record within a node slot: either a stored item or a subtree.
/// Both variants are arena ids; an entry's MBR is derived from the arena
/// (the item's immutable envelope, or the child node's current MBR), so it
/// can never drift out of step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Entry {
    Leaf(usize),
    Subtree(usize),
}

pub(crate) const NO_PARENT: usize = usize::MAX;

pub(crate) struct Node {
    pub parent: usize,
    pub kind: NodeKind,
    pub mbr: Envelope,
    pub slots: [Option<Entry>; 5],
}

impl Node {
    pub fn new(parent: usize) -> Node {
        Node {
            parent,
            kind: NodeKind::Normal,
            mbr: Envelope::point(0.0, 0.0),
            slots: [None; 5],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn entry_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn get(&self, quad: Quadrant) -> Option<Entry> {
        self.slots[quad.slot()]
    }

    pub fn put(&mut self, quad: Quadrant, entry: Entry) {
        self.slots[quad.slot()] = Some(entry);
    }

    pub fn take(&mut self, quad: Quadrant) -> Option<Entry> {
        self.slots[quad.slot()].take()
    }

    /// The single remaining entry, if the node holds exactly one.
    pub fn lone_entry(&self) -> Option<Entry> {
        let mut found = None;
        for slot in self.slots.iter().flatten() {
            if found.is_some() {
                return None;
            }
            found = Some(*slot);
        }
        found
    }
}
