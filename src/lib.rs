//! An in-memory MQR-Tree: a two-dimensional spatial index for axis-aligned
//! bounding boxes with user-supplied payloads.
//!
//! Every node, leaf or internal, has exactly five quadrant slots (NW, NE,
//! SW, SE, Center) filled according to the position of each child's centroid
//! relative to the node-MBR centroid. The layout yields zero sibling-MBR
//! overlap for point data, at the cost of insertion-time rebalancing: when
//! an insertion expands a node's MBR, children whose quadrant is no longer
//! correct are removed and reinserted.
//!
//! ```
//! use mqrtree::{Envelope, MqrTree};
//!
//! let mut tree = MqrTree::new();
//! tree.insert("station", Envelope::new(0.0, 10.0, 0.0, 10.0)).unwrap();
//! tree.insert("depot", Envelope::point(40.0, 40.0)).unwrap();
//!
//! let hits = tree.query(&Envelope::new(5.0, 15.0, 5.0, 15.0));
//! assert_eq!(hits, vec![&"station"]);
//!
//! let nearest = tree.query_neighbors([39.0, 39.0], 1).unwrap();
//! assert_eq!(nearest, vec![&"depot"]);
//! ```

mod envelope;
mod error;
mod index;
#[allow(clippy::module_name_repetitions)]
mod linear;
mod morton;
mod node;
mod tree;

pub use envelope::Envelope;
pub use error::TreeError;
pub use index::SpatialIndex;
pub use linear::LinearIndex;
pub use morton::MortonOrder;
pub use node::{NodeKind, Quadrant};
pub use tree::{EntryView, MqrTree, NodeView};
