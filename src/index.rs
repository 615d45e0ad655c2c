use crate::{envelope::Envelope, error::TreeError};

/// Common surface of the spatial indexes in this crate.
///
/// `query` returns payloads whose envelopes intersect the region, in
/// unspecified order. `query_neighbors` returns up to `k` payloads ordered
/// by increasing Euclidean distance from the query point to their envelope
/// centroids.
pub trait SpatialIndex<T> {
    fn insert(&mut self, payload: T, envelope: Envelope) -> Result<(), TreeError>;
    fn query(&self, region: &Envelope) -> Vec<&T>;
    fn query_neighbors(&self, point: [f64; 2], k: usize) -> Result<Vec<&T>, TreeError>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
