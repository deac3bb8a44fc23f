//! High-level sampling workflows assembled from the engine collaborators.

pub mod sample;
