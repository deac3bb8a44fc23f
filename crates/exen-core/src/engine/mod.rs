pub mod alchemy;
pub mod bias;
pub mod config;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod progress;
pub mod proposal;
pub mod switching;
