//! CLI command implementations.

pub mod add;
pub mod build;
pub mod collisions;
pub mod faces;
pub mod identify;
pub mod info;
pub mod scan;
