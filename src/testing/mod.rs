//! Test doubles for the crate's filesystem seams.

mod counting_walker;

pub use counting_walker::{CountingWalker, FixedWalker};
