//! Repository layer: free functions over a borrowed `Connection`.

mod version;

pub use version::*;
