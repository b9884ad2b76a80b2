pub mod minhash;
pub mod nodegraph;

pub use minhash::MinHash;
pub use nodegraph::{BitSketch, Nodegraph, NodegraphFactory};
