//! MinHash sketches and Sequence Bloom Tree (SBT) indexing for genomic data.
//!
//! This crate computes bottom-k / scaled MinHash sketches from DNA or
//! protein k-mers, stores them as named [`signature::Signature`]s, and
//! indexes collections of signatures in a [`index::sbt`] Sequence Bloom
//! Tree for fast similarity and containment search. [`gather`]
//! implements the greedy containment decomposition of a metagenome
//! sketch against one or more indexes.
//!
//! File reading, CLI argument parsing, and plotting are explicitly out
//! of scope; callers supply sequence records through the
//! [`compute::SequenceSource`] collaborator trait.

#![allow(clippy::upper_case_acronyms)]

pub mod errors;
pub use errors::SketchError as Error;

pub mod hash;

pub mod sketch;

pub mod signature;

pub mod selection;

pub mod compute;

pub mod index;

pub mod gather;

/// Default seed used when no explicit seed is supplied to a sketch.
pub const DEFAULT_SEED: u64 = 42;

/// Largest representable hash value; scaled sketches retain every hash
/// strictly below `MAX_HASH / scaled`.
pub const MAX_HASH: u64 = u64::MAX;
