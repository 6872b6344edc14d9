//! Sparse, token-indexed capability sets and their algebra.
//!
//! [`CapabilitySet`] is the collection type everything else in the engine is
//! built on: assembly grant sets, refusal sets, frame modifier sets and the
//! compressed stack-segment triples are all capability sets. The algebra
//! (union, intersection, subset, emptiness) operates entry-wise over interned
//! token indices and is proportional to the sets' own footprints, never to the
//! size of the token registry.
//!
//! # Key Components
//!
//! - [`CapabilitySet`] - The sparse collection plus its unrestricted flag
//! - [`Shortfall`] - What a failed containment check was missing
//!
//! # Unrestricted Sets
//!
//! A set whose unrestricted flag is raised represents "all capabilities,
//! maximal" for every type classified as unrestricted-capable, without
//! enumerating them. Explicit entries inside an unrestricted set are
//! permitted only to *narrow* the implicit maximum, which is how declarative
//! overrides are represented. Types classified Normal are never covered
//! implicitly and must always appear as explicit entries.

mod capabilityset;

pub use capabilityset::{CapabilitySet, Shortfall};
