//! Capability type interning.
//!
//! Every capability type used with the engine is *interned*: mapped once to a
//! stable small-integer index plus a classification, packaged as a lightweight
//! [`CapToken`] value. Sparse capability sets are keyed by these indices, which
//! is what keeps the set algebra proportional to set footprint rather than to
//! the number of types the process has ever seen.
//!
//! # Key Components
//!
//! - [`TokenRegistry`] - Two-tier, thread-safe interning service
//! - [`CapToken`] - By-value token handle (index + classification)
//! - [`TokenClass`] - Normal / AllOrNothing / BuiltIn classification
//! - [`TokenDescriptor`] - Reverse-lookup record for diagnostics
//!
//! # Identity
//!
//! Capability type identity is the exact runtime type. Two types that merely
//! share a qualified name (for example across a trust boundary) are interned
//! separately and never treated as the same token.

mod interner;
mod token;

pub use interner::TokenRegistry;
pub use token::{CapToken, TokenClass, TokenDescriptor};
