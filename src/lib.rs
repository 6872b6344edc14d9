#![doc(html_no_source)]
#![deny(missing_docs)]

//! # caswalk
//!
//! A stack-walk based code-access-security evaluation engine, built in pure Rust.
//! `caswalk` lets code declare fine-grained capabilities, grant subsets of them to
//! call-stack frames, and verify - at the moment a sensitive operation is attempted -
//! that every active frame on the call stack possesses the required capability,
//! honoring per-frame overrides (Assert, Deny, PermitOnly).
//!
//! ## Features
//!
//! - **Interned capability tokens** - Capability types map to stable small-integer
//!   indices through a two-tier, read-mostly-optimized registry
//! - **Sparse set algebra** - Union, intersection, subset and emptiness over
//!   token-indexed sets, proportional to set footprint rather than registry size
//! - **Per-frame overrides** - Assert / Deny / PermitOnly with imperative and
//!   declarative records and two-phase evaluation
//! - **Segment compression** - Contiguous frame runs fold into (Assert, Grant,
//!   Refused) triples so a captured stack answers demands in bounded steps
//! - **No hidden globals** - All state hangs off an explicit [`SecurityContext`]
//!
//! ## Quick Start
//!
//! ```rust
//! use caswalk::capability::SecurityCapability;
//! use caswalk::{FrameDescriptor, FrameSecurityState, SecurityContext};
//! use std::sync::Arc;
//!
//! let ctx = SecurityContext::new();
//!
//! // The policy subsystem computed these per-assembly sets
//! let mut trusted = ctx.empty_set();
//! trusted.add_capability(Arc::new(SecurityCapability::execution()))?;
//! let untrusted = ctx.empty_set();
//!
//! // An inner trusted frame asserts execution on behalf of its callers
//! let mut state = FrameSecurityState::new();
//! state.set_assert(&trusted);
//!
//! let frames = vec![
//!     FrameDescriptor::new(trusted.clone()).with_state(&state),
//!     FrameDescriptor::new(untrusted),
//! ];
//!
//! // The demand succeeds even though the outer frame holds nothing:
//! // the assertion shields it.
//! ctx.demand(&SecurityCapability::execution(), frames)?;
//! # Ok::<(), caswalk::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `caswalk` is organized into several key modules:
//!
//! - [`capability`] - The abstract capability contract and the built-in types
//! - [`registry`] - Interning of capability types into stable tokens
//! - [`set`] - The sparse capability-set algebra everything else builds on
//! - [`engine`] - Frame modifiers, triple compression and the demand walk
//! - [`Error`] and [`Result`] - Comprehensive error handling
//!
//! The stack itself is external: the host supplies an ordered,
//! innermost-to-outermost iterator of [`FrameDescriptor`]s, and the policy
//! subsystem supplies each assembly's grant and refusal sets. `caswalk` is the
//! evaluation engine in between.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). A failed demand is the
//! *expected* failure shape and carries the faulting capability plus the sets
//! in effect; anything that would let a demand silently succeed is treated as
//! fail-closed instead.

#[macro_use]
pub(crate) mod error;

pub mod capability;
pub mod engine;
pub mod prelude;
pub mod registry;
pub mod set;

/// `caswalk` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all caswalk operations.
///
/// See [`error`](Error) variants for the failure taxonomy: demand denials,
/// incompatible capability comparisons, interning failures and internal
/// consistency violations.
pub use error::Error;

/// The top-level security context owning the token registry.
///
/// Create one per process or host and share it; see
/// [`engine::SecurityContext`].
pub use engine::SecurityContext;

/// Per-frame modifier state and the walk decision type.
pub use engine::{FrameDescriptor, FrameSecurityState, WalkDecision};

/// Captured stacks and the segment compressor.
pub use engine::{CompressedStack, SegmentTriple, TripleCompressor};

/// The sparse capability-set collection type.
pub use set::CapabilitySet;

/// Capability type interning service and its token handles.
pub use registry::{CapToken, TokenClass, TokenRegistry};
