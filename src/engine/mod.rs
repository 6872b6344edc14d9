//! Demand evaluation: frame modifiers, segment compression and the stack walk.
//!
//! A demand asks whether every active frame of the calling thread's stack
//! holds a capability, honoring per-frame overrides: a frame can *assert* a
//! capability on behalf of its callers, *deny* one it statically has, or
//! restrict itself to a *permit-only* subset. The engine evaluates demands
//! synchronously on the calling thread; the frames themselves come from an
//! external stack walker as an innermost-to-outermost sequence of
//! [`FrameDescriptor`]s.
//!
//! # Key Components
//!
//! - [`SecurityContext`] - Owns the token registry and exposes the demand
//!   entry points
//! - [`FrameSecurityState`] / [`FrameModifiers`] - Per-frame Assert / Deny /
//!   PermitOnly records with two-phase (imperative, declarative) evaluation
//! - [`SegmentTriple`] / [`TripleCompressor`] - Compression of contiguous
//!   frame runs into (Assert, Grant, Refused) triples
//! - [`CompressedStack`] - A captured stack answering demands in a number of
//!   steps bounded by segments, not frames
//! - [`walk`] helpers - The direct frame-by-frame evaluation path
//!
//! # Control Flow
//!
//! `demand` walks frames outward. At each frame the modifier state is
//! evaluated first (an assertion covering the remaining demand halts the walk
//! with success; a deny or permit-only violation fails it), then the frame's
//! assembly grant and refusal sets. A walk that completes without failing
//! succeeds. `capture` folds the same sequence into triples once, so repeated
//! demands or demands against a stored context replay the compressed form.
//!
//! # Concurrency
//!
//! The engine has no scheduler: a demand executes entirely on the calling
//! thread with no suspension point. Frame states and triple lists are local
//! to one thread's walk; only the token registry is shared.

mod context;
mod frame;
mod triple;
pub mod walk;

pub use context::SecurityContext;
pub use frame::{FrameModifiers, FrameSecurityState, WalkDecision};
pub use triple::{CompressedStack, SegmentTriple, TripleCompressor};
pub use walk::FrameDescriptor;

use crate::set::{CapabilitySet, Shortfall};

/// Renders the capability behind a shortfall for a denial's diagnostics.
pub(crate) fn render_shortfall(demanded: &CapabilitySet, shortfall: Shortfall) -> String {
    match shortfall {
        Shortfall::Unrestricted => "unrestricted capabilities".to_string(),
        Shortfall::Capability(token) => match demanded.get(token) {
            Some(capability) => capability.to_string(),
            None => demanded.registry().describe_index(token.index()),
        },
    }
}
