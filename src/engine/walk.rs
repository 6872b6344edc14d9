//! The direct, frame-by-frame demand evaluation path.
//!
//! These are the primitives [`crate::SecurityContext`] builds on: the
//! per-assembly demand check, the outward walk for single capabilities and
//! whole sets, and the capture that folds a frame sequence into a
//! [`CompressedStack`]. They are exposed so hosts that manage their own
//! registry sharing can drive walks without a context object.

use std::sync::Arc;

use crate::capability::Capability;
use crate::registry::{CapToken, TokenRegistry};
use crate::set::CapabilitySet;
use crate::{Error, Result};

use super::frame::{FrameSecurityState, WalkDecision};
use super::render_shortfall;
use super::triple::{CompressedStack, TripleCompressor};

/// One stack frame as supplied by the external stack walker.
///
/// The engine never inspects call-stack internals; the host enumerates frames
/// innermost to outermost and describes each one with its assembly grant set,
/// optional assembly refusal set, and the frame's modifier state if the frame
/// ever set one. All sets are owned copies - descriptors cross an ownership
/// boundary by construction.
#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    /// The frame's modifier state, if the frame ever called
    /// Assert/Deny/PermitOnly.
    pub state: Option<FrameSecurityState>,
    /// The granted capability set of the assembly the frame belongs to.
    pub grant: CapabilitySet,
    /// The refused capability set of the assembly, if any.
    pub refused: Option<CapabilitySet>,
}

impl FrameDescriptor {
    /// Describes a frame with only an assembly grant.
    #[must_use]
    pub fn new(grant: CapabilitySet) -> Self {
        FrameDescriptor {
            state: None,
            grant,
            refused: None,
        }
    }

    /// Attaches a copy of the frame's modifier state.
    #[must_use]
    pub fn with_state(mut self, state: &FrameSecurityState) -> Self {
        self.state = Some(state.clone());
        self
    }

    /// Attaches a copy of the assembly's refused set.
    #[must_use]
    pub fn with_refused(mut self, refused: &CapabilitySet) -> Self {
        self.refused = Some(refused.clone());
        self
    }
}

/// The per-frame demand primitive: is the capability in the assembly's grant
/// and not excluded by its refusal?
///
/// The frame-modifier overlay is applied by the walk, frame by frame; this
/// primitive only answers for one assembly's sets. Comparison failures count
/// as "not granted" (fail closed).
///
/// # Errors
/// [`Error::DemandDenied`] carrying the faulting capability and the sets in
/// effect.
pub fn check_demand(
    capability: &dyn Capability,
    token: CapToken,
    grant: &CapabilitySet,
    refused: Option<&CapabilitySet>,
) -> Result<()> {
    if !grant.satisfies_tolerant(capability, token) {
        return Err(Error::DemandDenied {
            demanded: capability.to_string(),
            granted: Some(grant.to_string()),
            refused: refused.map(ToString::to_string),
        });
    }
    if let Some(refused_set) = refused {
        if refused_set.denies(capability, token) {
            return Err(Error::DemandDenied {
                demanded: capability.to_string(),
                granted: Some(grant.to_string()),
                refused: Some(refused_set.to_string()),
            });
        }
    }
    Ok(())
}

/// Walks the supplied frames with a single-capability demand.
///
/// Each frame's modifier state is evaluated first (possibly halting the walk
/// with success), then the frame's assembly sets. A walk that completes
/// without failing succeeds.
///
/// # Errors
/// [`Error::DemandDenied`] from the faulting frame; resolution errors from
/// the registry.
pub fn demand_frames<I>(
    registry: &Arc<TokenRegistry>,
    capability: &dyn Capability,
    frames: I,
) -> Result<()>
where
    I: IntoIterator<Item = FrameDescriptor>,
{
    let token = registry.resolve(capability)?;

    for frame in frames {
        if let Some(state) = &frame.state {
            if let WalkDecision::Halt = state.check_demand(capability, token)? {
                return Ok(());
            }
        }
        check_demand(capability, token, &frame.grant, frame.refused.as_ref())?;
    }
    Ok(())
}

/// Walks the supplied frames with a whole demanded set.
///
/// A partial assertion at a frame shrinks the outstanding demand threaded to
/// the frames further out; capabilities already covered by an assertion are
/// never re-checked.
///
/// # Errors
/// [`Error::DemandDenied`] carrying the first faulting capability.
pub fn demand_set_frames<I>(demanded: &CapabilitySet, frames: I) -> Result<()>
where
    I: IntoIterator<Item = FrameDescriptor>,
{
    let mut outstanding = demanded.clone();
    if outstanding.is_empty() {
        return Ok(());
    }

    for frame in frames {
        if let Some(state) = &frame.state {
            if let WalkDecision::Halt = state.check_set_demand(&mut outstanding)? {
                return Ok(());
            }
        }

        if let Some(shortfall) = outstanding.check_demand_subset(&frame.grant) {
            return Err(Error::DemandDenied {
                demanded: render_shortfall(&outstanding, shortfall),
                granted: Some(frame.grant.to_string()),
                refused: frame.refused.as_ref().map(ToString::to_string),
            });
        }
        if let Some(refused) = &frame.refused {
            if let Some(shortfall) = outstanding.overlaps(refused) {
                return Err(Error::DemandDenied {
                    demanded: render_shortfall(&outstanding, shortfall),
                    granted: Some(frame.grant.to_string()),
                    refused: Some(refused.to_string()),
                });
            }
        }
    }
    Ok(())
}

/// Folds the supplied frames into a compressed triple list.
///
/// The capture applies the same per-frame order as the direct walk -
/// imperative modifiers, declarative modifiers, then the assembly sets - so
/// replaying the result answers every demand with the verdict the direct walk
/// would give.
#[must_use]
pub fn capture<I>(registry: &Arc<TokenRegistry>, frames: I) -> CompressedStack
where
    I: IntoIterator<Item = FrameDescriptor>,
{
    let mut compressor = TripleCompressor::new(registry);

    for frame in frames {
        if let Some(state) = &frame.state {
            for modifiers in [state.imperative(), state.declarative()] {
                if modifiers.assert_all() {
                    compressor.update_assert_all();
                }
                if let Some(asserted) = modifiers.assertions() {
                    compressor.update_assert(asserted);
                }
                if let Some(denied) = modifiers.denials() {
                    compressor.update_refused(denied);
                }
                if let Some(permitted) = modifiers.permit_only() {
                    compressor.update_grant(permitted);
                }
            }
        }

        compressor.update_grant(&frame.grant);
        if let Some(refused) = &frame.refused {
            compressor.update_refused(refused);
        }
    }

    compressor.finish()
}
