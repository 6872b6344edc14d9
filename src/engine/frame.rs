use crate::capability::Capability;
use crate::registry::CapToken;
use crate::set::CapabilitySet;
use crate::{Error, Result};

use super::render_shortfall;

/// The verdict a frame (or stack segment) gives a demand passing through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDecision {
    /// The demand was not settled here; the walk proceeds outward.
    Continue,
    /// An assertion fully covered the remaining demand; the walk stops with
    /// success.
    Halt,
}

/// One frame's modifier sub-states: Assert, Deny, PermitOnly and the
/// assert-all escape hatch.
///
/// All four are independently settable and revertable; setting replaces (a
/// later Deny does not union with an earlier one). Sets are copied on the way
/// in, preserving the copy-on-boundary contract of [`CapabilitySet`].
#[derive(Debug, Clone, Default)]
pub struct FrameModifiers {
    assertions: Option<CapabilitySet>,
    denials: Option<CapabilitySet>,
    permit_only: Option<CapabilitySet>,
    assert_all: bool,
}

impl FrameModifiers {
    /// The asserted set, if any.
    #[must_use]
    pub fn assertions(&self) -> Option<&CapabilitySet> {
        self.assertions.as_ref()
    }

    /// The denied set, if any.
    #[must_use]
    pub fn denials(&self) -> Option<&CapabilitySet> {
        self.denials.as_ref()
    }

    /// The PermitOnly set, if any.
    #[must_use]
    pub fn permit_only(&self) -> Option<&CapabilitySet> {
        self.permit_only.as_ref()
    }

    /// Whether the all-capabilities assertion is raised.
    #[must_use]
    pub fn assert_all(&self) -> bool {
        self.assert_all
    }

    /// Whether any sub-state is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.assert_all
            || self.assertions.is_some()
            || self.denials.is_some()
            || self.permit_only.is_some()
    }

    fn set_assert(&mut self, asserted: &CapabilitySet) {
        self.assertions = Some(asserted.clone());
    }

    fn set_deny(&mut self, denied: &CapabilitySet) {
        self.denials = Some(denied.clone());
    }

    fn set_permit_only(&mut self, permitted: &CapabilitySet) {
        self.permit_only = Some(permitted.clone());
    }

    /// Evaluates one phase of a single-capability demand.
    fn check_demand(&self, capability: &dyn Capability, token: CapToken) -> Result<WalkDecision> {
        if self.assert_all && token.covered_by_unrestricted() {
            return Ok(WalkDecision::Halt);
        }
        if let Some(asserted) = &self.assertions {
            if asserted.satisfies_tolerant(capability, token) {
                return Ok(WalkDecision::Halt);
            }
        }
        if let Some(denied) = &self.denials {
            if denied.denies(capability, token) {
                return Err(Error::DemandDenied {
                    demanded: capability.to_string(),
                    granted: None,
                    refused: Some(denied.to_string()),
                });
            }
        }
        if let Some(permitted) = &self.permit_only {
            if !permitted.satisfies_tolerant(capability, token) {
                return Err(Error::DemandDenied {
                    demanded: capability.to_string(),
                    granted: Some(permitted.to_string()),
                    refused: None,
                });
            }
        }
        Ok(WalkDecision::Continue)
    }

    /// Evaluates one phase of a set demand, shrinking `outstanding` in place.
    fn check_set_demand(&self, outstanding: &mut CapabilitySet) -> Result<WalkDecision> {
        if self.assert_all {
            let all = CapabilitySet::unrestricted(outstanding.registry());
            if outstanding.remove_covered_by(&all) {
                return Ok(WalkDecision::Halt);
            }
        }
        if let Some(asserted) = &self.assertions {
            if outstanding.remove_covered_by(asserted) {
                return Ok(WalkDecision::Halt);
            }
        }
        if let Some(denied) = &self.denials {
            if let Some(shortfall) = outstanding.overlaps(denied) {
                return Err(Error::DemandDenied {
                    demanded: render_shortfall(outstanding, shortfall),
                    granted: None,
                    refused: Some(denied.to_string()),
                });
            }
        }
        if let Some(permitted) = &self.permit_only {
            if let Some(shortfall) = outstanding.check_permit_only(permitted) {
                return Err(Error::DemandDenied {
                    demanded: render_shortfall(outstanding, shortfall),
                    granted: Some(permitted.to_string()),
                    refused: None,
                });
            }
        }
        Ok(WalkDecision::Continue)
    }
}

/// Per-frame security state: the imperative and declarative modifier records
/// of one active stack frame.
///
/// Created lazily by the host on a frame's first Assert/Deny/PermitOnly and
/// dropped (or reset) when the frame exits. The engine treats the identity of
/// "the calling frame" as opaque; the host's stack walker associates states
/// with frames and hands them to the walk as part of each frame descriptor.
///
/// # Two-Phase Evaluation
///
/// A demand reaching a frame evaluates the *imperative* record first and the
/// *declarative* (attribute-derived) record second, because statement-level
/// overrides take precedence over compile-time declarations. If the imperative
/// phase halts the walk, the declarative phase is skipped entirely for that
/// frame.
///
/// # Assert-All
///
/// [`FrameSecurityState::set_assert_all`] is a distinct escape hatch
/// independent of the explicit assert set. It is equivalent to asserting the
/// unrestricted set: capability types classified Normal are not covered by it.
///
/// # Examples
///
/// ```rust
/// use caswalk::capability::SecurityCapability;
/// use caswalk::{FrameSecurityState, SecurityContext, WalkDecision};
/// use std::sync::Arc;
///
/// let ctx = SecurityContext::new();
/// let mut asserted = ctx.empty_set();
/// asserted.add_capability(Arc::new(SecurityCapability::execution()))?;
///
/// let mut state = FrameSecurityState::new();
/// state.set_assert(&asserted);
///
/// let cap = SecurityCapability::execution();
/// let token = ctx.registry().resolve(&cap)?;
/// assert_eq!(state.check_demand(&cap, token)?, WalkDecision::Halt);
///
/// state.revert_assert();
/// assert_eq!(state.check_demand(&cap, token)?, WalkDecision::Continue);
/// # Ok::<(), caswalk::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameSecurityState {
    imperative: FrameModifiers,
    declarative: FrameModifiers,
}

impl FrameSecurityState {
    /// Creates a state with no active modifiers.
    #[must_use]
    pub fn new() -> Self {
        FrameSecurityState::default()
    }

    /// The imperative (statement-level) modifier record.
    #[must_use]
    pub fn imperative(&self) -> &FrameModifiers {
        &self.imperative
    }

    /// The declarative (attribute-derived) modifier record.
    #[must_use]
    pub fn declarative(&self) -> &FrameModifiers {
        &self.declarative
    }

    /// Whether any modifier is active on this frame.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.imperative.is_active() || self.declarative.is_active()
    }

    /// Replaces the imperative assert set.
    pub fn set_assert(&mut self, asserted: &CapabilitySet) {
        self.imperative.set_assert(asserted);
    }

    /// Clears the imperative assert set.
    pub fn revert_assert(&mut self) {
        self.imperative.assertions = None;
    }

    /// Raises the imperative all-capabilities assertion.
    pub fn set_assert_all(&mut self) {
        self.imperative.assert_all = true;
    }

    /// Lowers the imperative all-capabilities assertion.
    pub fn revert_assert_all(&mut self) {
        self.imperative.assert_all = false;
    }

    /// Replaces the imperative deny set; last write wins.
    pub fn set_deny(&mut self, denied: &CapabilitySet) {
        self.imperative.set_deny(denied);
    }

    /// Clears the imperative deny set.
    pub fn revert_deny(&mut self) {
        self.imperative.denials = None;
    }

    /// Replaces the imperative PermitOnly set; last write wins.
    pub fn set_permit_only(&mut self, permitted: &CapabilitySet) {
        self.imperative.set_permit_only(permitted);
    }

    /// Clears the imperative PermitOnly set.
    pub fn revert_permit_only(&mut self) {
        self.imperative.permit_only = None;
    }

    /// Clears every imperative modifier at once.
    pub fn revert_all(&mut self) {
        self.imperative = FrameModifiers::default();
    }

    /// Replaces the declarative assert set.
    pub fn declare_assert(&mut self, asserted: &CapabilitySet) {
        self.declarative.set_assert(asserted);
    }

    /// Raises the declarative all-capabilities assertion.
    pub fn declare_assert_all(&mut self) {
        self.declarative.assert_all = true;
    }

    /// Replaces the declarative deny set.
    pub fn declare_deny(&mut self, denied: &CapabilitySet) {
        self.declarative.set_deny(denied);
    }

    /// Replaces the declarative PermitOnly set.
    pub fn declare_permit_only(&mut self, permitted: &CapabilitySet) {
        self.declarative.set_permit_only(permitted);
    }

    /// Evaluates a single-capability demand against this frame.
    ///
    /// Imperative state first, declarative second; an imperative halt skips
    /// the declarative phase.
    ///
    /// # Errors
    /// [`Error::DemandDenied`] the moment a Deny set fails to exclude the
    /// demand or a PermitOnly set fails to contain it.
    pub fn check_demand(&self, capability: &dyn Capability, token: CapToken) -> Result<WalkDecision> {
        for modifiers in [&self.imperative, &self.declarative] {
            if let WalkDecision::Halt = modifiers.check_demand(capability, token)? {
                return Ok(WalkDecision::Halt);
            }
        }
        Ok(WalkDecision::Continue)
    }

    /// Evaluates a set demand against this frame, shrinking `outstanding` in
    /// place.
    ///
    /// A partial assertion removes the covered entries so they are not
    /// re-checked against frames further out; [`WalkDecision::Halt`] is
    /// returned only when nothing outstanding remains.
    ///
    /// # Errors
    /// [`Error::DemandDenied`] carrying the faulting capability the moment a
    /// Deny or PermitOnly set rejects the outstanding demand.
    pub fn check_set_demand(&self, outstanding: &mut CapabilitySet) -> Result<WalkDecision> {
        for modifiers in [&self.imperative, &self.declarative] {
            if let WalkDecision::Halt = modifiers.check_set_demand(outstanding)? {
                return Ok(WalkDecision::Halt);
            }
        }
        Ok(WalkDecision::Continue)
    }
}
