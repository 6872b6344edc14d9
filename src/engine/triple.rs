//! Stack-segment triples and the compression state machine.
//!
//! A naive demand walk needs one modifier record per stack frame, making every
//! demand O(stack depth). The compressor instead folds contiguous runs of
//! frames into [`SegmentTriple`]s - a compressed (Assert, Grant, Refused)
//! accumulator - and only starts a new segment when a frame introduces an
//! assertion that cannot merge cleanly into the current one. Replaying the
//! ordered triple list reproduces exactly the same verdict as replaying the
//! original per-frame records, in a number of steps bounded by the number of
//! segments rather than the number of frames.
//!
//! # The Assert Merge
//!
//! [`TripleCompressor::update_assert`] is the failure-prone heart of the
//! design. For a new assert set it:
//!
//! 1. No-ops when the set is already implied by the segment's current assert
//! 2. Intersects the candidate with the accumulated grant - code cannot
//!    assert more than it was granted by the frames a demand must already
//!    have passed (with no grant folded yet the segment is unconstrained and
//!    the candidate is adopted wholesale)
//! 3. Subtracts claims already excluded by the segment's refused set; a
//!    partial overlap with a refusal cannot be subtracted cleanly
//! 4. Checks the candidate against the published assert for intersecting,
//!    incomparable per-type claims - merging those by union would let a
//!    replay cover demands neither original assertion covered
//! 5. On a clean merge, unions the candidate in place; otherwise the current
//!    segment is closed and appended, and a fresh segment is opened seeded
//!    with the closed segment's grant and the candidate as its assert
//!
//! # Refusals After Assertions
//!
//! A refusal arriving while the current segment's assert is unrestricted
//! would violate the invariant that an unrestricted assertion coexists with
//! no refusal; the compressor closes the segment first so the refusal lands
//! in the next one. Replay order keeps both behaviors exact: demands covered
//! by the assertion halt before ever seeing the refusal, demands not covered
//! (types classified Normal) walk on and meet it.

use std::sync::Arc;

use crate::capability::Capability;
use crate::registry::{CapToken, TokenRegistry};
use crate::set::CapabilitySet;
use crate::{Error, Result};

use super::frame::WalkDecision;
use super::render_shortfall;

/// A compressed (Assert, Grant, Refused) record summarizing the net effect of
/// a contiguous run of stack frames.
///
/// Invariant: a triple whose assert set is unrestricted holds no refused set.
/// The compressor never produces such a triple; replaying one is an
/// internal-state error that fails closed.
#[derive(Debug, Clone, Default)]
pub struct SegmentTriple {
    assert: Option<CapabilitySet>,
    grant: Option<CapabilitySet>,
    refused: Option<CapabilitySet>,
}

impl SegmentTriple {
    /// The segment's accumulated assert set, if any.
    #[must_use]
    pub fn assert(&self) -> Option<&CapabilitySet> {
        self.assert.as_ref()
    }

    /// The segment's accumulated grant set; `None` means unconstrained.
    #[must_use]
    pub fn grant(&self) -> Option<&CapabilitySet> {
        self.grant.as_ref()
    }

    /// The segment's accumulated refused set, if any.
    #[must_use]
    pub fn refused(&self) -> Option<&CapabilitySet> {
        self.refused.as_ref()
    }

    /// Whether no state has been folded into this triple yet.
    #[must_use]
    pub fn is_vacant(&self) -> bool {
        self.assert.is_none() && self.grant.is_none() && self.refused.is_none()
    }

    fn validate(&self) -> Result<()> {
        let unrestricted_assert = self
            .assert
            .as_ref()
            .is_some_and(CapabilitySet::is_unrestricted);
        let has_refusal = self.refused.as_ref().is_some_and(|r| !r.is_empty());
        if unrestricted_assert && has_refusal {
            debug_assert!(
                false,
                "unrestricted assertion coexists with a non-empty refusal"
            );
            return Err(invalid_state_error!(
                "unrestricted assertion coexists with a non-empty refusal"
            ));
        }
        Ok(())
    }

    /// Evaluates a single-capability demand against this segment.
    ///
    /// Order matters: the assert is consulted first (the asserting frame
    /// shields everything outward, and its own coverage was already limited
    /// to the grants of the frames inside the segment), then the refusal,
    /// then the grant.
    ///
    /// # Errors
    /// [`Error::DemandDenied`] when the refusal excludes or the grant lacks
    /// the demand; [`Error::InvalidState`] when the triple invariant is
    /// broken.
    pub fn check_demand(&self, capability: &dyn Capability, token: CapToken) -> Result<WalkDecision> {
        self.validate()?;

        if let Some(asserted) = &self.assert {
            if asserted.satisfies_tolerant(capability, token) {
                return Ok(WalkDecision::Halt);
            }
        }
        if let Some(refused) = &self.refused {
            if refused.denies(capability, token) {
                return Err(Error::DemandDenied {
                    demanded: capability.to_string(),
                    granted: self.grant.as_ref().map(ToString::to_string),
                    refused: Some(refused.to_string()),
                });
            }
        }
        if let Some(grant) = &self.grant {
            if !grant.satisfies_tolerant(capability, token) {
                return Err(Error::DemandDenied {
                    demanded: capability.to_string(),
                    granted: Some(grant.to_string()),
                    refused: self.refused.as_ref().map(ToString::to_string),
                });
            }
        }
        Ok(WalkDecision::Continue)
    }

    /// Evaluates a set demand against this segment, shrinking `outstanding`.
    ///
    /// # Errors
    /// Same as [`SegmentTriple::check_demand`].
    pub fn check_set_demand(&self, outstanding: &mut CapabilitySet) -> Result<WalkDecision> {
        self.validate()?;

        if let Some(asserted) = &self.assert {
            if outstanding.remove_covered_by(asserted) {
                return Ok(WalkDecision::Halt);
            }
        }
        if let Some(refused) = &self.refused {
            if let Some(shortfall) = outstanding.overlaps(refused) {
                return Err(Error::DemandDenied {
                    demanded: render_shortfall(outstanding, shortfall),
                    granted: self.grant.as_ref().map(ToString::to_string),
                    refused: Some(refused.to_string()),
                });
            }
        }
        if let Some(grant) = &self.grant {
            if let Some(shortfall) = outstanding.check_demand_subset(grant) {
                return Err(Error::DemandDenied {
                    demanded: render_shortfall(outstanding, shortfall),
                    granted: Some(grant.to_string()),
                    refused: self.refused.as_ref().map(ToString::to_string),
                });
            }
        }
        Ok(WalkDecision::Continue)
    }
}

/// Whether two assert sets make incomparable claims for the same capability
/// type.
///
/// Such claims cannot be merged by union: a demand could be a subset of the
/// union without being a subset of either original assertion, so a replay of
/// the merged segment would halt where the original frames would have walked
/// on. Comparison failures count as intersecting (the merge is refused).
fn intersecting_assertions(candidate: &CapabilitySet, published: &CapabilitySet) -> bool {
    if candidate.is_unrestricted() || published.is_unrestricted() {
        return false;
    }
    for (token, cap) in candidate.iter() {
        if let Some(existing) = published.get(token) {
            let forward = cap.is_subset_of(existing.as_ref()).unwrap_or(false);
            let backward = existing.is_subset_of(cap.as_ref()).unwrap_or(false);
            if !forward && !backward {
                return true;
            }
        }
    }
    false
}

/// Folds per-frame modifier and grant state into an ordered list of
/// [`SegmentTriple`]s.
///
/// The compressor owns exactly one mutable "current" triple; closed triples
/// are immutable once appended. Closing flushes the current triple into the
/// list and resets it in place (seeding the fresh segment's grant from the
/// closed one) instead of reallocating on every segment boundary.
///
/// # Examples
///
/// ```rust
/// use caswalk::capability::SecurityCapability;
/// use caswalk::{SecurityContext, TripleCompressor};
/// use std::sync::Arc;
///
/// let ctx = SecurityContext::new();
/// let mut grant = ctx.empty_set();
/// grant.add_capability(Arc::new(SecurityCapability::execution()))?;
///
/// let mut compressor = TripleCompressor::new(ctx.registry());
/// compressor.update_grant(&grant);
///
/// let stack = compressor.finish();
/// assert_eq!(stack.len(), 1);
///
/// let cap = SecurityCapability::execution();
/// let token = ctx.registry().resolve(&cap)?;
/// stack.check_demand(&cap, token)?;
/// # Ok::<(), caswalk::Error>(())
/// ```
#[derive(Debug)]
pub struct TripleCompressor {
    registry: Arc<TokenRegistry>,
    closed: Vec<SegmentTriple>,
    current: SegmentTriple,
}

impl TripleCompressor {
    /// Creates a compressor with one vacant open segment.
    #[must_use]
    pub fn new(registry: &Arc<TokenRegistry>) -> Self {
        TripleCompressor {
            registry: Arc::clone(registry),
            closed: Vec::new(),
            current: SegmentTriple::default(),
        }
    }

    /// Folds an assert set into the current segment (steps 1-5 above).
    pub fn update_assert(&mut self, asserted: &CapabilitySet) {
        // Step 1: already implied by the published assert
        if let Some(existing) = &self.current.assert {
            if asserted.is_subset_of(existing).unwrap_or(false) {
                return;
            }
        }

        // Step 2: cannot assert more than the segment was granted. With no
        // grant folded yet the segment is unconstrained and the candidate is
        // adopted wholesale.
        let mut candidate = asserted.clone();
        if let Some(grant) = &self.current.grant {
            candidate.intersect_in_place_tolerant(grant);
        }

        // Step 3: claims already refused cannot be asserted
        let mut clean = match &self.current.refused {
            Some(refused) => candidate.subtract_refused(refused),
            None => true,
        };

        // Step 4: incomparable overlap with the published assert
        if clean {
            if let Some(existing) = &self.current.assert {
                if intersecting_assertions(&candidate, existing) {
                    clean = false;
                }
            }
        }

        if !clean {
            self.close_and_append();
            self.current.assert = Some(candidate);
            return;
        }

        // Step 5: clean merge
        match &mut self.current.assert {
            Some(existing) => existing.union_in_place_tolerant(&candidate),
            None => self.current.assert = Some(candidate),
        }
    }

    /// Folds the all-capabilities assertion: equivalent to asserting the
    /// unrestricted set.
    pub fn update_assert_all(&mut self) {
        let all = CapabilitySet::unrestricted(&self.registry);
        self.update_assert(&all);
    }

    /// Narrows the current segment's grant by intersection.
    ///
    /// Comparison failures drop the affected entry: a capability type that
    /// cannot be compared is not granted.
    pub fn update_grant(&mut self, grant: &CapabilitySet) {
        match &mut self.current.grant {
            Some(current) => current.intersect_in_place_tolerant(grant),
            None => self.current.grant = Some(grant.clone()),
        }
    }

    /// Widens the current segment's refused set by union.
    ///
    /// If the current segment's assert is unrestricted the segment is closed
    /// first, preserving the triple invariant; the refusal then applies to
    /// the frames of the next segment, which is exactly where it belongs.
    pub fn update_refused(&mut self, refused: &CapabilitySet) {
        if refused.is_empty() {
            return;
        }
        if self
            .current
            .assert
            .as_ref()
            .is_some_and(CapabilitySet::is_unrestricted)
        {
            self.close_and_append();
        }
        match &mut self.current.refused {
            Some(current) => current.union_in_place_tolerant(refused),
            None => self.current.refused = Some(refused.clone()),
        }
    }

    /// The number of closed segments plus the open one if it holds state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.closed.len() + usize::from(!self.current.is_vacant())
    }

    /// Whether nothing was folded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.current.is_vacant()
    }

    /// Flushes the open segment and returns the finished triple list.
    #[must_use]
    pub fn finish(mut self) -> CompressedStack {
        if !self.current.is_vacant() {
            self.closed.push(self.current);
        }
        CompressedStack {
            triples: self.closed,
        }
    }

    /// Closes the current triple, appends it to the output list and seeds the
    /// fresh segment's grant from the closed one.
    fn close_and_append(&mut self) {
        let closed = std::mem::take(&mut self.current);
        self.current.grant = closed.grant.clone();
        self.closed.push(closed);
    }
}

/// An immutable, ordered list of [`SegmentTriple`]s representing a captured
/// stack.
///
/// Replaying the list answers any demand in a number of steps bounded by the
/// number of segments; the verdict is identical to walking the original
/// per-frame records.
#[derive(Debug, Clone)]
pub struct CompressedStack {
    triples: Vec<SegmentTriple>,
}

impl CompressedStack {
    /// The segments, innermost first.
    #[must_use]
    pub fn triples(&self) -> &[SegmentTriple] {
        &self.triples
    }

    /// The number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Whether the capture saw no state at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Evaluates a single-capability demand against the captured stack.
    ///
    /// # Errors
    /// [`Error::DemandDenied`] when a segment excludes or lacks the demanded
    /// capability.
    pub fn check_demand(&self, capability: &dyn Capability, token: CapToken) -> Result<()> {
        for triple in &self.triples {
            if let WalkDecision::Halt = triple.check_demand(capability, token)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Evaluates a set demand against the captured stack.
    ///
    /// A partial assertion in one segment shrinks the outstanding demand
    /// threaded to the segments further out.
    ///
    /// # Errors
    /// [`Error::DemandDenied`] when a segment excludes or lacks part of the
    /// demanded set.
    pub fn check_set_demand(&self, demanded: &CapabilitySet) -> Result<()> {
        let mut outstanding = demanded.clone();
        if outstanding.is_empty() {
            return Ok(());
        }
        for triple in &self.triples {
            if let WalkDecision::Halt = triple.check_set_demand(&mut outstanding)? {
                return Ok(());
            }
        }
        Ok(())
    }
}
