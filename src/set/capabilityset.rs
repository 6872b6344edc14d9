use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::capability::{Capability, CapabilityRc};
use crate::registry::{CapToken, TokenRegistry};
use crate::Result;

/// What a failed containment check was missing.
///
/// Produced by the tolerant subset variants so a denied demand can report the
/// faulting capability for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortfall {
    /// The demanded set was unrestricted and the target was not; no single
    /// capability can be named as the faulting one.
    Unrestricted,
    /// The capability behind this token was not contained.
    Capability(CapToken),
}

/// One explicit claim inside a capability set.
#[derive(Debug, Clone)]
struct SetEntry {
    token: CapToken,
    cap: CapabilityRc,
}

/// The effective claim a set makes for one token index.
enum Claim<'a> {
    /// An explicit entry
    Explicit(&'a dyn Capability),
    /// Covered implicitly because the set is unrestricted and the type is
    /// unrestricted-capable
    Implicit,
    /// No claim at all
    Nothing,
}

/// A sparse, token-indexed collection of capability instances plus an
/// "unrestricted" flag.
///
/// Capability sets are the currency of the engine: grant sets, refusal sets,
/// frame modifier sets and segment triples are all capability sets. They are
/// mutable value-ish containers, so they are *copied* whenever they cross an
/// ownership boundary (for example into a frame modifier record); sharing a
/// live set across owners is never correct.
///
/// # Invariants
///
/// - An absent entry means "no claim", not "denies nothing"; per-type
///   emptiness is determined by asking the instance itself (see
///   [`Capability::is_vacuous`])
/// - When the set is unrestricted, explicit entries only narrow the implicit
///   maximum
/// - All entries belong to the same [`TokenRegistry`]; mixing registries is
///   an internal-state error
///
/// # Performance
///
/// Entry-wise combination iterates only the entries the two operands actually
/// hold (the storage is a sparse map ordered by token index), never the full
/// token space, keeping the algebra O(entries) rather than O(registry size).
///
/// # Examples
///
/// ```rust
/// use caswalk::capability::{SecurityCapability, SecurityFlags};
/// use caswalk::{CapabilitySet, SecurityContext};
/// use std::sync::Arc;
///
/// let ctx = SecurityContext::new();
/// let mut grant = ctx.empty_set();
/// grant.add_capability(Arc::new(SecurityCapability::execution()))?;
///
/// let mut wider = ctx.empty_set();
/// wider.add_capability(Arc::new(SecurityCapability::with_flags(
///     SecurityFlags::EXECUTION | SecurityFlags::ASSERTION,
/// )))?;
///
/// assert!(grant.is_subset_of(&wider)?);
/// assert!(!wider.is_subset_of(&grant)?);
/// # Ok::<(), caswalk::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    registry: Arc<TokenRegistry>,
    unrestricted: bool,
    /// Fast emptiness flag: false until anything was ever added
    touched: bool,
    entries: BTreeMap<u32, SetEntry>,
}

impl CapabilitySet {
    /// Creates an empty set bound to `registry`.
    #[must_use]
    pub fn new(registry: &Arc<TokenRegistry>) -> Self {
        CapabilitySet {
            registry: Arc::clone(registry),
            unrestricted: false,
            touched: false,
            entries: BTreeMap::new(),
        }
    }

    /// Creates an unrestricted set bound to `registry`.
    #[must_use]
    pub fn unrestricted(registry: &Arc<TokenRegistry>) -> Self {
        CapabilitySet {
            registry: Arc::clone(registry),
            unrestricted: true,
            touched: true,
            entries: BTreeMap::new(),
        }
    }

    /// Creates a set holding the given capabilities.
    ///
    /// # Errors
    /// Propagates resolution failures and per-type union errors from
    /// [`CapabilitySet::add_capability`].
    pub fn from_capabilities<I>(registry: &Arc<TokenRegistry>, capabilities: I) -> Result<Self>
    where
        I: IntoIterator<Item = CapabilityRc>,
    {
        let mut set = CapabilitySet::new(registry);
        for capability in capabilities {
            set.add_capability(capability)?;
        }
        Ok(set)
    }

    /// The registry this set's tokens belong to.
    #[must_use]
    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    /// Whether this set covers every unrestricted-capable type implicitly.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    /// Whether this set holds nothing at all.
    ///
    /// Short-circuits on an internal fast flag when nothing was ever added;
    /// otherwise every entry is asked whether it is vacuously satisfied
    /// against "nothing".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        if self.unrestricted {
            return false;
        }
        if !self.touched {
            return true;
        }
        self.entries.values().all(|entry| entry.cap.is_vacuous())
    }

    /// The number of explicit entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The highest token index any explicit entry uses, tracked so iteration
    /// bounds never depend on the registry's size.
    #[must_use]
    pub fn highest_index(&self) -> Option<u32> {
        self.entries.keys().next_back().copied()
    }

    /// Iterates the explicit entries in token-index order.
    pub fn iter(&self) -> impl Iterator<Item = (CapToken, &CapabilityRc)> {
        self.entries.values().map(|entry| (entry.token, &entry.cap))
    }

    /// The explicit entry for `token`, if any.
    ///
    /// Implicit coverage through the unrestricted flag is *not* visible here;
    /// use [`CapabilitySet::satisfies`] to evaluate effective coverage.
    #[must_use]
    pub fn get(&self, token: CapToken) -> Option<&CapabilityRc> {
        self.entries.get(&token.index()).map(|entry| &entry.cap)
    }

    /// Removes and returns the explicit entry for `token`.
    pub fn remove(&mut self, token: CapToken) -> Option<CapabilityRc> {
        self.entries.remove(&token.index()).map(|entry| entry.cap)
    }

    /// Adds a capability, unioning with an existing entry of the same type.
    ///
    /// Adding an unrestricted-capable capability to an unrestricted set
    /// without a narrowing entry is a no-op: the set already holds the
    /// maximum.
    ///
    /// # Errors
    /// Propagates resolution failures and the per-type union error.
    pub fn add_capability(&mut self, capability: CapabilityRc) -> Result<CapToken> {
        let token = self.registry.resolve(capability.as_ref())?;
        self.touched = true;

        if let Some(existing) = self.entries.get(&token.index()) {
            let merged = existing.cap.union(capability.as_ref())?;
            self.entries
                .insert(token.index(), SetEntry { token, cap: merged });
            return Ok(token);
        }

        if self.unrestricted && token.covered_by_unrestricted() {
            // Already implicitly maximal
            return Ok(token);
        }

        self.entries
            .insert(token.index(), SetEntry { token, cap: capability });
        Ok(token)
    }

    /// Replaces (or creates) the entry for the capability's type.
    ///
    /// Unlike [`CapabilitySet::add_capability`] no union is computed; in an
    /// unrestricted set the stored entry becomes a narrowing override.
    ///
    /// # Errors
    /// Propagates resolution failures.
    pub fn set_capability(&mut self, capability: CapabilityRc) -> Result<CapToken> {
        let token = self.registry.resolve(capability.as_ref())?;
        self.touched = true;
        self.entries
            .insert(token.index(), SetEntry { token, cap: capability });
        Ok(token)
    }

    /// Whether a demanded capability is satisfied by this set.
    ///
    /// The effective claim is the explicit entry if one exists, implicit
    /// maximal coverage if the set is unrestricted and the type is
    /// unrestricted-capable, and "no claim" otherwise. A demand against "no
    /// claim" succeeds only if the demand is vacuous.
    ///
    /// # Errors
    /// Propagates [`crate::Error::IncompatibleComparison`] from the per-type
    /// comparison; use [`CapabilitySet::satisfies_tolerant`] inside walks.
    pub fn satisfies(&self, capability: &dyn Capability, token: CapToken) -> Result<bool> {
        match self.claim(token.index()) {
            Claim::Explicit(entry) => capability.satisfied_by(Some(entry)),
            Claim::Implicit => Ok(true),
            Claim::Nothing => Ok(capability.is_vacuous()),
        }
    }

    /// Tolerant form of [`CapabilitySet::satisfies`]: a comparison failure
    /// counts as "not satisfied" (fail closed).
    #[must_use]
    pub(crate) fn satisfies_tolerant(&self, capability: &dyn Capability, token: CapToken) -> bool {
        self.satisfies(capability, token).unwrap_or(false)
    }

    /// Whether this set, used as a denial, excludes the demanded capability.
    ///
    /// A denial excludes a demand when their per-type intersection is
    /// non-vacuous. Comparison failures count as excluded (fail closed).
    #[must_use]
    pub(crate) fn denies(&self, capability: &dyn Capability, token: CapToken) -> bool {
        match self.claim(token.index()) {
            Claim::Explicit(entry) => match capability.intersect(entry) {
                Ok(Some(overlap)) => !overlap.is_vacuous(),
                Ok(None) => false,
                Err(_) => true,
            },
            Claim::Implicit => !capability.is_vacuous(),
            Claim::Nothing => false,
        }
    }

    /// Whether every claim in `self` is contained in `target`.
    ///
    /// # Errors
    /// Propagates [`crate::Error::IncompatibleComparison`]; the tolerant
    /// variants convert it instead.
    pub fn is_subset_of(&self, target: &CapabilitySet) -> Result<bool> {
        self.ensure_same_registry(target)?;

        for entry in self.entries.values() {
            match target.claim(entry.token.index()) {
                Claim::Explicit(other) => {
                    if !entry.cap.is_subset_of(other)? {
                        return Ok(false);
                    }
                }
                Claim::Implicit => {}
                Claim::Nothing => {
                    if !entry.cap.is_vacuous() {
                        return Ok(false);
                    }
                }
            }
        }

        if self.unrestricted {
            if !target.unrestricted {
                return Ok(false);
            }
            // Both unrestricted: our implicit maximum must fit through any
            // narrowing override the target carries.
            for entry in target.entries.values() {
                if entry.token.covered_by_unrestricted()
                    && !self.entries.contains_key(&entry.token.index())
                    && !entry.cap.is_unrestricted()
                {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Whether both sets contain each other.
    ///
    /// # Errors
    /// Propagates [`crate::Error::IncompatibleComparison`].
    pub fn equivalent(&self, other: &CapabilitySet) -> Result<bool> {
        Ok(self.is_subset_of(other)? && other.is_subset_of(self)?)
    }

    /// Subset check used to evaluate a demand against a grant set.
    ///
    /// Returns the first shortfall, or `None` when the demand is satisfied.
    /// A per-type comparison failure counts as a shortfall (fail closed).
    #[must_use]
    pub fn check_demand_subset(&self, grant: &CapabilitySet) -> Option<Shortfall> {
        if self.unrestricted && !grant.unrestricted {
            return Some(Shortfall::Unrestricted);
        }

        for entry in self.entries.values() {
            if !grant.satisfies_tolerant(entry.cap.as_ref(), entry.token) {
                return Some(Shortfall::Capability(entry.token));
            }
        }
        None
    }

    /// Subset check used to evaluate a demand against a PermitOnly set.
    ///
    /// Identical containment semantics to
    /// [`CapabilitySet::check_demand_subset`]; kept separate because the two
    /// call sites fail with different diagnostics.
    #[must_use]
    pub fn check_permit_only(&self, permitted: &CapabilitySet) -> Option<Shortfall> {
        self.check_demand_subset(permitted)
    }

    /// Whether an assertion fully covers this demanded set.
    ///
    /// A per-type comparison failure makes that capability "not covered"
    /// without poisoning the rest of the walk; it never silently covers.
    #[must_use]
    pub fn check_assertion(&self, asserted: &CapabilitySet) -> bool {
        if self.unrestricted {
            return asserted.unrestricted;
        }

        for entry in self.entries.values() {
            let covered = match asserted.claim(entry.token.index()) {
                Claim::Explicit(other) => {
                    entry.cap.satisfied_by(Some(other)).unwrap_or(false)
                }
                Claim::Implicit => true,
                Claim::Nothing => entry.cap.is_vacuous(),
            };
            if !covered {
                return false;
            }
        }
        true
    }

    /// Finds the first overlap between this demanded set and a refusal set.
    ///
    /// Returns the faulting token, or `None` when the sets are disjoint.
    /// Comparison failures count as overlapping (fail closed).
    #[must_use]
    pub(crate) fn overlaps(&self, refused: &CapabilitySet) -> Option<Shortfall> {
        if self.unrestricted {
            if refused.unrestricted {
                return Some(Shortfall::Unrestricted);
            }
            for entry in refused.entries.values() {
                if entry.token.covered_by_unrestricted() && !entry.cap.is_vacuous() {
                    return Some(Shortfall::Capability(entry.token));
                }
            }
        }

        for entry in self.entries.values() {
            if refused.denies(entry.cap.as_ref(), entry.token) {
                return Some(Shortfall::Capability(entry.token));
            }
        }
        None
    }

    /// Removes every entry fully covered by `asserted` from this outstanding
    /// demand set.
    ///
    /// Returns true when nothing outstanding remains, i.e. the assertion
    /// covered the whole remaining demand. Partial coverage shrinks the set so
    /// already-asserted capabilities are not re-checked against frames further
    /// out.
    pub(crate) fn remove_covered_by(&mut self, asserted: &CapabilitySet) -> bool {
        let covered: Vec<u32> = self
            .entries
            .values()
            .filter(|entry| {
                match asserted.claim(entry.token.index()) {
                    Claim::Explicit(other) => {
                        entry.cap.satisfied_by(Some(other)).unwrap_or(false)
                    }
                    Claim::Implicit => true,
                    Claim::Nothing => entry.cap.is_vacuous(),
                }
            })
            .map(|entry| entry.token.index())
            .collect();

        for index in covered {
            self.entries.remove(&index);
        }

        if self.unrestricted && asserted.unrestricted {
            // The implicit part of the demand is covered by the implicit part
            // of the assertion; only explicit leftovers remain.
            self.unrestricted = false;
        }

        !self.unrestricted && self.entries.is_empty()
    }

    /// Computes the union into a new set.
    ///
    /// Unrestricted-or-unrestricted yields unrestricted. Entry-wise, a value
    /// present on one side carries through unchanged unless the other side
    /// already covers its type implicitly; two present values combine via the
    /// capability type's own union.
    ///
    /// # Errors
    /// Propagates per-type union failures and registry mismatches.
    pub fn union(&self, other: &CapabilitySet) -> Result<CapabilitySet> {
        let mut result = self.clone();
        result.union_in_place(other)?;
        Ok(result)
    }

    /// Mutating union, used by the stack walk to avoid an allocation per
    /// frame.
    ///
    /// After the call `self` reflects the algebraic result; `other` is
    /// read-only. If an error is returned `self` remains a valid set but its
    /// value is unspecified.
    ///
    /// # Errors
    /// Propagates per-type union failures and registry mismatches.
    pub fn union_in_place(&mut self, other: &CapabilitySet) -> Result<()> {
        self.union_in_place_inner(other, false)
    }

    /// Tolerant mutating union for refusal accumulation: a per-type union
    /// failure keeps the existing entry rather than propagating, so a
    /// misbehaving capability type cannot silently erase a refusal.
    pub(crate) fn union_in_place_tolerant(&mut self, other: &CapabilitySet) {
        // Registry mismatches cannot occur on the internal walk paths that
        // use this variant.
        let _ = self.union_in_place_inner(other, true);
    }

    fn union_in_place_inner(&mut self, other: &CapabilitySet, tolerant: bool) -> Result<()> {
        self.ensure_same_registry(other)?;
        let result_unrestricted = self.unrestricted || other.unrestricted;

        for entry in other.entries.values() {
            match self.entries.get(&entry.token.index()) {
                Some(existing) => {
                    let merged = match existing.cap.union(entry.cap.as_ref()) {
                        Ok(merged) => merged,
                        Err(_) if tolerant => continue,
                        Err(err) => return Err(err),
                    };
                    self.entries.insert(
                        entry.token.index(),
                        SetEntry {
                            token: entry.token,
                            cap: merged,
                        },
                    );
                }
                None => {
                    if self.unrestricted && entry.token.covered_by_unrestricted() {
                        // Implicitly maximal already
                        continue;
                    }
                    self.entries.insert(entry.token.index(), entry.clone());
                }
            }
        }

        if other.unrestricted {
            // One-sided entries of self whose type the other side covers
            // implicitly collapse into the implicit maximum.
            self.entries.retain(|index, entry| {
                !entry.token.covered_by_unrestricted() || other.entries.contains_key(index)
            });
        }

        self.unrestricted = result_unrestricted;
        self.touched = self.touched || other.touched;
        Ok(())
    }

    /// Computes the intersection, or `None` when either operand is fully
    /// empty.
    ///
    /// "No intersection computed" and "intersection is the empty set" are
    /// distinguishable outcomes downstream: the former short-circuits a
    /// demand walk, the latter does not.
    ///
    /// # Errors
    /// Propagates per-type intersection failures and registry mismatches.
    pub fn intersect(&self, other: &CapabilitySet) -> Result<Option<CapabilitySet>> {
        if self.is_empty() || other.is_empty() {
            return Ok(None);
        }
        let mut result = self.clone();
        result.intersect_in_place(other)?;
        Ok(Some(result))
    }

    /// Mutating intersection, used by the stack walk to avoid an allocation
    /// per frame.
    ///
    /// Unlike [`CapabilitySet::intersect`] there is no "nothing computed"
    /// signal: intersecting with an empty set leaves `self` empty. If an
    /// error is returned `self` remains a valid set but its value is
    /// unspecified.
    ///
    /// # Errors
    /// Propagates per-type intersection failures and registry mismatches.
    pub fn intersect_in_place(&mut self, other: &CapabilitySet) -> Result<()> {
        self.intersect_in_place_inner(other, false)
    }

    /// Tolerant mutating intersection for grant accumulation: a per-type
    /// comparison failure drops the entry, so a misbehaving capability type
    /// is "not granted" rather than poisoning the walk.
    pub(crate) fn intersect_in_place_tolerant(&mut self, other: &CapabilitySet) {
        let _ = self.intersect_in_place_inner(other, true);
    }

    fn intersect_in_place_inner(&mut self, other: &CapabilitySet, tolerant: bool) -> Result<()> {
        self.ensure_same_registry(other)?;
        let result_unrestricted = self.unrestricted && other.unrestricted;

        let indices: Vec<u32> = self.entries.keys().copied().collect();
        for index in indices {
            let entry_cap = match self.entries.get(&index) {
                Some(entry) => Arc::clone(&entry.cap),
                None => continue,
            };
            match other.claim(index) {
                Claim::Nothing => {
                    self.entries.remove(&index);
                }
                Claim::Implicit => {}
                Claim::Explicit(other_cap) => match entry_cap.intersect(other_cap) {
                    Ok(Some(narrowed)) => {
                        if let Some(entry) = self.entries.get_mut(&index) {
                            entry.cap = narrowed;
                        }
                    }
                    Ok(None) => {
                        self.entries.remove(&index);
                    }
                    Err(_) if tolerant => {
                        self.entries.remove(&index);
                    }
                    Err(err) => return Err(err),
                },
            }
        }

        if self.unrestricted {
            // The implicit maximum meets the other side's explicit entries.
            for entry in other.entries.values() {
                if entry.token.covered_by_unrestricted()
                    && !self.entries.contains_key(&entry.token.index())
                {
                    self.entries.insert(entry.token.index(), entry.clone());
                }
            }
        }

        self.unrestricted = result_unrestricted;
        Ok(())
    }

    /// Subtracts the claims of `refused` from this set (an assertion
    /// candidate).
    ///
    /// Returns false when the subtraction is not clean: some entry partially
    /// overlaps a refusal, or the set is unrestricted while the refusal is
    /// non-empty. A non-clean subtraction means the assertion cannot be
    /// merged into the current segment. Comparison failures count as
    /// non-clean.
    pub(crate) fn subtract_refused(&mut self, refused: &CapabilitySet) -> bool {
        if refused.is_empty() {
            return true;
        }
        if self.unrestricted {
            return false;
        }

        let mut fully_refused = Vec::new();
        for entry in self.entries.values() {
            match refused.claim(entry.token.index()) {
                Claim::Nothing => {}
                Claim::Implicit => fully_refused.push(entry.token.index()),
                Claim::Explicit(refusal) => match entry.cap.is_subset_of(refusal) {
                    Ok(true) => fully_refused.push(entry.token.index()),
                    Ok(false) => match entry.cap.intersect(refusal) {
                        Ok(Some(overlap)) if !overlap.is_vacuous() => return false,
                        Ok(_) => {}
                        Err(_) => return false,
                    },
                    Err(_) => return false,
                },
            }
        }

        for index in fully_refused {
            self.entries.remove(&index);
        }
        true
    }

    /// The effective claim at a token index.
    fn claim(&self, index: u32) -> Claim<'_> {
        if let Some(entry) = self.entries.get(&index) {
            return Claim::Explicit(entry.cap.as_ref());
        }
        if self.unrestricted {
            if let Some(descriptor) = self.registry.find_by_index(index) {
                if descriptor.token.covered_by_unrestricted() {
                    return Claim::Implicit;
                }
            }
        }
        Claim::Nothing
    }

    fn ensure_same_registry(&self, other: &CapabilitySet) -> Result<()> {
        if Arc::ptr_eq(&self.registry, &other.registry) {
            Ok(())
        } else {
            Err(invalid_state_error!(
                "capability sets belong to different security contexts"
            ))
        }
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unrestricted && self.entries.is_empty() {
            return write!(f, "unrestricted");
        }
        if self.unrestricted {
            write!(f, "unrestricted narrowed to ")?;
        }
        write!(f, "{{")?;
        for (i, entry) in self.entries.values().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", entry.cap)?;
        }
        write!(f, "}}")
    }
}
