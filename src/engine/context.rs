use std::sync::Arc;

use crate::capability::{Capability, CapabilityRc};
use crate::registry::TokenRegistry;
use crate::set::CapabilitySet;
use crate::Result;

use super::triple::CompressedStack;
use super::walk::{self, FrameDescriptor};

/// The top-level handle owning a [`TokenRegistry`] and exposing the demand
/// entry points.
///
/// A context is created once per process or host and shared from there; every
/// capability set created through it is bound to its registry, which is what
/// keeps token indices stable for the context's lifetime without any hidden
/// global state. Two contexts never share tokens: sets from different
/// contexts cannot be combined.
///
/// # Examples
///
/// ```rust
/// use caswalk::capability::{SecurityCapability, UiCapability};
/// use caswalk::{FrameDescriptor, SecurityContext};
/// use std::sync::Arc;
///
/// let ctx = SecurityContext::new();
///
/// let mut grant = ctx.empty_set();
/// grant.add_capability(Arc::new(SecurityCapability::execution()))?;
///
/// // Two frames, both granted execution
/// let frames = vec![
///     FrameDescriptor::new(grant.clone()),
///     FrameDescriptor::new(grant.clone()),
/// ];
///
/// let cap = SecurityCapability::execution();
/// ctx.demand(&cap, frames.clone())?;
///
/// // A UI demand fails: no frame holds it
/// let ui = UiCapability::safe_windows();
/// assert!(ctx.demand(&ui, frames).is_err());
/// # Ok::<(), caswalk::Error>(())
/// ```
#[derive(Debug)]
pub struct SecurityContext {
    registry: Arc<TokenRegistry>,
}

impl SecurityContext {
    /// Creates a context with a fresh registry holding only the built-in
    /// capability types.
    #[must_use]
    pub fn new() -> Self {
        SecurityContext {
            registry: Arc::new(TokenRegistry::new()),
        }
    }

    /// The context's token registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    /// Creates an empty capability set bound to this context.
    #[must_use]
    pub fn empty_set(&self) -> CapabilitySet {
        CapabilitySet::new(&self.registry)
    }

    /// Creates an unrestricted capability set bound to this context.
    #[must_use]
    pub fn unrestricted_set(&self) -> CapabilitySet {
        CapabilitySet::unrestricted(&self.registry)
    }

    /// Creates a set holding the given capabilities.
    ///
    /// # Errors
    /// Propagates resolution and per-type union failures.
    pub fn set_of<I>(&self, capabilities: I) -> Result<CapabilitySet>
    where
        I: IntoIterator<Item = CapabilityRc>,
    {
        CapabilitySet::from_capabilities(&self.registry, capabilities)
    }

    /// Demands a single capability from every supplied frame.
    ///
    /// Frames are consumed innermost to outermost, as delivered by the host's
    /// stack walker. The demand succeeds when the walk completes, or earlier
    /// when an assertion covers it.
    ///
    /// # Errors
    /// [`crate::Error::DemandDenied`] from the faulting frame.
    pub fn demand<I>(&self, capability: &dyn Capability, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = FrameDescriptor>,
    {
        walk::demand_frames(&self.registry, capability, frames)
    }

    /// Demands a whole capability set from every supplied frame.
    ///
    /// # Errors
    /// [`crate::Error::DemandDenied`] carrying the first faulting capability.
    pub fn demand_set<I>(&self, demanded: &CapabilitySet, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = FrameDescriptor>,
    {
        walk::demand_set_frames(demanded, frames)
    }

    /// Captures the supplied frames into a compressed triple list that can
    /// answer any number of later demands in bounded steps.
    #[must_use]
    pub fn capture<I>(&self, frames: I) -> CompressedStack
    where
        I: IntoIterator<Item = FrameDescriptor>,
    {
        walk::capture(&self.registry, frames)
    }
}

impl Default for SecurityContext {
    fn default() -> Self {
        SecurityContext::new()
    }
}
