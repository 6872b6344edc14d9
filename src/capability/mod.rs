//! Capability contract and built-in capability types.
//!
//! A *capability* is a named, type-specific right to perform a class of operation
//! (file access, reflection, UI interaction, ...). This module defines the abstract
//! contract every capability type must implement, plus the built-in capability
//! types the engine reserves fixed token indices for.
//!
//! # Architecture
//!
//! The engine never inspects a capability's payload. Everything it needs is
//! expressed through the [`Capability`] trait:
//!
//! - **Algebra**: [`Capability::union`], [`Capability::intersect`] and
//!   [`Capability::is_subset_of`] combine and compare two instances of the *same*
//!   capability type
//! - **Demand primitive**: [`Capability::satisfied_by`] answers whether a grant
//!   instance satisfies a demanded instance
//! - **Classification input**: [`Capability::supports_unrestricted`] feeds the
//!   token registry's Normal/AllOrNothing classification
//! - **Identity**: [`Capability::as_any`] anchors exact-runtime-type identity;
//!   two capability types that merely share a qualified name are never treated
//!   as the same type
//!
//! Comparing instances of *different* capability types is a contract violation
//! and produces [`crate::Error::IncompatibleComparison`], never a silent success.
//!
//! # Key Components
//!
//! - [`Capability`] - The abstract contract
//! - [`CapabilityRc`] - Shared, immutable capability instance handle
//! - [`BuiltinKind`] - The fixed set of built-in capability types
//! - [`SecurityCapability`], [`ReflectionCapability`], [`UiCapability`] - Flag and
//!   level based built-ins
//! - [`FileIoCapability`], [`RegistryCapability`], [`EnvironmentCapability`] -
//!   Resource-path based built-ins
//!
//! # Thread Safety
//!
//! Capability instances are immutable after construction and shared behind
//! [`CapabilityRc`]; all algebra returns new instances. Every capability type is
//! `Send + Sync`.

mod builtin;
mod resource;

pub(crate) use builtin::empty_instance;
pub use builtin::{
    BuiltinKind, ClipboardAccess, ReflectionCapability, ReflectionFlags, SecurityCapability,
    SecurityFlags, UiCapability, WindowAccess,
};
pub use resource::{EnvironmentCapability, FileIoCapability, PathSet, RegistryCapability};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Result;

/// Shared handle to an immutable capability instance.
///
/// Capability instances are value-like and never mutated after construction;
/// sharing them behind an [`Arc`] makes copying a capability set cheap.
pub type CapabilityRc = Arc<dyn Capability>;

/// The contract every capability type must implement.
///
/// A capability instance is a concrete value of a capability type together with
/// the data needed to answer subset, union and intersection queries against
/// another instance of the *same* type. The engine composes these per-type
/// answers into set-level algebra and demand verdicts; it never looks inside an
/// instance itself.
///
/// # Contract
///
/// - All binary operations error with [`crate::Error::IncompatibleComparison`]
///   when handed an instance of a different runtime type
/// - `union` is commutative and idempotent up to `is_subset_of` equivalence
/// - `intersect` returns `None` when the result would be vacuous, so callers
///   can drop empty entries instead of storing them
/// - A vacuous instance (see [`Capability::is_vacuous`]) is satisfied by any
///   grant, including no grant at all
///
/// # Implementing
///
/// The [`downcast_arg`] helper performs the checked same-type downcast that
/// every binary operation needs:
///
/// ```rust
/// use caswalk::capability::{downcast_arg, Capability, CapabilityRc};
/// use caswalk::Result;
/// use std::any::Any;
/// use std::fmt;
/// use std::sync::Arc;
///
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct NetCapability {
///     connect: bool,
/// }
///
/// impl fmt::Display for NetCapability {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         write!(f, "Net(connect: {})", self.connect)
///     }
/// }
///
/// impl Capability for NetCapability {
///     fn qualified_name(&self) -> &str {
///         "example::NetCapability"
///     }
///
///     fn supports_unrestricted(&self) -> bool {
///         true
///     }
///
///     fn is_unrestricted(&self) -> bool {
///         self.connect
///     }
///
///     fn is_vacuous(&self) -> bool {
///         !self.connect
///     }
///
///     fn is_subset_of(&self, other: &dyn Capability) -> Result<bool> {
///         let other = downcast_arg::<Self>(self, other)?;
///         Ok(!self.connect || other.connect)
///     }
///
///     fn union(&self, other: &dyn Capability) -> Result<CapabilityRc> {
///         let other = downcast_arg::<Self>(self, other)?;
///         Ok(Arc::new(NetCapability {
///             connect: self.connect || other.connect,
///         }))
///     }
///
///     fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>> {
///         let other = downcast_arg::<Self>(self, other)?;
///         if self.connect && other.connect {
///             Ok(Some(Arc::new(self.clone())))
///         } else {
///             Ok(None)
///         }
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait Capability: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The stable, process-wide qualified name of this capability type.
    ///
    /// Used for diagnostics and for rendering demand failures; never used for
    /// identity (identity is the exact runtime type).
    fn qualified_name(&self) -> &str;

    /// Whether this capability *type* has "all of it" semantics.
    ///
    /// Types that return `true` are classified as AllOrNothing by the token
    /// registry and are covered implicitly by an unrestricted capability set.
    /// The answer must be constant per type.
    fn supports_unrestricted(&self) -> bool;

    /// Whether this *instance* represents the maximal value of its type.
    fn is_unrestricted(&self) -> bool;

    /// Whether this instance is vacuously satisfied against "nothing".
    ///
    /// Some capability types are satisfied even with a default/zero value; an
    /// absent entry in a capability set means "no claim", and emptiness
    /// per-type is determined by asking the instance itself.
    fn is_vacuous(&self) -> bool;

    /// Whether every right in `self` is also in `other`.
    ///
    /// # Errors
    /// [`crate::Error::IncompatibleComparison`] if `other` is a different
    /// capability type.
    fn is_subset_of(&self, other: &dyn Capability) -> Result<bool>;

    /// The least capability covering both `self` and `other`.
    ///
    /// # Errors
    /// [`crate::Error::IncompatibleComparison`] if `other` is a different
    /// capability type.
    fn union(&self, other: &dyn Capability) -> Result<CapabilityRc>;

    /// The greatest capability covered by both `self` and `other`, or `None`
    /// if that capability would be vacuous.
    ///
    /// # Errors
    /// [`crate::Error::IncompatibleComparison`] if `other` is a different
    /// capability type.
    fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>>;

    /// The demand primitive: whether a grant satisfies this demanded instance.
    ///
    /// `None` means the grant makes no claim for this capability type, which
    /// satisfies the demand only if the demand is vacuous.
    ///
    /// # Errors
    /// [`crate::Error::IncompatibleComparison`] if the grant is a different
    /// capability type.
    fn satisfied_by(&self, grant: Option<&dyn Capability>) -> Result<bool> {
        match grant {
            Some(grant) => self.is_subset_of(grant),
            None => Ok(self.is_vacuous()),
        }
    }

    /// Identity anchor for exact-runtime-type comparison and downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Checked same-type downcast for binary capability operations.
///
/// Returns the argument as `&T` when it is the same runtime type as `this`.
///
/// # Errors
/// [`crate::Error::IncompatibleComparison`] carrying both qualified names when
/// the types differ.
pub fn downcast_arg<'a, T: Capability>(
    this: &T,
    other: &'a dyn Capability,
) -> Result<&'a T> {
    other
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| crate::Error::IncompatibleComparison {
            left: this.qualified_name().to_string(),
            right: other.qualified_name().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_arg_rejects_foreign_type() {
        let security = SecurityCapability::execution();
        let ui = UiCapability::safe_windows();

        let err = downcast_arg::<SecurityCapability>(&security, &ui).unwrap_err();
        match err {
            crate::Error::IncompatibleComparison { left, right } => {
                assert_eq!(left, security.qualified_name());
                assert_eq!(right, ui.qualified_name());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_satisfied_by_none_is_vacuity() {
        let vacuous = SecurityCapability::none();
        let demanding = SecurityCapability::execution();

        assert!(vacuous.satisfied_by(None).unwrap());
        assert!(!demanding.satisfied_by(None).unwrap());
    }
}
