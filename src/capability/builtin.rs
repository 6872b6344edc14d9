use bitflags::bitflags;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::capability::{downcast_arg, Capability, CapabilityRc};
use crate::Result;

/// The built-in capability types.
///
/// Built-ins occupy a reserved low token-index range assigned when a
/// [`crate::TokenRegistry`] is constructed; the count is fixed and known ahead
/// of time. All built-in types support unrestricted semantics.
///
/// The discriminant of each variant *is* its token index, which is what makes
/// [`crate::TokenRegistry::resolve_builtin`] a pure function that is safe to
/// call before the general interning table exists.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumCount,
    strum::EnumIter,
    strum::FromRepr,
)]
#[repr(u32)]
pub enum BuiltinKind {
    /// Security-sensitive engine operations ([`SecurityCapability`])
    Security = 0,
    /// File and directory access ([`FileIoCapability`])
    FileIo = 1,
    /// Environment variable access ([`EnvironmentCapability`])
    Environment = 2,
    /// Registry key access ([`RegistryCapability`])
    Registry = 3,
    /// Reflection over non-public program structure ([`ReflectionCapability`])
    Reflection = 4,
    /// Window and clipboard interaction ([`UiCapability`])
    Ui = 5,
}

impl BuiltinKind {
    /// The qualified name of the capability type behind this kind.
    #[must_use]
    pub fn qualified_name(&self) -> &'static str {
        match self {
            BuiltinKind::Security => "caswalk::SecurityCapability",
            BuiltinKind::FileIo => "caswalk::FileIoCapability",
            BuiltinKind::Environment => "caswalk::EnvironmentCapability",
            BuiltinKind::Registry => "caswalk::RegistryCapability",
            BuiltinKind::Reflection => "caswalk::ReflectionCapability",
            BuiltinKind::Ui => "caswalk::UiCapability",
        }
    }
}

use super::resource::{EnvironmentCapability, FileIoCapability, RegistryCapability};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags controlling access to security-sensitive engine operations.
    ///
    /// These determine what security-relevant operations code is allowed to
    /// perform against the engine itself.
    pub struct SecurityFlags: u32 {
        /// Enables code execution. The most basic right required for code to run at all.
        const EXECUTION = 0x0000_0001;
        /// Enables the code to assert capabilities on behalf of its callers.
        /// Assertion bypasses the stack walk for the asserted capability and can
        /// shield callers that do not hold it.
        const ASSERTION = 0x0000_0002;
        /// Enables bypassing of verification checks for unverifiable code.
        const SKIP_VERIFICATION = 0x0000_0004;
        /// Enables execution of unsafe or unverified code.
        const UNSAFE_CODE = 0x0000_0008;
        /// Enables control over evaluation policy for the current context.
        const CONTROL_POLICY = 0x0000_0010;
        /// Enables manipulation of evidence used in grant computation.
        const CONTROL_EVIDENCE = 0x0000_0020;
        /// Enables control over threads and their capability state.
        const CONTROL_THREAD = 0x0000_0040;
        /// Enables serialization and deserialization of capability state.
        const SERIALIZATION = 0x0000_0080;
        /// Enables access to lower-level security infrastructure.
        const INFRASTRUCTURE = 0x0000_0100;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags controlling the use of reflection over non-public program structure.
    pub struct ReflectionFlags: u32 {
        /// Enables inspection of type-level metadata for non-public members.
        const TYPE_INFO = 0x0000_0001;
        /// Enables invocation and field access on non-public members.
        const MEMBER_ACCESS = 0x0000_0002;
        /// Enables emitting new code at runtime.
        const EMIT = 0x0000_0004;
        /// Enables member access restricted to the grant of the target's owner.
        const RESTRICTED_MEMBER_ACCESS = 0x0000_0008;
    }
}

/// Capability over security-sensitive engine operations.
///
/// Flag based: the instance holds a [`SecurityFlags`] value and the algebra is
/// plain bit algebra. The unrestricted instance holds every defined flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityCapability {
    flags: SecurityFlags,
}

impl SecurityCapability {
    /// A capability holding no flags; vacuously satisfied.
    #[must_use]
    pub fn none() -> Self {
        SecurityCapability {
            flags: SecurityFlags::empty(),
        }
    }

    /// A capability holding every defined flag.
    #[must_use]
    pub fn unrestricted() -> Self {
        SecurityCapability {
            flags: SecurityFlags::all(),
        }
    }

    /// The minimal right-to-run capability.
    #[must_use]
    pub fn execution() -> Self {
        SecurityCapability {
            flags: SecurityFlags::EXECUTION,
        }
    }

    /// A capability holding exactly `flags`.
    #[must_use]
    pub fn with_flags(flags: SecurityFlags) -> Self {
        SecurityCapability { flags }
    }

    /// The flags this instance holds.
    #[must_use]
    pub fn flags(&self) -> SecurityFlags {
        self.flags
    }
}

impl fmt::Display for SecurityCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Security({:?})", self.flags)
    }
}

impl Capability for SecurityCapability {
    fn qualified_name(&self) -> &str {
        BuiltinKind::Security.qualified_name()
    }

    fn supports_unrestricted(&self) -> bool {
        true
    }

    fn is_unrestricted(&self) -> bool {
        self.flags == SecurityFlags::all()
    }

    fn is_vacuous(&self) -> bool {
        self.flags.is_empty()
    }

    fn is_subset_of(&self, other: &dyn Capability) -> Result<bool> {
        let other = downcast_arg::<Self>(self, other)?;
        Ok(other.flags.contains(self.flags))
    }

    fn union(&self, other: &dyn Capability) -> Result<CapabilityRc> {
        let other = downcast_arg::<Self>(self, other)?;
        Ok(Arc::new(SecurityCapability {
            flags: self.flags | other.flags,
        }))
    }

    fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>> {
        let other = downcast_arg::<Self>(self, other)?;
        let flags = self.flags & other.flags;
        if flags.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Arc::new(SecurityCapability { flags })))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Capability over reflection on non-public program structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionCapability {
    flags: ReflectionFlags,
}

impl ReflectionCapability {
    /// A capability holding no flags; vacuously satisfied.
    #[must_use]
    pub fn none() -> Self {
        ReflectionCapability {
            flags: ReflectionFlags::empty(),
        }
    }

    /// A capability holding every defined flag.
    #[must_use]
    pub fn unrestricted() -> Self {
        ReflectionCapability {
            flags: ReflectionFlags::all(),
        }
    }

    /// A capability holding exactly `flags`.
    #[must_use]
    pub fn with_flags(flags: ReflectionFlags) -> Self {
        ReflectionCapability { flags }
    }

    /// The flags this instance holds.
    #[must_use]
    pub fn flags(&self) -> ReflectionFlags {
        self.flags
    }
}

impl fmt::Display for ReflectionCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reflection({:?})", self.flags)
    }
}

impl Capability for ReflectionCapability {
    fn qualified_name(&self) -> &str {
        BuiltinKind::Reflection.qualified_name()
    }

    fn supports_unrestricted(&self) -> bool {
        true
    }

    fn is_unrestricted(&self) -> bool {
        self.flags == ReflectionFlags::all()
    }

    fn is_vacuous(&self) -> bool {
        self.flags.is_empty()
    }

    fn is_subset_of(&self, other: &dyn Capability) -> Result<bool> {
        let other = downcast_arg::<Self>(self, other)?;
        Ok(other.flags.contains(self.flags))
    }

    fn union(&self, other: &dyn Capability) -> Result<CapabilityRc> {
        let other = downcast_arg::<Self>(self, other)?;
        Ok(Arc::new(ReflectionCapability {
            flags: self.flags | other.flags,
        }))
    }

    fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>> {
        let other = downcast_arg::<Self>(self, other)?;
        let flags = self.flags & other.flags;
        if flags.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Arc::new(ReflectionCapability { flags })))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Window access levels, ordered from no access to full access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum WindowAccess {
    /// No window access at all.
    NoWindows = 0,
    /// Only sub-windows that cannot spoof system UI.
    SafeSubWindows = 1,
    /// Top-level windows restricted to safe operations.
    SafeTopLevelWindows = 2,
    /// Unrestricted window access.
    AllWindows = 3,
}

/// Clipboard access levels, ordered from no access to full access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum ClipboardAccess {
    /// No clipboard access.
    NoClipboard = 0,
    /// Paste only from the code's own clipboard data.
    OwnClipboard = 1,
    /// Unrestricted clipboard access.
    AllClipboard = 2,
}

/// Capability over window and clipboard interaction.
///
/// Level based: each dimension is an ordered access level, union takes the
/// maximum and intersection the minimum per dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiCapability {
    window: WindowAccess,
    clipboard: ClipboardAccess,
}

impl UiCapability {
    /// A capability granting no UI access; vacuously satisfied.
    #[must_use]
    pub fn none() -> Self {
        UiCapability {
            window: WindowAccess::NoWindows,
            clipboard: ClipboardAccess::NoClipboard,
        }
    }

    /// A capability granting full window and clipboard access.
    #[must_use]
    pub fn unrestricted() -> Self {
        UiCapability {
            window: WindowAccess::AllWindows,
            clipboard: ClipboardAccess::AllClipboard,
        }
    }

    /// Safe top-level windows with own-clipboard paste, the common sandbox level.
    #[must_use]
    pub fn safe_windows() -> Self {
        UiCapability {
            window: WindowAccess::SafeTopLevelWindows,
            clipboard: ClipboardAccess::OwnClipboard,
        }
    }

    /// A capability with the given access levels.
    #[must_use]
    pub fn with_access(window: WindowAccess, clipboard: ClipboardAccess) -> Self {
        UiCapability { window, clipboard }
    }

    /// The window access level.
    #[must_use]
    pub fn window(&self) -> WindowAccess {
        self.window
    }

    /// The clipboard access level.
    #[must_use]
    pub fn clipboard(&self) -> ClipboardAccess {
        self.clipboard
    }
}

impl fmt::Display for UiCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ui(window: {}, clipboard: {})", self.window, self.clipboard)
    }
}

impl Capability for UiCapability {
    fn qualified_name(&self) -> &str {
        BuiltinKind::Ui.qualified_name()
    }

    fn supports_unrestricted(&self) -> bool {
        true
    }

    fn is_unrestricted(&self) -> bool {
        self.window == WindowAccess::AllWindows && self.clipboard == ClipboardAccess::AllClipboard
    }

    fn is_vacuous(&self) -> bool {
        self.window == WindowAccess::NoWindows && self.clipboard == ClipboardAccess::NoClipboard
    }

    fn is_subset_of(&self, other: &dyn Capability) -> Result<bool> {
        let other = downcast_arg::<Self>(self, other)?;
        Ok(self.window <= other.window && self.clipboard <= other.clipboard)
    }

    fn union(&self, other: &dyn Capability) -> Result<CapabilityRc> {
        let other = downcast_arg::<Self>(self, other)?;
        Ok(Arc::new(UiCapability {
            window: self.window.max(other.window),
            clipboard: self.clipboard.max(other.clipboard),
        }))
    }

    fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>> {
        let other = downcast_arg::<Self>(self, other)?;
        let result = UiCapability {
            window: self.window.min(other.window),
            clipboard: self.clipboard.min(other.clipboard),
        };
        if result.is_vacuous() {
            Ok(None)
        } else {
            Ok(Some(Arc::new(result)))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An instance of the capability type behind a built-in kind, holding nothing.
///
/// Used by the token registry to pre-register the built-in types without the
/// caller having to supply instances.
pub(crate) fn empty_instance(kind: BuiltinKind) -> CapabilityRc {
    match kind {
        BuiltinKind::Security => Arc::new(SecurityCapability::none()),
        BuiltinKind::FileIo => Arc::new(FileIoCapability::none()),
        BuiltinKind::Environment => Arc::new(EnvironmentCapability::none()),
        BuiltinKind::Registry => Arc::new(RegistryCapability::none()),
        BuiltinKind::Reflection => Arc::new(ReflectionCapability::none()),
        BuiltinKind::Ui => Arc::new(UiCapability::none()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::EnumCount;

    #[test]
    fn test_builtin_indices_are_contiguous() {
        assert_eq!(BuiltinKind::COUNT, 6);
        assert_eq!(BuiltinKind::from_repr(0), Some(BuiltinKind::Security));
        assert_eq!(BuiltinKind::from_repr(5), Some(BuiltinKind::Ui));
        assert_eq!(BuiltinKind::from_repr(6), None);
    }

    #[test]
    fn test_security_flag_algebra() {
        let exec = SecurityCapability::execution();
        let assert_cap =
            SecurityCapability::with_flags(SecurityFlags::EXECUTION | SecurityFlags::ASSERTION);

        assert!(exec.is_subset_of(&assert_cap).unwrap());
        assert!(!assert_cap.is_subset_of(&exec).unwrap());

        let merged = exec.union(&assert_cap).unwrap();
        assert!(assert_cap.is_subset_of(merged.as_ref()).unwrap());

        let common = assert_cap.intersect(&exec).unwrap().unwrap();
        assert!(common.is_subset_of(&exec).unwrap());
        assert!(exec.is_subset_of(common.as_ref()).unwrap());
    }

    #[test]
    fn test_security_intersect_empty_is_none() {
        let exec = SecurityCapability::execution();
        let assertion = SecurityCapability::with_flags(SecurityFlags::ASSERTION);
        assert!(exec.intersect(&assertion).unwrap().is_none());
    }

    #[test]
    fn test_ui_levels_are_ordered() {
        let none = UiCapability::none();
        let safe = UiCapability::safe_windows();
        let all = UiCapability::unrestricted();

        assert!(none.is_subset_of(&safe).unwrap());
        assert!(safe.is_subset_of(&all).unwrap());
        assert!(!all.is_subset_of(&safe).unwrap());

        let lowered = all.intersect(&safe).unwrap().unwrap();
        assert!(lowered.is_subset_of(&safe).unwrap());
        assert!(safe.is_subset_of(lowered.as_ref()).unwrap());
    }

    #[test]
    fn test_unrestricted_instances_report_it() {
        assert!(SecurityCapability::unrestricted().is_unrestricted());
        assert!(ReflectionCapability::unrestricted().is_unrestricted());
        assert!(UiCapability::unrestricted().is_unrestricted());
        assert!(!SecurityCapability::execution().is_unrestricted());
    }
}
