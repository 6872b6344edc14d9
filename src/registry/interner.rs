use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use strum::{EnumCount, IntoEnumIterator};

use crate::capability::{empty_instance, BuiltinKind, Capability};
use crate::registry::{CapToken, TokenClass, TokenDescriptor};
use crate::{Error, Result};

/// Append-only interning table, guarded by the registry's coarse lock.
struct TokenTable {
    /// Capability runtime type to its interned token
    by_type: HashMap<TypeId, CapToken>,
    /// Next index to hand out; starts just above the reserved built-in range
    next_index: u32,
}

/// Interns capability types into stable small-integer tokens.
///
/// The registry maps every capability *type* (identified by its exact runtime
/// type, never by name) to a [`CapToken`] carrying a process-stable index and a
/// classification. The mapping is a pure function after first resolution: the
/// first caller for a type pays the classification cost, subsequent callers
/// get the memoized token.
///
/// # Index Allocation
///
/// Built-in types occupy the reserved range `0..BuiltinKind::COUNT`, assigned
/// at construction; all other types are assigned sequentially above that
/// range. An index is never reused while the registry lives.
///
/// # Concurrency Design
///
/// Resolution happens on every demand and must not contend under read-mostly
/// load, so the registry is split into two tiers:
///
/// - A lock-free read cache keyed by the type's own [`TypeId`] (`DashMap`),
///   consulted first on every resolution
/// - The append-only interning table behind one coarse [`Mutex`], consulted on
///   a cache miss and written back to the cache afterwards
///
/// A token's classification is computed under the lock before the token is
/// published, so no reader can observe "index valid, classification pending".
/// Reverse lookup for diagnostics uses an index-ordered concurrent skip list.
///
/// # Ownership
///
/// The registry is not a process-wide singleton: it is owned by a
/// [`crate::SecurityContext`] and passed by shared reference to every
/// capability set and walk. This preserves the stable-index contract without
/// hidden global state.
///
/// # Examples
///
/// ```rust
/// use caswalk::capability::{BuiltinKind, SecurityCapability};
/// use caswalk::TokenRegistry;
///
/// let registry = TokenRegistry::new();
///
/// // Built-ins resolve without touching the interning table
/// let builtin = registry.resolve_builtin(BuiltinKind::Security);
/// assert_eq!(builtin.index(), 0);
///
/// // The general path hands back the same token for the same type
/// let cap = SecurityCapability::execution();
/// let token = registry.resolve(&cap)?;
/// assert_eq!(token.index(), builtin.index());
/// # Ok::<(), caswalk::Error>(())
/// ```
pub struct TokenRegistry {
    /// Lock-free fast path keyed by the capability type's runtime handle
    cache: DashMap<TypeId, CapToken>,
    /// Append-only interning table behind the coarse lock
    table: Mutex<TokenTable>,
    /// Index-ordered reverse lookup for diagnostics
    by_index: SkipMap<u32, TokenDescriptor>,
}

impl TokenRegistry {
    /// Creates a registry with the built-in capability types pre-registered.
    ///
    /// The built-ins occupy indices `0..BuiltinKind::COUNT` and are resolvable
    /// through both [`TokenRegistry::resolve`] and the
    /// [`TokenRegistry::resolve_builtin`] fast path immediately.
    #[must_use]
    pub fn new() -> Self {
        let cache = DashMap::new();
        let by_index = SkipMap::new();
        let mut by_type = HashMap::new();

        for kind in BuiltinKind::iter() {
            let instance = empty_instance(kind);
            let token = CapToken::new(kind as u32, TokenClass::BuiltIn);
            let type_id = instance.as_any().type_id();

            by_type.insert(type_id, token);
            cache.insert(type_id, token);
            by_index.insert(
                kind as u32,
                TokenDescriptor {
                    token,
                    qualified_name: kind.qualified_name().to_string(),
                },
            );
        }

        TokenRegistry {
            cache,
            by_index,
            table: Mutex::new(TokenTable {
                by_type,
                next_index: BuiltinKind::COUNT as u32,
            }),
        }
    }

    /// Resolves a capability type to its interned token.
    ///
    /// Deterministic and memoized: resolving the same type any number of
    /// times, from any thread, yields tokens with the same index. The first
    /// resolution classifies the type by asking
    /// [`Capability::supports_unrestricted`].
    ///
    /// # Errors
    /// [`Error::LockError`] if the interning lock was poisoned;
    /// [`Error::UnresolvedCapability`] if the token index space is exhausted.
    pub fn resolve(&self, capability: &dyn Capability) -> Result<CapToken> {
        let type_id = capability.as_any().type_id();

        if let Some(token) = self.cache.get(&type_id) {
            return Ok(*token);
        }

        let token = {
            let mut table = self.table.lock().map_err(|_| Error::LockError)?;
            match table.by_type.get(&type_id) {
                Some(token) => *token,
                None => {
                    let index = table.next_index;
                    if index == u32::MAX {
                        return Err(Error::UnresolvedCapability(
                            capability.qualified_name().to_string(),
                        ));
                    }
                    table.next_index += 1;

                    let class = if capability.supports_unrestricted() {
                        TokenClass::AllOrNothing
                    } else {
                        TokenClass::Normal
                    };
                    let token = CapToken::new(index, class);

                    table.by_type.insert(type_id, token);
                    self.by_index.insert(
                        index,
                        TokenDescriptor {
                            token,
                            qualified_name: capability.qualified_name().to_string(),
                        },
                    );
                    token
                }
            }
        };

        self.cache.insert(type_id, token);
        Ok(token)
    }

    /// Resolves an optional capability, passing `None` through.
    ///
    /// Convenience for call sites where the capability itself is optional;
    /// resolving nothing is not an error.
    ///
    /// # Errors
    /// Same as [`TokenRegistry::resolve`].
    pub fn resolve_opt(&self, capability: Option<&dyn Capability>) -> Result<Option<CapToken>> {
        match capability {
            Some(capability) => Ok(Some(self.resolve(capability)?)),
            None => Ok(None),
        }
    }

    /// Resolves a built-in kind to its reserved token.
    ///
    /// A pure function over the reserved low index range: it bypasses both
    /// cache tiers and is safe to call before anything else has touched the
    /// registry.
    #[must_use]
    pub fn resolve_builtin(&self, kind: BuiltinKind) -> CapToken {
        CapToken::new(kind as u32, TokenClass::BuiltIn)
    }

    /// Reverse lookup of an interned type by index, for diagnostics.
    #[must_use]
    pub fn find_by_index(&self, index: u32) -> Option<TokenDescriptor> {
        self.by_index.get(&index).map(|entry| entry.value().clone())
    }

    /// The number of capability types interned so far, built-ins included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// Returns true if only the built-in range is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_index.len() == BuiltinKind::COUNT
    }

    /// Renders the qualified name behind `index`, falling back to the bare
    /// index when the type is unknown.
    ///
    /// Diagnostics only; degrades gracefully instead of failing.
    #[must_use]
    pub fn describe_index(&self, index: u32) -> String {
        match self.find_by_index(index) {
            Some(descriptor) => descriptor.qualified_name,
            None => format!("capability #{index}"),
        }
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        TokenRegistry::new()
    }
}

impl fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("interned", &self.by_index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        downcast_arg, CapabilityRc, FileIoCapability, SecurityCapability, UiCapability,
    };
    use std::any::Any;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct NetCapability;

    impl fmt::Display for NetCapability {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Net")
        }
    }

    impl Capability for NetCapability {
        fn qualified_name(&self) -> &str {
            "test::NetCapability"
        }
        fn supports_unrestricted(&self) -> bool {
            true
        }
        fn is_unrestricted(&self) -> bool {
            false
        }
        fn is_vacuous(&self) -> bool {
            false
        }
        fn is_subset_of(&self, other: &dyn Capability) -> Result<bool> {
            downcast_arg::<Self>(self, other)?;
            Ok(true)
        }
        fn union(&self, other: &dyn Capability) -> Result<CapabilityRc> {
            downcast_arg::<Self>(self, other)?;
            Ok(Arc::new(NetCapability))
        }
        fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>> {
            downcast_arg::<Self>(self, other)?;
            Ok(Some(Arc::new(NetCapability)))
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_builtins_occupy_reserved_range() {
        let registry = TokenRegistry::new();

        for kind in BuiltinKind::iter() {
            let token = registry.resolve_builtin(kind);
            assert_eq!(token.index(), kind as u32);
            assert_eq!(token.class(), TokenClass::BuiltIn);

            let descriptor = registry.find_by_index(kind as u32).unwrap();
            assert_eq!(descriptor.qualified_name, kind.qualified_name());
        }
    }

    #[test]
    fn test_first_dynamic_type_lands_above_builtins() {
        let registry = TokenRegistry::new();

        let token = registry.resolve(&NetCapability).unwrap();
        assert_eq!(token.index(), BuiltinKind::COUNT as u32);
        assert_eq!(token.class(), TokenClass::AllOrNothing);
    }

    #[test]
    fn test_resolution_is_memoized() {
        let registry = TokenRegistry::new();

        let first = registry.resolve(&NetCapability).unwrap();
        let second = registry.resolve(&NetCapability).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), BuiltinKind::COUNT + 1);
    }

    #[test]
    fn test_general_path_agrees_with_builtin_fast_path() {
        let registry = TokenRegistry::new();

        let general = registry.resolve(&SecurityCapability::execution()).unwrap();
        let fast = registry.resolve_builtin(BuiltinKind::Security);
        assert_eq!(general.index(), fast.index());

        let general = registry
            .resolve(&FileIoCapability::none().with_read("/data"))
            .unwrap();
        assert_eq!(general.index(), BuiltinKind::FileIo as u32);
    }

    #[test]
    fn test_resolve_opt_passes_none_through() {
        let registry = TokenRegistry::new();

        assert!(registry.resolve_opt(None).unwrap().is_none());
        let ui = UiCapability::safe_windows();
        assert!(registry.resolve_opt(Some(&ui)).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_resolution_yields_one_index() {
        let registry = Arc::new(TokenRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve(&NetCapability).unwrap().index())
            })
            .collect();

        let indices: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(indices.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.len(), BuiltinKind::COUNT + 1);
    }

    #[test]
    fn test_describe_index_degrades_gracefully() {
        let registry = TokenRegistry::new();
        assert_eq!(
            registry.describe_index(0),
            BuiltinKind::Security.qualified_name()
        );
        assert_eq!(registry.describe_index(999), "capability #999");
    }
}
