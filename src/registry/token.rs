use std::fmt;

/// Classification of an interned capability type.
///
/// The classification decides how a type interacts with unrestricted
/// capability sets and where its token index was allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum TokenClass {
    /// A type without "all of it" semantics; never covered implicitly by an
    /// unrestricted set, must always appear as an explicit entry.
    Normal,
    /// A type with unrestricted semantics; covered implicitly by an
    /// unrestricted capability set.
    AllOrNothing,
    /// One of the built-in types with a reserved low index. Built-ins always
    /// support unrestricted semantics.
    BuiltIn,
}

impl TokenClass {
    /// Returns true if an unrestricted capability set implicitly covers
    /// capabilities of this classification.
    #[must_use]
    pub fn covered_by_unrestricted(&self) -> bool {
        matches!(self, TokenClass::AllOrNothing | TokenClass::BuiltIn)
    }
}

/// The interned identity of a capability type.
///
/// A token pairs the type's stable small-integer index with its
/// classification. Tokens are lightweight value handles: everything outside
/// the registry holds a by-value copy, and an index is assigned once and
/// never reused while the owning registry lives.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapToken {
    index: u32,
    class: TokenClass,
}

impl CapToken {
    /// Creates a token from an index and classification.
    #[must_use]
    pub(crate) fn new(index: u32, class: TokenClass) -> Self {
        CapToken { index, class }
    }

    /// The sparse-set index of the capability type.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The classification of the capability type.
    #[must_use]
    pub fn class(&self) -> TokenClass {
        self.class
    }

    /// Returns true if an unrestricted capability set implicitly covers this
    /// token's capability type.
    #[must_use]
    pub fn covered_by_unrestricted(&self) -> bool {
        self.class.covered_by_unrestricted()
    }
}

impl fmt::Debug for CapToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapToken({}, {})", self.index, self.class)
    }
}

impl fmt::Display for CapToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Reverse-lookup record for an interned capability type.
///
/// Produced by [`crate::TokenRegistry::find_by_index`] for diagnostics and for
/// re-deriving a classification when an instance is handled without its static
/// type available.
#[derive(Debug, Clone)]
pub struct TokenDescriptor {
    /// The interned token.
    pub token: CapToken,
    /// The capability type's qualified name, for diagnostics.
    pub qualified_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_a_lightweight_value() {
        let token = CapToken::new(6, TokenClass::AllOrNothing);
        let copy = token;

        assert_eq!(token, copy);
        assert_eq!(copy.index(), 6);
        assert_eq!(copy.class(), TokenClass::AllOrNothing);
    }

    #[test]
    fn test_unrestricted_coverage_by_class() {
        assert!(TokenClass::AllOrNothing.covered_by_unrestricted());
        assert!(TokenClass::BuiltIn.covered_by_unrestricted());
        assert!(!TokenClass::Normal.covered_by_unrestricted());
    }

    #[test]
    fn test_token_ordering_follows_index() {
        let a = CapToken::new(1, TokenClass::BuiltIn);
        let b = CapToken::new(2, TokenClass::Normal);
        assert!(a < b);
    }
}
