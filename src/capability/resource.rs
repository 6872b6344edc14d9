//! Resource-path based built-in capability types.
//!
//! [`FileIoCapability`] and [`RegistryCapability`] express rights over
//! hierarchical resource names via [`PathSet`], a set of root paths with
//! prefix-containment semantics. [`EnvironmentCapability`] uses exact
//! variable-name matching instead, since environment variables have no
//! hierarchy.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::capability::{downcast_arg, BuiltinKind, Capability, CapabilityRc};
use crate::Result;

/// A set of hierarchical resource roots with prefix-containment semantics.
///
/// A path `p` is covered by the set when some root equals `p` or is an
/// ancestor of `p` (`/data` covers `/data/logs` but not `/database`). Paths
/// are stored as given apart from trailing-separator trimming; normalization
/// (case, separators, `..` resolution) is the caller's responsibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSet {
    roots: BTreeSet<String>,
}

impl PathSet {
    /// Creates an empty path set.
    #[must_use]
    pub fn new() -> Self {
        PathSet::default()
    }

    /// Creates a path set from an iterator of root paths.
    pub fn from_roots<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = PathSet::new();
        for root in roots {
            set.insert(root);
        }
        set
    }

    /// Adds a root path, trimming any trailing separator.
    pub fn insert(&mut self, root: impl Into<String>) {
        let mut root = root.into();
        while root.len() > 1 && (root.ends_with('/') || root.ends_with('\\')) {
            root.pop();
        }
        if !root.is_empty() {
            self.roots.insert(root);
        }
    }

    /// Returns true when the set holds no roots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Returns the number of roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Returns true when `path` equals a root or lies underneath one.
    #[must_use]
    pub fn covers(&self, path: &str) -> bool {
        self.roots.iter().any(|root| Self::is_prefix(root, path))
    }

    /// Returns true when every root of `self` is covered by `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &PathSet) -> bool {
        self.roots.iter().all(|root| other.covers(root))
    }

    /// The union of both sets of roots.
    #[must_use]
    pub fn union(&self, other: &PathSet) -> PathSet {
        let mut roots = self.roots.clone();
        roots.extend(other.roots.iter().cloned());
        PathSet { roots }
    }

    /// The intersection: for each pair of roots where one covers the other,
    /// the more specific root survives.
    #[must_use]
    pub fn intersect(&self, other: &PathSet) -> PathSet {
        let mut roots = BTreeSet::new();
        for a in &self.roots {
            for b in &other.roots {
                if Self::is_prefix(a, b) {
                    roots.insert(b.clone());
                } else if Self::is_prefix(b, a) {
                    roots.insert(a.clone());
                }
            }
        }
        PathSet { roots }
    }

    /// Iterates the root paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }

    fn is_prefix(root: &str, path: &str) -> bool {
        if root == path {
            return true;
        }
        match path.strip_prefix(root) {
            Some(rest) => rest.starts_with('/') || rest.starts_with('\\'),
            None => false,
        }
    }
}

impl fmt::Display for PathSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, root) in self.roots.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", root)?;
        }
        write!(f, "]")
    }
}

/// Capability over file and directory access.
///
/// Holds independent read, write and append path sets; the algebra is
/// computed per access kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIoCapability {
    unrestricted: bool,
    read: PathSet,
    write: PathSet,
    append: PathSet,
}

impl FileIoCapability {
    /// A capability granting no file access; vacuously satisfied.
    #[must_use]
    pub fn none() -> Self {
        FileIoCapability::default()
    }

    /// A capability granting access to every path for every access kind.
    #[must_use]
    pub fn unrestricted() -> Self {
        FileIoCapability {
            unrestricted: true,
            ..FileIoCapability::default()
        }
    }

    /// Adds a readable root.
    #[must_use]
    pub fn with_read(mut self, root: impl Into<String>) -> Self {
        self.read.insert(root);
        self
    }

    /// Adds a writable root.
    #[must_use]
    pub fn with_write(mut self, root: impl Into<String>) -> Self {
        self.write.insert(root);
        self
    }

    /// Adds an appendable root.
    #[must_use]
    pub fn with_append(mut self, root: impl Into<String>) -> Self {
        self.append.insert(root);
        self
    }

    /// The readable roots.
    #[must_use]
    pub fn read(&self) -> &PathSet {
        &self.read
    }

    /// The writable roots.
    #[must_use]
    pub fn write(&self) -> &PathSet {
        &self.write
    }

    /// The appendable roots.
    #[must_use]
    pub fn append(&self) -> &PathSet {
        &self.append
    }
}

impl fmt::Display for FileIoCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unrestricted {
            return write!(f, "FileIo(unrestricted)");
        }
        write!(
            f,
            "FileIo(read: {}, write: {}, append: {})",
            self.read, self.write, self.append
        )
    }
}

impl Capability for FileIoCapability {
    fn qualified_name(&self) -> &str {
        BuiltinKind::FileIo.qualified_name()
    }

    fn supports_unrestricted(&self) -> bool {
        true
    }

    fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    fn is_vacuous(&self) -> bool {
        !self.unrestricted
            && self.read.is_empty()
            && self.write.is_empty()
            && self.append.is_empty()
    }

    fn is_subset_of(&self, other: &dyn Capability) -> Result<bool> {
        let other = downcast_arg::<Self>(self, other)?;
        if other.unrestricted {
            return Ok(true);
        }
        if self.unrestricted {
            return Ok(false);
        }
        Ok(self.read.is_subset_of(&other.read)
            && self.write.is_subset_of(&other.write)
            && self.append.is_subset_of(&other.append))
    }

    fn union(&self, other: &dyn Capability) -> Result<CapabilityRc> {
        let other = downcast_arg::<Self>(self, other)?;
        if self.unrestricted || other.unrestricted {
            return Ok(Arc::new(FileIoCapability::unrestricted()));
        }
        Ok(Arc::new(FileIoCapability {
            unrestricted: false,
            read: self.read.union(&other.read),
            write: self.write.union(&other.write),
            append: self.append.union(&other.append),
        }))
    }

    fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>> {
        let other = downcast_arg::<Self>(self, other)?;
        let result = if self.unrestricted {
            other.clone()
        } else if other.unrestricted {
            self.clone()
        } else {
            FileIoCapability {
                unrestricted: false,
                read: self.read.intersect(&other.read),
                write: self.write.intersect(&other.write),
                append: self.append.intersect(&other.append),
            }
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

/// Capability over registry key access.
///
/// Registry keys are hierarchical names, so the path-set semantics of
/// [`FileIoCapability`] carry over with read, write and create access kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryCapability {
    unrestricted: bool,
    read: PathSet,
    write: PathSet,
    create: PathSet,
}

impl RegistryCapability {
    /// A capability granting no registry access; vacuously satisfied.
    #[must_use]
    pub fn none() -> Self {
        RegistryCapability::default()
    }

    /// A capability granting access to every key for every access kind.
    #[must_use]
    pub fn unrestricted() -> Self {
        RegistryCapability {
            unrestricted: true,
            ..RegistryCapability::default()
        }
    }

    /// Adds a readable key root.
    #[must_use]
    pub fn with_read(mut self, root: impl Into<String>) -> Self {
        self.read.insert(root);
        self
    }

    /// Adds a writable key root.
    #[must_use]
    pub fn with_write(mut self, root: impl Into<String>) -> Self {
        self.write.insert(root);
        self
    }

    /// Adds a creatable key root.
    #[must_use]
    pub fn with_create(mut self, root: impl Into<String>) -> Self {
        self.create.insert(root);
        self
    }
}

impl fmt::Display for RegistryCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unrestricted {
            return write!(f, "Registry(unrestricted)");
        }
        write!(
            f,
            "Registry(read: {}, write: {}, create: {})",
            self.read, self.write, self.create
        )
    }
}

impl Capability for RegistryCapability {
    fn qualified_name(&self) -> &str {
        BuiltinKind::Registry.qualified_name()
    }

    fn supports_unrestricted(&self) -> bool {
        true
    }

    fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    fn is_vacuous(&self) -> bool {
        !self.unrestricted
            && self.read.is_empty()
            && self.write.is_empty()
            && self.create.is_empty()
    }

    fn is_subset_of(&self, other: &dyn Capability) -> Result<bool> {
        let other = downcast_arg::<Self>(self, other)?;
        if other.unrestricted {
            return Ok(true);
        }
        if self.unrestricted {
            return Ok(false);
        }
        Ok(self.read.is_subset_of(&other.read)
            && self.write.is_subset_of(&other.write)
            && self.create.is_subset_of(&other.create))
    }

    fn union(&self, other: &dyn Capability) -> Result<CapabilityRc> {
        let other = downcast_arg::<Self>(self, other)?;
        if self.unrestricted || other.unrestricted {
            return Ok(Arc::new(RegistryCapability::unrestricted()));
        }
        Ok(Arc::new(RegistryCapability {
            unrestricted: false,
            read: self.read.union(&other.read),
            write: self.write.union(&other.write),
            create: self.create.union(&other.create),
        }))
    }

    fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>> {
        let other = downcast_arg::<Self>(self, other)?;
        let result = if self.unrestricted {
            other.clone()
        } else if other.unrestricted {
            self.clone()
        } else {
            RegistryCapability {
                unrestricted: false,
                read: self.read.intersect(&other.read),
                write: self.write.intersect(&other.write),
                create: self.create.intersect(&other.create),
            }
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

/// Capability over environment variable access.
///
/// Variables are matched by exact name; there is no hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentCapability {
    unrestricted: bool,
    read: BTreeSet<String>,
    write: BTreeSet<String>,
}

impl EnvironmentCapability {
    /// A capability granting no variable access; vacuously satisfied.
    #[must_use]
    pub fn none() -> Self {
        EnvironmentCapability::default()
    }

    /// A capability granting access to every variable.
    #[must_use]
    pub fn unrestricted() -> Self {
        EnvironmentCapability {
            unrestricted: true,
            ..EnvironmentCapability::default()
        }
    }

    /// Adds a readable variable name.
    #[must_use]
    pub fn with_read(mut self, name: impl Into<String>) -> Self {
        self.read.insert(name.into());
        self
    }

    /// Adds a writable variable name.
    #[must_use]
    pub fn with_write(mut self, name: impl Into<String>) -> Self {
        self.write.insert(name.into());
        self
    }
}

impl fmt::Display for EnvironmentCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unrestricted {
            return write!(f, "Environment(unrestricted)");
        }
        write!(
            f,
            "Environment(read: {:?}, write: {:?})",
            self.read, self.write
        )
    }
}

impl Capability for EnvironmentCapability {
    fn qualified_name(&self) -> &str {
        BuiltinKind::Environment.qualified_name()
    }

    fn supports_unrestricted(&self) -> bool {
        true
    }

    fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    fn is_vacuous(&self) -> bool {
        !self.unrestricted && self.read.is_empty() && self.write.is_empty()
    }

    fn is_subset_of(&self, other: &dyn Capability) -> Result<bool> {
        let other = downcast_arg::<Self>(self, other)?;
        if other.unrestricted {
            return Ok(true);
        }
        if self.unrestricted {
            return Ok(false);
        }
        Ok(self.read.is_subset(&other.read) && self.write.is_subset(&other.write))
    }

    fn union(&self, other: &dyn Capability) -> Result<CapabilityRc> {
        let other = downcast_arg::<Self>(self, other)?;
        if self.unrestricted || other.unrestricted {
            return Ok(Arc::new(EnvironmentCapability::unrestricted()));
        }
        Ok(Arc::new(EnvironmentCapability {
            unrestricted: false,
            read: self.read.union(&other.read).cloned().collect(),
            write: self.write.union(&other.write).cloned().collect(),
        }))
    }

    fn intersect(&self, other: &dyn Capability) -> Result<Option<CapabilityRc>> {
        let other = downcast_arg::<Self>(self, other)?;
        let result = if self.unrestricted {
            other.clone()
        } else if other.unrestricted {
            self.clone()
        } else {
            EnvironmentCapability {
                unrestricted: false,
                read: self.read.intersection(&other.read).cloned().collect(),
                write: self.write.intersection(&other.write).cloned().collect(),
            }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pathset_prefix_containment() {
        let set = PathSet::from_roots(["/data", "/var/log/"]);

        assert!(set.covers("/data"));
        assert!(set.covers("/data/reports/q1.csv"));
        assert!(set.covers("/var/log"));
        assert!(!set.covers("/database"));
        assert!(!set.covers("/var"));
    }

    #[test]
    fn test_pathset_subset_and_union() {
        let narrow = PathSet::from_roots(["/data/reports"]);
        let wide = PathSet::from_roots(["/data"]);

        assert!(narrow.is_subset_of(&wide));
        assert!(!wide.is_subset_of(&narrow));

        let merged = narrow.union(&wide);
        assert!(wide.is_subset_of(&merged));
        assert!(merged.covers("/data/other"));
    }

    #[test]
    fn test_pathset_intersect_keeps_more_specific() {
        let a = PathSet::from_roots(["/data"]);
        let b = PathSet::from_roots(["/data/reports", "/tmp"]);

        let common = a.intersect(&b);
        assert!(common.covers("/data/reports/q1.csv"));
        assert!(!common.covers("/data/other"));
        assert!(!common.covers("/tmp"));
    }

    #[test]
    fn test_fileio_subset_per_access_kind() {
        let reader = FileIoCapability::none().with_read("/data");
        let writer = FileIoCapability::none().with_read("/data").with_write("/data");

        assert!(reader.is_subset_of(&writer).unwrap());
        assert!(!writer.is_subset_of(&reader).unwrap());
        assert!(reader.is_subset_of(&FileIoCapability::unrestricted()).unwrap());
    }

    #[test]
    fn test_fileio_intersect_vacuous_is_none() {
        let a = FileIoCapability::none().with_read("/data");
        let b = FileIoCapability::none().with_read("/tmp");
        assert!(a.intersect(&b).unwrap().is_none());
    }

    #[test]
    fn test_environment_exact_name_matching() {
        let narrow = EnvironmentCapability::none().with_read("PATH");
        let wide = EnvironmentCapability::none().with_read("PATH").with_read("HOME");

        assert!(narrow.is_subset_of(&wide).unwrap());
        assert!(!wide.is_subset_of(&narrow).unwrap());

        let common = wide.intersect(&narrow).unwrap().unwrap();
        assert!(common.is_subset_of(&narrow).unwrap());
    }
}
