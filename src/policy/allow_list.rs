//! The fixed set of module names a sandbox instance permits.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Immutable, cheaply cloned set of permitted module names.
///
/// An entry permits the module itself and every dotted submodule below it,
/// so `oci` also permits `oci.object_storage`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    modules: Arc<BTreeSet<String>>,
}

impl AllowList {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: Arc::new(modules.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether `module` is an entry or a submodule of one.
    pub fn permits(&self, module: &str) -> bool {
        if self.modules.contains(module) {
            return true;
        }
        let mut prefix = module;
        while let Some((parent, _)) = prefix.rsplit_once('.') {
            if parent.is_empty() {
                return false;
            }
            if self.modules.contains(parent) {
                return true;
            }
            prefix = parent;
        }
        false
    }

    /// Entries in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.modules.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modules.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_submodule_matches() {
        let allow = AllowList::new(["json", "oci"]);
        assert!(allow.permits("json"));
        assert!(allow.permits("oci.object_storage"));
        assert!(allow.permits("oci.core.models"));
        assert!(!allow.permits("ocicli"));
        assert!(!allow.permits("os"));
        assert!(!allow.permits("jsonx.json"));
    }

    #[test]
    fn test_relative_names_never_match() {
        let allow = AllowList::new(["pkg"]);
        assert!(!allow.permits(".pkg"));
        assert!(!allow.permits("..pkg"));
        assert!(!allow.permits("<relative>"));
    }

    #[test]
    fn test_names_are_sorted() {
        let allow = AllowList::new(["operator", "json", "math", "json"]);
        assert_eq!(allow.names(), vec!["json", "math", "operator"]);
        assert_eq!(allow.len(), 3);
    }
}
