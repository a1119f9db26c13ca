//! Root-scoped routing rules
//!
//! A root is a project directory whose C and C++ documents are routed to
//! the server. Each root expands to one rule per managed language tag, all
//! sharing the glob `<dir>/**/*`. Roots are identified by that glob, so the
//! directory is normalised to end with exactly one separator first.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{RoutingRule, FILE_SCHEME, MANAGED_LANGUAGES};

/// Glob for everything beneath `dir`.
pub fn root_glob(dir: &str) -> String {
    let trimmed = dir.trim_end_matches(['/', '\\']);
    format!("{trimmed}/**/*")
}

/// Changes needed to move the live rules to a desired set of roots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootDelta {
    /// Globs to add, in caller order
    pub to_add: Vec<String>,
    /// Globs to remove, unordered
    pub to_remove: HashSet<String>,
}

impl RootDelta {
    /// True when applying the delta would not change anything
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// The live routing rules consumed by document selection.
#[derive(Debug, Default)]
pub struct RootSet {
    rules: RwLock<Vec<RoutingRule>>,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the set with rules that are not root-managed (or are)
    pub fn with_rules(rules: Vec<RoutingRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Snapshot of all live rules
    pub fn rules(&self) -> Vec<RoutingRule> {
        self.rules.read().clone()
    }

    /// Globs of the root-managed rules currently live
    pub fn managed_globs(&self) -> HashSet<String> {
        self.rules
            .read()
            .iter()
            .filter(|rule| rule.is_managed())
            .map(|rule| rule.pattern.clone())
            .collect()
    }

    /// Compute the delta between the live rules and `desired` roots.
    ///
    /// Does not mutate anything; see [`RootSet::apply`].
    pub fn reconcile<S: AsRef<str>>(&self, desired: &[S]) -> RootDelta {
        let mut remaining = self.managed_globs();
        let mut seen = HashSet::new();
        let mut to_add = Vec::new();

        for root in desired {
            let glob = root_glob(root.as_ref());
            if !seen.insert(glob.clone()) {
                continue;
            }
            if !remaining.remove(&glob) {
                to_add.push(glob);
            }
        }

        RootDelta {
            to_add,
            to_remove: remaining,
        }
    }

    /// Apply a delta, adding and removing rules in language-tag pairs
    pub fn apply(&self, delta: &RootDelta) {
        let mut rules = self.rules.write();

        if !delta.to_remove.is_empty() {
            rules.retain(|rule| !(rule.is_managed() && delta.to_remove.contains(&rule.pattern)));
        }

        for glob in &delta.to_add {
            for language in MANAGED_LANGUAGES {
                rules.push(RoutingRule::new(FILE_SCHEME, language, glob.clone()));
            }
        }

        debug!(
            added = delta.to_add.len(),
            removed = delta.to_remove.len(),
            total = rules.len(),
            "Applied root delta"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_root_glob_normalises_trailing_separator() {
        assert_eq!(root_glob("/a/b"), "/a/b/**/*");
        assert_eq!(root_glob("/a/b/"), "/a/b/**/*");
        assert_eq!(root_glob("/a/b//"), "/a/b/**/*");
        assert_eq!(root_glob("C:\\src\\"), "C:\\src/**/*");
    }

    #[test]
    fn test_reconcile_on_empty_set_adds_in_order() {
        let roots = RootSet::new();
        let delta = roots.reconcile(&["/b", "/a"]);
        assert_eq!(delta.to_add, vec!["/b/**/*", "/a/**/*"]);
        assert!(delta.to_remove.is_empty());
    }

    #[test]
    fn test_apply_adds_one_rule_per_managed_language() {
        let roots = RootSet::new();
        let delta = roots.reconcile(&["/proj"]);
        roots.apply(&delta);

        let rules = roots.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], RoutingRule::new("file", "c", "/proj/**/*"));
        assert_eq!(rules[1], RoutingRule::new("file", "cpp", "/proj/**/*"));
    }

    #[test]
    fn test_empty_input_clears_managed_rules_only() {
        let unmanaged = RoutingRule::new("file", "objective-c", "/objc/**/*");
        let roots = RootSet::with_rules(vec![unmanaged.clone()]);
        roots.apply(&roots.reconcile(&["/proj"]));

        let empty: [&str; 0] = [];
        let delta = roots.reconcile(&empty);
        assert!(delta.to_add.is_empty());
        assert_eq!(delta.to_remove, HashSet::from(["/proj/**/*".to_string()]));

        roots.apply(&delta);
        assert_eq!(roots.rules(), vec![unmanaged]);
    }

    #[test]
    fn test_trailing_slash_variants_are_the_same_root() {
        let roots = RootSet::new();
        roots.apply(&roots.reconcile(&["/a/b"]));
        assert!(roots.reconcile(&["/a/b/"]).is_empty());
    }

    #[test]
    fn test_duplicate_roots_are_added_once() {
        let roots = RootSet::new();
        let delta = roots.reconcile(&["/x", "/x/", "/x"]);
        assert_eq!(delta.to_add, vec!["/x/**/*"]);
    }

    fn arb_roots() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("(/[a-c]{1,2}){1,3}/?", 0..6)
    }

    proptest! {
        #[test]
        fn prop_reconcile_is_idempotent(desired in arb_roots()) {
            let roots = RootSet::new();
            roots.apply(&roots.reconcile(&desired));
            prop_assert!(roots.reconcile(&desired).is_empty());
        }

        #[test]
        fn prop_reconcile_converges_to_last_input(first in arb_roots(), second in arb_roots()) {
            let roots = RootSet::new();
            roots.apply(&roots.reconcile(&first));
            roots.apply(&roots.reconcile(&second));

            let expected: HashSet<String> = second.iter().map(|d| root_glob(d)).collect();
            prop_assert_eq!(roots.managed_globs(), expected.clone());
            prop_assert_eq!(roots.rules().len(), expected.len() * MANAGED_LANGUAGES.len());
        }
    }
}
