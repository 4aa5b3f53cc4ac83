//! Node admission predicate over allow/deny lists.

use std::collections::HashSet;

use crate::config::SecurityConfig;

/// Outcome of [`NodeFilter::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

/// Immutable admission configuration.
///
/// The denylist is checked first and always wins. With `require_allowlist`
/// the node must be allowlisted; without it the allowlist does not restrict.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    allowlist: HashSet<String>,
    denylist: HashSet<String>,
    require_allowlist: bool,
}

impl NodeFilter {
    pub fn new<A, D>(allowlist: A, denylist: D, require_allowlist: bool) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            allowlist: allowlist.into_iter().map(Into::into).collect(),
            denylist: denylist.into_iter().map(Into::into).collect(),
            require_allowlist,
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        Self::new(
            security.node_allowlist.iter().cloned(),
            security.node_denylist.iter().cloned(),
            security.require_allowlist,
        )
    }

    pub fn admit(&self, node_id: &str) -> Admission {
        if self.denylist.contains(node_id) {
            return Admission::Denied;
        }
        if self.require_allowlist && !self.allowlist.contains(node_id) {
            return Admission::Denied;
        }
        Admission::Allowed
    }

    /// True when some node could ever be denied.
    pub fn is_active(&self) -> bool {
        self.require_allowlist || !self.denylist.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_allows_everyone() {
        let filter = NodeFilter::default();
        assert_eq!(filter.admit("!abc"), Admission::Allowed);
        assert!(!filter.is_active());
    }

    #[test]
    fn denylist_wins_over_allowlist() {
        let filter = NodeFilter::new(["!both"], ["!both"], true);
        assert_eq!(filter.admit("!both"), Admission::Denied);

        let filter = NodeFilter::new(["!both"], ["!both"], false);
        assert_eq!(filter.admit("!both"), Admission::Denied);
    }

    #[test]
    fn require_allowlist_denies_unknown_nodes() {
        let filter = NodeFilter::new(["!friend"], Vec::<String>::new(), true);
        assert_eq!(filter.admit("!friend"), Admission::Allowed);
        assert_eq!(filter.admit("!stranger"), Admission::Denied);
    }

    #[test]
    fn allowlist_without_requirement_does_not_restrict() {
        let filter = NodeFilter::new(["!friend"], Vec::<String>::new(), false);
        assert_eq!(filter.admit("!stranger"), Admission::Allowed);
    }

    #[test]
    fn require_allowlist_with_empty_list_denies_all() {
        let filter = NodeFilter::new(Vec::<String>::new(), Vec::<String>::new(), true);
        assert_eq!(filter.admit("!anyone"), Admission::Denied);
        assert!(filter.is_active());
    }
}
