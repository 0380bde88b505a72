//! Wildcard permission matching
//!
//! Permissions are dotted strings (`kick.player`, `chat.color.red`). A granted
//! set authorizes a permission when it contains:
//! - the permission itself,
//! - the global wildcard `*`, or
//! - `<prefix>.*` for any strict dotted prefix of the permission
//!   (`chat.*` and `chat.color.*` both cover `chat.color.red`).
//!
//! Matching is case-sensitive and has no side effects.

use std::collections::HashSet;

/// Global wildcard token, grants every permission
pub const GLOBAL_WILDCARD: &str = "*";

/// Suffix that turns a dotted prefix into a subtree wildcard
pub const WILDCARD_SUFFIX: &str = ".*";

/// Check whether `granted` authorizes `permission`
///
/// An empty permission is only matched by the global wildcard.
pub fn matches(granted: &HashSet<String>, permission: &str) -> bool {
    if granted.is_empty() {
        return false;
    }

    if granted.contains(GLOBAL_WILDCARD) {
        return true;
    }

    if permission.is_empty() {
        return false;
    }

    if granted.contains(permission) {
        return true;
    }

    // Strict prefixes only: "a.b.*" covers "a.b.c" but not "a.b"
    let mut candidate = String::with_capacity(permission.len() + WILDCARD_SUFFIX.len());
    for (idx, _) in permission.match_indices('.') {
        candidate.clear();
        candidate.push_str(&permission[..idx]);
        candidate.push_str(WILDCARD_SUFFIX);
        if granted.contains(candidate.as_str()) {
            return true;
        }
    }

    false
}

/// Check whether a granted token is a wildcard (`*` or `<prefix>.*`)
pub fn is_wildcard(token: &str) -> bool {
    token == GLOBAL_WILDCARD || token.ends_with(WILDCARD_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(perms: &[&str]) -> HashSet<String> {
        perms.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        let granted = set(&["kick.player", "ping"]);

        assert!(matches(&granted, "kick.player"));
        assert!(matches(&granted, "ping"));
        assert!(!matches(&granted, "kick.all"));
    }

    #[test]
    fn test_subtree_wildcard_is_multi_level() {
        let granted = set(&["a.b.*"]);

        assert!(matches(&granted, "a.b.c"));
        assert!(matches(&granted, "a.b.c.d"));
        assert!(!matches(&granted, "a.b"));
        assert!(!matches(&granted, "a.c"));
        assert!(!matches(&granted, "a"));
    }

    #[test]
    fn test_top_level_wildcard() {
        let granted = set(&["a.*"]);

        assert!(matches(&granted, "a.b"));
        assert!(matches(&granted, "a.b.c"));
        assert!(!matches(&granted, "ab.c"));
    }

    #[test]
    fn test_global_wildcard() {
        let granted = set(&["*"]);

        assert!(matches(&granted, "anything.at.all"));
        assert!(matches(&granted, "ping"));
        assert!(matches(&granted, ""));
    }

    #[test]
    fn test_undotted_permission_ignores_subtree_wildcards() {
        let granted = set(&["ping.*"]);
        assert!(!matches(&granted, "ping"));
    }

    #[test]
    fn test_empty_permission_and_empty_set() {
        assert!(!matches(&set(&["", "a.*"]), ""));
        assert!(!matches(&HashSet::new(), "a.b"));
        assert!(!matches(&HashSet::new(), ""));
    }

    #[test]
    fn test_case_sensitive() {
        let granted = set(&["Kick.*"]);
        assert!(!matches(&granted, "kick.player"));
        assert!(matches(&granted, "Kick.player"));
    }

    #[test]
    fn test_is_wildcard() {
        assert!(is_wildcard("*"));
        assert!(is_wildcard("kick.*"));
        assert!(!is_wildcard("kick.player"));
    }
}
