//! Permission strings and wildcard matching
//!
//! Permissions are flat `resource:action` strings with one level of
//! wildcarding:
//! - `*` grants everything
//! - `resource:*` grants every action on `resource`
//! - `resource:action` grants exactly that action

/// Grants every permission
pub const WILDCARD_PERMISSION: &str = "*";

/// Separates the resource from the action
pub const PERMISSION_SEPARATOR: &str = ":";

/// Parse a comma-separated permission list, trimming each element
///
/// Returns an empty list for empty input. Never fails; format checks are
/// done separately with [`validate_permission_format`].
pub fn parse_permissions(csv: &str) -> Vec<String> {
    if csv.is_empty() {
        return Vec::new();
    }

    csv.split(',').map(|p| p.trim().to_string()).collect()
}

/// Check that a permission is `*`, `resource:*` or `resource:action`
pub fn validate_permission_format(permission: &str) -> bool {
    if permission == WILDCARD_PERMISSION {
        return true;
    }

    let parts: Vec<&str> = permission.split(PERMISSION_SEPARATOR).collect();
    if parts.len() != 2 {
        return false;
    }

    !parts[0].is_empty() && !parts[1].is_empty()
}

/// Build `resource:action` without validating either half
pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}{}{}", resource, PERMISSION_SEPARATOR, action)
}

/// Check whether `granted` satisfies `required`
///
/// Matching is O(|granted|): global wildcard, then exact match, then the
/// resource wildcard. A required permission that does not split into exactly
/// two parts can only be satisfied by the global wildcard.
pub fn check_permission<S: AsRef<str>>(required: &str, granted: &[S]) -> bool {
    if granted.iter().any(|p| p.as_ref() == WILDCARD_PERMISSION) {
        return true;
    }

    if granted.iter().any(|p| p.as_ref() == required) {
        return true;
    }

    let parts: Vec<&str> = required.split(PERMISSION_SEPARATOR).collect();
    if parts.len() == 2 {
        let resource_wildcard = format_permission(parts[0], WILDCARD_PERMISSION);
        return granted.iter().any(|p| p.as_ref() == resource_wildcard);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_permissions() {
        assert_eq!(
            parse_permissions("users:read, products:write ,admin:*"),
            vec!["users:read", "products:write", "admin:*"]
        );
        assert!(parse_permissions("").is_empty());
        assert_eq!(parse_permissions("*"), vec!["*"]);
    }

    #[test]
    fn test_parse_keeps_order_and_blanks() {
        // Blank elements survive parsing and are rejected by format validation
        let perms = parse_permissions("b:x,,a:y");
        assert_eq!(perms, vec!["b:x", "", "a:y"]);
        assert!(!validate_permission_format(&perms[1]));
    }

    #[test]
    fn test_validate_format() {
        assert!(validate_permission_format("*"));
        assert!(validate_permission_format("users:read"));
        assert!(validate_permission_format("users:*"));

        assert!(!validate_permission_format("users"));
        assert!(!validate_permission_format(":"));
        assert!(!validate_permission_format("users:"));
        assert!(!validate_permission_format(":read"));
        assert!(!validate_permission_format(""));
        assert!(!validate_permission_format("a:b:c"));
        assert!(!validate_permission_format(":*"));
    }

    #[test]
    fn test_format_permission() {
        assert_eq!(format_permission("orders", "read"), "orders:read");
        // No validation performed
        assert_eq!(format_permission("", ""), ":");
    }

    #[test]
    fn test_check_global_wildcard() {
        assert!(check_permission("users:read", &["*"]));
        assert!(check_permission("a:b:c", &["*"]));
        assert!(check_permission("anything", &["orders:read", "*"]));
    }

    #[test]
    fn test_check_exact_and_resource_wildcard() {
        assert!(check_permission("users:read", &["users:read"]));
        assert!(check_permission("users:read", &["users:*"]));
        assert!(!check_permission("users:read", &["users:write"]));
        assert!(!check_permission("users:read", &["orders:*"]));
    }

    #[test]
    fn test_check_empty_grants() {
        let none: [&str; 0] = [];
        assert!(!check_permission("users:read", &none));
    }

    #[test]
    fn test_malformed_required_never_matches_resource_wildcard() {
        assert!(!check_permission("a:b:c", &["a:*"]));
        assert!(!check_permission("users", &["users:*"]));
        assert!(!check_permission("", &["users:*", "users:read"]));
    }

    #[test]
    fn test_check_accepts_owned_strings() {
        let granted = vec!["keys:read".to_string(), "roles:*".to_string()];
        assert!(check_permission("roles:delete", &granted));
        assert!(!check_permission("keys:delete", &granted));
    }
}
