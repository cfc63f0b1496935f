//! Group allow-listing and GitLab access level names.

use crate::{ConnectorError, ConnectorResult};

/// Keeps the entries of `given` that appear in `required`, in `given` order.
#[must_use]
pub fn filter(given: &[String], required: &[String]) -> Vec<String> {
    given
        .iter()
        .filter(|group| required.contains(group))
        .cloned()
        .collect()
}

/// Applies the allow-list to the groups resolved for `username`.
///
/// With an allow-list the result is the intersection and an empty
/// intersection is a [`ConnectorError::GroupPolicyViolation`]. Without one
/// the groups are returned as resolved when the groups scope was requested,
/// and dropped otherwise.
pub fn enforce_allowed(
    username: &str,
    groups: Vec<String>,
    allowed: &[String],
    groups_scope: bool,
) -> ConnectorResult<Vec<String>> {
    if !allowed.is_empty() {
        let filtered = filter(&groups, allowed);
        if filtered.is_empty() {
            tracing::warn!(username, "user is not in any of the required groups");
            return Err(ConnectorError::group_policy(username));
        }
        return Ok(filtered);
    }
    if groups_scope {
        Ok(groups)
    } else {
        Ok(Vec::new())
    }
}

/// Name of a GitLab numeric access level.
#[must_use]
pub fn access_level_role(level: u32) -> Option<&'static str> {
    match level {
        10 => Some("guest"),
        20 => Some("reporter"),
        30 => Some("developer"),
        40 => Some("maintainer"),
        50 => Some("owner"),
        60 => Some("admin"),
        _ => None,
    }
}

/// `"<group>:<role>"`.
#[must_use]
pub fn with_role(group: &str, role: &str) -> String {
    format!("{group}:{role}")
}
