//! Config version comparison.

use semver::Version;

/// Parse `"2"`, `"2.1"`, `"v2.1.0"` and full semver strings.
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }
    let mut parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&parts.join(".")).ok()
}

/// True when `stored` predates `current`.
///
/// A missing or unparseable stored version counts as older than any valid
/// current version.
pub fn is_older(stored: &str, current: &str) -> bool {
    match (parse_lenient(stored), parse_lenient(current)) {
        (Some(stored), Some(current)) => stored < current,
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_versions_are_padded() {
        assert_eq!(parse_lenient("2"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_lenient("v1.4"), Some(Version::new(1, 4, 0)));
        assert_eq!(parse_lenient("garbage"), None);
    }

    #[test]
    fn test_ordering() {
        assert!(is_older("1.0.0", "2.0.0"));
        assert!(is_older("1.9", "1.10.0"));
        assert!(!is_older("2.0.0", "2.0.0"));
        assert!(!is_older("3.0.0", "2.0.0"));
    }

    #[test]
    fn test_missing_stored_version_is_oldest() {
        assert!(is_older("", "1.0.0"));
        assert!(!is_older("", "not-a-version"));
    }
}
