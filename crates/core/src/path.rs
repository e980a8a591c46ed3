//! Repository-path helpers: separator-aware ancestry checks used by fold
//! (spec.md §4.5) and lock verification (spec.md §4.8).

/// True if `child` is a proper descendant of `parent` under `/`-separated
/// repository paths (not filesystem paths). `parent` and `child` are always
/// absolute (`/`-rooted); `is_child("/a", "/ab")` is false — the comparison
/// is segment-aware, not a byte prefix check.
pub fn is_child(parent: &str, child: &str) -> bool {
    if parent == child {
        return false;
    }
    let parent = parent.trim_end_matches('/');
    match child.strip_prefix(parent) {
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// True if `a == b` or `is_child(a, b)`.
pub fn is_self_or_child(parent: &str, child: &str) -> bool {
    parent == child || is_child(parent, child)
}

/// Splits a path into `(parent, basename)`; the root `/` has no parent.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let idx = trimmed.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &trimmed[..idx] };
    Some((parent, &trimmed[idx + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_detection_is_segment_aware() {
        assert!(is_child("/d", "/d/f"));
        assert!(is_child("/d", "/d/f/g"));
        assert!(!is_child("/d", "/dd"));
        assert!(!is_child("/d", "/d"));
        assert!(is_child("/", "/a"));
    }

    #[test]
    fn split_parent_basic() {
        assert_eq!(split_parent("/a/b"), Some(("/a", "b")));
        assert_eq!(split_parent("/a"), Some(("/", "a")));
        assert_eq!(split_parent("/"), None);
    }
}
