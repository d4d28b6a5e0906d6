//! Dot-joined paths ("keys") addressing values in the store.
//!
//! The root has the empty path, and a child's path is always
//! `parent + "." + name`. List placeholders use `#` in place of an index
//! (`users.#.name`).

/// The placeholder segment standing for "any index".
pub const PLACEHOLDER: &str = "#";

/// Join a property name onto a parent path.
pub fn join(parent: &str, prop: &str) -> String {
    if parent.is_empty() {
        prop.to_string()
    } else {
        format!("{parent}.{prop}")
    }
}

/// Split a path into its parent path and last property.
pub fn split_last(path: &str) -> (&str, &str) {
    path.rsplit_once('.').unwrap_or(("", path))
}

/// Iterate the path's segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Largest array length, as in JavaScript (`2^32 - 1`).
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Whether a property name is an array index: a decimal without leading
/// zeros below [`MAX_ARRAY_LENGTH`].
pub fn is_index(prop: &str) -> bool {
    parse_index(prop).is_some()
}

/// Parse an array index.
pub fn parse_index(prop: &str) -> Option<usize> {
    let digits = !prop.is_empty() && prop.bytes().all(|b| b.is_ascii_digit());
    if !digits || (prop.len() > 1 && prop.starts_with('0')) {
        return None;
    }
    prop.parse().ok().filter(|&i| i < MAX_ARRAY_LENGTH)
}

/// A valid array length: a non-negative integer no larger than
/// [`MAX_ARRAY_LENGTH`].
pub fn array_length(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n <= MAX_ARRAY_LENGTH as f64).then_some(n as usize)
}

/// `list.#`: the placeholder key for the items of the list at `path`.
pub fn placeholder_of(path: &str) -> String {
    join(path, PLACEHOLDER)
}

/// Replace a trailing run of digits with `#` (`list.3` to `list.#`).
///
/// Keys without trailing digits are returned unchanged.
pub fn to_placeholder(key: &str) -> String {
    let trimmed = key.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.len() == key.len() {
        key.to_string()
    } else {
        format!("{trimmed}{PLACEHOLDER}")
    }
}

/// The numeric value of the key's last segment, if it is one.
pub fn trailing_index(key: &str) -> Option<usize> {
    parse_index(split_last(key).1)
}

/// Whether `a` and `b` are equal or one is an ancestor of the other.
pub fn related(a: &str, b: &str) -> bool {
    a == b || is_descendant(a, b) || is_descendant(b, a)
}

/// Whether `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}

/// Whether `path` is `ancestor` or lies below it.
pub fn is_self_or_descendant(path: &str, ancestor: &str) -> bool {
    path == ancestor || is_descendant(path, ancestor)
}

/// Strip a trailing `.#` from a key.
pub fn strip_placeholder(key: &str) -> &str {
    key.strip_suffix(".#").unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_split() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a.b", "0"), "a.b.0");
        assert_eq!(split_last("a.b.0"), ("a.b", "0"));
        assert_eq!(split_last("a"), ("", "a"));
        assert_eq!(segments("").count(), 0);
        assert_eq!(segments("users.0.name").collect::<Vec<_>>(), ["users", "0", "name"]);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(to_placeholder("list.12"), "list.#");
        assert_eq!(to_placeholder("list.#"), "list.#");
        assert_eq!(to_placeholder("list"), "list");
        assert_eq!(placeholder_of("users.0.tags"), "users.0.tags.#");
        assert_eq!(strip_placeholder("list.#"), "list");
        assert_eq!(trailing_index("list.7"), Some(7));
        assert_eq!(trailing_index("list.x"), None);
    }

    #[test]
    fn test_relations() {
        assert!(related("a", "a"));
        assert!(related("a", "a.b"));
        assert!(related("a.b", "a"));
        assert!(!related("a", "ab"));
        assert!(!related("a.b", "a.c"));
        assert!(is_self_or_descendant("a.b.c", "a.b"));
        assert!(!is_descendant("a", "a"));
    }

    #[test]
    fn test_index_detection() {
        assert!(is_index("0"));
        assert!(is_index("42"));
        assert!(!is_index(""));
        assert!(!is_index("length"));
        assert!(!is_index("-1"));
        assert_eq!(parse_index("3"), Some(3));
    }

    #[test]
    fn test_out_of_range_indices_are_not_indices() {
        assert!(!is_index("007"));
        assert!(!is_index("99999999999999999999"));
        assert!(!is_index("4294967295"));
        assert_eq!(parse_index("4294967294"), Some(4_294_967_294));
    }

    #[test]
    fn test_array_length_bounds() {
        assert_eq!(array_length(0.0), Some(0));
        assert_eq!(array_length(4_294_967_295.0), Some(MAX_ARRAY_LENGTH));
        assert_eq!(array_length(4_294_967_296.0), None);
        assert_eq!(array_length(1e30), None);
        assert_eq!(array_length(1.5), None);
        assert_eq!(array_length(-1.0), None);
        assert_eq!(array_length(f64::NAN), None);
    }
}
