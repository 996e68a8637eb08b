//! Display name handling.

/// Clean a requested display name.
///
/// Keeps ASCII letters, digits, underscores and spaces, trims the result and
/// truncates it to `max_len` characters. Returns `None` when nothing usable
/// is left.
pub fn sanitize(raw: &str, max_len: usize) -> Option<String> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == ' ')
        .collect();
    let trimmed: String = kept.trim().chars().take(max_len).collect();
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Make `name` unique among `taken` by appending `1`, `2`, ...
pub fn dedupe<'a>(name: &str, taken: impl Iterator<Item = &'a str> + Clone) -> String {
    if !taken.clone().any(|t| t == name) {
        return name.to_string();
    }
    (1u32..)
        .map(|n| format!("{}{}", name, n))
        .find(|candidate| !taken.clone().any(|t| t == candidate.as_str()))
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_and_trims() {
        assert_eq!(sanitize("  bob!! ", 30).as_deref(), Some("bob"));
        assert_eq!(sanitize("a<script>b", 30).as_deref(), Some("ascriptb"));
        assert_eq!(sanitize("big_cat 9", 30).as_deref(), Some("big_cat 9"));
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert_eq!(sanitize("", 30), None);
        assert_eq!(sanitize("   ", 30), None);
        assert_eq!(sanitize("!!!", 30), None);
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(50);
        assert_eq!(sanitize(&long, 30).map(|s| s.len()), Some(30));
    }

    #[test]
    fn test_dedupe_appends_counter() {
        let taken = ["bob", "bob1", "al"];
        assert_eq!(dedupe("bob", taken.iter().copied()), "bob2");
        assert_eq!(dedupe("al", taken.iter().copied()), "al1");
        assert_eq!(dedupe("eve", taken.iter().copied()), "eve");
    }
}
