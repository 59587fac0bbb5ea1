//! Small shared helpers: SystemTime<->unix-seconds (de)serialization, and
//! the peer-name-to-interface-name sanitizer from spec.md §6.

pub mod unix_time {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let secs = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        secs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

pub mod unix_time_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(t: &Option<SystemTime>, s: S) -> Result<S::Ok, S::Error> {
        let secs = t.and_then(|t| t.duration_since(UNIX_EPOCH).ok()).map(|d| d.as_secs());
        secs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SystemTime>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(|secs| UNIX_EPOCH + Duration::from_secs(secs)))
    }
}

/// Lowercase, replace any character outside `[a-z0-9_-]` with `_`, truncate
/// to 15 chars, trim trailing `_`/`-`, default to `wg0` if empty.
///
/// Ported from spec.md §6 "Peer name -> interface name"; the teacher
/// enforces a similar but stricter hostname(7) regex at peer-creation time
/// (`db::peer::PEER_NAME_REGEX`) — this sanitizer is the looser, lossy
/// mapping used purely for the local interface identifier an agent creates.
pub fn sanitize_interface_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(15)
        .collect();

    while matches!(out.chars().last(), Some('_') | Some('-')) {
        out.pop();
    }

    if out.is_empty() {
        "wg0".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unicode_to_underscores() {
        assert_eq!(sanitize_interface_name("特殊字符"), "____");
    }

    #[test]
    fn truncates_to_fifteen_chars() {
        assert_eq!(
            sanitize_interface_name("verylongpeernametotest"),
            "verylongpeernam"
        );
    }

    #[test]
    fn trims_trailing_separators_after_truncation() {
        // 15 chars of "abc-def-ghi-jk-" truncated, trailing '-' trimmed.
        assert_eq!(sanitize_interface_name("abc-def-ghi-jk-lmnop"), "abc-def-ghi-jk");
    }

    #[test]
    fn empty_defaults_to_wg0() {
        assert_eq!(sanitize_interface_name(""), "wg0");
        assert_eq!(sanitize_interface_name("---"), "wg0");
    }

    #[test]
    fn lowercases_mixed_case() {
        assert_eq!(sanitize_interface_name("LaptopOne"), "laptopone");
    }
}
