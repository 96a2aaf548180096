//! The built-in grok pattern library (§4.2), translated from the original
//! `GROK_PATTERNS` table into `regex` crate syntax.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%\{(\w+)(?::(\w+))?\}").unwrap());

pub fn builtin_patterns() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("INT", r"[+-]?[0-9]+"),
        ("NUMBER", r"[+-]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+)"),
        ("WORD", r"\b\w+\b"),
        ("NOTSPACE", r"\S+"),
        ("SPACE", r"\s*"),
        ("DATA", r".*?"),
        ("GREEDYDATA", r".*"),
        (
            "IP",
            r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)",
        ),
        ("IPV6", r"(?:[0-9A-Fa-f]{1,4}:){7}[0-9A-Fa-f]{1,4}"),
        ("MAC", r"(?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}"),
        (
            "HOSTNAME",
            r"\b(?:[0-9A-Za-z][0-9A-Za-z-]{0,62})(?:\.(?:[0-9A-Za-z][0-9A-Za-z-]{0,62}))*\.?\b",
        ),
        (
            "SYSLOGTIMESTAMP",
            r"(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}",
        ),
        (
            "TIMESTAMP_ISO8601",
            r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
        ),
    ])
}

/// Expand a Logstash-style `%{PATTERN:name}` grok pattern into a `regex`
/// pattern with named capture groups, merging `custom` over the built-in
/// library. A pattern name absent from both is left untouched in the
/// output (it will not compile as a capture group, matching the original's
/// pass-through behavior for unknown patterns).
#[must_use]
pub fn to_regex_pattern(grok_pattern: &str, custom: &HashMap<String, String>) -> String {
    let builtins = builtin_patterns();
    TOKEN_RE
        .replace_all(grok_pattern, |caps: &regex::Captures| {
            let name = &caps[1];
            let field = caps.get(2).map(|m| m.as_str());
            let resolved = custom
                .get(name)
                .map(String::as_str)
                .or_else(|| builtins.get(name).copied());

            match (resolved, field) {
                (Some(regex), Some(field)) => format!("(?P<{field}>{regex})"),
                (Some(regex), None) => format!("(?:{regex})"),
                (None, _) => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_named_builtin_pattern() {
        let pattern = to_regex_pattern("temp=%{NUMBER:value}C", &HashMap::new());
        let re = Regex::new(&pattern).unwrap();
        let caps = re.captures("temp=42.5C").unwrap();
        assert_eq!(&caps["value"], "42.5");
    }

    #[test]
    fn custom_pattern_overrides_builtin() {
        let mut custom = HashMap::new();
        custom.insert("WORD".to_string(), "[a-z]+".to_string());
        let pattern = to_regex_pattern("%{WORD:tag}", &custom);
        let re = Regex::new(&pattern).unwrap();
        assert!(re.is_match("abc"));
    }
}
