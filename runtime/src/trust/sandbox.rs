//! Content sanitization: detect and strip dangerous payloads in scraped text.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static SCRIPT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*script[\s>/]").unwrap());

static SCRIPT_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<\s*script\b.*?(?:</\s*script\s*>|$)").unwrap());

// Only unambiguous injection shapes; words like "select" or "from" in prose
// are not enough.
static SQL_INJECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(\bunion\s+(?:all\s+)?select\b)",
        r"|(;\s*(?:delete\s+from|update\s+\w+\s+set|insert\s+into|(?:alter|truncate)\s+table)\b)",
        r"|(\bdrop\s+(?:table|database)\b)",
        r"|('\s*(?:or|and)\s+'?\w+'?\s*=\s*'?\w+)",
        r"|('\s*;?\s*--)",
    ))
    .unwrap()
});

static PATH_TRAVERSAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\./|\.\.\\").unwrap());

static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<[^>]*\bon[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#).unwrap());

static EVENT_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\s*\bon[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#).unwrap());

/// Threats that can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Threat {
    ScriptInjection,
    SqlInjection,
    PathTraversal,
    EventHandler,
    /// NUL or other non-printing control characters.
    ControlCharacters,
}

impl Threat {
    /// Whether `sanitize` can remove this threat.
    pub fn is_strippable(&self) -> bool {
        !matches!(self, Threat::SqlInjection)
    }
}

/// Result of sanitization check.
#[derive(Debug)]
pub struct SanitizeResult {
    pub safe: bool,
    pub threats: Vec<Threat>,
}

fn has_controls(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r')
}

/// Check scraped text for dangerous payloads.
pub fn check(value: &str) -> SanitizeResult {
    let mut threats = Vec::new();

    if SCRIPT_TAG_RE.is_match(value) {
        threats.push(Threat::ScriptInjection);
    }
    if SQL_INJECTION_RE.is_match(value) {
        threats.push(Threat::SqlInjection);
    }
    if PATH_TRAVERSAL_RE.is_match(value) {
        threats.push(Threat::PathTraversal);
    }
    if EVENT_HANDLER_RE.is_match(value) {
        threats.push(Threat::EventHandler);
    }
    if has_controls(value) {
        threats.push(Threat::ControlCharacters);
    }

    SanitizeResult {
        safe: threats.is_empty(),
        threats,
    }
}

/// Remove strippable threats. SQL-injection shapes are left for the caller to reject.
pub fn sanitize(value: &str) -> String {
    let mut result = SCRIPT_BLOCK_RE.replace_all(value, "").to_string();
    result = SCRIPT_TAG_RE.replace_all(&result, "").to_string();
    result = EVENT_ATTR_RE.replace_all(&result, "").to_string();
    result = PATH_TRAVERSAL_RE.replace_all(&result, "").to_string();
    result
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_input() {
        let result = check("Cascade secrète, baignade l'après-midi");
        assert!(result.safe);
    }

    #[test]
    fn test_prose_with_sql_words_is_safe() {
        assert!(check("Select the best spot from the list where you like to swim").safe);
        assert!(check("Départ -- retour vers 18h").safe);
        assert!(check("Edit; update: route fermée").safe);
        assert!(check("Parking plein; delete ce message si besoin").safe);
    }

    #[test]
    fn test_script_injection() {
        let result = check("<script>alert(1)</script>");
        assert!(!result.safe);
        assert!(result.threats.contains(&Threat::ScriptInjection));
    }

    #[test]
    fn test_sql_injection() {
        assert!(check("x' OR '1'='1").threats.contains(&Threat::SqlInjection));
        assert!(check("1; DROP TABLE spots").threats.contains(&Threat::SqlInjection));
        assert!(check("a UNION SELECT password").threats.contains(&Threat::SqlInjection));
        assert!(check("x'; DELETE FROM spots").threats.contains(&Threat::SqlInjection));
        assert!(check("1; update spots set lat = 0").threats.contains(&Threat::SqlInjection));
    }

    #[test]
    fn test_path_traversal() {
        let result = check("../../etc/passwd");
        assert!(!result.safe);
        assert!(result.threats.contains(&Threat::PathTraversal));
    }

    #[test]
    fn test_event_handler_and_nul() {
        assert!(check(r#"<img src=x onerror="alert(1)">"#)
            .threats
            .contains(&Threat::EventHandler));
        assert!(check("abc\u{0}def").threats.contains(&Threat::ControlCharacters));
    }

    #[test]
    fn test_sanitize() {
        let clean = sanitize("<script>alert(1)</script>hello");
        assert_eq!(clean, "hello");
        let clean = sanitize(r#"<img src=x onerror="alert(1)"> nice"#);
        assert!(check(&clean).safe, "{clean}");
        assert_eq!(sanitize("a\u{0}b"), "ab");
    }
}
