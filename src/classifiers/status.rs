//! Error verdicts from the proxy's status fields

use serde_json::Value;

/// Whether a request failed
///
/// A request is an error when the proxy's own status is 5xx, or when the raw
/// `upstream_status` text starts with `5`. Only the first character is checked,
/// so for multi-attempt values like `"502, 200"` the first attempt decides.
pub fn is_error(status: Option<i64>, upstream_status: Option<&str>) -> bool {
    if matches!(status, Some(code) if code >= 500) {
        return true;
    }
    upstream_status.is_some_and(|text| text.starts_with('5'))
}

/// Interpret a JSON `status` value as an integer
///
/// Numbers and numeric strings are accepted. Anything else (`"-"`, `"abc"`,
/// booleans) is treated as absent.
pub fn status_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Render a JSON `upstream_status` value as text
pub fn upstream_status_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_error_status() {
        assert!(is_error(Some(503), None));
        assert!(is_error(Some(500), Some("200")));
        assert!(!is_error(Some(499), None));
    }

    #[test]
    fn test_upstream_status_first_character() {
        assert!(is_error(Some(200), Some("502, 200")));
        assert!(!is_error(Some(200), Some("200, 502")));
        assert!(!is_error(None, Some("200")));
        assert!(!is_error(None, Some("")));
        assert!(!is_error(None, None));
    }

    #[test]
    fn test_status_code_conversion() {
        assert_eq!(status_code(&json!(502)), Some(502));
        assert_eq!(status_code(&json!("503")), Some(503));
        assert_eq!(status_code(&json!(" 200 ")), Some(200));
        assert_eq!(status_code(&json!(500.0)), Some(500));
        assert_eq!(status_code(&json!("-")), None);
        assert_eq!(status_code(&json!("abc")), None);
        assert_eq!(status_code(&json!(true)), None);
        assert_eq!(status_code(&Value::Null), None);
    }

    #[test]
    fn test_non_numeric_status_falls_through_to_upstream() {
        let status = status_code(&json!("oops"));
        assert!(is_error(status, Some("504")));
        assert!(!is_error(status, Some("200")));
    }

    #[test]
    fn test_upstream_status_text() {
        assert_eq!(upstream_status_text(&json!("502, 200")), Some("502, 200".to_string()));
        assert_eq!(upstream_status_text(&json!(504)), Some("504".to_string()));
        assert_eq!(upstream_status_text(&Value::Null), None);
    }
}
