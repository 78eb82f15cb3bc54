//! `{{ name }}` variable interpolation.
//!
//! Replaces placeholder tokens in a string with the stringified value of
//! the named variable. Whitespace inside the braces is trimmed. Single
//! braces are literal, and substituted values are never re-scanned for
//! further placeholders.

use serde_json::{Map, Value};

use crate::error::CoreError;

/// How missing keys are handled during interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateMode {
    /// Missing key is an `invalid-argument` error. Used for URL, header
    /// and param substitution.
    Strict,
    /// Missing key leaves the placeholder verbatim. Used for
    /// response-body echo scenarios.
    Lenient,
}

/// Canonical string form of a value: numbers unquoted, booleans
/// `true`/`false`, null empty, mappings and sequences as canonical JSON.
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

/// Substitute `{{ name }}` occurrences in `input` from `vars`.
pub fn interpolate(
    input: &str,
    vars: &Map<String, Value>,
    mode: TemplateMode,
) -> Result<String, CoreError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let raw = &after_open[..close];
                let name = raw.trim();
                if name.is_empty() {
                    match mode {
                        TemplateMode::Strict => {
                            return Err(CoreError::InvalidArgument(
                                "empty variable placeholder".to_string(),
                            ))
                        }
                        TemplateMode::Lenient => {
                            out.push_str("{{");
                            out.push_str(raw);
                            out.push_str("}}");
                        }
                    }
                } else {
                    match vars.get(name) {
                        Some(value) => out.push_str(&canonical_string(value)),
                        None => match mode {
                            TemplateMode::Strict => {
                                return Err(CoreError::InvalidArgument(format!(
                                    "unknown variable {:?}",
                                    name
                                )))
                            }
                            TemplateMode::Lenient => {
                                out.push_str("{{");
                                out.push_str(raw);
                                out.push_str("}}");
                            }
                        },
                    }
                }
                rest = &after_open[close + 2..];
            }
            // Unterminated opener is literal text.
            None => {
                out.push_str(&rest[open..]);
                return Ok(out);
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Convenience for string-valued variable maps.
pub fn string_map(pairs: impl IntoIterator<Item = (String, String)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("vars must be an object"),
        }
    }

    #[test]
    fn test_basic_substitution() {
        let v = vars(json!({"userId": "12345"}));
        let out = interpolate(
            "http://srv/api/users/{{userId}}/profile",
            &v,
            TemplateMode::Strict,
        )
        .unwrap();
        assert_eq!(out, "http://srv/api/users/12345/profile");
    }

    #[test]
    fn test_whitespace_inside_braces() {
        let v = vars(json!({"name": "x"}));
        assert_eq!(
            interpolate("{{ name }}-{{name }}-{{  name}}", &v, TemplateMode::Strict).unwrap(),
            "x-x-x"
        );
    }

    #[test]
    fn test_strict_missing_key() {
        let v = vars(json!({}));
        let err = interpolate("a {{ghost}} b", &v, TemplateMode::Strict).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_lenient_missing_key_left_verbatim() {
        let v = vars(json!({}));
        assert_eq!(
            interpolate("a {{ ghost }} b", &v, TemplateMode::Lenient).unwrap(),
            "a {{ ghost }} b"
        );
    }

    #[test]
    fn test_empty_placeholder_strict_errors() {
        let v = vars(json!({}));
        let err = interpolate("{{}}", &v, TemplateMode::Strict).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_single_braces_are_literal() {
        let v = vars(json!({"x": "1"}));
        assert_eq!(
            interpolate("{x} and { x }", &v, TemplateMode::Strict).unwrap(),
            "{x} and { x }"
        );
    }

    #[test]
    fn test_no_recursive_expansion() {
        let v = vars(json!({"a": "{{b}}", "b": "2"}));
        assert_eq!(interpolate("{{a}}", &v, TemplateMode::Strict).unwrap(), "{{b}}");
    }

    #[test]
    fn test_value_coercion() {
        let v = vars(json!({"n": 3, "f": 1.5, "b": true, "m": {"k": 1}, "z": null}));
        assert_eq!(
            interpolate("{{n}}/{{f}}/{{b}}/{{m}}/{{z}}", &v, TemplateMode::Strict).unwrap(),
            "3/1.5/true/{\"k\":1}/"
        );
    }

    #[test]
    fn test_unterminated_opener_is_literal() {
        let v = vars(json!({"x": "1"}));
        assert_eq!(
            interpolate("a {{x}} {{tail", &v, TemplateMode::Strict).unwrap(),
            "a 1 {{tail"
        );
    }

    #[test]
    fn test_idempotent_when_no_placeholder_values() {
        let v = vars(json!({"x": "plain"}));
        let once = interpolate("pre {{x}} post", &v, TemplateMode::Strict).unwrap();
        let twice = interpolate(&once, &v, TemplateMode::Strict).unwrap();
        assert_eq!(once, twice);
    }
}
