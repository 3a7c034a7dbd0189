// Built-in validation and transformation rules

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::value::{json_kind, ParamValue};

pub const MAX_ALIAS_LENGTH: usize = 100;

/// Option keys managed by the control plane itself.
pub const RESERVED_OPTION_KEYS: &[&str] = &["family"];

fn alias_regex() -> &'static Regex {
    static ALIAS_RE: OnceLock<Regex> = OnceLock::new();
    ALIAS_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$").expect("Invalid regex pattern")
    })
}

fn option_key_regex() -> &'static Regex {
    static OPTION_RE: OnceLock<Regex> = OnceLock::new();
    OPTION_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex pattern")
    })
}

fn expect_str(value: &ParamValue) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected string, got {}", value.kind()))
}

pub fn validate_alias(value: &ParamValue) -> Result<(), String> {
    let alias = expect_str(value)?;
    if alias.is_empty() {
        return Err("alias must not be empty".to_string());
    }
    if alias.len() > MAX_ALIAS_LENGTH {
        return Err(format!(
            "alias is too long ({} > {} characters)",
            alias.len(),
            MAX_ALIAS_LENGTH
        ));
    }
    if !alias_regex().is_match(alias) {
        return Err(format!(
            "alias {:?} must start with a letter and contain only letters, digits, '_' and '-'",
            alias
        ));
    }
    Ok(())
}

fn check_option_key(key: &str) -> Result<(), String> {
    if !option_key_regex().is_match(key) {
        return Err(format!(
            "option key {:?} must contain only letters, digits and '_' and must not start with a digit",
            key
        ));
    }
    if RESERVED_OPTION_KEYS.contains(&key) {
        return Err(format!("option key {:?} is reserved", key));
    }
    Ok(())
}

pub fn validate_option_key(value: &ParamValue) -> Result<(), String> {
    check_option_key(expect_str(value)?)
}

/// The value must be an object whose keys are all valid option keys.
pub fn validate_speclet_options(value: &ParamValue) -> Result<(), String> {
    let ParamValue::Structured(json) = value else {
        return Err(format!("expected object, got {}", value.kind()));
    };
    let Value::Object(map) = json else {
        return Err(format!("expected object, got {}", json_kind(json)));
    };
    map.keys().try_for_each(|key| check_option_key(key))
}

/// Canonical attribute filter: trimmed names, first occurrence wins.
pub fn transform_attributes(value: ParamValue) -> ParamValue {
    let items = match value {
        ParamValue::Sequence(items) => items,
        other => return other,
    };
    let mut names: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if let ParamValue::String(name) = item {
            let name = name.trim().to_string();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    ParamValue::Sequence(names.into_iter().map(ParamValue::String).collect())
}
