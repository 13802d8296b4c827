//! `{{name}}` placeholder resolution against the execution's variable bag

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

pub type VariableBag = Map<String, Value>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
        .expect("placeholder pattern compiles")
});

/// Look up `name`, following dotted segments into objects and arrays.
pub fn lookup<'a>(bag: &'a VariableBag, name: &str) -> Option<&'a Value> {
    let mut segments = name.split('.');
    let mut current = bag.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Result of resolving one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Value,
    /// Placeholders left verbatim because the bag had no such name
    pub unresolved: Vec<String>,
}

/// Replace placeholders in every string inside `value`.
///
/// A string that is exactly one placeholder takes the bound value as-is, so
/// numbers and objects keep their type; embedded placeholders are spliced in
/// as text.
pub fn resolve(value: &Value, bag: &VariableBag) -> Resolution {
    let mut unresolved = Vec::new();
    let value = resolve_inner(value, bag, &mut unresolved);
    if !unresolved.is_empty() {
        debug!(?unresolved, "placeholders left unresolved");
    }
    Resolution { value, unresolved }
}

fn resolve_inner(value: &Value, bag: &VariableBag, unresolved: &mut Vec<String>) -> Value {
    match value {
        Value::String(text) => resolve_string(text, bag, unresolved),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_inner(item, bag, unresolved))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), resolve_inner(item, bag, unresolved)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(text: &str, bag: &VariableBag, unresolved: &mut Vec<String>) -> Value {
    let pattern = &*PLACEHOLDER;

    if let Some(whole) = pattern.captures(text) {
        let matched = whole.get(0).map(|m| m.as_str().len()).unwrap_or(0);
        if matched == text.len() {
            let name = &whole[1];
            return match lookup(bag, name) {
                Some(bound) => bound.clone(),
                None => {
                    unresolved.push(name.to_string());
                    Value::String(text.to_string())
                }
            };
        }
    }

    let spliced = pattern.replace_all(text, |caps: &Captures<'_>| {
        let name = &caps[1];
        match lookup(bag, name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                unresolved.push(name.to_string());
                caps[0].to_string()
            }
        }
    });
    Value::String(spliced.into_owned())
}

/// Resolve `bindings` against the bag as it was before the merge, then
/// insert them, overwriting existing names.
pub fn merge_bindings(bag: &mut VariableBag, bindings: &VariableBag) -> Vec<String> {
    let mut unresolved = Vec::new();
    let resolved: Vec<(String, Value)> = bindings
        .iter()
        .map(|(name, raw)| (name.clone(), resolve_inner(raw, bag, &mut unresolved)))
        .collect();
    bag.extend(resolved);
    unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> VariableBag {
        match value {
            Value::Object(map) => map,
            _ => panic!("bag must be an object"),
        }
    }

    #[test]
    fn whole_placeholder_keeps_type() {
        let vars = bag(json!({ "count": 3, "user": { "name": "ada" } }));
        let resolved = resolve(&json!({ "n": "{{count}}", "who": "{{ user.name }}" }), &vars);
        assert_eq!(resolved.value, json!({ "n": 3, "who": "ada" }));
        assert!(resolved.unresolved.is_empty());
    }

    #[test]
    fn embedded_placeholders_are_spliced() {
        let vars = bag(json!({ "host": "shop.test", "page": 2 }));
        let resolved = resolve(&json!("https://{{host}}/list?page={{page}}"), &vars);
        assert_eq!(resolved.value, json!("https://shop.test/list?page=2"));
    }

    #[test]
    fn unknown_names_stay_verbatim() {
        let vars = bag(json!({ "a": "x" }));
        let resolved = resolve(&json!(["{{missing}}", "{{a}}-{{other}}"]), &vars);
        assert_eq!(resolved.value, json!(["{{missing}}", "x-{{other}}"]));
        assert_eq!(resolved.unresolved, vec!["missing", "other"]);
    }

    #[test]
    fn bindings_merge_after_resolution() {
        let mut vars = bag(json!({ "base": "https://shop.test" }));
        let bindings = bag(json!({ "cart": "{{base}}/cart", "base": "https://other.test" }));
        let unresolved = merge_bindings(&mut vars, &bindings);
        assert!(unresolved.is_empty());
        assert_eq!(vars["base"], json!("https://other.test"));
        assert_eq!(vars["cart"], json!("https://shop.test/cart"));
    }

    #[test]
    fn lookup_walks_arrays() {
        let vars = bag(json!({ "rows": [ { "id": 7 } ] }));
        assert_eq!(lookup(&vars, "rows.0.id"), Some(&json!(7)));
        assert_eq!(lookup(&vars, "rows.4.id"), None);
    }
}
