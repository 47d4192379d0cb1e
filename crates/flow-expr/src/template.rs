//! `{{var}}` template interpolation for string step parameters.

use serde_json::Value;

use crate::Resolver;

/// Replace `{{path}}` tokens with values from the store. Unknown tokens are
/// left untouched so a half-bound template stays visible in logs.
pub fn interpolate(template: &str, resolve: Resolver<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + end_rel;

        out.push_str(&rest[..start]);
        let key = rest[start + 2..end].trim();

        match resolve(key) {
            Some(value) => out.push_str(&render(&value)),
            None => out.push_str(&rest[start..end + 2]),
        }

        rest = &rest[end + 2..];
    }

    out.push_str(rest);
    out
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
