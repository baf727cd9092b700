use serde_json::{Map, Value};

/// Split a key into words at separators, lower-to-upper case changes, the
/// end of an acronym (`XMLHttp` is `XML` + `Http`) and letter/digit changes.
fn words(key: &str) -> Vec<String> {
    let chars: Vec<char> = key.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(prev) = current.chars().last() {
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_uppercase() && c.is_uppercase() && next_lower)
                || prev.is_numeric() != c.is_numeric();
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `"message_id"`, `"Message-ID"`, `"PageID"` and `"message.id"` become
/// `"messageId"`-style keys: first word lowercase, later words capitalized.
pub fn camelcase(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, word) in words(key).iter().enumerate() {
        let lower = word.to_lowercase();
        let mut chars = lower.chars();
        if i > 0
            && let Some(first) = chars.next()
        {
            out.extend(first.to_uppercase());
        }
        out.push_str(chars.as_str());
    }
    out
}

/// Rename every object key under `value` to camelCase. Array elements are
/// converted too; strings and other scalars are left alone.
pub fn camelcase_keys_deep(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (camelcase(&k), camelcase_keys_deep(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(camelcase_keys_deep).collect()),
        other => other,
    }
}
