use std::collections::BTreeMap;

/// Labels, selectors and annotations share this shape
pub type StringMap = BTreeMap<String, String>;

/// Check that every selector key maps to an identical value in `labels`
///
/// An empty selector matches everything; callers that must not treat an
/// empty selector as "select all" check for emptiness first.
pub fn selector_matches(selector: &StringMap, labels: Option<&StringMap>) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.and_then(|l| l.get(key)) == Some(value))
}

/// Compare two optional maps key by key
///
/// A missing map equals an empty one. Any added, removed or changed key is a
/// difference; ordering never is.
pub fn maps_equal(a: Option<&StringMap>, b: Option<&StringMap>) -> bool {
    let a_len = a.map_or(0, |m| m.len());
    let b_len = b.map_or(0, |m| m.len());
    if a_len != b_len {
        return false;
    }

    match (a, b) {
        (Some(a), Some(b)) => a.iter().all(|(key, value)| b.get(key) == Some(value)),
        // Lengths already matched, so both sides are empty
        _ => true,
    }
}

/// Render a selector in `labelSelector` query form: `k1=v1,k2=v2`
pub fn format_selector(selector: &StringMap) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
