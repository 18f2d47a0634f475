//! Intersection of client-supplied names with server declarations.
//!
//! Every name that reaches a query builder goes through one of these
//! functions first.

/// `declared ∖ ignore`, in declared order.
pub fn allowed<'a>(declared: &'a [String], ignore: &[String]) -> Vec<&'a str> {
    declared
        .iter()
        .filter(|name| !ignore.contains(name))
        .map(String::as_str)
        .collect()
}

/// Requested names that are allowed, in request order. An empty
/// declaration allows nothing.
pub fn intersect<S: AsRef<str>>(requested: &[S], declared: &[String], ignore: &[String]) -> Vec<String> {
    let allowed = allowed(declared, ignore);
    let mut result: Vec<String> = Vec::new();
    for name in requested {
        let name = name.as_ref();
        if allowed.contains(&name) && !result.iter().any(|r| r == name) {
            result.push(name.to_string());
        }
    }
    result
}

/// Requested names that are allowed, in declared order.
pub fn intersect_declared<S: AsRef<str>>(
    requested: &[S],
    declared: &[String],
    ignore: &[String],
) -> Vec<String> {
    allowed(declared, ignore)
        .into_iter()
        .filter(|name| requested.iter().any(|r| r.as_ref() == *name))
        .map(str::to_string)
        .collect()
}
