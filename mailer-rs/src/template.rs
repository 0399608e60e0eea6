//! `{{placeholder}}` substitution for message bodies

use std::fmt::Display;

/// Replace every `{{key}}` with the display form of its value
///
/// Placeholders without a matching key are left as they are.
pub fn render_template<I, K, V>(template: &str, context: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Display,
{
    let mut result = template.to_string();
    for (key, value) in context {
        let placeholder = format!("{{{{{}}}}}", key.as_ref());
        result = result.replace(&placeholder, &value.to_string());
    }
    result
}

/// Names of the `{{...}}` placeholders in a string, sorted and deduplicated
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if !name.is_empty() {
                    names.push(name.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }

    names.sort();
    names.dedup();
    names
}
