//! String utility functions.

/// Irregular plurals that suffix rules get wrong.
const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("data", "datum"),
];

/// Words that are spelled the same in singular and plural.
const UNCOUNTABLE: &[&str] = &["series", "species", "news", "info", "equipment", "metadata"];

/// Converts an English plural noun to its singular form.
///
/// Used to name the slot that holds the target of a many-to-many association
/// inside each through-table record (`friends` becomes `friend`).
///
/// # Examples
///
/// ```
/// use oqb_core::utils::text::singularize;
///
/// assert_eq!(singularize("friends"), "friend");
/// assert_eq!(singularize("categories"), "category");
/// assert_eq!(singularize("addresses"), "address");
/// assert_eq!(singularize("status"), "status");
/// ```
pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }

    if let Some((_, single)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        return (*single).to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }

    if let Some(stem) = word.strip_suffix("sses") {
        return format!("{stem}ss");
    }

    for suffix in ["xes", "ches", "shes", "zzes"] {
        if let Some(stem) = word.strip_suffix(suffix) {
            return format!("{stem}{}", &suffix[..suffix.len() - 2]);
        }
    }

    if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        return word.to_string();
    }

    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── singularize ─────────────────────────────────────────────────

    #[test]
    fn test_singularize_regular() {
        assert_eq!(singularize("orders"), "order");
        assert_eq!(singularize("friends"), "friend");
        assert_eq!(singularize("tags"), "tag");
    }

    #[test]
    fn test_singularize_ies() {
        assert_eq!(singularize("companies"), "company");
        assert_eq!(singularize("categories"), "category");
    }

    #[test]
    fn test_singularize_es_suffixes() {
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("matches"), "match");
        assert_eq!(singularize("wishes"), "wish");
        assert_eq!(singularize("addresses"), "address");
    }

    #[test]
    fn test_singularize_already_singular() {
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("class"), "class");
        assert_eq!(singularize("analysis"), "analysis");
        assert_eq!(singularize("s"), "s");
    }

    #[test]
    fn test_singularize_irregular_and_uncountable() {
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("children"), "child");
        assert_eq!(singularize("series"), "series");
    }

    #[test]
    fn test_singularize_empty() {
        assert_eq!(singularize(""), "");
    }
}
