/// Returns true if the name is already a valid field identifier.
pub fn is_field_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Canonicalize a column name into a field identifier.
///
/// Lowercases ASCII alphanumerics, collapses every other run of characters
/// into a single `_`, and prefixes `f_` when the result would start with a
/// digit. Distinct column names may map to the same identifier; callers that
/// need uniqueness must probe for a free suffix.
pub fn field_identifier(name: &str) -> String {
    if is_field_identifier(name) {
        return name.to_string();
    }

    let mut slug = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            last_was_underscore = false;
            slug.push(ch.to_ascii_lowercase());
        } else if !last_was_underscore {
            last_was_underscore = true;
            slug.push('_');
        }
    }

    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        return "field".to_string();
    }
    if slug.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("f_{}", slug);
    }
    slug.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_identifier_preserves_valid_names() {
        assert_eq!(field_identifier("payment_type"), "payment_type");
    }

    #[test]
    fn field_identifier_slugs_unsafe_names() {
        assert_eq!(field_identifier("Payment Type"), "payment_type");
        assert_eq!(field_identifier("a--b//c"), "a_b_c");
        assert_eq!(field_identifier("-x-"), "x");
    }

    #[test]
    fn field_identifier_handles_degenerate_input() {
        assert_eq!(field_identifier(""), "field");
        assert_eq!(field_identifier("???"), "field");
        assert_eq!(field_identifier("2024 sales"), "f_2024_sales");
        assert!(is_field_identifier(&field_identifier("Größe")));
    }
}
