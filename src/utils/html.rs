// src/utils/html.rs

/// Sanitizes admin-supplied rich text (descriptions, remarks, question statements)
/// with ammonia's whitelist: safe formatting tags survive, scripts and event
/// handler attributes are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Applies [`clean_html`] to an optional field.
pub fn clean_opt(input: Option<&str>) -> Option<String> {
    input.map(clean_html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_keeps_formatting() {
        let cleaned = clean_html("<b>Limits</b><script>alert(1)</script>");
        assert_eq!(cleaned, "<b>Limits</b>");
    }

    #[test]
    fn optional_passthrough() {
        assert_eq!(clean_opt(None), None);
        assert_eq!(clean_opt(Some("plain")), Some("plain".to_string()));
    }
}
