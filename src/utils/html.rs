// src/utils/html.rs

use std::collections::HashSet;

/// Removes every tag from user-supplied text before it is stored.
///
/// `<script>` and `<style>` bodies are dropped entirely; the text of other
/// elements is kept. The output is HTML-escaped, so it can be rendered as-is.
pub fn strip_tags(input: &str) -> String {
    ammonia::Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(input)
        .to_string()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_is_removed_but_text_survives() {
        assert_eq!(strip_tags("<b>Great</b> tool"), "Great tool");
        assert_eq!(strip_tags("Hi<script>alert(1)</script>"), "Hi");
        assert_eq!(strip_tags("  plain  "), "plain");
    }
}
