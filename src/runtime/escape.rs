//! Output escaping

use std::borrow::Cow;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Escaping filter applied to `$expr` output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscapeMode {
    /// Replace `& < > ' "` with entities
    Html,
    /// Emit text unchanged
    #[serde(alias = "none")]
    Plain,
}

impl EscapeMode {
    /// Default filter for a template file name: HTML escaping for `.html`,
    /// `.xhtml` and `.xml`, none otherwise
    pub fn for_name(name: &str) -> Self {
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some("html" | "xhtml" | "xml") => Self::Html,
            _ => Self::Plain,
        }
    }

    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self {
            Self::Html => escape_html(text),
            Self::Plain => Cow::Borrowed(text),
        }
    }
}

/// HTML-escape `text`. Each character is replaced at most once, so `&`
/// in the output only ever starts an entity.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '\'', '"']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html_entities() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_escape_does_not_double_escape() {
        assert_eq!(escape_html("&lt;"), "&amp;lt;");
        assert!(matches!(escape_html("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_mode_for_name() {
        assert_eq!(EscapeMode::for_name("page.html"), EscapeMode::Html);
        assert_eq!(EscapeMode::for_name("feed.xml"), EscapeMode::Html);
        assert_eq!(EscapeMode::for_name("feed.XML"), EscapeMode::Plain);
        assert_eq!(EscapeMode::for_name("notes.txt"), EscapeMode::Plain);
        assert_eq!(EscapeMode::for_name("README"), EscapeMode::Plain);
    }
}
