//! HTML to plain text

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid script pattern"));

static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid style pattern"));

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment pattern"));

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9À-ÿ ]").expect("valid charset pattern"));

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").expect("valid space pattern"));

/// Strip markup, scripts and styles, keep letters (Latin-1 accents included),
/// digits and single spaces
pub fn sanitize(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, " ");
    let text = STYLE_BLOCK.replace_all(&text, " ");
    let text = COMMENT.replace_all(&text, " ");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);

    let text: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let text = DISALLOWED.replace_all(&text, "");
    let text = MULTI_SPACE.replace_all(&text, " ");

    text.trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags_scripts_and_styles() {
        let html = r#"<html><head><style>body { color: red; }</style>
            <script type="text/javascript">var x = "<b>no</b>";</script></head>
            <body><h1>Bonjour</h1><p>le monde</p></body></html>"#;

        assert_eq!(sanitize(html), "Bonjour le monde");
    }

    #[test]
    fn test_keeps_accented_letters_and_digits() {
        assert_eq!(sanitize("<p>Québec, 2024 «été»!</p>"), "Québec 2024 été");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(sanitize("a\n\n\tb   c\r\nd"), "a b c d");
    }

    #[test]
    fn test_removes_comments_and_entities() {
        assert_eq!(
            sanitize("<!-- hidden <p>x</p> -->Fish&nbsp;&amp;&nbsp;Chips"),
            "Fish Chips"
        );
    }

    #[test]
    fn test_uppercase_script_tag() {
        assert_eq!(sanitize("<SCRIPT>alert(1)</SCRIPT>ok"), "ok");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize(""), "");
    }
}
