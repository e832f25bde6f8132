use std::sync::OnceLock;

use regex::Regex;

fn file_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/file/(.*?)/").expect("file path pattern compiles"))
}

/// Pull the file key out of a share url such as
/// `https://www.figma.com/file/ABC123/Landing?node-id=1%3A2`.
///
/// The key is whatever sits between the first `/file/` and the next `/`.
/// Anything without that shape (including `/file//`) yields `None`.
pub fn parse_file_key(locator: &str) -> Option<String> {
    file_path_pattern()
        .captures(locator)
        .and_then(|caps| caps.get(1))
        .map(|key| key.as_str())
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_key_from_share_urls() {
        assert_eq!(
            parse_file_key("https://www.figma.com/file/ABC123/Landing-Page?node-id=0%3A1").as_deref(),
            Some("ABC123")
        );
        assert_eq!(parse_file_key("/file/k/").as_deref(), Some("k"));
    }

    #[test]
    fn stops_at_the_first_slash() {
        assert_eq!(
            parse_file_key("https://x.test/file/a/b/c/").as_deref(),
            Some("a")
        );
    }

    #[test]
    fn rejects_other_shapes() {
        assert_eq!(parse_file_key("https://www.figma.com/proto/ABC123/x"), None);
        assert_eq!(parse_file_key("https://www.figma.com/file/ABC123"), None);
        assert_eq!(parse_file_key("/file//"), None);
        assert_eq!(parse_file_key(""), None);
    }
}
