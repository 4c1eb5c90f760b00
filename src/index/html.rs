// src/index/html.rs

//! Link extraction from index pages

use encoding_rs::Encoding;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*['"]?([^'"> ]+)"#).unwrap());
static REL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<([^>]*\srel\s*=\s*['"]?([^'">]+)[^>]*)>"#).unwrap());
static ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&(#\d+|#[xX][0-9a-fA-F]+|\w+);").unwrap());

/// Every `href` target on the page, resolved against `base`
pub fn links(base: &str, page: &str) -> Vec<String> {
    hrefs(page).filter_map(|href| join(base, &href)).collect()
}

/// `rel="homepage"`/`rel="download"` links, plus the legacy
/// `<th>Home Page` and `<th>Download URL` table rows
pub fn external_links(base: &str, page: &str) -> Vec<String> {
    let mut found = Vec::new();
    for caps in REL.captures_iter(page) {
        let rels: Vec<String> = caps[2].to_lowercase().split(',').map(|r| r.trim().to_string()).collect();
        if rels.iter().any(|r| r == "homepage" || r == "download") {
            found.extend(hrefs(&caps[1]).filter_map(|href| join(base, &href)));
        }
    }
    for marker in ["<th>Home Page", "<th>Download URL"] {
        if let Some(pos) = page.find(marker)
            && let Some(href) = hrefs(&page[pos..]).next()
            && let Some(link) = join(base, &href)
        {
            found.push(link);
        }
    }
    found
}

fn hrefs(text: &str) -> impl Iterator<Item = String> + '_ {
    HREF.captures_iter(text).map(|caps| htmldecode(&caps[1]))
}

/// Resolve a link relative to the page it appeared on
pub fn join(base: &str, link: &str) -> Option<String> {
    match Url::parse(base) {
        Ok(base) => base.join(link).ok().map(String::from),
        Err(_) => Url::parse(link).ok().map(String::from),
    }
}

/// Decode HTML character references
pub fn htmldecode(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                named_entity(entity)
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        _ => return None,
    })
}

/// `charset` parameter of a `Content-Type` header
pub fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_lowercase())
    })
}

/// Decode a page body, never failing
///
/// A declared charset known to `encoding_rs` is honoured, with undecodable
/// bytes dropped. Missing or unknown charsets fall back to latin-1, which
/// maps each byte to the code point of the same value.
pub fn decode_page(body: &[u8], charset: Option<&str>) -> String {
    match charset.and_then(|label| Encoding::for_label(label.as_bytes())) {
        Some(encoding) => {
            let (text, _, _) = encoding.decode(body);
            text.chars().filter(|&c| c != char::REPLACEMENT_CHARACTER).collect()
        }
        None => body.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_resolved_and_decoded() {
        let page = r#"<a href="foo-1.0.tar.gz#md5=abc">x</a>
            <A HREF='../bar/'>bar</A>
            <a href=baz-2.0.zip>baz</a>
            <a href="q?a=1&amp;b=2">q</a>"#;
        let found = links("https://pypi.example/simple/foo/", page);
        assert_eq!(
            found,
            vec![
                "https://pypi.example/simple/foo/foo-1.0.tar.gz#md5=abc",
                "https://pypi.example/simple/bar/",
                "https://pypi.example/simple/foo/baz-2.0.zip",
                "https://pypi.example/simple/foo/q?a=1&b=2",
            ]
        );
    }

    #[test]
    fn test_external_links() {
        let page = r#"<a rel="download" href="http://dl.example/foo-1.0.tgz">d</a>
            <a rel="nofollow" href="http://ignored.example/">n</a>
            <table><tr><th>Home Page</th><td><a href="http://home.example/">h</a></td></tr></table>"#;
        let found = external_links("https://pypi.example/simple/foo/", page);
        assert_eq!(found, vec!["http://dl.example/foo-1.0.tgz", "http://home.example/"]);
    }

    #[test]
    fn test_htmldecode() {
        assert_eq!(htmldecode("a&amp;b&#38;c&#x26;d&bogus;"), "a&b&c&d&bogus;");
    }

    #[test]
    fn test_charset_and_decode() {
        assert_eq!(charset("text/html; charset=\"UTF-8\"").as_deref(), Some("utf-8"));
        assert_eq!(charset("text/html"), None);
        assert_eq!(decode_page(b"caf\xe9", None), "café");
        assert_eq!(decode_page(b"ok\xff", Some("utf-8")), "ok");
        assert_eq!(decode_page(b"caf\xe9", Some("x-unheard-of")), "café");
    }

    #[test]
    fn test_declared_charset_honoured() {
        assert_eq!(decode_page(&[0xC0], Some("windows-1251")), "\u{410}");

        let mut body = vec![0xFF, 0xFE];
        for unit in r#"<a href="foo-1.0.tar.gz">foo</a>"#.encode_utf16() {
            body.extend_from_slice(&unit.to_le_bytes());
        }
        let page = decode_page(&body, charset("text/html; charset=utf-16").as_deref());
        assert_eq!(
            links("https://pypi.example/simple/foo/", &page),
            vec!["https://pypi.example/simple/foo/foo-1.0.tar.gz"]
        );
    }
}
