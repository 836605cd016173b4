// src/core/scanner/email_extractor.rs

//! HTML helpers for the harvester: outbound links from a search results page and
//! domain-scoped email addresses from any page.

use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Attributes that commonly carry an address outside of the visible text.
const EMAIL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "data-email",
    "content",
    "value",
    "alt",
    "placeholder",
];

/// Prefix of the search engine's own navigation links (pagination, related searches).
pub const SEARCH_NAVIGATION_PREFIX: &str = "/search?q=";

static ALL_ELEMENTS: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());
static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Matches `local-part@domain` and `local-part@one-label.domain` for the given domain only.
pub fn build_email_regex(domain: &str) -> Regex {
    let pattern = format!(r"[a-zA-Z0-9._%+-]+@(?:\w*\.)?{}", regex::escape(domain));
    // The domain is escaped, so the pattern is always valid.
    Regex::new(&pattern).unwrap()
}

/// Scans every element's text and the attributes in [`EMAIL_ATTRIBUTES`] for addresses
/// belonging to `domain`. Duplicates collapse into one entry.
pub fn extract_emails_from_html(domain: &str, html: &str) -> BTreeSet<String> {
    let email_regex = build_email_regex(domain);
    let document = Html::parse_document(html);
    let mut emails = BTreeSet::new();

    let mut collect = |text: &str| {
        let decoded = decode_html_entities(text);
        for m in email_regex.find_iter(&decoded) {
            emails.insert(m.as_str().to_string());
        }
    };

    for element in document.select(&ALL_ELEMENTS) {
        // Separate text nodes so adjacent elements cannot fuse into one address.
        let text = element.text().collect::<Vec<_>>().join(" ");
        collect(&text);

        for attribute in EMAIL_ATTRIBUTES {
            if let Some(value) = element.value().attr(attribute) {
                collect(value);
            }
        }
    }

    emails
}

/// Decodes HTML entities left in text, such as `&#64;` for `@`.
///
/// The parser already decodes one level; this catches pages that double-encode
/// addresses to dodge scrapers.
pub fn decode_html_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    // Escape `<` so the fragment parser treats everything as text.
    let fragment = Html::parse_fragment(&input.replace('<', "&lt;"));
    fragment.root_element().text().collect()
}

/// Pulls the outbound HTTPS links out of a search results page, in page order, without
/// duplicates. The engine's own navigation links are dropped and `/url?q=` redirects
/// are unwrapped.
pub fn extract_search_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&ANCHORS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if href.starts_with(SEARCH_NAVIGATION_PREFIX) {
            continue;
        }
        let Some(link) = resolve_result_link(href) else {
            continue;
        };
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}

fn resolve_result_link(href: &str) -> Option<String> {
    let url = if href.starts_with("/url?") {
        let redirect = Url::parse(&format!("https://redirect.invalid{href}")).ok()?;
        let target = redirect
            .query_pairs()
            .find(|(k, _)| k == "q" || k == "url")
            .map(|(_, v)| v.into_owned())?;
        Url::parse(&target).ok()?
    } else {
        Url::parse(href).ok()?
    };

    (url.scheme() == "https").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_every_address_for_the_domain() {
        let html = "<p>Contact us at support@example.com or sales@example.com</p>";
        assert_eq!(
            extract_emails_from_html("example.com", html),
            set(&["support@example.com", "sales@example.com"])
        );
    }

    #[test]
    fn ignores_addresses_on_other_domains() {
        let html = "<p>Contact us at support@otherexample.com</p>";
        assert!(extract_emails_from_html("example.com", html).is_empty());
    }

    #[test]
    fn ignores_malformed_addresses() {
        let html = "<p>Contact us at support@@otherexample.com</p>";
        assert!(extract_emails_from_html("example.com", html).is_empty());
    }

    #[test]
    fn accepts_one_subdomain_label() {
        let html = "<p>ops@mail.example.com</p>";
        assert_eq!(
            extract_emails_from_html("example.com", html),
            set(&["ops@mail.example.com"])
        );
    }

    #[test]
    fn reads_addresses_from_attributes() {
        let html = r#"<a href="mailto:help@example.com">Help</a><input placeholder="you@example.com">"#;
        assert_eq!(
            extract_emails_from_html("example.com", html),
            set(&["help@example.com", "you@example.com"])
        );
    }

    #[test]
    fn same_address_in_text_and_attribute_is_counted_once() {
        let html = r#"<a href="mailto:info@example.com">info@example.com</a>"#;
        assert_eq!(
            extract_emails_from_html("example.com", html),
            set(&["info@example.com"])
        );
    }

    #[test]
    fn decodes_entity_encoded_addresses() {
        let html = "<p>press&#64;example.com and jobs&amp;#64;example.com</p>";
        assert_eq!(
            extract_emails_from_html("example.com", html),
            set(&["press@example.com", "jobs@example.com"])
        );
    }

    #[test]
    fn adjacent_elements_do_not_fuse_into_an_address() {
        let html = "<p><b>Sales</b><span>sales@example.com</span></p>";
        assert_eq!(
            extract_emails_from_html("example.com", html),
            set(&["sales@example.com"])
        );
    }

    #[test]
    fn decode_leaves_angle_brackets_as_text() {
        assert_eq!(decode_html_entities("<a@example.com> &#64;"), "<a@example.com> @");
        assert_eq!(decode_html_entities("plain"), "plain");
    }

    #[test]
    fn search_links_skip_navigation_and_plain_http() {
        let html = r##"
            <a href="/search?q=example.com&start=10">Next</a>
            <a href="/search?q=site:linkedin.com+example.com">Related</a>
            <a href="https://www.example.com/contact">Contact</a>
            <a href="http://insecure.example.com/">Insecure</a>
            <a href="/url?q=https://blog.example.com/team&sa=U">Team</a>
            <a href="https://www.example.com/contact">Duplicate</a>
            <a href="#">Anchor</a>
        "##;
        assert_eq!(
            extract_search_links(html),
            vec![
                "https://www.example.com/contact".to_string(),
                "https://blog.example.com/team".to_string(),
            ]
        );
    }
}
