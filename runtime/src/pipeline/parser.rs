//! Page parsing: turn fetched bodies into source posts.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One user post or page section, before extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePost {
    pub text: String,
    pub source_key: String,
    pub source_url: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Author, posting date and the like, carried through to the stored spot.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Source-specific page structure lives behind this trait.
pub trait PageParser: Send + Sync {
    fn parse(&self, source_key: &str, url: &str, body: &str) -> Vec<SourcePost>;
}

/// Generic parser: one post per `article`/post-like block, else the whole page.
pub struct TextPageParser {
    post_css: String,
}

const POST_SELECTOR: &str = "article, .post, .message, .comment, [itemprop=articleBody]";

impl TextPageParser {
    pub fn new() -> Self {
        Self {
            post_css: POST_SELECTOR.to_string(),
        }
    }

    /// Parser using a custom CSS selector for post blocks. `None` if it does not parse.
    pub fn with_selector(css: &str) -> Option<Self> {
        Selector::parse(css).ok()?;
        Some(Self {
            post_css: css.to_string(),
        })
    }
}

impl Default for TextPageParser {
    fn default() -> Self {
        Self::new()
    }
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

impl PageParser for TextPageParser {
    fn parse(&self, source_key: &str, url: &str, body: &str) -> Vec<SourcePost> {
        let document = Html::parse_document(body);
        let post = |text: String, name: Option<String>| SourcePost {
            text,
            source_key: source_key.to_string(),
            source_url: url.to_string(),
            name,
            metadata: BTreeMap::new(),
        };

        let mut posts = Vec::new();
        if let (Ok(block), Ok(title)) = (
            Selector::parse(&self.post_css),
            Selector::parse("h1, h2, h3, .title"),
        ) {
            for el in document.select(&block) {
                let text = collapse(el.text());
                if text.is_empty() || posts.iter().any(|p: &SourcePost| p.text == text) {
                    continue;
                }
                let name = el
                    .select(&title)
                    .next()
                    .map(|t| collapse(t.text()))
                    .filter(|t| !t.is_empty());
                posts.push(post(text, name));
            }
        }

        if posts.is_empty() {
            let text = collapse(document.root_element().text());
            if !text.is_empty() {
                posts.push(post(text, None));
            }
        }
        posts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_post_per_article() {
        let html = r#"<html><body>
            <article><h2>Lac de Montbel</h2><p>Baignade 42.97, 1.92</p></article>
            <article><p>Grotte   cachée</p></article>
        </body></html>"#;
        let posts = TextPageParser::new().parse("forum", "https://forum.example/t/1", html);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].name.as_deref(), Some("Lac de Montbel"));
        assert!(posts[0].text.contains("42.97, 1.92"));
        assert_eq!(posts[1].text, "Grotte cachée");
        assert_eq!(posts[1].source_key, "forum");
    }

    #[test]
    fn test_plain_text_body_is_one_post() {
        let posts = TextPageParser::new().parse(
            "forum",
            "https://forum.example/t/2",
            "Cascade secrète, lat:44.123 long:3.456, baignade",
        );
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, "Cascade secrète, lat:44.123 long:3.456, baignade");
    }

    #[test]
    fn test_custom_selector() {
        let parser = TextPageParser::with_selector("div.entry").unwrap();
        let posts = parser.parse("blog", "https://blog.example/", r#"<div class="entry">Pont du Diable</div>"#);
        assert_eq!(posts[0].text, "Pont du Diable");
        assert!(TextPageParser::with_selector("[[[").is_none());
    }
}
