//! Article page extraction.
//!
//! Every field is read through its own fallback chain (see
//! [`SelectorChain`]). The body gets extra treatment: boilerplate blocks are
//! skipped, direct paragraph/block children are joined line by line, and a
//! candidate that is too short falls through to the next selector. A missing
//! byline is recovered from the body text when it mentions a reporter.

use crate::config::{ConfigError, ExtractionConfig};
use crate::models::ArticleRecord;
use crate::net::clock::Clock;
use crate::net::fetcher::PageSource;
use crate::scrapers::selector::{SelectorChain, parse_css};
use ego_tree::{NodeId, NodeRef};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A two-to-five syllable Korean name followed by a reporter title.
static BYLINE_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([가-힣]{2,5}\s*(기자|특파원))").expect("byline pattern"));

pub struct ArticleExtractor {
    source: Arc<dyn PageSource>,
    clock: Arc<dyn Clock>,
    title: SelectorChain,
    press: SelectorChain,
    date: SelectorChain,
    body: SelectorChain,
    reporter: SelectorChain,
    boilerplate: Vec<scraper::Selector>,
    min_content_length: usize,
    max_content_length: usize,
}

impl ArticleExtractor {
    /// Compile every selector in `config`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidSelector`] for the first selector that does not
    /// parse.
    pub fn new(
        config: &ExtractionConfig,
        source: Arc<dyn PageSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            source,
            clock,
            title: SelectorChain::compile(&config.title)?,
            press: SelectorChain::compile(&config.press)?,
            date: SelectorChain::compile(&config.date)?,
            body: SelectorChain::compile(&config.body)?,
            reporter: SelectorChain::compile(&config.reporter)?,
            boilerplate: config
                .boilerplate_selectors
                .iter()
                .map(|css| parse_css(css))
                .collect::<Result<_, _>>()?,
            min_content_length: config.min_content_length,
            max_content_length: config.max_content_length,
        })
    }

    /// Fetch and parse one article. A page that cannot be fetched yields a
    /// record holding only its url.
    #[instrument(level = "info", skip(self))]
    pub async fn extract(&self, url: &str) -> ArticleRecord {
        match self.source.fetch(url).await {
            Ok(html) => self.parse(url, &html),
            Err(e) => {
                warn!(%url, error = %e, "Article fetch failed; returning empty record");
                ArticleRecord::empty(url, self.clock.now())
            }
        }
    }

    pub fn parse(&self, url: &str, html: &str) -> ArticleRecord {
        let doc = Html::parse_document(html);

        let body = self.body_text(&doc);
        let mut byline = self.reporter.extract(&doc);
        if byline.is_empty() {
            byline = byline_from_text(&body).unwrap_or_default();
        }

        let record = ArticleRecord {
            url: url.to_string(),
            title: self.title.extract(&doc),
            source_name: self.press.extract(&doc),
            published: self.date.extract(&doc),
            body,
            byline,
            extracted_at: self.clock.now(),
        };

        if record.title.is_empty() {
            warn!(%url, "No title found on article page");
        } else {
            debug!(
                %url,
                title = %record.title,
                body_chars = record.body.chars().count(),
                "Parsed article"
            );
        }
        record
    }

    fn body_text(&self, doc: &Html) -> String {
        for element in self.body.matches(doc) {
            let skipped: HashSet<NodeId> = self
                .boilerplate
                .iter()
                .flat_map(|sel| element.select(sel))
                .map(|el| el.id())
                .collect();

            let text = block_text(element, &skipped);
            let chars = text.chars().count();
            if chars < self.min_content_length {
                debug!(chars, min = self.min_content_length, "Body candidate too short; trying next selector");
                continue;
            }
            if chars > self.max_content_length {
                debug!(chars, max = self.max_content_length, "Truncating body");
                return text.chars().take(self.max_content_length).collect();
            }
            return text;
        }
        String::new()
    }
}

/// Text of the direct `p`/`div` children, one per line, or the whole
/// element's text when it has none. Subtrees in `skipped` contribute nothing.
fn block_text(element: ElementRef<'_>, skipped: &HashSet<NodeId>) -> String {
    let paragraphs: Vec<String> = element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| matches!(child.value().name(), "p" | "div"))
        .map(|child| squashed_text(*child, skipped))
        .filter(|text| !text.is_empty())
        .collect();

    if paragraphs.is_empty() {
        squashed_text(*element, skipped)
    } else {
        paragraphs.join("\n")
    }
}

/// Trimmed text nodes concatenated without separators.
fn squashed_text(node: NodeRef<'_, Node>, skipped: &HashSet<NodeId>) -> String {
    let mut out = String::new();
    push_text(node, skipped, &mut out);
    out
}

fn push_text(node: NodeRef<'_, Node>, skipped: &HashSet<NodeId>, out: &mut String) {
    if skipped.contains(&node.id()) {
        return;
    }
    match node.value() {
        Node::Text(text) => out.push_str(text.trim()),
        _ => {
            for child in node.children() {
                push_text(child, skipped, out);
            }
        }
    }
}

/// First "<name> 기자" / "<name> 특파원" mention in `text`.
pub fn byline_from_text(text: &str) -> Option<String> {
    BYLINE_IN_TEXT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}
