//! Fallback selector chains.
//!
//! Each article field is read through an ordered list of [`Selector`]s; the
//! first one that yields non-empty text wins. A selector either reads the
//! matched element's text or, when paired with an attribute name, that
//! attribute's value.

use crate::config::ConfigError;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

/// One extraction strategy in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SelectorRepr", into = "SelectorRepr")]
pub enum Selector {
    /// Read the text of the first element matching the CSS selector.
    Plain(String),
    /// Read the named attribute of the first element matching the CSS
    /// selector.
    WithAttribute(String, String),
}

impl Selector {
    pub fn css(&self) -> &str {
        match self {
            Selector::Plain(css) | Selector::WithAttribute(css, _) => css,
        }
    }
}

/// On-disk form: `{ kind: plain, css }` or `{ kind: attribute, css, attr }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SelectorRepr {
    Plain { css: String },
    Attribute { css: String, attr: String },
}

impl From<SelectorRepr> for Selector {
    fn from(repr: SelectorRepr) -> Self {
        match repr {
            SelectorRepr::Plain { css } => Selector::Plain(css),
            SelectorRepr::Attribute { css, attr } => Selector::WithAttribute(css, attr),
        }
    }
}

impl From<Selector> for SelectorRepr {
    fn from(selector: Selector) -> Self {
        match selector {
            Selector::Plain(css) => SelectorRepr::Plain { css },
            Selector::WithAttribute(css, attr) => SelectorRepr::Attribute { css, attr },
        }
    }
}

/// Parse a CSS selector, turning the borrowed parse error into a
/// [`ConfigError`].
pub fn parse_css(css: &str) -> Result<scraper::Selector, ConfigError> {
    scraper::Selector::parse(css).map_err(|e| ConfigError::InvalidSelector {
        css: css.to_string(),
        reason: e.to_string(),
    })
}

/// A [`Selector`] with its CSS compiled.
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    css: scraper::Selector,
    attr: Option<String>,
}

impl CompiledSelector {
    pub fn compile(selector: &Selector) -> Result<Self, ConfigError> {
        let attr = match selector {
            Selector::Plain(_) => None,
            Selector::WithAttribute(_, attr) => Some(attr.clone()),
        };
        Ok(Self {
            css: parse_css(selector.css())?,
            attr,
        })
    }

    pub fn first_match<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        doc.select(&self.css).next()
    }

    /// Read this selector's value from `element`.
    ///
    /// An attribute selector falls back to the element text when the
    /// attribute is absent.
    pub fn read(&self, element: ElementRef<'_>) -> String {
        if let Some(value) = self.attr.as_deref().and_then(|a| element.value().attr(a)) {
            return value.trim().to_string();
        }
        spaced_text(element)
    }
}

/// An ordered fallback chain of compiled selectors.
#[derive(Debug, Clone, Default)]
pub struct SelectorChain {
    selectors: Vec<CompiledSelector>,
}

impl SelectorChain {
    pub fn compile(selectors: &[Selector]) -> Result<Self, ConfigError> {
        let selectors = selectors
            .iter()
            .map(CompiledSelector::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { selectors })
    }

    /// First non-empty value produced by the chain, or an empty string when
    /// every selector misses.
    pub fn extract(&self, doc: &Html) -> String {
        self.selectors
            .iter()
            .filter_map(|sel| sel.first_match(doc).map(|el| sel.read(el)))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }

    /// Every element matched by the chain, in chain order.
    pub fn matches<'a>(&'a self, doc: &'a Html) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.selectors.iter().filter_map(move |sel| sel.first_match(doc))
    }
}

/// Trimmed text nodes of `element` joined with single spaces.
pub fn spaced_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
