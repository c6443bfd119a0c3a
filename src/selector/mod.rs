//! Query syntax classification and the selector engine seam.
//!
//! Instruction queries come in two syntaxes. Path queries (anything
//! containing `/`) follow the XPath location-path style, tree queries
//! follow CSS. Each string maps to exactly one [`QuerySyntax`]:
//!
//! | Query shape | Class | Fragments returned |
//! |---|---|---|
//! | contains `/` and `text()` | [`QuerySyntax::PathText`] | direct text nodes of the selected elements |
//! | contains `/` | [`QuerySyntax::PathElements`] | every text node inside the selected elements |
//! | contains `::text` | [`QuerySyntax::Tree`] + [`TreeText::Direct`] | direct text nodes of the matches |
//! | anything else | [`QuerySyntax::Tree`] + [`TreeText::Descendant`] | every text node inside the matches |
//!
//! A path query whose only `text()` sits inside a predicate, such as
//! `//p[contains(text(), 'x')]`, still reads every text node of its matches.
//!
//! [`SelectorEngine`] is the capability the resolver runs queries through.
//! [`HtmlSelectorEngine`] implements it on top of `scraper`.

pub mod xpath;

use crate::error::SelectorError;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use xpath::PathQuery;
use tracing::trace;

/// How a tree query reads text out of its matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeText {
    /// The query was explicitly marked with `::text`.
    Direct,
    /// Unmarked; all descendant text is collected.
    Descendant,
}

/// The evaluation class of a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuerySyntax {
    PathText,
    PathElements,
    Tree(TreeText),
}

impl QuerySyntax {
    /// Classify a query string. Total and deterministic.
    pub fn classify(query: &str) -> Self {
        if query.contains('/') {
            if query.contains("text()") {
                QuerySyntax::PathText
            } else {
                QuerySyntax::PathElements
            }
        } else if query.contains("::text") {
            QuerySyntax::Tree(TreeText::Direct)
        } else {
            QuerySyntax::Tree(TreeText::Descendant)
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, QuerySyntax::PathText | QuerySyntax::PathElements)
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        if self.is_path() { "path" } else { "tree" }
    }
}

/// Runs queries against parsed documents.
///
/// Implementations return matched text fragments in document order and
/// return an empty list when nothing matches. An `Err` is reserved for
/// queries the engine cannot evaluate at all.
pub trait SelectorEngine {
    type Document;

    fn parse(&self, html: &str) -> Self::Document;

    fn query(
        &self,
        doc: &Self::Document,
        query: &str,
        syntax: QuerySyntax,
    ) -> Result<Vec<String>, SelectorError>;
}

/// [`SelectorEngine`] backed by `scraper`'s HTML parser and CSS matcher.
///
/// Path queries are translated onto CSS by [`xpath::translate`].
/// Whitespace-only text nodes are never reported as fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSelectorEngine;

impl HtmlSelectorEngine {
    pub fn new() -> Self {
        HtmlSelectorEngine
    }

    /// Compile `query` without running it.
    pub fn check(&self, query: &str) -> Result<QuerySyntax, SelectorError> {
        let syntax = QuerySyntax::classify(query);
        match syntax {
            QuerySyntax::PathText | QuerySyntax::PathElements => {
                compile(query, &xpath::translate(query)?.css)?;
            }
            QuerySyntax::Tree(TreeText::Direct) => {
                compile(query, &query.replace("::text", ""))?;
            }
            QuerySyntax::Tree(TreeText::Descendant) => {
                compile(query, query)?;
            }
        }
        Ok(syntax)
    }
}

impl SelectorEngine for HtmlSelectorEngine {
    type Document = Html;

    fn parse(&self, html: &str) -> Html {
        Html::parse_document(html)
    }

    fn query(
        &self,
        doc: &Html,
        query: &str,
        syntax: QuerySyntax,
    ) -> Result<Vec<String>, SelectorError> {
        let fragments: Vec<String> = match syntax {
            QuerySyntax::PathText | QuerySyntax::PathElements => {
                let path = xpath::translate(query)?;
                let selected = select_path(doc, query, &path)?;
                match path.text {
                    Some(step) => selected
                        .into_iter()
                        .flat_map(|el| direct_text(el, step.position))
                        .collect(),
                    None => selected.into_iter().flat_map(descendant_text).collect(),
                }
            }
            QuerySyntax::Tree(TreeText::Direct) => {
                let css = query.replace("::text", "");
                let selector = compile(query, &css)?;
                doc.select(&selector)
                    .flat_map(|el| direct_text(el, None))
                    .collect()
            }
            QuerySyntax::Tree(TreeText::Descendant) => {
                let selector = compile(query, query)?;
                doc.select(&selector).flat_map(descendant_text).collect()
            }
        };
        trace!(query, count = fragments.len(), "Evaluated query");
        Ok(fragments)
    }
}

fn compile(query: &str, css: &str) -> Result<Selector, SelectorError> {
    Selector::parse(css).map_err(|e| SelectorError::InvalidCss {
        query: query.to_string(),
        reason: e.to_string(),
    })
}

/// Elements selected by a translated path, in document order.
fn select_path<'a>(
    doc: &'a Html,
    query: &str,
    path: &PathQuery,
) -> Result<Vec<ElementRef<'a>>, SelectorError> {
    let selector = compile(query, &path.css)?;
    let matched = doc.select(&selector).filter(|el| {
        path.text_contains.iter().all(|needle| {
            el.children()
                .find_map(|child| child.value().as_text().map(|text| &**text))
                .is_some_and(|text| text.contains(needle.as_str()))
        })
    });
    let Some(parent) = &path.parent else {
        return Ok(matched.collect());
    };
    Ok(matched
        .filter_map(|el| el.parent().and_then(ElementRef::wrap))
        .filter(|p| {
            parent
                .tag
                .as_deref()
                .is_none_or(|tag| p.value().name().eq_ignore_ascii_case(tag))
        })
        .unique_by(|p| p.id())
        .collect())
}

/// Text nodes that are direct children of `el`. With a 1-based
/// `position`, only that text child is considered.
fn direct_text(el: ElementRef<'_>, position: Option<usize>) -> Vec<String> {
    let texts = el
        .children()
        .filter_map(|child| child.value().as_text())
        .map(|text| &**text);
    let picked: Vec<&str> = match position {
        Some(n) => texts.skip(n.saturating_sub(1)).take(1).collect(),
        None => texts.collect(),
    };
    picked
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Every text node in the subtree rooted at `el`.
fn descendant_text(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .collect()
}
