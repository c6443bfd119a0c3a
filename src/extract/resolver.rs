//! Evaluation of a single candidate query group.

use crate::models::SchemaField;
use crate::registry::QueryGroup;
use crate::selector::{QuerySyntax, SelectorEngine};
use tracing::{debug, warn};

/// Resolves candidate query groups against a parsed document.
///
/// Query failures never escape: an engine error is logged and counted as
/// zero matches.
#[derive(Debug)]
pub struct FieldResolver<'e, E> {
    engine: &'e E,
}

impl<'e, E: SelectorEngine> FieldResolver<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        FieldResolver { engine }
    }

    pub fn engine(&self) -> &'e E {
        self.engine
    }

    /// Dispatch on the group's shape.
    pub fn resolve(
        &self,
        field: SchemaField,
        group: &QueryGroup,
        doc: &E::Document,
    ) -> Option<String> {
        match group {
            QueryGroup::Single(query) => self.resolve_single(field, query, doc),
            QueryGroup::Multi(queries) => self.resolve_group(field, queries.as_slice(), doc),
        }
    }

    /// First matched fragment, trimmed. Absent when nothing matches or the
    /// first fragment trims to nothing.
    pub fn resolve_single(
        &self,
        field: SchemaField,
        query: &str,
        doc: &E::Document,
    ) -> Option<String> {
        let value = self
            .fragments(field, query, doc)
            .into_iter()
            .next()
            .map(|fragment| fragment.trim().to_string())
            .filter(|value| !value.is_empty());
        debug!(%field, query, found = value.is_some(), "Single-value query evaluated");
        value
    }

    /// All fragments of all queries, in declared query order then match
    /// order, each trimmed, joined with `\n`. Absent when no query matches.
    pub fn resolve_group<S: AsRef<str>>(
        &self,
        field: SchemaField,
        queries: &[S],
        doc: &E::Document,
    ) -> Option<String> {
        let fragments: Vec<String> = queries
            .iter()
            .flat_map(|query| self.fragments(field, query.as_ref(), doc))
            .map(|fragment| fragment.trim().to_string())
            .filter(|fragment| !fragment.is_empty())
            .collect();
        debug!(
            %field,
            queries = queries.len(),
            fragments = fragments.len(),
            "Multi-value group evaluated"
        );
        if fragments.is_empty() {
            None
        } else {
            Some(fragments.join("\n"))
        }
    }

    fn fragments(&self, field: SchemaField, query: &str, doc: &E::Document) -> Vec<String> {
        let syntax = QuerySyntax::classify(query);
        match self.engine.query(doc, query, syntax) {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!(%field, query, syntax = syntax.label(), error = %e, "Query failed; treating as no match");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::HtmlSelectorEngine;

    const PAGE: &str = r#"
        <html><body>
            <h1 class="title">
                Fuel prices climb
            </h1>
            <div class="body">
                <p> A </p>
                <p>B</p>
            </div>
            <aside><p>  C  </p></aside>
            <span class="blank">   </span>
        </body></html>
    "#;

    #[test]
    fn test_resolve_single_trims_first_match() {
        let engine = HtmlSelectorEngine::new();
        let doc = engine.parse(PAGE);
        let resolver = FieldResolver::new(&engine);
        assert_eq!(
            resolver.resolve_single(SchemaField::Title, "h1.title", &doc),
            Some("Fuel prices climb".to_string())
        );
        assert_eq!(
            resolver.resolve_single(SchemaField::Content, "div.body p", &doc),
            Some("A".to_string())
        );
    }

    #[test]
    fn test_resolve_single_absent() {
        let engine = HtmlSelectorEngine::new();
        let doc = engine.parse(PAGE);
        let resolver = FieldResolver::new(&engine);
        assert_eq!(resolver.resolve_single(SchemaField::Date, "time", &doc), None);
        assert_eq!(resolver.resolve_single(SchemaField::Date, "span.blank", &doc), None);
        assert_eq!(resolver.resolve_single(SchemaField::Date, "p[[", &doc), None);
    }

    #[test]
    fn test_resolve_group_keeps_declared_order() {
        let engine = HtmlSelectorEngine::new();
        let doc = engine.parse(PAGE);
        let resolver = FieldResolver::new(&engine);
        assert_eq!(
            resolver.resolve_group(SchemaField::Content, &["div.body p", "aside p"], &doc),
            Some("A\nB\nC".to_string())
        );
        assert_eq!(
            resolver.resolve_group(SchemaField::Content, &["aside p", "div.body p"], &doc),
            Some("C\nA\nB".to_string())
        );
    }

    #[test]
    fn test_resolve_group_skips_failing_queries() {
        let engine = HtmlSelectorEngine::new();
        let doc = engine.parse(PAGE);
        let resolver = FieldResolver::new(&engine);
        let queries = ["//div/ancestor::body", "aside p"];
        assert_eq!(
            resolver.resolve_group(SchemaField::Content, &queries, &doc),
            Some("C".to_string())
        );
        let nothing: [&str; 2] = ["table td", "//section/p"];
        assert_eq!(resolver.resolve_group(SchemaField::Content, &nothing, &doc), None);
        let empty: [&str; 0] = [];
        assert_eq!(resolver.resolve_group(SchemaField::Content, &empty, &doc), None);
    }
}
