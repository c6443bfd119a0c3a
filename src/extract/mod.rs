//! Record extraction with ordered fallback resolution.
//!
//! For every [`SchemaField`] the extractor walks the publisher's candidate
//! groups in declaration order and keeps the first non-absent value; later
//! groups are never evaluated. Extraction never fails: missing
//! configuration degrades the record to identity fields only, and missing
//! matches leave single fields absent. Both cases are reported as [`Gap`]s.

mod resolver;

pub use resolver::FieldResolver;

use crate::models::{Publisher, Record, SchemaField, SearchResult};
use crate::registry::{InstructionRegistry, QueryGroup};
use crate::selector::SelectorEngine;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

/// Why a record was degraded to identity fields only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationGap {
    /// No instruction set is registered for the publisher.
    MissingInstructions,
    /// The instruction set declares fields outside the schema.
    OutOfScope { fields: Vec<String> },
}

/// A non-fatal extraction shortfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gap {
    /// Every candidate group for `field` came back absent.
    Coverage {
        publisher: Publisher,
        url: String,
        field: SchemaField,
    },
    /// The publisher's configuration could not be used.
    Configuration {
        publisher: Publisher,
        url: String,
        reason: ConfigurationGap,
    },
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gap::Coverage { publisher, field, url } => {
                write!(f, "no {field} found for \"{publisher}\" article {url}")
            }
            Gap::Configuration { publisher, reason, url } => match reason {
                ConfigurationGap::MissingInstructions => {
                    write!(f, "no instructions for \"{publisher}\" (article {url})")
                }
                ConfigurationGap::OutOfScope { fields } => write!(
                    f,
                    "instructions for \"{publisher}\" declare unsupported fields {fields:?} (article {url})"
                ),
            },
        }
    }
}

/// A record together with the gaps found while extracting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub record: Record,
    pub gaps: Vec<Gap>,
}

/// Builds [`Record`]s from fetched articles.
pub struct RecordExtractor<'a, E> {
    registry: &'a InstructionRegistry,
    resolver: FieldResolver<'a, E>,
}

impl<'a, E: SelectorEngine> RecordExtractor<'a, E> {
    pub fn new(registry: &'a InstructionRegistry, engine: &'a E) -> Self {
        RecordExtractor {
            registry,
            resolver: FieldResolver::new(engine),
        }
    }

    /// Try `groups` in order; the first non-absent value wins.
    ///
    /// Logs a coverage gap when every group is absent.
    pub fn extract(
        &self,
        publisher: Publisher,
        field: SchemaField,
        groups: &[QueryGroup],
        doc: &E::Document,
    ) -> Option<String> {
        let found = groups
            .iter()
            .enumerate()
            .find_map(|(index, group)| {
                self.resolver
                    .resolve(field, group, doc)
                    .map(|value| (index, value))
            });
        match found {
            Some((index, value)) => {
                info!(%field, %publisher, group = index, "Parsed the article's {field}");
                Some(value)
            }
            None => {
                warn!(
                    %field,
                    %publisher,
                    groups = groups.len(),
                    "No {field} parsed; either absent from the page or \"{publisher}\" needs a new instruction"
                );
                None
            }
        }
    }

    /// Extract one record. Never fails; see [`RecordExtractor::extract_with_gaps`].
    pub fn extract_record(&self, result: &SearchResult) -> Record {
        self.extract_with_gaps(result).record
    }

    /// Extract one record and report the gaps encountered.
    #[instrument(level = "info", skip_all, fields(publisher = %result.article.publisher, url = %result.article.url))]
    pub fn extract_with_gaps(&self, result: &SearchResult) -> Extraction {
        let publisher = result.article.publisher;
        let url = &result.article.url;
        let mut record = Record::identity(result);
        let mut gaps = Vec::new();

        let set = match self.registry.get(publisher) {
            Ok(set) => set,
            Err(e) => {
                error!(error = %e, "Unable to parse the article; add instructions for this publisher");
                gaps.push(Gap::Configuration {
                    publisher,
                    url: url.clone(),
                    reason: ConfigurationGap::MissingInstructions,
                });
                return Extraction { record, gaps };
            }
        };

        if !set.in_scope() {
            let fields: Vec<String> = set
                .out_of_scope_fields()
                .into_iter()
                .map(str::to_string)
                .collect();
            error!(?fields, "Instructions out of scope; update the parser config for this publisher");
            gaps.push(Gap::Configuration {
                publisher,
                url: url.clone(),
                reason: ConfigurationGap::OutOfScope { fields },
            });
            return Extraction { record, gaps };
        }

        let doc = self.resolver.engine().parse(&result.article.html);
        for field in SchemaField::ALL {
            let groups = set.groups(field);
            if groups.is_empty() {
                debug!(%field, "No instructions declared for field");
                continue;
            }
            let value = self.extract(publisher, field, groups, &doc);
            if value.is_none() {
                gaps.push(Gap::Coverage {
                    publisher,
                    url: url.clone(),
                    field,
                });
            }
            record.set_field(field, value);
        }

        info!(gaps = gaps.len(), "Finished parsing the article");
        Extraction { record, gaps }
    }
}
