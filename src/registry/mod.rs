//! Per-publisher extraction instructions.
//!
//! An [`InstructionSet`] maps field names to ordered lists of
//! [`QueryGroup`]s. The [`InstructionRegistry`] holds one set per
//! [`Publisher`] and is immutable once built: sets can only be added
//! through [`InstructionRegistryBuilder`], and a publisher can only be
//! added once.
//!
//! Field names are kept as declared so that a set naming a column outside
//! [`SchemaField`] can be detected ([`InstructionSet::in_scope`]) and
//! rejected at extraction time instead of being silently truncated.

use crate::error::RegistryError;
use crate::models::{Publisher, SchemaField};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument, warn};

const BUILTIN_INSTRUCTIONS: &str = include_str!("instructions.yaml");

/// One fallback rule for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryGroup {
    /// First match of one query, trimmed.
    Single(String),
    /// Every match of every query, in declared order, newline-joined.
    Multi(Vec<String>),
}

impl QueryGroup {
    pub fn single(query: impl Into<String>) -> Self {
        QueryGroup::Single(query.into())
    }

    pub fn multi<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryGroup::Multi(queries.into_iter().map(Into::into).collect())
    }

    /// The query strings in this group, in declared order.
    pub fn queries(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            QueryGroup::Single(query) => std::slice::from_ref(query),
            QueryGroup::Multi(queries) => queries,
        };
        slice.iter().map(String::as_str)
    }
}

/// The extraction rules of one publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructionSet {
    fields: BTreeMap<String, Vec<QueryGroup>>,
}

impl InstructionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the candidate groups for a schema field.
    pub fn with(mut self, field: SchemaField, groups: Vec<QueryGroup>) -> Self {
        self.fields.insert(field.as_str().to_string(), groups);
        self
    }

    /// Add groups under an arbitrary field name. Names outside
    /// [`SchemaField`] make the set out of scope.
    pub fn with_raw(mut self, field: impl Into<String>, groups: Vec<QueryGroup>) -> Self {
        self.fields.insert(field.into(), groups);
        self
    }

    /// Declared field names, sorted.
    pub fn declared_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Declared field names that are not schema fields.
    pub fn out_of_scope_fields(&self) -> Vec<&str> {
        self.declared_fields()
            .filter(|name| name.parse::<SchemaField>().is_err())
            .collect()
    }

    /// True iff every declared field is a [`SchemaField`].
    pub fn in_scope(&self) -> bool {
        self.out_of_scope_fields().is_empty()
    }

    /// Candidate groups for `field`; empty when undeclared.
    pub fn groups(&self, field: SchemaField) -> &[QueryGroup] {
        self.fields
            .get(field.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn queries(&self) -> impl Iterator<Item = &str> {
        self.fields.values().flatten().flat_map(QueryGroup::queries)
    }
}

/// Read-only publisher → instruction set table.
#[derive(Debug, Clone, Default)]
pub struct InstructionRegistry {
    sets: BTreeMap<Publisher, InstructionSet>,
}

impl InstructionRegistry {
    pub fn builder() -> InstructionRegistryBuilder {
        InstructionRegistryBuilder::default()
    }

    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml_str(BUILTIN_INSTRUCTIONS)
    }

    /// Parse a YAML table keyed by publisher name.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let table: BTreeMap<Publisher, InstructionSet> = serde_yaml::from_str(yaml)?;
        table
            .into_iter()
            .try_fold(Self::builder(), |builder, (publisher, set)| {
                builder.insert(publisher, set)
            })
            .map(InstructionRegistryBuilder::build)
    }

    /// Load a YAML table from disk.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// The instruction set for `publisher`.
    pub fn get(&self, publisher: Publisher) -> Result<&InstructionSet, RegistryError> {
        self.sets
            .get(&publisher)
            .ok_or(RegistryError::NotFound(publisher))
    }

    /// Whether `publisher` has a set whose fields are all schema fields.
    /// Unknown publishers are never in scope.
    pub fn in_scope(&self, publisher: Publisher) -> bool {
        self.get(publisher).is_ok_and(InstructionSet::in_scope)
    }

    pub fn publishers(&self) -> impl Iterator<Item = Publisher> + '_ {
        self.sets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Every query string in the table, for validation at startup.
    pub fn queries(&self) -> impl Iterator<Item = (Publisher, &str)> {
        self.sets
            .iter()
            .flat_map(|(publisher, set)| set.queries().map(move |q| (*publisher, q)))
    }
}

/// Append-only builder for [`InstructionRegistry`].
#[derive(Debug, Default)]
pub struct InstructionRegistryBuilder {
    sets: BTreeMap<Publisher, InstructionSet>,
}

impl InstructionRegistryBuilder {
    /// Register `set` for `publisher`. Each publisher can be registered
    /// once; [`Publisher::Unknown`] cannot be registered.
    pub fn insert(mut self, publisher: Publisher, set: InstructionSet) -> Result<Self, RegistryError> {
        if publisher == Publisher::Unknown {
            return Err(RegistryError::UnknownPublisher);
        }
        if self.sets.contains_key(&publisher) {
            return Err(RegistryError::Duplicate(publisher));
        }
        if !set.in_scope() {
            warn!(
                %publisher,
                fields = ?set.out_of_scope_fields(),
                "Instruction set declares fields outside the schema; its articles will not be parsed"
            );
        }
        self.sets.insert(publisher, set);
        Ok(self)
    }

    pub fn build(self) -> InstructionRegistry {
        let configured = self.sets.values().filter(|set| !set.is_empty()).count();
        info!(
            publishers = self.sets.len(),
            configured, "Instruction registry loaded"
        );
        InstructionRegistry { sets: self.sets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_loads() {
        let registry = InstructionRegistry::builtin().unwrap();
        assert_eq!(registry.len(), Publisher::KNOWN.len());
        assert!(registry.publishers().all(|p| p != Publisher::Unknown));

        let fastmarkets = registry.get(Publisher::Fastmarkets).unwrap();
        assert_eq!(
            fastmarkets.groups(SchemaField::Title),
            &[QueryGroup::single("h1[class='Page-headline']")]
        );
        assert!(matches!(
            fastmarkets.groups(SchemaField::Content),
            [QueryGroup::Multi(_)]
        ));
        assert!(registry.in_scope(Publisher::Fastmarkets));

        let reuters = registry.get(Publisher::Reuters).unwrap();
        assert!(reuters.is_empty());
        assert!(registry.in_scope(Publisher::Reuters));
    }

    #[test]
    fn test_every_builtin_query_compiles() {
        let registry = InstructionRegistry::builtin().unwrap();
        let engine = crate::selector::HtmlSelectorEngine::new();
        let mut checked = 0;
        for (publisher, query) in registry.queries() {
            if let Err(e) = engine.check(query) {
                panic!("{publisher}: `{query}` does not compile: {e}");
            }
            checked += 1;
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_builtin_has_no_duplicate_fallbacks() {
        let registry = InstructionRegistry::builtin().unwrap();
        for publisher in [Publisher::FasUsda, Publisher::EnergyInformationAdministration] {
            let set = registry.get(publisher).unwrap();
            assert_eq!(set.groups(SchemaField::Content).len(), 1, "{publisher}");
        }
    }

    #[test]
    fn test_get_unknown_publisher_fails() {
        let registry = InstructionRegistry::builtin().unwrap();
        assert!(matches!(
            registry.get(Publisher::Unknown),
            Err(RegistryError::NotFound(Publisher::Unknown))
        ));
        assert!(!registry.in_scope(Publisher::Unknown));
    }

    #[test]
    fn test_out_of_scope_set() {
        let set = InstructionSet::new()
            .with(SchemaField::Title, vec![QueryGroup::single("h1")])
            .with_raw("subtitle", vec![QueryGroup::single("h2")]);
        assert!(!set.in_scope());
        assert_eq!(set.out_of_scope_fields(), vec!["subtitle"]);

        let registry = InstructionRegistry::builder()
            .insert(Publisher::Nature, set)
            .unwrap()
            .build();
        assert!(registry.get(Publisher::Nature).is_ok());
        assert!(!registry.in_scope(Publisher::Nature));
    }

    #[test]
    fn test_builder_is_append_only() {
        let builder = InstructionRegistry::builder()
            .insert(Publisher::Reuters, InstructionSet::new())
            .unwrap();
        assert!(matches!(
            builder.insert(Publisher::Reuters, InstructionSet::new()),
            Err(RegistryError::Duplicate(Publisher::Reuters))
        ));
        assert!(matches!(
            InstructionRegistry::builder().insert(Publisher::Unknown, InstructionSet::new()),
            Err(RegistryError::UnknownPublisher)
        ));
    }

    #[test]
    fn test_yaml_group_shapes() {
        let yaml = r#"
Nature:
  title:
    - "h1.title"
    - - "h1 span"
      - "h2"
  subtitle:
    - "h2"
"#;
        let registry = InstructionRegistry::from_yaml_str(yaml).unwrap();
        let set = registry.get(Publisher::Nature).unwrap();
        assert_eq!(
            set.groups(SchemaField::Title),
            &[
                QueryGroup::single("h1.title"),
                QueryGroup::multi(["h1 span", "h2"]),
            ]
        );
        assert!(set.groups(SchemaField::Author).is_empty());
        assert!(!set.in_scope());
    }

    #[test]
    fn test_yaml_rejects_unknown_publisher_names() {
        let yaml = "Daily Planet:\n  title:\n    - h1\n";
        assert!(matches!(
            InstructionRegistry::from_yaml_str(yaml),
            Err(RegistryError::Parse(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "Reuters:\n  title:\n    - h1\n").unwrap();
        let registry = InstructionRegistry::from_path(&path).unwrap();
        assert_eq!(registry.len(), 1);

        let missing = InstructionRegistry::from_path(dir.path().join("nope.yaml"));
        assert!(matches!(missing, Err(RegistryError::Io { .. })));
    }

    #[test]
    fn test_group_queries_in_order() {
        let group = QueryGroup::multi(["a", "b", "c"]);
        assert_eq!(group.queries().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        let single = QueryGroup::single("x");
        assert_eq!(single.queries().collect::<Vec<_>>(), vec!["x"]);
    }
}
