//! Record types and the schema registry.
//!
//! Relations are looked up by exact name in a registry built once at
//! startup. There is no accessor-name convention and no reflection: a
//! record type lists its relations explicitly through [`RecordTypeBuilder`].

#![allow(clippy::result_large_err)]

use crate::record::{Record, RecordRef};
use crate::relationship::{RelationDescriptor, ViaSpec};
use ormlink_core::{ConfigErrorKind, Error, Result, Row};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A record type: table, key, attributes and declared relations.
#[derive(Debug)]
pub struct RecordType {
    name: String,
    table: String,
    primary_key: Vec<String>,
    attributes: Vec<String>,
    relations: Vec<Arc<RelationDescriptor>>,
    relation_index: HashMap<String, usize>,
}

/// Builder for [`RecordType`].
#[derive(Debug)]
pub struct RecordTypeBuilder {
    name: String,
    table: Option<String>,
    primary_key: Vec<String>,
    attributes: Vec<String>,
    relations: Vec<RelationDescriptor>,
}

impl RecordTypeBuilder {
    /// Table name (defaults to the type name).
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Primary key attributes (defaults to `["id"]`).
    #[must_use]
    pub fn primary_key<S: Into<String>>(mut self, attributes: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Declared attributes.
    ///
    /// Optional for relation loading. Joined eager loading needs them to
    /// build its column list, and link attributes are checked against them
    /// when present.
    #[must_use]
    pub fn attributes<S: Into<String>>(mut self, attributes: impl IntoIterator<Item = S>) -> Self {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a relation. A later declaration with the same name replaces
    /// the earlier one.
    #[must_use]
    pub fn relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.retain(|r| r.name() != relation.name());
        self.relations.push(relation);
        self
    }

    pub fn build(self) -> RecordType {
        let relations: Vec<Arc<RelationDescriptor>> =
            self.relations.into_iter().map(Arc::new).collect();
        let relation_index = relations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name().to_string(), i))
            .collect();
        RecordType {
            table: self.table.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            primary_key: self.primary_key,
            attributes: self.attributes,
            relations,
            relation_index,
        }
    }
}

impl RecordType {
    /// Start declaring a record type.
    pub fn builder(name: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.into(),
            table: None,
            primary_key: vec!["id".to_string()],
            attributes: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Declared attributes (possibly empty).
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Does this type declare `attribute`? Types that declare no
    /// attributes accept any name.
    pub fn accepts_attribute(&self, attribute: &str) -> bool {
        self.attributes.is_empty() || self.attributes.iter().any(|a| a == attribute)
    }

    /// Declared relations in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &Arc<RelationDescriptor>> {
        self.relations.iter()
    }

    /// Is a relation with exactly this name declared?
    pub fn has_relation(&self, name: &str) -> bool {
        self.relation_index.contains_key(name)
    }

    /// Look up a relation by exact name.
    ///
    /// A name that only differs in case from a declared relation is a
    /// [`ConfigErrorKind::RelationNameCase`] error rather than an unknown
    /// relation, so the mistake is easy to spot.
    pub fn relation(&self, name: &str) -> Result<&Arc<RelationDescriptor>> {
        if let Some(&idx) = self.relation_index.get(name) {
            return Ok(&self.relations[idx]);
        }
        if let Some(declared) = self
            .relations
            .iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
        {
            return Err(Error::config(
                ConfigErrorKind::RelationNameCase,
                format!(
                    "relation '{}' requested on {} but it is declared as '{}'",
                    name,
                    self.name,
                    declared.name()
                ),
            ));
        }
        Err(Error::config(
            ConfigErrorKind::UnknownRelation,
            format!("{} has no relation named '{}'", self.name, name),
        ))
    }

    /// Owner attributes a relation's value depends on.
    ///
    /// For a via relation these are the owner attributes of the junction
    /// hop, followed through nested vias.
    pub fn owner_link_attributes(&self, relation: &str) -> Result<Vec<String>> {
        let mut visited = HashSet::new();
        self.owner_link_attributes_inner(relation, &mut visited)
    }

    fn owner_link_attributes_inner(
        &self,
        relation: &str,
        visited: &mut HashSet<String>,
    ) -> Result<Vec<String>> {
        if !visited.insert(relation.to_string()) {
            return Err(Error::config(
                ConfigErrorKind::UnresolvableVia,
                format!("relation '{}' on {} routes through a cycle", relation, self.name),
            ));
        }
        let descriptor = self.relation(relation)?;
        match descriptor.via() {
            None => Ok(descriptor
                .local_attributes()
                .into_iter()
                .map(str::to_string)
                .collect()),
            Some(ViaSpec::Table(pivot)) => Ok(pivot
                .owner_attributes()
                .into_iter()
                .map(str::to_string)
                .collect()),
            Some(ViaSpec::Relation(via)) => self
                .owner_link_attributes_inner(via, visited)
                .map_err(|e| match e.config_kind() {
                    Some(ConfigErrorKind::UnknownRelation | ConfigErrorKind::RelationNameCase) => {
                        Error::config(
                            ConfigErrorKind::UnresolvableVia,
                            format!(
                                "relation '{}' on {} routes through '{}': {}",
                                relation, self.name, via, e
                            ),
                        )
                    }
                    _ => e,
                }),
        }
    }

    /// Names of relations whose value depends on `attribute`, in
    /// declaration order.
    ///
    /// Relations whose junction chain cannot be resolved are skipped here;
    /// they fail when resolved.
    pub fn relations_depending_on(&self, attribute: &str) -> Vec<String> {
        self.relations
            .iter()
            .filter(|r| {
                self.owner_link_attributes(r.name())
                    .is_ok_and(|attrs| attrs.iter().any(|a| a == attribute))
            })
            .map(|r| r.name().to_string())
            .collect()
    }
}

/// Registry of record types, keyed by exact type name.
#[derive(Debug, Default)]
pub struct Schema {
    types: HashMap<String, Arc<RecordType>>,
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: Vec<RecordType>,
}

impl SchemaBuilder {
    /// Register a record type. Registering a name twice keeps the last one.
    #[must_use]
    pub fn register(mut self, record_type: RecordType) -> Self {
        self.types.retain(|t| t.name() != record_type.name());
        self.types.push(record_type);
        self
    }

    pub fn build(self) -> Arc<Schema> {
        let types = self
            .types
            .into_iter()
            .map(|t| (t.name().to_string(), Arc::new(t)))
            .collect();
        Arc::new(Schema { types })
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up a record type by exact name.
    pub fn record_type(&self, name: &str) -> Result<&Arc<RecordType>> {
        if let Some(t) = self.types.get(name) {
            return Ok(t);
        }
        let hint = self
            .types
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .map(|k| format!(" (did you mean '{k}'?)"))
            .unwrap_or_default();
        Err(Error::config(
            ConfigErrorKind::UnknownRecordType,
            format!("record type '{name}' is not registered{hint}"),
        ))
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Wrap a row as a record of the named type.
    pub fn record(&self, type_name: &str, row: Row) -> Result<RecordRef> {
        let record_type = self.record_type(type_name)?;
        Ok(RecordRef::new(Record::new(Arc::clone(record_type), row)))
    }

    /// Wrap rows as records of the named type.
    pub fn records(
        &self,
        type_name: &str,
        rows: impl IntoIterator<Item = Row>,
    ) -> Result<Vec<RecordRef>> {
        let record_type = self.record_type(type_name)?;
        Ok(rows
            .into_iter()
            .map(|row| RecordRef::new(Record::new(Arc::clone(record_type), row)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::PivotTable;

    fn customer() -> RecordType {
        RecordType::builder("Customer")
            .table("customers")
            .relation(RelationDescriptor::has_many("Orders", "Order").link("id", "customer_id"))
            .relation(
                RelationDescriptor::has_many("order_items", "OrderItem")
                    .via_relation("Orders")
                    .link("id", "order_id"),
            )
            .relation(
                RelationDescriptor::has_many("tags", "Tag")
                    .via_table(PivotTable::new("customer_tags").link("region", "customer_region"))
                    .link("tag_id", "id"),
            )
            .relation(RelationDescriptor::has_many("loop_a", "X").via_relation("loop_b").link("a", "b"))
            .relation(RelationDescriptor::has_many("loop_b", "X").via_relation("loop_a").link("a", "b"))
            .build()
    }

    #[test]
    fn test_exact_lookup_and_case_mismatch() {
        let t = customer();
        assert!(t.relation("Orders").is_ok());
        let err = t.relation("orders").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::RelationNameCase));
        assert!(err.to_string().contains("'Orders'"));
        let err = t.relation("invoices").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownRelation));
    }

    #[test]
    fn test_defaults() {
        let t = RecordType::builder("Tag").build();
        assert_eq!(t.table(), "Tag");
        assert_eq!(t.primary_key(), ["id".to_string()]);
        assert!(t.accepts_attribute("anything"));
    }

    #[test]
    fn test_owner_link_attributes_follow_via() {
        let t = customer();
        assert_eq!(t.owner_link_attributes("Orders").unwrap(), vec!["id"]);
        assert_eq!(t.owner_link_attributes("order_items").unwrap(), vec!["id"]);
        assert_eq!(t.owner_link_attributes("tags").unwrap(), vec!["region"]);
        let err = t.owner_link_attributes("loop_a").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnresolvableVia));
    }

    #[test]
    fn test_relations_depending_on() {
        let t = customer();
        assert_eq!(t.relations_depending_on("id"), vec!["Orders", "order_items"]);
        assert_eq!(t.relations_depending_on("region"), vec!["tags"]);
        assert!(t.relations_depending_on("name").is_empty());
    }

    #[test]
    fn test_redeclared_relation_replaces() {
        let t = RecordType::builder("A")
            .relation(RelationDescriptor::has_one("b", "B").link("b_id", "id"))
            .relation(RelationDescriptor::has_many("b", "B").link("id", "a_id"))
            .build();
        assert_eq!(t.relations().count(), 1);
        assert!(t.relation("b").unwrap().is_many());
    }

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::builder().register(customer()).build();
        assert_eq!(schema.len(), 1);
        assert!(schema.record_type("Customer").is_ok());
        let err = schema.record_type("customer").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownRecordType));
        assert!(err.to_string().contains("did you mean 'Customer'"));
    }
}
