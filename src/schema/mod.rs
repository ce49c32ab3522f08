//! Structural Model of an External Database
//!
//! These types describe one extraction run against a target database: the raw
//! catalog entities (tables, columns, relationships, enums, indexes) plus the
//! entity types inferred from them.
//!
//! # Snapshot Semantics
//! An [`ExtractedSchema`] is produced once per extraction and never mutated
//! afterwards. A refresh builds a brand-new snapshot and replaces the cached one
//! wholesale. Ownership of a snapshot belongs to whichever store caches it; the
//! rest of the crate consumes it by reference.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column of a base table, as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,

    /// SQL-standard data type (e.g. `character varying`, `ARRAY`, `USER-DEFINED`)
    pub data_type: String,

    /// Low-level catalog type tag (e.g. `varchar`, `_int4`, `order_status`)
    pub udt_name: String,

    /// Whether the column accepts NULL
    pub is_nullable: bool,

    /// Default expression, verbatim
    pub column_default: Option<String>,

    /// Declared maximum length for character types
    pub character_max_length: Option<i32>,

    /// Declared precision for numeric types
    pub numeric_precision: Option<i32>,

    /// 1-based position within the table
    pub ordinal_position: i32,

    /// Column participates in the primary key
    pub is_primary_key: bool,

    /// Column participates in a foreign key
    pub is_foreign_key: bool,

    /// Column participates in a UNIQUE constraint
    pub is_unique: bool,
}

impl Column {
    /// Whether the catalog tag denotes an array type (leading underscore)
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.udt_name.starts_with('_')
    }
}

/// Base table with its columns in ordinal order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name (unique within a snapshot)
    pub name: String,

    /// Owning schema
    pub schema: String,

    /// Columns ordered by `ordinal_position`
    pub columns: Vec<Column>,

    /// Planner estimate, not an exact count. Reads as 0 for tables whose
    /// statistics have not been gathered yet.
    pub estimated_row_count: i64,
}

/// One foreign-key column pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub constraint_name: String,
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    /// Referential action on update, verbatim (`CASCADE`, `NO ACTION`, ...)
    pub update_rule: String,
    /// Referential action on delete, verbatim
    pub delete_rule: String,
}

/// Enumerated type with labels in catalog sort order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub schema: String,
    /// Labels exactly as ordered by the catalog. Never re-sorted.
    pub values: Vec<String>,
}

/// Index with key columns in key order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    /// Access method (`btree`, `hash`, `gin`, ...)
    pub index_type: String,
}

/// Property of an inferred entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeProperty {
    pub name: String,

    /// Logical type name (`string`, `number`, `Date`, an entity or enum name, ...)
    #[serde(rename = "type")]
    pub type_name: String,

    pub is_optional: bool,

    pub is_array: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Typed description of a table's shape plus its relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    /// Derived name (`order_items` -> `OrderItems`)
    pub name: String,

    /// Source table
    pub table_name: String,

    /// Column and relation properties followed by reverse relations
    pub properties: Vec<TypeProperty>,

    /// Tables linked by a foreign key in either direction, excluding this one
    pub associated_tables: BTreeSet<String>,
}

impl EntityType {
    /// Look up a property by name
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&TypeProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Immutable snapshot produced by one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSchema {
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    pub enums: Vec<EnumType>,
    pub indexes: Vec<Index>,
    pub entity_types: Vec<EntityType>,
    /// Capture time of the extraction
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedSchema {
    /// Whether the snapshot describes nothing at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.enums.is_empty() && self.relationships.is_empty()
    }

    /// Find a table by name
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find the entity type derived from a table
    #[must_use]
    pub fn entity_for_table(&self, table_name: &str) -> Option<&EntityType> {
        self.entity_types.iter().find(|e| e.table_name == table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, udt: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: "text".to_string(),
            udt_name: udt.to_string(),
            is_nullable: true,
            column_default: None,
            character_max_length: None,
            numeric_precision: None,
            ordinal_position: 1,
            is_primary_key: false,
            is_foreign_key: false,
            is_unique: false,
        }
    }

    #[test]
    fn test_array_detection() {
        assert!(column("tags", "_text").is_array());
        assert!(!column("title", "text").is_array());
    }

    #[test]
    fn test_type_property_serializes_type_key() {
        let prop = TypeProperty {
            name: "id".to_string(),
            type_name: "string".to_string(),
            is_optional: false,
            is_array: false,
            description: None,
        };
        let json = serde_json::to_value(&prop).unwrap();
        assert_eq!(json["type"], "string");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_snapshot_roundtrips_through_json() {
        let snapshot = ExtractedSchema {
            tables: vec![Table {
                name: "users".to_string(),
                schema: "public".to_string(),
                columns: vec![column("id", "uuid")],
                estimated_row_count: 0,
            }],
            relationships: Vec::new(),
            enums: vec![EnumType {
                name: "status".to_string(),
                schema: "public".to_string(),
                values: vec!["pending".to_string(), "active".to_string(), "closed".to_string()],
            }],
            indexes: Vec::new(),
            entity_types: Vec::new(),
            extracted_at: Utc::now(),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: ExtractedSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.enums[0].values, vec!["pending", "active", "closed"]);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ExtractedSchema {
            tables: Vec::new(),
            relationships: Vec::new(),
            enums: Vec::new(),
            indexes: Vec::new(),
            entity_types: Vec::new(),
            extracted_at: Utc::now(),
        };
        assert!(snapshot.is_empty());
        assert!(snapshot.table("users").is_none());
    }
}
