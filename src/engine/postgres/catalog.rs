//! Catalog Readers
//!
//! Four independent readers over the `public` schema of the target database:
//! tables (with column flags and row estimates), relationships, enums and
//! indexes. Each reader issues its catalog queries and hands the raw rows to
//! a pure normalizer, so the grouping and ordering rules are testable without
//! a live server.
//!
//! # Ordering Guarantees
//! - Tables sorted by name; columns in ordinal order
//! - Relationships ordered by source table, then source column
//! - Enums sorted by name; labels in catalog sort order (never alphabetized)
//! - Indexes sorted by name; columns in key order

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, Row};

use crate::error::{LensError, Result};
use crate::schema::{Column, EnumType, Index, Relationship, Table};

/// Schema every reader is scoped to
pub const TARGET_SCHEMA: &str = "public";

const COLUMNS_QUERY: &str = "
    SELECT
        c.table_name::text AS table_name,
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.udt_name::text AS udt_name,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS column_default,
        c.character_maximum_length::int4 AS character_maximum_length,
        c.numeric_precision::int4 AS numeric_precision,
        c.ordinal_position::int4 AS ordinal_position
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON c.table_name = t.table_name AND c.table_schema = t.table_schema
    WHERE c.table_schema = 'public'
        AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position";

const CONSTRAINTS_QUERY: &str = "
    SELECT
        tc.table_name::text AS table_name,
        kcu.column_name::text AS column_name,
        tc.constraint_type::text AS constraint_type
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
    WHERE tc.table_schema = 'public'
        AND tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY', 'UNIQUE')";

const ROW_COUNTS_QUERY: &str = "
    SELECT relname::text AS table_name, reltuples::bigint AS row_count
    FROM pg_class
    WHERE relnamespace = (SELECT oid FROM pg_namespace WHERE nspname = 'public')
        AND relkind = 'r'";

const RELATIONSHIPS_QUERY: &str = "
    SELECT
        tc.constraint_name::text AS constraint_name,
        tc.table_name::text AS source_table,
        kcu.column_name::text AS source_column,
        ccu.table_name::text AS target_table,
        ccu.column_name::text AS target_column,
        rc.update_rule::text AS update_rule,
        rc.delete_rule::text AS delete_rule
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage ccu
        ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
    JOIN information_schema.referential_constraints rc
        ON rc.constraint_name = tc.constraint_name AND rc.constraint_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_schema = 'public'
    ORDER BY tc.table_name, kcu.column_name";

const ENUMS_QUERY: &str = "
    SELECT
        t.typname::text AS enum_name,
        n.nspname::text AS schema_name,
        e.enumlabel::text AS enum_value
    FROM pg_type t
    JOIN pg_enum e ON t.oid = e.enumtypid
    JOIN pg_namespace n ON n.oid = t.typnamespace
    WHERE n.nspname = 'public'
    ORDER BY t.typname, e.enumsortorder";

// indkey is unnested WITH ORDINALITY so multi-column indexes keep key order
const INDEXES_QUERY: &str = "
    SELECT
        i.relname::text AS index_name,
        t.relname::text AS table_name,
        a.attname::text AS column_name,
        ix.indisunique AS is_unique,
        ix.indisprimary AS is_primary,
        am.amname::text AS index_type
    FROM pg_index ix
    JOIN pg_class t ON t.oid = ix.indrelid
    JOIN pg_class i ON i.oid = ix.indexrelid
    JOIN pg_am am ON am.oid = i.relam
    JOIN pg_namespace n ON n.oid = t.relnamespace
    CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    WHERE n.nspname = 'public'
    ORDER BY t.relname, i.relname, k.ord";

// ============================================================================
// Raw Rows
// ============================================================================

/// One row of the column listing
#[derive(Debug, Clone)]
pub struct RawColumn {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub udt_name: String,
    /// Catalog spelling: `"YES"` or `"NO"`
    pub is_nullable: String,
    pub column_default: Option<String>,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub ordinal_position: i32,
}

/// One (table, column, constraint kind) row
#[derive(Debug, Clone)]
pub struct RawConstraint {
    pub table_name: String,
    pub column_name: String,
    pub constraint_type: String,
}

/// Planner row estimate for one table
#[derive(Debug, Clone)]
pub struct RawRowCount {
    pub table_name: String,
    pub row_count: i64,
}

/// One enum label row
#[derive(Debug, Clone)]
pub struct RawEnumLabel {
    pub enum_name: String,
    pub schema_name: String,
    pub enum_value: String,
}

/// One (index, column) row
#[derive(Debug, Clone)]
pub struct RawIndexColumn {
    pub index_name: String,
    pub table_name: String,
    pub column_name: String,
    pub is_unique: bool,
    pub is_primary: bool,
    pub index_type: String,
}

fn field<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get(name).map_err(|e| {
        LensError::extraction_failed(format!("Failed to read catalog field '{name}': {e}"))
    })
}

impl RawColumn {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            table_name: field(row, "table_name")?,
            column_name: field(row, "column_name")?,
            data_type: field(row, "data_type")?,
            udt_name: field(row, "udt_name")?,
            is_nullable: field(row, "is_nullable")?,
            column_default: field(row, "column_default")?,
            character_maximum_length: field(row, "character_maximum_length")?,
            numeric_precision: field(row, "numeric_precision")?,
            ordinal_position: field(row, "ordinal_position")?,
        })
    }
}

impl RawConstraint {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            table_name: field(row, "table_name")?,
            column_name: field(row, "column_name")?,
            constraint_type: field(row, "constraint_type")?,
        })
    }
}

impl RawRowCount {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            table_name: field(row, "table_name")?,
            row_count: field(row, "row_count")?,
        })
    }
}

impl RawEnumLabel {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            enum_name: field(row, "enum_name")?,
            schema_name: field(row, "schema_name")?,
            enum_value: field(row, "enum_value")?,
        })
    }
}

impl RawIndexColumn {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            index_name: field(row, "index_name")?,
            table_name: field(row, "table_name")?,
            column_name: field(row, "column_name")?,
            is_unique: field(row, "is_unique")?,
            is_primary: field(row, "is_primary")?,
            index_type: field(row, "index_type")?,
        })
    }
}

async fn fetch<T>(
    client: &Client,
    what: &str,
    query: &str,
    parse: fn(&Row) -> Result<T>,
) -> Result<Vec<T>> {
    let rows = client
        .query(query, &[])
        .await
        .map_err(|e| LensError::extraction_failed(format!("Failed to read {what}: {e}")))?;
    rows.iter().map(parse).collect()
}

// ============================================================================
// Readers
// ============================================================================

/// Read every base table with its columns, constraint flags and row estimate
pub async fn read_tables(client: &Client) -> Result<Vec<Table>> {
    let (columns, constraints, counts) = tokio::try_join!(
        fetch(client, "columns", COLUMNS_QUERY, RawColumn::from_row),
        fetch(client, "constraints", CONSTRAINTS_QUERY, RawConstraint::from_row),
        fetch(client, "row estimates", ROW_COUNTS_QUERY, RawRowCount::from_row),
    )?;
    Ok(assemble_tables(columns, &constraints, &counts))
}

/// Read one relationship per foreign-key column
pub async fn read_relationships(client: &Client) -> Result<Vec<Relationship>> {
    let rows = client
        .query(RELATIONSHIPS_QUERY, &[])
        .await
        .map_err(|e| LensError::extraction_failed(format!("Failed to read relationships: {e}")))?;

    rows.iter()
        .map(|row| {
            Ok(Relationship {
                constraint_name: field(row, "constraint_name")?,
                source_table: field(row, "source_table")?,
                source_column: field(row, "source_column")?,
                target_table: field(row, "target_table")?,
                target_column: field(row, "target_column")?,
                update_rule: field(row, "update_rule")?,
                delete_rule: field(row, "delete_rule")?,
            })
        })
        .collect()
}

/// Read every enum type with its labels
pub async fn read_enums(client: &Client) -> Result<Vec<EnumType>> {
    let labels = fetch(client, "enums", ENUMS_QUERY, RawEnumLabel::from_row).await?;
    Ok(group_enums(labels))
}

/// Read every index with its key columns
pub async fn read_indexes(client: &Client) -> Result<Vec<Index>> {
    let columns = fetch(client, "indexes", INDEXES_QUERY, RawIndexColumn::from_row).await?;
    Ok(group_indexes(columns))
}

// ============================================================================
// Normalizers
// ============================================================================

type ColumnKey = (String, String);

/// Group column rows into tables and apply constraint flags and row estimates
///
/// Flags come from a single pass over `constraints`, keyed by (table, column).
/// Estimates are clamped at zero; tables without one report zero.
#[must_use]
pub fn assemble_tables(
    columns: Vec<RawColumn>,
    constraints: &[RawConstraint],
    counts: &[RawRowCount],
) -> Vec<Table> {
    let mut primary_keys: HashSet<ColumnKey> = HashSet::new();
    let mut foreign_keys: HashSet<ColumnKey> = HashSet::new();
    let mut uniques: HashSet<ColumnKey> = HashSet::new();

    for c in constraints {
        let key = (c.table_name.clone(), c.column_name.clone());
        match c.constraint_type.as_str() {
            "PRIMARY KEY" => primary_keys.insert(key),
            "FOREIGN KEY" => foreign_keys.insert(key),
            "UNIQUE" => uniques.insert(key),
            _ => false,
        };
    }

    let row_counts: HashMap<&str, i64> = counts
        .iter()
        .map(|c| (c.table_name.as_str(), c.row_count.max(0)))
        .collect();

    let mut grouped: BTreeMap<String, Vec<Column>> = BTreeMap::new();
    for raw in columns {
        let key = (raw.table_name, raw.column_name);
        let column = Column {
            is_primary_key: primary_keys.contains(&key),
            is_foreign_key: foreign_keys.contains(&key),
            is_unique: uniques.contains(&key),
            name: key.1,
            data_type: raw.data_type,
            udt_name: raw.udt_name,
            is_nullable: raw.is_nullable == "YES",
            column_default: raw.column_default,
            character_max_length: raw.character_maximum_length,
            numeric_precision: raw.numeric_precision,
            ordinal_position: raw.ordinal_position,
        };
        grouped.entry(key.0).or_default().push(column);
    }

    grouped
        .into_iter()
        .map(|(name, mut columns)| {
            columns.sort_by_key(|c| c.ordinal_position);
            Table {
                estimated_row_count: row_counts
                    .get(name.as_str())
                    .copied()
                    .unwrap_or(0),
                schema: TARGET_SCHEMA.to_string(),
                name,
                columns,
            }
        })
        .collect()
}

/// Group label rows into enum types, keeping label order as delivered
#[must_use]
pub fn group_enums(labels: Vec<RawEnumLabel>) -> Vec<EnumType> {
    let mut grouped: BTreeMap<String, EnumType> = BTreeMap::new();
    for label in labels {
        grouped
            .entry(label.enum_name.clone())
            .or_insert_with(|| EnumType {
                name: label.enum_name,
                schema: label.schema_name,
                values: Vec::new(),
            })
            .values
            .push(label.enum_value);
    }
    grouped.into_values().collect()
}

/// Group (index, column) rows into indexes, keeping column order as delivered
#[must_use]
pub fn group_indexes(columns: Vec<RawIndexColumn>) -> Vec<Index> {
    let mut grouped: BTreeMap<String, Index> = BTreeMap::new();
    for col in columns {
        grouped
            .entry(col.index_name.clone())
            .or_insert_with(|| Index {
                name: col.index_name,
                table_name: col.table_name,
                columns: Vec::new(),
                is_unique: col.is_unique,
                is_primary: col.is_primary,
                index_type: col.index_type,
            })
            .columns
            .push(col.column_name);
    }
    grouped.into_values().collect()
}
