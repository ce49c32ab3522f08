//! Snapshot Pipeline Tests (no database)
//!
//! Feeds catalog rows shaped like the `PostgreSQL` readers' output through
//! table assembly, enum grouping, entity inference and the prompt summary, and
//! checks what comes out the other end:
//! - Entity types and relation properties for a small users/posts schema
//! - Enum label order survives every stage untouched
//! - Estimated row counts never go negative

use std::collections::BTreeSet;

use chrono::Utc;
use pretty_assertions::assert_eq;

use schemalens::ai::prompt::build_schema_summary;
use schemalens::engine::postgres::catalog::{
    assemble_tables, group_enums, RawColumn, RawConstraint, RawEnumLabel, RawRowCount,
};
use schemalens::inference::infer_entity_types;
use schemalens::{ExtractedSchema, Relationship};

// ============================================================================
// Test Helpers
// ============================================================================

fn raw_column(table: &str, name: &str, udt: &str, nullable: bool, position: i32) -> RawColumn {
    RawColumn {
        table_name: table.to_string(),
        column_name: name.to_string(),
        data_type: udt.to_string(),
        udt_name: udt.to_string(),
        is_nullable: if nullable { "YES" } else { "NO" }.to_string(),
        column_default: None,
        character_maximum_length: None,
        numeric_precision: None,
        ordinal_position: position,
    }
}

fn constraint(table: &str, column: &str, kind: &str) -> RawConstraint {
    RawConstraint {
        table_name: table.to_string(),
        column_name: column.to_string(),
        constraint_type: kind.to_string(),
    }
}

fn label(enum_name: &str, value: &str) -> RawEnumLabel {
    RawEnumLabel {
        enum_name: enum_name.to_string(),
        schema_name: "public".to_string(),
        enum_value: value.to_string(),
    }
}

fn posts_user_fk() -> Relationship {
    Relationship {
        constraint_name: "posts_user_id_fkey".to_string(),
        source_table: "posts".to_string(),
        source_column: "user_id".to_string(),
        target_table: "users".to_string(),
        target_column: "id".to_string(),
        update_rule: "NO ACTION".to_string(),
        delete_rule: "CASCADE".to_string(),
    }
}

/// users(id uuid PK, name varchar NULL) and posts(id uuid PK, user_id uuid FK)
fn users_and_posts() -> ExtractedSchema {
    let columns = vec![
        raw_column("users", "name", "varchar", true, 2),
        raw_column("users", "id", "uuid", false, 1),
        raw_column("posts", "id", "uuid", false, 1),
        raw_column("posts", "user_id", "uuid", false, 2),
    ];
    let constraints = vec![
        constraint("users", "id", "PRIMARY KEY"),
        constraint("posts", "id", "PRIMARY KEY"),
        constraint("posts", "user_id", "FOREIGN KEY"),
    ];
    let counts = vec![
        RawRowCount {
            table_name: "users".to_string(),
            row_count: 120,
        },
        RawRowCount {
            table_name: "posts".to_string(),
            row_count: -1,
        },
    ];

    let tables = assemble_tables(columns, &constraints, &counts);
    let relationships = vec![posts_user_fk()];
    let entity_types = infer_entity_types(&tables, &relationships, &[]);

    ExtractedSchema {
        tables,
        relationships,
        enums: Vec::new(),
        indexes: Vec::new(),
        entity_types,
        extracted_at: Utc::now(),
    }
}

// ============================================================================
// Entity Inference
// ============================================================================

#[test]
fn test_users_entity_type() {
    let schema = users_and_posts();
    let users = schema.entity_for_table("users").unwrap();
    assert_eq!(users.name, "Users");

    let names: Vec<_> = users.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "postss"]);

    let id = users.property("id").unwrap();
    assert_eq!((id.type_name.as_str(), id.is_optional), ("string", false));

    let name = users.property("name").unwrap();
    assert_eq!((name.type_name.as_str(), name.is_optional), ("string", true));

    let reverse = users.property("postss").unwrap();
    assert_eq!(reverse.type_name, "Posts");
    assert!(reverse.is_array);
    assert!(reverse.is_optional);

    assert_eq!(users.associated_tables, BTreeSet::from(["posts".to_string()]));
}

#[test]
fn test_posts_entity_type() {
    let schema = users_and_posts();
    let posts = schema.entity_for_table("posts").unwrap();
    assert_eq!(posts.name, "Posts");

    let names: Vec<_> = posts.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["id", "userId", "users"]);

    let user_id = posts.property("userId").unwrap();
    assert_eq!(user_id.type_name, "string");
    assert!(!user_id.is_optional);

    let relation = posts.property("users").unwrap();
    assert_eq!(relation.type_name, "Users");
    assert!(!relation.is_array);
    assert_eq!(relation.description.as_deref(), Some("Relation to users"));

    assert_eq!(posts.associated_tables, BTreeSet::from(["users".to_string()]));
}

#[test]
fn test_tables_and_columns_are_ordered() {
    let schema = users_and_posts();
    let tables: Vec<_> = schema.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, vec!["posts", "users"]);

    let users = schema.table("users").unwrap();
    let columns: Vec<_> = users.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "name"]);
}

#[test]
fn test_row_estimates_are_clamped() {
    let schema = users_and_posts();
    assert_eq!(schema.table("users").unwrap().estimated_row_count, 120);
    assert_eq!(schema.table("posts").unwrap().estimated_row_count, 0);
}

// ============================================================================
// Enum Ordering
// ============================================================================

#[test]
fn test_enum_order_survives_extraction_prompt_and_inference() {
    let enums = group_enums(vec![
        label("post_status", "pending"),
        label("post_status", "active"),
        label("post_status", "closed"),
    ]);
    assert_eq!(enums[0].values, vec!["pending", "active", "closed"]);

    let tables = assemble_tables(
        vec![
            raw_column("posts", "id", "int4", false, 1),
            raw_column("posts", "status", "post_status", false, 2),
            raw_column("posts", "history", "_post_status", true, 3),
        ],
        &[constraint("posts", "id", "PRIMARY KEY")],
        &[],
    );
    let entity_types = infer_entity_types(&tables, &[], &enums);

    let posts = &entity_types[0];
    assert_eq!(posts.property("status").unwrap().type_name, "PostStatus");
    let history = posts.property("history").unwrap();
    assert_eq!(history.type_name, "PostStatus");
    assert!(history.is_array);

    let schema = ExtractedSchema {
        tables,
        relationships: Vec::new(),
        enums,
        indexes: Vec::new(),
        entity_types,
        extracted_at: Utc::now(),
    };

    let summary = build_schema_summary(&schema);
    assert!(summary.contains("  post_status: pending, active, closed"), "{summary}");
    assert!(!summary.contains("active, closed, pending"));

    // Snapshot persistence must not reorder either
    let json = serde_json::to_string(&schema).unwrap();
    let reloaded: ExtractedSchema = serde_json::from_str(&json).unwrap();
    assert_eq!(reloaded.enums[0].values, vec!["pending", "active", "closed"]);
}

#[test]
fn test_summary_for_users_and_posts() {
    let summary = build_schema_summary(&users_and_posts());
    insta::assert_snapshot!(summary, @r"
    TABLE posts:
      id uuid [PK, NOT NULL]
      user_id uuid [FK, NOT NULL]
    TABLE users:
      id uuid [PK, NOT NULL]
      name varchar

    RELATIONSHIPS:
      posts.user_id -> users.id
    ");
}
