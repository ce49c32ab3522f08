//! Snapshot Processing Benchmarks
//!
//! Measures the CPU-bound stages that run on every extraction and question:
//! - Entity type inference over a wide, densely linked schema
//! - Rendering the schema summary sent to the language model
//! - The lexical safety gate

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use schemalens::ai::prompt::build_schema_summary;
use schemalens::inference::infer_entity_types;
use schemalens::{Column, EnumType, ExtractedSchema, Relationship, Table};

fn column(name: &str, udt: &str, position: i32, pk: bool, fk: bool) -> Column {
    Column {
        name: name.to_string(),
        data_type: udt.to_string(),
        udt_name: udt.to_string(),
        is_nullable: !pk,
        column_default: None,
        character_max_length: None,
        numeric_precision: None,
        ordinal_position: position,
        is_primary_key: pk,
        is_foreign_key: fk,
        is_unique: false,
    }
}

/// `tables` tables, each with a handful of scalar columns and a foreign key to
/// the previous table
fn synthetic_schema(tables: usize) -> ExtractedSchema {
    let mut out = Vec::with_capacity(tables);
    let mut relationships = Vec::new();

    for i in 0..tables {
        let name = format!("table_{i}");
        let mut columns = vec![
            column("id", "uuid", 1, true, false),
            column("created_at", "timestamptz", 2, false, false),
            column("display_name", "varchar", 3, false, false),
            column("status", "record_status", 4, false, false),
            column("tags", "_text", 5, false, false),
        ];
        if i > 0 {
            columns.push(column("parent_id", "uuid", 6, false, true));
            relationships.push(Relationship {
                constraint_name: format!("{name}_parent_id_fkey"),
                source_table: name.clone(),
                source_column: "parent_id".to_string(),
                target_table: format!("table_{}", i - 1),
                target_column: "id".to_string(),
                update_rule: "NO ACTION".to_string(),
                delete_rule: "CASCADE".to_string(),
            });
        }
        out.push(Table {
            name,
            schema: "public".to_string(),
            columns,
            estimated_row_count: 1000,
        });
    }

    ExtractedSchema {
        tables: out,
        relationships,
        enums: vec![EnumType {
            name: "record_status".to_string(),
            schema: "public".to_string(),
            values: vec!["draft".to_string(), "live".to_string(), "archived".to_string()],
        }],
        indexes: Vec::new(),
        entity_types: Vec::new(),
        extracted_at: Utc::now(),
    }
}

fn bench_inference(c: &mut Criterion) {
    let schema = synthetic_schema(200);
    c.bench_function("infer_entity_types_200_tables", |b| {
        b.iter(|| {
            infer_entity_types(
                black_box(&schema.tables),
                black_box(&schema.relationships),
                black_box(&schema.enums),
            )
        });
    });
}

fn bench_summary(c: &mut Criterion) {
    let schema = synthetic_schema(200);
    c.bench_function("build_schema_summary_200_tables", |b| {
        b.iter(|| build_schema_summary(black_box(&schema)));
    });
}

fn bench_safety_gate(c: &mut Criterion) {
    let sql = "SELECT t.id, t.display_name, p.display_name AS parent \
               FROM table_10 t JOIN table_9 p ON p.id = t.parent_id \
               WHERE t.status = 'live' ORDER BY t.created_at DESC LIMIT 50";
    c.bench_function("safety_check_select", |b| {
        b.iter(|| schemalens::safety::check(black_box(sql)));
    });
}

criterion_group!(benches, bench_inference, bench_summary, bench_safety_gate);
criterion_main!(benches);
