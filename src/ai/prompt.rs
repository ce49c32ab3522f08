//! Schema Summary for the Language Model
//!
//! Renders a snapshot as compact plain text:
//!
//! ```text
//! TABLE users:
//!   id uuid [PK, NOT NULL]
//!   name varchar
//!
//! ENUMS:
//!   status: active, inactive
//!
//! RELATIONSHIPS:
//!   posts.user_id -> users.id
//! ```
//!
//! Sections with nothing in them are left out, so an empty snapshot renders as
//! the empty string.

use crate::schema::{Column, ExtractedSchema};

fn column_line(col: &Column) -> String {
    let mut flags = Vec::new();
    if col.is_primary_key {
        flags.push("PK");
    }
    if col.is_foreign_key {
        flags.push("FK");
    }
    if !col.is_nullable {
        flags.push("NOT NULL");
    }

    if flags.is_empty() {
        format!("  {} {}", col.name, col.udt_name)
    } else {
        format!("  {} {} [{}]", col.name, col.udt_name, flags.join(", "))
    }
}

/// Render `schema` as the text summary sent alongside each question
#[must_use]
pub fn build_schema_summary(schema: &ExtractedSchema) -> String {
    let mut lines: Vec<String> = Vec::new();

    for table in &schema.tables {
        let cols: Vec<String> = table.columns.iter().map(column_line).collect();
        lines.push(format!("TABLE {}:\n{}", table.name, cols.join("\n")));
    }

    if !schema.enums.is_empty() {
        lines.push("\nENUMS:".to_string());
        for e in &schema.enums {
            lines.push(format!("  {}: {}", e.name, e.values.join(", ")));
        }
    }

    if !schema.relationships.is_empty() {
        lines.push("\nRELATIONSHIPS:".to_string());
        for r in &schema.relationships {
            lines.push(format!(
                "  {}.{} -> {}.{}",
                r.source_table, r.source_column, r.target_table, r.target_column
            ));
        }
    }

    lines.join("\n")
}
