//! Entity Type Inference
//!
//! Pure, in-memory transform from catalog entities to one [`EntityType`] per
//! table. No I/O and no suspension points.
//!
//! # Property Order
//! 1. One property per column, in ordinal order. A foreign-key column is
//!    followed directly by a relation property typed as the target entity.
//! 2. One reverse-relation property per distinct table that references this
//!    one (array-typed, always optional).
//!
//! Names are unique within an entity: when two properties would share a name,
//! the first one wins.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::schema::{Column, EntityType, EnumType, Relationship, Table, TypeProperty};

/// Logical type for catalog tags that do not map to anything known
pub const UNKNOWN_TYPE: &str = "unknown";

/// Map a scalar catalog type tag to its logical type name
fn primitive_type(udt_name: &str) -> Option<&'static str> {
    let logical = match udt_name {
        "int2" | "int4" | "int8" | "float4" | "float8" | "numeric" | "serial" | "bigserial"
        | "smallserial" => "number",
        "varchar" | "text" | "char" | "bpchar" | "name" | "citext" => "string",
        "bool" => "boolean",
        "timestamp" | "timestamptz" | "date" => "Date",
        "time" | "timetz" | "interval" => "string",
        "json" | "jsonb" => "Record<string, unknown>",
        "uuid" => "string",
        "bytea" => "Buffer",
        _ => return None,
    };
    Some(logical)
}

/// Resolve the logical type of a column tag
///
/// Array tags (`_int4`) resolve to their element type; the caller records the
/// array-ness separately. Enum tags resolve to the enum's derived name.
#[must_use]
pub fn logical_type(udt_name: &str, enum_names: &HashSet<&str>) -> String {
    let element = udt_name.strip_prefix('_').unwrap_or(udt_name);

    if let Some(primitive) = primitive_type(element) {
        return primitive.to_string();
    }
    if enum_names.contains(element) {
        return pascal_case(element);
    }
    UNKNOWN_TYPE.to_string()
}

/// `order_items` -> `OrderItems`
///
/// Segments split on underscores get an upper-cased first letter; the rest of
/// each segment is kept, so applying the function to its own output is a no-op.
#[must_use]
pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// `order_items` -> `orderItems`
#[must_use]
pub fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derived entity type name for a table
#[must_use]
pub fn entity_type_name(table_name: &str) -> String {
    pascal_case(table_name)
}

/// Name of the reverse-relation property pointing back at `source_table`
#[must_use]
pub fn reverse_relation_name(source_table: &str) -> String {
    format!("{}s", camel_case(source_table))
}

/// Distinct referencing table, with the first FK column seen for it
struct ReverseSource<'a> {
    table: &'a str,
    column: &'a str,
}

/// Ordered, name-unique property list
#[derive(Default)]
struct PropertyList {
    properties: Vec<TypeProperty>,
    names: HashSet<String>,
}

impl PropertyList {
    fn push(&mut self, property: TypeProperty) {
        if self.names.insert(property.name.clone()) {
            self.properties.push(property);
        }
    }
}

/// Infer one entity type per table
///
/// Output order follows `tables`.
#[must_use]
pub fn infer_entity_types(
    tables: &[Table],
    relationships: &[Relationship],
    enums: &[EnumType],
) -> Vec<EntityType> {
    let enum_names: HashSet<&str> = enums.iter().map(|e| e.name.as_str()).collect();

    let mut fk_targets: HashMap<(&str, &str), &Relationship> = HashMap::new();
    let mut reverse: HashMap<&str, Vec<ReverseSource<'_>>> = HashMap::new();

    for rel in relationships {
        fk_targets.insert((rel.source_table.as_str(), rel.source_column.as_str()), rel);

        let sources = reverse.entry(rel.target_table.as_str()).or_default();
        if !sources.iter().any(|s| s.table == rel.source_table) {
            sources.push(ReverseSource {
                table: &rel.source_table,
                column: &rel.source_column,
            });
        }
    }

    tables
        .iter()
        .map(|table| {
            let mut props = PropertyList::default();
            let mut associated = BTreeSet::new();

            for col in &table.columns {
                props.push(column_property(col, &enum_names));

                if let Some(rel) = fk_targets.get(&(table.name.as_str(), col.name.as_str())) {
                    props.push(TypeProperty {
                        name: camel_case(&rel.target_table),
                        type_name: entity_type_name(&rel.target_table),
                        is_optional: col.is_nullable,
                        is_array: false,
                        description: Some(format!("Relation to {}", rel.target_table)),
                    });
                    associated.insert(rel.target_table.clone());
                }
            }

            for source in reverse
                .get(table.name.as_str())
                .into_iter()
                .flatten()
            {
                props.push(TypeProperty {
                    name: reverse_relation_name(source.table),
                    type_name: entity_type_name(source.table),
                    is_optional: true,
                    is_array: true,
                    description: Some(format!(
                        "Reverse relation from {}.{}",
                        source.table, source.column
                    )),
                });
                associated.insert(source.table.to_string());
            }

            associated.remove(&table.name);

            EntityType {
                name: entity_type_name(&table.name),
                table_name: table.name.clone(),
                properties: props.properties,
                associated_tables: associated,
            }
        })
        .collect()
}

fn column_property(col: &Column, enum_names: &HashSet<&str>) -> TypeProperty {
    TypeProperty {
        name: camel_case(&col.name),
        type_name: logical_type(&col.udt_name, enum_names),
        // Primary keys are always required, whatever the catalog says
        is_optional: col.is_nullable && !col.is_primary_key,
        is_array: col.is_array(),
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, udt: &str, nullable: bool, pk: bool, position: i32) -> Column {
        Column {
            name: name.to_string(),
            data_type: udt.to_string(),
            udt_name: udt.to_string(),
            is_nullable: nullable,
            column_default: None,
            character_max_length: None,
            numeric_precision: None,
            ordinal_position: position,
            is_primary_key: pk,
            is_foreign_key: false,
            is_unique: false,
        }
    }

    fn table(name: &str, columns: Vec<Column>) -> Table {
        Table {
            name: name.to_string(),
            schema: "public".to_string(),
            columns,
            estimated_row_count: 0,
        }
    }

    fn fk(name: &str, source: (&str, &str), target: (&str, &str)) -> Relationship {
        Relationship {
            constraint_name: name.to_string(),
            source_table: source.0.to_string(),
            source_column: source.1.to_string(),
            target_table: target.0.to_string(),
            target_column: target.1.to_string(),
            update_rule: "NO ACTION".to_string(),
            delete_rule: "CASCADE".to_string(),
        }
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(pascal_case("order_items"), "OrderItems");
        assert_eq!(pascal_case("users"), "Users");
        assert_eq!(camel_case("user_id"), "userId");
        assert_eq!(camel_case("id"), "id");
        assert_eq!(pascal_case("a__b"), "AB");
        assert_eq!(camel_case(""), "");
    }

    #[test]
    fn test_entity_name_is_stable_under_reapplication() {
        for name in ["users", "order_items", "x", "audit_log_entries"] {
            let once = entity_type_name(name);
            assert_eq!(entity_type_name(&once), once);
            assert_eq!(entity_type_name(name), once);
        }
    }

    #[test]
    fn test_primitive_mapping() {
        let enums = HashSet::new();
        assert_eq!(logical_type("int8", &enums), "number");
        assert_eq!(logical_type("numeric", &enums), "number");
        assert_eq!(logical_type("bpchar", &enums), "string");
        assert_eq!(logical_type("bool", &enums), "boolean");
        assert_eq!(logical_type("timestamptz", &enums), "Date");
        assert_eq!(logical_type("jsonb", &enums), "Record<string, unknown>");
        assert_eq!(logical_type("uuid", &enums), "string");
        assert_eq!(logical_type("bytea", &enums), "Buffer");
        assert_eq!(logical_type("tsvector", &enums), UNKNOWN_TYPE);
    }

    #[test]
    fn test_array_and_enum_mapping() {
        let enums: HashSet<&str> = ["order_status"].into_iter().collect();
        assert_eq!(logical_type("_int4", &enums), "number");
        assert_eq!(logical_type("order_status", &enums), "OrderStatus");
        assert_eq!(logical_type("_order_status", &enums), "OrderStatus");
        assert_eq!(logical_type("_geometry", &enums), UNKNOWN_TYPE);
    }

    #[test]
    fn test_array_column_property() {
        let tables = vec![table("posts", vec![col("tags", "_text", true, false, 1)])];
        let entities = infer_entity_types(&tables, &[], &[]);
        let tags = entities[0].property("tags").unwrap();
        assert_eq!(tags.type_name, "string");
        assert!(tags.is_array);
    }

    #[test]
    fn test_nullable_primary_key_is_required() {
        let tables = vec![table("legacy", vec![col("code", "varchar", true, true, 1)])];
        let entities = infer_entity_types(&tables, &[], &[]);
        assert!(!entities[0].properties[0].is_optional);
    }

    #[test]
    fn test_multiple_fks_between_same_tables_collapse() {
        let tables = vec![
            table("users", vec![col("id", "int4", false, true, 1)]),
            table(
                "posts",
                vec![
                    col("id", "int4", false, true, 1),
                    col("author_id", "int4", false, false, 2),
                    col("editor_id", "int4", true, false, 3),
                ],
            ),
        ];
        let rels = vec![
            fk("posts_author_fk", ("posts", "author_id"), ("users", "id")),
            fk("posts_editor_fk", ("posts", "editor_id"), ("users", "id")),
        ];
        let entities = infer_entity_types(&tables, &rels, &[]);

        let posts = &entities[1];
        let to_users: Vec<_> = posts
            .properties
            .iter()
            .filter(|p| p.type_name == "Users")
            .collect();
        assert_eq!(to_users.len(), 1);
        // First FK column wins, so the relation is required
        assert!(!to_users[0].is_optional);

        let users = &entities[0];
        let from_posts: Vec<_> = users
            .properties
            .iter()
            .filter(|p| p.type_name == "Posts")
            .collect();
        assert_eq!(from_posts.len(), 1);
        assert!(from_posts[0].is_array);
        assert!(from_posts[0].is_optional);
        assert_eq!(
            from_posts[0].description.as_deref(),
            Some("Reverse relation from posts.author_id")
        );
    }

    #[test]
    fn test_self_reference_excluded_from_associated_tables() {
        let tables = vec![table(
            "employees",
            vec![
                col("id", "int4", false, true, 1),
                col("manager_id", "int4", true, false, 2),
            ],
        )];
        let rels = vec![fk(
            "employees_manager_fk",
            ("employees", "manager_id"),
            ("employees", "id"),
        )];
        let entities = infer_entity_types(&tables, &rels, &[]);

        let employees = &entities[0];
        assert!(employees.associated_tables.is_empty());
        assert!(employees.property("employees").is_some());
        assert!(employees.property("employeess").is_some());
    }

    #[test]
    fn test_reverse_relations_follow_column_properties() {
        let tables = vec![
            table(
                "users",
                vec![
                    col("id", "uuid", false, true, 1),
                    col("email", "text", false, false, 2),
                ],
            ),
            table("posts", vec![col("user_id", "uuid", false, false, 1)]),
        ];
        let rels = vec![fk("posts_user_fk", ("posts", "user_id"), ("users", "id"))];
        let entities = infer_entity_types(&tables, &rels, &[]);

        let names: Vec<_> = entities[0]
            .properties
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "email", "postss"]);

        let names: Vec<_> = entities[1]
            .properties
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["userId", "users"]);
        assert_eq!(entities[1].associated_tables.iter().collect::<Vec<_>>(), vec!["users"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(infer_entity_types(&[], &[], &[]).is_empty());
    }
}
