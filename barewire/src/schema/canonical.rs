//! Canonical schema rendering and identifier derivation.
//!
//! The schema identifier is a UUID v5 over the RFC 4122 DNS namespace of the
//! canonical text, so any two implementations that agree on the rendering
//! agree on the identifier without exchanging the schema itself.

use std::fmt::Write;

use uuid::Uuid;

use crate::schema::model::{PrimitiveType, Schema, Type, Validated};

/// Render the canonical textual form: every defined type in lexicographic
/// name order, as `name ":" type ";"` with prefix notation.
pub fn canonical_text(schema: &Schema<Validated>) -> String {
    let mut names: Vec<&str> = schema.types().map(|(name, _)| name).collect();
    names.sort_unstable();

    let mut out = String::new();
    for name in names {
        // Defined names always resolve; `types()` is the source of both.
        if let Some(ty) = schema.type_named(name) {
            out.push_str(name);
            out.push(':');
            render_type(ty, &mut out);
            out.push(';');
        }
    }
    out
}

/// The schema identifier: UUID v5 of the canonical text.
pub fn schema_id(schema: &Schema<Validated>) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, canonical_text(schema).as_bytes())
}

fn render_type(ty: &Type, out: &mut String) {
    match ty {
        Type::Primitive(p) => render_primitive(p, out),
        Type::Optional(inner) => {
            out.push_str("optional<");
            render_type(inner, out);
            out.push('>');
        }
        Type::List(element) => {
            out.push_str("list<");
            render_type(element, out);
            out.push('>');
        }
        Type::FixedList(element, len) => {
            out.push_str("fixed-list<");
            render_type(element, out);
            let _ = write!(out, ",{len}>");
        }
        Type::Map(key, value) => {
            out.push_str("map<");
            render_type(key, out);
            out.push(',');
            render_type(value, out);
            out.push('>');
        }
        Type::Union(variants) => {
            out.push_str("union{");
            for (i, (tag, variant)) in variants.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{tag}=");
                render_type(variant, out);
            }
            out.push('}');
        }
        Type::Struct(fields) => {
            out.push_str("struct{");
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&field.name);
                out.push(':');
                render_type(&field.ty, out);
            }
            out.push('}');
        }
        Type::UserDefined(name) => out.push_str(name),
    }
}

fn render_primitive(p: &PrimitiveType, out: &mut String) {
    match p {
        PrimitiveType::FixedData(len) => {
            let _ = write!(out, "fixed-data<{len}>");
        }
        PrimitiveType::Enum(values) => {
            out.push_str("enum{");
            for (i, (name, value)) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{name}={value}");
            }
            out.push('}');
        }
        other => out.push_str(other.describe()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::StructField;

    #[test]
    fn test_canonical_text_sorts_and_renders() {
        let schema = Schema::draft("Person")
            .define(
                "Person",
                Type::structure([
                    StructField::new("name", Type::string()),
                    StructField::new("age", Type::optional(Type::u8())),
                    StructField::new("tags", Type::list(Type::user("Color"))),
                ]),
            )
            .define("Color", Type::enumeration([("red", 0u64), ("blue", 1u64)]))
            .validate()
            .unwrap();

        assert_eq!(
            canonical_text(&schema),
            "Color:enum{red=0,blue=1};\
             Person:struct{name:string,age:optional<u8>,tags:list<Color>};"
        );
    }

    #[test]
    fn test_schema_id_is_stable_and_name_sensitive() {
        let build = |root: &str| {
            Schema::draft(root)
                .define(root, Type::map(Type::string(), Type::fixed_data(4)))
                .validate()
                .unwrap()
        };
        let a = build("A");
        let b = build("A");
        assert_eq!(schema_id(&a), schema_id(&b));
        assert_ne!(schema_id(&a), schema_id(&build("B")));
        // v5 identifiers are version 5, RFC 4122 variant.
        assert_eq!(schema_id(&a).get_version_num(), 5);
    }

    #[test]
    fn test_definition_order_does_not_change_id() {
        let forward = Schema::draft("A")
            .define("A", Type::user("B"))
            .define("B", Type::structure([StructField::new("x", Type::u8())]))
            .validate()
            .unwrap();
        let backward = Schema::draft("A")
            .define("B", Type::structure([StructField::new("x", Type::u8())]))
            .define("A", Type::user("B"))
            .validate()
            .unwrap();
        assert_eq!(schema_id(&forward), schema_id(&backward));
    }
}
