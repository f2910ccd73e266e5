//! Schema validation: the one-way door from `Schema<Draft>` to
//! `Schema<Validated>`.

use std::collections::HashSet;
use std::marker::PhantomData;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::{BareWireError, Result};
use crate::schema::model::{Draft, PrimitiveType, Schema, Type, Validated};
use crate::schema::size::SizeAnalyzer;

impl Schema<Draft> {
    /// Check every schema invariant and produce an immutable validated
    /// schema.
    ///
    /// Checks, in DFS order from the root:
    /// - the root type exists and every reachable reference resolves,
    /// - structs are non-empty with unique field names,
    /// - enums are non-empty with unique names and unique values,
    /// - unions are non-empty with unique tags,
    /// - map keys resolve to hashable primitives or enums,
    /// - recursion is only accepted through `optional`, `list` or `map`
    ///   indirection.
    ///
    /// The first violation found is returned as `SchemaValidation`.
    pub fn validate(self) -> Result<Schema<Validated>> {
        let Schema { types, root, .. } = self;

        if !types.contains_key(&root) {
            return Err(BareWireError::schema(format!(
                "root type `{root}` is not defined"
            )));
        }

        let mut walker = Walker {
            types: &types,
            stack: Vec::new(),
            indirections: 0,
            reachable: IndexSet::new(),
        };
        walker.visit_root(&root)?;

        let mut analyzer = SizeAnalyzer::new(&types);
        for name in &walker.reachable {
            analyzer.named(name);
        }
        let sizes = analyzer.into_memo();

        debug!(types = types.len(), root = %root, "schema validated");
        Ok(Schema {
            types,
            root,
            sizes,
            _state: PhantomData,
        })
    }
}

struct Walker<'s> {
    types: &'s IndexMap<String, Type>,
    /// Named types currently being visited, with the indirection depth at
    /// entry. A back-reference is unproductive exactly when the depth has
    /// not moved since the referenced type was entered.
    stack: Vec<(String, u32)>,
    indirections: u32,
    reachable: IndexSet<String>,
}

impl<'s> Walker<'s> {
    fn lookup(&self, name: &str) -> Option<&'s Type> {
        let types = self.types;
        types.get(name)
    }

    fn visit_root(&mut self, root: &str) -> Result<()> {
        let Some(ty) = self.lookup(root) else {
            return Err(BareWireError::schema(format!(
                "root type `{root}` is not defined"
            )));
        };
        self.reachable.insert(root.to_string());
        self.stack.push((root.to_string(), 0));
        let result = self.check_type(ty, root);
        self.stack.pop();
        result
    }

    fn check_type(&mut self, ty: &Type, owner: &str) -> Result<()> {
        match ty {
            Type::Primitive(PrimitiveType::Enum(values)) => self.check_enum(values, owner),
            Type::Primitive(_) => Ok(()),
            Type::Optional(inner) | Type::List(inner) => {
                self.indirections += 1;
                let result = self.check_type(inner, owner);
                self.indirections -= 1;
                result
            }
            Type::Map(key, value) => {
                self.check_map_key(key, owner)?;
                self.indirections += 1;
                let result = self
                    .check_type(key, owner)
                    .and_then(|()| self.check_type(value, owner));
                self.indirections -= 1;
                result
            }
            Type::FixedList(element, _) => self.check_type(element, owner),
            Type::Union(variants) => {
                if variants.is_empty() {
                    return Err(BareWireError::schema(format!(
                        "union in `{owner}` has no variants"
                    )));
                }
                let mut tags = HashSet::new();
                for (tag, variant) in variants {
                    if !tags.insert(*tag) {
                        return Err(BareWireError::schema(format!(
                            "union in `{owner}` has duplicate tag {tag}"
                        )));
                    }
                    self.check_type(variant, owner)?;
                }
                Ok(())
            }
            Type::Struct(fields) => {
                if fields.is_empty() {
                    return Err(BareWireError::schema(format!(
                        "struct `{owner}` has no fields"
                    )));
                }
                let mut names = HashSet::new();
                for field in fields {
                    if !names.insert(field.name.as_str()) {
                        return Err(BareWireError::schema(format!(
                            "struct `{owner}` has duplicate field `{}`",
                            field.name
                        )));
                    }
                    self.check_type(&field.ty, owner)?;
                }
                Ok(())
            }
            Type::UserDefined(name) => self.follow_reference(name, owner),
        }
    }

    fn follow_reference(&mut self, name: &str, owner: &str) -> Result<()> {
        if let Some((_, entry_level)) = self.stack.iter().find(|(n, _)| n == name) {
            if self.indirections == *entry_level {
                return Err(BareWireError::schema(format!(
                    "unproductive recursion: type `{name}` refers back to itself \
                     without optional, list or map indirection"
                )));
            }
            // Productive cycle; the open frame already covers this subtree.
            return Ok(());
        }
        let Some(target) = self.lookup(name) else {
            return Err(BareWireError::schema(format!(
                "type `{owner}` references undefined type `{name}`"
            )));
        };
        self.reachable.insert(name.to_string());
        self.stack.push((name.to_string(), self.indirections));
        let result = self.check_type(target, name);
        self.stack.pop();
        result
    }

    fn check_enum(&self, values: &[(String, u64)], owner: &str) -> Result<()> {
        if values.is_empty() {
            return Err(BareWireError::schema(format!(
                "enum `{owner}` has no values"
            )));
        }
        let mut names = HashSet::new();
        let mut numbers = HashSet::new();
        for (name, value) in values {
            if !names.insert(name.as_str()) {
                return Err(BareWireError::schema(format!(
                    "enum `{owner}` has duplicate variant name `{name}`"
                )));
            }
            if !numbers.insert(*value) {
                return Err(BareWireError::schema(format!(
                    "enum `{owner}` has duplicate value {value}"
                )));
            }
        }
        Ok(())
    }

    /// Map keys must hash consistently on the wire: no void, no byte blobs,
    /// no floating point. References are resolved before judging.
    fn check_map_key(&self, key: &Type, owner: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let mut ty = key;
        while let Type::UserDefined(name) = ty {
            if !seen.insert(name.clone()) {
                return Err(BareWireError::schema(format!(
                    "unproductive recursion: type `{name}` refers back to itself \
                     without optional, list or map indirection"
                )));
            }
            ty = self.lookup(name).ok_or_else(|| {
                BareWireError::schema(format!(
                    "type `{owner}` references undefined type `{name}`"
                ))
            })?;
        }
        let reject = |what: &str| {
            Err(BareWireError::schema(format!(
                "map key in `{owner}` must be a hashable primitive or enum: {what}"
            )))
        };
        match ty {
            Type::Primitive(PrimitiveType::Void) => reject("void keys are not allowed"),
            Type::Primitive(PrimitiveType::Data | PrimitiveType::FixedData(_)) => {
                reject("data keys are not allowed")
            }
            Type::Primitive(PrimitiveType::F32 | PrimitiveType::F64) => {
                reject("floating-point keys are not allowed")
            }
            Type::Primitive(_) => Ok(()),
            other => reject(&format!("found {}", other.describe())),
        }
    }
}
