//! Schema type model: BARE types, struct fields and the draft/validated
//! schema with its phantom state.

use std::collections::HashMap;
use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::schema::size::SizeInfo;

/// BARE primitive types.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveType {
    /// Unsigned LEB128 variable-length integer.
    UInt,
    /// Zigzag-mapped LEB128 variable-length integer.
    Int,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
    /// UInt byte-length prefix followed by UTF-8 bytes.
    String,
    /// UInt byte-length prefix followed by raw bytes.
    Data,
    /// Exactly `n` raw bytes, no prefix.
    FixedData(usize),
    /// Encodes to and decodes from zero bytes.
    Void,
    /// Named values encoded as UInt. Declaration order is preserved; name and
    /// value uniqueness is enforced by schema validation.
    Enum(Vec<(String, u64)>),
}

/// A BARE type: primitive, aggregate, or a late-bound reference to a named
/// type in the enclosing schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive(PrimitiveType),
    Optional(Box<Type>),
    List(Box<Type>),
    FixedList(Box<Type>, usize),
    Map(Box<Type>, Box<Type>),
    /// Tagged variants. Declaration order is preserved; tag uniqueness is
    /// enforced by schema validation.
    Union(Vec<(u32, Type)>),
    Struct(Vec<StructField>),
    UserDefined(String),
}

/// A named struct field. Field order within a struct defines encoding order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        StructField {
            name: name.into(),
            ty,
        }
    }
}

impl Type {
    pub fn uint() -> Type {
        Type::Primitive(PrimitiveType::UInt)
    }

    pub fn int() -> Type {
        Type::Primitive(PrimitiveType::Int)
    }

    pub fn u8() -> Type {
        Type::Primitive(PrimitiveType::U8)
    }

    pub fn u16() -> Type {
        Type::Primitive(PrimitiveType::U16)
    }

    pub fn u32() -> Type {
        Type::Primitive(PrimitiveType::U32)
    }

    pub fn u64() -> Type {
        Type::Primitive(PrimitiveType::U64)
    }

    pub fn i8() -> Type {
        Type::Primitive(PrimitiveType::I8)
    }

    pub fn i16() -> Type {
        Type::Primitive(PrimitiveType::I16)
    }

    pub fn i32() -> Type {
        Type::Primitive(PrimitiveType::I32)
    }

    pub fn i64() -> Type {
        Type::Primitive(PrimitiveType::I64)
    }

    pub fn f32() -> Type {
        Type::Primitive(PrimitiveType::F32)
    }

    pub fn f64() -> Type {
        Type::Primitive(PrimitiveType::F64)
    }

    pub fn bool() -> Type {
        Type::Primitive(PrimitiveType::Bool)
    }

    pub fn string() -> Type {
        Type::Primitive(PrimitiveType::String)
    }

    pub fn data() -> Type {
        Type::Primitive(PrimitiveType::Data)
    }

    pub fn fixed_data(len: usize) -> Type {
        Type::Primitive(PrimitiveType::FixedData(len))
    }

    pub fn void() -> Type {
        Type::Primitive(PrimitiveType::Void)
    }

    pub fn enumeration<N: Into<String>>(values: impl IntoIterator<Item = (N, u64)>) -> Type {
        Type::Primitive(PrimitiveType::Enum(
            values.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        ))
    }

    pub fn optional(inner: Type) -> Type {
        Type::Optional(Box::new(inner))
    }

    pub fn list(element: Type) -> Type {
        Type::List(Box::new(element))
    }

    pub fn fixed_list(element: Type, len: usize) -> Type {
        Type::FixedList(Box::new(element), len)
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn union(variants: impl IntoIterator<Item = (u32, Type)>) -> Type {
        Type::Union(variants.into_iter().collect())
    }

    pub fn structure(fields: impl IntoIterator<Item = StructField>) -> Type {
        Type::Struct(fields.into_iter().collect())
    }

    pub fn user(name: impl Into<String>) -> Type {
        Type::UserDefined(name.into())
    }

    /// Short rendering used in error messages; the full canonical form lives
    /// in `schema::canonical`.
    pub(crate) fn describe(&self) -> String {
        match self {
            Type::Primitive(p) => p.describe().to_string(),
            Type::Optional(inner) => format!("optional<{}>", inner.describe()),
            Type::List(element) => format!("list<{}>", element.describe()),
            Type::FixedList(element, len) => {
                format!("fixed-list<{},{}>", element.describe(), len)
            }
            Type::Map(key, value) => format!("map<{},{}>", key.describe(), value.describe()),
            Type::Union(variants) => format!("union({} variants)", variants.len()),
            Type::Struct(fields) => format!("struct({} fields)", fields.len()),
            Type::UserDefined(name) => name.clone(),
        }
    }
}

impl PrimitiveType {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            PrimitiveType::UInt => "uint",
            PrimitiveType::Int => "int",
            PrimitiveType::U8 => "u8",
            PrimitiveType::U16 => "u16",
            PrimitiveType::U32 => "u32",
            PrimitiveType::U64 => "u64",
            PrimitiveType::I8 => "i8",
            PrimitiveType::I16 => "i16",
            PrimitiveType::I32 => "i32",
            PrimitiveType::I64 => "i64",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
            PrimitiveType::Bool => "bool",
            PrimitiveType::String => "string",
            PrimitiveType::Data => "data",
            PrimitiveType::FixedData(_) => "fixed-data",
            PrimitiveType::Void => "void",
            PrimitiveType::Enum(_) => "enum",
        }
    }
}

/// Marker for a schema that has not been validated yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draft;

/// Marker for a schema whose invariants have all been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validated;

/// A named collection of types with a designated root.
///
/// The phantom `State` parameter distinguishes draft schemas from validated
/// ones: the codec, memory view and protocol layers only accept
/// `Schema<Validated>`, and the only way to obtain one is
/// [`Schema::validate`], so an unvalidated schema cannot reach the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema<State = Validated> {
    pub(crate) types: IndexMap<String, Type>,
    pub(crate) root: String,
    /// Size analysis per reachable named type; populated by validation.
    pub(crate) sizes: HashMap<String, SizeInfo>,
    pub(crate) _state: PhantomData<State>,
}

impl Schema<Draft> {
    /// Start a draft schema whose root type has the given name.
    pub fn draft(root: impl Into<String>) -> Schema<Draft> {
        Schema {
            types: IndexMap::new(),
            root: root.into(),
            sizes: HashMap::new(),
            _state: PhantomData,
        }
    }

    /// Add or replace a named type definition.
    pub fn define(mut self, name: impl Into<String>, ty: Type) -> Schema<Draft> {
        self.types.insert(name.into(), ty);
        self
    }
}

impl<State> Schema<State> {
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn type_named(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    /// Iterate the defined types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Schema<Validated> {
    /// The root type. Validation guarantees it exists.
    pub fn root_type(&self) -> &Type {
        &self.types[&self.root]
    }

    /// Size analysis for a named type, if it is reachable from the root.
    pub fn size_of_named(&self, name: &str) -> Option<SizeInfo> {
        self.sizes.get(name).copied()
    }

    /// Follow `UserDefined` references until a structural type is reached.
    ///
    /// Validation guarantees every reference reachable from the root
    /// resolves, and that pure reference cycles are rejected, so the chain
    /// is finite; `None` only occurs for types that were never part of this
    /// schema.
    pub(crate) fn resolve<'s>(&'s self, mut ty: &'s Type) -> Option<&'s Type> {
        while let Type::UserDefined(name) = ty {
            ty = self.types.get(name)?;
        }
        Some(ty)
    }
}
