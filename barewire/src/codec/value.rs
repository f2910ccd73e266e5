//! Runtime values for the schema-driven codec.

use indexmap::IndexMap;

/// A decoded or to-be-encoded BARE value, shaped like the [`Type`] it
/// inhabits.
///
/// [`Type`]: crate::schema::Type
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UInt(u64),
    Int(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    /// Raw bytes; inhabits both `data` and `fixed-data<N>`.
    Data(Vec<u8>),
    Void,
    /// The numeric value of an enum member.
    Enum(u64),
    Optional(Option<Box<Value>>),
    /// Elements; inhabits both `list<T>` and `fixed-list<T,N>`.
    List(Vec<Value>),
    Map(MapValue),
    Union { tag: u32, value: Box<Value> },
    /// Fields in declared order, with their names.
    Struct(Vec<(String, Value)>),
}

/// Map contents. Iteration order is insertion order, and the encoder emits
/// entries in exactly that order, which is what makes map encodings
/// deterministic.
pub type MapValue = IndexMap<MapKey, Value>;

/// Keys legal in a BARE map: hashable primitives and enum values. Floats,
/// byte blobs and void are excluded by schema validation, which is what
/// makes this enum hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    UInt(u64),
    Int(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    String(String),
    Enum(u64),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn data(bytes: impl Into<Vec<u8>>) -> Value {
        Value::Data(bytes.into())
    }

    pub fn some(value: Value) -> Value {
        Value::Optional(Some(Box::new(value)))
    }

    pub fn none() -> Value {
        Value::Optional(None)
    }

    pub fn union(tag: u32, value: Value) -> Value {
        Value::Union {
            tag,
            value: Box::new(value),
        }
    }

    pub fn structure<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Value {
        Value::Struct(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn map(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Value {
        Value::Map(entries.into_iter().collect())
    }

    /// The field of a struct value, by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(n) | Value::UInt(n) | Value::Enum(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short tag used in `TypeMismatch` messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::UInt(_) => "uint",
            Value::Int(_) => "int",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Data(_) => "data",
            Value::Void => "void",
            Value::Enum(_) => "enum",
            Value::Optional(_) => "optional",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Union { .. } => "union",
            Value::Struct(_) => "struct",
        }
    }
}

impl MapKey {
    pub fn string(s: impl Into<String>) -> MapKey {
        MapKey::String(s.into())
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            MapKey::UInt(_) => "uint",
            MapKey::Int(_) => "int",
            MapKey::U8(_) => "u8",
            MapKey::U16(_) => "u16",
            MapKey::U32(_) => "u32",
            MapKey::U64(_) => "u64",
            MapKey::I8(_) => "i8",
            MapKey::I16(_) => "i16",
            MapKey::I32(_) => "i32",
            MapKey::I64(_) => "i64",
            MapKey::Bool(_) => "bool",
            MapKey::String(_) => "string",
            MapKey::Enum(_) => "enum",
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> MapKey {
        MapKey::String(s.to_string())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> MapKey {
        MapKey::String(s)
    }
}
