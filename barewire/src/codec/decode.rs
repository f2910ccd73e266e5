//! Schema-driven decoding of BARE bytes into [`Value`]s.
//!
//! The decoder never returns partial data: any failure poisons the buffer
//! for the caller, and the reader is left positioned at the byte that
//! triggered it.

use indexmap::IndexMap;

use crate::bytes::BytesReader;
use crate::codec::value::{MapKey, Value};
use crate::codec::varint::{read_int, read_uint};
use crate::error::{BareWireError, Result};
use crate::schema::{PrimitiveType, Schema, Type, Validated};

/// Decode one value of the schema's root type, rejecting trailing bytes.
pub fn decode(schema: &Schema<Validated>, bytes: &[u8]) -> Result<Value> {
    let mut reader = BytesReader::new(bytes);
    let value = decode_as(schema, schema.root_type(), &mut reader)?;
    if reader.remaining() != 0 {
        return Err(BareWireError::decoding(format!(
            "{} trailing byte(s) after value",
            reader.remaining()
        )));
    }
    Ok(value)
}

/// Decode one value of a specific type from the reader's current position.
pub fn decode_as(
    schema: &Schema<Validated>,
    ty: &Type,
    reader: &mut BytesReader<'_>,
) -> Result<Value> {
    decode_value(schema, ty, reader).map_err(as_truncation)
}

/// Advance the reader past one encoded value without materializing it.
/// Returns the number of bytes consumed.
pub fn skip_value(
    schema: &Schema<Validated>,
    ty: &Type,
    reader: &mut BytesReader<'_>,
) -> Result<usize> {
    let start = reader.position();
    skip_inner(schema, ty, reader).map_err(as_truncation)?;
    Ok(reader.position() - start)
}

/// Running off the end of the input is malformed input, not a caller bug:
/// surface it as `Decoding` with the cursor coordinates preserved.
fn as_truncation(err: BareWireError) -> BareWireError {
    match err {
        BareWireError::OutOfBounds { offset, length } => BareWireError::decoding(format!(
            "truncated input: {length} byte(s) missing at offset {offset}"
        )),
        other => other,
    }
}

fn decode_value(
    schema: &Schema<Validated>,
    ty: &Type,
    reader: &mut BytesReader<'_>,
) -> Result<Value> {
    let ty = resolved(schema, ty)?;
    match ty {
        Type::Primitive(p) => decode_primitive(p, reader),
        Type::Optional(inner) => match reader.read_byte()? {
            0x00 => Ok(Value::none()),
            0x01 => Ok(Value::some(decode_value(schema, inner, reader)?)),
            other => Err(BareWireError::decoding(format!(
                "invalid optional tag 0x{other:02X}"
            ))),
        },
        Type::List(element) => {
            let count = read_uint(reader)?;
            check_count(count, schema.size_of(element).min_bytes as u64, reader)?;
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(decode_value(schema, element, reader)?);
            }
            Ok(Value::List(items))
        }
        Type::FixedList(element, n) => {
            let mut items = Vec::with_capacity(*n);
            for _ in 0..*n {
                items.push(decode_value(schema, element, reader)?);
            }
            Ok(Value::List(items))
        }
        Type::Map(key_ty, value_ty) => {
            let count = read_uint(reader)?;
            let min_entry = schema.size_of(key_ty).min_bytes + schema.size_of(value_ty).min_bytes;
            check_count(count, min_entry as u64, reader)?;
            let mut entries = IndexMap::new();
            for _ in 0..count {
                let key = decode_map_key(schema, key_ty, reader)?;
                let value = decode_value(schema, value_ty, reader)?;
                if entries.insert(key, value).is_some() {
                    return Err(BareWireError::decoding("duplicate map key"));
                }
            }
            Ok(Value::Map(entries))
        }
        Type::Union(variants) => {
            let raw_tag = read_uint(reader)?;
            let tag = u32::try_from(raw_tag)
                .map_err(|_| BareWireError::decoding(format!("unknown union tag {raw_tag}")))?;
            let Some((_, variant_ty)) = variants.iter().find(|(t, _)| *t == tag) else {
                return Err(BareWireError::decoding(format!("unknown union tag {tag}")));
            };
            Ok(Value::union(tag, decode_value(schema, variant_ty, reader)?))
        }
        Type::Struct(fields) => {
            let mut values = Vec::with_capacity(fields.len());
            for field in fields {
                values.push((field.name.clone(), decode_value(schema, &field.ty, reader)?));
            }
            Ok(Value::Struct(values))
        }
        Type::UserDefined(name) => Err(BareWireError::decoding(format!(
            "unresolved type reference `{name}`"
        ))),
    }
}

fn decode_primitive(p: &PrimitiveType, reader: &mut BytesReader<'_>) -> Result<Value> {
    match p {
        PrimitiveType::UInt => Ok(Value::UInt(read_uint(reader)?)),
        PrimitiveType::Int => Ok(Value::Int(read_int(reader)?)),
        PrimitiveType::U8 => Ok(Value::U8(reader.read_byte()?)),
        PrimitiveType::U16 => Ok(Value::U16(reader.read_u16_le()?)),
        PrimitiveType::U32 => Ok(Value::U32(reader.read_u32_le()?)),
        PrimitiveType::U64 => Ok(Value::U64(reader.read_u64_le()?)),
        PrimitiveType::I8 => Ok(Value::I8(reader.read_i8_le()?)),
        PrimitiveType::I16 => Ok(Value::I16(reader.read_i16_le()?)),
        PrimitiveType::I32 => Ok(Value::I32(reader.read_i32_le()?)),
        PrimitiveType::I64 => Ok(Value::I64(reader.read_i64_le()?)),
        PrimitiveType::F32 => Ok(Value::F32(reader.read_f32_le()?)),
        PrimitiveType::F64 => Ok(Value::F64(reader.read_f64_le()?)),
        PrimitiveType::Bool => match reader.read_byte()? {
            0x00 => Ok(Value::Bool(false)),
            0x01 => Ok(Value::Bool(true)),
            other => Err(BareWireError::decoding(format!(
                "invalid bool 0x{other:02X}"
            ))),
        },
        PrimitiveType::String => {
            let len = read_length(reader)?;
            let bytes = reader.read_exact(len)?;
            match std::str::from_utf8(bytes) {
                Ok(s) => Ok(Value::string(s)),
                Err(_) => Err(BareWireError::decoding("invalid utf-8")),
            }
        }
        PrimitiveType::Data => {
            let len = read_length(reader)?;
            Ok(Value::data(reader.read_exact(len)?))
        }
        PrimitiveType::FixedData(n) => Ok(Value::data(reader.read_exact(*n)?)),
        PrimitiveType::Void => Ok(Value::Void),
        PrimitiveType::Enum(values) => {
            let v = read_uint(reader)?;
            if !values.iter().any(|(_, declared)| *declared == v) {
                return Err(BareWireError::decoding(format!("unknown enum value {v}")));
            }
            Ok(Value::Enum(v))
        }
    }
}

fn decode_map_key(
    schema: &Schema<Validated>,
    key_ty: &Type,
    reader: &mut BytesReader<'_>,
) -> Result<MapKey> {
    let key_ty = resolved(schema, key_ty)?;
    let Type::Primitive(p) = key_ty else {
        return Err(BareWireError::decoding(format!(
            "map key type {} is not a primitive",
            key_ty.describe()
        )));
    };
    match p {
        PrimitiveType::UInt => Ok(MapKey::UInt(read_uint(reader)?)),
        PrimitiveType::Int => Ok(MapKey::Int(read_int(reader)?)),
        PrimitiveType::U8 => Ok(MapKey::U8(reader.read_byte()?)),
        PrimitiveType::U16 => Ok(MapKey::U16(reader.read_u16_le()?)),
        PrimitiveType::U32 => Ok(MapKey::U32(reader.read_u32_le()?)),
        PrimitiveType::U64 => Ok(MapKey::U64(reader.read_u64_le()?)),
        PrimitiveType::I8 => Ok(MapKey::I8(reader.read_i8_le()?)),
        PrimitiveType::I16 => Ok(MapKey::I16(reader.read_i16_le()?)),
        PrimitiveType::I32 => Ok(MapKey::I32(reader.read_i32_le()?)),
        PrimitiveType::I64 => Ok(MapKey::I64(reader.read_i64_le()?)),
        PrimitiveType::Bool => match reader.read_byte()? {
            0x00 => Ok(MapKey::Bool(false)),
            0x01 => Ok(MapKey::Bool(true)),
            other => Err(BareWireError::decoding(format!(
                "invalid bool 0x{other:02X}"
            ))),
        },
        PrimitiveType::String => {
            let len = read_length(reader)?;
            let bytes = reader.read_exact(len)?;
            match std::str::from_utf8(bytes) {
                Ok(s) => Ok(MapKey::string(s)),
                Err(_) => Err(BareWireError::decoding("invalid utf-8")),
            }
        }
        PrimitiveType::Enum(values) => {
            let v = read_uint(reader)?;
            if !values.iter().any(|(_, declared)| *declared == v) {
                return Err(BareWireError::decoding(format!("unknown enum value {v}")));
            }
            Ok(MapKey::Enum(v))
        }
        other => Err(BareWireError::decoding(format!(
            "map key type {} is not hashable",
            other.describe()
        ))),
    }
}

fn skip_inner(schema: &Schema<Validated>, ty: &Type, reader: &mut BytesReader<'_>) -> Result<()> {
    let info = schema.size_of(ty);
    if info.fixed {
        return reader.skip(info.min_bytes);
    }
    let ty = resolved(schema, ty)?;
    match ty {
        Type::Primitive(p) => match p {
            PrimitiveType::UInt | PrimitiveType::Int | PrimitiveType::Enum(_) => {
                read_uint(reader).map(|_| ())
            }
            PrimitiveType::String | PrimitiveType::Data => {
                let len = read_length(reader)?;
                reader.skip(len)
            }
            // Fixed-width primitives were handled by the fast path above.
            other => reader.skip(schema.size_of(&Type::Primitive(other.clone())).min_bytes),
        },
        Type::Optional(inner) => match reader.read_byte()? {
            0x00 => Ok(()),
            0x01 => skip_inner(schema, inner, reader),
            other => Err(BareWireError::decoding(format!(
                "invalid optional tag 0x{other:02X}"
            ))),
        },
        Type::List(element) => {
            let count = read_uint(reader)?;
            check_count(count, schema.size_of(element).min_bytes as u64, reader)?;
            for _ in 0..count {
                skip_inner(schema, element, reader)?;
            }
            Ok(())
        }
        Type::FixedList(element, n) => {
            for _ in 0..*n {
                skip_inner(schema, element, reader)?;
            }
            Ok(())
        }
        Type::Map(key_ty, value_ty) => {
            let count = read_uint(reader)?;
            let min_entry = schema.size_of(key_ty).min_bytes + schema.size_of(value_ty).min_bytes;
            check_count(count, min_entry as u64, reader)?;
            for _ in 0..count {
                skip_inner(schema, key_ty, reader)?;
                skip_inner(schema, value_ty, reader)?;
            }
            Ok(())
        }
        Type::Union(variants) => {
            let raw_tag = read_uint(reader)?;
            let tag = u32::try_from(raw_tag)
                .map_err(|_| BareWireError::decoding(format!("unknown union tag {raw_tag}")))?;
            let Some((_, variant_ty)) = variants.iter().find(|(t, _)| *t == tag) else {
                return Err(BareWireError::decoding(format!("unknown union tag {tag}")));
            };
            skip_inner(schema, variant_ty, reader)
        }
        Type::Struct(fields) => {
            for field in fields {
                skip_inner(schema, &field.ty, reader)?;
            }
            Ok(())
        }
        Type::UserDefined(name) => Err(BareWireError::decoding(format!(
            "unresolved type reference `{name}`"
        ))),
    }
}

/// A length prefix that cannot fit the remaining input is rejected before
/// any allocation happens.
fn read_length(reader: &mut BytesReader<'_>) -> Result<usize> {
    let len = read_uint(reader)?;
    if len > reader.remaining() as u64 {
        return Err(BareWireError::OutOfBounds {
            offset: reader.position(),
            length: len as usize,
        });
    }
    Ok(len as usize)
}

/// An element count whose minimum encoding cannot fit the remaining input is
/// rejected up front, so hostile counts do not drive huge allocations.
fn check_count(count: u64, min_entry_bytes: u64, reader: &BytesReader<'_>) -> Result<()> {
    if min_entry_bytes > 0 && count.saturating_mul(min_entry_bytes) > reader.remaining() as u64 {
        return Err(BareWireError::decoding(format!(
            "element count {count} exceeds remaining input"
        )));
    }
    Ok(())
}

fn resolved<'s>(schema: &'s Schema<Validated>, ty: &'s Type) -> Result<&'s Type> {
    schema.resolve(ty).ok_or_else(|| match ty {
        Type::UserDefined(name) => {
            BareWireError::decoding(format!("unresolved type reference `{name}`"))
        }
        _ => BareWireError::decoding("unresolved type reference"),
    })
}
