//! Schema-driven encoding of [`Value`]s to BARE bytes.

use crate::bytes::BytesWriter;
use crate::codec::value::{MapKey, Value};
use crate::codec::varint::{int_len, uint_len, write_int, write_uint};
use crate::error::{BareWireError, Result};
use crate::schema::{PrimitiveType, Schema, Type, Validated};

/// Encode a value against the schema's root type into a fresh buffer.
pub fn encode(schema: &Schema<Validated>, value: &Value) -> Result<Vec<u8>> {
    let mut writer = BytesWriter::new();
    encode_as(schema, schema.root_type(), value, &mut writer)?;
    Ok(writer.into_vec())
}

/// Encode a value as a specific type expressed against the schema.
pub fn encode_as(
    schema: &Schema<Validated>,
    ty: &Type,
    value: &Value,
    writer: &mut BytesWriter,
) -> Result<()> {
    let ty = resolved(schema, ty)?;
    match (ty, value) {
        (Type::Primitive(p), _) => encode_primitive(p, value, writer),
        (Type::Optional(inner), Value::Optional(opt)) => match opt {
            None => writer.write_byte(0x00),
            Some(inner_value) => {
                writer.write_byte(0x01)?;
                encode_as(schema, inner, inner_value, writer)
            }
        },
        (Type::List(element), Value::List(items)) => {
            write_uint(writer, items.len() as u64)?;
            for item in items {
                encode_as(schema, element, item, writer)?;
            }
            Ok(())
        }
        (Type::FixedList(element, n), Value::List(items)) => {
            if items.len() != *n {
                return Err(BareWireError::encoding(format!(
                    "fixed list expects {n} element(s), got {}",
                    items.len()
                )));
            }
            for item in items {
                encode_as(schema, element, item, writer)?;
            }
            Ok(())
        }
        (Type::Map(key_ty, value_ty), Value::Map(entries)) => {
            write_uint(writer, entries.len() as u64)?;
            for (key, entry_value) in entries {
                encode_map_key(schema, key_ty, key, writer)?;
                encode_as(schema, value_ty, entry_value, writer)?;
            }
            Ok(())
        }
        (Type::Union(variants), Value::Union { tag, value }) => {
            let Some((_, variant_ty)) = variants.iter().find(|(t, _)| t == tag) else {
                return Err(BareWireError::encoding(format!(
                    "union tag {tag} is not declared"
                )));
            };
            write_uint(writer, u64::from(*tag))?;
            encode_as(schema, variant_ty, value, writer)
        }
        (Type::Struct(fields), Value::Struct(values)) => {
            if fields.len() != values.len() {
                return Err(BareWireError::encoding(format!(
                    "struct expects {} field(s), got {}",
                    fields.len(),
                    values.len()
                )));
            }
            for (field, (name, field_value)) in fields.iter().zip(values) {
                if field.name != *name {
                    return Err(BareWireError::encoding(format!(
                        "struct field `{name}` out of order, expected `{}`",
                        field.name
                    )));
                }
                encode_as(schema, &field.ty, field_value, writer)?;
            }
            Ok(())
        }
        (ty, value) => Err(BareWireError::mismatch(ty.describe(), value.kind())),
    }
}

fn encode_primitive(p: &PrimitiveType, value: &Value, writer: &mut BytesWriter) -> Result<()> {
    match (p, value) {
        (PrimitiveType::UInt, Value::UInt(n)) => write_uint(writer, *n),
        (PrimitiveType::Int, Value::Int(n)) => write_int(writer, *n),
        (PrimitiveType::U8, Value::U8(n)) => writer.write_byte(*n),
        (PrimitiveType::U16, Value::U16(n)) => writer.write_u16_le(*n),
        (PrimitiveType::U32, Value::U32(n)) => writer.write_u32_le(*n),
        (PrimitiveType::U64, Value::U64(n)) => writer.write_u64_le(*n),
        (PrimitiveType::I8, Value::I8(n)) => writer.write_i8_le(*n),
        (PrimitiveType::I16, Value::I16(n)) => writer.write_i16_le(*n),
        (PrimitiveType::I32, Value::I32(n)) => writer.write_i32_le(*n),
        (PrimitiveType::I64, Value::I64(n)) => writer.write_i64_le(*n),
        // IEEE-754 bit patterns are written verbatim, NaN payloads included.
        (PrimitiveType::F32, Value::F32(x)) => writer.write_f32_le(*x),
        (PrimitiveType::F64, Value::F64(x)) => writer.write_f64_le(*x),
        (PrimitiveType::Bool, Value::Bool(b)) => writer.write_byte(u8::from(*b)),
        (PrimitiveType::String, Value::String(s)) => {
            write_uint(writer, s.len() as u64)?;
            writer.write_exact(s.as_bytes())
        }
        (PrimitiveType::Data, Value::Data(bytes)) => {
            write_uint(writer, bytes.len() as u64)?;
            writer.write_exact(bytes)
        }
        (PrimitiveType::FixedData(n), Value::Data(bytes)) => {
            if bytes.len() != *n {
                return Err(BareWireError::encoding(format!(
                    "fixed data expects {n} byte(s), got {}",
                    bytes.len()
                )));
            }
            writer.write_exact(bytes)
        }
        (PrimitiveType::Void, Value::Void) => Ok(()),
        (PrimitiveType::Enum(values), Value::Enum(v)) => {
            if !values.iter().any(|(_, declared)| declared == v) {
                return Err(BareWireError::encoding(format!(
                    "enum value {v} is not declared"
                )));
            }
            write_uint(writer, *v)
        }
        (p, value) => Err(BareWireError::mismatch(p.describe(), value.kind())),
    }
}

fn encode_map_key(
    schema: &Schema<Validated>,
    key_ty: &Type,
    key: &MapKey,
    writer: &mut BytesWriter,
) -> Result<()> {
    let key_ty = resolved(schema, key_ty)?;
    let Type::Primitive(p) = key_ty else {
        return Err(BareWireError::mismatch(key_ty.describe(), key.kind()));
    };
    match (p, key) {
        (PrimitiveType::UInt, MapKey::UInt(n)) => write_uint(writer, *n),
        (PrimitiveType::Int, MapKey::Int(n)) => write_int(writer, *n),
        (PrimitiveType::U8, MapKey::U8(n)) => writer.write_byte(*n),
        (PrimitiveType::U16, MapKey::U16(n)) => writer.write_u16_le(*n),
        (PrimitiveType::U32, MapKey::U32(n)) => writer.write_u32_le(*n),
        (PrimitiveType::U64, MapKey::U64(n)) => writer.write_u64_le(*n),
        (PrimitiveType::I8, MapKey::I8(n)) => writer.write_i8_le(*n),
        (PrimitiveType::I16, MapKey::I16(n)) => writer.write_i16_le(*n),
        (PrimitiveType::I32, MapKey::I32(n)) => writer.write_i32_le(*n),
        (PrimitiveType::I64, MapKey::I64(n)) => writer.write_i64_le(*n),
        (PrimitiveType::Bool, MapKey::Bool(b)) => writer.write_byte(u8::from(*b)),
        (PrimitiveType::String, MapKey::String(s)) => {
            write_uint(writer, s.len() as u64)?;
            writer.write_exact(s.as_bytes())
        }
        (PrimitiveType::Enum(values), MapKey::Enum(v)) => {
            if !values.iter().any(|(_, declared)| declared == v) {
                return Err(BareWireError::encoding(format!(
                    "enum value {v} is not declared"
                )));
            }
            write_uint(writer, *v)
        }
        (p, key) => Err(BareWireError::mismatch(p.describe(), key.kind())),
    }
}

/// Byte length of the encoding of `value` as `ty`, without producing it.
/// Fails on exactly the inputs [`encode_as`] fails on.
pub fn encoded_size(schema: &Schema<Validated>, ty: &Type, value: &Value) -> Result<usize> {
    let ty = resolved(schema, ty)?;
    match (ty, value) {
        (Type::Primitive(p), _) => primitive_size(p, value),
        (Type::Optional(inner), Value::Optional(opt)) => match opt {
            None => Ok(1),
            Some(inner_value) => Ok(1 + encoded_size(schema, inner, inner_value)?),
        },
        (Type::List(element), Value::List(items)) => {
            let mut total = uint_len(items.len() as u64);
            for item in items {
                total += encoded_size(schema, element, item)?;
            }
            Ok(total)
        }
        (Type::FixedList(element, n), Value::List(items)) => {
            if items.len() != *n {
                return Err(BareWireError::encoding(format!(
                    "fixed list expects {n} element(s), got {}",
                    items.len()
                )));
            }
            let mut total = 0;
            for item in items {
                total += encoded_size(schema, element, item)?;
            }
            Ok(total)
        }
        (Type::Map(key_ty, value_ty), Value::Map(entries)) => {
            let mut total = uint_len(entries.len() as u64);
            for (key, entry_value) in entries {
                total += map_key_size(schema, key_ty, key)?;
                total += encoded_size(schema, value_ty, entry_value)?;
            }
            Ok(total)
        }
        (Type::Union(variants), Value::Union { tag, value }) => {
            let Some((_, variant_ty)) = variants.iter().find(|(t, _)| t == tag) else {
                return Err(BareWireError::encoding(format!(
                    "union tag {tag} is not declared"
                )));
            };
            Ok(uint_len(u64::from(*tag)) + encoded_size(schema, variant_ty, value)?)
        }
        (Type::Struct(fields), Value::Struct(values)) => {
            if fields.len() != values.len() {
                return Err(BareWireError::encoding(format!(
                    "struct expects {} field(s), got {}",
                    fields.len(),
                    values.len()
                )));
            }
            let mut total = 0;
            for (field, (name, field_value)) in fields.iter().zip(values) {
                if field.name != *name {
                    return Err(BareWireError::encoding(format!(
                        "struct field `{name}` out of order, expected `{}`",
                        field.name
                    )));
                }
                total += encoded_size(schema, &field.ty, field_value)?;
            }
            Ok(total)
        }
        (ty, value) => Err(BareWireError::mismatch(ty.describe(), value.kind())),
    }
}

fn primitive_size(p: &PrimitiveType, value: &Value) -> Result<usize> {
    match (p, value) {
        (PrimitiveType::UInt, Value::UInt(n)) => Ok(uint_len(*n)),
        (PrimitiveType::Int, Value::Int(n)) => Ok(int_len(*n)),
        (PrimitiveType::U8, Value::U8(_)) | (PrimitiveType::I8, Value::I8(_)) => Ok(1),
        (PrimitiveType::U16, Value::U16(_)) | (PrimitiveType::I16, Value::I16(_)) => Ok(2),
        (PrimitiveType::U32, Value::U32(_))
        | (PrimitiveType::I32, Value::I32(_))
        | (PrimitiveType::F32, Value::F32(_)) => Ok(4),
        (PrimitiveType::U64, Value::U64(_))
        | (PrimitiveType::I64, Value::I64(_))
        | (PrimitiveType::F64, Value::F64(_)) => Ok(8),
        (PrimitiveType::Bool, Value::Bool(_)) => Ok(1),
        (PrimitiveType::String, Value::String(s)) => Ok(uint_len(s.len() as u64) + s.len()),
        (PrimitiveType::Data, Value::Data(bytes)) => {
            Ok(uint_len(bytes.len() as u64) + bytes.len())
        }
        (PrimitiveType::FixedData(n), Value::Data(bytes)) => {
            if bytes.len() != *n {
                return Err(BareWireError::encoding(format!(
                    "fixed data expects {n} byte(s), got {}",
                    bytes.len()
                )));
            }
            Ok(*n)
        }
        (PrimitiveType::Void, Value::Void) => Ok(0),
        (PrimitiveType::Enum(values), Value::Enum(v)) => {
            if !values.iter().any(|(_, declared)| declared == v) {
                return Err(BareWireError::encoding(format!(
                    "enum value {v} is not declared"
                )));
            }
            Ok(uint_len(*v))
        }
        (p, value) => Err(BareWireError::mismatch(p.describe(), value.kind())),
    }
}

fn map_key_size(schema: &Schema<Validated>, key_ty: &Type, key: &MapKey) -> Result<usize> {
    let key_ty = resolved(schema, key_ty)?;
    let Type::Primitive(p) = key_ty else {
        return Err(BareWireError::mismatch(key_ty.describe(), key.kind()));
    };
    match (p, key) {
        (PrimitiveType::UInt, MapKey::UInt(n)) => Ok(uint_len(*n)),
        (PrimitiveType::Int, MapKey::Int(n)) => Ok(int_len(*n)),
        (PrimitiveType::U8, MapKey::U8(_)) | (PrimitiveType::I8, MapKey::I8(_)) => Ok(1),
        (PrimitiveType::U16, MapKey::U16(_)) | (PrimitiveType::I16, MapKey::I16(_)) => Ok(2),
        (PrimitiveType::U32, MapKey::U32(_)) | (PrimitiveType::I32, MapKey::I32(_)) => Ok(4),
        (PrimitiveType::U64, MapKey::U64(_)) | (PrimitiveType::I64, MapKey::I64(_)) => Ok(8),
        (PrimitiveType::Bool, MapKey::Bool(_)) => Ok(1),
        (PrimitiveType::String, MapKey::String(s)) => Ok(uint_len(s.len() as u64) + s.len()),
        (PrimitiveType::Enum(values), MapKey::Enum(v)) => {
            if !values.iter().any(|(_, declared)| declared == v) {
                return Err(BareWireError::encoding(format!(
                    "enum value {v} is not declared"
                )));
            }
            Ok(uint_len(*v))
        }
        (p, key) => Err(BareWireError::mismatch(p.describe(), key.kind())),
    }
}

/// Follow reference chains; a dangling reference can only mean the type was
/// not expressed against this schema.
fn resolved<'s>(schema: &'s Schema<Validated>, ty: &'s Type) -> Result<&'s Type> {
    schema.resolve(ty).ok_or_else(|| match ty {
        Type::UserDefined(name) => {
            BareWireError::encoding(format!("unresolved type reference `{name}`"))
        }
        _ => BareWireError::encoding("unresolved type reference"),
    })
}
