//! Typed memory views: zero-copy structural access to an encoded record
//! through its schema.
//!
//! A view consults the schema once at construction to index every field
//! whose byte offset is statically known (all preceding fields fixed-size),
//! and resolves the rest on demand by skipping over the variable-length
//! portion that precedes them. Resolved offsets are cached for the lifetime
//! of the view, which is sound because in-place writes are never allowed to
//! change a field's encoded length.

mod path;
mod slice;

pub use path::FieldPath;
pub use slice::MemorySlice;

use std::cell::RefCell;
use std::collections::HashMap;

use crate::bytes::{BytesReader, BytesWriter};
use crate::codec::varint::read_uint;
use crate::codec::{decode_as, encode_as, skip_value, Value};
use crate::error::{BareWireError, Result};
use crate::schema::{Schema, Type, Validated};

/// One entry of the fixed-prefix offset index.
#[derive(Debug, Clone)]
pub struct IndexedField<'a> {
    pub path: FieldPath,
    pub offset: usize,
    ty: &'a Type,
}

impl IndexedField<'_> {
    pub fn ty(&self) -> &Type {
        self.ty
    }
}

/// A validated schema paired with a backing slice, answering field queries
/// by direct byte access instead of decoding the whole record.
pub struct MemoryView<'a> {
    schema: &'a Schema<Validated>,
    root: &'a Type,
    slice: MemorySlice<'a>,
    fixed_index: Vec<IndexedField<'a>>,
    fixed_lookup: HashMap<FieldPath, (usize, &'a Type)>,
    /// Offsets past the first variable-length field, resolved by scanning.
    /// Cleared on every write: a tag swap can change which types live
    /// downstream of a union even when no length changes.
    dynamic_cache: RefCell<HashMap<FieldPath, (usize, &'a Type)>>,
}

impl<'a> MemoryView<'a> {
    /// Read-only view over the schema's root type.
    pub fn over(schema: &'a Schema<Validated>, data: &'a [u8]) -> MemoryView<'a> {
        Self::with_root(schema, schema.root_type(), MemorySlice::read_only(data))
    }

    /// Writable view over the schema's root type.
    pub fn over_mut(schema: &'a Schema<Validated>, data: &'a mut [u8]) -> MemoryView<'a> {
        Self::with_root(schema, schema.root_type(), MemorySlice::writable(data))
    }

    /// View over an explicit slice, e.g. a narrowed region of a mapping.
    pub fn new(schema: &'a Schema<Validated>, slice: MemorySlice<'a>) -> MemoryView<'a> {
        Self::with_root(schema, schema.root_type(), slice)
    }

    fn with_root(
        schema: &'a Schema<Validated>,
        root: &'a Type,
        slice: MemorySlice<'a>,
    ) -> MemoryView<'a> {
        let mut fixed_index = Vec::new();
        build_fixed_index(schema, root, 0, &FieldPath::root(), &mut fixed_index);
        let fixed_lookup = fixed_index
            .iter()
            .map(|entry| (entry.path.clone(), (entry.offset, entry.ty)))
            .collect();
        MemoryView {
            schema,
            root,
            slice,
            fixed_index,
            fixed_lookup,
            dynamic_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &'a Schema<Validated> {
        self.schema
    }

    /// The type this view decodes at offset zero.
    pub fn root_type(&self) -> &'a Type {
        self.root
    }

    pub fn slice(&self) -> &MemorySlice<'a> {
        &self.slice
    }

    /// Fields whose offsets were computed at construction, in declaration
    /// order. Offsets are monotonic.
    pub fn fixed_fields(&self) -> &[IndexedField<'a>] {
        &self.fixed_index
    }

    /// Decode the field addressed by `path`. Read-only; cached offsets of
    /// other fields stay valid.
    pub fn get(&self, path: impl Into<FieldPath>) -> Result<Value> {
        let path = path.into();
        let (offset, ty) = self.locate(&path)?;
        let mut reader = BytesReader::new(self.slice.bytes());
        reader.seek(offset)?;
        decode_as(self.schema, ty, &mut reader)
    }

    /// Overwrite the field addressed by `path` in place.
    ///
    /// Permitted only when the field is fixed-size or the new encoding has
    /// exactly the byte length of the old one; anything else would shift the
    /// rest of the record and corrupt it.
    pub fn set(&mut self, path: impl Into<FieldPath>, value: &Value) -> Result<()> {
        let path = path.into();
        let (offset, ty) = self.locate(&path)?;
        let old_len = self.field_len_at(ty, offset)?;

        let mut writer = BytesWriter::new();
        encode_as(self.schema, ty, value, &mut writer)?;
        let encoded = writer.into_vec();
        if encoded.len() != old_len {
            return Err(BareWireError::invalid(
                "would resize variable-length field in place",
            ));
        }

        let dest = self.slice.bytes_mut()?;
        let end = offset
            .checked_add(old_len)
            .filter(|&end| end <= dest.len())
            .ok_or(BareWireError::OutOfBounds {
                offset,
                length: old_len,
            })?;
        dest[offset..end].copy_from_slice(&encoded);
        self.dynamic_cache.borrow_mut().clear();
        Ok(())
    }

    /// Resolved byte offset of the field addressed by `path`.
    pub fn offset_of(&self, path: impl Into<FieldPath>) -> Result<usize> {
        Ok(self.locate(&path.into())?.0)
    }

    /// Sub-view narrowed to the byte range of the addressed field, with that
    /// field's type as root. Writability is inherited.
    pub fn nested(&mut self, path: impl Into<FieldPath>) -> Result<MemoryView<'_>> {
        let path = path.into();
        let (offset, ty) = self.locate(&path)?;
        let len = self.field_len_at(ty, offset)?;
        let slice = self.slice.renarrow(offset, len)?;
        Ok(MemoryView::with_root(self.schema, ty, slice))
    }

    /// Resolve a path to an absolute offset and the type found there.
    fn locate(&self, path: &FieldPath) -> Result<(usize, &'a Type)> {
        if let Some(&hit) = self.fixed_lookup.get(path) {
            return Ok(hit);
        }
        if let Some(&hit) = self.dynamic_cache.borrow().get(path) {
            return Ok(hit);
        }

        let mut offset = 0usize;
        let mut ty = self.root;
        for segment in path.segments() {
            ty = self.enter_containers(ty, &mut offset)?;
            let Type::Struct(fields) = ty else {
                return Err(BareWireError::mismatch("struct", ty.describe()));
            };
            let mut found = None;
            for field in fields {
                if field.name == segment {
                    found = Some(&field.ty);
                    break;
                }
                offset += self.field_len_at(&field.ty, offset)?;
            }
            match found {
                Some(field_ty) => ty = field_ty,
                // Either a misspelled path or a path assuming a union
                // variant other than the one present in the bytes.
                None => {
                    return Err(BareWireError::mismatch(
                        format!("struct with field `{segment}`"),
                        ty.describe(),
                    ))
                }
            }
        }

        self.dynamic_cache
            .borrow_mut()
            .insert(path.clone(), (offset, ty));
        Ok((offset, ty))
    }

    /// Follow references, and step through optionals and unions by decoding
    /// their runtime tags, until a structural type is reached. A path that
    /// assumes an absent optional or the wrong union variant fails with
    /// `TypeMismatch`.
    fn enter_containers(&self, mut ty: &'a Type, offset: &mut usize) -> Result<&'a Type> {
        let bytes = self.slice.bytes();
        loop {
            match ty {
                Type::UserDefined(name) => {
                    ty = self.schema.type_named(name).ok_or_else(|| {
                        BareWireError::decoding(format!("unresolved type reference `{name}`"))
                    })?;
                }
                Type::Optional(inner) => {
                    let tag = *bytes.get(*offset).ok_or(BareWireError::OutOfBounds {
                        offset: *offset,
                        length: 1,
                    })?;
                    match tag {
                        0x00 => {
                            return Err(BareWireError::mismatch(
                                inner.describe(),
                                "absent optional",
                            ))
                        }
                        0x01 => {
                            *offset += 1;
                            ty = inner;
                        }
                        other => {
                            return Err(BareWireError::decoding(format!(
                                "invalid optional tag 0x{other:02X}"
                            )))
                        }
                    }
                }
                Type::Union(variants) => {
                    let mut reader = BytesReader::new(bytes);
                    reader.seek(*offset)?;
                    let raw_tag = read_uint(&mut reader)?;
                    let tag = u32::try_from(raw_tag).map_err(|_| {
                        BareWireError::decoding(format!("unknown union tag {raw_tag}"))
                    })?;
                    let Some((_, variant_ty)) = variants.iter().find(|(t, _)| *t == tag) else {
                        return Err(BareWireError::decoding(format!("unknown union tag {tag}")));
                    };
                    *offset = reader.position();
                    ty = variant_ty;
                }
                _ => return Ok(ty),
            }
        }
    }

    /// Encoded length of the value of `ty` starting at `offset`.
    fn field_len_at(&self, ty: &Type, offset: usize) -> Result<usize> {
        let info = self.schema.size_of(ty);
        if info.fixed {
            return Ok(info.min_bytes);
        }
        let mut reader = BytesReader::new(self.slice.bytes());
        reader.seek(offset)?;
        skip_value(self.schema, ty, &mut reader)
    }
}

/// Record every reachable struct field whose preceding siblings (at every
/// level) are fixed-size. Does not descend through optionals, unions, lists
/// or maps: their contents have no statically known offsets.
fn build_fixed_index<'a>(
    schema: &'a Schema<Validated>,
    ty: &'a Type,
    base: usize,
    prefix: &FieldPath,
    out: &mut Vec<IndexedField<'a>>,
) {
    let Some(resolved) = schema.resolve(ty) else {
        return;
    };
    let Type::Struct(fields) = resolved else {
        return;
    };
    let mut offset = base;
    for field in fields {
        let path = prefix.child(&field.name);
        out.push(IndexedField {
            path: path.clone(),
            offset,
            ty: &field.ty,
        });
        if matches!(schema.resolve(&field.ty), Some(Type::Struct(_))) {
            build_fixed_index(schema, &field.ty, offset, &path, out);
        }
        let info = schema.size_of(&field.ty);
        if !info.fixed {
            break;
        }
        offset += info.min_bytes;
    }
}
