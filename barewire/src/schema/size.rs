//! Encoded-size analysis. Computed once during validation and consulted by
//! the memory view when laying out fixed-prefix field offsets.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::codec::varint::uint_len;
use crate::schema::model::{PrimitiveType, Schema, Type, Validated};

/// Byte-size bounds for one type.
///
/// `fixed` means every value of the type encodes to exactly `min_bytes`.
/// For recursive types `min_bytes` is a lower bound: re-entrant references
/// contribute zero during analysis, which is safe because the bound is only
/// trusted when `fixed` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeInfo {
    pub min_bytes: usize,
    pub max_bytes: Option<usize>,
    pub fixed: bool,
}

impl SizeInfo {
    pub(crate) fn exact(n: usize) -> SizeInfo {
        SizeInfo {
            min_bytes: n,
            max_bytes: Some(n),
            fixed: true,
        }
    }

    pub(crate) fn bounded(min: usize, max: usize) -> SizeInfo {
        SizeInfo {
            min_bytes: min,
            max_bytes: Some(max),
            fixed: min == max,
        }
    }

    pub(crate) fn variable(min: usize) -> SizeInfo {
        SizeInfo {
            min_bytes: min,
            max_bytes: None,
            fixed: false,
        }
    }
}

fn primitive_size(p: &PrimitiveType) -> SizeInfo {
    match p {
        PrimitiveType::UInt | PrimitiveType::Int | PrimitiveType::Enum(_) => {
            SizeInfo::bounded(1, 10)
        }
        PrimitiveType::U8 | PrimitiveType::I8 | PrimitiveType::Bool => SizeInfo::exact(1),
        PrimitiveType::U16 | PrimitiveType::I16 => SizeInfo::exact(2),
        PrimitiveType::U32 | PrimitiveType::I32 | PrimitiveType::F32 => SizeInfo::exact(4),
        PrimitiveType::U64 | PrimitiveType::I64 | PrimitiveType::F64 => SizeInfo::exact(8),
        // Length prefix of an empty value is a single 0x00 byte.
        PrimitiveType::String | PrimitiveType::Data => SizeInfo::variable(1),
        PrimitiveType::FixedData(n) => SizeInfo::exact(*n),
        PrimitiveType::Void => SizeInfo::exact(0),
    }
}

/// Structural size of a type, resolving named references through `named`.
pub(crate) fn structural_size(ty: &Type, named: &mut dyn FnMut(&str) -> SizeInfo) -> SizeInfo {
    match ty {
        Type::Primitive(p) => primitive_size(p),
        Type::Optional(inner) => {
            let inner = structural_size(inner, named);
            let max = inner.max_bytes.map(|m| 1 + m);
            SizeInfo {
                min_bytes: 1,
                max_bytes: max,
                fixed: max == Some(1),
            }
        }
        Type::List(_) | Type::Map(_, _) => SizeInfo::variable(1),
        Type::FixedList(element, n) => {
            let element = structural_size(element, named);
            let min = element.min_bytes * n;
            let max = element.max_bytes.map(|m| m * n);
            SizeInfo {
                min_bytes: min,
                max_bytes: max,
                fixed: max == Some(min),
            }
        }
        Type::Union(variants) => {
            let mut min: Option<usize> = None;
            let mut max: Option<usize> = Some(0);
            for (tag, variant) in variants {
                let v = structural_size(variant, named);
                let tag_len = uint_len(u64::from(*tag));
                let v_min = tag_len + v.min_bytes;
                min = Some(min.map_or(v_min, |m| m.min(v_min)));
                max = match (max, v.max_bytes) {
                    (Some(m), Some(vm)) => Some(m.max(tag_len + vm)),
                    _ => None,
                };
            }
            let min = min.unwrap_or(0);
            SizeInfo {
                min_bytes: min,
                max_bytes: max,
                fixed: max == Some(min),
            }
        }
        Type::Struct(fields) => {
            let mut min = 0usize;
            let mut max = Some(0usize);
            for field in fields {
                let f = structural_size(&field.ty, named);
                min += f.min_bytes;
                max = match (max, f.max_bytes) {
                    (Some(m), Some(fm)) => Some(m + fm),
                    _ => None,
                };
            }
            SizeInfo {
                min_bytes: min,
                max_bytes: max,
                fixed: max == Some(min),
            }
        }
        Type::UserDefined(name) => named(name),
    }
}

/// Computes and memoizes sizes for named types during validation.
pub(crate) struct SizeAnalyzer<'s> {
    types: &'s IndexMap<String, Type>,
    memo: HashMap<String, SizeInfo>,
    in_progress: HashSet<String>,
}

impl<'s> SizeAnalyzer<'s> {
    pub(crate) fn new(types: &'s IndexMap<String, Type>) -> Self {
        SizeAnalyzer {
            types,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub(crate) fn named(&mut self, name: &str) -> SizeInfo {
        if let Some(info) = self.memo.get(name) {
            return *info;
        }
        if !self.in_progress.insert(name.to_string()) {
            // Re-entrant reference inside a productive cycle. Its true size
            // is unbounded; the zero minimum is swallowed by the enclosing
            // indirection.
            return SizeInfo::variable(0);
        }
        let types = self.types;
        let info = match types.get(name) {
            Some(ty) => structural_size(ty, &mut |n| self.named(n)),
            // Unreachable for validated references; stay conservative.
            None => SizeInfo::variable(0),
        };
        self.in_progress.remove(name);
        self.memo.insert(name.to_string(), info);
        info
    }

    pub(crate) fn into_memo(self) -> HashMap<String, SizeInfo> {
        self.memo
    }
}

impl Schema<Validated> {
    /// Size bounds for any type expressed against this schema.
    pub fn size_of(&self, ty: &Type) -> SizeInfo {
        structural_size(ty, &mut |name| {
            self.sizes
                .get(name)
                .copied()
                .unwrap_or_else(|| SizeInfo::variable(0))
        })
    }
}
