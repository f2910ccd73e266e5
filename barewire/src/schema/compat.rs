//! Read-compatibility analysis between two validated schemas.
//!
//! Answers "can a reader holding this schema decode records produced by a
//! writer holding that schema?". The comparison is structural and
//! name-insensitive: renaming a type or a field does not move a single byte,
//! so it is reported but never breaking. A reader may declare enum values or
//! union variants the writer never produces; the reverse is breaking.

use std::collections::HashSet;

use crate::schema::model::{PrimitiveType, Schema, Type, Validated};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Byte-identical wire contracts with identical names.
    Identical,
    /// Reads succeed; differences are cosmetic or reader-side extensions.
    Compatible,
    /// At least one writer encoding exists that the reader rejects.
    Incompatible,
}

/// One observed difference between the schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatIssue {
    /// Dotted field path from the root, `[key]`/`[value]`/`[]` for map and
    /// list components, `|tag` for union variants.
    pub location: String,
    pub message: String,
    pub breaking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatReport {
    pub verdict: Compatibility,
    pub issues: Vec<CompatIssue>,
}

impl CompatReport {
    pub fn is_compatible(&self) -> bool {
        self.verdict != Compatibility::Incompatible
    }
}

/// Compare the root types of `reader` and `writer`.
pub fn check_read_compatibility(
    reader: &Schema<Validated>,
    writer: &Schema<Validated>,
) -> CompatReport {
    let mut cmp = Comparer {
        reader,
        writer,
        visited: HashSet::new(),
        issues: Vec::new(),
    };
    cmp.compare(reader.root_type(), writer.root_type(), "root");
    if reader.root() != writer.root() {
        cmp.note(
            "root",
            format!(
                "root type renamed from `{}` to `{}`",
                writer.root(),
                reader.root()
            ),
        );
    }

    let verdict = if cmp.issues.is_empty() {
        Compatibility::Identical
    } else if cmp.issues.iter().any(|i| i.breaking) {
        Compatibility::Incompatible
    } else {
        Compatibility::Compatible
    };
    CompatReport {
        verdict,
        issues: cmp.issues,
    }
}

struct Comparer<'s> {
    reader: &'s Schema<Validated>,
    writer: &'s Schema<Validated>,
    /// Pairs of named types already compared; recursion always passes
    /// through a named reference, so this terminates cyclic schemas.
    visited: HashSet<(String, String)>,
    issues: Vec<CompatIssue>,
}

impl<'s> Comparer<'s> {
    fn note(&mut self, location: &str, message: String) {
        self.issues.push(CompatIssue {
            location: location.to_string(),
            message,
            breaking: false,
        });
    }

    fn breaking(&mut self, location: &str, message: String) {
        self.issues.push(CompatIssue {
            location: location.to_string(),
            message,
            breaking: true,
        });
    }

    fn compare(&mut self, reader_ty: &Type, writer_ty: &Type, location: &str) {
        let (reader_ty, writer_ty) = match self.unwrap_references(reader_ty, writer_ty, location) {
            Some(pair) => pair,
            // Either an already-visited named pair or a dangling reference
            // (impossible on validated schemas).
            None => return,
        };

        match (reader_ty, writer_ty) {
            (Type::Primitive(r), Type::Primitive(w)) => self.compare_primitive(r, w, location),
            (Type::Optional(r), Type::Optional(w)) => self.compare(r, w, location),
            (Type::List(r), Type::List(w)) => {
                self.compare(r, w, &format!("{location}[]"));
            }
            (Type::FixedList(r, rn), Type::FixedList(w, wn)) => {
                if rn != wn {
                    self.breaking(
                        location,
                        format!("fixed list length changed from {wn} to {rn}"),
                    );
                }
                self.compare(r, w, &format!("{location}[]"));
            }
            (Type::Map(rk, rv), Type::Map(wk, wv)) => {
                self.compare(rk, wk, &format!("{location}[key]"));
                self.compare(rv, wv, &format!("{location}[value]"));
            }
            (Type::Union(r), Type::Union(w)) => self.compare_union(r, w, location),
            (Type::Struct(r), Type::Struct(w)) => self.compare_struct(r, w, location),
            (r, w) => {
                self.breaking(
                    location,
                    format!(
                        "type shape changed from {} to {}",
                        w.describe(),
                        r.describe()
                    ),
                );
            }
        }
    }

    /// Resolve `UserDefined` on both sides, reporting renames and cutting
    /// off already-visited named pairs. Returns `None` when descent should
    /// stop.
    fn unwrap_references<'t>(
        &mut self,
        reader_ty: &'t Type,
        writer_ty: &'t Type,
        location: &str,
    ) -> Option<(&'t Type, &'t Type)>
    where
        's: 't,
    {
        if let (Type::UserDefined(rn), Type::UserDefined(wn)) = (reader_ty, writer_ty) {
            if !self.visited.insert((rn.clone(), wn.clone())) {
                return None;
            }
            if rn != wn {
                self.note(location, format!("type renamed from `{wn}` to `{rn}`"));
            }
        }
        let reader_ty = self.reader.resolve(reader_ty)?;
        let writer_ty = self.writer.resolve(writer_ty)?;
        Some((reader_ty, writer_ty))
    }

    fn compare_primitive(&mut self, r: &PrimitiveType, w: &PrimitiveType, location: &str) {
        match (r, w) {
            (PrimitiveType::Enum(rv), PrimitiveType::Enum(wv)) => {
                for (wname, wvalue) in wv {
                    match rv.iter().find(|(_, v)| v == wvalue) {
                        None => self.breaking(
                            location,
                            format!("enum value {wvalue} (`{wname}`) is not accepted by the reader"),
                        ),
                        Some((rname, _)) if rname != wname => self.note(
                            location,
                            format!("enum value {wvalue} renamed from `{wname}` to `{rname}`"),
                        ),
                        Some(_) => {}
                    }
                }
                for (rname, rvalue) in rv {
                    if !wv.iter().any(|(_, v)| v == rvalue) {
                        self.note(
                            location,
                            format!("reader accepts additional enum value {rvalue} (`{rname}`)"),
                        );
                    }
                }
            }
            _ if r == w => {}
            _ => self.breaking(
                location,
                format!(
                    "primitive changed from {} to {}",
                    w.describe(),
                    r.describe()
                ),
            ),
        }
    }

    fn compare_union(&mut self, r: &[(u32, Type)], w: &[(u32, Type)], location: &str) {
        for (tag, wty) in w {
            match r.iter().find(|(t, _)| t == tag) {
                None => self.breaking(
                    location,
                    format!("union tag {tag} is not accepted by the reader"),
                ),
                Some((_, rty)) => {
                    let loc = format!("{location}|{tag}");
                    self.compare(rty, wty, &loc);
                }
            }
        }
        for (tag, _) in r {
            if !w.iter().any(|(t, _)| t == tag) {
                self.note(location, format!("reader accepts additional union tag {tag}"));
            }
        }
    }

    fn compare_struct(
        &mut self,
        r: &[crate::schema::model::StructField],
        w: &[crate::schema::model::StructField],
        location: &str,
    ) {
        if r.len() != w.len() {
            self.breaking(
                location,
                format!("field count changed from {} to {}", w.len(), r.len()),
            );
            return;
        }
        for (rf, wf) in r.iter().zip(w) {
            let loc = format!("{location}.{}", rf.name);
            if rf.name != wf.name {
                self.note(
                    &loc,
                    format!("field renamed from `{}` to `{}`", wf.name, rf.name),
                );
            }
            self.compare(&rf.ty, &wf.ty, &loc);
        }
    }
}
