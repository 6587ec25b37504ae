//! Type-annotation grammar.
//!
//! Row 1 of every sheet annotates each column with a type string. The legacy
//! tool classified these with ~80 overlapping regular expressions, one per
//! type combination; the whole set collapses into one precedence-ordered
//! recursive-descent classifier over a small AST:
//!
//! ```text
//! type    := scalar | array | map | struct
//! scalar  := int8|int16|int32|int64|int|float32|float64|string|bool
//! array   := "[]" scalar | "[][]" scalar
//! map     := "map[" scalar "]" (scalar | array | structv)
//! struct  := ("[]" | "[][]")? ident
//! structv := ("[]" | "[][]")? ident          -- map value position
//! ```
//!
//! A leading `!` marks the column as excluded from both schema and emission.
//! Classification is total: every annotation either matches exactly one
//! production or is rejected with `MalformedType`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{CompileError, Loc, Result};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int8,
    Int16,
    Int32,
    Int64,
    Int,
    Float32,
    Float64,
    Str,
    Bool,
}

impl ScalarKind {
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 | Self::Int)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Rust syntax for a plain value of this kind (`int` maps to `i64`, like
    /// Go's `int` on a 64-bit target).
    pub fn rust_syntax(self) -> &'static str {
        match self {
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::Int32 => "i32",
            Self::Int64 => "i64",
            Self::Int => "i64",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
            Self::Str => "String",
            Self::Bool => "bool",
        }
    }

    /// Rust syntax in map-key position. Floats need a total order and a hash,
    /// so they are wrapped.
    pub fn rust_key_syntax(self) -> &'static str {
        match self {
            Self::Float32 => "ordered_float::OrderedFloat<f32>",
            Self::Float64 => "ordered_float::OrderedFloat<f64>",
            other => other.rust_syntax(),
        }
    }
}

/// Depth of a struct-reference column: 0 = one nested record, 1 = array of
/// records, 2 = array of arrays of records.
pub type StructDepth = u8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Scalar(ScalarKind),
    /// depth-1 or depth-2 homogeneous array of a scalar element.
    Array { elem: ScalarKind, depth: u8 },
    /// scalar-keyed map of scalars or scalar arrays. Map-of-map is rejected
    /// by the grammar, so the value never nests another map.
    MapOf { key: ScalarKind, value: Box<TypeExpr> },
    StructRef { sheet: String, depth: StructDepth },
    MapToStruct { key: ScalarKind, sheet: String, depth: StructDepth },
}

impl TypeExpr {
    /// Sheet name referenced by this type, if it contains a struct reference.
    pub fn struct_sheet(&self) -> Option<&str> {
        match self {
            Self::StructRef { sheet, .. } | Self::MapToStruct { sheet, .. } => Some(sheet),
            _ => None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CLASSIFIER
// ————————————————————————————————————————————————————————————————————————————

/// Classify one type-annotation string.
///
/// `Ok(None)` means the column is excluded (`!` prefix); `Ok(Some(_))` is the
/// unique matching production; anything else is `MalformedType`.
pub fn classify(raw: &str) -> Result<Option<TypeExpr>> {
    let s = raw.trim();
    if s.starts_with('!') {
        return Ok(None);
    }
    parse_type(s).map(Some).ok_or_else(|| CompileError::MalformedType {
        annotation: raw.trim().to_string(),
        loc: Loc::default(),
    })
}

fn parse_type(s: &str) -> Option<TypeExpr> {
    // map[...]... first: an identifier can legally be called "map", but then
    // no bracketed key follows and we fall through to the struct production.
    if let Some((key_text, rest)) = split_map_prefix(s) {
        let key = scalar_kind(key_text.trim())?;
        let (depth, inner) = strip_array_prefix(rest);
        let inner = inner.trim();
        if let Some(kind) = scalar_kind(inner) {
            let value = match depth {
                0 => TypeExpr::Scalar(kind),
                d => TypeExpr::Array { elem: kind, depth: d },
            };
            return Some(TypeExpr::MapOf { key, value: Box::new(value) });
        }
        if is_sheet_name(inner) {
            return Some(TypeExpr::MapToStruct { key, sheet: inner.to_string(), depth });
        }
        return None;
    }

    let (depth, inner) = strip_array_prefix(s);
    let inner = inner.trim();
    if let Some(kind) = scalar_kind(inner) {
        return Some(match depth {
            0 => TypeExpr::Scalar(kind),
            d => TypeExpr::Array { elem: kind, depth: d },
        });
    }
    if is_sheet_name(inner) {
        return Some(TypeExpr::StructRef { sheet: inner.to_string(), depth });
    }
    None
}

/// `map [ key ] rest` → `(key, rest)`. The key is scalar, so the first `]`
/// closes it.
fn split_map_prefix(s: &str) -> Option<(&str, &str)> {
    let rest = s.trim_start().strip_prefix("map")?;
    let rest = rest.trim_start().strip_prefix('[')?;
    let close = rest.find(']')?;
    Some((&rest[..close], &rest[close + 1..]))
}

/// Strip up to two leading `[]` pairs (whitespace allowed inside and between).
fn strip_array_prefix(s: &str) -> (u8, &str) {
    let mut depth = 0u8;
    let mut rest = s.trim_start();
    while depth < 2 {
        let Some(r) = rest.strip_prefix('[') else { break };
        let Some(r) = r.trim_start().strip_prefix(']') else { break };
        rest = r.trim_start();
        depth += 1;
    }
    (depth, rest)
}

fn scalar_kind(s: &str) -> Option<ScalarKind> {
    match s {
        "int8" => Some(ScalarKind::Int8),
        "int16" => Some(ScalarKind::Int16),
        "int32" => Some(ScalarKind::Int32),
        "int64" => Some(ScalarKind::Int64),
        "int" => Some(ScalarKind::Int),
        "float32" => Some(ScalarKind::Float32),
        "float64" => Some(ScalarKind::Float64),
        "string" => Some(ScalarKind::Str),
        "bool" => Some(ScalarKind::Bool),
        _ => None,
    }
}

static SHEET_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());
static BARE_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

pub fn is_sheet_name(s: &str) -> bool {
    SHEET_NAME.is_match(s)
}

/// Whether a table key may be emitted without quoting in the data tables.
pub fn is_bare_identifier(s: &str) -> bool {
    BARE_IDENT.is_match(s)
}

// ————————————————————————————————————————————————————————————————————————————
// TARGET-TYPE SYNTAX
// ————————————————————————————————————————————————————————————————————————————

/// Rust type syntax for a record field of the given column type. Struct
/// references render as the generated record name `S_<Sheet>`.
pub fn rust_syntax(ty: &TypeExpr) -> String {
    fn wrap(depth: u8, inner: String) -> String {
        match depth {
            0 => inner,
            1 => format!("Vec<{inner}>"),
            _ => format!("Vec<Vec<{inner}>>"),
        }
    }
    match ty {
        TypeExpr::Scalar(kind) => kind.rust_syntax().to_string(),
        TypeExpr::Array { elem, depth } => wrap(*depth, elem.rust_syntax().to_string()),
        TypeExpr::MapOf { key, value } => {
            format!("HashMap<{}, {}>", key.rust_key_syntax(), rust_syntax(value))
        }
        TypeExpr::StructRef { sheet, depth } => wrap(*depth, format!("S_{sheet}")),
        TypeExpr::MapToStruct { key, sheet, depth } => format!(
            "HashMap<{}, {}>",
            key.rust_key_syntax(),
            wrap(*depth, format!("S_{sheet}"))
        ),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(s: &str) -> TypeExpr {
        classify(s).unwrap().unwrap()
    }

    #[test]
    fn scalars_and_arrays() {
        assert_eq!(ty("int"), TypeExpr::Scalar(ScalarKind::Int));
        assert_eq!(ty(" int32 "), TypeExpr::Scalar(ScalarKind::Int32));
        assert_eq!(ty("[]string"), TypeExpr::Array { elem: ScalarKind::Str, depth: 1 });
        assert_eq!(ty("[ ] [ ] float64"), TypeExpr::Array { elem: ScalarKind::Float64, depth: 2 });
    }

    #[test]
    fn scalar_maps() {
        assert_eq!(
            ty("map[int]string"),
            TypeExpr::MapOf {
                key: ScalarKind::Int,
                value: Box::new(TypeExpr::Scalar(ScalarKind::Str)),
            }
        );
        assert_eq!(
            ty("map [ string ] [][]int8"),
            TypeExpr::MapOf {
                key: ScalarKind::Str,
                value: Box::new(TypeExpr::Array { elem: ScalarKind::Int8, depth: 2 }),
            }
        );
    }

    #[test]
    fn struct_shapes() {
        assert_eq!(ty("Item"), TypeExpr::StructRef { sheet: "Item".into(), depth: 0 });
        assert_eq!(ty("[]Item"), TypeExpr::StructRef { sheet: "Item".into(), depth: 1 });
        assert_eq!(ty("[][]Item"), TypeExpr::StructRef { sheet: "Item".into(), depth: 2 });
        assert_eq!(
            ty("map[string][]Item"),
            TypeExpr::MapToStruct { key: ScalarKind::Str, sheet: "Item".into(), depth: 1 }
        );
        // "map" with no bracketed key is an ordinary sheet name
        assert_eq!(ty("map"), TypeExpr::StructRef { sheet: "map".into(), depth: 0 });
    }

    #[test]
    fn excluded_column_is_skip_not_error() {
        assert_eq!(classify("!int").unwrap(), None);
        assert_eq!(classify("  !whatever").unwrap(), None);
    }

    #[test]
    fn rejects_fall_through_the_whole_grammar() {
        for bad in [
            "",
            "map[Item]int",        // non-scalar map key
            "map[int]map[int]int", // map-of-map
            "[][][]int",           // depth 3
            "[]",
            "map[int]",
            "Item Item",           // whitespace inside a sheet name
            "int*",
        ] {
            assert!(
                matches!(classify(bad), Err(CompileError::MalformedType { .. })),
                "expected reject for {bad:?}"
            );
        }
    }

    #[test]
    fn rust_syntax_for_each_shape() {
        assert_eq!(rust_syntax(&ty("int")), "i64");
        assert_eq!(rust_syntax(&ty("[]int8")), "Vec<i8>");
        assert_eq!(rust_syntax(&ty("[][]string")), "Vec<Vec<String>>");
        assert_eq!(rust_syntax(&ty("map[int][]bool")), "HashMap<i64, Vec<bool>>");
        assert_eq!(
            rust_syntax(&ty("map[float32]Item")),
            "HashMap<ordered_float::OrderedFloat<f32>, S_Item>"
        );
        assert_eq!(rust_syntax(&ty("[]Item")), "Vec<S_Item>");
    }

    #[test]
    fn bare_identifier_rule() {
        assert!(is_bare_identifier("sword_01"));
        assert!(!is_bare_identifier("01_sword"));
        assert!(!is_bare_identifier("a-b"));
        // sheet names are laxer: the legacy tool accepted digit-leading names
        assert!(is_sheet_name("01_sword"));
    }
}
