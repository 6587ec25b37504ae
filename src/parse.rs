//! Cell parsing and foreign-key resolution.
//!
//! `CellParser` turns raw cell text into a `ParsedValue` according to the
//! column's classified type. Struct-typed cells hold primary-key strings;
//! those are resolved against the referenced sheet through a per-sheet key
//! index built once per run (the legacy tool re-scanned the sheet linearly
//! for every reference).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::config::SeparatorConfig;
use crate::errors::{CompileError, Loc, Result};
use crate::grammar::{ScalarKind, TypeExpr};
use crate::provider::{MAIN_KEY_COL, SheetSource};
use crate::schema::{ColumnSchema, SheetSchema};
use crate::value::{ParsedValue, ScalarValue};

/// Primary-key string → data-row index, for one sheet.
#[derive(Debug, Default)]
pub struct RowIndex {
    by_key: HashMap<String, usize>,
}

pub struct CellParser<'a> {
    cfg: &'a SeparatorConfig,
    source: &'a dyn SheetSource,
    indexes: RwLock<HashMap<String, Arc<RowIndex>>>,
}

impl<'a> CellParser<'a> {
    pub fn new(source: &'a dyn SheetSource, cfg: &'a SeparatorConfig) -> Self {
        Self { cfg, source, indexes: RwLock::new(HashMap::new()) }
    }

    /// Parse one cell of a schema column.
    pub fn parse_cell(&self, col: &ColumnSchema, raw: &str, loc: &Loc) -> Result<ParsedValue> {
        self.parse_value(&col.ty, col.child.as_deref(), raw, loc)
    }

    /// Parse raw text according to a resolved type. `child` must be present
    /// for struct-reference types; the schema resolver guarantees it.
    pub fn parse_value(
        &self,
        ty: &TypeExpr,
        child: Option<&SheetSchema>,
        raw: &str,
        loc: &Loc,
    ) -> Result<ParsedValue> {
        match ty {
            TypeExpr::Scalar(kind) => Ok(ParsedValue::Scalar(ScalarValue::parse(*kind, raw))),

            TypeExpr::Array { elem, depth: 1 } => Ok(ParsedValue::Array(
                // bare arrays keep empty segments; only map contexts skip them
                raw.split(self.cfg.array_sep.as_str())
                    .map(|seg| ParsedValue::Scalar(ScalarValue::parse(*elem, seg)))
                    .collect(),
            )),

            TypeExpr::Array { elem, depth: _ } => {
                let groups = self.split_groups(raw, loc)?;
                Ok(ParsedValue::Array2D(
                    groups.iter().map(|g| self.scalar_list(*elem, g)).collect(),
                ))
            }

            TypeExpr::MapOf { key, value } => self.parse_map(*key, raw, loc, |v, loc| {
                match value.as_ref() {
                    TypeExpr::Scalar(kind) => {
                        Ok(ParsedValue::Scalar(ScalarValue::parse(*kind, v)))
                    }
                    TypeExpr::Array { elem, depth: 1 } => {
                        let interior = self.unwrap_group(v, loc)?;
                        Ok(ParsedValue::Array(self.scalar_list(*elem, interior)))
                    }
                    TypeExpr::Array { elem, depth: _ } => {
                        let interior = self.unwrap_group(v, loc)?;
                        let groups = self.split_groups(interior, loc)?;
                        Ok(ParsedValue::Array2D(
                            groups.iter().map(|g| self.scalar_list(*elem, g)).collect(),
                        ))
                    }
                    // the grammar only admits scalar or array map values here
                    nested => unreachable!("map value cannot be {nested:?}"),
                }
            }),

            TypeExpr::StructRef { depth: 0, .. } => {
                self.resolve_struct(expect_child(child), raw, loc)
            }

            TypeExpr::StructRef { depth: 1, .. } => {
                let child = expect_child(child);
                let mut rows = Vec::new();
                for seg in raw.split(self.cfg.array_sep.as_str()) {
                    if seg.trim().is_empty() {
                        continue;
                    }
                    rows.push(self.resolve_struct(child, seg, loc)?);
                }
                Ok(ParsedValue::Array(rows))
            }

            TypeExpr::StructRef { depth: _, .. } => {
                let child = expect_child(child);
                let groups = self.split_groups(raw, loc)?;
                let mut out = Vec::with_capacity(groups.len());
                for g in groups {
                    out.push(self.struct_list(child, g, loc)?);
                }
                Ok(ParsedValue::Array2D(out))
            }

            TypeExpr::MapToStruct { key, depth, .. } => {
                let child = expect_child(child);
                self.parse_map(*key, raw, loc, |v, loc| match depth {
                    0 => self.resolve_struct(child, v, loc),
                    1 => {
                        let interior = self.unwrap_group(v, loc)?;
                        Ok(ParsedValue::Array(self.struct_list(child, interior, loc)?))
                    }
                    _ => {
                        let interior = self.unwrap_group(v, loc)?;
                        let groups = self.split_groups(interior, loc)?;
                        let mut out = Vec::with_capacity(groups.len());
                        for g in groups {
                            out.push(self.struct_list(child, g, loc)?);
                        }
                        Ok(ParsedValue::Array2D(out))
                    }
                })
            }
        }
    }

    /// Parse a whole data row of `schema` into a struct value, field by field
    /// in column order.
    pub fn parse_row(&self, schema: &SheetSchema, row: usize) -> Result<ParsedValue> {
        let grid = self.source.sheet(&schema.name)?;
        let mut fields = IndexMap::with_capacity(schema.columns.len());
        for col in &schema.columns {
            let raw = grid.cell(row, col.index);
            let loc = Loc::cell(&schema.name, &col.name, row);
            fields.insert(col.name.clone(), self.parse_cell(col, raw, &loc)?);
        }
        Ok(ParsedValue::Struct(fields))
    }

    /// Foreign-key join: resolve a primary-key string against the referenced
    /// sheet and parse the matching row with the child schema.
    pub fn resolve_struct(
        &self,
        child: &SheetSchema,
        key: &str,
        loc: &Loc,
    ) -> Result<ParsedValue> {
        let key = key.trim();
        let index = self.row_index(&child.name)?;
        let Some(&row) = index.by_key.get(key) else {
            return Err(CompileError::MissingRow {
                sheet: child.name.clone(),
                key: key.to_string(),
                loc: loc.clone(),
            });
        };
        self.parse_row(child, row)
    }

    /// Primary-key index for one sheet, built on first use. Duplicate primary
    /// keys fail here, so every task touching the sheet sees the error.
    pub fn row_index(&self, sheet: &str) -> Result<Arc<RowIndex>> {
        if let Some(index) = self.indexes.read().expect("row index cache poisoned").get(sheet) {
            return Ok(Arc::clone(index));
        }
        let grid = self.source.sheet(sheet)?;
        let pk_column = grid.cell(2, MAIN_KEY_COL).trim().to_string();
        let mut by_key = HashMap::new();
        for row in grid.data_rows() {
            let key = grid.cell(row, MAIN_KEY_COL).trim().to_string();
            if by_key.insert(key.clone(), row).is_some() {
                return Err(CompileError::DuplicateKey {
                    key,
                    loc: Loc::cell(sheet, &pk_column, row),
                });
            }
        }
        let mut cache = self.indexes.write().expect("row index cache poisoned");
        let entry = cache
            .entry(sheet.to_string())
            .or_insert_with(|| Arc::new(RowIndex { by_key }));
        Ok(Arc::clone(entry))
    }

    // ————————————————————————————————————————————————————————————————————
    // splitting helpers
    // ————————————————————————————————————————————————————————————————————

    /// Parse `key<map_sep>value` pairs separated by `array_sep` at bracket
    /// depth 0. Empty segments are skipped (map context); duplicate parsed
    /// keys are fatal.
    fn parse_map(
        &self,
        key_kind: ScalarKind,
        raw: &str,
        loc: &Loc,
        mut parse_val: impl FnMut(&str, &Loc) -> Result<ParsedValue>,
    ) -> Result<ParsedValue> {
        let mut pairs = Vec::new();
        let mut seen = HashSet::new();
        for seg in self.split_top_level(raw) {
            if seg.trim().is_empty() {
                continue;
            }
            let Some((k, v)) = seg.split_once(self.cfg.map_sep.as_str()) else {
                return Err(CompileError::MalformedValue {
                    raw: raw.to_string(),
                    reason: "map pair is missing its key separator",
                    loc: loc.clone(),
                });
            };
            let key = ScalarValue::parse(key_kind, k);
            if !seen.insert(key.clone()) {
                return Err(CompileError::DuplicateKey { key: key.raw_text(), loc: loc.clone() });
            }
            let value = parse_val(v, loc)?;
            pairs.push((key, value));
        }
        Ok(ParsedValue::Map(pairs))
    }

    /// Split on `array_sep`, ignoring separators inside begin/end groups.
    fn split_top_level<'s>(&self, raw: &'s str) -> Vec<&'s str> {
        let begin = self.cfg.token_begin.as_str();
        let end = self.cfg.token_end.as_str();
        let sep = self.cfg.array_sep.as_str();

        let mut out = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        let mut i = 0usize;
        while i < raw.len() {
            let rest = &raw[i..];
            if rest.starts_with(begin) {
                depth += 1;
                i += begin.len();
            } else if rest.starts_with(end) {
                depth = depth.saturating_sub(1);
                i += end.len();
            } else if depth == 0 && rest.starts_with(sep) {
                out.push(&raw[start..i]);
                i += sep.len();
                start = i;
            } else {
                i += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
        out.push(&raw[start..]);
        out
    }

    /// Split a sequence of `BEGIN…END` groups separated by `array_sep`.
    /// Unbalanced tokens or a missing separator between groups are malformed;
    /// so is an input with no group at all.
    fn split_groups<'s>(&self, raw: &'s str, loc: &Loc) -> Result<Vec<&'s str>> {
        let begin = self.cfg.token_begin.as_str();
        let end = self.cfg.token_end.as_str();
        let sep = self.cfg.array_sep.as_str();

        let malformed = |reason| CompileError::MalformedValue {
            raw: raw.to_string(),
            reason,
            loc: loc.clone(),
        };

        let mut groups = Vec::new();
        let mut rest = raw;
        loop {
            let Some(b) = rest.find(begin) else {
                if rest.contains(end) {
                    return Err(malformed("unbalanced group tokens"));
                }
                break;
            };
            let gap = &rest[..b];
            if gap.contains(end) {
                return Err(malformed("unbalanced group tokens"));
            }
            if !groups.is_empty() && !gap.contains(sep) {
                return Err(malformed("missing separator between groups"));
            }
            let after = &rest[b + begin.len()..];
            let Some(e) = after.find(end) else {
                return Err(malformed("unbalanced group tokens"));
            };
            let interior = &after[..e];
            if interior.contains(begin) {
                return Err(malformed("unbalanced group tokens"));
            }
            groups.push(interior);
            rest = &after[e + end.len()..];
        }
        if groups.is_empty() {
            return Err(malformed("expected at least one bracketed group"));
        }
        Ok(groups)
    }

    /// Strip one `BEGIN…END` wrapper off a (trimmed) map value.
    fn unwrap_group<'s>(&self, raw: &'s str, loc: &Loc) -> Result<&'s str> {
        raw.trim()
            .strip_prefix(self.cfg.token_begin.as_str())
            .and_then(|s| s.strip_suffix(self.cfg.token_end.as_str()))
            .ok_or_else(|| CompileError::MalformedValue {
                raw: raw.to_string(),
                reason: "expected a bracketed value",
                loc: loc.clone(),
            })
    }

    /// Scalar elements of one group interior. An all-whitespace interior is
    /// an empty list; otherwise every segment parses (lenient scalars).
    fn scalar_list(&self, kind: ScalarKind, interior: &str) -> Vec<ParsedValue> {
        if interior.trim().is_empty() {
            return Vec::new();
        }
        interior
            .split(self.cfg.array_sep.as_str())
            .map(|seg| ParsedValue::Scalar(ScalarValue::parse(kind, seg)))
            .collect()
    }

    /// Struct keys of one group interior, resolved row by row.
    fn struct_list(
        &self,
        child: &SheetSchema,
        interior: &str,
        loc: &Loc,
    ) -> Result<Vec<ParsedValue>> {
        let mut rows = Vec::new();
        for seg in interior.split(self.cfg.array_sep.as_str()) {
            if seg.trim().is_empty() {
                continue;
            }
            rows.push(self.resolve_struct(child, seg, loc)?);
        }
        Ok(rows)
    }
}

fn expect_child<'s>(child: Option<&'s SheetSchema>) -> &'s SheetSchema {
    child.expect("struct-typed column without a resolved child schema")
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
