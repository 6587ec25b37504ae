//! Data-table emitter.
//!
//! One Lua source file per sheet: a block-comment header describing every
//! column (recursing into struct references), then one nested table literal
//! per data row, keyed by the row's primary key. Layout follows the legacy
//! emitter: the primary-key field of a record sits one level shallower than
//! its sibling fields (`ColumnSchema::indent`), and every nesting step is one
//! more indentation unit.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::config::SeparatorConfig;
use crate::errors::{CompileError, Loc, Result};
use crate::grammar::{self, TypeExpr};
use crate::parse::CellParser;
use crate::provider::{MAIN_KEY_COL, SheetGrid, SheetSource};
use crate::schema::{ColumnSchema, SheetSchema};
use crate::value::{ParsedValue, ScalarValue};

use super::GENERATED_BANNER;

pub struct TableEmitter<'a> {
    cfg: &'a SeparatorConfig,
    parser: &'a CellParser<'a>,
}

impl<'a> TableEmitter<'a> {
    pub fn new(parser: &'a CellParser<'a>, cfg: &'a SeparatorConfig) -> Self {
        Self { cfg, parser }
    }

    /// Emit the whole data table for one sheet.
    pub fn emit(&self, source: &dyn SheetSource, schema: &SheetSchema) -> Result<String> {
        let grid = source.sheet(&schema.name)?;

        let mut out = String::new();
        out.push_str("--[[\n");
        out.push_str(GENERATED_BANNER);
        out.push_str("\n=====attr desc========");
        self.desc_tree(schema, 1, &mut out);
        out.push_str("\n]]\n");

        write!(out, "\nS_{}={{", schema.name).unwrap();
        self.emit_rows(schema, grid, &mut out)?;
        out.push_str("\n}\n");
        Ok(out)
    }

    /// Per-column description lines, recursing into child sheets one level
    /// deeper each time.
    fn desc_tree(&self, schema: &SheetSchema, depth: usize, out: &mut String) {
        for col in &schema.columns {
            write!(out, "\n{}P_{}:{}", self.cfg.indent_for(depth), col.name, col.desc).unwrap();
            if let Some(child) = &col.child {
                self.desc_tree(child, depth + 1, out);
            }
        }
    }

    fn emit_rows(&self, schema: &SheetSchema, grid: &SheetGrid, out: &mut String) -> Result<()> {
        let pk_column = &schema.primary().name;
        let mut seen = HashSet::new();
        for row in grid.data_rows() {
            let key = grid.cell(row, MAIN_KEY_COL).trim();
            if !seen.insert(key.to_string()) {
                return Err(CompileError::DuplicateKey {
                    key: key.to_string(),
                    loc: Loc::cell(&schema.name, pk_column, row),
                });
            }
            let ParsedValue::Struct(fields) = self.parser.parse_row(schema, row)? else {
                unreachable!("parse_row always yields a struct value");
            };
            write!(out, "\n{}{}={{", self.cfg.indent_for(1), table_key(key)).unwrap();
            self.render_struct(schema, &fields, 1, out);
            write!(out, "\n{}}},", self.cfg.indent_for(1)).unwrap();
        }
        Ok(())
    }

    /// Fields of one record, each at `base + column indent`.
    fn render_struct(
        &self,
        schema: &SheetSchema,
        fields: &indexmap::IndexMap<String, ParsedValue>,
        base: usize,
        out: &mut String,
    ) {
        for col in &schema.columns {
            let value = &fields[&col.name];
            self.render_field(col, value, base + col.indent, out);
        }
    }

    fn render_field(&self, col: &ColumnSchema, value: &ParsedValue, depth: usize, out: &mut String) {
        let ind = self.cfg.indent_for(depth);
        match value {
            ParsedValue::Scalar(s) => {
                write!(out, "\n{ind}P_{}={},", col.name, lua_scalar(s)).unwrap();
            }

            ParsedValue::Array(items) if is_struct_column(col) => {
                write!(out, "\n{ind}P_{}={{", col.name).unwrap();
                self.render_row_list(col, items, depth, out);
                write!(out, "\n{ind}}},").unwrap();
            }
            ParsedValue::Array(items) => {
                write!(out, "\n{ind}P_{}={{{}}},", col.name, inline_list(items)).unwrap();
            }

            ParsedValue::Array2D(groups) if is_struct_column(col) => {
                write!(out, "\n{ind}P_{}={{", col.name).unwrap();
                for group in groups {
                    write!(out, "\n{}{{", self.cfg.indent_for(depth + 1)).unwrap();
                    self.render_row_list(col, group, depth + 1, out);
                    write!(out, "\n{}}},", self.cfg.indent_for(depth + 1)).unwrap();
                }
                write!(out, "\n{ind}}},").unwrap();
            }
            ParsedValue::Array2D(groups) => {
                write!(out, "\n{ind}P_{}={{{}}},", col.name, inline_groups(groups)).unwrap();
            }

            ParsedValue::Map(pairs) => {
                write!(out, "\n{ind}P_{}={{", col.name).unwrap();
                for (key, value) in pairs {
                    self.render_map_pair(col, key, value, depth + 1, out);
                }
                write!(out, "\n{ind}}},").unwrap();
            }

            ParsedValue::Struct(fields) => {
                write!(out, "\n{ind}P_{}={{", col.name).unwrap();
                self.render_struct(child_of(col), fields, depth, out);
                write!(out, "\n{ind}}},").unwrap();
            }
        }
    }

    fn render_map_pair(
        &self,
        col: &ColumnSchema,
        key: &ScalarValue,
        value: &ParsedValue,
        depth: usize,
        out: &mut String,
    ) {
        let ind = self.cfg.indent_for(depth);
        let key = key.raw_text();
        match value {
            ParsedValue::Scalar(s) => {
                write!(out, "\n{ind}[\"{key}\"]={},", lua_scalar(s)).unwrap();
            }
            ParsedValue::Array(items) if is_struct_column(col) => {
                write!(out, "\n{ind}[\"{key}\"]={{").unwrap();
                self.render_row_list(col, items, depth, out);
                write!(out, "\n{ind}}},").unwrap();
            }
            ParsedValue::Array(items) => {
                write!(out, "\n{ind}[\"{key}\"]={{{}}},", inline_list(items)).unwrap();
            }
            ParsedValue::Array2D(groups) if is_struct_column(col) => {
                write!(out, "\n{ind}[\"{key}\"]={{").unwrap();
                for group in groups {
                    write!(out, "\n{}{{", self.cfg.indent_for(depth + 1)).unwrap();
                    self.render_row_list(col, group, depth + 1, out);
                    write!(out, "\n{}}},", self.cfg.indent_for(depth + 1)).unwrap();
                }
                write!(out, "\n{ind}}},").unwrap();
            }
            ParsedValue::Array2D(groups) => {
                write!(out, "\n{ind}[\"{key}\"]={{").unwrap();
                for group in groups {
                    write!(out, "\n{}{{{}}},", self.cfg.indent_for(depth + 1), inline_list(group))
                        .unwrap();
                }
                write!(out, "\n{ind}}},").unwrap();
            }
            ParsedValue::Struct(fields) => {
                write!(out, "\n{ind}[\"{key}\"]={{").unwrap();
                self.render_struct(child_of(col), fields, depth, out);
                write!(out, "\n{ind}}},").unwrap();
            }
            ParsedValue::Map(_) => {
                unreachable!("map-of-map is rejected by the grammar");
            }
        }
    }

    /// Resolved rows of an array-of-struct value, one block per row.
    fn render_row_list(
        &self,
        col: &ColumnSchema,
        rows: &[ParsedValue],
        depth: usize,
        out: &mut String,
    ) {
        let ind = self.cfg.indent_for(depth + 1);
        for row in rows {
            let ParsedValue::Struct(fields) = row else {
                unreachable!("struct columns resolve to struct values");
            };
            write!(out, "\n{ind}{{").unwrap();
            self.render_struct(child_of(col), fields, depth + 1, out);
            write!(out, "\n{ind}}},").unwrap();
        }
    }
}

fn is_struct_column(col: &ColumnSchema) -> bool {
    matches!(col.ty, TypeExpr::StructRef { .. } | TypeExpr::MapToStruct { .. })
}

fn child_of(col: &ColumnSchema) -> &SheetSchema {
    col.child.as_deref().expect("struct-typed column without a resolved child schema")
}

/// The outer table key: bare if it is a valid identifier, quoted otherwise.
fn table_key(key: &str) -> String {
    if grammar::is_bare_identifier(key) {
        key.to_string()
    } else {
        format!("[\"{key}\"]")
    }
}

fn lua_scalar(s: &ScalarValue) -> String {
    match s {
        ScalarValue::Int(v) => v.to_string(),
        ScalarValue::Float(v) => v.0.to_string(),
        ScalarValue::Str(v) => format!("[[{v}]]"),
        ScalarValue::Bool(v) => v.to_string(),
    }
}

fn inline_list(items: &[ParsedValue]) -> String {
    items
        .iter()
        .map(|v| match v {
            ParsedValue::Scalar(s) => lua_scalar(s),
            other => unreachable!("scalar array with nested element {other:?}"),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn inline_groups(groups: &[Vec<ParsedValue>]) -> String {
    groups
        .iter()
        .map(|g| format!("{{{}}}", inline_list(g)))
        .collect::<Vec<_>>()
        .join(",")
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::classify;
    use crate::provider::MemoryWorkbook;
    use crate::schema::SchemaResolver;

    fn emit_for(wb: &MemoryWorkbook, sheet: &str) -> Result<String> {
        let cfg = SeparatorConfig::default();
        let resolver = SchemaResolver::new(wb);
        let schema = resolver.resolve(sheet)?;
        let parser = CellParser::new(wb, &cfg);
        TableEmitter::new(&parser, &cfg).emit(wb, &schema)
    }

    #[test]
    fn flat_sheet_layout_is_exact() {
        let wb = MemoryWorkbook::new().with_sheet(
            "Cfg",
            &[
                &["key", "numbers", "pretty name"],
                &["string", "[]int", "string"],
                &["id", "nums", "label"],
                &["alpha", "1,2", "Alpha"],
                &["2b", "3", "Two"],
            ],
        );
        let src = emit_for(&wb, "Cfg").unwrap();
        let expected = "--[[\n\
            Code generated by xlsx-tablegen.\n\
            DO NOT EDIT!\n\
            =====attr desc========\n\
            \tP_id:key\n\
            \tP_nums:numbers\n\
            \tP_label:pretty name\n\
            ]]\n\
            \n\
            S_Cfg={\n\
            \talpha={\n\
            \tP_id=[[alpha]],\n\
            \t\tP_nums={1,2},\n\
            \t\tP_label=[[Alpha]],\n\
            \t},\n\
            \t[\"2b\"]={\n\
            \tP_id=[[2b]],\n\
            \t\tP_nums={3},\n\
            \t\tP_label=[[Two]],\n\
            \t},\n\
            }\n";
        assert_eq!(src, expected);
    }

    #[test]
    fn struct_columns_nest_one_level_deeper() {
        let wb = MemoryWorkbook::new()
            .with_sheet(
                "Hero",
                &[
                    &["hero id", "carried weapon"],
                    &["int", "Item"],
                    &["id", "weapon"],
                    &["1", "sword_01"],
                ],
            )
            .with_sheet(
                "Item",
                &[
                    &["item id", "attack power"],
                    &["string", "int"],
                    &["id", "power"],
                    &["sword_01", "10"],
                ],
            );
        let src = emit_for(&wb, "Hero").unwrap();
        // recursive description header
        assert!(src.contains("\tP_weapon:carried weapon\n\t\tP_id:item id\n\t\tP_power:attack power"));
        // the weapon field is a nested table holding the resolved Item row
        assert!(src.contains("\t\tP_weapon={\n\t\tP_id=[[sword_01]],\n\t\t\tP_power=10,\n\t\t},"));
    }

    #[test]
    fn maps_and_2d_arrays_render_as_sub_tables() {
        let wb = MemoryWorkbook::new().with_sheet(
            "Drops",
            &[
                &["key", "per-level drops", "grid"],
                &["string", "map[int][]string", "[][]int"],
                &["id", "drops", "grid"],
                &["boss", "1=[gold,gem],2=[gold]", "[1,2],[3,4]"],
            ],
        );
        let src = emit_for(&wb, "Drops").unwrap();
        assert!(src.contains("\t\tP_drops={\n\t\t\t[\"1\"]={[[gold]],[[gem]]},\n\t\t\t[\"2\"]={[[gold]]},\n\t\t},"));
        assert!(src.contains("\t\tP_grid={{1,2},{3,4}},"));
    }

    #[test]
    fn duplicate_primary_keys_fail_regardless_of_order() {
        let wb = MemoryWorkbook::new().with_sheet(
            "Cfg",
            &[
                &["key"],
                &["string"],
                &["id"],
                &["a"],
                &["b"],
                &["a"],
            ],
        );
        assert!(matches!(emit_for(&wb, "Cfg"), Err(CompileError::DuplicateKey { .. })));
    }

    #[test]
    fn emitted_arrays_reparse_to_the_same_value() {
        // emit→parse round-trip: the table literal uses {…}, so re-parse with
        // the same grammar under brace tokens
        let cfg_in = SeparatorConfig::default();
        let cfg_out = SeparatorConfig {
            token_begin: "{".to_string(),
            token_end: "}".to_string(),
            ..SeparatorConfig::default()
        };
        let wb = MemoryWorkbook::new();
        let parser_in = CellParser::new(&wb, &cfg_in);
        let parser_out = CellParser::new(&wb, &cfg_out);

        let ty = classify("[]int").unwrap().unwrap();
        let v = parser_in.parse_value(&ty, None, "1,2,3", &Loc::default()).unwrap();
        let ParsedValue::Array(items) = &v else { panic!() };
        let emitted = inline_list(items);
        let reparsed = parser_out.parse_value(&ty, None, &emitted, &Loc::default()).unwrap();
        assert_eq!(v, reparsed);

        let ty = classify("[][]int").unwrap().unwrap();
        let v = parser_in.parse_value(&ty, None, "[1,2],[3,4]", &Loc::default()).unwrap();
        let ParsedValue::Array2D(groups) = &v else { panic!() };
        let emitted = inline_groups(groups);
        let reparsed = parser_out.parse_value(&ty, None, &emitted, &Loc::default()).unwrap();
        assert_eq!(v, reparsed);
    }
}
