//! Record-definition emitter.
//!
//! One Rust source file per workbook: a lookup-table type and key accessor
//! for each requested root sheet, then one record struct per distinct sheet
//! reachable from the roots through struct references.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::errors::{CompileError, Loc, Result};
use crate::grammar::{self, ScalarKind, TypeExpr};
use crate::schema::{SchemaResolver, SheetSchema};

use super::GENERATED_BANNER;

/// Emit the record-definition file for one workbook's root sheets.
pub fn emit_records(
    resolver: &SchemaResolver<'_>,
    roots: &[String],
    source_label: &str,
) -> Result<String> {
    let mut out = String::new();
    for line in GENERATED_BANNER.lines() {
        writeln!(out, "// {line}").unwrap();
    }
    writeln!(out, "// source: {source_label}").unwrap();
    out.push_str("#![allow(non_snake_case, non_camel_case_types)]\n\n");
    out.push_str("use std::collections::HashMap;\n\n");
    out.push_str("use super::global_map::{Sample, SampleFactory, SampleId};\n");

    // lookup tables + key accessors for the roots only, like the legacy
    // factory blocks
    for root in roots {
        let schema = resolver.resolve(root)?;
        emit_factory(&mut out, &schema)?;
    }

    // record structs for every sheet reachable from the roots, breadth-first,
    // each emitted once
    let mut queue: Vec<String> = roots.to_vec();
    let mut emitted: HashSet<String> = roots.iter().cloned().collect();
    while !queue.is_empty() {
        let name = queue.remove(0);
        let schema = resolver.resolve(&name)?;
        emit_struct(&mut out, &schema);
        for col in &schema.columns {
            if let Some(child) = col.ty.struct_sheet() {
                if emitted.insert(child.to_string()) {
                    queue.push(child.to_string());
                }
            }
        }
    }

    Ok(out)
}

/// `SF_<Sheet>` lookup table keyed by the primary column, plus the `Sample`
/// and `SampleFactory` wiring against the generated registry.
fn emit_factory(out: &mut String, schema: &SheetSchema) -> Result<()> {
    let pk = schema.primary();
    let TypeExpr::Scalar(kind) = pk.ty else {
        return Err(CompileError::MalformedValue {
            raw: String::new(),
            reason: "primary-key column must have a scalar type",
            loc: Loc::column(&schema.name, &pk.name),
        });
    };

    let name = &schema.name;
    let key_ty = kind.rust_key_syntax();
    let (sid_expr, get_arm) = sample_id_bridge(kind, &pk.name);

    writeln!(out, "\npub type SF_{name} = HashMap<{key_ty}, S_{name}>;").unwrap();
    writeln!(
        out,
        "\nimpl Sample for S_{name} {{\n    fn sid(&self) -> SampleId {{\n        {sid_expr}\n    }}\n}}"
    )
    .unwrap();
    writeln!(
        out,
        "\nimpl SampleFactory for SF_{name} {{\n    fn get(&self, sid: &SampleId) -> Option<&dyn Sample> {{\n        match sid {{\n            {get_arm},\n            _ => None,\n        }}\n    }}\n}}"
    )
    .unwrap();
    Ok(())
}

/// How a record's primary key converts to/from the type-erased `SampleId`.
fn sample_id_bridge(kind: ScalarKind, pk_field: &str) -> (String, String) {
    let field = format!("self.p_{pk_field}");
    if kind.is_integer() {
        let sid = format!("SampleId::Int({field} as i64)");
        let arm = format!(
            "SampleId::Int(k) => self.get(&(*k as {})).map(|s| s as &dyn Sample)",
            kind.rust_syntax()
        );
        (sid, arm)
    } else if kind.is_float() {
        let sid = format!("SampleId::Float({field} as f64)");
        let arm = format!(
            "SampleId::Float(k) => self.get(&ordered_float::OrderedFloat(*k as {})).map(|s| s as &dyn Sample)",
            kind.rust_syntax()
        );
        (sid, arm)
    } else if kind == ScalarKind::Bool {
        (
            format!("SampleId::Bool({field})"),
            "SampleId::Bool(k) => self.get(k).map(|s| s as &dyn Sample)".to_string(),
        )
    } else {
        (
            format!("SampleId::Str({field}.clone())"),
            "SampleId::Str(k) => self.get(k).map(|s| s as &dyn Sample)".to_string(),
        )
    }
}

fn emit_struct(out: &mut String, schema: &SheetSchema) {
    writeln!(out, "\n#[derive(Debug, Clone, Default)]").unwrap();
    writeln!(out, "pub struct S_{} {{", schema.name).unwrap();
    for col in &schema.columns {
        if !col.desc.is_empty() {
            writeln!(out, "    /// {}", col.desc).unwrap();
        }
        writeln!(out, "    pub p_{}: {},", col.name, grammar::rust_syntax(&col.ty)).unwrap();
    }
    out.push_str("}\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryWorkbook;

    fn hero_item() -> MemoryWorkbook {
        MemoryWorkbook::new()
            .with_sheet(
                "Hero",
                &[
                    &["hero id", "carried weapon", "tag list"],
                    &["int", "Item", "[]string"],
                    &["id", "weapon", "tags"],
                ],
            )
            .with_sheet(
                "Item",
                &[
                    &["item id", "attack power"],
                    &["string", "int"],
                    &["id", "power"],
                ],
            )
    }

    #[test]
    fn roots_get_factories_and_reachable_sheets_get_structs() {
        let wb = hero_item();
        let resolver = SchemaResolver::new(&wb);
        let src = emit_records(&resolver, &["Hero".to_string()], "demo.xlsx").unwrap();

        assert!(src.contains("pub type SF_Hero = HashMap<i64, S_Hero>;"));
        assert!(src.contains("impl Sample for S_Hero"));
        assert!(src.contains("SampleId::Int(self.p_id as i64)"));
        // Item is reachable, so its struct is emitted, but it gets no factory
        assert!(src.contains("pub struct S_Item {"));
        assert!(!src.contains("SF_Item"));
        // the Hero record embeds the Item record
        assert!(src.contains("pub p_weapon: S_Item,"));
        assert!(src.contains("pub p_tags: Vec<String>,"));
        // field docs come from the description row
        assert!(src.contains("    /// carried weapon\n    pub p_weapon"));
    }

    #[test]
    fn each_reachable_sheet_is_emitted_once() {
        let wb = MemoryWorkbook::new()
            .with_sheet(
                "Root",
                &[
                    &["", "", ""],
                    &["int", "Leaf", "[]Leaf"],
                    &["id", "one", "many"],
                ],
            )
            .with_sheet("Leaf", &[&[""], &["int"], &["id"]]);
        let resolver = SchemaResolver::new(&wb);
        let src = emit_records(&resolver, &["Root".to_string()], "x").unwrap();
        assert_eq!(src.matches("pub struct S_Leaf {").count(), 1);
    }

    #[test]
    fn string_keyed_factory_uses_clone_and_str_arm() {
        let wb = MemoryWorkbook::new()
            .with_sheet("Item", &[&[""], &["string"], &["id"]]);
        let resolver = SchemaResolver::new(&wb);
        let src = emit_records(&resolver, &["Item".to_string()], "x").unwrap();
        assert!(src.contains("pub type SF_Item = HashMap<String, S_Item>;"));
        assert!(src.contains("SampleId::Str(self.p_id.clone())"));
        assert!(src.contains("SampleId::Str(k) => self.get(k)"));
    }

    #[test]
    fn non_scalar_primary_key_is_rejected() {
        let wb = MemoryWorkbook::new()
            .with_sheet("Bad", &[&["", ""], &["[]int", "int"], &["ids", "x"]]);
        let resolver = SchemaResolver::new(&wb);
        assert!(matches!(
            emit_records(&resolver, &["Bad".to_string()], "x"),
            Err(CompileError::MalformedValue { reason: "primary-key column must have a scalar type", .. })
        ));
    }
}
