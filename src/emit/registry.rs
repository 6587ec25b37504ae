//! Global lookup-table emitter.
//!
//! The legacy tool instantiated lookup tables by name through runtime
//! reflection; here the registry is an explicit, generated match table from
//! `SampleKey` to a constructor, plus the `Sample`/`SampleFactory` traits the
//! per-workbook files implement.

use std::fmt::Write as _;

use super::GENERATED_BANNER;

/// One registry entry: a root sheet and the generated module holding its
/// record and lookup-table types.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub sheet: String,
    pub module: String,
}

/// Emit `global_map.rs` covering every root sheet of the run.
pub fn emit_registry(entries: &[RegistryEntry]) -> String {
    let mut out = String::new();
    for line in GENERATED_BANNER.lines() {
        writeln!(out, "// {line}").unwrap();
    }
    out.push_str("#![allow(non_camel_case_types)]\n\n");

    out.push_str(
        "/// A primary-key value as carried by the generated lookup tables.\n\
         #[derive(Debug, Clone, PartialEq)]\n\
         pub enum SampleId {\n    Int(i64),\n    Float(f64),\n    Str(String),\n    Bool(bool),\n}\n\n",
    );
    out.push_str(
        "pub trait Sample {\n    /// the row's primary key.\n    fn sid(&self) -> SampleId;\n}\n\n",
    );
    out.push_str(
        "pub trait SampleFactory {\n    fn get(&self, sid: &SampleId) -> Option<&dyn Sample>;\n}\n\n",
    );

    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]\npub enum SampleKey {\n");
    for e in entries {
        writeln!(out, "    SF_{},", e.sheet).unwrap();
    }
    out.push_str("}\n\n");

    out.push_str("impl SampleKey {\n    pub fn from_name(name: &str) -> Option<Self> {\n        match name {\n");
    for e in entries {
        writeln!(out, "            \"SF_{0}\" => Some(Self::SF_{0}),", e.sheet).unwrap();
    }
    out.push_str("            _ => None,\n        }\n    }\n}\n\n");

    out.push_str(
        "/// Explicit registration table: one empty lookup table per root sheet.\n\
         pub fn new_sample_factory(key: SampleKey) -> Box<dyn SampleFactory> {\n    match key {\n",
    );
    for e in entries {
        writeln!(
            out,
            "        SampleKey::SF_{} => Box::new(super::{}::SF_{}::default()),",
            e.sheet, e.module, e.sheet
        )
        .unwrap();
    }
    out.push_str("    }\n}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sheet: &str, module: &str) -> RegistryEntry {
        RegistryEntry { sheet: sheet.to_string(), module: module.to_string() }
    }

    #[test]
    fn registry_lists_every_root_sheet() {
        let src = emit_registry(&[entry("Hero", "file_units"), entry("Item", "file_items")]);
        assert!(src.contains("    SF_Hero,\n    SF_Item,\n"));
        assert!(src.contains("\"SF_Hero\" => Some(Self::SF_Hero),"));
        assert!(src.contains(
            "SampleKey::SF_Item => Box::new(super::file_items::SF_Item::default()),"
        ));
    }

    #[test]
    fn registry_is_valid_with_no_entries() {
        let src = emit_registry(&[]);
        assert!(src.contains("pub enum SampleKey {\n}"));
        assert!(src.contains("_ => None,"));
    }
}
