//! Back ends: both emitters walk the resolved `SheetSchema`/`ParsedValue`
//! structures and never mutate shared state, so disjoint sheets can be
//! emitted concurrently.

pub mod records;
pub mod registry;
pub mod tables;

/// Banner placed at the top of every generated file.
pub const GENERATED_BANNER: &str = "Code generated by xlsx-tablegen.\nDO NOT EDIT!";
