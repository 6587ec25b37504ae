//! Cross-sheet schema resolution.
//!
//! A sheet's header rows classify into a `SheetSchema`; struct-reference
//! columns pull in the referenced sheet's schema recursively. Resolution is
//! memoized per run, and a sheet re-entered while its own resolution is still
//! in progress is a cycle and is rejected (the legacy "seen" set could not
//! tell resolving from resolved).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::errors::{CompileError, Loc, Result};
use crate::grammar::{self, TypeExpr};
use crate::provider::SheetSource;

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    /// position in the raw row (excluded columns leave gaps).
    pub index: usize,
    pub name: String,
    /// description text from header row 0, carried into generated output.
    pub desc: String,
    pub ty: TypeExpr,
    /// child schema, present iff `ty` contains a struct reference.
    pub child: Option<Arc<SheetSchema>>,
    /// rendering depth within this sheet's own table entry; only the table
    /// emitter reads it. The primary-key column sits one level shallower.
    pub indent: usize,
}

#[derive(Debug, Clone)]
pub struct SheetSchema {
    pub name: String,
    /// ordered; index 0 is the primary-key column by convention.
    pub columns: Vec<ColumnSchema>,
}

impl SheetSchema {
    pub fn primary(&self) -> &ColumnSchema {
        &self.columns[0]
    }
}

/// Memoizing resolver shared read-only across emission tasks. First
/// resolution of a name wins; concurrent duplicate resolutions are pure and
/// get discarded.
pub struct SchemaResolver<'a> {
    source: &'a dyn SheetSource,
    cache: RwLock<HashMap<String, Arc<SheetSchema>>>,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(source: &'a dyn SheetSource) -> Self {
        Self { source, cache: RwLock::new(HashMap::new()) }
    }

    /// Resolve a sheet name to its schema, building it on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<SheetSchema>> {
        let mut stack = Vec::new();
        self.resolve_inner(name, &mut stack)
    }

    fn resolve_inner(&self, name: &str, stack: &mut Vec<String>) -> Result<Arc<SheetSchema>> {
        if let Some(schema) = self.cache.read().expect("schema cache poisoned").get(name) {
            return Ok(Arc::clone(schema));
        }
        if stack.iter().any(|n| n == name) {
            let mut chain = stack.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(name);
            return Err(CompileError::CyclicSchema { chain });
        }

        stack.push(name.to_string());
        let built = self.build(name, stack);
        stack.pop();
        let built = built?;

        debug!(sheet = name, columns = built.columns.len(), "resolved schema");
        let mut cache = self.cache.write().expect("schema cache poisoned");
        let entry = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(built));
        Ok(Arc::clone(entry))
    }

    fn build(&self, name: &str, stack: &mut Vec<String>) -> Result<SheetSchema> {
        let grid = self.source.sheet(name)?;
        if grid.rows.len() < 3 {
            return Err(CompileError::MalformedValue {
                raw: String::new(),
                reason: "sheet is missing its three header rows",
                loc: Loc { sheet: name.to_string(), ..Loc::default() },
            });
        }

        let field_names = &grid.rows[2];
        let mut columns = Vec::with_capacity(field_names.len());
        let mut seen = HashSet::new();
        for (index, cell) in field_names.iter().enumerate() {
            let field = cell.trim().to_string();
            let annotation = grid.cell(1, index).trim().to_string();
            let desc = grid.cell(0, index).trim().to_string();

            let loc = Loc::column(name, &field);
            let Some(ty) = grammar::classify(&annotation).map_err(|e| e.at(&loc))? else {
                continue; // '!' prefix: excluded from schema and emission
            };
            if !seen.insert(field.clone()) {
                return Err(CompileError::DuplicateKey { key: field, loc: Loc::column(name, "") });
            }

            let child = match ty.struct_sheet() {
                Some(sheet) => {
                    let sheet = sheet.to_string();
                    Some(self.resolve_inner(&sheet, stack).map_err(|e| e.at(&loc))?)
                }
                None => None,
            };

            let indent = if index == crate::provider::MAIN_KEY_COL { 0 } else { 1 };
            columns.push(ColumnSchema { index, name: field, desc, ty, child, indent });
        }

        Ok(SheetSchema { name: name.to_string(), columns })
    }
}
