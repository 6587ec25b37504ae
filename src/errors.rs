//! Compile-error taxonomy.
//!
//! Every error is fatal for the task that raised it: there is no retry and no
//! partial emission. Errors carry enough location context (sheet, column, row)
//! to point at the offending cell.

use std::fmt;

/// Where in the workbook an error was raised. Fields are best-effort: the type
/// classifier knows sheet+column, the cell parser also knows the row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Loc {
    pub sheet: String,
    pub column: String,
    /// zero-based workbook row (data rows start at 3).
    pub row: Option<usize>,
}

impl Loc {
    pub fn column(sheet: &str, column: &str) -> Self {
        Self { sheet: sheet.to_string(), column: column.to_string(), row: None }
    }

    pub fn cell(sheet: &str, column: &str, row: usize) -> Self {
        Self { sheet: sheet.to_string(), column: column.to_string(), row: Some(row) }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sheet.is_empty() && self.column.is_empty() && self.row.is_none() {
            return Ok(());
        }
        write!(f, " (sheet {:?}", self.sheet)?;
        if !self.column.is_empty() {
            write!(f, ", column {:?}", self.column)?;
        }
        if let Some(row) = self.row {
            write!(f, ", row {row}")?;
        }
        write!(f, ")")
    }
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// annotation string matched no production of the closed type grammar.
    #[error("malformed type annotation {annotation:?}{loc}")]
    MalformedType { annotation: String, loc: Loc },

    /// cell text does not have the shape implied by its resolved type.
    #[error("malformed cell value {raw:?}: {reason}{loc}")]
    MalformedValue { raw: String, reason: &'static str, loc: Loc },

    /// repeated map key, repeated primary key, repeated field name, or a sheet
    /// listed twice across the input groups.
    #[error("duplicate key {key:?}{loc}")]
    DuplicateKey { key: String, loc: Loc },

    #[error("no sheet {name:?} in workbook")]
    MissingSheet { name: String },

    /// foreign-key lookup found no row with the given primary key.
    #[error("no row keyed {key:?} in sheet {sheet:?}{loc}")]
    MissingRow { sheet: String, key: String, loc: Loc },

    /// a sheet referenced itself while its own resolution was still in
    /// progress (directly or through other sheets).
    #[error("cyclic sheet reference: {chain}")]
    CyclicSchema { chain: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("formatter failed: {0}")]
    Format(String),
}

impl CompileError {
    /// Fill in location context on errors raised below the layer that knows it.
    /// Already-populated locations are kept.
    pub fn at(self, loc: &Loc) -> Self {
        fn merge(own: Loc, outer: &Loc) -> Loc {
            if own == Loc::default() { outer.clone() } else { own }
        }
        match self {
            Self::MalformedType { annotation, loc: own } => {
                Self::MalformedType { annotation, loc: merge(own, loc) }
            }
            Self::MalformedValue { raw, reason, loc: own } => {
                Self::MalformedValue { raw, reason, loc: merge(own, loc) }
            }
            Self::DuplicateKey { key, loc: own } => {
                Self::DuplicateKey { key, loc: merge(own, loc) }
            }
            Self::MissingRow { sheet, key, loc: own } => {
                Self::MissingRow { sheet, key, loc: merge(own, loc) }
            }
            other => other,
        }
    }
}
