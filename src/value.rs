//! Parsed cell values.
//!
//! `ParsedValue` mirrors the type grammar one-to-one. Values are built per
//! row during emission and dropped immediately after; nothing here survives a
//! run.

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::grammar::ScalarKind;

/// One parsed scalar. Floats are wrapped so scalar values can serve as map
/// keys (`Eq + Hash`), which is what duplicate-key detection is keyed on:
/// `"01"` and `"1"` collide once both parse to `Int(1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Bool(bool),
}

impl ScalarValue {
    /// Lenient scalar parse, reproducing the legacy policy: unparsable
    /// numeric text yields the zero value instead of an error. Strings are
    /// taken verbatim (trimmed); booleans accept a fixed token set.
    pub fn parse(kind: ScalarKind, raw: &str) -> Self {
        let t = raw.trim();
        if kind.is_integer() {
            Self::Int(t.parse().unwrap_or_default())
        } else if kind.is_float() {
            Self::Float(OrderedFloat(t.parse().unwrap_or_default()))
        } else if kind == ScalarKind::Bool {
            Self::Bool(parse_bool(t))
        } else {
            Self::Str(t.to_string())
        }
    }

    /// Raw rendering without any quoting, as used inside table keys.
    pub fn raw_text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.0.to_string(),
            Self::Str(v) => v.clone(),
            Self::Bool(v) => v.to_string(),
        }
    }
}

fn parse_bool(t: &str) -> bool {
    matches!(
        t.to_ascii_lowercase().as_str(),
        "true" | "t" | "1" | "yes" | "y" | "on"
    )
}

/// A fully parsed cell (or a row resolved through a foreign key).
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Scalar(ScalarValue),
    Array(Vec<ParsedValue>),
    Array2D(Vec<Vec<ParsedValue>>),
    /// insertion-ordered pairs; key uniqueness is enforced at parse time.
    Map(Vec<(ScalarValue, ParsedValue)>),
    /// one resolved row, field name → value, in column order.
    Struct(IndexMap<String, ParsedValue>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_parse_is_lenient() {
        assert_eq!(ScalarValue::parse(ScalarKind::Int, "42"), ScalarValue::Int(42));
        assert_eq!(ScalarValue::parse(ScalarKind::Int, "not a number"), ScalarValue::Int(0));
        assert_eq!(
            ScalarValue::parse(ScalarKind::Float64, " 1.5 "),
            ScalarValue::Float(OrderedFloat(1.5))
        );
        assert_eq!(ScalarValue::parse(ScalarKind::Float32, ""), ScalarValue::Float(OrderedFloat(0.0)));
    }

    #[test]
    fn bool_token_set() {
        for yes in ["true", "TRUE", "1", "yes", "on", "y"] {
            assert_eq!(ScalarValue::parse(ScalarKind::Bool, yes), ScalarValue::Bool(true));
        }
        for no in ["false", "0", "no", "off", "", "maybe"] {
            assert_eq!(ScalarValue::parse(ScalarKind::Bool, no), ScalarValue::Bool(false));
        }
    }

    #[test]
    fn leading_zero_integers_collide_after_parse() {
        assert_eq!(
            ScalarValue::parse(ScalarKind::Int, "01"),
            ScalarValue::parse(ScalarKind::Int, "1")
        );
    }
}
