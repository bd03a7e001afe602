//! Filter expression builder for backend list queries.
//!
//! The backend accepts filters as strings such as
//! `category = "tea" && price >= 5`. Field names are `&'static str` so only
//! code can choose them; values are always rendered through [`FilterValue`],
//! which quotes and escapes strings.

use std::fmt;

use rust_decimal::Decimal;

/// A literal value on the right-hand side of a filter clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Number(Decimal),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' | '\r' => f.write_str(" ")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::Number(d) => write!(f, "{}", d.normalize()),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Decimal> for FilterValue {
    fn from(d: Decimal) -> Self {
        Self::Number(d)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Builds `&&`-joined filter expressions.
///
/// ```
/// use mercato_storefront::backend::FilterBuilder;
///
/// let filter = FilterBuilder::new()
///     .eq("category", "tea")
///     .like("name", "oo\"long")
///     .gte("stock", 1_i64)
///     .build();
/// assert_eq!(
///     filter.as_deref(),
///     Some(r#"category = "tea" && name ~ "oo\"long" && stock >= 1"#)
/// );
/// assert_eq!(FilterBuilder::new().build(), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    clauses: Vec<String>,
}

impl FilterBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn clause(mut self, field: &'static str, op: &str, value: FilterValue) -> Self {
        self.clauses.push(format!("{field} {op} {value}"));
        self
    }

    /// `field = value`
    #[must_use]
    pub fn eq(self, field: &'static str, value: impl Into<FilterValue>) -> Self {
        self.clause(field, "=", value.into())
    }

    /// `field != value`
    #[must_use]
    pub fn neq(self, field: &'static str, value: impl Into<FilterValue>) -> Self {
        self.clause(field, "!=", value.into())
    }

    /// `field ~ value` (contains, case-insensitive on the backend).
    #[must_use]
    pub fn like(self, field: &'static str, value: impl Into<FilterValue>) -> Self {
        self.clause(field, "~", value.into())
    }

    /// `field >= value`
    #[must_use]
    pub fn gte(self, field: &'static str, value: impl Into<FilterValue>) -> Self {
        self.clause(field, ">=", value.into())
    }

    /// `field <= value`
    #[must_use]
    pub fn lte(self, field: &'static str, value: impl Into<FilterValue>) -> Self {
        self.clause(field, "<=", value.into())
    }

    /// Apply `f` only when `value` is present.
    #[must_use]
    pub fn optional<T>(self, value: Option<T>, f: impl FnOnce(Self, T) -> Self) -> Self {
        match value {
            Some(v) => f(self, v),
            None => self,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render the expression, or `None` when there are no clauses.
    #[must_use]
    pub fn build(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" && "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_quotes_and_backslashes() {
        let value = FilterValue::from(r#"a"b\c"#);
        assert_eq!(value.to_string(), r#""a\"b\\c""#);
    }

    #[test]
    fn test_injection_stays_inside_string() {
        let filter = FilterBuilder::new()
            .eq("user", r#"x" || user != "x"#)
            .build();
        assert_eq!(
            filter.as_deref(),
            Some(r#"user = "x\" || user != \"x""#)
        );
    }

    #[test]
    fn test_newlines_flattened() {
        assert_eq!(FilterValue::from("a\nb").to_string(), "\"a b\"");
    }

    #[test]
    fn test_numbers_and_bools() {
        let filter = FilterBuilder::new()
            .gte("price", Decimal::new(1050, 2))
            .lte("price", Decimal::new(20, 0))
            .eq("featured", true)
            .neq("stock", 0_i64)
            .build();
        assert_eq!(
            filter.as_deref(),
            Some("price >= 10.5 && price <= 20 && featured = true && stock != 0")
        );
    }

    #[test]
    fn test_optional() {
        let none: Option<&str> = None;
        let builder = FilterBuilder::new()
            .optional(none, |b, v| b.eq("category", v))
            .optional(Some("tea"), |b, v| b.eq("category", v));
        assert_eq!(builder.build().as_deref(), Some(r#"category = "tea""#));
    }
}
