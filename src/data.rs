use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::schema::ColumnType;

/// A single spreadsheet cell. Missing cells are represented as `None` by the
/// surrounding `Option<Value>`; a NaN float is treated the same way.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Numeric view used by the category filters. Text cells holding a number
    /// are accepted so CSV and spreadsheet sources behave alike.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_nan())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Value::String(s) => s.trim().is_empty(),
            other => other.is_missing(),
        }
    }

    /// Coerces the cell into a date-time, the way the order-line extraction
    /// treats its date columns. Anything unparsable yields `None`.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::DateTime(dt) => Some(*dt),
            Value::String(s) => {
                let trimmed = s.trim();
                parse_naive_datetime(trimmed)
                    .ok()
                    .or_else(|| parse_naive_date(trimmed).ok()?.and_hms_opt(0, 0, 0))
            }
            _ => None,
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            Value::Date(d) => Some(d.year()),
            Value::DateTime(dt) => Some(dt.year()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Collapses an optional cell into `None` when it carries the NaN marker.
pub fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_missing())
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Lowercases a header, strips diacritics to their base letter and replaces
/// spaces and hyphens with underscores.
pub fn fold_header(header: &str) -> String {
    header
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

/// Builds the `<prefix>_<folded header>` column name every join relies on.
pub fn normalize_header(header: &str, prefix: &str) -> String {
    format!("{prefix}_{}", fold_header(header))
}

pub fn parse_typed_value(value: &str, ty: &ColumnType) -> Result<Option<Value>> {
    if value.is_empty() || (value.trim().is_empty() && !matches!(ty, ColumnType::String)) {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::String => Value::String(value.to_string()),
        ColumnType::Integer => {
            let parsed: i64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as integer"))?;
            Value::Integer(parsed)
        }
        ColumnType::Float => {
            let parsed: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            Value::Float(parsed)
        }
        ColumnType::Boolean => {
            let lowered = value.trim().to_ascii_lowercase();
            let parsed = match lowered.as_str() {
                "true" | "t" | "yes" | "y" => true,
                "false" | "f" | "no" | "n" => false,
                _ => bail!("Failed to parse '{value}' as boolean"),
            };
            Value::Boolean(parsed)
        }
        ColumnType::Date => Value::Date(parse_naive_date(value.trim())?),
        ColumnType::DateTime => Value::DateTime(parse_naive_datetime(value.trim())?),
    };
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_header_strips_accents_and_prefixes() {
        assert_eq!(normalize_header("Fecha Pedido", "pd"), "pd_fecha_pedido");
        assert_eq!(normalize_header("Año Numeración", "lpd"), "lpd_ano_numeracion");
        assert_eq!(normalize_header("Id Artículo", "lpd"), "lpd_id_articulo");
        assert_eq!(normalize_header("Código-Postal", "cte"), "cte_codigo_postal");
    }

    #[test]
    fn as_display_collapses_integral_floats() {
        assert_eq!(Value::Float(2024.0).as_display(), "2024");
        assert_eq!(Value::Float(12.5).as_display(), "12.5");
        assert_eq!(Value::Integer(2024).as_display(), "2024");
    }

    #[test]
    fn as_f64_accepts_numeric_text() {
        assert_eq!(Value::String(" 0 ".into()).as_f64(), Some(0.0));
        assert_eq!(Value::String("abc".into()).as_f64(), None);
        assert_eq!(Value::Float(f64::NAN).as_f64(), None);
    }

    #[test]
    fn to_datetime_coerces_text_and_rejects_garbage() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            Value::String("2024-01-15 10:30:00".into()).to_datetime(),
            Some(expected)
        );
        assert_eq!(
            Value::String("15/01/2024".into())
                .to_datetime()
                .map(|dt| dt.date()),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(Value::String("pending".into()).to_datetime(), None);
        assert_eq!(Value::Integer(45000).to_datetime(), None);
    }

    #[test]
    fn parse_typed_value_handles_empty_and_numeric_inputs() {
        assert_eq!(parse_typed_value("", &ColumnType::Integer).unwrap(), None);
        assert_eq!(
            parse_typed_value("42", &ColumnType::Integer).unwrap(),
            Some(Value::Integer(42))
        );
        assert!(parse_typed_value("4x", &ColumnType::Float).is_err());
    }
}
