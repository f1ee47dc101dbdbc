//! Column type inference for delimited sources.
//!
//! Spreadsheet cells arrive typed from the workbook; CSV exports do not, so
//! every column is sampled and narrowed to the most specific type that all of
//! its non-empty values satisfy.

use crate::data::{parse_naive_date, parse_naive_datetime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
    possible_date: bool,
    possible_datetime: bool,
    observed: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
            possible_date: true,
            possible_datetime: true,
            observed: false,
        }
    }

    fn observe(&mut self, raw: &str) {
        let value = raw.trim();
        if value.is_empty() {
            return;
        }
        self.observed = true;
        if self.possible_boolean
            && !matches!(
                value.to_ascii_lowercase().as_str(),
                "true" | "false" | "t" | "f" | "yes" | "no" | "y" | "n"
            )
        {
            self.possible_boolean = false;
        }
        let leading_zero = has_significant_leading_zero(value);
        if self.possible_integer && (leading_zero || value.parse::<i64>().is_err()) {
            self.possible_integer = false;
        }
        if self.possible_float && (leading_zero || value.parse::<f64>().is_err()) {
            self.possible_float = false;
        }
        if self.possible_date && parse_naive_date(value).is_err() {
            self.possible_date = false;
        }
        if self.possible_datetime && parse_naive_datetime(value).is_err() {
            self.possible_datetime = false;
        }
    }

    fn decide(&self) -> ColumnType {
        if !self.observed {
            ColumnType::String
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_datetime {
            ColumnType::DateTime
        } else {
            ColumnType::String
        }
    }
}

/// Postal codes and tax ids such as `08001` must keep their leading zero.
fn has_significant_leading_zero(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.")
}

/// Infers one [`ColumnType`] per column from every decoded row.
pub fn infer_column_types(width: usize, rows: &[Vec<String>]) -> Vec<ColumnType> {
    let mut candidates = vec![TypeCandidate::new(); width];
    for row in rows {
        for (candidate, field) in candidates.iter_mut().zip(row.iter()) {
            candidate.observe(field);
        }
    }
    candidates.iter().map(TypeCandidate::decide).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[&[&str]]) -> Vec<Vec<String>> {
        values
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    #[test]
    fn infers_numeric_date_and_text_columns() {
        let data = rows(&[
            &["1", "12.50", "2024-01-15", "Madrid"],
            &["2", "3", "2024-02-01", "Sevilla"],
        ]);
        let types = infer_column_types(4, &data);
        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Date,
                ColumnType::String
            ]
        );
    }

    #[test]
    fn leading_zero_codes_stay_text() {
        let data = rows(&[&["08001", "0"], &["28013", "0.5"]]);
        let types = infer_column_types(2, &data);
        assert_eq!(types, vec![ColumnType::String, ColumnType::Float]);
    }

    #[test]
    fn empty_columns_default_to_string() {
        let data = rows(&[&["", "2024-01-15 10:30:00"], &["", ""]]);
        let types = infer_column_types(2, &data);
        assert_eq!(types, vec![ColumnType::String, ColumnType::DateTime]);
    }
}
