//! In-memory tabular dataset shared by every pipeline stage.
//!
//! Rows are positional: `rows[r][c]` is the cell of column `columns[c]`.
//! Readers guarantee every row has exactly `columns.len()` cells.

use crate::data::Value;

pub type Cell = Option<Value>;
pub type Row = Vec<Cell>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a dataset from rows of possibly uneven length, padding short
    /// rows with empty cells and truncating long ones.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Replaces the column named `name`, or appends it when absent.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    pub fn rename_columns<F>(&mut self, rename: F)
    where
        F: Fn(&str) -> String,
    {
        self.columns = self.columns.iter().map(|c| rename(c)).collect();
    }

    /// Restricts the dataset to `wanted`, in that order, skipping names that
    /// are not present. Returns the projection and the skipped names.
    pub fn select_available<S>(&self, wanted: &[S]) -> (Dataset, Vec<String>)
    where
        S: AsRef<str>,
    {
        let mut indices = Vec::with_capacity(wanted.len());
        let mut columns = Vec::with_capacity(wanted.len());
        let mut missing = Vec::new();
        for name in wanted {
            let name = name.as_ref();
            match self.column_index(name) {
                Some(idx) => {
                    indices.push(idx);
                    columns.push(name.to_string());
                }
                None => missing.push(name.to_string()),
            }
        }
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|idx| row[*idx].clone()).collect())
            .collect();
        (Dataset { columns, rows }, missing)
    }
}
