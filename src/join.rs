//! Relational joins between normalized datasets.
//!
//! Keys are always an ordered list of columns, so single and composite keys
//! share one code path. Rows match when every key cell renders to the same
//! display text, which lets an integer year join a float year. An empty key
//! cell never matches anything.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use clap::ValueEnum;
use itertools::Itertools;
use log::{debug, info};

use crate::{
    data::present,
    dataset::{Dataset, Row},
    error::EtlError,
};

const KEY_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Left => f.write_str("left"),
            JoinSide::Right => f.write_str("right"),
        }
    }
}

/// Key columns for each side of a join, paired positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOn {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl JoinOn {
    /// The same key names on both sides.
    pub fn shared<S: AsRef<str>>(keys: &[S]) -> Self {
        let keys = keys.iter().map(|k| k.as_ref().to_string()).collect_vec();
        Self {
            left: keys.clone(),
            right: keys,
        }
    }

    pub fn pairs<L: AsRef<str>, R: AsRef<str>>(left: &[L], right: &[R]) -> Self {
        Self {
            left: left.iter().map(|k| k.as_ref().to_string()).collect(),
            right: right.iter().map(|k| k.as_ref().to_string()).collect(),
        }
    }
}

struct RightRow<'a> {
    row: &'a Row,
    matched: bool,
}

/// Joins `left` with `right`. Output rows follow left row order, and within
/// one left row the order of its right matches; unmatched right rows of a
/// right/full join come last in right order.
pub fn merge(
    left: &Dataset,
    right: &Dataset,
    on: &JoinOn,
    kind: JoinKind,
) -> Result<Dataset, EtlError> {
    if on.left.is_empty() || on.right.is_empty() {
        return Err(EtlError::EmptyJoinKeys);
    }
    if on.left.len() != on.right.len() {
        return Err(EtlError::JoinKeyArity {
            left: on.left.len(),
            right: on.right.len(),
        });
    }
    info!("Merging datasets: {} rows × {} rows", left.len(), right.len());
    debug!(
        "Merge keys: left={:?}, right={:?}, how={}",
        on.left, on.right, kind
    );

    let left_indices = column_indices(left, &on.left, JoinSide::Left)?;
    let right_indices = column_indices(right, &on.right, JoinSide::Right)?;

    let mut right_lookup: HashMap<String, Vec<RightRow<'_>>> = HashMap::new();
    let mut right_order = Vec::new();
    let mut unkeyed_right = Vec::new();
    for row in &right.rows {
        match build_key(row, &right_indices) {
            Some(key) => {
                if !right_lookup.contains_key(&key) {
                    right_order.push(key.clone());
                }
                right_lookup
                    .entry(key)
                    .or_default()
                    .push(RightRow { row, matched: false });
            }
            None => unkeyed_right.push(row),
        }
    }

    let layout = OutputLayout::new(left, right, on, &left_indices, &right_indices);
    let mut output = Dataset::new(layout.headers.clone());
    let include_unmatched_left = matches!(kind, JoinKind::Left | JoinKind::Full);
    let include_unmatched_right = matches!(kind, JoinKind::Right | JoinKind::Full);

    for left_row in &left.rows {
        let mut matched_any = false;
        if let Some(key) = build_key(left_row, &left_indices) {
            if let Some(bucket) = right_lookup.get_mut(&key) {
                for entry in bucket.iter_mut() {
                    matched_any = true;
                    entry.matched = true;
                    output.rows.push(layout.combine(Some(left_row), entry.row));
                }
            }
        }
        if !matched_any && include_unmatched_left {
            output.rows.push(layout.left_only(left_row));
        }
    }

    if include_unmatched_right {
        for key in &right_order {
            let unmatched = right_lookup[key].iter().filter(|entry| !entry.matched);
            for entry in unmatched {
                output.rows.push(layout.combine(None, entry.row));
            }
        }
        for row in unkeyed_right {
            output.rows.push(layout.combine(None, row));
        }
    }

    info!("Merge completed: {} rows in result", output.len());
    Ok(output)
}

fn column_indices(
    dataset: &Dataset,
    keys: &[String],
    side: JoinSide,
) -> Result<Vec<usize>, EtlError> {
    keys.iter()
        .map(|key| {
            dataset
                .column_index(key)
                .ok_or_else(|| EtlError::JoinKeyMissing {
                    key: key.clone(),
                    side,
                })
        })
        .collect()
}

fn build_key(row: &Row, key_indices: &[usize]) -> Option<String> {
    let mut parts = Vec::with_capacity(key_indices.len());
    for idx in key_indices {
        let value = present(row.get(*idx)?.as_ref())?;
        parts.push(value.as_display());
    }
    Some(parts.join(KEY_SEPARATOR))
}

/// Column layout of a join result: every left column, then every right column
/// except right keys that share their left partner's name. Other name clashes
/// are renamed `right_<name>_<n>`.
struct OutputLayout {
    headers: Vec<String>,
    left_width: usize,
    right_columns: Vec<usize>,
    /// (left index, right index) for keys whose right column was folded away.
    folded_keys: Vec<(usize, usize)>,
}

impl OutputLayout {
    fn new(
        left: &Dataset,
        right: &Dataset,
        on: &JoinOn,
        left_indices: &[usize],
        right_indices: &[usize],
    ) -> Self {
        let mut headers = left.columns.clone();
        let mut seen: HashSet<String> = headers.iter().cloned().collect();
        let mut folded_keys = Vec::new();
        let mut folded_right = HashSet::new();
        for ((left_name, right_name), (l_idx, r_idx)) in on
            .left
            .iter()
            .zip(on.right.iter())
            .zip(left_indices.iter().zip(right_indices.iter()))
        {
            if left_name == right_name {
                folded_keys.push((*l_idx, *r_idx));
                folded_right.insert(*r_idx);
            }
        }

        let mut right_columns = Vec::new();
        for (idx, name) in right.columns.iter().enumerate() {
            if folded_right.contains(&idx) {
                continue;
            }
            let mut candidate = name.clone();
            let mut counter = 1usize;
            while seen.contains(&candidate) {
                candidate = format!("right_{name}_{counter}");
                counter += 1;
            }
            seen.insert(candidate.clone());
            headers.push(candidate);
            right_columns.push(idx);
        }

        Self {
            headers,
            left_width: left.columns.len(),
            right_columns,
            folded_keys,
        }
    }

    fn combine(&self, left_row: Option<&Row>, right_row: &Row) -> Row {
        let mut combined = match left_row {
            Some(row) => row.clone(),
            None => {
                let mut blank = vec![None; self.left_width];
                for (l_idx, r_idx) in &self.folded_keys {
                    blank[*l_idx] = right_row[*r_idx].clone();
                }
                blank
            }
        };
        combined.extend(self.right_columns.iter().map(|idx| right_row[*idx].clone()));
        combined
    }

    fn left_only(&self, left_row: &Row) -> Row {
        let mut combined = left_row.clone();
        combined.resize(self.headers.len(), None);
        combined
    }
}
