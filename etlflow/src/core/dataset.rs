//! Named tabular datasets with typed cells.

use crate::errors::DatasetError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value.
    #[default]
    Null,
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the cell, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    /// Text view of the cell.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// A stable, type-tagged encoding used for keys and fingerprints.
    #[must_use]
    pub fn key_repr(&self) -> String {
        match self {
            Self::Null => "n".to_string(),
            Self::Int(v) => format!("i:{v}"),
            Self::Float(v) => format!("f:{:x}", v.to_bits()),
            Self::Text(s) => format!("t:{}:{s}", s.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A named table of rows with ordered columns.
///
/// Datasets are always replaced wholesale by the stage that produces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Creates an empty dataset with the given columns.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Builds a dataset from rows, checking every row's arity.
    pub fn from_rows(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self, DatasetError> {
        let mut dataset = Self::new(name, columns);
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Appends a row.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), DatasetError> {
        if row.len() != self.columns.len() {
            return Err(DatasetError::Arity {
                dataset: self.name.clone(),
                row: self.rows.len(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// The dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a copy under a different name.
    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column.
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Iterates over one column's cells.
    pub fn column(&self, column: &str) -> Result<impl Iterator<Item = &Value> + '_, DatasetError> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    fn require_column(&self, column: &str) -> Result<usize, DatasetError> {
        self.column_index(column).ok_or_else(|| DatasetError::UnknownColumn {
            dataset: self.name.clone(),
            column: column.to_string(),
        })
    }

    /// Inner-joins `self` (left) with `other` (right) on `key`.
    ///
    /// The key column appears once, in the left position. Other columns present
    /// on both sides are suffixed `_x` (left) and `_y` (right). Output rows
    /// follow left row order, then right row order within a key. Null keys
    /// match each other.
    pub fn inner_join(&self, other: &Self, key: &str, name: impl Into<String>) -> Result<Self, DatasetError> {
        let left_key = self.require_column(key)?;
        let right_key = other.require_column(key)?;

        let left_names: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let right_names: HashSet<&str> = other.columns.iter().map(String::as_str).collect();

        let mut columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c != key && right_names.contains(c.as_str()) {
                    format!("{c}_x")
                } else {
                    c.clone()
                }
            })
            .collect();
        let right_cols: Vec<usize> = (0..other.columns.len()).filter(|&i| i != right_key).collect();
        columns.extend(right_cols.iter().map(|&i| {
            let c = &other.columns[i];
            if left_names.contains(c.as_str()) {
                format!("{c}_y")
            } else {
                c.clone()
            }
        }));

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in other.rows.iter().enumerate() {
            index.entry(row[right_key].key_repr()).or_default().push(i);
        }

        let mut joined = Self::new(name, columns);
        for left in &self.rows {
            let Some(matches) = index.get(&left[left_key].key_repr()) else {
                continue;
            };
            for &r in matches {
                let right = &other.rows[r];
                let mut row = left.clone();
                row.extend(right_cols.iter().map(|&i| right[i].clone()));
                joined.rows.push(row);
            }
        }

        Ok(joined)
    }

    /// SHA-256 over the column header and the sorted row encodings.
    ///
    /// Two datasets with the same columns and the same multiset of rows share a
    /// fingerprint regardless of row order or dataset name.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut encoded: Vec<String> = self
            .rows
            .iter()
            .map(|row| row.iter().map(Value::key_repr).collect::<Vec<_>>().join("\u{1f}"))
            .collect();
        encoded.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.columns.join("\u{1f}").as_bytes());
        for row in &encoded {
            hasher.update(b"\x1e");
            hasher.update(row.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
