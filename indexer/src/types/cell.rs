use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ErrorKind, IndexerResult};

/// A single column value of a row snapshot.
///
/// The change stream delivers scalars only; the variant order matters for untagged decoding,
/// so integers are tried before floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
}

impl Cell {
    /// Converts the value to an integer if it represents one exactly.
    ///
    /// Decimal columns often arrive as strings, so numeric strings are accepted.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Cell::Null => None,
            Cell::Bool(value) => Some(i64::from(*value)),
            Cell::I64(value) => Some(*value),
            Cell::U64(value) => i64::try_from(*value).ok(),
            Cell::F64(value) => {
                let integral = value.is_finite()
                    && value.fract() == 0.0
                    && *value >= i64::MIN as f64
                    && *value <= i64::MAX as f64;
                integral.then_some(*value as i64)
            }
            Cell::String(value) => value.trim().parse().ok(),
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Cell::Null | Cell::Bool(_) => None,
            Cell::I64(value) => Some(*value as f64),
            Cell::U64(value) => Some(*value as f64),
            Cell::F64(value) => Some(*value),
            Cell::String(value) => value.trim().parse().ok(),
        }
    }

    /// Renders the value as text. Returns [`None`] for [`Cell::Null`].
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Null => None,
            Cell::String(value) => Some(Cow::Borrowed(value)),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::I64(value) => write!(f, "{value}"),
            Cell::U64(value) => write!(f, "{value}"),
            Cell::F64(value) => write!(f, "{value}"),
            Cell::String(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::I64(i64::from(value))
    }
}

impl From<u64> for Cell {
    fn from(value: u64) -> Self {
        Cell::U64(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::F64(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Snapshot of a row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Cell>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value, returning the row for chaining.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.0.get(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the integer value of a column that must be present and non-null.
    pub fn required_i64(&self, column: &str) -> IndexerResult<i64> {
        match self.get(column) {
            None | Some(Cell::Null) => bail!(
                ErrorKind::InvalidData,
                "Required column is missing",
                format!("column `{column}` is absent or null")
            ),
            Some(cell) => Self::convert_i64(column, cell),
        }
    }

    /// Returns the integer value of a column, or `default` when it is absent or null.
    pub fn i64_or(&self, column: &str, default: i64) -> IndexerResult<i64> {
        match self.get(column) {
            None | Some(Cell::Null) => Ok(default),
            Some(cell) => Self::convert_i64(column, cell),
        }
    }

    /// Returns the floating point value of a column, or `default` when it is absent or null.
    pub fn f64_or(&self, column: &str, default: f64) -> IndexerResult<f64> {
        match self.get(column) {
            None | Some(Cell::Null) => Ok(default),
            Some(cell) => match cell.to_f64() {
                Some(value) => Ok(value),
                None => bail!(
                    ErrorKind::ConversionError,
                    "Column value is not a number",
                    format!("column `{column}` holds `{cell}`")
                ),
            },
        }
    }

    fn convert_i64(column: &str, cell: &Cell) -> IndexerResult<i64> {
        match cell.to_i64() {
            Some(value) => Ok(value),
            None => bail!(
                ErrorKind::ConversionError,
                "Column value is not an integer",
                format!("column `{column}` holds `{cell}`")
            ),
        }
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row(iter
            .into_iter()
            .map(|(column, value)| (column.into(), value.into()))
            .collect())
    }
}
