use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Row;

/// Kind of row-level operation carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// All operation kinds the indexer consumes.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row snapshots of a change, shaped by its operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RowChange {
    /// The inserted row.
    Insert { values: Row },
    /// The row before and after the update.
    Update { before_values: Row, after_values: Row },
    /// The row as it was before deletion.
    Delete { values: Row },
}

/// Ordered, typed notification of a row change committed to a source table.
///
/// Events are produced by the change-stream source and consumed exactly once by the pipeline.
/// On the wire an event is one JSON object per line:
///
/// ```json
/// {"table":"releases","type":"update","before_values":{"id":1,"status":0},"after_values":{"id":1,"status":4}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Name of the table the row belongs to.
    pub table: String,
    #[serde(flatten)]
    pub change: RowChange,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, values: Row) -> Self {
        Self {
            table: table.into(),
            change: RowChange::Insert { values },
        }
    }

    pub fn update(table: impl Into<String>, before_values: Row, after_values: Row) -> Self {
        Self {
            table: table.into(),
            change: RowChange::Update {
                before_values,
                after_values,
            },
        }
    }

    pub fn delete(table: impl Into<String>, values: Row) -> Self {
        Self {
            table: table.into(),
            change: RowChange::Delete { values },
        }
    }

    pub fn operation(&self) -> OperationKind {
        match self.change {
            RowChange::Insert { .. } => OperationKind::Insert,
            RowChange::Update { .. } => OperationKind::Update,
            RowChange::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Returns the snapshot that reflects the current state of the row.
    ///
    /// That is the inserted row, the updated row, or the deleted row.
    pub fn current_values(&self) -> &Row {
        match &self.change {
            RowChange::Insert { values } | RowChange::Delete { values } => values,
            RowChange::Update { after_values, .. } => after_values,
        }
    }
}
