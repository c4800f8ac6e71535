use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ErrorKind, IndexerResult};
use crate::types::{Cell, Row};

/// Natural key of a release and of its index document.
pub type ReleaseId = i64;

/// Status value marking a release as logically deleted.
///
/// A release with this status never exists in the index.
pub const DELETED_STATUS: i64 = 4;

/// Column names of the source table read by the projection.
pub struct ReleaseColumns;

impl ReleaseColumns {
    pub const ID: &'static str = "id";
    pub const NAME: &'static str = "releasename";
    pub const GROUP_ID: &'static str = "groupid";
    pub const SECTION_ID: &'static str = "sectionid";
    pub const STATUS: &'static str = "status";
    pub const PRE_TIME: &'static str = "pretime";
    pub const SIZE: &'static str = "size";
    pub const FILE_COUNT: &'static str = "files";
}

/// Projection of a source row onto the fields mirrored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub id: ReleaseId,
    pub name: String,
    pub group_id: i64,
    pub section_id: i64,
    pub status: i64,
    /// Unix timestamp of the release.
    pub pre_time: i64,
    pub size: f64,
    pub file_count: i64,
}

impl ReleaseRecord {
    /// Builds a record from a row snapshot.
    ///
    /// `id` and the name column are required. A null name becomes an empty string, missing or
    /// null numeric columns default to zero.
    pub fn from_row(row: &Row) -> IndexerResult<Self> {
        let name = match row.get(ReleaseColumns::NAME) {
            None => bail!(
                ErrorKind::InvalidData,
                "Required column is missing",
                format!("column `{}` is absent", ReleaseColumns::NAME)
            ),
            Some(Cell::Null) => String::new(),
            Some(cell) => cell.to_text().unwrap_or_default().into_owned(),
        };

        Ok(Self {
            id: Self::id_of(row)?,
            name,
            group_id: row.i64_or(ReleaseColumns::GROUP_ID, 0)?,
            section_id: row.i64_or(ReleaseColumns::SECTION_ID, 0)?,
            status: Self::status_of(row)?,
            pre_time: row.i64_or(ReleaseColumns::PRE_TIME, 0)?,
            size: row.f64_or(ReleaseColumns::SIZE, 0.0)?,
            file_count: row.i64_or(ReleaseColumns::FILE_COUNT, 0)?,
        })
    }

    /// Reads the natural key of a row snapshot.
    pub fn id_of(row: &Row) -> IndexerResult<ReleaseId> {
        row.required_i64(ReleaseColumns::ID)
    }

    /// Reads the status of a row snapshot, treating an absent or null status as `0`.
    pub fn status_of(row: &Row) -> IndexerResult<i64> {
        row.i64_or(ReleaseColumns::STATUS, 0)
    }

    pub fn is_deleted(&self) -> bool {
        self.status == DELETED_STATUS
    }
}
