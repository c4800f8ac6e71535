use std::collections::HashMap;

use indexer_config::shared::ReferenceConfig;
use tracing::{info, warn};

use crate::bail;
use crate::error::{ErrorKind, IndexerError, IndexerResult};
use crate::reference::source::{GROUPS_TABLE, ReferenceSource, SECTIONS_TABLE};

/// Mapping from id to name of one reference table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: HashMap<i64, String>,
    max_id: i64,
}

impl Dictionary {
    /// Builds a dictionary from the rows of `table`.
    ///
    /// Fewer than `min_rows` rows means the table did not load completely, which is reported as
    /// [`ErrorKind::ReferenceTableIncomplete`]; no partial dictionary is returned in that case.
    pub fn from_rows(
        table: &str,
        rows: Vec<(i64, String)>,
        min_rows: usize,
    ) -> IndexerResult<Self> {
        if rows.len() < min_rows {
            warn!(
                table,
                rows = rows.len(),
                min_rows,
                "reference table returned fewer rows than required"
            );
            bail!(
                ErrorKind::ReferenceTableIncomplete,
                "Reference table is incomplete",
                format!(
                    "`{table}` returned {} rows, at least {min_rows} are required",
                    rows.len()
                )
            );
        }

        let max_id = rows.iter().map(|(id, _)| *id).max().unwrap_or(0);
        let entries: HashMap<i64, String> = rows.into_iter().collect();

        info!(table, entries = entries.len(), max_id, "cached reference table");

        Ok(Self { entries, max_id })
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest id seen while loading, `0` for an empty dictionary.
    pub fn max_id(&self) -> i64 {
        self.max_id
    }
}

/// The group and section dictionaries, immutable after loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceData {
    pub groups: Dictionary,
    pub sections: Dictionary,
}

impl ReferenceData {
    /// Loads both dictionaries from `source`.
    ///
    /// Both tables are always attempted. If one or both fail, the errors are returned
    /// aggregated.
    pub async fn load<R>(source: &R, config: &ReferenceConfig) -> IndexerResult<Self>
    where
        R: ReferenceSource,
    {
        info!("fetching reference tables");

        let groups = match source.fetch_groups().await {
            Ok(rows) => Dictionary::from_rows(GROUPS_TABLE, rows, config.min_groups),
            Err(err) => Err(err),
        };
        let sections = match source.fetch_sections().await {
            Ok(rows) => Dictionary::from_rows(SECTIONS_TABLE, rows, config.min_sections),
            Err(err) => Err(err),
        };

        match (groups, sections) {
            (Ok(groups), Ok(sections)) => Ok(Self { groups, sections }),
            (groups, sections) => {
                let errors: Vec<IndexerError> =
                    [groups.err(), sections.err()].into_iter().flatten().collect();
                Err(errors.into())
            }
        }
    }

    pub fn group_name(&self, id: i64) -> Option<&str> {
        self.groups.get(id)
    }

    pub fn section_name(&self, id: i64) -> Option<&str> {
        self.sections.get(id)
    }
}
