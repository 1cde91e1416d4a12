//! Typed trailer metadata
//!
//! Every section carries serde defaults, so documents written by older
//! versions (or with sections missing) decode to the same shape. Keys this
//! crate does not know about are kept in [`Metadata::extra`].

use crate::schema::ColumnTypeInfo;
use crate::{Result, RowpackError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Metadata document version written by this crate
pub const METADATA_VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub version: u16,
    pub about: About,
    pub source: SourceInfo,
    pub row_spec: RowSpec,
    pub process: Process,
    pub types: Vec<ColumnTypeInfo>,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            about: About::default(),
            source: SourceInfo::default(),
            row_spec: RowSpec::default(),
            process: Process::default(),
            types: Vec::new(),
            extra: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct About {
    pub create_time: Option<jiff::Timestamp>,
    /// Seconds spent loading rows
    pub load_time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceInfo {
    pub url: Option<String>,
    pub encoding: Option<String>,
    pub file_type: Option<String>,
    pub url_file_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Process {
    /// Row data is complete and will never be appended to again
    pub finalized: bool,
}

impl Metadata {
    /// Insert or overwrite free-form entries
    pub fn merge<I, K>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        for (k, v) in entries {
            self.extra.insert(k.into(), v);
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.process.finalized
    }

    /// Checks run on every decoded document
    pub fn validate(&self) -> Result<()> {
        if self.version > METADATA_VERSION {
            return Err(RowpackError::format(format!(
                "Metadata version {} is newer than supported version {}",
                self.version, METADATA_VERSION
            )));
        }
        if let (Some(start), Some(end)) = (self.row_spec.start_row, self.row_spec.end_row) {
            if start > end {
                return Err(RowpackError::format(format!(
                    "Row spec window is inverted: start_row={} > end_row={}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Role of a physical row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowRole {
    Header,
    Comment,
    Data,
    End,
    Blank,
}

impl RowRole {
    /// Single-letter label
    pub fn label(&self) -> char {
        match self {
            RowRole::Header => 'H',
            RowRole::Comment => 'C',
            RowRole::Data => 'D',
            RowRole::End => 'E',
            RowRole::Blank => 'B',
        }
    }
}

impl fmt::Display for RowRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A requested role change for one physical row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEdit {
    /// First data row
    Data(usize),
    Header(usize),
    Comment(usize),
    /// First row after the data
    End(usize),
    Clear(usize),
}

/// Which physical rows are headers, comments, and data
///
/// `start_row..=end_row` is the data window; `None` means the first or last
/// physical row respectively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowSpec {
    pub header_rows: BTreeSet<usize>,
    pub comment_rows: BTreeSet<usize>,
    pub start_row: Option<usize>,
    pub end_row: Option<usize>,
}

impl RowSpec {
    /// Inclusive data window for a file of `row_count` rows
    pub fn window(&self, row_count: usize) -> Option<(usize, usize)> {
        if row_count == 0 {
            return None;
        }
        let start = self.start_row.unwrap_or(0);
        let end = self.end_row.unwrap_or(row_count - 1).min(row_count - 1);
        (start <= end).then_some((start, end))
    }

    pub fn role_of(&self, row: usize, row_count: usize) -> RowRole {
        if self.header_rows.contains(&row) {
            return RowRole::Header;
        }
        if self.comment_rows.contains(&row) {
            return RowRole::Comment;
        }
        match self.window(row_count) {
            Some((start, end)) if (start..=end).contains(&row) => RowRole::Data,
            Some((_, end)) if row > end => RowRole::End,
            _ => RowRole::Blank,
        }
    }

    fn max_classified(&self) -> Option<usize> {
        self.header_rows
            .iter()
            .chain(self.comment_rows.iter())
            .copied()
            .max()
    }

    fn start_after_classified(&self) -> Option<usize> {
        self.max_classified().map(|m| m + 1)
    }

    /// Apply one interactive correction, keeping the row spec consistent
    pub fn apply(&mut self, edit: RowEdit) -> Result<()> {
        match edit {
            RowEdit::Data(row) => {
                self.header_rows.retain(|&r| r < row);
                self.comment_rows.retain(|&r| r < row);
                self.start_row = Some(row);
                if self.end_row.is_some_and(|end| end < row) {
                    self.end_row = None;
                }
            }
            RowEdit::Header(row) | RowEdit::Comment(row) => {
                self.comment_rows.remove(&row);
                self.header_rows.remove(&row);
                if matches!(edit, RowEdit::Header(_)) {
                    self.header_rows.insert(row);
                } else {
                    self.comment_rows.insert(row);
                }

                if self.start_row.unwrap_or(0) <= row {
                    self.start_row = self.start_after_classified();
                }
                if let (Some(start), Some(end)) = (self.start_row, self.end_row) {
                    if end < start {
                        self.end_row = None;
                    }
                }
            }
            RowEdit::End(row) => {
                if row == 0 {
                    return Err(RowpackError::invalid_argument(
                        "Row 0 cannot end the data; there would be no data rows",
                    ));
                }
                self.header_rows.retain(|&r| r < row);
                self.comment_rows.retain(|&r| r < row);
                self.end_row = Some(row - 1);

                if self.start_row.unwrap_or(0) >= row {
                    self.start_row = match self.start_after_classified() {
                        Some(s) if s < row => Some(s),
                        _ => Some(row - 1),
                    };
                }
            }
            RowEdit::Clear(row) => {
                self.header_rows.remove(&row);
                self.comment_rows.remove(&row);
                if self.start_row == Some(row) {
                    self.start_row = self.start_after_classified();
                }
                if self.end_row == Some(row) || self.end_row.map(|e| e + 1) == Some(row) {
                    self.end_row = None;
                }
            }
        }
        Ok(())
    }
}
