use crate::schema::{ColumnStats, ColumnTypeInfo, DeclaredType};
use crate::{Result, Row};
use indexmap::IndexMap;

/// Column description offered by a row source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub position: usize,
    pub name: String,
    pub description: Option<String>,
}

/// Anything that yields rows for loading
///
/// `headers` is consumed once, before the first row. Both hooks default to
/// "nothing to offer".
pub trait RowSource: Iterator<Item = Result<Row>> {
    fn headers(&self) -> Option<Vec<String>> {
        None
    }

    fn column_meta(&self) -> Option<Vec<ColumnMeta>> {
        None
    }
}

/// Resolves a column type from sampled rows
pub trait TypeIntuiter {
    fn intuit(&mut self, headers: &[String], rows: &[Row]) -> Result<Vec<ColumnTypeInfo>>;
}

/// Computes per-column statistics over a row stream
pub trait StatsEngine {
    fn compute(
        &mut self,
        columns: &[(String, Option<DeclaredType>)],
        rows: &mut dyn Iterator<Item = Result<Row>>,
    ) -> Result<IndexMap<String, ColumnStats>>;
}
