//! Load and post-processing pipelines
//!
//! A file is produced in one pass by [`load`], then refined by amendment:
//! [`intuit_rows`] finds the data window, [`intuit_types`] and [`run_stats`]
//! hand rows to collaborators and persist what they report. Each step reads
//! the file, releases the reader, then reopens the file for amendment.

use crate::intuit::{RowIntuiter, RowIntuition};
use crate::schema::{normalize_header, Column, ColumnStats, ColumnTypeInfo, DeclaredType};
use crate::traits::{LocalStorage, RowSource, StatsEngine, Storage, StreamHandle, TypeIntuiter};
use crate::{ErrorContext, Reader, Result, Row, RowpackError, Schema, Writer};
use indexmap::IndexMap;
use std::path::Path;
use std::time::Instant;

/// Rows handed to a type intuiter
const TYPE_SAMPLE_ROWS: usize = 1000;

/// What a load wrote
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub rows: usize,
    pub columns: usize,
    /// Seconds spent loading
    pub load_time: f64,
}

/// Write every row of `source`, then finalize and close the writer
///
/// If anything fails the writer is left open; dropping it leaves the file
/// with its provisional header, so it will not open as a complete file.
pub fn load<H, S>(writer: &mut Writer<H>, mut source: S) -> Result<LoadReport>
where
    H: StreamHandle,
    S: RowSource,
{
    let started = Instant::now();

    if let Some(headers) = source.headers() {
        writer.set_schema(schema_from_headers(&headers))?;
    }

    if let Some(columns) = source.column_meta() {
        let schema = writer.schema_mut()?;
        for meta in columns {
            apply_column_meta(schema, meta.position, &meta.name, meta.description)?;
        }
    }

    for (index, row) in source.by_ref().enumerate() {
        let row = row.with_context(|| format!("Reading source row {}", index))?;
        writer.append_row(row)?;
    }

    let load_time = started.elapsed().as_secs_f64();
    {
        let about = &mut writer.metadata_mut()?.about;
        if about.create_time.is_none() {
            about.create_time = Some(jiff::Timestamp::now());
        }
        about.load_time = Some(load_time);
    }

    let rows = writer.row_count();
    writer.finalize()?;
    writer.close()?;

    log::info!("Loaded {} rows in {:.3}s", rows, load_time);
    Ok(LoadReport {
        rows,
        columns: writer.schema().len(),
        load_time,
    })
}

/// Create a local file and [`load`] it, removing the file if the load fails
pub fn load_file<P, S>(path: P, source: S) -> Result<LoadReport>
where
    P: AsRef<Path>,
    S: RowSource,
{
    let path = path.as_ref();
    let mut writer = Writer::create(path)?;

    match load(&mut writer, source) {
        Ok(report) => Ok(report),
        Err(e) => {
            drop(writer);
            log::warn!("Load of {} failed, removing it: {}", path.display(), e);
            if let Err(remove_err) = LocalStorage.remove(path) {
                log::warn!("Could not remove {}: {}", path.display(), remove_err);
            }
            Err(e)
        }
    }
}

fn schema_from_headers(headers: &[String]) -> Schema {
    let mut schema = Schema::new();
    for (i, raw) in headers.iter().enumerate() {
        let name = normalize_header(raw);
        let name = if name.is_empty() { format!("col{}", i) } else { name };
        schema.add_column(name, None);
    }
    schema
}

/// Attach a source's description of one column, checking its position
fn apply_column_meta(
    schema: &mut Schema,
    position: usize,
    raw_name: &str,
    description: Option<String>,
) -> Result<()> {
    let name = normalize_header(raw_name);

    if position < schema.len() {
        let column = schema.column_mut(position)?;
        if !name.is_empty() && column.name != name {
            return Err(RowpackError::data_validation(format!(
                "Column metadata for '{}' is at position {}, which holds '{}'",
                name, position, column.name
            )));
        }
        if description.is_some() {
            column.description = description;
        }
        return Ok(());
    }

    if position != schema.len() {
        return Err(RowpackError::data_validation(format!(
            "Column metadata for '{}' at position {} skips past the {} known columns",
            name,
            position,
            schema.len()
        )));
    }

    let mut column = Column::new(if name.is_empty() { format!("col{}", position) } else { name });
    column.description = description;
    schema.append(column);
    Ok(())
}

/// Run row intuition over a file and store the resulting row spec
///
/// Columns are renamed after the intuited headers where there are any.
pub fn intuit_rows<P: AsRef<Path>>(path: P, intuiter: &RowIntuiter) -> Result<RowIntuition> {
    let path = path.as_ref();

    let intuition = {
        let mut reader = Reader::open(path)
            .with_context(|| format!("Opening {} for row intuition", path.display()))?;
        intuiter.run_reader(&mut reader)?
    };

    let mut writer = Writer::amend(path)?;
    writer.metadata_mut()?.row_spec = intuition.row_spec().clone();

    let headers = intuition.headers();
    if !headers.is_empty() {
        let schema = writer.schema_mut()?;
        schema.ensure_column_count(headers.len());
        for (i, header) in headers.iter().enumerate() {
            if !header.is_empty() {
                schema.column_mut(i)?.name = header.clone();
            }
        }
    }

    writer.close()?;
    Ok(intuition)
}

/// Hand windowed sample rows to a type intuiter and store its report
pub fn intuit_types<P, T>(path: P, intuiter: &mut T) -> Result<Vec<ColumnTypeInfo>>
where
    P: AsRef<Path>,
    T: TypeIntuiter,
{
    let path = path.as_ref();

    let infos = {
        let mut reader = Reader::open(path)
            .with_context(|| format!("Opening {} for type intuition", path.display()))?;
        let headers = reader.headers();
        let rows: Vec<Row> = reader
            .rows()?
            .take(TYPE_SAMPLE_ROWS)
            .collect::<Result<_>>()?;
        intuiter.intuit(&headers, &rows)?
    };

    let mut writer = Writer::amend(path)?;
    writer.schema_mut()?.apply_type_intuition(&infos);
    writer.metadata_mut()?.types = infos.clone();
    writer.close()?;

    log::debug!("Stored type intuition for {} columns", infos.len());
    Ok(infos)
}

/// Run a stats engine over the windowed rows and store the results
pub fn run_stats<P, E>(path: P, engine: &mut E) -> Result<IndexMap<String, ColumnStats>>
where
    P: AsRef<Path>,
    E: StatsEngine,
{
    let path = path.as_ref();

    let stats = {
        let mut reader = Reader::open(path)
            .with_context(|| format!("Opening {} for statistics", path.display()))?;
        let columns: Vec<(String, Option<DeclaredType>)> = reader
            .schema()
            .iter()
            .map(|c| (c.name.clone(), c.declared_type))
            .collect();
        engine.compute(&columns, &mut reader.rows()?)?
    };

    let mut writer = Writer::amend(path)?;
    writer.schema_mut()?.apply_stats(&stats);
    writer.close()?;

    log::debug!("Stored statistics for {} columns", stats.len());
    Ok(stats)
}
