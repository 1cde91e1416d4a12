//! Writing and amending rowpack files

use crate::codec::{encode_batch, encode_trailer, BatchEncoder};
use crate::header::{Header, HEADER_SIZE};
use crate::traits::{LocalStorage, Storage, StreamHandle};
use crate::{Metadata, Reader, Result, Row, RowpackError, Schema};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

// Default configuration constants
const DEFAULT_BATCH_SIZE: usize = 10_000;
const DEFAULT_COMPRESSION_LEVEL: u32 = 9;
const DEFAULT_WIDTH_SAMPLE_ROWS: usize = 100;
const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Builder for creating a configured Writer
pub struct WriterBuilder {
    batch_size: usize,
    compression_level: u32,
    width_sample_rows: usize,
    schema: Schema,
    metadata: Metadata,
}

impl Default for WriterBuilder {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            width_sample_rows: DEFAULT_WIDTH_SAMPLE_ROWS,
            schema: Schema::new(),
            metadata: Metadata::default(),
        }
    }
}

impl WriterBuilder {
    /// Create a new WriterBuilder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows `append_row` buffers before flushing a batch
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Gzip level, 0 (store) to 9 (best)
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(MAX_COMPRESSION_LEVEL);
        self
    }

    /// Rows inspected per batch when tracking the column count
    pub fn with_width_sample_rows(mut self, rows: usize) -> Self {
        self.width_sample_rows = rows;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Start a new file on `handle`, discarding anything it held
    pub fn build<H: StreamHandle>(self, mut handle: H) -> Result<Writer<H>> {
        let header = Header::provisional();

        handle.set_len(0)?;
        handle.seek(SeekFrom::Start(0))?;
        handle.write_all(&header.encode())?;

        let mut header = header;
        header.data_start = HEADER_SIZE as u64;

        // A new file has no complete row data yet
        let mut metadata = self.metadata;
        metadata.process.finalized = false;
        if metadata.about.create_time.is_none() {
            metadata.about.create_time = Some(jiff::Timestamp::now());
        }

        log::debug!(
            "Started rowpack stream at offset {} (batch_size={}, level={})",
            header.data_start,
            self.batch_size,
            self.compression_level
        );

        Ok(Writer {
            session: Session::Creating(BatchEncoder::new(handle, self.compression_level)),
            header,
            schema: self.schema,
            metadata,
            buffered_rows: Vec::new(),
            batch_size: self.batch_size,
            width_sample_rows: self.width_sample_rows,
        })
    }

    /// Create (or truncate) a file on the local filesystem
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<Writer<File>> {
        self.create_with(&LocalStorage, path)
    }

    pub fn create_with<S: Storage, P: AsRef<Path>>(
        self,
        storage: &S,
        path: P,
    ) -> Result<Writer<S::Handle>> {
        let path = path.as_ref();
        log::info!("Creating rowpack file {}", path.display());
        let handle = storage.create(path)?;
        self.build(handle)
    }
}

enum Session<H: StreamHandle> {
    /// New file; rows go through the open compression stream
    Creating(BatchEncoder<H>),
    /// Existing file; only trailer and header may change
    Amending(H),
    Closed,
}

/// Writes one rowpack file
///
/// A writer either creates a file, appending rows until [`Writer::close`], or
/// amends an existing one, where only the schema and metadata can change.
/// The header is written last, so a file whose writer never closed keeps its
/// provisional header and fails to open.
pub struct Writer<H: StreamHandle = File> {
    session: Session<H>,
    header: Header,
    schema: Schema,
    metadata: Metadata,
    buffered_rows: Vec<Row>,
    batch_size: usize,
    width_sample_rows: usize,
}

impl Writer<File> {
    /// Create a file with default settings
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        WriterBuilder::new().create(path)
    }

    /// Reopen a local file to amend its schema and metadata
    pub fn amend<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::amend_with(&LocalStorage, path)
    }
}

impl<H: StreamHandle> Writer<H> {
    /// Start a new file on `handle` with default settings
    pub fn new(handle: H) -> Result<Self> {
        WriterBuilder::new().build(handle)
    }

    /// Reopen a file from `storage` for amendment
    ///
    /// The file is loaded through a [`Reader`] first, which is released
    /// before the handle is reopened for update.
    pub fn amend_with<S, P>(storage: &S, path: P) -> Result<Self>
    where
        S: Storage<Handle = H>,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let (header, schema, metadata) = Reader::new(storage.open_read(path)?)?.into_parts();
        if !metadata.is_finalized() {
            log::warn!("Amending {} although it was never finalized", path.display());
        }
        log::info!(
            "Amending rowpack file {} ({} rows)",
            path.display(),
            header.row_count
        );

        let handle = storage.open_update(path)?;
        Ok(Self::amending(handle, header, schema, metadata))
    }

    /// Amend the file held by `handle`
    pub fn amend_handle(mut handle: H) -> Result<Self> {
        let (header, schema, metadata) = Reader::new(&mut handle)?.into_parts();
        if !metadata.is_finalized() {
            log::warn!("Amending a file that was never finalized");
        }
        Ok(Self::amending(handle, header, schema, metadata))
    }

    fn amending(handle: H, header: Header, schema: Schema, metadata: Metadata) -> Self {
        Self {
            session: Session::Amending(handle),
            header,
            schema,
            metadata,
            buffered_rows: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            width_sample_rows: DEFAULT_WIDTH_SAMPLE_ROWS,
        }
    }

    /// Append a single row
    ///
    /// Rows are buffered and written in batches of the configured size.
    pub fn append_row(&mut self, row: Row) -> Result<()> {
        self.ensure_writable()?;
        self.buffered_rows.push(row);

        if self.buffered_rows.len() >= self.batch_size {
            self.flush_buffered_rows()?;
        }

        Ok(())
    }

    /// Write `rows` directly as one batch
    ///
    /// Any buffered rows are flushed first so storage order matches call
    /// order. The batch is encoded in full before any byte is written.
    pub fn append_rows(&mut self, rows: &[Row]) -> Result<()> {
        self.ensure_writable()?;
        self.flush_buffered_rows()?;
        self.write_batch(rows)
    }

    /// Flush buffered rows into the compression stream
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.flush_buffered_rows()
    }

    fn flush_buffered_rows(&mut self) -> Result<()> {
        if self.buffered_rows.is_empty() {
            return Ok(());
        }

        let rows = std::mem::take(&mut self.buffered_rows);
        self.write_batch(&rows)
    }

    fn write_batch(&mut self, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let row_count = u32::try_from(rows.len())
            .ok()
            .and_then(|n| self.header.row_count.checked_add(n))
            .ok_or_else(|| {
                RowpackError::data_validation(format!(
                    "Batch of {} rows would overflow the row count of {}",
                    rows.len(),
                    self.header.row_count
                ))
            })?;

        let encoded = encode_batch(rows)?;

        let encoder = match &mut self.session {
            Session::Creating(encoder) => encoder,
            Session::Amending(_) => {
                return Err(RowpackError::not_writable("Rows cannot be appended while amending"))
            }
            Session::Closed => return Err(RowpackError::Closed),
        };
        encoder.write_encoded(&encoded)?;

        let width = rows
            .iter()
            .take(self.width_sample_rows)
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        let width = u32::try_from(width).unwrap_or(u32::MAX);

        self.header.row_count = row_count;
        self.header.column_count = self.header.column_count.max(width);

        log::debug!(
            "Flushed batch of {} rows ({} bytes encoded, {} rows total)",
            rows.len(),
            encoded.len(),
            self.header.row_count
        );
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.session {
            Session::Creating(_) if self.metadata.process.finalized => Err(
                RowpackError::not_writable("Rows cannot be appended after finalize"),
            ),
            Session::Creating(_) => Ok(()),
            Session::Amending(_) => Err(RowpackError::not_writable(
                "Rows cannot be appended while amending",
            )),
            Session::Closed => Err(RowpackError::Closed),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.session {
            Session::Closed => Err(RowpackError::Closed),
            _ => Ok(()),
        }
    }

    /// Replace the schema
    ///
    /// Written at close when creating, immediately when amending.
    pub fn set_schema(&mut self, schema: Schema) -> Result<()> {
        self.ensure_open()?;
        self.schema = schema;
        self.persist_if_amending()
    }

    /// Replace the metadata document
    pub fn set_metadata(&mut self, metadata: Metadata) -> Result<()> {
        self.ensure_open()?;
        metadata.validate()?;
        self.metadata = metadata;
        self.persist_if_amending()
    }

    /// Merge free-form entries into the metadata
    pub fn merge_metadata<I, K>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        self.ensure_open()?;
        self.metadata.merge(entries);
        self.persist_if_amending()
    }

    /// Edit the schema in place
    ///
    /// Changes are persisted at close, in both sessions.
    pub fn schema_mut(&mut self) -> Result<&mut Schema> {
        self.ensure_open()?;
        Ok(&mut self.schema)
    }

    /// Edit the metadata in place; persisted at close
    pub fn metadata_mut(&mut self) -> Result<&mut Metadata> {
        self.ensure_open()?;
        Ok(&mut self.metadata)
    }

    /// Mark row data as complete. Idempotent.
    pub fn finalize(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.metadata.process.finalized {
            self.metadata.process.finalized = true;
            log::debug!("Finalized after {} rows", self.header.row_count);
        }
        self.persist_if_amending()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Header as it stands; offsets are final only after close
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Rows written so far, including buffered ones
    pub fn row_count(&self) -> usize {
        self.header.row_count as usize + self.buffered_rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.header.column_count as usize
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.session, Session::Creating(_)) && !self.metadata.process.finalized
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.session, Session::Closed)
    }

    fn persist_if_amending(&mut self) -> Result<()> {
        if let Session::Amending(handle) = &mut self.session {
            write_trailer_and_header(handle, &mut self.header, &mut self.schema, &self.metadata)?;
        }
        Ok(())
    }

    /// Close the writer and write the trailer and final header
    ///
    /// This must be called for the file to be readable. Any later call fails
    /// with [`RowpackError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.finish_session().map(drop)
    }

    /// Close and hand back the underlying handle
    pub fn into_inner(mut self) -> Result<H> {
        self.finish_session()
    }

    fn finish_session(&mut self) -> Result<H> {
        if let Session::Creating(_) = self.session {
            self.flush_buffered_rows()?;
        }

        match std::mem::replace(&mut self.session, Session::Closed) {
            Session::Creating(encoder) => {
                let mut handle = encoder.finish()?;
                self.header.data_end = handle.stream_position()?;
                write_trailer_and_header(
                    &mut handle,
                    &mut self.header,
                    &mut self.schema,
                    &self.metadata,
                )?;
                Ok(handle)
            }
            Session::Amending(mut handle) => {
                write_trailer_and_header(
                    &mut handle,
                    &mut self.header,
                    &mut self.schema,
                    &self.metadata,
                )?;
                Ok(handle)
            }
            Session::Closed => Err(RowpackError::Closed),
        }
    }
}

impl<H: StreamHandle> Drop for Writer<H> {
    fn drop(&mut self) {
        if let Session::Creating(_) = self.session {
            log::warn!(
                "Writer dropped without close() after {} rows; file left incomplete",
                self.row_count()
            );
        }
    }
}

/// Rewrite the trailer at `data_end`, then the header
///
/// Never writes inside `[data_start, data_end)`.
fn write_trailer_and_header<H: StreamHandle>(
    handle: &mut H,
    header: &mut Header,
    schema: &mut Schema,
    metadata: &Metadata,
) -> Result<()> {
    schema.ensure_column_count(header.column_count as usize);
    header.column_count = header
        .column_count
        .max(u32::try_from(schema.len()).unwrap_or(u32::MAX));

    let trailer = encode_trailer(metadata, schema)?;

    handle.seek(SeekFrom::Start(header.data_end))?;
    handle.write_all(&trailer)?;
    header.trailer_end = header.data_end + trailer.len() as u64;
    handle.set_len(header.trailer_end)?;

    handle.seek(SeekFrom::Start(0))?;
    handle.write_all(&header.encode())?;
    handle.flush()?;

    log::info!(
        "Wrote {} rows x {} columns (data {}..{}, trailer ends at {})",
        header.row_count,
        header.column_count,
        header.data_start,
        header.data_end,
        header.trailer_end
    );
    Ok(())
}
