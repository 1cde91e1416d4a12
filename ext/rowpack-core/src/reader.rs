//! Reading rowpack files

use crate::codec::{decode_trailer, BatchDecoder};
use crate::header::{Header, HEADER_SIZE, VERSION};
use crate::traits::{LocalStorage, Storage};
use crate::{Metadata, Result, Row, RowRole, RowValue, RowpackError, Schema};
use indexmap::IndexMap;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// Reader over any source implementing Read + Seek
///
/// Opening reads the header and trailer only. Rows are decoded lazily by the
/// iterators, each of which seeks back to the start of the data section, so
/// a reader can be iterated any number of times.
pub struct Reader<R> {
    inner: R,
    header: Header,
    schema: Schema,
    metadata: Metadata,
}

impl Reader<File> {
    /// Open a file on the local filesystem
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(&LocalStorage, path)
    }
}

impl<R: Read + Seek> Reader<R> {
    pub fn open_with<S, P>(storage: &S, path: P) -> Result<Self>
    where
        S: Storage<Handle = R>,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        log::debug!("Opening rowpack file {}", path.display());
        Self::new(storage.open_read(path)?)
    }

    /// Load the header and trailer from `inner`
    ///
    /// Fails with [`RowpackError::Format`] on a bad magic, a header that was
    /// never finalized, or a trailer that is truncated or has trailing bytes.
    pub fn new(mut inner: R) -> Result<Self> {
        let file_size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        let mut buf = [0u8; HEADER_SIZE];
        read_exact_or_format(&mut inner, &mut buf, "header")?;
        let header = Header::decode(&buf)?;
        header.validate(file_size)?;

        if header.version != VERSION {
            log::warn!(
                "File format version {} differs from supported version {}",
                header.version,
                VERSION
            );
        }

        let trailer_len = usize::try_from(header.trailer_len())
            .map_err(|_| RowpackError::format("Trailer too large to load"))?;
        inner.seek(SeekFrom::Start(header.data_end))?;
        let mut trailer = vec![0u8; trailer_len];
        read_exact_or_format(&mut inner, &mut trailer, "trailer")?;
        let (metadata, schema) = decode_trailer(&trailer)?;

        log::debug!(
            "Loaded header ({} rows x {} columns) and {} byte trailer",
            header.row_count,
            header.column_count,
            trailer_len
        );

        Ok(Self {
            inner,
            header,
            schema,
            metadata,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Column names in schema order
    pub fn headers(&self) -> Vec<String> {
        self.schema.headers()
    }

    pub fn row_count(&self) -> usize {
        self.header.row_count as usize
    }

    pub fn column_count(&self) -> usize {
        self.header.column_count as usize
    }

    pub fn is_finalized(&self) -> bool {
        self.metadata.is_finalized()
    }

    /// Inclusive data window, or `None` when no row falls in it
    pub fn data_window(&self) -> Option<(usize, usize)> {
        self.metadata.row_spec.window(self.row_count())
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            version: self.header.version,
            row_count: self.row_count(),
            column_count: self.column_count(),
            data_start: self.header.data_start,
            data_end: self.header.data_end,
            trailer_end: self.header.trailer_end,
            window: self.data_window(),
            headers: self.headers(),
            finalized: self.is_finalized(),
        }
    }

    /// Every physical row in storage order, ignoring the row window
    pub fn raw_rows(&mut self) -> Result<RawRowIterator<'_, R>> {
        self.inner.seek(SeekFrom::Start(self.header.data_start))?;
        let data_len = self.header.data_end - self.header.data_start;

        Ok(RawRowIterator {
            decoder: BatchDecoder::new(&mut self.inner, data_len),
            current_batch: Vec::new().into_iter(),
            position: 0,
            expected_rows: self.header.row_count as usize,
            done: false,
        })
    }

    /// Rows inside the data window
    ///
    /// Rows before the window are decoded and skipped so physical positions
    /// stay correct; iteration stops once the window is passed.
    pub fn rows(&mut self) -> Result<RowIterator<'_, R>> {
        let window = self.data_window();
        Ok(RowIterator {
            raw: self.raw_rows()?,
            window,
        })
    }

    /// Every physical row tagged with its index and role
    pub fn classified_rows(
        &mut self,
    ) -> Result<impl Iterator<Item = Result<(usize, RowRole, Row)>> + '_> {
        let row_spec = self.metadata.row_spec.clone();
        let row_count = self.row_count();
        let raw = self.raw_rows()?;

        Ok(raw.enumerate().map(move |(index, row)| {
            row.map(|row| (index, row_spec.role_of(index, row_count), row))
        }))
    }

    /// Windowed rows keyed by column name
    ///
    /// Short rows are padded with nulls; cells beyond the schema are dropped.
    pub fn records(
        &mut self,
    ) -> Result<impl Iterator<Item = Result<IndexMap<String, RowValue>>> + '_> {
        let headers = self.headers();
        let rows = self.rows()?;

        Ok(rows.map(move |row| {
            row.map(|row| {
                let mut values = row.into_iter();
                headers
                    .iter()
                    .map(|h| (h.clone(), values.next().unwrap_or(RowValue::Null)))
                    .collect()
            })
        }))
    }

    /// Filter and project windowed rows
    ///
    /// Both are applied lazily per row. Projected names are resolved before
    /// any row is read, so an unknown column fails up front with
    /// [`RowpackError::NotFound`].
    pub fn select<'a, P>(
        &'a mut self,
        predicate: Option<P>,
        projection: Option<&[&str]>,
    ) -> Result<impl Iterator<Item = Result<Row>> + 'a>
    where
        P: FnMut(&[RowValue]) -> bool + 'a,
    {
        let indices = projection
            .map(|names| {
                names
                    .iter()
                    .map(|name| self.schema.column(*name).map(|c| c.position))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        let mut predicate = predicate;
        let rows = self.rows()?;

        Ok(rows.filter_map(move |row| {
            let row = match row {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };

            if let Some(keep) = predicate.as_mut() {
                if !keep(&row) {
                    return None;
                }
            }

            Some(Ok(match &indices {
                Some(indices) => indices
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(RowValue::Null))
                    .collect(),
                None => row,
            }))
        }))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Drop the handle, keeping what was loaded from the file
    pub fn into_parts(self) -> (Header, Schema, Metadata) {
        (self.header, self.schema, self.metadata)
    }
}

fn read_exact_or_format<R: Read>(inner: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    inner.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => RowpackError::format(format!(
            "Truncated {}: expected {} bytes",
            what,
            buf.len()
        )),
        _ => RowpackError::Io(e),
    })
}

/// Iterator over every physical row
pub struct RawRowIterator<'a, R: Read> {
    decoder: BatchDecoder<&'a mut R>,
    current_batch: std::vec::IntoIter<Row>,
    position: usize,
    expected_rows: usize,
    done: bool,
}

impl<R: Read> RawRowIterator<'_, R> {
    /// Physical index of the next row
    pub fn position(&self) -> usize {
        self.position
    }
}

impl<R: Read> Iterator for RawRowIterator<'_, R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.current_batch.next() {
                self.position += 1;
                return Some(Ok(row));
            }

            if self.done {
                return None;
            }

            // Need to fetch next batch
            match self.decoder.next_batch() {
                Ok(Some(batch)) => self.current_batch = batch.into_iter(),
                Ok(None) => {
                    self.done = true;
                    if self.position != self.expected_rows {
                        log::warn!(
                            "Data section held {} rows but header records {}",
                            self.position,
                            self.expected_rows
                        );
                    }
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Iterator over the rows inside the data window
pub struct RowIterator<'a, R: Read> {
    raw: RawRowIterator<'a, R>,
    window: Option<(usize, usize)>,
}

impl<R: Read> Iterator for RowIterator<'_, R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, end) = self.window?;
        loop {
            let index = self.raw.position();
            if index > end {
                return None;
            }

            let row = self.raw.next()?;
            if index >= start {
                return Some(row);
            }
            if row.is_err() {
                return Some(row);
            }
        }
    }
}

/// Summary of an open file
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub version: u16,
    pub row_count: usize,
    pub column_count: usize,
    pub data_start: u64,
    pub data_end: u64,
    pub trailer_end: u64,
    pub window: Option<(usize, usize)>,
    pub headers: Vec<String>,
    pub finalized: bool,
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "version:   {}", self.version)?;
        writeln!(f, "rows:      {}", self.row_count)?;
        writeln!(f, "columns:   {}", self.column_count)?;
        writeln!(
            f,
            "data:      {}..{} ({} bytes)",
            self.data_start,
            self.data_end,
            self.data_end - self.data_start
        )?;
        writeln!(
            f,
            "trailer:   {}..{} ({} bytes)",
            self.data_end,
            self.trailer_end,
            self.trailer_end - self.data_end
        )?;
        match self.window {
            Some((start, end)) => writeln!(f, "window:    {}..={}", start, end)?,
            None => writeln!(f, "window:    empty")?,
        }
        writeln!(f, "finalized: {}", self.finalized)?;
        write!(f, "headers:   {}", self.headers.join(", "))
    }
}
