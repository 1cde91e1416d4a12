//! Row-batch stream
//!
//! The whole data section is one gzip member. Each batch inside it is a
//! single MessagePack array of rows, so its length prefix frames it.

use crate::schema::ColumnRecord;
use crate::{Metadata, Result, Row, RowpackError, Schema};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Cursor, Read, Take, Write};

/// Serialize one batch
///
/// Nothing is written anywhere until the whole batch has encoded.
pub fn encode_batch(rows: &[Row]) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(rows)?)
}

/// Writes batches through one continuous compression stream
pub struct BatchEncoder<W: Write> {
    inner: GzEncoder<W>,
}

impl<W: Write> BatchEncoder<W> {
    /// Start the compressed stream at the current position of `writer`
    pub fn new(writer: W, level: u32) -> Self {
        Self {
            inner: GzEncoder::new(writer, Compression::new(level)),
        }
    }

    /// Write an already-encoded batch
    pub fn write_encoded(&mut self, encoded: &[u8]) -> Result<()> {
        self.inner.write_all(encoded)?;
        Ok(())
    }

    pub fn write_batch(&mut self, rows: &[Row]) -> Result<()> {
        let encoded = encode_batch(rows)?;
        self.write_encoded(&encoded)
    }

    /// End the stream and hand back the writer
    ///
    /// The gzip footer is written here, so the real end of the data section is
    /// only known after this returns.
    pub fn finish(self) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}

/// Reads batches back from `[data_start, data_end)`
///
/// The source is bounded to the data section and decoded as a single gzip
/// member, so trailer bytes after `data_end` are never taken for another
/// compressed member.
pub struct BatchDecoder<R: Read> {
    inner: BufReader<GzDecoder<Take<R>>>,
}

impl<R: Read> BatchDecoder<R> {
    /// `reader` must be positioned at the start of the data section
    pub fn new(reader: R, data_len: u64) -> Self {
        Self {
            inner: BufReader::new(GzDecoder::new(reader.take(data_len))),
        }
    }

    /// Next batch, or `None` at a clean end of stream
    pub fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let at_end = self
            .inner
            .fill_buf()
            .map_err(|e| RowpackError::decode(format!("Corrupt row data: {}", e)))?
            .is_empty();
        if at_end {
            return Ok(None);
        }

        let batch: Vec<Row> = rmp_serde::from_read(&mut self.inner)?;
        Ok(Some(batch))
    }
}

#[derive(Serialize)]
struct TrailerRef<'a> {
    meta: &'a Metadata,
    schema: Vec<ColumnRecord>,
}

#[derive(Deserialize)]
struct Trailer {
    #[serde(default)]
    meta: Metadata,
    #[serde(default)]
    schema: Vec<ColumnRecord>,
}

/// Serialize the `{meta, schema}` trailer block
pub fn encode_trailer(metadata: &Metadata, schema: &Schema) -> Result<Vec<u8>> {
    let trailer = TrailerRef {
        meta: metadata,
        schema: schema.to_rows(),
    };
    Ok(rmp_serde::to_vec_named(&trailer)?)
}

/// Decode a trailer block, which must be consumed exactly
pub fn decode_trailer(bytes: &[u8]) -> Result<(Metadata, Schema)> {
    let mut cursor = Cursor::new(bytes);
    let trailer: Trailer = rmp_serde::from_read(&mut cursor)
        .map_err(|e| RowpackError::format(format!("Unreadable trailer: {}", e)))?;

    if cursor.position() != bytes.len() as u64 {
        return Err(RowpackError::format(format!(
            "Trailer length mismatch: decoded {} of {} bytes",
            cursor.position(),
            bytes.len()
        )));
    }

    trailer.meta.validate()?;
    let schema = Schema::from_rows(trailer.schema)?;
    Ok((trailer.meta, schema))
}
