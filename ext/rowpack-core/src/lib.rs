//! Appendable binary container for tabular rows
//!
//! `rowpack-core` stores a table in one file: a fixed-size header, a
//! compressed stream of MessagePack row batches, and a trailer holding the
//! schema and a metadata document. Rows are written once, in a single pass;
//! afterwards only the trailer can change.
//!
//! # Key Components
//!
//! - **Header**: fixed 42-byte record of counts and section offsets
//!   - Written provisionally at create time, rewritten at close
//!   - A file whose writer never closed fails to open
//!
//! - **Writer**: create a file and append rows, or amend an existing one
//!   - Rows are buffered and flushed in batches through one gzip stream
//!   - Amending rewrites only the trailer and header, never row data
//!   - Files or any [`traits::StreamHandle`] through [`traits::Storage`]
//!
//! - **Reader**: lazy, restartable row iteration
//!   - Raw rows, rows inside the data window, or rows tagged with their role
//!   - Lazy filtering and projection through [`Reader::select`]
//!
//! - **Schema** and **Metadata**: column descriptors with statistics, and a
//!   typed, versioned metadata document including the [`RowSpec`]
//!
//! - **Row intuition**: guesses header, comment and footer rows so the data
//!   window can be set without looking at the file
//!
//! # Example Usage
//!
//! ```no_run
//! use rowpack_core::{Reader, RowValue, Writer};
//!
//! # fn main() -> rowpack_core::Result<()> {
//! let mut writer = Writer::create("cities.rp")?;
//! writer.schema_mut()?.add_column("city", None);
//! writer.schema_mut()?.add_column("population", None);
//! writer.append_row(vec![RowValue::from("Oslo"), RowValue::from(709_037)])?;
//! writer.finalize()?;
//! writer.close()?;
//!
//! let mut reader = Reader::open("cities.rp")?;
//! for row in reader.rows()? {
//!     println!("{:?}", row?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod header;
pub mod ingest;
pub mod intuit;
pub mod metadata;
pub mod reader;
pub mod schema;
pub mod traits;
pub mod value;
pub mod writer;

#[cfg(test)]
pub mod test_utils;

pub use error::{ErrorContext, Result, RowpackError};
pub use header::Header;
pub use intuit::{RowIntuiter, RowIntuiterBuilder, RowIntuition};
pub use metadata::{Metadata, RowEdit, RowRole, RowSpec};
pub use reader::{FileInfo, Reader};
pub use schema::{Column, ColumnKey, ColumnStats, DeclaredType, Schema};
pub use value::{Row, RowValue};
pub use writer::{Writer, WriterBuilder};
