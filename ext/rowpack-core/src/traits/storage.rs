use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

/// A seekable read/write byte stream backing one rowpack file
pub trait StreamHandle: Read + Write + Seek {
    /// Truncate or extend the stream to exactly `len` bytes
    fn set_len(&mut self, len: u64) -> std::io::Result<()>;
}

impl StreamHandle for File {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        File::set_len(self, len)
    }
}

impl StreamHandle for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

/// Opens handles for paths
///
/// Readers and writers only ever see the handles; where the bytes live is up
/// to the implementation.
pub trait Storage {
    type Handle: StreamHandle;

    /// Create (or truncate) a file for a new write session
    fn create(&self, path: &Path) -> std::io::Result<Self::Handle>;

    /// Open an existing file read-only
    fn open_read(&self, path: &Path) -> std::io::Result<Self::Handle>;

    /// Open an existing file for in-place update, without truncating
    fn open_update(&self, path: &Path) -> std::io::Result<Self::Handle>;

    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

/// The local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl Storage for LocalStorage {
    type Handle = File;

    fn create(&self, path: &Path) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    fn open_read(&self, path: &Path) -> std::io::Result<File> {
        File::open(path)
    }

    fn open_update(&self, path: &Path) -> std::io::Result<File> {
        OpenOptions::new().read(true).write(true).open(path)
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}
