/*!
 * File Content Handle
 * In-memory buffer, open host file, or a lazily opened host path
 */

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Largest in-memory content; bigger files belong on disk
pub const MAX_MEMORY_LEN: u64 = 1 << 30;

fn memory_len(len: u64) -> io::Result<usize> {
    if len > MAX_MEMORY_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} bytes is too large for an in-memory file", len),
        ));
    }
    usize::try_from(len).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Bytes behind a regular file
///
/// `LazyPath` is how cached originals start out: nothing is opened until the
/// first read, write or seek, at which point the handle becomes `File`.
#[derive(Debug)]
pub enum Content {
    Memory(Cursor<Vec<u8>>),
    File(File),
    LazyPath(PathBuf),
}

impl Default for Content {
    fn default() -> Self {
        Content::empty()
    }
}

impl Content {
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Content::Memory(Cursor::new(Vec::new()))
    }

    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Content::Memory(Cursor::new(bytes))
    }

    #[inline]
    #[must_use]
    pub fn lazy(path: impl Into<PathBuf>) -> Self {
        Content::LazyPath(path.into())
    }

    #[inline]
    #[must_use]
    pub const fn is_lazy(&self) -> bool {
        matches!(self, Content::LazyPath(_))
    }

    fn materialize(&mut self) -> io::Result<()> {
        if let Content::LazyPath(path) = self {
            let file = OpenOptions::new().read(true).write(true).open(&*path)?;
            *self = Content::File(file);
        }
        Ok(())
    }

    /// Size in bytes; a lazy path is measured without being opened
    pub fn len(&self) -> io::Result<u64> {
        match self {
            Content::Memory(cursor) => Ok(cursor.get_ref().len() as u64),
            Content::File(file) => Ok(file.metadata()?.len()),
            Content::LazyPath(path) => Ok(std::fs::metadata(path)?.len()),
        }
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read up to `size` bytes starting at `offset`
    pub fn read_at(&mut self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(size.min(1 << 20));
        Read::by_ref(self).take(size as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Write all of `data` at `offset`, extending the content if needed
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        if let Content::Memory(_) = self {
            memory_len(offset.saturating_add(data.len() as u64))?;
        }
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(data)?;
        Ok(data.len())
    }

    /// Whole value, leaving the current position untouched
    pub fn snapshot(&mut self) -> io::Result<Vec<u8>> {
        match self {
            Content::Memory(cursor) => Ok(cursor.get_ref().clone()),
            _ => {
                let pos = self.stream_position()?;
                self.seek(SeekFrom::Start(0))?;
                let mut buf = Vec::new();
                self.read_to_end(&mut buf)?;
                self.seek(SeekFrom::Start(pos))?;
                Ok(buf)
            }
        }
    }

    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.materialize()?;
        match self {
            Content::Memory(cursor) => {
                cursor.get_mut().resize(memory_len(len)?, 0);
                if cursor.position() > len {
                    cursor.set_position(len);
                }
                Ok(())
            }
            Content::File(file) => file.set_len(len),
            Content::LazyPath(_) => Ok(()),
        }
    }

    /// Flush and release the handle
    pub fn close(mut self) -> io::Result<()> {
        self.flush()
    }
}

impl Read for Content {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.materialize()?;
        match self {
            Content::Memory(cursor) => cursor.read(buf),
            Content::File(file) => file.read(buf),
            Content::LazyPath(_) => Ok(0),
        }
    }
}

impl Write for Content {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.materialize()?;
        match self {
            Content::Memory(cursor) => cursor.write(buf),
            Content::File(file) => file.write(buf),
            Content::LazyPath(_) => Ok(0),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Content::File(file) => file.flush(),
            _ => Ok(()),
        }
    }
}

impl Seek for Content {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if let (Content::LazyPath(_), SeekFrom::Start(0)) = (&*self, pos) {
            return Ok(0);
        }
        self.materialize()?;
        match self {
            Content::Memory(cursor) => cursor.seek(pos),
            Content::File(file) => file.seek(pos),
            Content::LazyPath(_) => Ok(0),
        }
    }
}
