//! Fortran sequential-record streams.
//!
//! Every record is framed as `i32 length | payload | i32 length`, in native
//! byte order. [`RecordReader`] skips or decodes one record at a time;
//! [`RecordWriter`] produces the same framing.
//!
//! A shard that has to be walked at several offsets at once is opened once as
//! a [`SharedShard`]; each [`ShardCursor`] keeps its own offset and reads with
//! positional I/O, so cursors never disturb each other.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytemuck::Pod;

use crate::error::{Result, SnapshotError};

const MARKER_BYTES: u64 = 4;

/// Records up to this size are skipped by reading through them, which keeps
/// a buffered reader's read-ahead intact.
const READ_THROUGH_BYTES: u64 = 64 * 1024;

/// Payload bytes reserved up front when the stream length is unknown.
const PREALLOC_BYTES: usize = 64 * 1024;

/// Reads length-prefixed records from a seekable stream.
pub struct RecordReader<R> {
    inner: R,
    path: PathBuf,
    end: Option<u64>,
}

impl<R: Read + Seek> RecordReader<R> {
    /// Wrap a stream; `path` is only used in error messages.
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            end: None,
        }
    }

    /// Declare the stream length, so a record whose leading marker claims
    /// more bytes than remain is rejected before anything is allocated.
    pub fn with_len(mut self, len: u64) -> Self {
        self.end = Some(len);
        self
    }

    /// Path this reader reports in errors.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current byte offset.
    pub fn position(&mut self) -> Result<u64> {
        let path = &self.path;
        self.inner
            .stream_position()
            .map_err(|e| SnapshotError::io(path, e))
    }

    /// Move to an absolute byte offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        let path = &self.path;
        self.inner
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|e| SnapshotError::io(path, e))
    }

    fn read_marker(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| SnapshotError::io(&self.path, e))?;
        Ok(i32::from_ne_bytes(buf))
    }

    fn check_trailer(&mut self, offset: u64, leading: i32) -> Result<()> {
        let trailing = self.read_marker()?;
        if trailing != leading {
            return Err(SnapshotError::RecordMarker {
                offset,
                leading,
                trailing,
            });
        }
        Ok(())
    }

    fn leading_len(&mut self, offset: u64) -> Result<i32> {
        let leading = self.read_marker()?;
        if leading < 0 {
            return Err(SnapshotError::RecordMarker {
                offset,
                leading,
                trailing: leading,
            });
        }
        if let Some(end) = self.end {
            // payload plus trailing marker
            let remaining = end.saturating_sub(offset + MARKER_BYTES);
            if leading as u64 + MARKER_BYTES > remaining {
                return Err(SnapshotError::RecordOverrun {
                    offset,
                    declared: leading as u64,
                    remaining: remaining.saturating_sub(MARKER_BYTES),
                });
            }
        }
        Ok(leading)
    }

    /// Skip `n` records, returning the number of bytes passed over.
    pub fn skip(&mut self, n: usize) -> Result<u64> {
        let mut skipped = 0;
        for _ in 0..n {
            let offset = self.position()?;
            let len = self.leading_len(offset)? as u64;
            if len <= READ_THROUGH_BYTES {
                let passed = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())
                    .map_err(|e| SnapshotError::io(&self.path, e))?;
                if passed < len {
                    return Err(SnapshotError::RecordOverrun {
                        offset,
                        declared: len,
                        remaining: passed,
                    });
                }
            } else {
                self.inner
                    .seek(SeekFrom::Current(len as i64))
                    .map_err(|e| SnapshotError::io(&self.path, e))?;
            }
            self.check_trailer(offset, len as i32)?;
            skipped += len + 2 * MARKER_BYTES;
        }
        Ok(skipped)
    }

    /// Read one record's payload as raw bytes.
    ///
    /// The buffer grows with the bytes actually read, so a corrupt leading
    /// marker cannot force a huge allocation.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let offset = self.position()?;
        let len = self.leading_len(offset)?;
        let mut payload = Vec::with_capacity((len as usize).min(PREALLOC_BYTES));
        let got = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut payload)
            .map_err(|e| SnapshotError::io(&self.path, e))?;
        if got < len as usize {
            return Err(SnapshotError::RecordOverrun {
                offset,
                declared: len as u64,
                remaining: got as u64,
            });
        }
        self.check_trailer(offset, len)?;
        Ok(payload)
    }

    /// Read one record as an array of plain values.
    pub fn read_array<T: Pod>(&mut self) -> Result<Vec<T>> {
        let offset = self.position()?;
        let payload = self.read_bytes()?;
        let elem_size = std::mem::size_of::<T>();
        if payload.len() % elem_size != 0 {
            return Err(SnapshotError::RecordLength {
                offset,
                bytes: payload.len(),
                elem_size,
            });
        }
        Ok(bytemuck::pod_collect_to_vec(&payload))
    }

    /// Read one record holding exactly one value.
    pub fn read_scalar<T: Pod>(&mut self) -> Result<T> {
        let offset = self.position()?;
        let values = self.read_array::<T>()?;
        match values.as_slice() {
            [v] => Ok(*v),
            _ => Err(SnapshotError::RecordLength {
                offset,
                bytes: values.len() * std::mem::size_of::<T>(),
                elem_size: std::mem::size_of::<T>(),
            }),
        }
    }

    /// Read a record of `i32` values.
    pub fn read_i32s(&mut self) -> Result<Vec<i32>> {
        self.read_array()
    }

    /// Read a record of `f64` values.
    pub fn read_f64s(&mut self) -> Result<Vec<f64>> {
        self.read_array()
    }

    /// Read a single-`i32` record.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_scalar()
    }

    /// Read a single-`f64` record.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_scalar()
    }
}

/// Writes length-prefixed records.
pub struct RecordWriter<W> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    /// Wrap a sink.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one record with the given payload.
    pub fn write_bytes(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = i32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record too large"))?;
        self.inner.write_all(&len.to_ne_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.write_all(&len.to_ne_bytes())
    }

    /// Write one record holding an array of plain values.
    pub fn write_array<T: Pod>(&mut self, values: &[T]) -> io::Result<()> {
        self.write_bytes(bytemuck::cast_slice(values))
    }

    /// Write a single-value record.
    pub fn write_scalar<T: Pod>(&mut self, value: T) -> io::Result<()> {
        self.write_array(std::slice::from_ref(&value))
    }

    /// Flush and hand back the sink.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// One opened shard file shared read-only between several cursors.
#[derive(Clone)]
pub struct SharedShard {
    file: Arc<File>,
    path: PathBuf,
    len: u64,
}

impl SharedShard {
    /// Open a shard for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SnapshotError::io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| SnapshotError::io(path, e))?
            .len();
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            len,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh cursor at offset zero.
    pub fn cursor(&self) -> ShardCursor {
        ShardCursor {
            file: Arc::clone(&self.file),
            pos: 0,
            len: self.len,
        }
    }

    /// A buffered record reader over a fresh cursor.
    pub fn records(&self) -> RecordReader<BufReader<ShardCursor>> {
        RecordReader::new(BufReader::new(self.cursor()), &self.path).with_len(self.len)
    }
}

/// Independent read position over a [`SharedShard`].
pub struct ShardCursor {
    file: Arc<File>,
    pos: u64,
    len: u64,
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

impl Read for ShardCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_at(&self.file, buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ShardCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
        };
        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of shard",
            )),
        }
    }
}
