//! Line-oriented row files
//!
//! A row file holds one record per line. Files can be far larger than
//! memory, so everything here streams: readers move forward one line at a
//! time and writers only append.

use std::path::{Path, PathBuf};

use fit_core::{Error, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, instrument};
use uuid::Uuid;

const CHUNK_SIZE: usize = 1 << 16;

/// Handle to a line-oriented numeric file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFile {
    path: PathBuf,
}

impl RowFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Exact number of rows.
    ///
    /// Counts newline-terminated lines plus a final unterminated line.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn line_count(&self) -> Result<u64> {
        let mut file = open_existing(&self.path).await?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut lines = 0u64;
        let mut last = None;

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
            last = Some(buf[n - 1]);
        }

        if matches!(last, Some(b) if b != b'\n') {
            lines += 1;
        }
        debug!(lines, "Counted rows");
        Ok(lines)
    }

    /// First row with its line terminator removed, or `None` for an empty file
    pub async fn first_line(&self) -> Result<Option<String>> {
        let mut reader = self.reader().await?;
        reader.next_line().await
    }

    /// Open a forward-only reader
    pub async fn reader(&self) -> Result<RowReader> {
        let file = open_existing(&self.path).await?;
        Ok(RowReader {
            inner: BufReader::with_capacity(CHUNK_SIZE, file),
            path: self.path.clone(),
            lines_read: 0,
        })
    }

    /// Create (or truncate) the file for writing
    pub async fn create(&self) -> Result<RowWriter> {
        let file = File::create(&self.path).await?;
        Ok(RowWriter::wrap(file, &self.path))
    }

    /// Open the file for appending, creating it if needed
    pub async fn append(&self) -> Result<RowWriter> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        Ok(RowWriter::wrap(file, &self.path))
    }
}

/// Forward-only line reader
#[derive(Debug)]
pub struct RowReader {
    inner: BufReader<File>,
    path: PathBuf,
    lines_read: u64,
}

impl RowReader {
    /// Read the next line, terminator included, into `buf`.
    ///
    /// Returns `false` at end of file.
    pub async fn read_raw(&mut self, buf: &mut Vec<u8>) -> Result<bool> {
        buf.clear();
        let n = self.inner.read_until(b'\n', buf).await?;
        if n == 0 {
            return Ok(false);
        }
        self.lines_read += 1;
        Ok(true)
    }

    /// Read the next line with its terminator removed
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if !self.read_raw(&mut buf).await? {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| Error::malformed(&self.path, self.lines_read, "not valid UTF-8"))
    }

    /// Lines consumed so far; equals the 1-based number of the last line read
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Append-only line writer
#[derive(Debug)]
pub struct RowWriter {
    inner: BufWriter<File>,
    path: PathBuf,
    lines_written: u64,
}

impl RowWriter {
    fn wrap(file: File, path: &Path) -> Self {
        Self {
            inner: BufWriter::with_capacity(CHUNK_SIZE, file),
            path: path.to_path_buf(),
            lines_written: 0,
        }
    }

    /// Write bytes exactly as given (normally one raw line from a reader)
    pub async fn write_raw(&mut self, line: &[u8]) -> Result<()> {
        self.inner.write_all(line).await?;
        self.lines_written += line.iter().filter(|&&b| b == b'\n').count() as u64;
        Ok(())
    }

    /// Write `line` followed by a newline
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.lines_written += 1;
        Ok(())
    }

    /// Flush and sync to disk, returning the number of lines written
    pub async fn finish(mut self) -> Result<u64> {
        self.inner.flush().await?;
        self.inner.get_mut().sync_all().await?;
        debug!(path = %self.path.display(), lines = self.lines_written, "Row file finished");
        Ok(self.lines_written)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Concatenate `sources` in order into `dest`, returning the row count of `dest`.
///
/// The result is assembled in a temporary sibling and renamed into place, so
/// `dest` is never observed half-written. A newline is inserted after any
/// source that lacks one so rows of adjacent sources never merge.
#[instrument(skip(sources), fields(dest = %dest.display(), sources = sources.len()))]
pub async fn concat(dest: &Path, sources: &[PathBuf]) -> Result<u64> {
    let temp = temp_sibling(dest);
    let file = File::create(&temp).await?;
    let mut out = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut rows = 0u64;

    for source in sources {
        let mut input = open_existing(source).await?;
        let mut last = None;
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            rows += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
            last = Some(buf[n - 1]);
        }
        if matches!(last, Some(b) if b != b'\n') {
            out.write_all(b"\n").await?;
            rows += 1;
        }
    }

    out.flush().await?;
    out.get_mut().sync_all().await?;
    drop(out);

    fs::rename(&temp, dest).await?;
    debug!(rows, "Concatenation complete");
    Ok(rows)
}

pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4()
    );
    path.with_file_name(temp_name)
}

pub(crate) async fn open_existing(path: &Path) -> Result<File> {
    File::open(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::PathNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io(e)
        }
    })
}
