//! Byte source port
//!
//! A [`ByteSource`] is the opaque "file" behind an upload item: a name, a
//! size, a content type and the ability to read an arbitrary byte range.
//! Strategies never read a whole large file into memory; they ask for the
//! slice they are about to send.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::domain::SourceInfo;

/// Content type used when nothing better is known
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Random-access source of the bytes to upload
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// File name sent to the document store
    fn name(&self) -> &str;

    /// Total size in bytes
    fn size(&self) -> u64;

    /// MIME type sent to the document store
    fn content_type(&self) -> &str;

    /// Reads the half-open byte range `[start, end)`
    ///
    /// # Errors
    /// Returns an I/O error if the range is out of bounds or the underlying
    /// storage cannot be read.
    async fn slice(&self, start: u64, end: u64) -> std::io::Result<Vec<u8>>;

    /// Descriptor of this source for item snapshots
    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name().to_string(),
            size: self.size(),
            content_type: self.content_type().to_string(),
        }
    }
}

fn check_range(start: u64, end: u64, size: u64) -> std::io::Result<()> {
    if start > end || end > size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("range {start}..{end} out of bounds for {size} bytes"),
        ));
    }
    Ok(())
}

// ============================================================================
// MemorySource
// ============================================================================

/// In-memory byte source
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    content_type: String,
    data: Vec<u8>,
}

impl MemorySource {
    /// Creates a source over `data`
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    async fn slice(&self, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
        check_range(start, end, self.size())?;
        Ok(self.data[start as usize..end as usize].to_vec())
    }
}

// ============================================================================
// FileSource
// ============================================================================

/// Byte source backed by a local file
///
/// The size is captured when the source is opened; each slice opens the file
/// and seeks, so the source holds no file descriptor between reads.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    content_type: String,
    size: u64,
}

impl FileSource {
    /// Opens `path`, taking the file name from its last component
    ///
    /// # Errors
    /// Returns an error if the path has no file name, cannot be stat'ed or is
    /// not a regular file.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;

        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        Ok(Self {
            name,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            size: metadata.len(),
            path,
        })
    }

    /// Overrides the content type
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    async fn slice(&self, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
        check_range(start, end, self.size)?;

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;

        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}
