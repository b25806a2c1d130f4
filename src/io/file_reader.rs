use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of RangeReader.
///
/// One file handle is shared by all requests; seek+read pairs are serialized
/// behind a mutex so concurrent tiles never interleave their cursor moves.
pub struct FileRangeReader {
    file: Mutex<File>,
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open `path` and record its size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| file_error(&path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| file_error(&path, e))?
            .len();
        let identifier = format!("file://{}", path.display());

        Ok(Self {
            file: Mutex::new(file),
            path,
            size,
            identifier,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn file_error(path: &Path, err: std::io::Error) -> IoError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return IoError::NotFound(path.display().to_string());
    }
    IoError::File {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = BytesMut::zeroed(len);
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| file_error(&self.path, e))?;
        file.read_exact(&mut buf)
            .await
            .map_err(|e| file_error(&self.path, e))?;

        Ok(buf.freeze())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
