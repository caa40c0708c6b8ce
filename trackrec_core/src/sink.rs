//! Destinations for exported documents.

use crate::SinkError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Accepts a rendered document and stores it under `file_name`
pub trait FileSink {
    /// Returns where the document ended up
    fn write_document(&mut self, file_name: &str, contents: &str) -> Result<PathBuf, SinkError>;
}

/// Writes documents into a directory, creating it on first use
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSink for DirectorySink {
    fn write_document(&mut self, file_name: &str, contents: &str) -> Result<PathBuf, SinkError> {
        let bare = Path::new(file_name).file_name().map(|n| n == file_name) == Some(true);
        if !bare {
            return Err(SinkError::InvalidFileName(file_name.to_string()));
        }

        let path = self.dir.join(file_name);
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        temp.write_all(contents.as_bytes()).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&path).map_err(|e| io_err(e.error))?;

        tracing::info!("Wrote {} bytes to {:?}", contents.len(), path);
        Ok(path)
    }
}
