use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use super::file_io::{FileMetadata, FileRead, FileWrite, Storage};
use crate::error::Result;
use crate::{Error, ErrorKind};

/// In-memory storage used by tests and demos.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    fs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        let fs = self
            .fs
            .read()
            .map_err(|_| Error::new(ErrorKind::Unexpected, "Lock poisoned"))?;
        Ok(fs.contains_key(path))
    }

    fn metadata(&self, path: &str) -> Result<FileMetadata> {
        let fs = self
            .fs
            .read()
            .map_err(|_| Error::new(ErrorKind::Unexpected, "Lock poisoned"))?;
        let bytes = fs.get(path).ok_or_else(|| {
            Error::new(ErrorKind::Io, "file not found").with_context("path", path.to_string())
        })?;
        Ok(FileMetadata {
            size: bytes.len() as u64,
        })
    }

    fn reader(&self, path: &str) -> Result<Box<dyn FileRead>> {
        let fs = self
            .fs
            .read()
            .map_err(|_| Error::new(ErrorKind::Unexpected, "Lock poisoned"))?;
        let bytes = fs.get(path).ok_or_else(|| {
            Error::new(ErrorKind::Io, "file not found").with_context("path", path.to_string())
        })?;
        Ok(Box::new(MemoryFileRead {
            cursor: Cursor::new(bytes.clone()),
        }))
    }

    fn writer(&self, path: &str) -> Result<Box<dyn FileWrite>> {
        Ok(Box::new(MemoryFileWrite {
            fs: self.fs.clone(),
            path: path.to_string(),
            buffer: Some(Vec::new()),
        }))
    }

    fn scheme(&self) -> &str {
        "memory"
    }
}

#[derive(Debug)]
pub struct MemoryFileRead {
    cursor: Cursor<Bytes>,
}

impl Read for MemoryFileRead {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl FileRead for MemoryFileRead {}

pub struct MemoryFileWrite {
    fs: Arc<RwLock<HashMap<String, Bytes>>>,
    path: String,
    buffer: Option<Vec<u8>>,
}

impl Write for MemoryFileWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.buffer {
            Some(buffer) => {
                buffer.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => Err(std::io::Error::other("file already closed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl FileWrite for MemoryFileWrite {
    fn close(&mut self) -> Result<()> {
        if let Some(buffer) = self.buffer.take() {
            let mut fs = self
                .fs
                .write()
                .map_err(|_| Error::new(ErrorKind::Unexpected, "Lock poisoned"))?;
            fs.insert(self.path.clone(), buffer.into());
        }
        Ok(())
    }
}
