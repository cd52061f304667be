use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use super::file_io::{FileMetadata, FileRead, FileWrite, Storage};
use crate::error::Result;
use crate::{Error, ErrorKind};

#[derive(Debug, Default)]
pub struct LocalStorage;

impl Storage for LocalStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(Path::new(path).exists())
    }

    fn metadata(&self, path: &str) -> Result<FileMetadata> {
        let metadata = fs::metadata(path)?;
        Ok(FileMetadata {
            size: metadata.len(),
        })
    }

    fn reader(&self, path: &str) -> Result<Box<dyn FileRead>> {
        let file = File::open(path).map_err(|e| {
            Error::new(ErrorKind::Io, "failed to open file")
                .with_context("path", path.to_string())
                .with_source(e)
        })?;
        Ok(Box::new(LocalFileRead { file }))
    }

    fn writer(&self, path: &str) -> Result<Box<dyn FileWrite>> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(LocalFileWrite { file: Some(file) }))
    }

    fn scheme(&self) -> &str {
        "file"
    }
}

#[derive(Debug)]
pub struct LocalFileRead {
    file: File,
}

impl Read for LocalFileRead {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl FileRead for LocalFileRead {}

pub struct LocalFileWrite {
    file: Option<File>,
}

impl Write for LocalFileWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.file {
            Some(file) => file.write(buf),
            None => Err(std::io::Error::other("file already closed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl FileWrite for LocalFileWrite {
    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}
