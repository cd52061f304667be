use std::io;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::error::Result;
use crate::{Error, ErrorKind};

use super::{LocalStorage, MemoryStorage};

pub struct FileMetadata {
    pub size: u64,
}

/// Backend behind a [`FileIO`]. Paths are scheme-relative.
pub trait Storage: Send + Sync + std::fmt::Debug {
    fn exists(&self, path: &str) -> Result<bool>;
    fn metadata(&self, path: &str) -> Result<FileMetadata>;

    fn reader(&self, path: &str) -> Result<Box<dyn FileRead>>;
    fn writer(&self, path: &str) -> Result<Box<dyn FileWrite>>;

    fn scheme(&self) -> &str;
}

/// Entry point for reading and writing table files.
#[derive(Clone, Debug)]
pub struct FileIO {
    storage: Arc<dyn Storage>,
}

impl FileIO {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn local() -> Self {
        Self::new(Arc::new(LocalStorage::default()))
    }

    pub fn from_scheme(scheme: &str) -> Result<Self> {
        match scheme {
            "memory" => Ok(Self::memory()),
            "file" | "" => Ok(Self::local()),
            _ => Err(Error::new(
                ErrorKind::FeatureUnsupported,
                format!("Unsupported storage scheme: {}", scheme),
            )),
        }
    }

    pub fn from_path(path: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(path.as_ref()).or_else(|e| {
            Url::from_file_path(path.as_ref()).map_err(|_| {
                Error::new(
                    ErrorKind::DataInvalid,
                    "Input is neither a valid url nor path",
                )
                .with_context("input", path.as_ref().to_string())
                .with_source(e)
            })
        })?;
        Self::from_scheme(url.scheme())
    }

    pub fn new_input(&self, path: impl AsRef<str>) -> Result<InputFile> {
        let path_str = path.as_ref().to_string();
        let relative_path_pos = self.prefix_len(&path_str);
        Ok(InputFile {
            op: self.storage.clone(),
            path: path_str,
            relative_path_pos,
        })
    }

    pub fn new_output(&self, path: impl AsRef<str>) -> Result<OutputFile> {
        let path_str = path.as_ref().to_string();
        let relative_path_pos = self.prefix_len(&path_str);
        Ok(OutputFile {
            op: self.storage.clone(),
            path: path_str,
            relative_path_pos,
        })
    }

    /// Check if a file exists at the given path.
    pub fn exists(&self, path: impl AsRef<str>) -> Result<bool> {
        let path_str = path.as_ref();
        let relative_path_pos = self.prefix_len(path_str);
        self.storage.exists(&path_str[relative_path_pos..])
    }

    /// Returns the length of the URL prefix (e.g. `scheme://`) to strip from paths.
    fn prefix_len(&self, path: &str) -> usize {
        let prefix = format!("{}://", self.storage.scheme());
        if path.starts_with(&prefix) {
            prefix.len()
        } else {
            0
        }
    }
}

/// Readable file handle. The underlying resource is released on drop.
pub trait FileRead: io::Read + Send + std::fmt::Debug {}

/// Input file is used for reading from files.
#[derive(Debug)]
pub struct InputFile {
    op: Arc<dyn Storage>,
    path: String,
    relative_path_pos: usize,
}

impl InputFile {
    pub fn location(&self) -> &str {
        &self.path
    }

    pub fn exists(&self) -> Result<bool> {
        self.op.exists(&self.path[self.relative_path_pos..])
    }

    pub fn metadata(&self) -> Result<FileMetadata> {
        self.op.metadata(&self.path[self.relative_path_pos..])
    }

    /// Read the whole file.
    pub fn read(&self) -> Result<Bytes> {
        let mut reader = self.reader()?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf.into())
    }

    pub fn reader(&self) -> Result<Box<dyn FileRead>> {
        self.op.reader(&self.path[self.relative_path_pos..])
    }
}

/// Writable file handle. `close` flushes and releases the resource; writes
/// are not visible to readers before close.
pub trait FileWrite: io::Write + Send {
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug)]
pub struct OutputFile {
    op: Arc<dyn Storage>,
    path: String,
    relative_path_pos: usize,
}

impl OutputFile {
    pub fn location(&self) -> &str {
        &self.path
    }

    pub fn exists(&self) -> Result<bool> {
        self.op.exists(&self.path[self.relative_path_pos..])
    }

    pub fn to_input_file(self) -> InputFile {
        InputFile {
            op: self.op,
            path: self.path,
            relative_path_pos: self.relative_path_pos,
        }
    }

    pub fn write(&self, bs: &[u8]) -> Result<()> {
        use std::io::Write;
        let mut writer = self.writer()?;
        writer.write_all(bs)?;
        writer.close()
    }

    pub fn writer(&self) -> Result<Box<dyn FileWrite>> {
        self.op.writer(&self.path[self.relative_path_pos..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_stripped_for_matching_scheme() {
        let io = FileIO::memory();
        let output = io.new_output("memory://warehouse/a.avro").unwrap();
        output.write(b"abc").unwrap();

        assert!(io.exists("memory://warehouse/a.avro").unwrap());
        assert!(io.exists("warehouse/a.avro").unwrap());

        let input = io.new_input("memory://warehouse/a.avro").unwrap();
        assert_eq!(input.read().unwrap().as_ref(), b"abc");
        assert_eq!(input.metadata().unwrap().size, 3);
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = FileIO::from_path("s3://bucket/table").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureUnsupported);
    }
}
