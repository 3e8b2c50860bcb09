mod reader;
pub mod sources;
mod writer;

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use vicmap_core::document::Document;

use crate::reader::{DxfError, DxfParser, decode};

pub use sources::{GeoJsonFloodProvider, GeoJsonRoadProvider};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
    #[error("failed to encode document: {0}")]
    EncodeError(#[source] std::io::Error),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError>;
}

/// DXF 读写入口。写出 AC1009（R12）ASCII 格式，读取仅覆盖本工具写出的实体子集。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 把文档编码为写盘用的 DXF 字节（ANSI_1252 代码页）。
    pub fn to_dxf_bytes(&self, document: &Document) -> Result<Vec<u8>, IoError> {
        writer::encode_document(document).map_err(IoError::EncodeError)
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let data = decode(&bytes);
        let parser = DxfParser::new(&data);
        parser.parse().map_err(|err| match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        })
    }
}

impl DocumentSaver for DxfFacade {
    /// 先写入同目录下的临时文件再原子重命名；任何失败路径都不会留下半成品文件。
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError> {
        let write_error = |source: std::io::Error| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        let bytes = self.to_dxf_bytes(document)?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".vicmap-")
            .suffix(".dxf.tmp")
            .tempfile_in(directory)
            .map_err(write_error)?;
        {
            let mut out = BufWriter::new(temp.as_file_mut());
            out.write_all(&bytes).map_err(write_error)?;
            out.flush().map_err(write_error)?;
        }
        temp.persist(path).map_err(|err| write_error(err.error))?;
        debug!(path = %path.display(), "DXF 已写出");
        Ok(())
    }
}
