//! GGUF model file validation
//!
//! Reads just enough of the GGUF header to reject files llama.cpp would fail
//! on, before handing the path to the worker thread.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// `GGUF` as a little-endian u32
pub const GGUF_MAGIC: u32 = 0x4655_4747;

/// Errors from model file validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    NotFound(String),

    #[error("Failed to read model file: {0}")]
    Io(String),

    #[error("Not a GGUF file (magic {0:#010x})")]
    InvalidMagic(u32),

    #[error("Unsupported GGUF version {0}")]
    UnsupportedVersion(u32),

    #[error("GGUF header truncated")]
    Truncated,
}

/// Header fields of a GGUF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgufMetadata {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
}

/// Validates the GGUF header at `path`
pub fn validate_gguf(path: &Path) -> Result<GgufMetadata, ModelError> {
    if !path.is_file() {
        return Err(ModelError::NotFound(path.display().to_string()));
    }

    let mut file = File::open(path).map_err(|e| ModelError::Io(e.to_string()))?;
    let mut header = [0u8; 24];
    let read = read_up_to(&mut file, &mut header).map_err(|e| ModelError::Io(e.to_string()))?;
    parse_header(&header[..read])
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn parse_header(bytes: &[u8]) -> Result<GgufMetadata, ModelError> {
    let magic = read_u32(bytes, 0)?;
    if magic != GGUF_MAGIC {
        return Err(ModelError::InvalidMagic(magic));
    }

    let version = read_u32(bytes, 4)?;
    match version {
        // v1 used 32-bit counts
        1 => Ok(GgufMetadata {
            version,
            tensor_count: read_u32(bytes, 8)? as u64,
            metadata_kv_count: read_u32(bytes, 12)? as u64,
        }),
        2 | 3 => Ok(GgufMetadata {
            version,
            tensor_count: read_u64(bytes, 8)?,
            metadata_kv_count: read_u64(bytes, 16)?,
        }),
        other => Err(ModelError::UnsupportedVersion(other)),
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, ModelError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ModelError::Truncated)
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, ModelError> {
    bytes
        .get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or(ModelError::Truncated)
}
