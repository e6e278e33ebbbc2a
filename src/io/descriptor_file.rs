//! JSON descriptor dumps
//!
//! Extraction happens outside this crate, so descriptor sets arrive as
//! JSON files of the form
//! `{"length": L, "descriptors": [...], "discriminators": [...], "positions": [[x, y], ...]}`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::features::DescriptorSet;

#[derive(Debug, Error)]
pub enum DescriptorFileError {
    #[error("failed to open descriptor file {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("failed to create descriptor file {path}: {source}")]
    Create { path: PathBuf, source: std::io::Error },
    #[error("invalid descriptor file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("failed to write descriptor file {path}: {source}")]
    Write { path: PathBuf, source: serde_json::Error },
    #[error("failed to flush descriptor file {path}: {source}")]
    Flush { path: PathBuf, source: std::io::Error },
}

pub type Result<T> = std::result::Result<T, DescriptorFileError>;

/// Read a descriptor set, validating its row invariants
pub fn load_descriptor_set<P: AsRef<Path>>(path: P) -> Result<DescriptorSet> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| DescriptorFileError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| DescriptorFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a descriptor set as JSON
pub fn save_descriptor_set<P: AsRef<Path>>(set: &DescriptorSet, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| DescriptorFileError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, set).map_err(|source| DescriptorFileError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| DescriptorFileError::Flush {
        path: path.to_path_buf(),
        source,
    })
}
