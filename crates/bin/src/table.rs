//! Reading and writing harmonized CSV tables.

use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors while moving tables to and from disk
#[derive(Debug, Error)]
pub(crate) enum TableError {
    /// File could not be opened or created
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Polars failed to parse or write the CSV
    #[error("CSV error in {path}: {source}")]
    Polars {
        path: PathBuf,
        source: PolarsError,
    },
}

/// Read a CSV with a header row
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame, TableError> {
    let polars_err = |source| TableError::Polars {
        path: path.to_path_buf(),
        source,
    };
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(polars_err)?
        .finish()
        .map_err(polars_err)
}

/// Write a CSV with a header row, creating parent directories
pub(crate) fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), TableError> {
    let io_err = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = File::create(path).map_err(io_err)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|source| TableError::Polars {
            path: path.to_path_buf(),
            source,
        })
}
