//! General utilities shared by the format readers: a buffered-reader wrapper
//! and a parser for the "number-of-header-lines, then column names" shape
//! common to ORL and IDA legacy inventory files.
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Errors reading or interpreting the shared header shape of a legacy
/// inventory file. Format-specific readers (ORL/IDA/FF10) wrap this in their
/// own error enum rather than returning it directly.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("could not open {path}: {reason}")]
    CouldNotOpen { path: PathBuf, reason: String },
    #[error("could not read from {path}: {reason}")]
    CouldNotRead { path: PathBuf, reason: String },
    #[error("error in header format of {path}: {cause}")]
    Malformed { path: PathBuf, cause: String },
}

impl HeaderError {
    pub fn custom(path: impl Into<PathBuf>, cause: impl Display) -> Self {
        Self::Malformed { path: path.into(), cause: cause.to_string() }
    }
}

/// A wrapper around a [`BufRead`] that tracks the path it came from, so error
/// messages can name the offending file without threading the path
/// separately through every parsing function.
pub struct FileBuf<'p, F: BufRead> {
    reader: F,
    pub path: &'p Path,
}

impl<'p> FileBuf<'p, BufReader<File>> {
    pub fn open(file: &'p Path) -> Result<Self, HeaderError> {
        let f = File::open(file)
            .map_err(|e| HeaderError::CouldNotOpen { path: file.to_owned(), reason: e.to_string() })?;
        Ok(Self { reader: BufReader::new(f), path: file })
    }
}

impl<'p, F: BufRead> FileBuf<'p, F> {
    pub fn read_header_line(&mut self) -> Result<String, HeaderError> {
        let mut buf = String::new();
        self.read_line(&mut buf)
            .map_err(|e| HeaderError::CouldNotRead { path: self.path.to_owned(), reason: format!("{e} (while reading the header)") })?;
        Ok(buf)
    }

    pub fn read_data_line(&mut self) -> Result<String, HeaderError> {
        let mut buf = String::new();
        self.read_line(&mut buf)
            .map_err(|e| HeaderError::CouldNotRead { path: self.path.to_owned(), reason: format!("{e} (while reading the data)") })?;
        Ok(buf)
    }
}

impl<'p, F: BufRead> Deref for FileBuf<'p, F> {
    type Target = F;
    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<'p, F: BufRead> DerefMut for FileBuf<'p, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}

/// The shared header shape of ORL and IDA files: a comma- or
/// whitespace-delimited count line, optional metadata lines, then a column
/// header line.
#[derive(Debug, Clone)]
pub struct CommonHeader {
    pub nhead: usize,
    pub ncol: usize,
    pub column_names: Vec<String>,
}

/// Parse the first line of a legacy inventory file as a sequence of
/// whitespace-separated integers, requiring at least `min_numbers` of them.
pub fn get_file_shape_info<F: BufRead>(f: &mut FileBuf<'_, F>, min_numbers: usize) -> Result<Vec<usize>, HeaderError> {
    let mut buf = String::new();
    f.read_line(&mut buf)
        .map_err(|e| HeaderError::CouldNotRead { path: f.path.to_owned(), reason: e.to_string() })?;

    let mut numbers = vec![];
    for (i, s) in buf.trim().split_whitespace().enumerate() {
        numbers.push(
            s.parse::<usize>()
                .map_err(|_| HeaderError::Malformed { path: f.path.to_owned(), cause: format!("could not parse number at position {}: {s}", i + 1) })?,
        );
    }

    if numbers.len() < min_numbers {
        return Err(HeaderError::Malformed {
            path: f.path.to_owned(),
            cause: format!("expected at least {min_numbers} numbers, found {}", numbers.len()),
        });
    }

    Ok(numbers)
}

pub fn get_nhead_ncol<F: BufRead>(f: &mut FileBuf<'_, F>) -> Result<(usize, usize), HeaderError> {
    let nums = get_file_shape_info(f, 2)?;
    Ok((nums[0], nums[1]))
}

/// Read past the header block of a file following the "nhead line, then
/// column names on the last header line" convention, returning the parsed
/// shape. After this returns, the reader is positioned at the first data
/// line.
pub fn read_common_header<F: BufRead>(f: &mut FileBuf<'_, F>) -> Result<CommonHeader, HeaderError> {
    let (mut nhead, ncol) = get_nhead_ncol(f)?;
    nhead -= 1;

    while nhead > 1 {
        f.read_header_line()?;
        nhead -= 1;
    }

    let line = f.read_header_line()?;
    let column_names: Vec<String> = line.split_whitespace().map(|s| s.trim().to_owned()).collect();

    Ok(CommonHeader { nhead, ncol, column_names })
}
