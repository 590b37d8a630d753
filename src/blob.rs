//! Whitespace-tokenized blob records.
//!
//! Trained parameters are dumped one value per line, each line carrying the
//! value's indices followed by the value itself. This module only splits and
//! types the fields; the per-file schemas live next to the types they fill.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum BlobError {
    Io {
        path: String,
        reason: String,
    },
    FieldCount {
        line: usize,
        expected: &'static str,
        got: usize,
        record: String,
    },
    InvalidField {
        line: usize,
        field: usize,
        value: String,
        reason: String,
    },
    IndexOutOfRange {
        line: usize,
        what: &'static str,
        index: usize,
        limit: usize,
    },
    ReservedField {
        line: usize,
        field: usize,
        value: String,
    },
    DuplicateRecord {
        line: usize,
        what: &'static str,
        key: Vec<usize>,
    },
    MissingRecords {
        what: &'static str,
        missing: usize,
        first: Vec<usize>,
    },
}

impl std::error::Error for BlobError {}

impl Display for BlobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlobError::Io { path, reason } => write!(f, "Failed to read '{}': {}", path, reason),
            BlobError::FieldCount {
                line,
                expected,
                got,
                record,
            } => write!(
                f,
                "Line {}: expected {} fields, got {} ('{}')",
                line, expected, got, record
            ),
            BlobError::InvalidField {
                line,
                field,
                value,
                reason,
            } => write!(
                f,
                "Line {}: field {} ('{}') is invalid: {}",
                line, field, value, reason
            ),
            BlobError::IndexOutOfRange {
                line,
                what,
                index,
                limit,
            } => write!(
                f,
                "Line {}: {} index {} out of range (limit {})",
                line, what, index, limit
            ),
            BlobError::ReservedField { line, field, value } => write!(
                f,
                "Line {}: reserved field {} must be 0, got '{}'",
                line, field, value
            ),
            BlobError::DuplicateRecord { line, what, key } => {
                write!(f, "Line {}: duplicate {} record {:?}", line, what, key)
            }
            BlobError::MissingRecords {
                what,
                missing,
                first,
            } => write!(
                f,
                "{} {} records missing (first missing {:?})",
                missing, what, first
            ),
        }
    }
}

/// One non-blank line of a blob file.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub line: usize,
    fields: Vec<String>,
}

impl Record {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn text(&self) -> String {
        self.fields.join(" ")
    }

    pub fn expect_fields(
        &self,
        expected: &'static str,
        allowed: &[usize],
    ) -> Result<(), BlobError> {
        if allowed.contains(&self.fields.len()) {
            Ok(())
        } else {
            Err(BlobError::FieldCount {
                line: self.line,
                expected,
                got: self.fields.len(),
                record: self.text(),
            })
        }
    }

    fn field(&self, field: usize) -> Result<&str, BlobError> {
        self.fields
            .get(field)
            .map(String::as_str)
            .ok_or_else(|| BlobError::FieldCount {
                line: self.line,
                expected: "more",
                got: self.fields.len(),
                record: self.text(),
            })
    }

    /// Parses `field` as an index and checks it against `limit`.
    pub fn index(
        &self,
        field: usize,
        what: &'static str,
        limit: usize,
    ) -> Result<usize, BlobError> {
        let raw = self.field(field)?;
        let index = raw.parse::<usize>().map_err(|e| BlobError::InvalidField {
            line: self.line,
            field,
            value: raw.to_string(),
            reason: e.to_string(),
        })?;
        if index >= limit {
            return Err(BlobError::IndexOutOfRange {
                line: self.line,
                what,
                index,
                limit,
            });
        }
        Ok(index)
    }

    pub fn float(&self, field: usize) -> Result<f32, BlobError> {
        let raw = self.field(field)?;
        raw.parse::<f32>().map_err(|e| BlobError::InvalidField {
            line: self.line,
            field,
            value: raw.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fields that exist only to keep a blob dump's 4D layout must read `0`.
    pub fn reserved_zero(&self, field: usize) -> Result<(), BlobError> {
        let raw = self.field(field)?;
        match raw.parse::<i64>() {
            Ok(0) => Ok(()),
            _ => Err(BlobError::ReservedField {
                line: self.line,
                field,
                value: raw.to_string(),
            }),
        }
    }
}

pub fn parse_records<R: BufRead>(reader: R) -> Result<Vec<Record>, BlobError> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| BlobError::Io {
            path: String::from("<reader>"),
            reason: e.to_string(),
        })?;
        let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if fields.is_empty() {
            continue;
        }
        records.push(Record { line: i + 1, fields });
    }
    Ok(records)
}

pub fn read_records(path: &Path) -> Result<Vec<Record>, BlobError> {
    let io_error = |e: std::io::Error| BlobError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let file = File::open(path).map_err(io_error)?;
    parse_records(BufReader::new(file)).map_err(|e| match e {
        BlobError::Io { reason, .. } => BlobError::Io {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// Tracks which cells of a dense index space have been written, so a blob can
/// be required to define every cell exactly once.
#[derive(Debug)]
pub struct Coverage {
    what: &'static str,
    dims: Vec<usize>,
    seen: Vec<bool>,
}

impl Coverage {
    pub fn new(what: &'static str, dims: &[usize]) -> Self {
        Self {
            what,
            dims: dims.to_vec(),
            seen: vec![false; dims.iter().product()],
        }
    }

    fn flat(&self, key: &[usize]) -> usize {
        key.iter()
            .zip(self.dims.iter())
            .fold(0, |acc, (&k, &d)| acc * d + k)
    }

    fn unflat(&self, mut flat: usize) -> Vec<usize> {
        let mut key = vec![0; self.dims.len()];
        for (k, &d) in key.iter_mut().zip(self.dims.iter()).rev() {
            *k = flat % d;
            flat /= d;
        }
        key
    }

    /// Records `key` as seen. Fails on a key outside `dims` or one seen before.
    pub fn mark(&mut self, line: usize, key: &[usize]) -> Result<(), BlobError> {
        if key.len() != self.dims.len() {
            return Err(BlobError::FieldCount {
                line,
                expected: "one index per dimension",
                got: key.len(),
                record: format!("{:?}", key),
            });
        }
        if let Some((&index, &limit)) = key.iter().zip(self.dims.iter()).find(|(k, d)| k >= d) {
            return Err(BlobError::IndexOutOfRange {
                line,
                what: self.what,
                index,
                limit,
            });
        }
        let flat = self.flat(key);
        if self.seen[flat] {
            return Err(BlobError::DuplicateRecord {
                line,
                what: self.what,
                key: key.to_vec(),
            });
        }
        self.seen[flat] = true;
        Ok(())
    }

    pub fn finish(self) -> Result<(), BlobError> {
        let missing = self.seen.iter().filter(|&&s| !s).count();
        match self.seen.iter().position(|&s| !s) {
            None => Ok(()),
            Some(first) => Err(BlobError::MissingRecords {
                what: self.what,
                missing,
                first: self.unflat(first),
            }),
        }
    }
}
