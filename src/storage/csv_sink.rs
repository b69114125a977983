//! CSV record sink
//!
//! The header is taken from the first record ever written to the file. Later
//! rows are aligned to that header by field name. A final row that lacks its
//! line terminator was cut short by a crash; readers ignore it and the first
//! append of a process truncates it away.

use crate::storage::atomic::ensure_parent_dir;
use crate::storage::traits::{RecordSink, StorageResult};
use crate::storage::Record;
use csv::{ByteRecord, ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Append-only CSV file of records
pub struct CsvRecordSink {
    path: PathBuf,
    key_field: String,
    header: Option<Vec<String>>,
}

impl CsvRecordSink {
    /// Creates a sink for the file at `path`; nothing is touched until the first append
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    /// * `key_field` - Column holding the dedup key
    pub fn new(path: impl Into<PathBuf>, key_field: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key_field: key_field.into(),
            header: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_empty_file(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true)
    }

    /// Byte offset where an unterminated final row starts, if the file has one
    fn torn_tail_offset(&self) -> StorageResult<Option<u64>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok(None);
        }

        file.seek(SeekFrom::Start(0))?;
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(file);
        let mut row = ByteRecord::new();
        let mut start = 0;
        loop {
            let position = reader.position().byte();
            if !reader.read_byte_record(&mut row)? {
                break;
            }
            start = position;
        }

        Ok(Some(start))
    }

    /// Cuts an unterminated final row off the file
    fn drop_torn_tail(&self) -> StorageResult<()> {
        let Some(offset) = self.torn_tail_offset()? else {
            return Ok(());
        };

        tracing::warn!(
            "{} ends with an incomplete row; truncating it at byte {}",
            self.path.display(),
            offset
        );
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(offset)?;
        file.sync_data()?;

        Ok(())
    }

    /// Reads the header and every complete row
    fn read_complete(&self) -> StorageResult<Option<(StringRecord, Vec<StringRecord>)>> {
        if self.is_empty_file() {
            return Ok(None);
        }
        let torn_at = self.torn_tail_offset()?;
        if torn_at == Some(0) {
            return Ok(None);
        }

        let mut reader = ReaderBuilder::new().flexible(true).from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();
        let mut row = StringRecord::new();
        loop {
            if matches!(torn_at, Some(offset) if reader.position().byte() >= offset) {
                break;
            }
            if !reader.read_record(&mut row)? {
                break;
            }
            rows.push(row.clone());
        }

        Ok(Some((headers, rows)))
    }

    /// Reads the header row of an existing, non-empty file
    fn read_header(&self) -> StorageResult<Option<Vec<String>>> {
        if self.is_empty_file() {
            return Ok(None);
        }

        let mut reader = ReaderBuilder::new().flexible(true).from_path(&self.path)?;
        let header = reader.headers()?.iter().map(str::to_string).collect();
        Ok(Some(header))
    }

    fn write_row(&self, header: &[String], write_header: bool, record: &Record) -> StorageResult<()> {
        let (row, drifted) = align_row(header, record);
        if !drifted.is_empty() {
            tracing::warn!(
                "Record has fields missing from the CSV header {:?}; appending them after the header columns",
                drifted
            );
        }

        ensure_parent_dir(&self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        if write_header {
            writer.write_record(header)?;
        }
        writer.write_record(&row)?;
        writer.flush()?;
        writer.get_ref().sync_data()?;

        Ok(())
    }
}

impl RecordSink for CsvRecordSink {
    fn append(&mut self, record: &Record) -> StorageResult<()> {
        if self.header.is_none() {
            self.drop_torn_tail()?;
            self.header = self.read_header()?;
        }

        let (header, new_file) = match self.header.take() {
            Some(header) => (header, false),
            None => (record.field_names().map(str::to_string).collect(), true),
        };

        // On failure the cached header stays empty and is re-read from disk next time
        self.write_row(&header, new_file, record)?;
        if new_file {
            tracing::debug!(
                "Created {} with {} columns",
                self.path.display(),
                header.len()
            );
        }
        self.header = Some(header);

        Ok(())
    }

    fn load_existing_keys(&self) -> StorageResult<HashSet<String>> {
        let mut keys = HashSet::new();
        let Some((headers, rows)) = self.read_complete()? else {
            return Ok(keys);
        };

        let Some(key_index) = headers.iter().position(|h| h == self.key_field) else {
            tracing::warn!(
                "{} has no '{}' column; no records count as already saved",
                self.path.display(),
                self.key_field
            );
            return Ok(keys);
        };

        for row in &rows {
            if let Some(key) = row.get(key_index).map(str::trim) {
                if !key.is_empty() {
                    keys.insert(key.to_string());
                }
            }
        }

        Ok(keys)
    }

    fn count_records(&self) -> StorageResult<u64> {
        Ok(self
            .read_complete()?
            .map_or(0, |(_, rows)| rows.len() as u64))
    }
}

/// Lays a record out in header order; returns the row and the names of fields
/// the header does not know about (their values trail the row)
fn align_row<'a>(header: &'a [String], record: &'a Record) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut row: Vec<&str> = header
        .iter()
        .map(|name| record.get(name).unwrap_or(""))
        .collect();
    let mut drifted = Vec::new();

    for (name, value) in record.iter() {
        if !header.iter().any(|h| h == name) {
            drifted.push(name);
            row.push(value);
        }
    }

    (row, drifted)
}
