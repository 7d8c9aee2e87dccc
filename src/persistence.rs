//! Append-only log: every committed write is a line of
//! `<txid> <op> <kv>\n`, where `op` is `+` or `-` and `kv` is
//! `k~<key>` or `k~<key> v~<value>`.
//!
//! Keys and values can themselves contain `~`, which would otherwise be
//! indistinguishable from the `k~`/`v~` delimiters. Both are escaped by
//! doubling every literal `~` to `~~` before writing; decoding only treats
//! a lone (non-doubled) ` v~` as the value delimiter.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::item::Item;

pub(crate) enum LogEntry {
    Set(Item),
    Delete(String),
}

pub(crate) struct Persistence {
    file: File,
}

impl Persistence {
    pub(crate) fn open(path: &Path) -> Result<Persistence> {
        let file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
        file.lock_exclusive()?;
        Ok(Persistence { file })
    }

    /// Replays the log from the start, in file order. Later entries for the
    /// same key supersede earlier ones; the caller applies that ordering.
    ///
    /// A line that fails to parse is fatal unless `skip_errors` is set, in
    /// which case it is dropped (logged at `warn`) and loading continues.
    pub(crate) fn load(&mut self, skip_errors: bool) -> Result<Vec<LogEntry>> {
        self.file.seek(SeekFrom::Start(0))?;
        let reader = BufReader::new(&self.file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(entry) => entries.push(entry),
                Err(err) if skip_errors => {
                    log::warn!("skipping malformed persistence-log line: {}", err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(entries)
    }

    /// Appends one line per commit in `commits`, in an unspecified order,
    /// all tagged with the same transaction id.
    pub(crate) fn append(&mut self, txid: u128, commits: &HashMap<String, Option<Item>>) -> Result<()> {
        let mut buf = String::new();
        for (key, item) in commits {
            match item {
                Some(item) => {
                    buf.push_str(&format!("{} + k~{} v~{}\n", txid, escape(key), escape(&item.value)));
                }
                None => {
                    buf.push_str(&format!("{} - k~{}\n", txid, escape(key)));
                }
            }
        }
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(buf.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

fn escape(s: &str) -> String {
    s.replace('~', "~~")
}

fn parse_line(line: &str) -> Result<LogEntry> {
    let mut parts = line.splitn(3, ' ');
    let txid = parts.next().ok_or_else(|| malformed(line))?;
    let op = parts.next().ok_or_else(|| malformed(line))?;
    let kv = parts.next().ok_or_else(|| malformed(line))?;
    let _ = txid;

    let (key, value) = decode_kv(kv)?;
    match op {
        "+" => {
            let value = value.ok_or_else(|| malformed(line))?;
            Ok(LogEntry::Set(Item::new(key, value)))
        }
        "-" => Ok(LogEntry::Delete(key)),
        _ => Err(malformed(line)),
    }
}

fn malformed(line: &str) -> Error {
    Error::IncorrectDatabaseFileFormat(line.to_string())
}

/// Decodes `k~<key>` or `k~<key> v~<value>`, undoing `~~` escaping as it
/// scans so slicing never has to reckon with escape boundaries afterwards.
fn decode_kv(s: &str) -> Result<(String, Option<String>)> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 2 || chars[0] != 'k' || chars[1] != '~' {
        return Err(malformed(s));
    }

    let mut i = 2;
    let mut key = String::new();
    let mut value_start = None;
    while i < chars.len() {
        if chars[i] == '~' && i + 1 < chars.len() && chars[i + 1] == '~' {
            key.push('~');
            i += 2;
            continue;
        }
        let is_value_marker = chars[i] == ' '
            && i + 2 < chars.len()
            && chars[i + 1] == 'v'
            && chars[i + 2] == '~'
            && !(i + 3 < chars.len() && chars[i + 3] == '~');
        if is_value_marker {
            value_start = Some(i + 3);
            break;
        }
        key.push(chars[i]);
        i += 1;
    }

    match value_start {
        None => Ok((key, None)),
        Some(start) => {
            let mut value = String::new();
            let mut j = start;
            while j < chars.len() {
                if chars[j] == '~' && j + 1 < chars.len() && chars[j + 1] == '~' {
                    value.push('~');
                    j += 2;
                } else {
                    value.push(chars[j]);
                    j += 1;
                }
            }
            Ok((key, Some(value)))
        }
    }
}
