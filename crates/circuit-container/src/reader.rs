// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Read access to a finished container
//!
//! The footer is loaded once on open; dataset values are read on demand,
//! window by window, so a reader never holds more than the requested rows.

use crate::layout::{read_layout, DatasetLayout, GroupLayout, Storage};
use crate::{Column, ColumnData, ContainerError, Result};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

pub struct ContainerReader {
    path: PathBuf,
    file: Mutex<File>,
    root: GroupLayout,
}

impl std::fmt::Debug for ContainerReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("path", &self.path)
            .finish()
    }
}

impl ContainerReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let (root, _) = read_layout(&mut file)?;
        tracing::trace!(target: "circuit-container", "Opened {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &GroupLayout {
        &self.root
    }

    pub fn has_group(&self, path: &str) -> bool {
        self.root.group(path).is_some()
    }

    pub fn has_dataset(&self, path: &str) -> bool {
        self.root.dataset(path).is_some()
    }

    pub fn group(&self, path: &str) -> Result<&GroupLayout> {
        self.root
            .group(path)
            .ok_or_else(|| ContainerError::NotFound(format!("{}:{}", self.path.display(), path)))
    }

    pub fn dataset(&self, path: &str) -> Result<&DatasetLayout> {
        self.root
            .dataset(path)
            .ok_or_else(|| ContainerError::NotFound(format!("{}:{}", self.path.display(), path)))
    }

    /// Names of the subgroups of `path`, sorted
    pub fn group_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.group(path)?.groups.keys().cloned().collect())
    }

    /// Names of the datasets directly under `path`, sorted
    pub fn dataset_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.group(path)?.datasets.keys().cloned().collect())
    }

    /// Attribute of a group or dataset
    pub fn attr(&self, path: &str, name: &str) -> Option<&str> {
        if let Some(dataset) = self.root.dataset(path) {
            return dataset.attrs.get(name).map(String::as_str);
        }
        self.root
            .group(path)
            .and_then(|g| g.attrs.get(name))
            .map(String::as_str)
    }

    /// Number of rows of a dataset
    pub fn rows(&self, path: &str) -> Result<u64> {
        Ok(self.dataset(path)?.rows)
    }

    pub fn read_all(&self, path: &str) -> Result<Column> {
        let rows = self.rows(path)?;
        self.read_window(path, 0..rows)
    }

    /// Integer dataset as u64 ids
    pub fn read_u64(&self, path: &str) -> Result<Vec<u64>> {
        self.read_all(path)?.to_u64_vec()
    }

    /// Rows `[start, end)` of a dataset, clamped to its length
    pub fn read_window(&self, path: &str, window: Range<u64>) -> Result<Column> {
        let layout = self.dataset(path)?;
        let end = window.end.min(layout.rows);
        let start = window.start.min(end);
        let width = layout.width as u64;

        match &layout.storage {
            Storage::Fixed { offset } => {
                let item = layout.dtype.item_size().ok_or_else(|| {
                    ContainerError::Corrupted(format!("{} has fixed storage but dtype utf8", path))
                })? as u64;
                let bytes = self.read_bytes(
                    offset + start * width * item,
                    (end - start) * width * item,
                )?;
                Column::from_le_bytes(layout.dtype, layout.width, &bytes)
            }
            Storage::Utf8 {
                offsets_offset,
                bytes_offset,
                bytes_len,
            } => {
                let first = start * width;
                let count = (end - start) * width;
                let raw = self.read_bytes(offsets_offset + first * 8, (count + 1) * 8)?;
                let offsets: Vec<u64> = raw
                    .chunks_exact(8)
                    .map(|c| {
                        let mut b = [0u8; 8];
                        b.copy_from_slice(c);
                        u64::from_le_bytes(b)
                    })
                    .collect();
                let lo = offsets[0];
                let hi = offsets[offsets.len() - 1];
                if hi < lo || hi > *bytes_len {
                    return Err(ContainerError::Corrupted(format!(
                        "string offsets of {} out of range",
                        path
                    )));
                }
                let data = self.read_bytes(bytes_offset + lo, hi - lo)?;
                let mut values = Vec::with_capacity(count as usize);
                for pair in offsets.windows(2) {
                    let span = pair[0]
                        .checked_sub(lo)
                        .zip(pair[1].checked_sub(lo))
                        .filter(|(a, b)| b >= a);
                    let Some((a, b)) = span else {
                        return Err(ContainerError::Corrupted(format!(
                            "string offsets of {} are not monotonic",
                            path
                        )));
                    };
                    let (a, b) = (a as usize, b as usize);
                    let value = std::str::from_utf8(&data[a..b]).map_err(|e| {
                        ContainerError::Corrupted(format!("invalid utf8 in {}: {}", path, e))
                    })?;
                    values.push(value.to_string());
                }
                Column::new(ColumnData::Utf8(values), layout.width)
            }
        }
    }

    fn read_bytes(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len as usize];
        if len == 0 {
            return Ok(buffer);
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}
