// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Incremental container writer
//!
//! Datasets are created empty and grown by appends. Appended rows are
//! staged in spool files next to the output, so memory stays bounded by
//! the largest single append. `finish` lays the staged segments out after
//! the existing data section and rewrites the footer.
//!
//! Removing a group that holds stored data makes `finish` compact the file:
//! the surviving segments are copied into a fresh file that replaces the
//! original, so reruns against a shared output do not accumulate dead bytes.

use crate::layout::{
    read_layout, split_leaf, split_path, write_footer, DatasetLayout, GroupLayout, Storage,
};
use crate::{
    Column, ContainerError, ContainerReader, DType, Result, FORMAT_VERSION, HEADER_LEN, MAGIC,
};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct PendingDataset {
    dtype: DType,
    width: usize,
    rows: u64,
    attrs: BTreeMap<String, String>,
    /// Fixed: little-endian values. Utf8: concatenated string bytes.
    values: BufWriter<File>,
    /// Utf8 only: byte length of every value
    lengths: Option<BufWriter<File>>,
    bytes_len: u64,
}

pub struct ContainerWriter {
    path: PathBuf,
    file: File,
    root: GroupLayout,
    data_end: u64,
    pending: BTreeMap<String, PendingDataset>,
    staging: TempDir,
    /// Stored data was detached; `finish` rewrites the file without it
    compact: bool,
}

impl std::fmt::Debug for ContainerWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerWriter")
            .field("path", &self.path)
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ContainerWriter {
    /// Create (or truncate) a container
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(MAGIC)?;
        file.write_all(&FORMAT_VERSION.to_le_bytes())?;
        let staging = staging_dir(&path)?;
        Ok(Self {
            path,
            file,
            root: GroupLayout::default(),
            data_end: HEADER_LEN,
            pending: BTreeMap::new(),
            staging,
            compact: false,
        })
    }

    /// Reopen a finished container to add groups and datasets
    pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let (root, data_end) = read_layout(&mut file)?;
        let staging = staging_dir(&path)?;
        Ok(Self {
            path,
            file,
            root,
            data_end,
            pending: BTreeMap::new(),
            staging,
            compact: false,
        })
    }

    /// `open_append` if the file exists, `create` otherwise
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open_append(path)
        } else {
            Self::create(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_group(&self, path: &str) -> bool {
        self.root.group(path).is_some()
    }

    pub fn has_dataset(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(key) => self.pending.contains_key(&key) || self.root.dataset(&key).is_some(),
            Err(_) => false,
        }
    }

    /// Names of the subgroups of `path`, sorted; empty when `path` is absent
    pub fn group_names(&self, path: &str) -> Vec<String> {
        self.root
            .group(path)
            .map(|g| g.groups.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn create_group(&mut self, path: &str) -> Result<()> {
        let key = normalize(path)?;
        self.check_no_pending_ancestor(&key, true)?;
        let parts = split_path(&key)?;
        self.root.ensure_group(&parts)?;
        Ok(())
    }

    /// Drop a group and everything beneath it, staged or stored
    pub fn remove_group(&mut self, path: &str) -> Result<()> {
        let key = normalize(path)?;
        let removed = self.root.remove_group(&key)?;
        self.compact |= removed.holds_data();
        let prefix = format!("{}/", key);
        self.pending.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    pub fn create_dataset(&mut self, path: &str, dtype: DType, width: usize) -> Result<()> {
        let key = normalize(path)?;
        if width == 0 {
            return Err(ContainerError::WidthMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if self.pending.contains_key(&key)
            || self.root.dataset(&key).is_some()
            || self.root.group(&key).is_some()
        {
            return Err(ContainerError::AlreadyExists(key));
        }
        self.check_no_pending_ancestor(&key, false)?;
        let (parents, _) = split_leaf(&key)?;
        self.root.ensure_group(&parents)?;

        let values = BufWriter::new(tempfile::tempfile_in(self.staging.path())?);
        let lengths = match dtype {
            DType::Utf8 => Some(BufWriter::new(tempfile::tempfile_in(self.staging.path())?)),
            _ => None,
        };
        self.pending.insert(
            key,
            PendingDataset {
                dtype,
                width,
                rows: 0,
                attrs: BTreeMap::new(),
                values,
                lengths,
                bytes_len: 0,
            },
        );
        Ok(())
    }

    /// Append rows to a dataset created by this writer
    pub fn append(&mut self, path: &str, column: &Column) -> Result<()> {
        let key = normalize(path)?;
        let dataset = match self.pending.get_mut(&key) {
            Some(dataset) => dataset,
            None if self.root.dataset(&key).is_some() => return Err(ContainerError::Sealed(key)),
            None => return Err(ContainerError::NotFound(key)),
        };
        if column.dtype() != dataset.dtype {
            return Err(ContainerError::DTypeMismatch {
                context: key,
                expected: dataset.dtype,
                actual: column.dtype(),
            });
        }
        if column.width() != dataset.width {
            return Err(ContainerError::WidthMismatch {
                expected: dataset.width,
                actual: column.width(),
            });
        }

        match (column.utf8_values(), dataset.lengths.as_mut()) {
            (Some(strings), Some(lengths)) => {
                for s in strings {
                    dataset.values.write_all(s.as_bytes())?;
                    lengths.write_all(&(s.len() as u64).to_le_bytes())?;
                    dataset.bytes_len += s.len() as u64;
                }
            }
            _ => dataset.values.write_all(&column.to_le_bytes())?,
        }
        dataset.rows += column.rows() as u64;
        Ok(())
    }

    /// Create a dataset holding exactly `column`
    pub fn write_dataset(&mut self, path: &str, column: &Column) -> Result<()> {
        self.create_dataset(path, column.dtype(), column.width())?;
        self.append(path, column)
    }

    /// Set a string attribute on a group or dataset
    pub fn set_attr(&mut self, path: &str, name: &str, value: &str) -> Result<()> {
        let key = normalize(path)?;
        let attrs = if let Some(dataset) = self.pending.get_mut(&key) {
            &mut dataset.attrs
        } else if let Some(dataset) = self.root.dataset_mut(&key) {
            &mut dataset.attrs
        } else if let Some(group) = self.root.group_mut(&key) {
            &mut group.attrs
        } else {
            return Err(ContainerError::NotFound(key));
        };
        attrs.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Stream a dataset from another container, `window` rows at a time
    pub fn copy_dataset(
        &mut self,
        source: &ContainerReader,
        source_path: &str,
        target_path: &str,
        window: u64,
    ) -> Result<u64> {
        let layout = source.dataset(source_path)?.clone();
        self.create_dataset(target_path, layout.dtype, layout.width)?;
        for (name, value) in &layout.attrs {
            self.set_attr(target_path, name, value)?;
        }
        let window = window.max(1);
        let mut start = 0;
        while start < layout.rows {
            let end = (start + window).min(layout.rows);
            let column = source.read_window(source_path, start..end)?;
            self.append(target_path, &column)?;
            start = end;
        }
        Ok(layout.rows)
    }

    /// Lay out staged datasets, write the footer, and close the file
    pub fn finish(self) -> Result<PathBuf> {
        let ContainerWriter {
            path,
            mut file,
            mut root,
            data_end,
            pending,
            staging,
            compact,
        } = self;

        let (mut file, data_end, replacement) = if compact {
            let mut replacement = tempfile::NamedTempFile::new_in(staging.path())?;
            let end = compact_into(&mut file, &mut root, replacement.as_file_mut())?;
            drop(file);
            (replacement.reopen()?, end, Some(replacement))
        } else {
            (file, data_end, None)
        };

        file.seek(SeekFrom::Start(data_end))?;
        let mut out = BufWriter::new(file);
        let mut position = data_end;
        let staged = pending.len();

        for (key, dataset) in pending {
            let storage = match dataset.lengths {
                None => {
                    let offset = position;
                    position += drain_spool(dataset.values, &mut out)?;
                    Storage::Fixed { offset }
                }
                Some(lengths) => {
                    let offsets_offset = position;
                    let count = dataset.rows * dataset.width as u64;
                    let mut lengths = BufReader::new(rewind(lengths)?);
                    let mut cumulative = 0u64;
                    out.write_all(&cumulative.to_le_bytes())?;
                    let mut raw = [0u8; 8];
                    for _ in 0..count {
                        lengths.read_exact(&mut raw)?;
                        cumulative += u64::from_le_bytes(raw);
                        out.write_all(&cumulative.to_le_bytes())?;
                    }
                    position += (count + 1) * 8;
                    let bytes_offset = position;
                    position += drain_spool(dataset.values, &mut out)?;
                    Storage::Utf8 {
                        offsets_offset,
                        bytes_offset,
                        bytes_len: dataset.bytes_len,
                    }
                }
            };

            let (parents, leaf) = split_leaf(&key)?;
            root.ensure_group(&parents)?.datasets.insert(
                leaf.to_string(),
                DatasetLayout {
                    dtype: dataset.dtype,
                    width: dataset.width,
                    rows: dataset.rows,
                    attrs: dataset.attrs,
                    storage,
                },
            );
        }

        let end = write_footer(&mut out, &root, position)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.set_len(end)?;
        file.sync_all()?;
        drop(file);
        if let Some(replacement) = replacement {
            replacement.persist(&path).map_err(|e| e.error)?;
        }
        drop(staging);

        tracing::debug!(
            target: "circuit-container",
            "Finished {} ({} new datasets, {} bytes, compacted={})",
            path.display(),
            staged,
            end,
            compact
        );
        Ok(path)
    }

    fn check_no_pending_ancestor(&self, key: &str, include_self: bool) -> Result<()> {
        let parts = split_path(key)?;
        let limit = if include_self {
            parts.len()
        } else {
            parts.len().saturating_sub(1)
        };
        for depth in 1..=limit {
            let ancestor = parts[..depth].join("/");
            if self.pending.contains_key(&ancestor) || self.root.dataset(&ancestor).is_some() {
                return Err(ContainerError::AlreadyExists(format!("{} is a dataset", ancestor)));
            }
        }
        Ok(())
    }
}

fn normalize(path: &str) -> Result<String> {
    Ok(split_path(path)?.join("/"))
}

fn staging_dir(path: &Path) -> Result<TempDir> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok(tempfile::Builder::new()
        .prefix(".circ-staging-")
        .tempdir_in(parent)?)
}

fn rewind(spool: BufWriter<File>) -> Result<File> {
    let mut file = spool.into_inner().map_err(|e| e.into_error())?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

fn drain_spool<W: Write>(spool: BufWriter<File>, out: &mut W) -> Result<u64> {
    let mut file = rewind(spool)?;
    Ok(io::copy(&mut file, out)?)
}

/// Write a header and every stored segment of `root` into `target`,
/// pointing the layout at the new offsets; returns the end of the data
fn compact_into(source: &mut File, root: &mut GroupLayout, target: &mut File) -> Result<u64> {
    let mut out = BufWriter::new(target);
    out.write_all(MAGIC)?;
    out.write_all(&FORMAT_VERSION.to_le_bytes())?;
    let mut position = HEADER_LEN;
    relocate_group(source, root, &mut out, &mut position)?;
    out.flush()?;
    Ok(position)
}

fn relocate_group<W: Write>(
    source: &mut File,
    group: &mut GroupLayout,
    out: &mut W,
    position: &mut u64,
) -> Result<()> {
    for (name, dataset) in group.datasets.iter_mut() {
        let count = dataset.rows * dataset.width as u64;
        dataset.storage = match dataset.storage {
            Storage::Fixed { offset } => {
                let item = dataset.dtype.item_size().ok_or_else(|| {
                    ContainerError::Corrupted(format!("{} has fixed storage but dtype utf8", name))
                })? as u64;
                let new_offset = *position;
                *position += copy_segment(source, offset, count * item, out)?;
                Storage::Fixed { offset: new_offset }
            }
            Storage::Utf8 {
                offsets_offset,
                bytes_offset,
                bytes_len,
            } => {
                let new_offsets = *position;
                *position += copy_segment(source, offsets_offset, (count + 1) * 8, out)?;
                let new_bytes = *position;
                *position += copy_segment(source, bytes_offset, bytes_len, out)?;
                Storage::Utf8 {
                    offsets_offset: new_offsets,
                    bytes_offset: new_bytes,
                    bytes_len,
                }
            }
        };
    }
    for child in group.groups.values_mut() {
        relocate_group(source, child, out, position)?;
    }
    Ok(())
}

fn copy_segment<W: Write>(source: &mut File, offset: u64, len: u64, out: &mut W) -> Result<u64> {
    source.seek(SeekFrom::Start(offset))?;
    let copied = io::copy(&mut Read::by_ref(source).take(len), out)?;
    if copied != len {
        return Err(ContainerError::Corrupted(format!(
            "segment at {} ends after {} of {} bytes",
            offset, copied, len
        )));
    }
    Ok(copied)
}
