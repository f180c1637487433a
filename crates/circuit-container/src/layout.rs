// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Group tree stored in the container footer

use crate::{ContainerError, DType, Result, FORMAT_VERSION, HEADER_LEN, MAGIC, TRAILER_LEN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// Where a dataset's values live in the data section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    /// `rows * width` fixed-size values starting at `offset`
    Fixed { offset: u64 },
    /// `rows * width + 1` u64 offsets, then `bytes_len` bytes of string data
    Utf8 {
        offsets_offset: u64,
        bytes_offset: u64,
        bytes_len: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLayout {
    pub dtype: DType,
    pub width: usize,
    pub rows: u64,
    pub attrs: BTreeMap<String, String>,
    pub storage: Storage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLayout {
    pub attrs: BTreeMap<String, String>,
    pub groups: BTreeMap<String, GroupLayout>,
    pub datasets: BTreeMap<String, DatasetLayout>,
}

/// Split a '/'-separated path into components; the empty path is the root
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ContainerError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// Split a dataset path into its parent group components and leaf name
pub(crate) fn split_leaf(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts = split_path(path)?;
    let leaf = parts
        .pop()
        .ok_or_else(|| ContainerError::InvalidPath(path.to_string()))?;
    Ok((parts, leaf))
}

impl GroupLayout {
    pub fn group(&self, path: &str) -> Option<&GroupLayout> {
        let parts = split_path(path).ok()?;
        let mut current = self;
        for part in parts {
            current = current.groups.get(part)?;
        }
        Some(current)
    }

    pub fn group_mut(&mut self, path: &str) -> Option<&mut GroupLayout> {
        let parts = split_path(path).ok()?;
        let mut current = self;
        for part in parts {
            current = current.groups.get_mut(part)?;
        }
        Some(current)
    }

    pub fn dataset(&self, path: &str) -> Option<&DatasetLayout> {
        let (parents, leaf) = split_leaf(path).ok()?;
        let mut current = self;
        for part in parents {
            current = current.groups.get(part)?;
        }
        current.datasets.get(leaf)
    }

    pub fn dataset_mut(&mut self, path: &str) -> Option<&mut DatasetLayout> {
        let (parents, leaf) = split_leaf(path).ok()?;
        let mut current = self;
        for part in parents {
            current = current.groups.get_mut(part)?;
        }
        current.datasets.get_mut(leaf)
    }

    /// Walk to `parts`, creating missing groups along the way
    pub(crate) fn ensure_group(&mut self, parts: &[&str]) -> Result<&mut GroupLayout> {
        let mut current = self;
        for (depth, part) in parts.iter().enumerate() {
            if current.datasets.contains_key(*part) {
                return Err(ContainerError::AlreadyExists(format!(
                    "{} is a dataset",
                    parts[..=depth].join("/")
                )));
            }
            current = current.groups.entry((*part).to_string()).or_default();
        }
        Ok(current)
    }

    /// Whether any dataset lives in this group or beneath it
    pub(crate) fn holds_data(&self) -> bool {
        !self.datasets.is_empty() || self.groups.values().any(GroupLayout::holds_data)
    }

    /// Detach the group at `path`, returning it
    pub(crate) fn remove_group(&mut self, path: &str) -> Result<GroupLayout> {
        let (parents, leaf) = split_leaf(path)?;
        let mut current = self;
        for part in parents {
            current = current
                .groups
                .get_mut(part)
                .ok_or_else(|| ContainerError::NotFound(path.to_string()))?;
        }
        current
            .groups
            .remove(leaf)
            .ok_or_else(|| ContainerError::NotFound(path.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.datasets.is_empty()
    }
}

/// Read header, trailer and footer; returns the tree and the end of the data section
pub(crate) fn read_layout(file: &mut File) -> Result<(GroupLayout, u64)> {
    let file_len = file.seek(SeekFrom::End(0))?;
    if file_len < HEADER_LEN + TRAILER_LEN {
        return Err(ContainerError::Corrupted(format!(
            "file of {} bytes is too short",
            file_len
        )));
    }

    file.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 5];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(ContainerError::InvalidMagic(magic));
    }
    let mut version_bytes = [0u8; 4];
    file.read_exact(&mut version_bytes)?;
    check_version(u32::from_le_bytes(version_bytes))?;

    file.seek(SeekFrom::Start(file_len - TRAILER_LEN))?;
    let mut trailer = [0u8; TRAILER_LEN as usize];
    file.read_exact(&mut trailer)?;
    let footer_offset = u64::from_le_bytes(le_array(&trailer[0..8]));
    let footer_len = u64::from_le_bytes(le_array(&trailer[8..16]));
    let mut trailer_magic = [0u8; 5];
    trailer_magic.copy_from_slice(&trailer[16..21]);
    if &trailer_magic != MAGIC {
        return Err(ContainerError::InvalidMagic(trailer_magic));
    }
    check_version(u32::from_le_bytes(le_array(&trailer[21..25])))?;

    if footer_offset < HEADER_LEN || footer_offset + footer_len + TRAILER_LEN != file_len {
        return Err(ContainerError::Corrupted(format!(
            "footer extent {}+{} does not match file length {}",
            footer_offset, footer_len, file_len
        )));
    }

    file.seek(SeekFrom::Start(footer_offset))?;
    let mut footer = vec![0u8; footer_len as usize];
    file.read_exact(&mut footer)?;
    let root: GroupLayout = bincode::deserialize(&footer)
        .map_err(|e| ContainerError::Deserialization(e.to_string()))?;

    Ok((root, footer_offset))
}

/// Write footer and trailer at the current position; returns the final file length
pub(crate) fn write_footer<W: Write>(
    out: &mut W,
    root: &GroupLayout,
    footer_offset: u64,
) -> Result<u64> {
    let footer =
        bincode::serialize(root).map_err(|e| ContainerError::Serialization(e.to_string()))?;
    out.write_all(&footer)?;
    out.write_all(&footer_offset.to_le_bytes())?;
    out.write_all(&(footer.len() as u64).to_le_bytes())?;
    out.write_all(MAGIC)?;
    out.write_all(&FORMAT_VERSION.to_le_bytes())?;
    Ok(footer_offset + footer.len() as u64 + TRAILER_LEN)
}

fn check_version(file_version: u32) -> Result<()> {
    if file_version != FORMAT_VERSION {
        return Err(ContainerError::VersionMismatch {
            file_version,
            expected_version: FORMAT_VERSION,
        });
    }
    Ok(())
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> DatasetLayout {
        DatasetLayout {
            dtype: DType::UInt64,
            width: 1,
            rows: 0,
            attrs: BTreeMap::new(),
            storage: Storage::Fixed { offset: HEADER_LEN },
        }
    }

    #[test]
    fn test_split_path() {
        assert!(split_path("").unwrap().is_empty());
        assert_eq!(split_path("/nodes/pop/").unwrap(), vec!["nodes", "pop"]);
        assert!(split_path("nodes//pop").is_err());
    }

    #[test]
    fn test_ensure_and_lookup() {
        let mut root = GroupLayout::default();
        root.ensure_group(&["edges", "a__b"])
            .unwrap()
            .datasets
            .insert("source_node_id".into(), dataset());

        assert!(root.group("edges/a__b").is_some());
        assert!(root.dataset("edges/a__b/source_node_id").is_some());
        assert!(root.dataset("edges/a__b/missing").is_none());
        assert!(matches!(
            root.ensure_group(&["edges", "a__b", "source_node_id"]),
            Err(ContainerError::AlreadyExists(_))
        ));

        let removed = root.remove_group("edges/a__b").unwrap();
        assert_eq!(removed.datasets.len(), 1);
        assert!(root.group("edges").unwrap().is_empty());
    }
}
