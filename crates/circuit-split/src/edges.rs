// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Edge attribute copier.

Streams an input edge population window by window, keeps the edges whose
source and target both belong to the given mappings, remaps their ids, and
appends them with every group attribute to a new population. A written
population is then indexed, or removed when it ended up empty.
*/

use crate::id_mapping::PopulationMapping;
use crate::index::{write_indices, IndexSummary};
use crate::population::{EdgePopulation, NODE_POPULATION_ATTR};
use crate::scanner::{masked, windows, ChunkScanner};
use crate::schema::GROUP_NAME;
use crate::{SplitError, SplitResult};
use circuit_container::{Column, ColumnData, ContainerWriter, DType};
use std::path::{Path, PathBuf};

/// One (source, target) pair to copy out of an input population
#[derive(Debug, Clone, Copy)]
pub struct EdgeCopy<'a> {
    pub source: &'a EdgePopulation,
    /// Name of the population to create
    pub name: &'a str,
    pub source_node_population: &'a str,
    pub target_node_population: &'a str,
    pub source_mapping: &'a PopulationMapping,
    pub target_mapping: &'a PopulationMapping,
}

impl EdgeCopy<'_> {
    /// Copy the selected edges into `writer`; returns the number of edges written
    pub fn copy_into(
        &self,
        scanner: &ChunkScanner,
        writer: &mut ContainerWriter,
    ) -> SplitResult<u64> {
        let prefix = format!("edges/{}", self.name);
        if writer.has_group(&prefix) {
            return Err(SplitError::OutputLayout(format!(
                "edge population {} already exists in {}",
                self.name,
                writer.path().display()
            )));
        }

        let source_ids = format!("{}/source_node_id", prefix);
        let target_ids = format!("{}/target_node_id", prefix);
        let group = format!("{}/{}", prefix, GROUP_NAME);

        writer.create_dataset(&source_ids, DType::UInt64, 1)?;
        writer.create_dataset(&target_ids, DType::UInt64, 1)?;
        writer.set_attr(&source_ids, NODE_POPULATION_ATTR, self.source_node_population)?;
        writer.set_attr(&target_ids, NODE_POPULATION_ATTR, self.target_node_population)?;
        let schema = self.source.schema();
        schema.create_in(writer, &group)?;

        let source_needles = self.source_mapping.needles();
        let target_needles = self.target_mapping.needles();

        let mut written = 0u64;
        for window in scanner.windows(self.source.edge_count()) {
            let sgids = self.source.source_ids(window.clone())?;
            let tgids = self.source.target_ids(window.clone())?;
            let source_mask = scanner.membership(&sgids, &source_needles);
            let target_mask = scanner.membership(&tgids, &target_needles);
            let mask: Vec<bool> = source_mask
                .iter()
                .zip(&target_mask)
                .map(|(&s, &t)| s && t)
                .collect();

            let kept_sources = masked(&sgids, &mask);
            if kept_sources.is_empty() {
                continue;
            }
            let kept_targets = masked(&tgids, &mask);

            let new_sources = self
                .source_mapping
                .remap(self.source_node_population, &kept_sources)?;
            let new_targets = self
                .target_mapping
                .remap(self.target_node_population, &kept_targets)?;
            writer.append(&source_ids, &Column::from(new_sources))?;
            writer.append(&target_ids, &Column::from(new_targets))?;
            schema.append_filtered(
                self.source.reader(),
                self.source.group_path(),
                writer,
                &group,
                window,
                &mask,
            )?;
            written += kept_sources.len() as u64;
        }

        finalize_edges(writer, &prefix, written, scanner.chunk_size())?;
        Ok(written)
    }
}

/// Add `edge_type_id` (-1), `edge_group_id` (0) and `edge_group_index` (0..n)
fn finalize_edges(
    writer: &mut ContainerWriter,
    prefix: &str,
    edge_count: u64,
    chunk_size: usize,
) -> SplitResult<()> {
    let type_id = format!("{}/edge_type_id", prefix);
    let group_id = format!("{}/edge_group_id", prefix);
    let group_index = format!("{}/edge_group_index", prefix);
    writer.create_dataset(&type_id, DType::Int64, 1)?;
    writer.create_dataset(&group_id, DType::Int64, 1)?;
    writer.create_dataset(&group_index, DType::UInt64, 1)?;

    for window in windows(edge_count, chunk_size) {
        let rows = (window.end - window.start) as usize;
        writer.append(&type_id, &Column::filled_i64(-1, rows))?;
        writer.append(&group_id, &Column::filled_i64(0, rows))?;
        writer.append(
            &group_index,
            &Column::scalar(ColumnData::UInt64(window.collect())),
        )?;
    }
    Ok(())
}

/// How the output file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Truncate: the file holds only this population
    Create,
    /// Add to the file, creating it if needed
    Append,
}

/// What became of one written edge population
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeFileOutcome {
    Written { path: PathBuf, summary: IndexSummary },
    /// No edges; the population was removed but the file holds others
    PopulationRemoved { path: PathBuf },
    /// No edges and no other population; the file was deleted
    FileDeleted,
}

impl EdgeFileOutcome {
    pub fn edge_count(&self) -> u64 {
        match self {
            EdgeFileOutcome::Written { summary, .. } => summary.edge_count,
            _ => 0,
        }
    }

    pub fn written_path(&self) -> Option<&Path> {
        match self {
            EdgeFileOutcome::Written { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Copy one pair to `output_path`, then index it or drop it when empty
pub fn write_edge_population(
    scanner: &ChunkScanner,
    copy: &EdgeCopy<'_>,
    output_path: &Path,
    mode: WriteMode,
) -> SplitResult<EdgeFileOutcome> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(
        target: "circuit-split",
        "Writing edges {} for {} -> {} [{}]",
        copy.name,
        copy.source_node_population,
        copy.target_node_population,
        output_path.display()
    );

    let mut writer = match mode {
        WriteMode::Create => ContainerWriter::create(output_path)?,
        WriteMode::Append => ContainerWriter::open_or_create(output_path)?,
    };
    let edge_count = copy.copy_into(scanner, &mut writer)?;

    if edge_count == 0 {
        writer.remove_group(&format!("edges/{}", copy.name))?;
        let file_empty = writer.group_names("edges").is_empty();
        let path = writer.finish()?;
        if file_empty {
            std::fs::remove_file(&path)?;
            tracing::debug!(target: "circuit-split", "Removed empty edge file {}", path.display());
            return Ok(EdgeFileOutcome::FileDeleted);
        }
        tracing::debug!(
            target: "circuit-split",
            "Removed empty population {} from {}",
            copy.name,
            path.display()
        );
        return Ok(EdgeFileOutcome::PopulationRemoved { path });
    }

    let path = writer.finish()?;
    let summary = write_indices(&path, copy.name, scanner.chunk_size())?;
    tracing::debug!(
        target: "circuit-split",
        "Wrote {} edges to {}",
        summary.edge_count,
        path.display()
    );
    Ok(EdgeFileOutcome::Written { path, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuit_container::ContainerReader;
    use tempfile::tempdir;

    fn edges_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("edges.circ");
        let mut writer = ContainerWriter::create(&path).unwrap();
        writer
            .write_dataset("edges/default/source_node_id", &Column::from(vec![2u64, 0, 0, 2]))
            .unwrap();
        writer
            .write_dataset("edges/default/target_node_id", &Column::from(vec![0u64, 1, 1, 1]))
            .unwrap();
        writer
            .write_dataset("edges/default/0/delay", &Column::from(vec![1.0f32, 2.0, 3.0, 4.0]))
            .unwrap();
        writer
            .write_dataset(
                "edges/default/0/dynamics_params/tau",
                &Column::from(vec![10u16, 20, 30, 40]),
            )
            .unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_copy_remaps_and_filters() {
        let dir = tempdir().unwrap();
        let source = EdgePopulation::open(&edges_fixture(dir.path()), None).unwrap();
        let a = PopulationMapping::assign("A", vec![5, 4, 3, 0]).unwrap();
        let b = PopulationMapping::assign("B", vec![1, 2]).unwrap();
        let copy = EdgeCopy {
            source: &source,
            name: "A__B__chemical",
            source_node_population: "A",
            target_node_population: "B",
            source_mapping: &a,
            target_mapping: &b,
        };

        for chunk in [1, 3, 100] {
            let out = dir.path().join(format!("out_{}.circ", chunk));
            let scanner = ChunkScanner::sequential(chunk);
            let outcome = write_edge_population(&scanner, &copy, &out, WriteMode::Create).unwrap();
            assert_eq!(outcome.edge_count(), 2);

            let reader = ContainerReader::open(&out).unwrap();
            let prefix = "edges/A__B__chemical";
            assert_eq!(reader.read_u64(&format!("{}/source_node_id", prefix)).unwrap(), vec![3, 3]);
            assert_eq!(reader.read_u64(&format!("{}/target_node_id", prefix)).unwrap(), vec![0, 0]);
            assert_eq!(
                reader.attr(&format!("{}/source_node_id", prefix), NODE_POPULATION_ATTR),
                Some("A")
            );
            assert_eq!(
                reader.read_all(&format!("{}/0/delay", prefix)).unwrap(),
                Column::from(vec![2.0f32, 3.0])
            );
            assert_eq!(
                reader.read_all(&format!("{}/0/dynamics_params/tau", prefix)).unwrap(),
                Column::from(vec![20u16, 30])
            );
            assert_eq!(
                reader.read_all(&format!("{}/edge_type_id", prefix)).unwrap(),
                Column::filled_i64(-1, 2)
            );
            assert_eq!(
                reader.read_u64(&format!("{}/edge_group_index", prefix)).unwrap(),
                vec![0, 1]
            );
            assert!(reader.has_group(&format!("{}/indices/source_to_target", prefix)));
        }
    }

    #[test]
    fn test_empty_pair_deletes_file_or_population() {
        let dir = tempdir().unwrap();
        let source = EdgePopulation::open(&edges_fixture(dir.path()), None).unwrap();
        let a = PopulationMapping::assign("A", vec![1]).unwrap();
        let b = PopulationMapping::assign("B", vec![2]).unwrap();
        let all = PopulationMapping::assign("all", vec![0, 1, 2]).unwrap();
        let scanner = ChunkScanner::sequential(2);

        let empty = EdgeCopy {
            source: &source,
            name: "A__B__chemical",
            source_node_population: "A",
            target_node_population: "B",
            source_mapping: &a,
            target_mapping: &b,
        };
        let out = dir.path().join("shared.circ");
        assert_eq!(
            write_edge_population(&scanner, &empty, &out, WriteMode::Append).unwrap(),
            EdgeFileOutcome::FileDeleted
        );
        assert!(!out.exists());

        let full = EdgeCopy {
            name: "all",
            source_node_population: "all",
            target_node_population: "all",
            source_mapping: &all,
            target_mapping: &all,
            ..empty
        };
        let written = write_edge_population(&scanner, &full, &out, WriteMode::Append).unwrap();
        assert_eq!(written.edge_count(), 4);
        assert_eq!(
            write_edge_population(&scanner, &empty, &out, WriteMode::Append).unwrap(),
            EdgeFileOutcome::PopulationRemoved { path: out.clone() }
        );
        assert!(matches!(
            write_edge_population(&scanner, &full, &out, WriteMode::Append),
            Err(SplitError::OutputLayout(_))
        ));

        let reader = ContainerReader::open(&out).unwrap();
        assert_eq!(reader.group_names("edges").unwrap(), vec!["all"]);
    }
}
