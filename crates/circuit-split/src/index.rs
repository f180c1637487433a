// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Directional range indices of edge populations.

For each direction the index is two `N x 2` tables:

- `node_id_to_ranges[i] = [first, last)` selects rows of `range_to_edge_id`
- `range_to_edge_id[k] = [start, end)` is a run of consecutive edge rows
  sharing the same node id

They live under `edges/<population>/indices/{source_to_target,target_to_source}`.
Nodes without edges map to the empty interval `[0, 0)`.
*/

use crate::scanner::windows;
use crate::{SplitError, SplitResult};
use circuit_container::{Column, ColumnData, ContainerReader, ContainerWriter};
use ndarray::Array2;
use std::path::Path;

pub const SOURCE_TO_TARGET: &str = "source_to_target";
pub const TARGET_TO_SOURCE: &str = "target_to_source";
const NODE_ID_TO_RANGES: &str = "node_id_to_ranges";
const RANGE_TO_EDGE_ID: &str = "range_to_edge_id";

/// Counts derived while indexing a written population
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    pub edge_count: u64,
    pub source_node_count: u64,
    pub target_node_count: u64,
}

/// Accumulates runs of equal ids over successive windows
#[derive(Debug, Default)]
struct RunBuilder {
    runs: Vec<(u64, u64, u64)>,
    current: Option<(u64, u64)>,
    position: u64,
    max_id: Option<u64>,
}

impl RunBuilder {
    fn push(&mut self, ids: &[u64]) {
        for &id in ids {
            match self.current {
                Some((node, _)) if node == id => {}
                Some((node, start)) => {
                    self.runs.push((node, start, self.position));
                    self.current = Some((id, self.position));
                }
                None => self.current = Some((id, self.position)),
            }
            self.position += 1;
            self.max_id = Some(self.max_id.map_or(id, |m| m.max(id)));
        }
    }

    fn finish(mut self) -> RangeIndex {
        if let Some((node, start)) = self.current.take() {
            self.runs.push((node, start, self.position));
        }
        // stable, so runs of one node stay in edge order
        self.runs.sort_by_key(|&(node, _, _)| node);

        let node_count = self.max_id.map_or(0, |m| m + 1) as usize;
        let mut node_id_to_ranges = Array2::<u64>::zeros((node_count, 2));
        let mut range_to_edge_id = Array2::<u64>::zeros((self.runs.len(), 2));
        let mut previous = None;
        for (k, &(node, start, end)) in self.runs.iter().enumerate() {
            range_to_edge_id[[k, 0]] = start;
            range_to_edge_id[[k, 1]] = end;
            let row = node as usize;
            if previous != Some(node) {
                node_id_to_ranges[[row, 0]] = k as u64;
            }
            node_id_to_ranges[[row, 1]] = k as u64 + 1;
            previous = Some(node);
        }

        RangeIndex {
            node_id_to_ranges,
            range_to_edge_id,
        }
    }
}

/// Index of one direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeIndex {
    node_id_to_ranges: Array2<u64>,
    range_to_edge_id: Array2<u64>,
}

impl RangeIndex {
    /// Index ids given in edge-row order
    pub fn from_ids(ids: &[u64]) -> Self {
        let mut builder = RunBuilder::default();
        builder.push(ids);
        builder.finish()
    }

    /// `max(id) + 1`, or 0 for no edges
    pub fn node_count(&self) -> u64 {
        self.node_id_to_ranges.nrows() as u64
    }

    pub fn range_count(&self) -> usize {
        self.range_to_edge_id.nrows()
    }

    pub fn node_id_to_ranges(&self) -> &Array2<u64> {
        &self.node_id_to_ranges
    }

    pub fn range_to_edge_id(&self) -> &Array2<u64> {
        &self.range_to_edge_id
    }

    /// Edge rows carrying `node`, ascending
    pub fn edge_ids(&self, node: u64) -> Vec<u64> {
        if node >= self.node_count() {
            return Vec::new();
        }
        let row = node as usize;
        let (first, last) = (
            self.node_id_to_ranges[[row, 0]] as usize,
            self.node_id_to_ranges[[row, 1]] as usize,
        );
        (first..last)
            .flat_map(|k| self.range_to_edge_id[[k, 0]]..self.range_to_edge_id[[k, 1]])
            .collect()
    }

    fn write(&self, writer: &mut ContainerWriter, prefix: &str) -> SplitResult<()> {
        writer.create_group(prefix)?;
        for (name, table) in [
            (NODE_ID_TO_RANGES, &self.node_id_to_ranges),
            (RANGE_TO_EDGE_ID, &self.range_to_edge_id),
        ] {
            let values: Vec<u64> = table.iter().copied().collect();
            let column = Column::new(ColumnData::UInt64(values), 2)?;
            writer.write_dataset(&format!("{}/{}", prefix, name), &column)?;
        }
        Ok(())
    }

    fn read(reader: &ContainerReader, prefix: &str) -> SplitResult<Self> {
        let table = |name: &str| -> SplitResult<Array2<u64>> {
            let path = format!("{}/{}", prefix, name);
            let rows = reader.rows(&path)? as usize;
            let values = reader.read_u64(&path)?;
            Array2::from_shape_vec((rows, 2), values)
                .map_err(|e| SplitError::structural(format!("malformed index {}: {}", path, e)))
        };
        Ok(Self {
            node_id_to_ranges: table(NODE_ID_TO_RANGES)?,
            range_to_edge_id: table(RANGE_TO_EDGE_ID)?,
        })
    }
}

/// Both directions of an edge population
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeIndex {
    pub source_to_target: RangeIndex,
    pub target_to_source: RangeIndex,
}

impl EdgeIndex {
    /// Build from the id columns of a population, `chunk_size` rows at a time
    pub fn build(
        reader: &ContainerReader,
        population: &str,
        chunk_size: usize,
    ) -> SplitResult<Self> {
        let sources = format!("edges/{}/source_node_id", population);
        let targets = format!("edges/{}/target_node_id", population);
        let edge_count = reader.rows(&sources)?;

        let mut source_runs = RunBuilder::default();
        let mut target_runs = RunBuilder::default();
        for window in windows(edge_count, chunk_size) {
            source_runs.push(&reader.read_window(&sources, window.clone())?.to_u64_vec()?);
            target_runs.push(&reader.read_window(&targets, window)?.to_u64_vec()?);
        }

        Ok(Self {
            source_to_target: source_runs.finish(),
            target_to_source: target_runs.finish(),
        })
    }

    /// Load an index written by [`write_indices`]
    pub fn load(reader: &ContainerReader, population: &str) -> SplitResult<Self> {
        let base = format!("edges/{}/indices", population);
        Ok(Self {
            source_to_target: RangeIndex::read(reader, &format!("{}/{}", base, SOURCE_TO_TARGET))?,
            target_to_source: RangeIndex::read(reader, &format!("{}/{}", base, TARGET_TO_SOURCE))?,
        })
    }

    /// Rows of edges leaving `node`
    pub fn efferent_edges(&self, node: u64) -> Vec<u64> {
        self.source_to_target.edge_ids(node)
    }

    /// Rows of edges arriving at `node`
    pub fn afferent_edges(&self, node: u64) -> Vec<u64> {
        self.target_to_source.edge_ids(node)
    }
}

/// Index a finished edge population in place
pub fn write_indices(
    path: &Path,
    population: &str,
    chunk_size: usize,
) -> SplitResult<IndexSummary> {
    let (index, edge_count) = {
        let reader = ContainerReader::open(path)?;
        let edge_count = reader.rows(&format!("edges/{}/source_node_id", population))?;
        (EdgeIndex::build(&reader, population, chunk_size)?, edge_count)
    };

    let base = format!("edges/{}/indices", population);
    let mut writer = ContainerWriter::open_append(path)?;
    if writer.has_group(&base) {
        writer.remove_group(&base)?;
    }
    index
        .source_to_target
        .write(&mut writer, &format!("{}/{}", base, SOURCE_TO_TARGET))?;
    index
        .target_to_source
        .write(&mut writer, &format!("{}/{}", base, TARGET_TO_SOURCE))?;
    writer.finish()?;

    let summary = IndexSummary {
        edge_count,
        source_node_count: index.source_to_target.node_count(),
        target_node_count: index.target_to_source.node_count(),
    };
    tracing::debug!(
        target: "circuit-split",
        "Indexed {} in {}: {:?}",
        population,
        path.display(),
        summary
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn test_runs_and_gaps() {
        let index = RangeIndex::from_ids(&[2, 0, 0, 2]);
        assert_eq!(index.node_count(), 3);
        assert_eq!(index.range_to_edge_id(), &array![[1, 3], [0, 1], [3, 4]]);
        assert_eq!(index.node_id_to_ranges(), &array![[0, 1], [0, 0], [1, 3]]);
        assert_eq!(index.edge_ids(2), vec![0, 3]);
        assert_eq!(index.edge_ids(1), Vec::<u64>::new());
        assert_eq!(index.edge_ids(7), Vec::<u64>::new());
    }

    #[test]
    fn test_empty() {
        let index = RangeIndex::from_ids(&[]);
        assert_eq!(index.node_count(), 0);
        assert_eq!(index.range_count(), 0);
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edges.circ");
        let mut writer = ContainerWriter::create(&path).unwrap();
        writer
            .write_dataset("edges/p/source_node_id", &Column::from(vec![2u64, 0, 0, 2]))
            .unwrap();
        writer
            .write_dataset("edges/p/target_node_id", &Column::from(vec![0u64, 1, 1, 1]))
            .unwrap();
        writer.finish().unwrap();

        let summary = write_indices(&path, "p", 3).unwrap();
        assert_eq!(
            summary,
            IndexSummary {
                edge_count: 4,
                source_node_count: 3,
                target_node_count: 2
            }
        );

        let reader = ContainerReader::open(&path).unwrap();
        let index = EdgeIndex::load(&reader, "p").unwrap();
        assert_eq!(index, EdgeIndex::build(&reader, "p", 1).unwrap());
        assert_eq!(index.efferent_edges(0), vec![1, 2]);
        assert_eq!(index.afferent_edges(1), vec![1, 2, 3]);
        assert_eq!(
            reader
                .dataset("edges/p/indices/target_to_source/range_to_edge_id")
                .unwrap()
                .width,
            2
        );
    }

    proptest! {
        #[test]
        fn prop_index_enumerates_matching_rows(
            ids in proptest::collection::vec(0u64..20, 0..200),
            split in 1usize..50,
        ) {
            let mut builder = RunBuilder::default();
            for chunk in ids.chunks(split) {
                builder.push(chunk);
            }
            let index = builder.finish();
            prop_assert_eq!(&index, &RangeIndex::from_ids(&ids));

            let node_count = ids.iter().max().map_or(0, |m| m + 1);
            prop_assert_eq!(index.node_count(), node_count);
            for node in 0..node_count {
                let expected: Vec<u64> = ids
                    .iter()
                    .enumerate()
                    .filter(|(_, &id)| id == node)
                    .map(|(row, _)| row as u64)
                    .collect();
                prop_assert_eq!(index.edge_ids(node), expected);
            }
        }
    }
}
