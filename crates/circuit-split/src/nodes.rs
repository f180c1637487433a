// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Node tables and the node writer.

A [`NodeTable`] is the in-memory attribute table of some rows of a node
population, together with the original id of every row. Partitioning and
node-set selection produce tables; the writer turns each into a node
population whose ids are the table's row positions.
*/

use crate::population::NodePopulation;
use crate::schema::{AttributeSpec, DYNAMICS_PARAMS, GROUP_NAME};
use crate::{SplitError, SplitResult};
use circuit_container::{Column, ColumnData, ContainerWriter, Scalar};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Attribute marking the model kind of a node
pub const MODEL_TYPE: &str = "model_type";

/// Model type of synthesized boundary populations
pub const VIRTUAL: &str = "virtual";

/// Attribute rows of part of a node population
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTable {
    population: String,
    ids: Vec<u64>,
    attributes: Vec<(AttributeSpec, Column)>,
    dynamics_params: Option<Vec<(AttributeSpec, Column)>>,
}

impl NodeTable {
    /// Table from columns of equal row count
    pub fn new(
        population: &str,
        ids: Vec<u64>,
        attributes: Vec<(AttributeSpec, Column)>,
    ) -> SplitResult<Self> {
        if let Some((spec, column)) = attributes.iter().find(|(_, c)| c.rows() != ids.len()) {
            return Err(SplitError::InvalidArgument(format!(
                "attribute {} has {} rows, expected {}",
                spec.name,
                column.rows(),
                ids.len()
            )));
        }
        Ok(Self {
            population: population.to_string(),
            ids,
            attributes,
            dynamics_params: None,
        })
    }

    /// Table with ids `0..count` and no attributes
    pub fn bare(population: &str, count: u64) -> Self {
        Self {
            population: population.to_string(),
            ids: (0..count).collect(),
            attributes: Vec::new(),
            dynamics_params: None,
        }
    }

    /// Load every row of a population
    pub fn load(nodes: &NodePopulation) -> SplitResult<Self> {
        let reader = nodes.reader();
        let group = nodes.group_path();
        let read = |path: String| reader.read_all(&path);

        let attributes = nodes
            .schema()
            .attributes
            .iter()
            .map(|spec| -> SplitResult<_> {
                Ok((spec.clone(), read(format!("{}/{}", group, spec.name))?))
            })
            .collect::<SplitResult<Vec<_>>>()?;

        let dynamics_params = match &nodes.schema().dynamics_params {
            Some(specs) => Some(
                specs
                    .iter()
                    .map(|spec| -> SplitResult<_> {
                        Ok((
                            spec.clone(),
                            read(format!("{}/{}/{}", group, DYNAMICS_PARAMS, spec.name))?,
                        ))
                    })
                    .collect::<SplitResult<Vec<_>>>()?,
            ),
            None => None,
        };

        tracing::debug!(
            target: "circuit-split",
            "Loaded {} nodes of {}",
            nodes.node_count(),
            nodes.name()
        );

        Ok(Self {
            population: nodes.name().to_string(),
            ids: (0..nodes.node_count()).collect(),
            attributes,
            dynamics_params,
        })
    }

    pub fn population(&self) -> &str {
        &self.population
    }

    /// Same rows under another population name
    pub fn renamed(mut self, population: &str) -> Self {
        self.population = population.to_string();
        self
    }

    /// Original ids, one per row
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn attribute(&self, name: &str) -> Option<&Column> {
        self.attributes
            .iter()
            .find(|(spec, _)| spec.name == name)
            .map(|(_, column)| column)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(spec, _)| spec.name.as_str())
    }

    /// Rows at the given positions, in that order
    pub fn select(&self, rows: &[usize]) -> SplitResult<Self> {
        let ids = rows
            .iter()
            .map(|&r| {
                self.ids.get(r).copied().ok_or_else(|| {
                    SplitError::InvalidArgument(format!(
                        "row {} out of range for {} ({} rows)",
                        r,
                        self.population,
                        self.ids.len()
                    ))
                })
            })
            .collect::<SplitResult<Vec<_>>>()?;

        let take = |columns: &[(AttributeSpec, Column)]| -> SplitResult<Vec<_>> {
            columns
                .iter()
                .map(|(spec, column)| -> SplitResult<_> {
                    Ok((spec.clone(), column.take(rows)?))
                })
                .collect()
        };

        Ok(Self {
            population: self.population.clone(),
            ids,
            attributes: take(&self.attributes)?,
            dynamics_params: match &self.dynamics_params {
                Some(params) => Some(take(params)?),
                None => None,
            },
        })
    }

    /// Rows whose original id is in `old_ids`, in the order of `old_ids`
    pub fn select_ids(&self, old_ids: &[u64]) -> SplitResult<Self> {
        let positions: ahash::AHashMap<u64, usize> =
            self.ids.iter().enumerate().map(|(row, &id)| (id, row)).collect();
        let rows = old_ids
            .iter()
            .map(|id| {
                positions.get(id).copied().ok_or_else(|| {
                    SplitError::missing(format!(
                        "node {} not in population {}",
                        id, self.population
                    ))
                })
            })
            .collect::<SplitResult<Vec<_>>>()?;
        self.select(&rows)
    }

    /// Group rows by exact value of a scalar attribute
    ///
    /// Groups come out in ascending value order and keep the original row
    /// order inside each group; each is named after its value.
    pub fn partition_by_attribute(&self, attribute: &str) -> SplitResult<Vec<NodeTable>> {
        let column = self.attribute(attribute).ok_or_else(|| {
            SplitError::missing(format!(
                "attribute {} not found in population {}",
                attribute, self.population
            ))
        })?;
        if column.width() != 1 {
            return Err(SplitError::InvalidArgument(format!(
                "cannot split on vector attribute {}",
                attribute
            )));
        }

        let values = (0..column.rows())
            .map(|row| {
                column.scalar_at(row).ok_or_else(|| {
                    SplitError::structural(format!(
                        "attribute {} is missing row {}",
                        attribute, row
                    ))
                })
            })
            .collect::<SplitResult<Vec<Scalar<'_>>>>()?;

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

        let mut groups = Vec::new();
        let mut start = 0;
        while start < order.len() {
            let first = values[order[start]];
            let end = order[start..]
                .iter()
                .position(|&row| values[row].total_cmp(&first) != Ordering::Equal)
                .map_or(order.len(), |offset| start + offset);
            groups.push(self.select(&order[start..end])?.renamed(&first.to_string()));
            start = end;
        }

        tracing::debug!(
            target: "circuit-split",
            "Splitting population on {} -> {:?}",
            attribute,
            groups.iter().map(NodeTable::population).collect::<Vec<_>>()
        );
        Ok(groups)
    }
}

/// Write `table` as population `nodes/<name>` into an open container
///
/// Ids become the row positions; `node_type_id` is filled with -1. When
/// `model_type` is given and the table carries no such attribute, one is
/// added with that value on every row.
pub fn write_node_population(
    writer: &mut ContainerWriter,
    table: &NodeTable,
    model_type: Option<&str>,
) -> SplitResult<()> {
    let prefix = format!("nodes/{}", table.population());
    let group = format!("{}/{}", prefix, GROUP_NAME);
    let rows = table.len();

    writer.write_dataset(&format!("{}/node_type_id", prefix), &Column::filled_i64(-1, rows))?;
    writer.create_group(&group)?;
    for (spec, column) in &table.attributes {
        writer.write_dataset(&format!("{}/{}", group, spec.name), column)?;
    }
    if let Some(params) = &table.dynamics_params {
        let params_group = format!("{}/{}", group, DYNAMICS_PARAMS);
        writer.create_group(&params_group)?;
        for (spec, column) in params {
            writer.write_dataset(&format!("{}/{}", params_group, spec.name), column)?;
        }
    }
    if let Some(model_type) = model_type {
        if table.attribute(MODEL_TYPE).is_none() {
            let values = ColumnData::Utf8(vec![model_type.to_string(); rows]);
            writer.write_dataset(&format!("{}/{}", group, MODEL_TYPE), &Column::scalar(values))?;
        }
    }
    Ok(())
}

/// Write `table` into the container at `path`, keeping other populations in it
///
/// A population of the same name already in the file is replaced.
pub fn write_node_file(
    path: &Path,
    table: &NodeTable,
    model_type: Option<&str>,
) -> SplitResult<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = ContainerWriter::open_or_create(path)?;
    let prefix = format!("nodes/{}", table.population());
    if writer.has_group(&prefix) {
        writer.remove_group(&prefix)?;
    }
    write_node_population(&mut writer, table, model_type)?;
    let path = writer.finish()?;

    tracing::debug!(
        target: "circuit-split",
        "Wrote {} nodes to {}",
        table.len(),
        path.display()
    );
    Ok(path)
}

/// Attribute-less virtual population of `count` nodes at `<output>/<name>/nodes.circ`
pub fn create_source_nodes(output: &Path, name: &str, count: u64) -> SplitResult<PathBuf> {
    let path = output
        .join(name)
        .join(format!("nodes.{}", circuit_container::FILE_EXTENSION));
    write_node_file(&path, &NodeTable::bare(name, count), Some(VIRTUAL))
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuit_container::{ContainerReader, DType};
    use tempfile::tempdir;

    fn spec(name: &str, dtype: DType) -> AttributeSpec {
        AttributeSpec {
            name: name.to_string(),
            dtype,
            width: 1,
        }
    }

    fn mtype_table() -> NodeTable {
        NodeTable {
            population: "default".to_string(),
            ids: vec![0, 1, 2],
            attributes: vec![
                (spec("layer", DType::Int32), Column::from(vec![2i32, 6, 6])),
                (
                    spec("mtype", DType::Utf8),
                    Column::from(vec!["L2_X", "L6_Y", "L6_Y"]),
                ),
            ],
            dynamics_params: None,
        }
    }

    #[test]
    fn test_partition_by_attribute() {
        let groups = mtype_table().partition_by_attribute("mtype").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].population(), "L2_X");
        assert_eq!(groups[0].ids(), &[0]);
        assert_eq!(groups[1].population(), "L6_Y");
        assert_eq!(groups[1].ids(), &[1, 2]);
        assert_eq!(
            groups[1].attribute("mtype").unwrap(),
            &Column::from(vec!["L6_Y", "L6_Y"])
        );
    }

    #[test]
    fn test_partition_numeric_names() {
        let groups = mtype_table().partition_by_attribute("layer").unwrap();
        let names: Vec<_> = groups.iter().map(NodeTable::population).collect();
        assert_eq!(names, vec!["2", "6"]);
        assert!(matches!(
            mtype_table().partition_by_attribute("region"),
            Err(SplitError::MissingInput(_))
        ));
    }

    #[test]
    fn test_select_ids_keeps_requested_order() {
        let table = mtype_table().select_ids(&[2, 0]).unwrap();
        assert_eq!(table.ids(), &[2, 0]);
        assert_eq!(table.attribute("layer").unwrap(), &Column::from(vec![6i32, 2]));
        assert!(mtype_table().select_ids(&[9]).is_err());
    }

    #[test]
    fn test_write_nodes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodes_A.circ");
        let table = NodeTable {
            population: "A".to_string(),
            ids: (10..15).collect(),
            attributes: vec![(
                spec("fake_prop", DType::Int64),
                Column::from((0i64..5).collect::<Vec<_>>()),
            )],
            dynamics_params: None,
        };
        write_node_file(&path, &table, None).unwrap();
        write_node_file(&path, &table.clone().renamed("B"), Some(VIRTUAL)).unwrap();

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.group_names("nodes").unwrap(), vec!["A", "B"]);
        assert_eq!(
            reader.read_all("nodes/A/node_type_id").unwrap(),
            Column::filled_i64(-1, 5)
        );
        assert_eq!(reader.rows("nodes/A/0/fake_prop").unwrap(), 5);
        assert!(!reader.has_dataset("nodes/A/0/model_type"));
        assert_eq!(
            reader.read_all("nodes/B/0/model_type").unwrap(),
            Column::from(vec!["virtual"; 5])
        );
    }

    #[test]
    fn test_create_source_nodes() {
        let dir = tempdir().unwrap();
        let path = create_source_nodes(dir.path(), "external_E", 3).unwrap();
        assert_eq!(path, dir.path().join("external_E").join("nodes.circ"));
        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.rows("nodes/external_E/0/model_type").unwrap(), 3);
    }
}
