// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Validated handles on input node and edge populations
//!
//! Opening a population checks the single-group invariant and resolves
//! the attribute schema, so structural problems surface before any data
//! is copied.

use crate::schema::{unique_group, unique_population, GroupSchema};
use crate::{SplitError, SplitResult};
use circuit_container::ContainerReader;
use std::ops::Range;
use std::path::Path;

/// Attribute recording which node population an id column refers to
pub const NODE_POPULATION_ATTR: &str = "node_population";

fn open_named(reader: &ContainerReader, kind: &str, name: Option<&str>) -> SplitResult<String> {
    match name {
        None => unique_population(reader, kind),
        Some(name) if reader.has_group(&format!("{}/{}", kind, name)) => Ok(name.to_string()),
        Some(name) => Err(SplitError::missing(format!(
            "{} population {} not found in {}",
            kind,
            name,
            reader.path().display()
        ))),
    }
}

/// An input edge population
#[derive(Debug)]
pub struct EdgePopulation {
    reader: ContainerReader,
    name: String,
    group_path: String,
    schema: GroupSchema,
    edge_count: u64,
    source_population: Option<String>,
    target_population: Option<String>,
}

impl EdgePopulation {
    /// Open population `name`, or the only population of the file when `None`
    pub fn open(path: &Path, name: Option<&str>) -> SplitResult<Self> {
        let reader = ContainerReader::open(path)?;
        let name = open_named(&reader, "edges", name)?;
        let prefix = format!("edges/{}", name);
        let group_path = unique_group(&reader, &prefix)?;
        let schema = GroupSchema::resolve(&reader, &group_path)?;

        let edge_count = reader.rows(&format!("{}/source_node_id", prefix))?;
        let target_rows = reader.rows(&format!("{}/target_node_id", prefix))?;
        if target_rows != edge_count {
            return Err(SplitError::structural(format!(
                "{}: {} source ids but {} target ids",
                prefix, edge_count, target_rows
            )));
        }

        let source_population = reader
            .attr(&format!("{}/source_node_id", prefix), NODE_POPULATION_ATTR)
            .map(str::to_string);
        let target_population = reader
            .attr(&format!("{}/target_node_id", prefix), NODE_POPULATION_ATTR)
            .map(str::to_string);

        Ok(Self {
            reader,
            name,
            group_path,
            schema,
            edge_count,
            source_population,
            target_population,
        })
    }

    pub fn reader(&self) -> &ContainerReader {
        &self.reader
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_path(&self) -> &str {
        &self.group_path
    }

    pub fn schema(&self) -> &GroupSchema {
        &self.schema
    }

    pub fn edge_count(&self) -> u64 {
        self.edge_count
    }

    pub fn source_population(&self) -> Option<&str> {
        self.source_population.as_deref()
    }

    pub fn target_population(&self) -> Option<&str> {
        self.target_population.as_deref()
    }

    /// Source node population, required for cross-file splits
    pub fn require_source_population(&self) -> SplitResult<&str> {
        self.source_population().ok_or_else(|| {
            SplitError::missing(format!("{} has no source node population", self.name))
        })
    }

    pub fn require_target_population(&self) -> SplitResult<&str> {
        self.target_population().ok_or_else(|| {
            SplitError::missing(format!("{} has no target node population", self.name))
        })
    }

    pub fn source_ids(&self, window: Range<u64>) -> SplitResult<Vec<u64>> {
        self.ids("source_node_id", window)
    }

    pub fn target_ids(&self, window: Range<u64>) -> SplitResult<Vec<u64>> {
        self.ids("target_node_id", window)
    }

    fn ids(&self, column: &str, window: Range<u64>) -> SplitResult<Vec<u64>> {
        let path = format!("edges/{}/{}", self.name, column);
        Ok(self.reader.read_window(&path, window)?.to_u64_vec()?)
    }
}

/// An input node population
#[derive(Debug)]
pub struct NodePopulation {
    reader: ContainerReader,
    name: String,
    group_path: String,
    schema: GroupSchema,
    node_count: u64,
}

impl NodePopulation {
    pub fn open(path: &Path, name: Option<&str>) -> SplitResult<Self> {
        let reader = ContainerReader::open(path)?;
        let name = open_named(&reader, "nodes", name)?;
        let prefix = format!("nodes/{}", name);
        let group_path = unique_group(&reader, &prefix)?;
        let schema = GroupSchema::resolve(&reader, &group_path)?;

        let type_ids = format!("{}/node_type_id", prefix);
        let node_count = if reader.has_dataset(&type_ids) {
            reader.rows(&type_ids)?
        } else if let Some(first) = schema.attributes.first() {
            reader.rows(&format!("{}/{}", group_path, first.name))?
        } else {
            0
        };

        for spec in &schema.attributes {
            let rows = reader.rows(&format!("{}/{}", group_path, spec.name))?;
            if rows != node_count {
                return Err(SplitError::structural(format!(
                    "{}: attribute {} has {} rows, expected {}",
                    prefix, spec.name, rows, node_count
                )));
            }
        }

        Ok(Self {
            reader,
            name,
            group_path,
            schema,
            node_count,
        })
    }

    pub fn reader(&self) -> &ContainerReader {
        &self.reader
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_path(&self) -> &str {
        &self.group_path
    }

    pub fn schema(&self) -> &GroupSchema {
        &self.schema
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }
}
