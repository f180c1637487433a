// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixture builders shared by the split integration tests

#![allow(dead_code)]

use circuit_container::{Column, ContainerReader, ContainerWriter};
use circuit_split::SplitOptions;
use serde_json::Value;
use std::fs::File;
use std::path::Path;

/// One node population: name and its group `0` attributes
pub struct NodeFixture<'a> {
    pub name: &'a str,
    pub count: usize,
    pub attributes: Vec<(&'a str, Column)>,
}

pub struct EdgeFixture<'a> {
    pub name: &'a str,
    pub source_population: &'a str,
    pub target_population: &'a str,
    pub sources: Vec<u64>,
    pub targets: Vec<u64>,
    pub attributes: Vec<(&'a str, Column)>,
}

pub fn write_nodes(path: &Path, populations: &[NodeFixture<'_>]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = ContainerWriter::create(path).unwrap();
    for population in populations {
        let prefix = format!("nodes/{}", population.name);
        writer
            .write_dataset(
                &format!("{}/node_type_id", prefix),
                &Column::filled_i64(-1, population.count),
            )
            .unwrap();
        writer.create_group(&format!("{}/0", prefix)).unwrap();
        for (name, column) in &population.attributes {
            writer
                .write_dataset(&format!("{}/0/{}", prefix, name), column)
                .unwrap();
        }
    }
    writer.finish().unwrap();
}

pub fn write_edges(path: &Path, populations: &[EdgeFixture<'_>]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = ContainerWriter::create(path).unwrap();
    for population in populations {
        let prefix = format!("edges/{}", population.name);
        let sources = format!("{}/source_node_id", prefix);
        let targets = format!("{}/target_node_id", prefix);
        writer
            .write_dataset(&sources, &Column::from(population.sources.clone()))
            .unwrap();
        writer
            .write_dataset(&targets, &Column::from(population.targets.clone()))
            .unwrap();
        writer
            .set_attr(&sources, "node_population", population.source_population)
            .unwrap();
        writer
            .set_attr(&targets, "node_population", population.target_population)
            .unwrap();
        writer.create_group(&format!("{}/0", prefix)).unwrap();
        for (name, column) in &population.attributes {
            writer
                .write_dataset(&format!("{}/0/{}", prefix, name), column)
                .unwrap();
        }
    }
    writer.finish().unwrap();
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    serde_json::to_writer_pretty(File::create(path).unwrap(), value).unwrap();
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_reader(File::open(path).unwrap()).unwrap()
}

/// `(sources, targets)` of an edge population
pub fn read_edges(path: &Path, population: &str) -> (Vec<u64>, Vec<u64>) {
    let reader = ContainerReader::open(path).unwrap();
    (
        reader
            .read_u64(&format!("edges/{}/source_node_id", population))
            .unwrap(),
        reader
            .read_u64(&format!("edges/{}/target_node_id", population))
            .unwrap(),
    )
}

pub fn node_count(path: &Path, population: &str) -> u64 {
    ContainerReader::open(path)
        .unwrap()
        .rows(&format!("nodes/{}/node_type_id", population))
        .unwrap()
}

pub fn node_attribute(path: &Path, population: &str, attribute: &str) -> Column {
    ContainerReader::open(path)
        .unwrap()
        .read_all(&format!("nodes/{}/0/{}", population, attribute))
        .unwrap()
}

pub fn options(chunk: usize) -> SplitOptions {
    SplitOptions::default()
        .with_read_chunk_size(chunk)
        .with_max_threads(2)
}
