// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Attribute splits and single-population node set extraction
mod common;

use circuit_container::{Column, ContainerReader};
use circuit_split::{
    simple_split_subcircuit, split_population, EdgeFileOutcome, EdgeIndex, NetworkDescriptor,
    SplitError, SplitErrorKind, SplitStage,
};
use common::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn mtype_circuit(dir: &Path, extra_edge: bool) -> (PathBuf, PathBuf) {
    let nodes = dir.join("nodes.circ");
    let edges = dir.join("edges.circ");
    write_nodes(
        &nodes,
        &[NodeFixture {
            name: "default",
            count: 3,
            attributes: vec![
                ("mtype", Column::from(vec!["L2_X", "L6_Y", "L6_Y"])),
                ("x", Column::from(vec![0.0f32, 1.0, 2.0])),
            ],
        }],
    );

    let (mut sources, mut targets) = (vec![2u64, 0, 0, 2], vec![0u64, 1, 1, 1]);
    let mut delays = vec![0.5f32, 1.5, 2.5, 3.5];
    if extra_edge {
        sources.push(0);
        targets.push(7);
        delays.push(4.5);
    }
    write_edges(
        &edges,
        &[EdgeFixture {
            name: "default",
            source_population: "default",
            target_population: "default",
            sources,
            targets,
            attributes: vec![("delay", Column::from(delays))],
        }],
    );
    (nodes, edges)
}

#[test]
fn test_split_by_mtype() {
    let dir = tempdir().unwrap();
    let (nodes, edges) = mtype_circuit(dir.path(), false);
    let output = dir.path().join("out");

    let report = split_population(&output, "mtype", &nodes, &edges, &options(100)).unwrap();
    assert_eq!(report.edges_written, 4);
    assert_eq!(
        report.stages,
        vec![
            SplitStage::Partition,
            SplitStage::WriteNodes,
            SplitStage::WriteEdges,
            SplitStage::RewriteDescriptor,
            SplitStage::Done,
        ]
    );

    // nodes, renumbered in original order
    let l2 = output.join("nodes_L2_X.circ");
    let l6 = output.join("nodes_L6_Y.circ");
    assert_eq!(node_count(&l2, "L2_X"), 1);
    assert_eq!(node_count(&l6, "L6_Y"), 2);
    assert_eq!(node_attribute(&l6, "L6_Y", "x"), Column::from(vec![1.0f32, 2.0]));
    assert_eq!(
        node_attribute(&l6, "L6_Y", "mtype"),
        Column::from(vec!["L6_Y", "L6_Y"])
    );
    let mappings = &report.id_mappings;
    assert_eq!(mappings.get("L6_Y").unwrap().old_ids(), &[1, 2]);
    assert_eq!(mappings.get("L2_X").unwrap().lookup(0), Some(0));

    // every ordered pair, self pairs named after the population
    assert_eq!(report.edge_files["L2_X"], EdgeFileOutcome::FileDeleted);
    assert!(!output.join("edges_L2_X.circ").exists());

    let cross = output.join("edges_L2_X__L6_Y__chemical.circ");
    assert_eq!(read_edges(&cross, "L2_X__L6_Y__chemical"), (vec![0, 0], vec![0, 0]));
    let reader = ContainerReader::open(&cross).unwrap();
    assert_eq!(
        reader.read_all("edges/L2_X__L6_Y__chemical/0/delay").unwrap(),
        Column::from(vec![1.5f32, 2.5])
    );
    assert_eq!(
        reader.attr("edges/L2_X__L6_Y__chemical/source_node_id", "node_population"),
        Some("L2_X")
    );
    assert_eq!(
        reader.attr("edges/L2_X__L6_Y__chemical/target_node_id", "node_population"),
        Some("L6_Y")
    );

    let back = output.join("edges_L6_Y__L2_X__chemical.circ");
    assert_eq!(read_edges(&back, "L6_Y__L2_X__chemical"), (vec![1], vec![0]));
    let own = output.join("edges_L6_Y.circ");
    assert_eq!(read_edges(&own, "L6_Y"), (vec![1], vec![0]));
    assert_eq!(
        ContainerReader::open(&own)
            .unwrap()
            .read_all("edges/L6_Y/0/delay")
            .unwrap(),
        Column::from(vec![3.5f32])
    );

    // descriptor lists exactly the written files
    let config = NetworkDescriptor::load(&output.join("circuit_config.json")).unwrap();
    assert_eq!(config.manifest["$BASE_DIR"], ".");
    let node_files: Vec<&str> =
        config.networks.nodes.iter().map(|e| e.nodes_file.as_str()).collect();
    assert_eq!(node_files, vec!["$BASE_DIR/nodes_L2_X.circ", "$BASE_DIR/nodes_L6_Y.circ"]);
    let edge_files: Vec<&str> =
        config.networks.edges.iter().map(|e| e.edges_file.as_str()).collect();
    assert_eq!(
        edge_files,
        vec![
            "$BASE_DIR/edges_L2_X__L6_Y__chemical.circ",
            "$BASE_DIR/edges_L6_Y.circ",
            "$BASE_DIR/edges_L6_Y__L2_X__chemical.circ",
        ]
    );
    assert_eq!(
        config.networks.edges[1].populations["L6_Y"],
        json!({"type": "chemical"})
    );
}

#[test]
fn test_written_edges_are_indexed() {
    let dir = tempdir().unwrap();
    let (nodes, edges) = mtype_circuit(dir.path(), false);
    let output = dir.path().join("out");
    split_population(&output, "mtype", &nodes, &edges, &options(100)).unwrap();

    let path = output.join("edges_L2_X__L6_Y__chemical.circ");
    let reader = ContainerReader::open(&path).unwrap();
    let index = EdgeIndex::load(&reader, "L2_X__L6_Y__chemical").unwrap();
    assert_eq!(index.efferent_edges(0), vec![0, 1]);
    assert_eq!(index.afferent_edges(0), vec![0, 1]);
    assert_eq!(index.afferent_edges(1), Vec::<u64>::new());
}

#[test]
fn test_chunk_size_does_not_change_output() {
    let dir = tempdir().unwrap();
    let (nodes, edges) = mtype_circuit(dir.path(), false);

    let small = dir.path().join("small");
    let large = dir.path().join("large");
    let a = split_population(&small, "mtype", &nodes, &edges, &options(1)).unwrap();
    let b = split_population(&large, "mtype", &nodes, &edges, &options(1000)).unwrap();
    assert_eq!(a.id_mappings, b.id_mappings);
    assert_eq!(a.edges_written, b.edges_written);

    for name in ["L2_X__L6_Y__chemical", "L6_Y__L2_X__chemical", "L6_Y"] {
        let file = format!("edges_{}.circ", name);
        assert_eq!(
            read_edges(&small.join(&file), name),
            read_edges(&large.join(&file), name)
        );
        let small_reader = ContainerReader::open(small.join(&file)).unwrap();
        let large_reader = ContainerReader::open(large.join(&file)).unwrap();
        assert_eq!(
            EdgeIndex::load(&small_reader, name).unwrap(),
            EdgeIndex::load(&large_reader, name).unwrap()
        );
    }
}

#[test]
fn test_unaccounted_edges_fail() {
    let dir = tempdir().unwrap();
    let (nodes, edges) = mtype_circuit(dir.path(), true);
    let output = dir.path().join("out");

    let err = split_population(&output, "mtype", &nodes, &edges, &options(2)).unwrap_err();
    assert!(matches!(err, SplitError::Consistency { expected: 5, actual: 4 }));
    assert_eq!(err.kind(), SplitErrorKind::Consistency);
    assert!(!output.join("circuit_config.json").exists());
}

#[test]
fn test_missing_attribute() {
    let dir = tempdir().unwrap();
    let (nodes, edges) = mtype_circuit(dir.path(), false);
    let output = dir.path().join("out");
    let err = split_population(&output, "etype", &nodes, &edges, &options(2)).unwrap_err();
    assert_eq!(err.kind(), SplitErrorKind::MissingInput);
}

#[test]
fn test_absent_input_files() {
    let dir = tempdir().unwrap();
    let (nodes, edges) = mtype_circuit(dir.path(), false);
    let absent = dir.path().join("no_such.circ");

    let output = dir.path().join("out");
    let err = split_population(&output, "mtype", &absent, &edges, &options(2)).unwrap_err();
    assert_eq!(err.kind(), SplitErrorKind::MissingInput);
    let err = split_population(&output, "mtype", &nodes, &absent, &options(2)).unwrap_err();
    assert_eq!(err.kind(), SplitErrorKind::MissingInput);
}

#[test]
fn test_multiple_populations_rejected() {
    let dir = tempdir().unwrap();
    let (_, edges) = mtype_circuit(dir.path(), false);
    let nodes = dir.path().join("two.circ");
    let population = |name| NodeFixture {
        name,
        count: 1,
        attributes: vec![("mtype", Column::from(vec!["a"]))],
    };
    write_nodes(&nodes, &[population("a"), population("b")]);

    let output = dir.path().join("out");
    let err = split_population(&output, "mtype", &nodes, &edges, &options(2)).unwrap_err();
    assert!(matches!(err, SplitError::Structural(_)));
}

fn ring_circuit(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let nodes = dir.join("nodes.circ");
    let edges = dir.join("edges.circ");
    let node_sets = dir.join("node_sets.json");
    write_nodes(
        &nodes,
        &[NodeFixture {
            name: "default",
            count: 3,
            attributes: vec![("mtype", Column::from(vec!["a", "b", "c"]))],
        }],
    );
    write_edges(
        &edges,
        &[EdgeFixture {
            name: "default",
            source_population: "default",
            target_population: "default",
            sources: vec![0, 1, 2],
            targets: vec![1, 2, 0],
            attributes: vec![("weight", Column::from(vec![1.0f64, 2.0, 3.0]))],
        }],
    );
    write_json(
        &node_sets,
        &json!({
            "Pair": {"node_id": [1, 0]},
            "Last": {"mtype": "c"},
            "Nothing": {"mtype": "z"}
        }),
    );
    (nodes, edges, node_sets)
}

#[test]
fn test_simple_subcircuit() {
    let dir = tempdir().unwrap();
    let (nodes, edges, node_sets) = ring_circuit(dir.path());
    let output = dir.path().join("out");

    let report =
        simple_split_subcircuit(&output, "Pair", &node_sets, &nodes, &edges, &options(2)).unwrap();
    assert_eq!(report.edges_written, 1);
    assert_eq!(report.id_mappings.populations().collect::<Vec<_>>(), vec!["Pair"]);

    let node_file = output.join("nodes_Pair.circ");
    assert_eq!(node_count(&node_file, "Pair"), 2);
    assert_eq!(node_attribute(&node_file, "Pair", "mtype"), Column::from(vec!["a", "b"]));

    let edge_file = output.join("edges_Pair.circ");
    assert_eq!(read_edges(&edge_file, "Pair"), (vec![0], vec![1]));
    assert_eq!(
        ContainerReader::open(&edge_file)
            .unwrap()
            .read_all("edges/Pair/0/weight")
            .unwrap(),
        Column::from(vec![1.0f64])
    );
    assert!(!output.join("circuit_config.json").exists());
}

#[test]
fn test_simple_subcircuit_without_edges() {
    let dir = tempdir().unwrap();
    let (nodes, edges, node_sets) = ring_circuit(dir.path());
    let output = dir.path().join("out");

    let report =
        simple_split_subcircuit(&output, "Last", &node_sets, &nodes, &edges, &options(2)).unwrap();
    assert_eq!(report.edges_written, 0);
    assert_eq!(node_count(&output.join("nodes_Last.circ"), "Last"), 1);
    assert!(!output.join("edges_Last.circ").exists());

    let report =
        simple_split_subcircuit(&output, "Nothing", &node_sets, &nodes, &edges, &options(2))
            .unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(node_count(&output.join("nodes_Nothing.circ"), "Nothing"), 0);
}

#[test]
fn test_simple_subcircuit_unknown_node_set() {
    let dir = tempdir().unwrap();
    let (nodes, edges, node_sets) = ring_circuit(dir.path());
    let output = dir.path().join("out");
    let err =
        simple_split_subcircuit(&output, "Missing", &node_sets, &nodes, &edges, &options(2))
            .unwrap_err();
    assert_eq!(err.kind(), SplitErrorKind::MissingInput);
}
