// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// End-to-end pipeline through the umbrella crate
///
/// A TOML configuration drives an attribute split; its output circuit is
/// then fed to a subcircuit extraction.
use circuit_tools::prelude::*;
use circuit_tools::split::{CircuitDescriptor, EdgePopulation, NetworkDescriptor, NodePopulation};
use serde_json::json;
use std::fs::File;
use std::path::Path;
use tempfile::tempdir;

fn write_circuit(dir: &Path) {
    let mut nodes = ContainerWriter::create(dir.join("nodes.circ")).unwrap();
    nodes
        .write_dataset("nodes/default/node_type_id", &Column::filled_i64(-1, 3))
        .unwrap();
    nodes
        .write_dataset("nodes/default/0/mtype", &Column::from(vec!["L2_X", "L6_Y", "L6_Y"]))
        .unwrap();
    nodes
        .write_dataset("nodes/default/0/y", &Column::from(vec![10.0f64, 20.0, 30.0]))
        .unwrap();
    nodes.finish().unwrap();

    let mut edges = ContainerWriter::create(dir.join("edges.circ")).unwrap();
    let columns = [
        ("source_node_id", vec![2u64, 0, 0, 2]),
        ("target_node_id", vec![0u64, 1, 1, 1]),
    ];
    for (column, ids) in columns {
        let path = format!("edges/default/{}", column);
        edges.write_dataset(&path, &Column::from(ids)).unwrap();
        edges.set_attr(&path, "node_population", "default").unwrap();
    }
    edges
        .write_dataset("edges/default/0/syn_weight", &Column::from(vec![0.1f32, 0.2, 0.3, 0.4]))
        .unwrap();
    edges.finish().unwrap();
}

fn load_options(dir: &Path) -> SplitOptions {
    let path = dir.join("circuit_configuration.toml");
    std::fs::write(&path, "[split]\nread_chunk_size = 2\nmax_threads = 2\n").unwrap();
    let config = load_config(Some(path.as_path()), None).unwrap();
    assert_eq!(config.split.read_chunk_size, 2);
    circuit_tools::split_options(&config)
}

#[test]
fn test_split_output_is_a_valid_circuit() {
    let dir = tempdir().unwrap();
    write_circuit(dir.path());
    let options = load_options(dir.path());
    let output = dir.path().join("split");

    let report = split_population(
        &output,
        "mtype",
        &dir.path().join("nodes.circ"),
        &dir.path().join("edges.circ"),
        &options,
    )
    .unwrap();
    assert_eq!(report.edges_written, 4);

    // every population named by the written descriptor opens cleanly
    let circuit = CircuitDescriptor::load(&output.join("circuit_config.json")).unwrap();
    let node_total: u64 = circuit
        .node_populations()
        .iter()
        .map(|info| {
            NodePopulation::open(&info.file, Some(info.name.as_str()))
                .unwrap()
                .node_count()
        })
        .sum();
    assert_eq!(node_total, 3);
    let edge_total: u64 = circuit
        .edge_populations()
        .iter()
        .map(|info| {
            EdgePopulation::open(&info.file, Some(info.name.as_str()))
                .unwrap()
                .edge_count()
        })
        .sum();
    assert_eq!(edge_total, 4);
}

#[test]
fn test_subcircuit_of_split_output() {
    let dir = tempdir().unwrap();
    write_circuit(dir.path());
    let options = load_options(dir.path());
    let split = dir.path().join("split");
    split_population(
        &split,
        "mtype",
        &dir.path().join("nodes.circ"),
        &dir.path().join("edges.circ"),
        &options,
    )
    .unwrap();

    // point the split descriptor at a node set file
    let config_path = split.join("circuit_config.json");
    let mut descriptor = NetworkDescriptor::load(&config_path).unwrap();
    descriptor.node_sets_file = Some("$BASE_DIR/node_sets.json".to_string());
    descriptor.write(&config_path).unwrap();
    serde_json::to_writer(
        File::create(split.join("node_sets.json")).unwrap(),
        &json!({"L6": {"mtype": "L6_Y"}}),
    )
    .unwrap();

    let output = dir.path().join("sub");
    let report = split_subcircuit(&output, "L6", &config_path, true, true, &options).unwrap();
    assert_eq!(
        report.id_mappings.populations().collect::<Vec<_>>(),
        vec!["L6_Y", "external_L2_X__L6_Y__chemical"]
    );

    let nodes = output.join("L6_Y/nodes_L6_Y.circ");
    let reader = ContainerReader::open(&nodes).unwrap();
    assert_eq!(
        reader.read_all("nodes/L6_Y/0/y").unwrap(),
        Column::from(vec![20.0f64, 30.0])
    );

    let edges = ContainerReader::open(output.join("L6_Y/edges_L6_Y.circ")).unwrap();
    assert_eq!(edges.read_u64("edges/L6_Y/source_node_id").unwrap(), vec![1]);
    assert_eq!(edges.read_u64("edges/L6_Y/target_node_id").unwrap(), vec![0]);

    let external =
        ContainerReader::open(output.join("external_L2_X__L6_Y__chemical.circ")).unwrap();
    let prefix = "edges/external_L2_X__L6_Y__chemical";
    assert_eq!(
        external.read_u64(&format!("{}/source_node_id", prefix)).unwrap(),
        vec![0, 0]
    );
    assert_eq!(
        external.read_u64(&format!("{}/target_node_id", prefix)).unwrap(),
        vec![0, 0]
    );
    assert_eq!(
        external.read_all(&format!("{}/0/syn_weight", prefix)).unwrap(),
        Column::from(vec![0.2f32, 0.3])
    );

    let rewritten = NetworkDescriptor::load(&output.join("circuit_config.json")).unwrap();
    let node_files: Vec<&str> = rewritten
        .networks
        .nodes
        .iter()
        .map(|e| e.nodes_file.as_str())
        .collect();
    assert_eq!(
        node_files,
        vec![
            "$BASE_DIR/L6_Y/nodes_L6_Y.circ",
            "$BASE_DIR/external_L2_X__L6_Y__chemical/nodes.circ",
        ]
    );
    // keys other than the file and populations are kept
    assert_eq!(rewritten.networks.nodes[0].extra["node_types_file"], json!(null));
}
