// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Split and subcircuit orchestration.

Three entry points drive the other modules:

- [`split_population`] partitions one node population by an attribute and
  writes every (source, target) pair of edges between the partitions
- [`simple_split_subcircuit`] extracts one node set of a single population
- [`split_subcircuit`] extracts a node set from every population of a
  circuit descriptor, optionally with its virtual and external inputs, and
  writes a rewritten descriptor next to the output

Each operation walks a fixed sequence of [`SplitStage`]s and returns a
[`SplitReport`].
*/

use crate::descriptor::{
    attribute_split_descriptor, update_with_new_paths, CircuitDescriptor, OutputLayout,
    PopulationFile, PopulationInfo, BASE_DIR,
};
use crate::edges::{write_edge_population, EdgeCopy, EdgeFileOutcome, WriteMode};
use crate::id_mapping::{IdMappingBuilder, IdMappings, PopulationMapping};
use crate::node_sets::{load_node_sets, materialize, update_node_sets, write_node_sets, NodeSets};
use crate::nodes::{create_source_nodes, write_node_file, NodeTable, VIRTUAL};
use crate::options::{EdgeAccounting, SplitOptions};
use crate::population::{EdgePopulation, NodePopulation};
use crate::scanner::{masked, ChunkScanner, NeedleSet};
use crate::{SplitError, SplitResult};
use circuit_container::FILE_EXTENSION;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

const NODE_SETS_FILE: &str = "node_sets.json";
const EXTERNAL_PREFIX: &str = "external_";

/// Phase of a split operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStage {
    Partition,
    WriteNodes,
    WriteEdges,
    External,
    Virtual,
    RewriteDescriptor,
    Done,
}

impl fmt::Display for SplitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitStage::Partition => "partition",
            SplitStage::WriteNodes => "write-nodes",
            SplitStage::WriteEdges => "write-edges",
            SplitStage::External => "external",
            SplitStage::Virtual => "virtual",
            SplitStage::RewriteDescriptor => "rewrite-descriptor",
            SplitStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a split operation produced
#[derive(Debug, Default)]
pub struct SplitReport {
    /// Node file written per output population
    pub node_files: BTreeMap<String, PathBuf>,
    /// Outcome per generated edge population
    pub edge_files: BTreeMap<String, EdgeFileOutcome>,
    pub edges_written: u64,
    pub id_mappings: IdMappings,
    pub warnings: Vec<String>,
    /// Stages entered, in order
    pub stages: Vec<SplitStage>,
    /// Descriptor written for the output, if any
    pub circuit_config: Option<PathBuf>,
}

impl SplitReport {
    /// Whether the edge population `name` ended up with at least one edge
    pub fn has_edges(&self, name: &str) -> bool {
        self.edge_files
            .get(name)
            .map_or(false, |outcome| outcome.written_path().is_some())
    }
}

/// `nodes_<population>.circ`
pub fn node_file_name(population: &str) -> String {
    format!("nodes_{}.{}", population, FILE_EXTENSION)
}

/// `edges_<population>.circ`
pub fn edge_file_name(population: &str) -> String {
    format!("edges_{}.{}", population, FILE_EXTENSION)
}

/// State shared by the stages of one operation
struct SplitRun<'o> {
    options: &'o SplitOptions,
    scanner: ChunkScanner,
    report: SplitReport,
}

impl<'o> SplitRun<'o> {
    fn new(options: &'o SplitOptions, output: &Path) -> SplitResult<Self> {
        std::fs::create_dir_all(output)?;
        Ok(Self {
            options,
            scanner: ChunkScanner::new(options)?,
            report: SplitReport::default(),
        })
    }

    fn enter(&mut self, stage: SplitStage) {
        tracing::info!(target: "circuit-split", "Split stage: {}", stage);
        self.report.stages.push(stage);
    }

    fn warn(&mut self, message: String) {
        tracing::warn!(target: "circuit-split", "{}", message);
        self.report.warnings.push(message);
    }

    fn write_nodes(
        &mut self,
        path: &Path,
        table: &NodeTable,
        model_type: Option<&str>,
    ) -> SplitResult<()> {
        let path = write_node_file(path, table, model_type)?;
        self.report.node_files.insert(table.population().to_string(), path);
        Ok(())
    }

    fn write_edges(
        &mut self,
        copy: &EdgeCopy<'_>,
        path: &Path,
        mode: WriteMode,
    ) -> SplitResult<()> {
        let outcome = write_edge_population(&self.scanner, copy, path, mode)?;
        self.report.edges_written += outcome.edge_count();
        self.report.edge_files.insert(copy.name.to_string(), outcome);
        Ok(())
    }

    /// Every ordered pair of `populations`, each to `edges_<name>.circ` under `output`
    fn write_pairs(
        &mut self,
        output: &Path,
        edges: &EdgePopulation,
        populations: &[&str],
        builder: &IdMappingBuilder,
        accounting: EdgeAccounting,
    ) -> SplitResult<()> {
        for &source in populations {
            for &target in populations {
                let name = self.options.edge_population_name(source, target);
                let copy = EdgeCopy {
                    source: edges,
                    name: &name,
                    source_node_population: source,
                    target_node_population: target,
                    source_mapping: mapping_of(builder, source)?,
                    target_mapping: mapping_of(builder, target)?,
                };
                self.write_edges(&copy, &output.join(edge_file_name(&name)), WriteMode::Create)?;
            }
        }

        if accounting == EdgeAccounting::Exhaustive
            && self.report.edges_written != edges.edge_count()
        {
            return Err(SplitError::Consistency {
                expected: edges.edge_count(),
                actual: self.report.edges_written,
            });
        }
        Ok(())
    }

    fn finish(mut self, id_mappings: IdMappings) -> SplitReport {
        self.enter(SplitStage::Done);
        self.report.id_mappings = id_mappings;
        tracing::info!(
            target: "circuit-split",
            "Split done: {} node populations, {} edges",
            self.report.node_files.len(),
            self.report.edges_written
        );
        self.report
    }
}

fn mapping_of<'b>(
    builder: &'b IdMappingBuilder,
    population: &str,
) -> SplitResult<&'b PopulationMapping> {
    builder.get(population).ok_or_else(|| {
        SplitError::missing(format!("no id mapping for population {}", population))
    })
}

/// Split a single-population circuit by the values of node `attribute`
///
/// One output population per distinct value, named after it, with ids
/// renumbered in original order. Every ordered pair of output populations
/// gets an edge population; all input edges must be accounted for. A
/// descriptor naming the written files goes to `output`.
pub fn split_population(
    output: &Path,
    attribute: &str,
    nodes_path: &Path,
    edges_path: &Path,
    options: &SplitOptions,
) -> SplitResult<SplitReport> {
    let mut run = SplitRun::new(options, output)?;
    let nodes = NodePopulation::open(nodes_path, None)?;
    let edges = EdgePopulation::open(edges_path, None)?;

    run.enter(SplitStage::Partition);
    let partitions = NodeTable::load(&nodes)?.partition_by_attribute(attribute)?;
    tracing::info!(
        target: "circuit-split",
        "Splitting {} by {} into {} populations",
        nodes.name(),
        attribute,
        partitions.len()
    );

    run.enter(SplitStage::WriteNodes);
    let mut builder = IdMappingBuilder::new();
    let mut node_entries = Vec::with_capacity(partitions.len());
    for table in &partitions {
        builder.assign(table.population(), table.ids().iter().copied())?;
        let file = node_file_name(table.population());
        run.write_nodes(&output.join(&file), table, None)?;
        node_entries.push((table.population().to_string(), file));
    }

    run.enter(SplitStage::WriteEdges);
    let populations: Vec<&str> = partitions.iter().map(NodeTable::population).collect();
    run.write_pairs(output, &edges, &populations, &builder, EdgeAccounting::Exhaustive)?;

    run.enter(SplitStage::RewriteDescriptor);
    let edge_entries: Vec<(String, String)> = run
        .report
        .edge_files
        .iter()
        .filter(|(_, outcome)| outcome.written_path().is_some())
        .map(|(name, _)| (name.clone(), edge_file_name(name)))
        .collect();
    let descriptor =
        attribute_split_descriptor(&node_entries, &edge_entries, &options.synapse_type);
    let config_path = output.join(&options.circuit_config_file);
    descriptor.write(&config_path)?;
    run.report.circuit_config = Some(config_path);

    Ok(run.finish(builder.seal()))
}

/// Extract node set `node_set_name` of a single-population circuit
///
/// The output population is named after the node set and keeps the
/// selected nodes in ascending original id order. Only edges between
/// selected nodes are written.
pub fn simple_split_subcircuit(
    output: &Path,
    node_set_name: &str,
    node_set_path: &Path,
    nodes_path: &Path,
    edges_path: &Path,
    options: &SplitOptions,
) -> SplitResult<SplitReport> {
    let mut run = SplitRun::new(options, output)?;
    let nodes = NodePopulation::open(nodes_path, None)?;
    let edges = EdgePopulation::open(edges_path, None)?;
    let node_sets = load_node_sets(node_set_path)?;

    run.enter(SplitStage::Partition);
    let table = NodeTable::load(&nodes)?;
    let ids = materialize(&node_sets, node_set_name, &table)?;
    if ids.is_empty() {
        run.warn(format!("Node set {} selects no node of {}", node_set_name, nodes.name()));
    }
    let selected = table.select_ids(&ids)?.renamed(node_set_name);

    run.enter(SplitStage::WriteNodes);
    let mut builder = IdMappingBuilder::new();
    builder.assign(node_set_name, ids)?;
    run.write_nodes(&output.join(node_file_name(node_set_name)), &selected, None)?;

    run.enter(SplitStage::WriteEdges);
    run.write_pairs(output, &edges, &[node_set_name], &builder, EdgeAccounting::Subset)?;

    Ok(run.finish(builder.seal()))
}

/// Extract node set `node_set_name` from a whole circuit
///
/// Populations keep their names and file layout. Edge populations are
/// copied when both ends were selected. With `create_external`, nodes of
/// non-virtual populations that project into the selection become new
/// `external_*` virtual populations. With `do_virtual`, the virtual nodes
/// projecting into the selection are kept. Writes the id mapping audit, the
/// rewritten node sets and a rewritten descriptor.
pub fn split_subcircuit(
    output: &Path,
    node_set_name: &str,
    circuit_config_path: &Path,
    do_virtual: bool,
    create_external: bool,
    options: &SplitOptions,
) -> SplitResult<SplitReport> {
    let circuit = CircuitDescriptor::load(circuit_config_path)?;
    let node_sets_path = circuit.node_sets_path().ok_or_else(|| {
        SplitError::missing(format!(
            "circuit config {} has no node_sets_file",
            circuit_config_path.display()
        ))
    })?;
    let node_sets = load_node_sets(&node_sets_path)?;
    let layout = circuit.output_layout();

    let mut run = SplitRun::new(options, output)?;
    let edge_populations = circuit
        .edge_populations()
        .into_iter()
        .map(|info| -> SplitResult<_> {
            let edges = EdgePopulation::open(&info.file, Some(info.name.as_str()))?;
            Ok((info, edges))
        })
        .collect::<SplitResult<Vec<_>>>()?;

    run.enter(SplitStage::Partition);
    let mut node_populations = circuit.node_populations();
    node_populations.sort_by(|a, b| a.name.cmp(&b.name));
    let mut selections = Vec::new();
    for info in &node_populations {
        let nodes = NodePopulation::open(&info.file, Some(info.name.as_str()))?;
        let table = NodeTable::load(&nodes)?;
        let ids = materialize(&node_sets, node_set_name, &table)?;
        if !ids.is_empty() {
            tracing::debug!(
                target: "circuit-split",
                "Node set {} selects {} nodes of {}",
                node_set_name,
                ids.len(),
                info.name
            );
            selections.push(table.select_ids(&ids)?);
        }
    }
    if selections.is_empty() {
        run.warn(format!("Node set {} selects no node of the circuit", node_set_name));
    }

    run.enter(SplitStage::WriteNodes);
    let mut builder = IdMappingBuilder::new();
    for table in &selections {
        builder.assign(table.population(), table.ids().iter().copied())?;
        let path = output.join(layout_path(&layout.nodes, table.population(), "nodes"));
        run.write_nodes(&path, table, None)?;
    }

    run.enter(SplitStage::WriteEdges);
    for (info, edges) in &edge_populations {
        let source = edges.require_source_population()?;
        let target = edges.require_target_population()?;
        if !(builder.contains(source) && builder.contains(target)) {
            continue;
        }
        let copy = EdgeCopy {
            source: edges,
            name: &info.name,
            source_node_population: source,
            target_node_population: target,
            source_mapping: mapping_of(&builder, source)?,
            target_mapping: mapping_of(&builder, target)?,
        };
        let path = output.join(layout_path(&layout.edges, &info.name, "edges"));
        run.write_edges(&copy, &path, WriteMode::Append)?;
    }

    if create_external {
        run.enter(SplitStage::External);
        write_external(&mut run, output, &circuit, &edge_populations, &mut builder)?;
    }

    if do_virtual {
        run.enter(SplitStage::Virtual);
        write_virtual(&mut run, output, &circuit, &layout, &edge_populations, &mut builder)?;
    }

    run.enter(SplitStage::RewriteDescriptor);
    let id_mappings = builder.seal();
    id_mappings.write_audit(&output.join(&options.id_mapping_file))?;
    let config_path = rewrite_descriptor(&mut run, output, &circuit, &node_sets, &id_mappings)?;
    run.report.circuit_config = Some(config_path);

    Ok(run.finish(id_mappings))
}

/// Output path of `population` under the layout, or `<population>/<kind>.circ`
fn layout_path(layout: &BTreeMap<String, PathBuf>, population: &str, kind: &str) -> PathBuf {
    layout
        .get(population)
        .cloned()
        .unwrap_or_else(|| Path::new(population).join(format!("{}.{}", kind, FILE_EXTENSION)))
}

fn is_virtual(info: &PopulationInfo) -> bool {
    info.population_type.as_deref() == Some(VIRTUAL)
}

/// Sources of non-virtual populations projecting into the selection
fn write_external(
    run: &mut SplitRun<'_>,
    output: &Path,
    circuit: &CircuitDescriptor,
    edge_populations: &[(PopulationInfo, EdgePopulation)],
    builder: &mut IdMappingBuilder,
) -> SplitResult<()> {
    for (info, edges) in edge_populations {
        let source = edges.require_source_population()?;
        let target = edges.require_target_population()?;
        let source_info = circuit.node_population(source)?;
        if is_virtual(&source_info) || !builder.contains(target) {
            continue;
        }

        let source_nodes = NodePopulation::open(&source_info.file, Some(source))?;
        let unselected: NeedleSet = (0..source_nodes.node_count())
            .filter(|&id| builder.get(source).map_or(true, |m| !m.contains(id)))
            .collect();
        let target_mapping = mapping_of(builder, target)?;
        let needed =
            projecting_sources(&run.scanner, edges, &unselected, &target_mapping.needles())?;
        if needed.is_empty() {
            continue;
        }

        let name = format!("{}{}", EXTERNAL_PREFIX, info.name);
        tracing::info!(
            target: "circuit-split",
            "{} external nodes of {} project into {}",
            needed.len(),
            source,
            target
        );
        let mapping = PopulationMapping::assign(&name, needed)?;
        let copy = EdgeCopy {
            source: edges,
            name: &name,
            source_node_population: &name,
            target_node_population: target,
            source_mapping: &mapping,
            target_mapping,
        };
        let edges_path = output.join(format!("{}.{}", name, FILE_EXTENSION));
        run.write_edges(&copy, &edges_path, WriteMode::Create)?;

        let nodes_path = create_source_nodes(output, &name, mapping.len() as u64)?;
        run.report.node_files.insert(name.clone(), nodes_path);
        builder.insert(&name, mapping);
    }
    Ok(())
}

/// Sorted unique sources in `sources` of edges whose target is in `targets`
fn projecting_sources(
    scanner: &ChunkScanner,
    edges: &EdgePopulation,
    sources: &NeedleSet,
    targets: &NeedleSet,
) -> SplitResult<Vec<u64>> {
    let mut found = BTreeSet::new();
    for window in scanner.windows(edges.edge_count()) {
        let sgids = edges.source_ids(window.clone())?;
        let tgids = edges.target_ids(window)?;
        let source_mask = scanner.membership(&sgids, sources);
        let target_mask = scanner.membership(&tgids, targets);
        let mask: Vec<bool> = source_mask
            .iter()
            .zip(&target_mask)
            .map(|(&s, &t)| s && t)
            .collect();
        found.extend(masked(&sgids, &mask));
    }
    Ok(found.into_iter().collect())
}

/// Virtual populations projecting into the selection, with their edges
fn write_virtual(
    run: &mut SplitRun<'_>,
    output: &Path,
    circuit: &CircuitDescriptor,
    layout: &OutputLayout,
    edge_populations: &[(PopulationInfo, EdgePopulation)],
    builder: &mut IdMappingBuilder,
) -> SplitResult<()> {
    let mut virtual_edges = Vec::new();
    let mut used: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
    for (info, edges) in edge_populations {
        if run.report.edge_files.contains_key(&info.name) {
            continue;
        }
        let source = edges.require_source_population()?;
        let target = edges.require_target_population()?;
        if !is_virtual(&circuit.node_population(source)?) || !builder.contains(target) {
            continue;
        }

        let targets = mapping_of(builder, target)?.needles();
        let mut found = BTreeSet::new();
        for window in run.scanner.windows(edges.edge_count()) {
            let tgids = edges.target_ids(window.clone())?;
            let mask = run.scanner.membership(&tgids, &targets);
            if !mask.contains(&true) {
                continue;
            }
            let sgids = edges.source_ids(window)?;
            found.extend(masked(&sgids, &mask));
        }
        // no edge reaches the selection: the population keeps no mapping
        if found.is_empty() {
            tracing::debug!(
                target: "circuit-split",
                "No edges of {} reach the selection",
                info.name
            );
            continue;
        }
        used.entry(source.to_string()).or_default().extend(found);
        virtual_edges.push((info, edges, source, target));
    }

    for (population, ids) in &used {
        let added = builder.extend(population, ids.iter().copied());
        tracing::debug!(target: "circuit-split", "Kept {} virtual nodes of {}", added, population);
    }

    for (info, edges, source, target) in virtual_edges {
        let copy = EdgeCopy {
            source: edges,
            name: &info.name,
            source_node_population: source,
            target_node_population: target,
            source_mapping: mapping_of(builder, source)?,
            target_mapping: mapping_of(builder, target)?,
        };
        let path = output.join(layout_path(&layout.edges, &info.name, "edges"));
        run.write_edges(&copy, &path, WriteMode::Append)?;
    }

    for population in used.keys() {
        let mapping = mapping_of(builder, population)?;
        let info = circuit.node_population(population)?;
        let nodes = NodePopulation::open(&info.file, Some(population))?;
        let table = NodeTable::load(&nodes)?.select_ids(mapping.old_ids())?;
        let path = output.join(layout_path(&layout.nodes, population, "nodes"));
        run.write_nodes(&path, &table, Some(VIRTUAL))?;
    }
    Ok(())
}

/// Node sets and descriptor pointing at the output; returns the descriptor path
fn rewrite_descriptor(
    run: &mut SplitRun<'_>,
    output: &Path,
    circuit: &CircuitDescriptor,
    node_sets: &NodeSets,
    id_mappings: &IdMappings,
) -> SplitResult<PathBuf> {
    let mut descriptor = circuit.descriptor().clone();

    let updated = update_node_sets(node_sets, id_mappings, &mut run.report.warnings)?;
    write_node_sets(&output.join(NODE_SETS_FILE), &updated)?;
    descriptor.node_sets_file = Some(format!("{}/{}", BASE_DIR, NODE_SETS_FILE));
    descriptor.manifest = BTreeMap::from([(BASE_DIR.to_string(), "./".to_string())]);

    let node_files: BTreeMap<String, PopulationFile> = run
        .report
        .node_files
        .iter()
        .map(|(name, path)| (name.clone(), PopulationFile::Written(path.clone())))
        .collect();
    let edge_files: BTreeMap<String, PopulationFile> = run
        .report
        .edge_files
        .iter()
        .map(|(name, outcome)| {
            let file = match outcome.written_path() {
                Some(path) => PopulationFile::Written(path.to_path_buf()),
                None => PopulationFile::Removed,
            };
            (name.clone(), file)
        })
        .collect();

    let nodes = std::mem::take(&mut descriptor.networks.nodes);
    descriptor.networks.nodes = update_with_new_paths(output, nodes, &node_files, VIRTUAL)?;
    let edges = std::mem::take(&mut descriptor.networks.edges);
    descriptor.networks.edges =
        update_with_new_paths(output, edges, &edge_files, &run.options.synapse_type)?;

    let path = output.join(&run.options.circuit_config_file);
    descriptor.write(&path)?;
    Ok(path)
}
