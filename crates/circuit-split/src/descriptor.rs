// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Network descriptor (`circuit_config.json`) reading and rewriting.

The descriptor lists, for nodes and edges separately, entries of one file
and the populations it holds. Paths may use manifest variables such as
`$BASE_DIR`, which resolve relative to the descriptor's directory. After a
split the descriptor is rewritten to point at the new files and to forget
populations that no longer exist.
*/

use crate::{SplitError, SplitResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

pub const BASE_DIR: &str = "$BASE_DIR";

/// Common view of nodes and edges entries
pub trait NetworkEntry: Sized {
    fn file(&self) -> &str;
    fn set_file(&mut self, file: String);
    fn populations(&self) -> &BTreeMap<String, Value>;
    fn populations_mut(&mut self) -> &mut BTreeMap<String, Value>;
    fn from_parts(file: String, populations: BTreeMap<String, Value>) -> Self;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodesEntry {
    pub nodes_file: String,
    #[serde(default)]
    pub populations: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgesEntry {
    pub edges_file: String,
    #[serde(default)]
    pub populations: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NetworkEntry for NodesEntry {
    fn file(&self) -> &str {
        &self.nodes_file
    }

    fn set_file(&mut self, file: String) {
        self.nodes_file = file;
    }

    fn populations(&self) -> &BTreeMap<String, Value> {
        &self.populations
    }

    fn populations_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.populations
    }

    fn from_parts(file: String, populations: BTreeMap<String, Value>) -> Self {
        Self {
            nodes_file: file,
            populations,
            extra: Map::new(),
        }
    }
}

impl NetworkEntry for EdgesEntry {
    fn file(&self) -> &str {
        &self.edges_file
    }

    fn set_file(&mut self, file: String) {
        self.edges_file = file;
    }

    fn populations(&self) -> &BTreeMap<String, Value> {
        &self.populations
    }

    fn populations_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.populations
    }

    fn from_parts(file: String, populations: BTreeMap<String, Value>) -> Self {
        Self {
            edges_file: file,
            populations,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub nodes: Vec<NodesEntry>,
    #[serde(default)]
    pub edges: Vec<EdgesEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contents of a descriptor file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    #[serde(default)]
    pub manifest: BTreeMap<String, String>,
    #[serde(default)]
    pub networks: Networks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_sets_file: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NetworkDescriptor {
    pub fn load(path: &Path) -> SplitResult<Self> {
        let file = File::open(path)
            .map_err(|e| SplitError::missing(format!("circuit config {}: {}", path.display(), e)))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn write(&self, path: &Path) -> SplitResult<()> {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), self)?;
        tracing::debug!(target: "circuit-split", "Written circuit config {}", path.display());
        Ok(())
    }
}

/// A population as declared by a descriptor, with its file resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationInfo {
    pub name: String,
    pub file: PathBuf,
    pub population_type: Option<String>,
}

/// A loaded descriptor together with the directory it resolves against
#[derive(Debug, Clone)]
pub struct CircuitDescriptor {
    descriptor: NetworkDescriptor,
    config_dir: PathBuf,
}

impl CircuitDescriptor {
    pub fn load(path: &Path) -> SplitResult<Self> {
        let descriptor = NetworkDescriptor::load(path)?;
        let config_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self {
            descriptor,
            config_dir,
        })
    }

    pub fn new(descriptor: NetworkDescriptor, config_dir: PathBuf) -> Self {
        Self {
            descriptor,
            config_dir,
        }
    }

    pub fn descriptor(&self) -> &NetworkDescriptor {
        &self.descriptor
    }

    /// Expand manifest variables and anchor relative paths at the descriptor's directory
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let mut variables: Vec<(&String, &String)> = self.descriptor.manifest.iter().collect();
        // longest first, so `$BASE_DIR` is not eaten by a `$BASE` variable
        variables.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));

        let mut expanded = raw.to_string();
        for _ in 0..=variables.len() {
            let before = expanded.clone();
            for (name, value) in &variables {
                expanded = expanded.replace(name.as_str(), value);
            }
            if expanded == before {
                break;
            }
        }

        let path = PathBuf::from(expanded);
        let anchored = if path.is_relative() {
            self.config_dir.join(path)
        } else {
            path
        };
        anchored
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }

    pub fn node_populations(&self) -> Vec<PopulationInfo> {
        self.collect(&self.descriptor.networks.nodes)
    }

    pub fn edge_populations(&self) -> Vec<PopulationInfo> {
        self.collect(&self.descriptor.networks.edges)
    }

    pub fn node_population(&self, name: &str) -> SplitResult<PopulationInfo> {
        self.node_populations()
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                SplitError::missing(format!("node population {} not in circuit config", name))
            })
    }

    pub fn node_sets_path(&self) -> Option<PathBuf> {
        self.descriptor
            .node_sets_file
            .as_deref()
            .map(|raw| self.resolve(raw))
    }

    /// Output paths, relative to the output directory, of every population
    pub fn output_layout(&self) -> OutputLayout {
        let mut resolved = self.descriptor.networks.clone();
        for entry in &mut resolved.nodes {
            entry.nodes_file = self.resolve(&entry.nodes_file).to_string_lossy().into_owned();
        }
        for entry in &mut resolved.edges {
            entry.edges_file = self.resolve(&entry.edges_file).to_string_lossy().into_owned();
        }
        gather_layout(&resolved)
    }

    fn collect<E: NetworkEntry>(&self, entries: &[E]) -> Vec<PopulationInfo> {
        entries
            .iter()
            .flat_map(|entry| {
                let file = self.resolve(entry.file());
                entry.populations().iter().map(move |(name, meta)| PopulationInfo {
                    name: name.clone(),
                    file: file.clone(),
                    population_type: meta.get("type").and_then(Value::as_str).map(str::to_string),
                })
            })
            .collect()
    }
}

/// Where each population of a descriptor goes in the output directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputLayout {
    pub nodes: BTreeMap<String, PathBuf>,
    pub edges: BTreeMap<String, PathBuf>,
}

/// Derive output paths from the entries of `networks`
///
/// A single-population entry goes to `<population>/<file name>`; the
/// populations of a multi-population entry share
/// `<parent directory name>/<file name>`.
pub fn gather_layout(networks: &Networks) -> OutputLayout {
    fn extract<E: NetworkEntry>(entries: &[E]) -> BTreeMap<String, PathBuf> {
        let mut paths = BTreeMap::new();
        for entry in entries {
            let file = Path::new(entry.file());
            let filename = file.file_name().map(PathBuf::from).unwrap_or_default();
            let populations = entry.populations();
            if populations.len() == 1 {
                for name in populations.keys() {
                    paths.insert(name.clone(), Path::new(name).join(&filename));
                }
            } else {
                let parent = file
                    .parent()
                    .and_then(Path::file_name)
                    .map(PathBuf::from)
                    .unwrap_or_default();
                for name in populations.keys() {
                    paths.insert(name.clone(), parent.join(&filename));
                }
            }
        }
        paths
    }

    OutputLayout {
        nodes: extract(&networks.nodes),
        edges: extract(&networks.edges),
    }
}

/// Final state of a population produced by a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulationFile {
    Written(PathBuf),
    /// Generated empty and removed
    Removed,
}

/// Point entries at the new files; drop populations without one
///
/// Every written file must lie under `output`. Written populations the
/// descriptor does not know must be `external_*` ones; they are appended as
/// new entries whose population `type` is `new_population_type`.
pub fn update_with_new_paths<E: NetworkEntry>(
    output: &Path,
    entries: Vec<E>,
    files: &BTreeMap<String, PopulationFile>,
    new_population_type: &str,
) -> SplitResult<Vec<E>> {
    let mut remaining: BTreeMap<&str, &PopulationFile> =
        files.iter().map(|(name, file)| (name.as_str(), file)).collect();

    let mut updated = Vec::with_capacity(entries.len());
    for mut entry in entries {
        let mut new_file: Option<String> = None;
        let mut kept = BTreeMap::new();
        for (population, meta) in entry.populations() {
            let Some(PopulationFile::Written(path)) = remaining.remove(population.as_str()) else {
                continue;
            };
            let file = base_relative(output, path)?;
            match &new_file {
                Some(existing) if existing != &file => {
                    return Err(SplitError::OutputLayout(format!(
                        "populations of one entry written to different files: {} and {}",
                        existing, file
                    )))
                }
                _ => new_file = Some(file),
            }
            kept.insert(population.clone(), meta.clone());
        }
        if let Some(file) = new_file {
            entry.set_file(file);
            *entry.populations_mut() = kept;
            updated.push(entry);
        }
    }

    if let Some(unused) = remaining.keys().find(|name| !name.starts_with("external")) {
        return Err(SplitError::OutputLayout(format!(
            "Did not use all populations: {} has no entry",
            unused
        )));
    }
    for (population, file) in remaining {
        if let PopulationFile::Written(path) = file {
            let mut populations = BTreeMap::new();
            populations.insert(population.to_string(), json!({ "type": new_population_type }));
            updated.push(E::from_parts(base_relative(output, path)?, populations));
        }
    }
    Ok(updated)
}

/// `$BASE_DIR/<path relative to output>`
fn base_relative(output: &Path, path: &Path) -> SplitResult<String> {
    let relative = path.strip_prefix(output).map_err(|_| {
        SplitError::OutputLayout(format!(
            "missing output path ({}) in {}",
            output.display(),
            path.display()
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(format!("{}/{}", BASE_DIR, parts.join("/")))
}

/// Descriptor of the files written by an attribute split
pub fn attribute_split_descriptor(
    node_files: &[(String, String)],
    edge_files: &[(String, String)],
    synapse_type: &str,
) -> NetworkDescriptor {
    let mut descriptor = NetworkDescriptor::default();
    descriptor.manifest.insert(BASE_DIR.to_string(), ".".to_string());

    for (population, file) in node_files {
        let mut entry = NodesEntry::from_parts(
            format!("{}/{}", BASE_DIR, file),
            BTreeMap::from([(population.clone(), json!({}))]),
        );
        entry.extra.insert("node_types_file".to_string(), Value::Null);
        descriptor.networks.nodes.push(entry);
    }
    for (population, file) in edge_files {
        let mut entry = EdgesEntry::from_parts(
            format!("{}/{}", BASE_DIR, file),
            BTreeMap::from([(population.clone(), json!({ "type": synapse_type }))]),
        );
        entry.extra.insert("edge_types_file".to_string(), Value::Null);
        descriptor.networks.edges.push(entry);
    }
    descriptor
}
