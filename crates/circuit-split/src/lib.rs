// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Circuit Split

Population splitting and subcircuit extraction for node/edge circuits stored
in [`circuit_container`] files.

## Pipeline

1. **Partition** nodes: by attribute value, or by a named node set
2. **Map ids**: every output population gets a dense `0..n` id space
   ([`IdMappingBuilder`])
3. **Copy edges**: input edges are streamed in windows, filtered by a
   parallel membership test ([`ChunkScanner`]), remapped and written with
   all their attributes ([`EdgeCopy`])
4. **Index**: each written edge population gets its directional range
   indices ([`write_indices`])
5. **Describe**: a network descriptor pointing at the new files is written
   ([`NetworkDescriptor`])

## Usage

```rust,no_run
use circuit_split::{split_population, SplitOptions};
use std::path::Path;

let report = split_population(
    Path::new("out"),
    "mtype",
    Path::new("nodes.circ"),
    Path::new("edges.circ"),
    &SplitOptions::default(),
)?;
println!("{} edges written", report.edges_written);
# Ok::<(), circuit_split::SplitError>(())
```
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod descriptor;
pub mod edges;
pub mod error;
pub mod id_mapping;
pub mod index;
pub mod node_sets;
pub mod nodes;
pub mod options;
pub mod population;
pub mod scanner;
pub mod schema;
pub mod split;

pub use descriptor::{
    CircuitDescriptor, EdgesEntry, NetworkDescriptor, Networks, NodesEntry, OutputLayout,
    PopulationFile, PopulationInfo,
};
pub use edges::{write_edge_population, EdgeCopy, EdgeFileOutcome, WriteMode};
pub use error::{SplitError, SplitErrorKind, SplitResult};
pub use id_mapping::{IdMappingBuilder, IdMappings, MappingAudit, PopulationMapping};
pub use index::{write_indices, EdgeIndex, IndexSummary, RangeIndex};
pub use node_sets::{load_node_sets, materialize, update_node_sets, NodeSets};
pub use nodes::NodeTable;
pub use options::{EdgeAccounting, SplitOptions};
pub use population::{EdgePopulation, NodePopulation};
pub use scanner::{ChunkScanner, NeedleSet};
pub use split::{
    edge_file_name, node_file_name, simple_split_subcircuit, split_population, split_subcircuit,
    SplitReport, SplitStage,
};
