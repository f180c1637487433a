// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tunables threaded through a split operation

use circuit_config::SplitConfig;

/// Whether every input edge must land in some output pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeAccounting {
    /// Input edge count must equal the summed output edge counts
    Exhaustive,
    /// Edges outside the extracted scope are dropped without a check
    Subset,
}

/// Options of one split operation
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOptions {
    pub read_chunk_size: usize,
    pub membership_window_divisor: usize,
    pub membership_min_window: usize,
    pub max_threads: usize,
    pub synapse_type: String,
    pub id_mapping_file: String,
    pub circuit_config_file: String,
}

impl SplitOptions {
    pub fn with_read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Edge population name for a (source, target) node population pair
    pub fn edge_population_name(&self, source: &str, target: &str) -> String {
        if source == target {
            source.to_string()
        } else {
            format!("{}__{}__{}", source, target, self.synapse_type)
        }
    }
}

impl From<&SplitConfig> for SplitOptions {
    fn from(config: &SplitConfig) -> Self {
        Self {
            read_chunk_size: config.read_chunk_size.max(1),
            membership_window_divisor: config.membership_window_divisor.max(1),
            membership_min_window: config.membership_min_window.max(1),
            max_threads: config.max_threads,
            synapse_type: config.synapse_type.clone(),
            id_mapping_file: config.id_mapping_file.clone(),
            circuit_config_file: config.circuit_config_file.clone(),
        }
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self::from(&SplitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_population_name() {
        let options = SplitOptions::default();
        assert_eq!(options.edge_population_name("src", "dst"), "src__dst__chemical");
        assert_eq!(options.edge_population_name("src", "src"), "src");
    }

    #[test]
    fn test_from_config() {
        let mut config = SplitConfig::default();
        config.read_chunk_size = 0;
        config.synapse_type = "electrical".to_string();
        let options = SplitOptions::from(&config);
        assert_eq!(options.read_chunk_size, 1);
        assert_eq!(options.edge_population_name("a", "b"), "a__b__electrical");
        assert_eq!(SplitOptions::default().read_chunk_size, 500_000_000);
    }
}
