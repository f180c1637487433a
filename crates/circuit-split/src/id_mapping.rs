// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Old-id to new-id mappings.

Each population maps its original node ids onto `0..n` in order of first
appearance. Mappings only ever grow: [`IdMappingBuilder`] accepts
extensions while optional phases discover more ids, and is sealed into an
immutable [`IdMappings`] before the descriptor is rewritten.
*/

use crate::scanner::NeedleSet;
use crate::{SplitError, SplitResult};
use ahash::AHashMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Mapping of one population; new id of `old_ids()[k]` is `k`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationMapping {
    old_ids: Vec<u64>,
    lookup: AHashMap<u64, u64>,
}

impl PopulationMapping {
    /// Fresh mapping assigning `0..n` in the given order; duplicates are an error
    pub fn assign<I>(population: &str, old_ids: I) -> SplitResult<Self>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut mapping = PopulationMapping::default();
        for old in old_ids {
            if mapping.lookup.contains_key(&old) {
                return Err(SplitError::InvalidArgument(format!(
                    "duplicate id {} assigned to population {}",
                    old, population
                )));
            }
            mapping.push(old);
        }
        Ok(mapping)
    }

    /// Append ids not yet present, continuing numbering; returns how many were added
    pub fn extend<I>(&mut self, old_ids: I) -> usize
    where
        I: IntoIterator<Item = u64>,
    {
        let before = self.old_ids.len();
        for old in old_ids {
            if !self.lookup.contains_key(&old) {
                self.push(old);
            }
        }
        self.old_ids.len() - before
    }

    fn push(&mut self, old: u64) {
        let new = self.old_ids.len() as u64;
        self.old_ids.push(old);
        self.lookup.insert(old, new);
    }

    pub fn lookup(&self, old: u64) -> Option<u64> {
        self.lookup.get(&old).copied()
    }

    pub fn contains(&self, old: u64) -> bool {
        self.lookup.contains_key(&old)
    }

    pub fn len(&self) -> usize {
        self.old_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old_ids.is_empty()
    }

    /// Old ids in assignment order
    pub fn old_ids(&self) -> &[u64] {
        &self.old_ids
    }

    /// New ids, parallel to `old_ids()`
    pub fn new_ids(&self) -> impl Iterator<Item = u64> {
        0..self.old_ids.len() as u64
    }

    pub fn needles(&self) -> NeedleSet {
        self.old_ids.iter().collect()
    }

    /// Remap ids that are all known to be present
    pub fn remap(&self, population: &str, old_ids: &[u64]) -> SplitResult<Vec<u64>> {
        old_ids
            .iter()
            .map(|&old| {
                self.lookup(old).ok_or_else(|| {
                    SplitError::missing(format!(
                        "id {} not mapped in population {}",
                        old, population
                    ))
                })
            })
            .collect()
    }
}

/// Mappings under construction
#[derive(Debug, Clone, Default)]
pub struct IdMappingBuilder {
    order: Vec<String>,
    mappings: AHashMap<String, PopulationMapping>,
}

impl IdMappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the mapping of a population that has none yet
    pub fn assign<I>(&mut self, population: &str, old_ids: I) -> SplitResult<&PopulationMapping>
    where
        I: IntoIterator<Item = u64>,
    {
        if self.mappings.contains_key(population) {
            return Err(SplitError::InvalidArgument(format!(
                "population {} already has an id mapping",
                population
            )));
        }
        let mapping = PopulationMapping::assign(population, old_ids)?;
        self.insert(population, mapping);
        Ok(&self.mappings[population])
    }

    /// Insert a mapping built elsewhere
    pub fn insert(&mut self, population: &str, mapping: PopulationMapping) {
        if self.mappings.insert(population.to_string(), mapping).is_none() {
            self.order.push(population.to_string());
        }
    }

    /// Extend a population's mapping, creating it if needed
    pub fn extend<I>(&mut self, population: &str, old_ids: I) -> usize
    where
        I: IntoIterator<Item = u64>,
    {
        if !self.mappings.contains_key(population) {
            self.order.push(population.to_string());
        }
        self.mappings
            .entry(population.to_string())
            .or_default()
            .extend(old_ids)
    }

    pub fn get(&self, population: &str) -> Option<&PopulationMapping> {
        self.mappings.get(population)
    }

    pub fn contains(&self, population: &str) -> bool {
        self.mappings.contains_key(population)
    }

    pub fn lookup(&self, population: &str, old: u64) -> SplitResult<u64> {
        self.get(population)
            .ok_or_else(|| {
                SplitError::missing(format!("no id mapping for population {}", population))
            })?
            .lookup(old)
            .ok_or_else(|| {
                SplitError::missing(format!("id {} not mapped in population {}", old, population))
            })
    }

    /// Population names in creation order
    pub fn populations(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn seal(self) -> IdMappings {
        IdMappings {
            order: self.order,
            mappings: self.mappings,
        }
    }
}

/// Final, read-only mappings of a split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMappings {
    order: Vec<String>,
    mappings: AHashMap<String, PopulationMapping>,
}

/// One population of the audit file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingAudit {
    pub old_id: Vec<u64>,
    pub new_id: Vec<u64>,
}

impl IdMappings {
    pub fn get(&self, population: &str) -> Option<&PopulationMapping> {
        self.mappings.get(population)
    }

    pub fn contains(&self, population: &str) -> bool {
        self.mappings.contains_key(population)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn populations(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PopulationMapping)> {
        self.order
            .iter()
            .filter_map(move |name| self.mappings.get(name).map(|m| (name.as_str(), m)))
    }

    pub fn audit(&self, population: &str) -> Option<MappingAudit> {
        self.get(population).map(|m| MappingAudit {
            old_id: m.old_ids().to_vec(),
            new_id: m.new_ids().collect(),
        })
    }

    /// Write `{population: {old_id: [...], new_id: [...]}}` as JSON
    pub fn write_audit(&self, path: &Path) -> SplitResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        tracing::debug!(target: "circuit-split", "Wrote id mapping {}", path.display());
        Ok(())
    }
}

impl Serialize for IdMappings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for (name, mapping) in self.iter() {
            let entry = MappingAudit {
                old_id: mapping.old_ids().to_vec(),
                new_id: mapping.new_ids().collect(),
            };
            map.serialize_entry(name, &entry)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_assign_preserves_order() {
        let mapping = PopulationMapping::assign("A", vec![5, 4, 3, 0]).unwrap();
        assert_eq!(mapping.lookup(5), Some(0));
        assert_eq!(mapping.lookup(0), Some(3));
        assert_eq!(mapping.lookup(1), None);
        assert_eq!(mapping.remap("A", &[3, 5]).unwrap(), vec![2, 0]);
        assert!(mapping.remap("A", &[1]).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        assert!(matches!(
            PopulationMapping::assign("A", vec![1, 2, 1]),
            Err(SplitError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_extend_skips_known_ids() {
        let mut mapping = PopulationMapping::assign("A", vec![10, 20]).unwrap();
        let added = mapping.extend(vec![20, 30, 10, 40, 30]);
        assert_eq!(added, 2);
        assert_eq!(mapping.old_ids(), &[10, 20, 30, 40]);
        assert_eq!(mapping.lookup(40), Some(3));
    }

    #[test]
    fn test_builder_extend_creates_and_orders() {
        let mut builder = IdMappingBuilder::new();
        builder.assign("B", vec![2, 1]).unwrap();
        builder.extend("A", vec![7]);
        builder.extend("A", vec![7, 8]);
        assert!(builder.assign("B", vec![0]).is_err());
        assert_eq!(builder.lookup("A", 8).unwrap(), 1);
        assert!(builder.lookup("C", 0).is_err());

        let sealed = builder.seal();
        assert_eq!(sealed.populations().collect::<Vec<_>>(), vec!["B", "A"]);
        assert_eq!(
            sealed.audit("B"),
            Some(MappingAudit {
                old_id: vec![2, 1],
                new_id: vec![0, 1]
            })
        );
    }

    #[test]
    fn test_audit_json() {
        let mut builder = IdMappingBuilder::new();
        builder.assign("A", vec![0, 2, 4]).unwrap();
        let json = serde_json::to_value(builder.seal()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"A": {"old_id": [0, 2, 4], "new_id": [0, 1, 2]}})
        );
    }

    proptest! {
        #[test]
        fn prop_mapping_is_order_preserving_bijection(
            ids in proptest::collection::vec(0u64..10_000, 0..300)
        ) {
            // first appearance order of the unique ids
            let mut seen = ahash::AHashSet::new();
            let unique: Vec<u64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

            let mapping = PopulationMapping::assign("P", unique.clone()).unwrap();
            let mut new_ids: Vec<u64> =
                unique.iter().map(|&o| mapping.lookup(o).unwrap()).collect();
            prop_assert_eq!(&new_ids, &(0..unique.len() as u64).collect::<Vec<_>>());
            new_ids.sort_unstable();
            new_ids.dedup();
            prop_assert_eq!(new_ids.len(), unique.len());

            let mut extended = PopulationMapping::default();
            extended.extend(ids.iter().copied());
            prop_assert_eq!(extended.old_ids(), mapping.old_ids());
        }
    }
}
