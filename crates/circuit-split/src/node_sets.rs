// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Named node sets.

A node-set file maps names to rules. A rule is either a list of other
node-set names (their union), or an object whose keys all have to match:

- `population`: a name or a list of names
- `node_id`: an id or a list of ids
- any other key: an attribute, compared against a value or a list of values

After a split, rules naming ids are rewritten through the id mapping.
*/

use crate::id_mapping::IdMappings;
use crate::nodes::NodeTable;
use crate::{SplitError, SplitResult};
use circuit_container::Scalar;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub type NodeSets = Map<String, Value>;

const POPULATION: &str = "population";
const NODE_ID: &str = "node_id";

pub fn load_node_sets(path: &Path) -> SplitResult<NodeSets> {
    let file = File::open(path)
        .map_err(|e| SplitError::missing(format!("node set file {}: {}", path.display(), e)))?;
    match serde_json::from_reader(BufReader::new(file))? {
        Value::Object(map) => Ok(map),
        _ => Err(SplitError::structural(format!(
            "node set file {} is not a JSON object",
            path.display()
        ))),
    }
}

pub fn write_node_sets(path: &Path, node_sets: &NodeSets) -> SplitResult<()> {
    serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), node_sets)?;
    Ok(())
}

/// Sorted, unique original ids of `table` selected by node set `name`
pub fn materialize(node_sets: &NodeSets, name: &str, table: &NodeTable) -> SplitResult<Vec<u64>> {
    let mut stack = Vec::new();
    let mask = resolve(node_sets, name, table, &mut stack)?;
    let mut ids: Vec<u64> = table
        .ids()
        .iter()
        .zip(&mask)
        .filter_map(|(&id, &selected)| selected.then_some(id))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn resolve<'a>(
    node_sets: &'a NodeSets,
    name: &'a str,
    table: &NodeTable,
    stack: &mut Vec<&'a str>,
) -> SplitResult<Vec<bool>> {
    let rule = node_sets
        .get(name)
        .ok_or_else(|| SplitError::missing(format!("node set {} not found", name)))?;
    if stack.contains(&name) {
        return Err(SplitError::structural(format!(
            "node set {} refers to itself through {:?}",
            name, stack
        )));
    }
    stack.push(name);

    let mask = match rule {
        Value::Array(members) => {
            let mut union = vec![false; table.len()];
            for member in members {
                let member = member.as_str().ok_or_else(|| {
                    SplitError::structural(format!(
                        "node set {} lists a non-name: {}",
                        name, member
                    ))
                })?;
                for (u, m) in union.iter_mut().zip(resolve(node_sets, member, table, stack)?) {
                    *u |= m;
                }
            }
            union
        }
        Value::Object(predicates) => evaluate(name, predicates, table)?,
        other => {
            return Err(SplitError::structural(format!(
                "node set {} has an unsupported rule: {}",
                name, other
            )))
        }
    };

    stack.pop();
    Ok(mask)
}

fn evaluate(
    name: &str,
    predicates: &Map<String, Value>,
    table: &NodeTable,
) -> SplitResult<Vec<bool>> {
    let mut mask = vec![true; table.len()];
    for (key, expected) in predicates {
        match key.as_str() {
            POPULATION => {
                let matches = one_or_many(expected)
                    .iter()
                    .any(|v| v.as_str() == Some(table.population()));
                if !matches {
                    mask.iter_mut().for_each(|m| *m = false);
                }
            }
            NODE_ID => {
                let wanted = ids_of(name, expected)?;
                for (m, id) in mask.iter_mut().zip(table.ids()) {
                    *m &= wanted.contains(id);
                }
            }
            attribute => match table.attribute(attribute) {
                // populations lacking the attribute have no matching nodes
                None => mask.iter_mut().for_each(|m| *m = false),
                Some(column) => {
                    let accepted = one_or_many(expected);
                    if let Some(bad) = accepted.iter().find(|v| v.is_object() || v.is_array()) {
                        return Err(SplitError::InvalidArgument(format!(
                            "node set {}: unsupported predicate for {}: {}",
                            name, attribute, bad
                        )));
                    }
                    for (row, m) in mask.iter_mut().enumerate() {
                        if *m {
                            *m = column.scalar_at(row).map_or(false, |actual| {
                                accepted.iter().any(|v| value_matches(v, actual))
                            });
                        }
                    }
                }
            },
        }
    }
    Ok(mask)
}

fn one_or_many(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(values) => values.iter().collect(),
        single => vec![single],
    }
}

fn ids_of(name: &str, value: &Value) -> SplitResult<ahash::AHashSet<u64>> {
    one_or_many(value)
        .into_iter()
        .map(|v| {
            v.as_u64().ok_or_else(|| {
                SplitError::structural(format!("node set {} has a non-id node_id: {}", name, v))
            })
        })
        .collect()
}

fn value_matches(expected: &Value, actual: Scalar<'_>) -> bool {
    match (expected, actual) {
        (Value::String(s), Scalar::Str(a)) => s == a,
        (Value::Number(n), Scalar::Int(a)) => match n.as_i64() {
            Some(v) => v == a,
            None => n.as_f64() == Some(a as f64),
        },
        (Value::Number(n), Scalar::UInt(a)) => match n.as_u64() {
            Some(v) => v == a,
            None => n.as_f64() == Some(a as f64),
        },
        (Value::Number(n), Scalar::Float(a)) => n.as_f64() == Some(a),
        _ => false,
    }
}

/// Rewrite id-based rules through `mappings`
///
/// Rules with `node_id` keep only ids present in the mapping of their
/// population, replaced by the new ids in ascending order. Such rules are
/// dropped, with a warning, when they name no population or a population
/// the split did not produce. Every other rule passes through unchanged.
pub fn update_node_sets(
    node_sets: &NodeSets,
    mappings: &IdMappings,
    warnings: &mut Vec<String>,
) -> SplitResult<NodeSets> {
    let mut updated = NodeSets::new();
    for (name, rule) in node_sets {
        let predicates = match rule {
            Value::Object(predicates) if predicates.contains_key(NODE_ID) => predicates,
            _ => {
                updated.insert(name.clone(), rule.clone());
                continue;
            }
        };

        let Some(population) = predicates.get(POPULATION) else {
            warn(warnings, format!("No population key in nodeset {}, ignoring", name));
            continue;
        };
        let Some(mapping) = population.as_str().and_then(|p| mappings.get(p)) else {
            warn(
                warnings,
                format!(
                    "Population {} of nodeset {} is not in the split, ignoring",
                    population, name
                ),
            );
            continue;
        };

        let wanted = ids_of(name, &predicates[NODE_ID])?;
        let mut new_ids: Vec<u64> = wanted.iter().filter_map(|&old| mapping.lookup(old)).collect();
        new_ids.sort_unstable();

        let mut rule = predicates.clone();
        rule.insert(NODE_ID.to_string(), Value::from(new_ids));
        updated.insert(name.clone(), Value::Object(rule));
    }
    Ok(updated)
}

fn warn(warnings: &mut Vec<String>, message: String) {
    tracing::warn!(target: "circuit-split", "{}", message);
    warnings.push(message);
}
