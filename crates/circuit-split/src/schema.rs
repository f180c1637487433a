// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Attribute schema of a population group.

A population stores its attributes in exactly one group named `0`, which
may hold a single `dynamics_params` subgroup of row-aligned parameters.
The schema is resolved once when a population is opened, so later copy and
append steps work from a typed list instead of probing the file.
*/

use crate::{SplitError, SplitResult};
use circuit_container::{ContainerReader, ContainerWriter, DType, DatasetLayout};
use std::collections::BTreeMap;
use std::ops::Range;

/// Name of the single supported attribute group
pub const GROUP_NAME: &str = "0";

/// Only subgroup allowed inside the attribute group
pub const DYNAMICS_PARAMS: &str = "dynamics_params";

/// One attribute dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    pub name: String,
    pub dtype: DType,
    pub width: usize,
}

/// Datasets of an attribute group, in name order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSchema {
    pub attributes: Vec<AttributeSpec>,
    pub dynamics_params: Option<Vec<AttributeSpec>>,
}

impl GroupSchema {
    /// Read the schema of the group at `group_path`
    pub fn resolve(reader: &ContainerReader, group_path: &str) -> SplitResult<Self> {
        let group = reader.group(group_path)?;

        let mut dynamics_params = None;
        for (name, subgroup) in &group.groups {
            if name != DYNAMICS_PARAMS {
                return Err(SplitError::structural(format!(
                    "Only \"{}\" group is expected in {}, found {}",
                    DYNAMICS_PARAMS, group_path, name
                )));
            }
            if let Some(nested) = subgroup.groups.keys().next() {
                return Err(SplitError::structural(format!(
                    "{} has a subgroup: {}",
                    DYNAMICS_PARAMS, nested
                )));
            }
            dynamics_params = Some(specs(&subgroup.datasets));
        }

        Ok(Self {
            attributes: specs(&group.datasets),
            dynamics_params,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Create the empty, appendable datasets of this schema under `group_path`
    pub fn create_in(&self, writer: &mut ContainerWriter, group_path: &str) -> SplitResult<()> {
        writer.create_group(group_path)?;
        for spec in &self.attributes {
            let path = format!("{}/{}", group_path, spec.name);
            writer.create_dataset(&path, spec.dtype, spec.width)?;
        }
        if let Some(params) = &self.dynamics_params {
            let params_path = format!("{}/{}", group_path, DYNAMICS_PARAMS);
            writer.create_group(&params_path)?;
            for spec in params {
                let path = format!("{}/{}", params_path, spec.name);
                writer.create_dataset(&path, spec.dtype, spec.width)?;
            }
        }
        Ok(())
    }

    /// Append the masked rows of `window` from every source dataset to its counterpart
    pub fn append_filtered(
        &self,
        reader: &ContainerReader,
        source_group: &str,
        writer: &mut ContainerWriter,
        target_group: &str,
        window: Range<u64>,
        mask: &[bool],
    ) -> SplitResult<()> {
        let params = self.dynamics_params.iter().flatten().map(|spec| {
            (
                format!("{}/{}/{}", source_group, DYNAMICS_PARAMS, spec.name),
                format!("{}/{}/{}", target_group, DYNAMICS_PARAMS, spec.name),
            )
        });
        let attributes = self.attributes.iter().map(|spec| {
            (
                format!("{}/{}", source_group, spec.name),
                format!("{}/{}", target_group, spec.name),
            )
        });

        for (source, target) in attributes.chain(params) {
            let rows = reader.read_window(&source, window.clone())?;
            writer.append(&target, &rows.filter(mask)?)?;
        }
        Ok(())
    }
}

fn specs(datasets: &BTreeMap<String, DatasetLayout>) -> Vec<AttributeSpec> {
    datasets
        .iter()
        .map(|(name, layout)| AttributeSpec {
            name: name.clone(),
            dtype: layout.dtype,
            width: layout.width,
        })
        .collect()
}

/// Name of the only population under `kind` (`nodes` or `edges`)
pub fn unique_population(reader: &ContainerReader, kind: &str) -> SplitResult<String> {
    let names = reader.group_names(kind).map_err(|_| {
        SplitError::structural(format!("{} has no {} group", reader.path().display(), kind))
    })?;
    match names.as_slice() {
        [name] => Ok(name.clone()),
        _ => Err(SplitError::structural(format!(
            "Single population is supported only, found {:?}",
            names
        ))),
    }
}

/// Path of the attribute group of the population at `population_path`
///
/// Group `0` must exist; any other numbered group means a multi-group
/// population, which is rejected.
pub fn unique_group(reader: &ContainerReader, population_path: &str) -> SplitResult<String> {
    let names = reader.group_names(population_path)?;
    if !names.iter().any(|n| n == GROUP_NAME) {
        return Err(SplitError::structural(format!(
            "Single group '{}' is required in {}",
            GROUP_NAME, population_path
        )));
    }
    if let Some(extra) = names
        .iter()
        .find(|n| n.as_str() != GROUP_NAME && n.parse::<u64>().is_ok())
    {
        return Err(SplitError::structural(format!(
            "Single group '{}' is supported only, {} also has group '{}'",
            GROUP_NAME, population_path, extra
        )));
    }
    Ok(format!("{}/{}", population_path, GROUP_NAME))
}
