//! Spec validation gating create and update.

use std::collections::{HashMap, HashSet};

use ipnet::IpNet;
use thiserror::Error;

use crate::resource::VirtualMachineSpec;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("invalid network cidr {cidr:?}: {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("server replicas must be at least 1")]
    NoReplicas,

    #[error("volume {0} is declared more than once")]
    DuplicateVolume(String),

    #[error("volume {0} must have a non-zero size")]
    ZeroVolumeSize(String),

    #[error("{field} is immutable (was {prior:?}, got {next:?})")]
    Immutable {
        field: &'static str,
        prior: String,
        next: String,
    },

    #[error("volume {0} cannot be removed")]
    VolumeRemoved(String),

    #[error("volume {name} cannot change type from {prior:?} to {next:?}")]
    VolumeTypeChanged { name: String, prior: String, next: String },

    #[error("volume {name} cannot shrink from {prior} to {next}")]
    VolumeShrunk { name: String, prior: u32, next: u32 },
}

fn require(value: &str, field: &'static str) -> Result<(), SpecError> {
    if value.trim().is_empty() {
        return Err(SpecError::Empty(field));
    }
    Ok(())
}

/// Structural validation of a spec on its own.
pub fn valid_spec(spec: &VirtualMachineSpec) -> Result<(), SpecError> {
    require(&spec.project.project_id, "project.project_id")?;
    require(&spec.project.token, "project.token")?;

    require(&spec.network.name, "network.name")?;
    require(&spec.network.cidr, "network.cidr")?;
    spec.network
        .cidr
        .parse::<IpNet>()
        .map_err(|e| SpecError::InvalidCidr {
            cidr: spec.network.cidr.clone(),
            reason: e.to_string(),
        })?;

    require(&spec.server.name, "server.name")?;
    require(&spec.server.image, "server.image")?;
    require(&spec.server.flavor, "server.flavor")?;
    if spec.server.replicas == 0 {
        return Err(SpecError::NoReplicas);
    }

    let mut seen = HashSet::new();
    for volume in &spec.volume {
        require(&volume.volume_name, "volume.volume_name")?;
        if !seen.insert(volume.volume_name.as_str()) {
            return Err(SpecError::DuplicateVolume(volume.volume_name.clone()));
        }
        if volume.volume_size == 0 {
            return Err(SpecError::ZeroVolumeSize(volume.volume_name.clone()));
        }
    }

    Ok(())
}

fn immutable(field: &'static str, prior: &str, next: &str) -> Result<(), SpecError> {
    if prior != next {
        return Err(SpecError::Immutable {
            field,
            prior: prior.to_string(),
            next: next.to_string(),
        });
    }
    Ok(())
}

/// Validate `next` as an update of the previously accepted `prior`.
pub fn valid_update_spec(prior: &VirtualMachineSpec, next: &VirtualMachineSpec) -> Result<(), SpecError> {
    valid_spec(next)?;

    immutable("project.project_id", &prior.project.project_id, &next.project.project_id)?;
    immutable("network.name", &prior.network.name, &next.network.name)?;
    immutable("network.cidr", &prior.network.cidr, &next.network.cidr)?;
    immutable("network.neutron_az", &prior.network.neutron_az, &next.network.neutron_az)?;

    let next_volumes: HashMap<_, _> = next
        .volume
        .iter()
        .map(|v| (v.volume_name.as_str(), v))
        .collect();

    for old in &prior.volume {
        let Some(new) = next_volumes.get(old.volume_name.as_str()) else {
            return Err(SpecError::VolumeRemoved(old.volume_name.clone()));
        };
        if new.volume_type != old.volume_type {
            return Err(SpecError::VolumeTypeChanged {
                name: old.volume_name.clone(),
                prior: old.volume_type.clone(),
                next: new.volume_type.clone(),
            });
        }
        if new.volume_size < old.volume_size {
            return Err(SpecError::VolumeShrunk {
                name: old.volume_name.clone(),
                prior: old.volume_size,
                next: new.volume_size,
            });
        }
    }

    Ok(())
}
