//! Pure mapping from remote API records to local inventory records.
//!
//! No I/O happens here. Field selection for pulls is explicit: each entity
//! has a backend-field constant and a typed merge function instead of
//! reflective attribute patching.

use chrono::Utc;
use uuid::Uuid;

use rijkscloud_client::records::{
    FlavorRecord, FloatingIpRecord, InstanceRecord, NetworkRecord, VolumeRecord,
};

use crate::models::{
    FlavorAttributes, FloatingIpAttributes, Instance, NetworkAttributes, ResourceState,
    SubnetAttributes, Volume,
};

pub fn flavor_attributes(record: &FlavorRecord) -> FlavorAttributes {
    FlavorAttributes {
        // The provider-assigned name is both display name and identifier.
        backend_id: record.name.clone(),
        name: record.name.clone(),
        cores: record.vcpus,
        ram: record.ram,
    }
}

pub fn floating_ip_attributes(record: &FloatingIpRecord) -> FloatingIpAttributes {
    FloatingIpAttributes {
        backend_id: record.float_ip.clone(),
        address: record.float_ip.clone(),
        is_available: record.available,
    }
}

pub fn network_attributes(record: &NetworkRecord) -> NetworkAttributes {
    NetworkAttributes {
        backend_id: record.name.clone(),
        name: record.name.clone(),
        subnets: record
            .subnets
            .iter()
            .map(|subnet| SubnetAttributes {
                backend_id: subnet.name.clone(),
                cidr: subnet.cidr.clone(),
                gateway_ip: subnet.gateway_ip.clone(),
                allocation_pools: serde_json::Value::Array(subnet.allocation_pools.clone()),
            })
            .collect(),
    }
}

pub fn volume_from_record(settings: Uuid, record: &VolumeRecord) -> Volume {
    let now = Utc::now();
    Volume {
        uuid: Uuid::new_v4(),
        settings,
        project_link: None,
        backend_id: record.name.clone(),
        name: record.name.clone(),
        // Provider reports GB; local bookkeeping is MiB.
        size: record.size * 1024,
        metadata: record.metadata.clone(),
        runtime_state: record.status.clone(),
        state: ResourceState::Ok,
        error_message: None,
        created: now,
        modified: now,
    }
}

pub fn instance_from_record(
    settings: Uuid,
    record: &InstanceRecord,
    flavor: Option<&FlavorRecord>,
) -> Instance {
    let now = Utc::now();
    let mut instance = Instance {
        uuid: Uuid::new_v4(),
        settings,
        project_link: None,
        backend_id: record.id.clone(),
        name: record.name.clone(),
        runtime_state: record.status.clone(),
        state: ResourceState::Ok,
        error_message: record.fault.as_ref().map(|fault| fault.message.clone()),
        flavor_name: None,
        cores: 0,
        ram: 0,
        created: now,
        modified: now,
    };
    if let Some(flavor) = flavor {
        instance.flavor_name = Some(flavor.name.clone());
        instance.cores = flavor.vcpus;
        instance.ram = flavor.ram;
    }
    instance
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeField {
    Name,
    Size,
    Metadata,
    RuntimeState,
}

pub const VOLUME_BACKEND_FIELDS: &[VolumeField] = &[
    VolumeField::Name,
    VolumeField::Size,
    VolumeField::Metadata,
    VolumeField::RuntimeState,
];

/// Copy the selected backend-owned fields from `src` onto `dest`.
/// Returns whether anything actually changed.
pub fn apply_volume_fields(dest: &mut Volume, src: &Volume, fields: &[VolumeField]) -> bool {
    let mut changed = false;
    for field in fields {
        match field {
            VolumeField::Name => {
                if dest.name != src.name {
                    dest.name = src.name.clone();
                    changed = true;
                }
            }
            VolumeField::Size => {
                if dest.size != src.size {
                    dest.size = src.size;
                    changed = true;
                }
            }
            VolumeField::Metadata => {
                if dest.metadata != src.metadata {
                    dest.metadata = src.metadata.clone();
                    changed = true;
                }
            }
            VolumeField::RuntimeState => {
                if dest.runtime_state != src.runtime_state {
                    dest.runtime_state = src.runtime_state.clone();
                    changed = true;
                }
            }
        }
    }
    changed
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceField {
    Name,
    RuntimeState,
    FlavorName,
    Cores,
    Ram,
}

pub const INSTANCE_BACKEND_FIELDS: &[InstanceField] = &[
    InstanceField::Name,
    InstanceField::RuntimeState,
    InstanceField::FlavorName,
    InstanceField::Cores,
    InstanceField::Ram,
];

pub fn instance_field_is_flavor(field: InstanceField) -> bool {
    matches!(
        field,
        InstanceField::FlavorName | InstanceField::Cores | InstanceField::Ram
    )
}

pub fn apply_instance_fields(dest: &mut Instance, src: &Instance, fields: &[InstanceField]) -> bool {
    let mut changed = false;
    for field in fields {
        match field {
            InstanceField::Name => {
                if dest.name != src.name {
                    dest.name = src.name.clone();
                    changed = true;
                }
            }
            InstanceField::RuntimeState => {
                if dest.runtime_state != src.runtime_state {
                    dest.runtime_state = src.runtime_state.clone();
                    changed = true;
                }
            }
            InstanceField::FlavorName => {
                if dest.flavor_name != src.flavor_name {
                    dest.flavor_name = src.flavor_name.clone();
                    changed = true;
                }
            }
            InstanceField::Cores => {
                if dest.cores != src.cores {
                    dest.cores = src.cores;
                    changed = true;
                }
            }
            InstanceField::Ram => {
                if dest.ram != src.ram {
                    dest.ram = src.ram;
                    changed = true;
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rijkscloud_client::records::InstanceFault;
    use serde_json::json;

    fn volume_record(name: &str, size_gb: i64) -> VolumeRecord {
        VolumeRecord {
            name: name.to_string(),
            size: size_gb,
            description: None,
            metadata: json!({}),
            status: "available".to_string(),
            attachments: vec![],
        }
    }

    #[test]
    fn volume_size_converts_gb_to_mib() {
        let settings = Uuid::new_v4();
        let volume = volume_from_record(settings, &volume_record("test", 2));
        assert_eq!(volume.size, 2048);
        assert_eq!(volume.backend_id, "test");
        assert_eq!(volume.runtime_state, "available");
        assert_eq!(volume.state, ResourceState::Ok);
    }

    #[test]
    fn flavor_name_is_both_identifier_and_display_name() {
        let attrs = flavor_attributes(&FlavorRecord {
            name: "general.8gb".to_string(),
            vcpus: 4,
            ram: 8192,
        });
        assert_eq!(attrs.backend_id, "general.8gb");
        assert_eq!(attrs.name, "general.8gb");
        assert_eq!(attrs.cores, 4);
        assert_eq!(attrs.ram, 8192);
    }

    #[test]
    fn instance_captures_flavor_and_fault() {
        let settings = Uuid::new_v4();
        let record = InstanceRecord {
            id: "abc-123".to_string(),
            name: "vm-1".to_string(),
            status: "error".to_string(),
            flavor: Some("general.2gb".to_string()),
            fault: Some(InstanceFault {
                message: "no valid host".to_string(),
            }),
        };
        let flavor = FlavorRecord {
            name: "general.2gb".to_string(),
            vcpus: 1,
            ram: 2048,
        };
        let instance = instance_from_record(settings, &record, Some(&flavor));
        assert_eq!(instance.backend_id, "abc-123");
        assert_eq!(instance.flavor_name.as_deref(), Some("general.2gb"));
        assert_eq!(instance.cores, 1);
        assert_eq!(instance.ram, 2048);
        assert_eq!(instance.error_message.as_deref(), Some("no valid host"));
    }

    #[test]
    fn instance_without_flavor_leaves_flavor_fields_empty() {
        let instance = instance_from_record(
            Uuid::new_v4(),
            &InstanceRecord {
                id: "abc".to_string(),
                name: "vm".to_string(),
                status: "active".to_string(),
                flavor: None,
                fault: None,
            },
            None,
        );
        assert!(instance.flavor_name.is_none());
        assert_eq!(instance.cores, 0);
        assert_eq!(instance.ram, 0);
    }

    #[test]
    fn apply_volume_fields_reports_changes() {
        let settings = Uuid::new_v4();
        let mut dest = volume_from_record(settings, &volume_record("a", 1));
        let src = volume_from_record(settings, &volume_record("a", 2));
        assert!(apply_volume_fields(&mut dest, &src, VOLUME_BACKEND_FIELDS));
        assert_eq!(dest.size, 2048);
        // Second application is a no-op.
        assert!(!apply_volume_fields(&mut dest, &src, VOLUME_BACKEND_FIELDS));
    }

    #[test]
    fn apply_volume_fields_respects_subset() {
        let settings = Uuid::new_v4();
        let mut dest = volume_from_record(settings, &volume_record("a", 1));
        let mut src = volume_from_record(settings, &volume_record("a", 2));
        src.runtime_state = "error".to_string();
        assert!(apply_volume_fields(
            &mut dest,
            &src,
            &[VolumeField::RuntimeState]
        ));
        assert_eq!(dest.runtime_state, "error");
        assert_eq!(dest.size, 1024); // untouched
    }
}
