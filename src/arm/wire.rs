//! JSON bodies exchanged with the management API.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::handle::ResourceHandle;
use crate::status::{EndpointType, MirrorState};
use crate::volume::{
    BackupSettings, DataProtection, ReplicationSettings, Volume, VolumePatch, VolumeRequest,
};

/// Error envelope returned with non-success responses.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorEnvelope {
    #[serde(default)]
    pub(super) error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default)]
    pub(super) code: Option<String>,
    #[serde(default)]
    pub(super) message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct VolumeResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    location: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    properties: VolumeProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct VolumeProperties {
    #[serde(default, skip_serializing)]
    provisioning_state: Option<String>,
    #[serde(default)]
    creation_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_level: Option<String>,
    #[serde(default)]
    subnet_id: String,
    #[serde(default)]
    usage_threshold: u64,
    #[serde(default)]
    protocol_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_protection: Option<DataProtectionBody>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataProtectionBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replication: Option<ReplicationBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snapshot: Option<SnapshotBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backup: Option<BackupBody>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplicationBody {
    #[serde(default)]
    endpoint_type: Option<String>,
    #[serde(default)]
    remote_volume_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replication_schedule: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotBody {
    #[serde(default)]
    snapshot_policy_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backup_policy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    policy_enforced: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backup_vault_id: Option<String>,
}

impl VolumeResource {
    /// Converts the wire form into a [`Volume`].
    ///
    /// The returned `id` wins over `requested` when it parses.
    pub(super) fn into_volume(self, requested: &ResourceHandle) -> Result<Volume, String> {
        let handle = self
            .id
            .as_deref()
            .and_then(|id| ResourceHandle::from_str(id).ok())
            .unwrap_or_else(|| requested.clone());
        let properties = self.properties;
        let data_protection = match properties.data_protection {
            Some(body) => body.into_model()?,
            None => DataProtection::default(),
        };
        Ok(Volume {
            handle,
            location: self.location,
            provisioning_state: properties.provisioning_state,
            creation_token: properties.creation_token,
            service_level: properties.service_level,
            subnet_id: properties.subnet_id,
            usage_threshold_bytes: properties.usage_threshold,
            protocols: properties.protocol_types,
            data_protection,
            tags: self.tags,
        })
    }
}

impl DataProtectionBody {
    fn into_model(self) -> Result<DataProtection, String> {
        let replication = match self.replication {
            Some(body) => body.into_model()?,
            None => None,
        };
        Ok(DataProtection {
            replication,
            snapshot_policy_id: self.snapshot.and_then(|snapshot| snapshot.snapshot_policy_id),
            backup: self.backup.map(|backup| BackupSettings {
                policy_id: backup.backup_policy_id,
                policy_enforced: backup.policy_enforced.unwrap_or(false),
                vault_id: backup.backup_vault_id,
            }),
        })
    }

    fn from_model(model: &DataProtection) -> Option<Self> {
        let body = Self {
            replication: model.replication.as_ref().map(|settings| ReplicationBody {
                endpoint_type: Some(settings.endpoint_type.label().to_owned()),
                remote_volume_resource_id: Some(settings.remote_volume.to_string()),
                replication_schedule: settings.schedule.clone(),
            }),
            snapshot: model
                .active_snapshot_policy()
                .map(|policy| SnapshotBody {
                    snapshot_policy_id: Some(policy.to_owned()),
                }),
            backup: model.backup.as_ref().map(|backup| BackupBody {
                backup_policy_id: backup.policy_id.clone(),
                policy_enforced: Some(backup.policy_enforced),
                backup_vault_id: backup.vault_id.clone(),
            }),
        };
        let empty = body.replication.is_none() && body.snapshot.is_none() && body.backup.is_none();
        if empty { None } else { Some(body) }
    }
}

impl ReplicationBody {
    fn into_model(self) -> Result<Option<ReplicationSettings>, String> {
        let (Some(endpoint), Some(remote)) = (self.endpoint_type, self.remote_volume_resource_id)
        else {
            return Ok(None);
        };
        let endpoint_type = EndpointType::from_label(&endpoint)
            .ok_or_else(|| format!("unknown replication endpoint type '{endpoint}'"))?;
        let remote_volume = ResourceHandle::from_str(&remote)
            .map_err(|err| format!("invalid remote volume id: {err}"))?;
        Ok(Some(ReplicationSettings {
            endpoint_type,
            remote_volume,
            schedule: self.replication_schedule,
        }))
    }
}

/// Body of a create (`PUT`) request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateBody {
    location: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
    properties: VolumeProperties,
}

impl From<&VolumeRequest> for CreateBody {
    fn from(request: &VolumeRequest) -> Self {
        Self {
            location: request.location.clone(),
            tags: request.tags.clone(),
            properties: VolumeProperties {
                provisioning_state: None,
                creation_token: request.creation_token.clone(),
                service_level: Some(request.service_level.clone()),
                subnet_id: request.subnet_id.clone(),
                usage_threshold: request.quota_bytes(),
                protocol_types: request.protocols.clone(),
                data_protection: DataProtectionBody::from_model(&request.data_protection),
            },
        }
    }
}

/// Body of an update (`PATCH`) request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PatchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<BTreeMap<String, String>>,
    properties: PatchProperties,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatchProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    usage_threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_protection: Option<DataProtectionBody>,
}

impl From<&VolumePatch> for PatchBody {
    fn from(patch: &VolumePatch) -> Self {
        let snapshot = patch.snapshot_policy_id.as_ref().map(|policy| SnapshotBody {
            snapshot_policy_id: Some(policy.clone()),
        });
        let backup = (patch.backup_policy_id.is_some() || patch.backup_policy_enforced.is_some())
            .then(|| BackupBody {
                backup_policy_id: patch.backup_policy_id.clone(),
                policy_enforced: patch.backup_policy_enforced,
                backup_vault_id: None,
            });
        let data_protection = (snapshot.is_some() || backup.is_some()).then_some(DataProtectionBody {
            replication: None,
            snapshot,
            backup,
        });
        Self {
            tags: patch.tags.clone(),
            properties: PatchProperties {
                usage_threshold: patch.quota_bytes(),
                data_protection,
            },
        }
    }
}

/// Body of an authorize-replication request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AuthorizeBody {
    pub(super) remote_volume_resource_id: String,
}

/// Body of a break-replication request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BreakBody {
    pub(super) force_break_replication: bool,
}

/// Replication status response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReplicationStatusBody {
    #[serde(default)]
    pub(super) healthy: Option<bool>,
    #[serde(default)]
    pub(super) mirror_state: Option<String>,
}

impl ReplicationStatusBody {
    pub(super) fn mirror_state(&self) -> Option<MirrorState> {
        self.mirror_state.as_deref().and_then(MirrorState::from_label)
    }
}

/// Backup status response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BackupStatusBody {
    #[serde(default)]
    pub(super) relationship_status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PRIMARY: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.NetApp/netAppAccounts/acct/capacityPools/pool/volumes/primary";
    const SECONDARY: &str = "/subscriptions/sub/resourceGroups/rg-dr/providers/Microsoft.NetApp/netAppAccounts/acct-dr/capacityPools/pool/volumes/replica";

    fn handle(id: &str) -> ResourceHandle {
        ResourceHandle::from_str(id).expect("valid id")
    }

    #[rstest]
    fn volume_response_maps_replication_and_policies() {
        let body = serde_json::json!({
            "id": SECONDARY,
            "location": "northeurope",
            "tags": {"env": "dr"},
            "properties": {
                "provisioningState": "Succeeded",
                "creationToken": "replica",
                "serviceLevel": "Standard",
                "subnetId": "subnet",
                "usageThreshold": 107_374_182_400_u64,
                "protocolTypes": ["NFSv4.1"],
                "dataProtection": {
                    "replication": {
                        "endpointType": "dst",
                        "remoteVolumeResourceId": PRIMARY,
                        "replicationSchedule": "_10minutely"
                    },
                    "snapshot": {"snapshotPolicyId": ""}
                }
            }
        });
        let resource: VolumeResource = serde_json::from_value(body).expect("parse");

        let volume = resource.into_volume(&handle(PRIMARY)).expect("convert");

        assert_eq!(volume.handle, handle(SECONDARY));
        assert_eq!(volume.replication_destination(), Some(handle(SECONDARY)));
        assert_eq!(volume.data_protection.active_snapshot_policy(), None);
        assert_eq!(volume.tags.get("env").map(String::as_str), Some("dr"));
    }

    #[rstest]
    fn unknown_endpoint_type_is_rejected() {
        let body = serde_json::json!({
            "properties": {
                "dataProtection": {
                    "replication": {"endpointType": "mirror", "remoteVolumeResourceId": PRIMARY}
                }
            }
        });
        let resource: VolumeResource = serde_json::from_value(body).expect("parse");

        let err = resource.into_volume(&handle(SECONDARY)).expect_err("bad endpoint");

        assert!(err.contains("mirror"));
    }

    #[rstest]
    fn backup_cleanup_patches_serialise_separately() {
        let enforcement = serde_json::to_value(PatchBody::from(&VolumePatch::disable_backup_enforcement()))
            .expect("serialise");
        let policy = serde_json::to_value(PatchBody::from(&VolumePatch::clear_backup_policy()))
            .expect("serialise");

        assert_eq!(
            enforcement,
            serde_json::json!({"properties": {"dataProtection": {"backup": {"policyEnforced": false}}}})
        );
        assert_eq!(
            policy,
            serde_json::json!({"properties": {"dataProtection": {"backup": {"backupPolicyId": ""}}}})
        );
    }

    #[rstest]
    fn destination_create_body_carries_remote_id() {
        let request = VolumeRequest::builder()
            .location("northeurope")
            .creation_token("replica")
            .service_level("Standard")
            .subnet_id("subnet")
            .quota_gb(100)
            .replication(Some(ReplicationSettings {
                endpoint_type: EndpointType::Destination,
                remote_volume: handle(PRIMARY),
                schedule: Some(String::from("hourly")),
            }))
            .build()
            .expect("request");

        let body = serde_json::to_value(CreateBody::from(&request)).expect("serialise");

        assert_eq!(
            body["properties"]["dataProtection"]["replication"]["remoteVolumeResourceId"],
            serde_json::json!(PRIMARY)
        );
        assert_eq!(
            body["properties"]["dataProtection"]["replication"]["endpointType"],
            serde_json::json!("dst")
        );
        assert_eq!(body["properties"]["usageThreshold"], serde_json::json!(107_374_182_400_u64));
    }
}
