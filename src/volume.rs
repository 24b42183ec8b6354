//! Volume resource model shared by the client and the orchestrators.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::handle::ResourceHandle;
use crate::status::{EndpointType, MirrorState, RawStatus, RelationshipStatus};

const BYTES_PER_GIB: u64 = 1_073_741_824;

impl Serialize for ResourceHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Cross-region replication settings carried by a volume.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReplicationSettings {
    /// Which side of the relationship this volume is.
    pub endpoint_type: EndpointType,
    /// The volume on the other side of the relationship.
    pub remote_volume: ResourceHandle,
    /// Replication schedule label (for example `hourly`).
    pub schedule: Option<String>,
}

/// Backup configuration carried by a volume.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BackupSettings {
    /// Backup policy applied to the volume.
    pub policy_id: Option<String>,
    /// Whether the policy is enforced.
    pub policy_enforced: bool,
    /// Backup vault receiving the backups.
    pub vault_id: Option<String>,
}

/// Data protection block of a volume.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct DataProtection {
    /// Replication relationship, if the volume takes part in one.
    pub replication: Option<ReplicationSettings>,
    /// Snapshot policy associated with the volume.
    pub snapshot_policy_id: Option<String>,
    /// Backup configuration.
    pub backup: Option<BackupSettings>,
}

impl DataProtection {
    /// Returns the snapshot policy id when one is actually set.
    #[must_use]
    pub fn active_snapshot_policy(&self) -> Option<&str> {
        self.snapshot_policy_id
            .as_deref()
            .filter(|policy| !policy.trim().is_empty())
    }
}

/// Snapshot of a remote volume as returned by `get`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Volume {
    /// Address of the volume.
    pub handle: ResourceHandle,
    /// Region the volume lives in.
    pub location: String,
    /// Provider provisioning state label, when reported.
    pub provisioning_state: Option<String>,
    /// Export path / creation token.
    pub creation_token: String,
    /// Service level of the owning pool.
    pub service_level: Option<String>,
    /// Delegated subnet.
    pub subnet_id: String,
    /// Quota in bytes.
    pub usage_threshold_bytes: u64,
    /// Enabled protocols.
    pub protocols: Vec<String>,
    /// Replication, snapshot and backup settings.
    pub data_protection: DataProtection,
    /// Resource tags.
    pub tags: BTreeMap<String, String>,
}

impl Volume {
    /// Returns the replication settings, if any.
    #[must_use]
    pub const fn replication(&self) -> Option<&ReplicationSettings> {
        self.data_protection.replication.as_ref()
    }

    /// Resolves the destination endpoint of this volume's replication
    /// relationship.
    ///
    /// A secondary volume is its own destination. A primary volume resolves
    /// the secondary through the stored remote-volume cross-reference.
    #[must_use]
    pub fn replication_destination(&self) -> Option<ResourceHandle> {
        self.replication().map(|settings| match settings.endpoint_type {
            EndpointType::Destination => self.handle.clone(),
            EndpointType::Source => settings.remote_volume.clone(),
        })
    }
}

/// Result of a `get` call: the raw status plus the volume when present.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceSnapshot {
    /// Status reported by the transport.
    pub raw: RawStatus,
    /// The volume, absent on `NotFound`.
    pub volume: Option<Volume>,
}

impl ResourceSnapshot {
    /// Snapshot describing a missing resource.
    #[must_use]
    pub const fn missing() -> Self {
        Self {
            raw: RawStatus::Code(404),
            volume: None,
        }
    }

    /// Snapshot describing a present resource.
    #[must_use]
    pub const fn present(volume: Volume) -> Self {
        Self {
            raw: RawStatus::Code(200),
            volume: Some(volume),
        }
    }
}

/// Result of a replication-status probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplicationStatusReport {
    /// Status reported by the transport.
    pub raw: RawStatus,
    /// Mirror state, when the relationship exists and reports one.
    pub mirror_state: Option<MirrorState>,
    /// Whether the provider considers the relationship healthy.
    pub healthy: Option<bool>,
}

impl ReplicationStatusReport {
    /// Report for a relationship that does not exist.
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            raw: RawStatus::Code(404),
            mirror_state: None,
            healthy: None,
        }
    }

    /// Report for a relationship in the given state.
    #[must_use]
    pub const fn in_state(state: MirrorState) -> Self {
        Self {
            raw: RawStatus::Code(200),
            mirror_state: Some(state),
            healthy: Some(true),
        }
    }

    /// Reduces the report to the relationship status used by polls.
    #[must_use]
    pub const fn relationship(&self) -> RelationshipStatus {
        if self.raw.is_not_found() {
            return RelationshipStatus::Absent;
        }
        match self.mirror_state {
            Some(state) => RelationshipStatus::Present(state),
            None => RelationshipStatus::Unreported,
        }
    }
}

/// Result of a backup-status probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackupStatusReport {
    /// Provider relationship status label.
    pub relationship_status: Option<String>,
}

impl BackupStatusReport {
    /// Returns `true` while a backup transfer is in progress.
    #[must_use]
    pub fn is_transferring(&self) -> bool {
        self.relationship_status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("transferring"))
    }
}

/// Errors raised by request validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a required field is blank.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when a destination volume also asks for a snapshot policy.
    #[error("snapshot policy cannot be enabled on a data protection destination volume")]
    SnapshotPolicyOnDestination,
    /// Raised when a destination volume enforces a backup policy.
    #[error("backup policy cannot be enforced on a data protection destination volume")]
    BackupEnforcedOnDestination,
}

/// Parameters required to create a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeRequest {
    /// Target region.
    pub location: String,
    /// Unique export path.
    pub creation_token: String,
    /// Service level (for example `Premium`).
    pub service_level: String,
    /// Delegated subnet.
    pub subnet_id: String,
    /// Quota in GiB.
    pub quota_gb: u64,
    /// Enabled protocols; defaults to `NFSv3`.
    pub protocols: Vec<String>,
    /// Replication, snapshot and backup settings.
    pub data_protection: DataProtection,
    /// Resource tags.
    pub tags: BTreeMap<String, String>,
}

impl VolumeRequest {
    /// Starts a builder for a [`VolumeRequest`].
    #[must_use]
    pub fn builder() -> VolumeRequestBuilder {
        VolumeRequestBuilder::default()
    }

    /// Quota expressed in bytes, saturating on overflow.
    #[must_use]
    pub const fn quota_bytes(&self) -> u64 {
        self.quota_gb.saturating_mul(BYTES_PER_GIB)
    }

    /// Returns the replication settings when this request creates a
    /// destination (secondary) volume.
    #[must_use]
    pub fn destination_replication(&self) -> Option<&ReplicationSettings> {
        self.data_protection
            .replication
            .as_ref()
            .filter(|settings| settings.endpoint_type == EndpointType::Destination)
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when a required field is blank, the quota is
    /// zero, or a destination volume asks for snapshot or enforced backup
    /// policies.
    pub fn validate(&self) -> Result<(), RequestError> {
        for (name, value) in [
            ("location", &self.location),
            ("creation_token", &self.creation_token),
            ("service_level", &self.service_level),
            ("subnet_id", &self.subnet_id),
        ] {
            if value.trim().is_empty() {
                return Err(RequestError::Validation(name.to_owned()));
            }
        }
        if self.quota_gb == 0 {
            return Err(RequestError::Validation(String::from("quota_gb")));
        }
        if self.destination_replication().is_some() {
            if self.data_protection.active_snapshot_policy().is_some() {
                return Err(RequestError::SnapshotPolicyOnDestination);
            }
            if self
                .data_protection
                .backup
                .as_ref()
                .is_some_and(|backup| backup.policy_enforced)
            {
                return Err(RequestError::BackupEnforcedOnDestination);
            }
        }
        Ok(())
    }
}

/// Builder for [`VolumeRequest`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VolumeRequestBuilder {
    location: String,
    creation_token: String,
    service_level: String,
    subnet_id: String,
    quota_gb: u64,
    protocols: Vec<String>,
    data_protection: DataProtection,
    tags: BTreeMap<String, String>,
}

impl VolumeRequestBuilder {
    /// Sets the region.
    #[must_use]
    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.location = value.into();
        self
    }

    /// Sets the export path.
    #[must_use]
    pub fn creation_token(mut self, value: impl Into<String>) -> Self {
        self.creation_token = value.into();
        self
    }

    /// Sets the service level.
    #[must_use]
    pub fn service_level(mut self, value: impl Into<String>) -> Self {
        self.service_level = value.into();
        self
    }

    /// Sets the delegated subnet.
    #[must_use]
    pub fn subnet_id(mut self, value: impl Into<String>) -> Self {
        self.subnet_id = value.into();
        self
    }

    /// Sets the quota in GiB.
    #[must_use]
    pub const fn quota_gb(mut self, value: u64) -> Self {
        self.quota_gb = value;
        self
    }

    /// Adds an enabled protocol.
    #[must_use]
    pub fn protocol(mut self, value: impl Into<String>) -> Self {
        self.protocols.push(value.into());
        self
    }

    /// Configures replication.
    #[must_use]
    pub fn replication(mut self, value: Option<ReplicationSettings>) -> Self {
        self.data_protection.replication = value;
        self
    }

    /// Sets the snapshot policy.
    #[must_use]
    pub fn snapshot_policy_id(mut self, value: Option<String>) -> Self {
        self.data_protection.snapshot_policy_id = value;
        self
    }

    /// Sets the backup configuration.
    #[must_use]
    pub fn backup(mut self, value: Option<BackupSettings>) -> Self {
        self.data_protection.backup = value;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Builds and validates the [`VolumeRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when validation fails.
    pub fn build(self) -> Result<VolumeRequest, RequestError> {
        let mut protocols: Vec<String> = self
            .protocols
            .iter()
            .map(|protocol| protocol.trim().to_owned())
            .filter(|protocol| !protocol.is_empty())
            .collect();
        if protocols.is_empty() {
            protocols.push(String::from("NFSv3"));
        }
        let request = VolumeRequest {
            location: self.location.trim().to_owned(),
            creation_token: self.creation_token.trim().to_owned(),
            service_level: self.service_level.trim().to_owned(),
            subnet_id: self.subnet_id.trim().to_owned(),
            quota_gb: self.quota_gb,
            protocols,
            data_protection: self.data_protection,
            tags: self.tags,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Partial update applied to an existing volume.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VolumePatch {
    /// New quota in GiB.
    pub quota_gb: Option<u64>,
    /// New snapshot policy; an empty string clears it.
    pub snapshot_policy_id: Option<String>,
    /// New backup policy; an empty string clears it.
    pub backup_policy_id: Option<String>,
    /// New backup enforcement flag.
    pub backup_policy_enforced: Option<bool>,
    /// Replacement tags.
    pub tags: Option<BTreeMap<String, String>>,
}

impl VolumePatch {
    /// Patch that dissociates the snapshot policy.
    #[must_use]
    pub fn clear_snapshot_policy() -> Self {
        Self {
            snapshot_policy_id: Some(String::new()),
            ..Self::default()
        }
    }

    /// Patch that stops enforcing the backup policy.
    ///
    /// Enforcement and policy id cannot be changed in the same request, so
    /// backup cleanup is split into this patch and [`Self::clear_backup_policy`].
    #[must_use]
    pub fn disable_backup_enforcement() -> Self {
        Self {
            backup_policy_enforced: Some(false),
            ..Self::default()
        }
    }

    /// Patch that removes the backup policy id.
    #[must_use]
    pub fn clear_backup_policy() -> Self {
        Self {
            backup_policy_id: Some(String::new()),
            ..Self::default()
        }
    }

    /// New quota expressed in bytes, saturating on overflow.
    #[must_use]
    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_gb.map(|gb| gb.saturating_mul(BYTES_PER_GIB))
    }

    /// Returns `true` when the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn builder() -> VolumeRequestBuilder {
        VolumeRequest::builder()
            .location("westeurope")
            .creation_token("vol-path")
            .service_level("Premium")
            .subnet_id("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/v/subnets/s")
            .quota_gb(100)
    }

    fn destination() -> ReplicationSettings {
        ReplicationSettings {
            endpoint_type: EndpointType::Destination,
            remote_volume: ResourceHandle::volume("sub", "rg", "acct", "pool", "primary")
                .expect("primary handle"),
            schedule: Some(String::from("hourly")),
        }
    }

    #[rstest]
    fn build_defaults_protocols_to_nfsv3(builder: VolumeRequestBuilder) {
        let request = builder.build().expect("request should build");
        assert_eq!(request.protocols, vec![String::from("NFSv3")]);
        assert_eq!(request.quota_bytes(), 100 * BYTES_PER_GIB);
    }

    #[rstest]
    fn build_rejects_zero_quota(builder: VolumeRequestBuilder) {
        let err = builder.quota_gb(0).build().expect_err("zero quota");
        assert_eq!(err, RequestError::Validation(String::from("quota_gb")));
    }

    #[rstest]
    fn build_rejects_snapshot_policy_on_destination(builder: VolumeRequestBuilder) {
        let err = builder
            .replication(Some(destination()))
            .snapshot_policy_id(Some(String::from("policy")))
            .build()
            .expect_err("destination volumes cannot carry snapshot policies");
        assert_eq!(err, RequestError::SnapshotPolicyOnDestination);
    }

    #[rstest]
    fn destination_replication_ignores_source_side(builder: VolumeRequestBuilder) {
        let mut settings = destination();
        settings.endpoint_type = EndpointType::Source;
        let request = builder
            .replication(Some(settings))
            .build()
            .expect("source-side request should build");
        assert!(request.destination_replication().is_none());
    }

    #[rstest]
    fn empty_patch_is_detected() {
        assert!(VolumePatch::default().is_empty());
        assert!(!VolumePatch::clear_snapshot_policy().is_empty());
    }
}
