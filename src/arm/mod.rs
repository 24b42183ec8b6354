//! HTTP implementation of [`RemoteResourceClient`] for the ARM REST surface.
//!
//! Mutating calls return as soon as the control plane accepts them; the
//! orchestrators poll for the outcome. The client never retries.

mod error;
mod wire;

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::{ClientError, ClientFuture, Operation, RemoteResourceClient};
use crate::config::StrataConfig;
use crate::handle::ResourceHandle;
use crate::status::RawStatus;
use crate::volume::{
    BackupStatusReport, ReplicationStatusReport, ResourceSnapshot, VolumePatch, VolumeRequest,
};

pub use error::ArmClientError;
use wire::{
    AuthorizeBody, BackupStatusBody, BreakBody, CreateBody, ErrorEnvelope, PatchBody,
    ReplicationStatusBody, VolumeResource,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const REPLICATION_MISSING_MARKER: &str = "VolumeReplicationMissingFor";

/// Management API client authenticated with a pre-issued bearer token.
#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    api_version: String,
    token: String,
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug)]
struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    const fn raw(&self) -> RawStatus {
        RawStatus::Code(self.status)
    }

    const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    fn json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        handle: &ResourceHandle,
    ) -> Result<T, ClientError> {
        serde_json::from_str(&self.body).map_err(|err| {
            ClientError::new(
                operation,
                handle,
                self.raw(),
                format!("malformed response body: {err}"),
            )
        })
    }

    fn failure(&self, operation: Operation, handle: &ResourceHandle) -> ClientError {
        let envelope: ErrorEnvelope = serde_json::from_str(&self.body).unwrap_or_default();
        let message = envelope
            .error
            .message
            .or_else(|| (!self.body.trim().is_empty()).then(|| self.body.trim().to_owned()))
            .unwrap_or_else(|| format!("HTTP {}", self.status));
        let error = ClientError::new(operation, handle, self.raw(), message);
        match envelope.error.code {
            Some(code) => error.with_code(code),
            None => error,
        }
    }

    /// The replication endpoints answer `409` with this marker once the
    /// relationship record is gone.
    fn is_replication_missing(&self) -> bool {
        self.status == 409 && self.body.contains(REPLICATION_MISSING_MARKER)
    }
}

impl ArmClient {
    /// Builds a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ArmClientError::Config`] when the configuration fails
    /// validation and [`ArmClientError::Http`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: &StrataConfig) -> Result<Self, ArmClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| ArmClientError::Http(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.api_endpoint.trim_end_matches('/').to_owned(),
            api_version: config.api_version.clone(),
            token: config.bearer_token.clone(),
        })
    }

    fn url(&self, handle: &ResourceHandle, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}{handle}/{action}", self.endpoint),
            None => format!("{}{handle}", self.endpoint),
        }
    }

    async fn send<B>(
        &self,
        operation: Operation,
        method: Method,
        handle: &ResourceHandle,
        action: Option<&str>,
        body: Option<&B>,
    ) -> Result<Reply, ClientError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut request = self
            .http
            .request(method, self.url(handle, action))
            .bearer_auth(&self.token)
            .query(&[("api-version", self.api_version.as_str())]);
        if operation == Operation::Delete {
            request = request.query(&[("forceDelete", "true")]);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        debug!(%operation, target = %handle, "sending request");
        let response = request.send().await.map_err(|err| {
            let status = err
                .status()
                .map_or(RawStatus::DroppedConnection, |code| RawStatus::Code(code.as_u16()));
            ClientError::new(operation, handle, status, err.to_string())
        })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| ClientError::new(operation, handle, RawStatus::Code(status), err.to_string()))?;
        debug!(%operation, target = %handle, status, "received response");
        Ok(Reply { status, body: text })
    }

    async fn submit<B>(
        &self,
        operation: Operation,
        method: Method,
        handle: &ResourceHandle,
        action: Option<&str>,
        body: Option<&B>,
    ) -> Result<RawStatus, ClientError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let reply = self.send(operation, method, handle, action, body).await?;
        if reply.is_success() {
            Ok(reply.raw())
        } else {
            Err(reply.failure(operation, handle))
        }
    }
}

impl RemoteResourceClient for ArmClient {
    fn get<'a>(&'a self, handle: &'a ResourceHandle) -> ClientFuture<'a, ResourceSnapshot> {
        Box::pin(async move {
            let reply = self
                .send(Operation::Get, Method::GET, handle, None, None::<&()>)
                .await?;
            if reply.raw().is_gone() {
                return Ok(ResourceSnapshot {
                    raw: reply.raw(),
                    volume: None,
                });
            }
            if !reply.is_success() {
                return Err(reply.failure(Operation::Get, handle));
            }
            let resource: VolumeResource = reply.json(Operation::Get, handle)?;
            let volume = resource
                .into_volume(handle)
                .map_err(|message| ClientError::new(Operation::Get, handle, reply.raw(), message))?;
            Ok(ResourceSnapshot {
                raw: reply.raw(),
                volume: Some(volume),
            })
        })
    }

    fn create<'a>(
        &'a self,
        handle: &'a ResourceHandle,
        request: &'a VolumeRequest,
    ) -> ClientFuture<'a, RawStatus> {
        Box::pin(async move {
            let body = CreateBody::from(request);
            self.submit(Operation::Create, Method::PUT, handle, None, Some(&body))
                .await
        })
    }

    fn update<'a>(
        &'a self,
        handle: &'a ResourceHandle,
        patch: &'a VolumePatch,
    ) -> ClientFuture<'a, RawStatus> {
        Box::pin(async move {
            let body = PatchBody::from(patch);
            self.submit(Operation::Update, Method::PATCH, handle, None, Some(&body))
                .await
        })
    }

    fn delete<'a>(&'a self, handle: &'a ResourceHandle) -> ClientFuture<'a, RawStatus> {
        Box::pin(async move {
            let reply = self
                .send(Operation::Delete, Method::DELETE, handle, None, None::<&()>)
                .await?;
            if reply.is_success() || reply.raw().is_gone() {
                Ok(reply.raw())
            } else {
                Err(reply.failure(Operation::Delete, handle))
            }
        })
    }

    fn replication_status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> ClientFuture<'a, ReplicationStatusReport> {
        Box::pin(async move {
            let operation = Operation::ReplicationStatus;
            let reply = self
                .send(operation, Method::GET, handle, Some("replicationStatus"), None::<&()>)
                .await?;
            if reply.raw().is_not_found() || reply.is_replication_missing() {
                return Ok(ReplicationStatusReport::absent());
            }
            if !reply.is_success() {
                return Err(reply.failure(operation, handle));
            }
            let body: ReplicationStatusBody = reply.json(operation, handle)?;
            Ok(ReplicationStatusReport {
                raw: reply.raw(),
                mirror_state: body.mirror_state(),
                healthy: body.healthy,
            })
        })
    }

    fn authorize_replication<'a>(
        &'a self,
        primary: &'a ResourceHandle,
        secondary: &'a ResourceHandle,
    ) -> ClientFuture<'a, RawStatus> {
        Box::pin(async move {
            let body = AuthorizeBody {
                remote_volume_resource_id: secondary.to_string(),
            };
            self.submit(
                Operation::AuthorizeReplication,
                Method::POST,
                primary,
                Some("authorizeReplication"),
                Some(&body),
            )
            .await
        })
    }

    fn break_replication<'a>(
        &'a self,
        secondary: &'a ResourceHandle,
        force: bool,
    ) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            let body = BreakBody {
                force_break_replication: force,
            };
            self.submit(
                Operation::BreakReplication,
                Method::POST,
                secondary,
                Some("breakReplication"),
                Some(&body),
            )
            .await
            .map(|_| ())
        })
    }

    fn delete_replication<'a>(&'a self, secondary: &'a ResourceHandle) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.submit(
                Operation::DeleteReplication,
                Method::POST,
                secondary,
                Some("deleteReplication"),
                None::<&()>,
            )
            .await
            .map(|_| ())
        })
    }

    fn backup_status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> ClientFuture<'a, BackupStatusReport> {
        Box::pin(async move {
            let operation = Operation::BackupStatus;
            let reply = self
                .send(operation, Method::GET, handle, Some("latestBackupStatus/current"), None::<&()>)
                .await?;
            if !reply.is_success() {
                return Err(reply.failure(operation, handle));
            }
            let body: BackupStatusBody = reply.json(operation, handle)?;
            Ok(BackupStatusReport {
                relationship_status: body.relationship_status,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defect::BackendDefect;
    use rstest::rstest;

    fn handle() -> ResourceHandle {
        ResourceHandle::volume("sub", "rg", "acct", "pool", "vol").expect("handle")
    }

    fn config() -> StrataConfig {
        StrataConfig {
            api_endpoint: String::from("https://management.example.test/"),
            api_version: String::from("2024-03-01"),
            bearer_token: String::from("token"),
            poll_interval_secs: 10,
            min_settle_secs: 10,
            continuous_occurrences: 5,
            create_timeout_mins: 90,
            delete_timeout_mins: 60,
            prevent_volume_destruction: true,
        }
    }

    #[rstest]
    fn failure_uses_error_envelope() {
        let reply = Reply {
            status: 400,
            body: String::from(
                r#"{"error":{"code":"BadRequest","message":"Volume replication is deleting"}}"#,
            ),
        };

        let err = reply.failure(Operation::ReplicationStatus, &handle());

        assert_eq!(err.code.as_deref(), Some("BadRequest"));
        assert_eq!(err.message, "Volume replication is deleting");
        assert_eq!(err.defect(), Some(BackendDefect::StatusWhileDeleting));
    }

    #[rstest]
    #[case("", "HTTP 502")]
    #[case("upstream timeout", "upstream timeout")]
    fn failure_falls_back_to_body_text(#[case] body: &str, #[case] expected: &str) {
        let reply = Reply {
            status: 502,
            body: body.to_owned(),
        };

        let err = reply.failure(Operation::Get, &handle());

        assert_eq!(err.message, expected);
        assert_eq!(err.code, None);
    }

    #[rstest]
    #[case(409, r#"{"error":{"code":"VolumeReplicationMissingFor","message":"gone"}}"#, true)]
    #[case(409, r#"{"error":{"code":"Conflict","message":"busy"}}"#, false)]
    #[case(400, "VolumeReplicationMissingFor", false)]
    fn replication_missing_needs_409_and_marker(
        #[case] status: u16,
        #[case] body: &str,
        #[case] expected: bool,
    ) {
        let reply = Reply {
            status,
            body: body.to_owned(),
        };
        assert_eq!(reply.is_replication_missing(), expected);
    }

    #[rstest]
    fn url_joins_endpoint_handle_and_action() {
        let client = ArmClient::new(&config()).expect("client");

        assert_eq!(
            client.url(&handle(), Some("breakReplication")),
            format!("https://management.example.test{}/breakReplication", handle())
        );
    }

    #[rstest]
    fn construction_rejects_blank_token() {
        let config = StrataConfig {
            bearer_token: String::from("  "),
            ..config()
        };

        let err = ArmClient::new(&config).expect_err("token is required");

        assert!(matches!(err, ArmClientError::Config(message) if message.contains("STRATA_BEARER_TOKEN")));
    }
}
