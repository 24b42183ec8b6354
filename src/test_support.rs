//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::client::{ClientError, ClientFuture, Operation, RemoteResourceClient};
use crate::handle::ResourceHandle;
use crate::poller::PollTiming;
use crate::status::{EndpointType, RawStatus};
use crate::volume::{
    BackupStatusReport, DataProtection, ReplicationSettings, ReplicationStatusReport,
    ResourceSnapshot, Volume, VolumePatch, VolumeRequest,
};

/// Failure injected into a [`ScriptedControlPlane`] reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptedFailure {
    status: RawStatus,
    code: Option<String>,
    message: String,
}

impl ScriptedFailure {
    /// Failure carrying an HTTP status code and message.
    #[must_use]
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self {
            status: RawStatus::Code(code),
            code: None,
            message: message.into(),
        }
    }

    /// Failure where no response was received.
    #[must_use]
    pub fn dropped() -> Self {
        Self {
            status: RawStatus::DroppedConnection,
            code: None,
            message: String::from("connection reset"),
        }
    }

    /// Attaches a provider error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn into_error(self, operation: Operation, target: &ResourceHandle) -> ClientError {
        let error = ClientError::new(operation, target, self.status, self.message);
        match self.code {
            Some(code) => error.with_code(code),
            None => error,
        }
    }
}

/// Scripted reply for one operation.
pub type Reply<T> = Result<T, ScriptedFailure>;

/// FIFO of replies whose last entry repeats once the queue drains.
#[derive(Debug)]
struct Replies<T> {
    queue: VecDeque<Reply<T>>,
    last: Option<Reply<T>>,
    fallback: Reply<T>,
}

impl<T: Clone> Replies<T> {
    fn new(fallback: Reply<T>) -> Self {
        Self {
            queue: VecDeque::new(),
            last: None,
            fallback,
        }
    }

    fn push(&mut self, reply: Reply<T>) {
        self.queue.push_back(reply);
    }

    fn next(&mut self) -> Reply<T> {
        if let Some(reply) = self.queue.pop_front() {
            self.last = Some(reply.clone());
            return reply;
        }
        self.last.clone().unwrap_or_else(|| self.fallback.clone())
    }
}

/// Records a single call made through [`ScriptedControlPlane`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Call {
    /// Operation invoked.
    pub operation: Operation,
    /// Resource addressed by the call.
    pub target: ResourceHandle,
    /// Second resource involved, such as the secondary of an authorization.
    pub peer: Option<ResourceHandle>,
}

#[derive(Debug)]
struct State {
    gets: Replies<ResourceSnapshot>,
    creates: Replies<RawStatus>,
    updates: Replies<RawStatus>,
    deletes: Replies<RawStatus>,
    replication_statuses: Replies<ReplicationStatusReport>,
    authorizations: Replies<RawStatus>,
    breaks: Replies<()>,
    replication_deletes: Replies<()>,
    backup_statuses: Replies<BackupStatusReport>,
    calls: Vec<Call>,
    patches: Vec<VolumePatch>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            gets: Replies::new(Ok(ResourceSnapshot::missing())),
            creates: Replies::new(Ok(RawStatus::Code(201))),
            updates: Replies::new(Ok(RawStatus::Code(202))),
            deletes: Replies::new(Ok(RawStatus::Code(202))),
            replication_statuses: Replies::new(Ok(ReplicationStatusReport::absent())),
            authorizations: Replies::new(Ok(RawStatus::Code(202))),
            breaks: Replies::new(Ok(())),
            replication_deletes: Replies::new(Ok(())),
            backup_statuses: Replies::new(Ok(BackupStatusReport {
                relationship_status: Some(String::from("Idle")),
            })),
            calls: Vec::new(),
            patches: Vec::new(),
        }
    }
}

/// In-memory control plane that replays scripted replies and records calls.
///
/// Each operation has its own reply queue. Once a queue drains its last reply
/// repeats, so a test only scripts the transitions it cares about.
#[derive(Clone, Debug, Default)]
pub struct ScriptedControlPlane {
    state: Arc<Mutex<State>>,
}

impl ScriptedControlPlane {
    /// Creates a control plane where every volume is missing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|err| panic!("scripted control plane lock poisoned: {err}"));
        f(&mut state)
    }

    /// Queues a reply for `get`.
    pub fn push_get(&self, reply: Reply<ResourceSnapshot>) {
        self.with_state(|state| state.gets.push(reply));
    }

    /// Queues a reply for `create`.
    pub fn push_create(&self, reply: Reply<RawStatus>) {
        self.with_state(|state| state.creates.push(reply));
    }

    /// Queues a reply for `update`.
    pub fn push_update(&self, reply: Reply<RawStatus>) {
        self.with_state(|state| state.updates.push(reply));
    }

    /// Queues a reply for `delete`.
    pub fn push_delete(&self, reply: Reply<RawStatus>) {
        self.with_state(|state| state.deletes.push(reply));
    }

    /// Queues a reply for `replication_status`.
    pub fn push_replication_status(&self, reply: Reply<ReplicationStatusReport>) {
        self.with_state(|state| state.replication_statuses.push(reply));
    }

    /// Queues a reply for `authorize_replication`.
    pub fn push_authorize(&self, reply: Reply<RawStatus>) {
        self.with_state(|state| state.authorizations.push(reply));
    }

    /// Queues a reply for `break_replication`.
    pub fn push_break(&self, reply: Reply<()>) {
        self.with_state(|state| state.breaks.push(reply));
    }

    /// Queues a reply for `delete_replication`.
    pub fn push_delete_replication(&self, reply: Reply<()>) {
        self.with_state(|state| state.replication_deletes.push(reply));
    }

    /// Queues a reply for `backup_status`.
    pub fn push_backup_status(&self, reply: Reply<BackupStatusReport>) {
        self.with_state(|state| state.backup_statuses.push(reply));
    }

    /// Returns every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|state| state.calls.clone())
    }

    /// Returns the recorded operations, in order, skipping reads.
    ///
    /// Reads (`get`, `replication_status`, `backup_status`) are omitted so
    /// assertions focus on the mutations a flow performed.
    #[must_use]
    pub fn mutations(&self) -> Vec<Operation> {
        self.calls()
            .into_iter()
            .map(|call| call.operation)
            .filter(|operation| {
                !matches!(
                    operation,
                    Operation::Get | Operation::ReplicationStatus | Operation::BackupStatus
                )
            })
            .collect()
    }

    /// Counts recorded calls of `operation`.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.with_state(|state| {
            state
                .calls
                .iter()
                .filter(|call| call.operation == operation)
                .count()
        })
    }

    /// Returns every patch submitted through `update`.
    #[must_use]
    pub fn patches(&self) -> Vec<VolumePatch> {
        self.with_state(|state| state.patches.clone())
    }

    fn record(&self, operation: Operation, target: &ResourceHandle, peer: Option<&ResourceHandle>) {
        self.with_state(|state| {
            state.calls.push(Call {
                operation,
                target: target.clone(),
                peer: peer.cloned(),
            });
        });
    }

    fn reply<'a, T>(
        &self,
        operation: Operation,
        target: &ResourceHandle,
        next: impl FnOnce(&mut State) -> Reply<T>,
    ) -> ClientFuture<'a, T>
    where
        T: Send + 'a,
    {
        let result = self
            .with_state(next)
            .map_err(|failure| failure.into_error(operation, target));
        Box::pin(async move { result })
    }
}

impl RemoteResourceClient for ScriptedControlPlane {
    fn get<'a>(&'a self, handle: &'a ResourceHandle) -> ClientFuture<'a, ResourceSnapshot> {
        self.record(Operation::Get, handle, None);
        self.reply(Operation::Get, handle, |state| state.gets.next())
    }

    fn create<'a>(
        &'a self,
        handle: &'a ResourceHandle,
        _request: &'a VolumeRequest,
    ) -> ClientFuture<'a, RawStatus> {
        self.record(Operation::Create, handle, None);
        self.reply(Operation::Create, handle, |state| state.creates.next())
    }

    fn update<'a>(
        &'a self,
        handle: &'a ResourceHandle,
        patch: &'a VolumePatch,
    ) -> ClientFuture<'a, RawStatus> {
        self.record(Operation::Update, handle, None);
        self.reply(Operation::Update, handle, |state| {
            state.patches.push(patch.clone());
            state.updates.next()
        })
    }

    fn delete<'a>(&'a self, handle: &'a ResourceHandle) -> ClientFuture<'a, RawStatus> {
        self.record(Operation::Delete, handle, None);
        self.reply(Operation::Delete, handle, |state| state.deletes.next())
    }

    fn replication_status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> ClientFuture<'a, ReplicationStatusReport> {
        self.record(Operation::ReplicationStatus, handle, None);
        self.reply(Operation::ReplicationStatus, handle, |state| {
            state.replication_statuses.next()
        })
    }

    fn authorize_replication<'a>(
        &'a self,
        primary: &'a ResourceHandle,
        secondary: &'a ResourceHandle,
    ) -> ClientFuture<'a, RawStatus> {
        self.record(Operation::AuthorizeReplication, primary, Some(secondary));
        self.reply(Operation::AuthorizeReplication, primary, |state| {
            state.authorizations.next()
        })
    }

    fn break_replication<'a>(
        &'a self,
        secondary: &'a ResourceHandle,
        _force: bool,
    ) -> ClientFuture<'a, ()> {
        self.record(Operation::BreakReplication, secondary, None);
        self.reply(Operation::BreakReplication, secondary, |state| state.breaks.next())
    }

    fn delete_replication<'a>(&'a self, secondary: &'a ResourceHandle) -> ClientFuture<'a, ()> {
        self.record(Operation::DeleteReplication, secondary, None);
        self.reply(Operation::DeleteReplication, secondary, |state| {
            state.replication_deletes.next()
        })
    }

    fn backup_status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> ClientFuture<'a, BackupStatusReport> {
        self.record(Operation::BackupStatus, handle, None);
        self.reply(Operation::BackupStatus, handle, |state| {
            state.backup_statuses.next()
        })
    }
}

/// Poll timing that keeps paused-clock tests short: no debounce, short waits.
#[must_use]
pub const fn quick_timing() -> PollTiming {
    PollTiming {
        interval: Duration::from_secs(1),
        min_settle: Duration::ZERO,
        continuous_occurrences: 1,
    }
}

/// Builds a volume handle under a fixed subscription and account.
///
/// # Panics
///
/// Panics when `pool` or `volume` is empty.
#[must_use]
pub fn volume_handle(pool: &str, volume: &str) -> ResourceHandle {
    ResourceHandle::volume("sub-1", "rg-storage", "acct", pool, volume)
        .unwrap_or_else(|err| panic!("invalid test handle: {err}"))
}

/// Builds a plain volume at `handle` without data protection.
#[must_use]
pub fn sample_volume(handle: &ResourceHandle) -> Volume {
    Volume {
        handle: handle.clone(),
        location: String::from("westeurope"),
        provisioning_state: Some(String::from("Succeeded")),
        creation_token: String::from("export-path"),
        service_level: Some(String::from("Premium")),
        subnet_id: String::from("/subscriptions/sub-1/resourceGroups/rg-net/providers/Microsoft.Network/virtualNetworks/vnet/subnets/anf"),
        usage_threshold_bytes: 100 * 1_073_741_824,
        protocols: vec![String::from("NFSv3")],
        data_protection: DataProtection::default(),
        tags: BTreeMap::new(),
    }
}

/// Builds a volume at `handle` taking part in a replication relationship.
#[must_use]
pub fn replicated_volume(
    handle: &ResourceHandle,
    endpoint_type: EndpointType,
    remote: &ResourceHandle,
) -> Volume {
    let mut volume = sample_volume(handle);
    volume.data_protection.replication = Some(ReplicationSettings {
        endpoint_type,
        remote_volume: remote.clone(),
        schedule: Some(String::from("hourly")),
    });
    volume
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// Every key in `remove` is unset for the lifetime of the guard, which
    /// keeps ambient `STRATA_*` values from leaking into a test.
    pub async fn set_vars(pairs: &[(&str, &str)], remove: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(remove.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + remove.len());
        for (key, value) in pairs {
            previous.push((key.to_string(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in remove {
            previous.push((key.to_string(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
