//! Hierarchical identifiers for control-plane resources.
//!
//! A [`ResourceHandle`] addresses an account, a capacity pool, a volume or a
//! snapshot. Handles are immutable once built and render to (and parse from)
//! the ARM path form used by the remote API.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const PROVIDER: &str = "Microsoft.NetApp";

/// Level of the resource hierarchy a handle points at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// A storage account.
    Account,
    /// A capacity pool inside an account.
    Pool,
    /// A volume inside a capacity pool.
    Volume,
    /// A snapshot of a volume.
    Snapshot,
}

/// Errors raised while building or parsing a [`ResourceHandle`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HandleError {
    /// Raised when a path segment is empty.
    #[error("resource id segment '{0}' must not be empty")]
    EmptySegment(&'static str),
    /// Raised when the id does not follow the expected layout.
    #[error("malformed resource id '{id}': {reason}")]
    Malformed {
        /// Identifier passed by the caller.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Immutable address of a remote resource.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceHandle {
    subscription: String,
    resource_group: String,
    account: String,
    pool: Option<String>,
    volume: Option<String>,
    snapshot: Option<String>,
}

fn segment(value: impl Into<String>, name: &'static str) -> Result<String, HandleError> {
    let trimmed = value.into().trim().to_owned();
    if trimmed.is_empty() {
        return Err(HandleError::EmptySegment(name));
    }
    Ok(trimmed)
}

impl ResourceHandle {
    /// Builds an account handle.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::EmptySegment`] when any segment is blank.
    pub fn account(
        subscription: impl Into<String>,
        resource_group: impl Into<String>,
        account: impl Into<String>,
    ) -> Result<Self, HandleError> {
        Ok(Self {
            subscription: segment(subscription, "subscriptions")?,
            resource_group: segment(resource_group, "resourceGroups")?,
            account: segment(account, "netAppAccounts")?,
            pool: None,
            volume: None,
            snapshot: None,
        })
    }

    /// Builds a volume handle.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::EmptySegment`] when any segment is blank.
    pub fn volume(
        subscription: impl Into<String>,
        resource_group: impl Into<String>,
        account: impl Into<String>,
        pool: impl Into<String>,
        volume: impl Into<String>,
    ) -> Result<Self, HandleError> {
        Self::account(subscription, resource_group, account)?
            .child_pool(pool)?
            .child_volume(volume)
    }

    /// Derives the handle of a capacity pool inside this account.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Malformed`] when this handle is not an account,
    /// or [`HandleError::EmptySegment`] for a blank name.
    pub fn child_pool(&self, pool: impl Into<String>) -> Result<Self, HandleError> {
        self.require_kind(ResourceKind::Account)?;
        Ok(Self {
            pool: Some(segment(pool, "capacityPools")?),
            ..self.clone()
        })
    }

    /// Derives the handle of a volume inside this pool.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Malformed`] when this handle is not a pool, or
    /// [`HandleError::EmptySegment`] for a blank name.
    pub fn child_volume(&self, volume: impl Into<String>) -> Result<Self, HandleError> {
        self.require_kind(ResourceKind::Pool)?;
        Ok(Self {
            volume: Some(segment(volume, "volumes")?),
            ..self.clone()
        })
    }

    /// Derives the handle of a snapshot of this volume.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Malformed`] when this handle is not a volume, or
    /// [`HandleError::EmptySegment`] for a blank name.
    pub fn child_snapshot(&self, snapshot: impl Into<String>) -> Result<Self, HandleError> {
        self.require_kind(ResourceKind::Volume)?;
        Ok(Self {
            snapshot: Some(segment(snapshot, "snapshots")?),
            ..self.clone()
        })
    }

    fn require_kind(&self, expected: ResourceKind) -> Result<(), HandleError> {
        if self.kind() == expected {
            return Ok(());
        }
        Err(HandleError::Malformed {
            id: self.to_string(),
            reason: format!("expected a {expected:?} handle, found {:?}", self.kind()),
        })
    }

    /// Returns the hierarchy level addressed by this handle.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match (&self.pool, &self.volume, &self.snapshot) {
            (None, _, _) => ResourceKind::Account,
            (Some(_), None, _) => ResourceKind::Pool,
            (Some(_), Some(_), None) => ResourceKind::Volume,
            (Some(_), Some(_), Some(_)) => ResourceKind::Snapshot,
        }
    }

    /// Subscription identifier.
    #[must_use]
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Resource group name.
    #[must_use]
    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Account name.
    #[must_use]
    pub fn account_name(&self) -> &str {
        &self.account
    }

    /// Capacity pool name, when the handle is below account level.
    #[must_use]
    pub fn pool_name(&self) -> Option<&str> {
        self.pool.as_deref()
    }

    /// Volume name, when the handle addresses a volume or snapshot.
    #[must_use]
    pub fn volume_name(&self) -> Option<&str> {
        self.volume.as_deref()
    }

    /// Snapshot name, when the handle addresses a snapshot.
    #[must_use]
    pub fn snapshot_name(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{PROVIDER}/netAppAccounts/{}",
            self.subscription, self.resource_group, self.account
        )?;
        if let Some(pool) = &self.pool {
            write!(f, "/capacityPools/{pool}")?;
        }
        if let Some(volume) = &self.volume {
            write!(f, "/volumes/{volume}")?;
        }
        if let Some(snapshot) = &self.snapshot {
            write!(f, "/snapshots/{snapshot}")?;
        }
        Ok(())
    }
}

impl FromStr for ResourceHandle {
    type Err = HandleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| HandleError::Malformed {
            id: value.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = value.trim();
        let Some(path) = trimmed.strip_prefix('/') else {
            return Err(malformed("must start with '/'"));
        };
        let parts: Vec<&str> = path.split('/').collect();
        let chunks = parts.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            return Err(malformed("segments must come in key/value pairs"));
        }

        let mut pairs = chunks.map(|pair| match pair {
            [key, name] => (*key, *name),
            _ => ("", ""),
        });

        let mut expect = |key: &'static str| {
            match pairs.next() {
                None => Ok::<_, HandleError>(None),
                Some((found, name)) if found.eq_ignore_ascii_case(key) => Ok(Some(name)),
                Some((found, _)) => Err(malformed(&format!("expected '{key}', found '{found}'"))),
            }
        };

        let subscription = expect("subscriptions")?.ok_or_else(|| malformed("missing subscription"))?;
        let resource_group =
            expect("resourceGroups")?.ok_or_else(|| malformed("missing resource group"))?;
        let provider = expect("providers")?.ok_or_else(|| malformed("missing provider"))?;
        if !provider.eq_ignore_ascii_case(PROVIDER) {
            return Err(malformed(&format!("unsupported provider '{provider}'")));
        }
        let account = expect("netAppAccounts")?.ok_or_else(|| malformed("missing account"))?;
        let mut handle = Self::account(subscription, resource_group, account)?;

        if let Some(pool) = expect("capacityPools")? {
            handle = handle.child_pool(pool)?;
            if let Some(volume) = expect("volumes")? {
                handle = handle.child_volume(volume)?;
                if let Some(snapshot) = expect("snapshots")? {
                    handle = handle.child_snapshot(snapshot)?;
                }
            }
        }

        if pairs.next().is_some() {
            return Err(malformed("unexpected trailing segments"));
        }
        Ok(handle)
    }
}
