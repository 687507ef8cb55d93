//! Process-wide bookkeeping for the wire clients behind
//! [`Client`](crate::Client) handles.

#[cfg(test)]
mod test;

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    mem::ManuallyDrop,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        Weak,
    },
};

use md5::{Digest, Md5};
use serde::Serialize;

use crate::{
    bson::{Bson, Document},
    client::{
        options::{ClientOptions, DriverOptions},
        ClientInner,
    },
    error::{Error, Result},
    trace::REGISTRY_TRACING_EVENT_TARGET,
    wire::{WireClient, WireDriver},
};

/// The `last_reset_by_pid` value of a client that has never been reset.
/// Process id 0 is never assigned to a userland process.
const UNRESET: u32 = 0;

/// The identifier of an operating system process.
///
/// Client handles remember the process that created them so that a forked
/// child never reuses pooled sockets without resetting them, and never
/// destroys connections it does not own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{_0}")]
pub struct ProcessId(u32);

impl ProcessId {
    /// The id of the currently running process.
    pub fn current() -> Self {
        Self(std::process::id())
    }

    pub(crate) fn as_u32(self) -> u32 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(pid: u32) -> Self {
        Self(pid)
    }
}

pub(crate) type HandleId = u64;

/// The digest identifying a logical connection target: the combination of the
/// connection options (including the original connection string, when the
/// options were parsed from one) and the driver options.
///
/// Clients constructed with structurally equal options get equal keys and
/// share one underlying wire client.
#[derive(Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{_0}")]
pub struct ClientKey(String);

impl ClientKey {
    pub(crate) fn new(options: &ClientOptions, driver_options: &DriverOptions) -> Result<Self> {
        let mut hasher = Md5::new();
        hasher.update(canonical_bytes(options)?);
        hasher.update(canonical_bytes(driver_options)?);
        Ok(Self(hex::encode(hasher.finalize())))
    }
}

/// Serializes `value` to BSON with every document's keys sorted, so that map
/// types with unstable iteration order digest identically.
fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let document = crate::bson::to_document(value)?;
    crate::bson::to_vec(&sort_document(document)).map_err(Error::from)
}

fn sort_document(document: Document) -> Document {
    let mut entries: Vec<(String, Bson)> = document
        .into_iter()
        .map(|(key, value)| (key, sort_bson(value)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().collect()
}

fn sort_bson(value: Bson) -> Bson {
    match value {
        Bson::Document(document) => Bson::Document(sort_document(document)),
        Bson::Array(values) => Bson::Array(values.into_iter().map(sort_bson).collect()),
        other => other,
    }
}

/// A wire client plus the bookkeeping needed to share it between handles and
/// to protect it across process forks.
pub(crate) struct PersistedClient {
    client: ManuallyDrop<Box<dyn WireClient>>,
    created_by_pid: ProcessId,
    last_reset_by_pid: AtomicU32,
}

impl PersistedClient {
    fn new(client: Box<dyn WireClient>, created_by_pid: ProcessId) -> Self {
        Self {
            client: ManuallyDrop::new(client),
            created_by_pid,
            last_reset_by_pid: AtomicU32::new(UNRESET),
        }
    }

    /// The wire client. Callers about to touch the deployment go through
    /// [`reset_once`](Self::reset_once) first.
    pub(crate) fn wire(&self) -> &dyn WireClient {
        self.client.as_ref()
    }

    /// Resets the wire client the first time a process other than the
    /// creating one uses it after a fork, discarding sockets and sessions
    /// inherited from the parent.
    ///
    /// The reset happens strictly before any wire I/O the new process
    /// performs on this client. Two threads hitting the first use at once may
    /// both reset; resets are idempotent in the wire library.
    pub(crate) fn reset_once(&self, pid: ProcessId) {
        if pid == self.created_by_pid {
            return;
        }
        if self.last_reset_by_pid.load(Ordering::Acquire) == pid.as_u32() {
            return;
        }

        tracing::debug!(
            target: REGISTRY_TRACING_EVENT_TARGET,
            pid = %pid,
            created_by_pid = %self.created_by_pid,
            "resetting a client handle inherited from another process"
        );

        self.client.reset();
        self.last_reset_by_pid.store(pid.as_u32(), Ordering::Release);
    }
}

impl Drop for PersistedClient {
    fn drop(&mut self) {
        if ProcessId::current() == self.created_by_pid {
            // Safety: the wire client is dropped exactly once, here, and only
            // by the process that created it.
            unsafe { ManuallyDrop::drop(&mut self.client) };
        } else {
            // Destruction rights stay with the creating process. Tearing the
            // wire client down here would close sockets whose file
            // descriptors are shared with the parent.
            tracing::warn!(
                target: REGISTRY_TRACING_EVENT_TARGET,
                created_by_pid = %self.created_by_pid,
                "leaking a wire client created by another process"
            );
        }
    }
}

#[derive(Default)]
struct RegistryState {
    persistent: HashMap<ClientKey, Arc<PersistedClient>>,
    request: HashMap<ClientKey, Arc<PersistedClient>>,
    handles: HashMap<HandleId, Weak<ClientInner>>,
    next_handle_id: HandleId,
}

/// Tracks every client handle in the process and deduplicates the wire
/// clients behind them.
///
/// One registry is constructed per host integration, around the
/// [`WireDriver`] the integration supplies. Clients built from structurally
/// equal options share a single wire client. Persistent entries live until
/// [`shutdown`](ClientRegistry::shutdown); entries for clients that disable
/// persistence are torn down when the request that created them ends.
pub struct ClientRegistry {
    driver: Box<dyn WireDriver>,
    state: Mutex<RegistryState>,
}

impl ClientRegistry {
    /// Creates a new registry around the wire driver that will mint its
    /// client handles.
    pub fn new(driver: impl WireDriver) -> Self {
        Self {
            driver: Box::new(driver),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Registry state is kept consistent even if a panic poisons the lock;
    /// lookups and teardown proceed on whatever state was last written.
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the shared wire client for `key`, establishing one through the
    /// wire driver if no live entry exists.
    ///
    /// On failure the maps are left exactly as they were before the call.
    pub(crate) async fn acquire(
        &self,
        key: &ClientKey,
        options: &ClientOptions,
        persistent: bool,
        pid: ProcessId,
    ) -> Result<Arc<PersistedClient>> {
        {
            let state = self.state();
            let map = if persistent {
                &state.persistent
            } else {
                &state.request
            };
            if let Some(existing) = map.get(key) {
                let existing = existing.clone();
                drop(state);
                existing.reset_once(pid);
                return Ok(existing);
            }
        }

        // The lock is not held while the wire client is established, so a
        // concurrent caller with an equal key can reach this point too. The
        // map is re-checked before inserting.
        let client = self
            .driver
            .create_client(options)
            .await
            .map_err(|failure| {
                Error::wire(format!("failed to create a wire client for key {}", key))
                    .with_source(Error::from(failure))
            })?;

        let created = Arc::new(PersistedClient::new(client, pid));

        let mut state = self.state();
        let map = if persistent {
            &mut state.persistent
        } else {
            &mut state.request
        };
        match map.entry(key.clone()) {
            Entry::Occupied(entry) => {
                // A concurrent caller won the race. The redundant client was
                // created by this process, so dropping it tears it down.
                let existing = entry.get().clone();
                drop(state);
                drop(created);
                existing.reset_once(pid);
                Ok(existing)
            }
            Entry::Vacant(entry) => {
                tracing::debug!(
                    target: REGISTRY_TRACING_EVENT_TARGET,
                    key = %key,
                    persistent,
                    "created a new wire client"
                );
                entry.insert(created.clone());
                Ok(created)
            }
        }
    }

    pub(crate) fn register_handle(&self, handle: Weak<ClientInner>) -> HandleId {
        let mut state = self.state();
        let id = state.next_handle_id;
        state.next_handle_id += 1;
        state.handles.insert(id, handle);
        id
    }

    pub(crate) fn unregister_handle(&self, id: HandleId) {
        self.state().handles.remove(&id);
    }

    /// The number of live client handles tracked by this registry.
    pub fn handle_count(&self) -> usize {
        self.state()
            .handles
            .values()
            .filter(|handle| handle.strong_count() > 0)
            .count()
    }

    /// Prepares the registry for a new request. Request-scoped clients left
    /// over from a previous request are torn down first, so calling this
    /// twice in a row is harmless.
    pub fn begin_request(&self) {
        let discarded = self.drain_request();
        if discarded > 0 {
            tracing::debug!(
                target: REGISTRY_TRACING_EVENT_TARGET,
                count = discarded,
                "discarded request-scoped clients left over from a previous request"
            );
        }
    }

    /// Tears down the clients scoped to the request that is ending.
    /// Persistent clients are kept for future requests.
    pub fn end_request(&self) {
        let released = self.drain_request();
        if released > 0 {
            tracing::debug!(
                target: REGISTRY_TRACING_EVENT_TARGET,
                count = released,
                "released request-scoped clients"
            );
        }
    }

    /// Tears down every client the registry still tracks. Called once at
    /// process shutdown. Clients created by other processes are leaked rather
    /// than destroyed.
    pub fn shutdown(&self) {
        let (request, persistent) = {
            let mut state = self.state();
            (
                state.request.drain().collect::<Vec<_>>(),
                state.persistent.drain().collect::<Vec<_>>(),
            )
        };
        let count = request.len() + persistent.len();
        drop(request);
        drop(persistent);

        tracing::debug!(
            target: REGISTRY_TRACING_EVENT_TARGET,
            count,
            "registry shut down"
        );
    }

    /// Drops request-scoped entries outside the state lock; tearing down a
    /// wire client can block.
    fn drain_request(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state();
            state.request.drain().collect()
        };
        let count = drained.len();
        drop(drained);
        count
    }

    #[cfg(test)]
    pub(crate) fn persistent_count(&self) -> usize {
        self.state().persistent.len()
    }

    #[cfg(test)]
    pub(crate) fn request_count(&self) -> usize {
        self.state().request.len()
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state();
        fmt.debug_struct("ClientRegistry")
            .field("persistent_clients", &state.persistent.len())
            .field("request_clients", &state.request.len())
            .field("handles", &state.handles.len())
            .finish()
    }
}
