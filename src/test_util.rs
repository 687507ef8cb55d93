//! An in-memory wire driver for tests. It fabricates replies instead of
//! talking to a deployment and records what crosses the wire boundary, so
//! tests can assert on exactly what a real wire library would have received.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures_core::future::BoxFuture;
use uuid::Uuid;

use crate::{
    bson::{doc, spec::BinarySubtype, Binary, Bson, Document},
    client::{
        options::{ClientOptions, ServerAddress},
        session::SessionOptions,
    },
    operation::{BulkWrite, Namespace, Query, WriteModel},
    registry::ClientRegistry,
    results::WriteResult,
    selection_criteria::ReadPreference,
    topology::ServerId,
    wire::{
        OperationContext,
        ServerStatus,
        WireClient,
        WireDomain,
        WireDriver,
        WireFailure,
        WireResult,
        WireSession,
    },
};

/// Counters shared between a [`StubDriver`] and the test that owns it. They
/// survive the driver being consumed by the registry.
#[derive(Debug, Default)]
pub(crate) struct StubState {
    pub(crate) clients_created: AtomicUsize,
    pub(crate) clients_dropped: AtomicUsize,
    pub(crate) resets: AtomicUsize,
    pub(crate) commands: AtomicUsize,
    pub(crate) sessions_started: AtomicUsize,
    pub(crate) sessions_ended: AtomicUsize,
}

/// A [`WireDriver`] whose clients echo their inputs back in fabricated
/// replies.
pub(crate) struct StubDriver {
    state: Arc<StubState>,
    fail_create: Option<WireFailure>,
    fail_execute: Option<WireFailure>,
    statuses: Vec<ServerStatus>,
}

impl StubDriver {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(StubState::default()),
            fail_create: None,
            fail_execute: None,
            statuses: vec![standalone_status(1, "localhost")],
        }
    }

    pub(crate) fn state(&self) -> Arc<StubState> {
        self.state.clone()
    }

    /// Makes every `create_client` call fail with `failure`.
    pub(crate) fn fail_create(mut self, failure: WireFailure) -> Self {
        self.fail_create = Some(failure);
        self
    }

    /// Makes every execution method on minted clients fail with `failure`.
    pub(crate) fn fail_execute(mut self, failure: WireFailure) -> Self {
        self.fail_execute = Some(failure);
        self
    }

    /// Replaces the topology snapshot minted clients report.
    pub(crate) fn with_statuses(mut self, statuses: Vec<ServerStatus>) -> Self {
        self.statuses = statuses;
        self
    }
}

impl WireDriver for StubDriver {
    fn create_client<'a>(
        &'a self,
        _options: &'a ClientOptions,
    ) -> BoxFuture<'a, WireResult<Box<dyn WireClient>>> {
        Box::pin(async move {
            if let Some(failure) = self.fail_create.clone() {
                return Err(failure);
            }
            self.state.clients_created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubClient {
                state: self.state.clone(),
                fail_execute: self.fail_execute.clone(),
                statuses: self.statuses.clone(),
            }) as Box<dyn WireClient>)
        })
    }
}

struct StubClient {
    state: Arc<StubState>,
    fail_execute: Option<WireFailure>,
    statuses: Vec<ServerStatus>,
}

impl StubClient {
    /// Builds a reply that echoes the operation context, so a test can see
    /// which concerns survived shape masking and option resolution.
    fn reply(&self, context: OperationContext<'_>) -> WireResult<Document> {
        if let Some(failure) = self.fail_execute.clone() {
            return Err(failure);
        }
        self.state.commands.fetch_add(1, Ordering::SeqCst);

        let mut reply = doc! { "ok": 1 };
        if let Some(read_concern) = context.read_concern {
            reply.insert("readConcernLevel", read_concern.level.as_str());
        }
        if let Some(read_preference) = context.read_preference {
            reply.insert("readPreference", read_preference.mode());
        }
        if let Some(write_concern) = context.write_concern {
            reply.insert(
                "writeConcern",
                crate::bson::to_bson(write_concern).unwrap(),
            );
        }
        if let Some(session) = context.session {
            reply.insert("lsid", session.id().clone());
        }
        if let Some(server_id) = context.server_id {
            reply.insert("serverId", server_id.get() as i64);
        }
        Ok(reply)
    }
}

impl Drop for StubClient {
    fn drop(&mut self) {
        self.state.clients_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

impl WireClient for StubClient {
    fn reset(&self) {
        self.state.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn execute_command<'a>(
        &'a self,
        db: &'a str,
        command: &'a Document,
        context: OperationContext<'a>,
    ) -> BoxFuture<'a, WireResult<Document>> {
        Box::pin(async move {
            let mut reply = self.reply(context)?;
            reply.insert("db", db);
            if let Some(name) = command.keys().next() {
                reply.insert("commandName", name.as_str());
            }
            Ok(reply)
        })
    }

    fn execute_query<'a>(
        &'a self,
        namespace: &'a Namespace,
        query: &'a Query,
        context: OperationContext<'a>,
    ) -> BoxFuture<'a, WireResult<Document>> {
        Box::pin(async move {
            let mut reply = self.reply(context)?;
            reply.insert("ns", namespace.to_string());
            if let Some(limit) = query.limit {
                reply.insert("limit", limit);
            }
            Ok(reply)
        })
    }

    fn execute_bulk_write<'a>(
        &'a self,
        _namespace: &'a Namespace,
        bulk: &'a BulkWrite,
        context: OperationContext<'a>,
    ) -> BoxFuture<'a, WireResult<WriteResult>> {
        Box::pin(async move {
            let reply = self.reply(context)?;
            let mut result = WriteResult {
                acknowledged: context
                    .write_concern
                    .map(|write_concern| write_concern.is_acknowledged())
                    .unwrap_or(true),
                reply,
                ..Default::default()
            };
            for model in bulk.models() {
                match model {
                    WriteModel::Insert { .. } => result.inserted_count += 1,
                    WriteModel::Update { .. } => result.matched_count += 1,
                    WriteModel::Delete { .. } => result.deleted_count += 1,
                }
            }
            Ok(result)
        })
    }

    fn start_session<'a>(
        &'a self,
        _options: Option<&'a SessionOptions>,
    ) -> BoxFuture<'a, WireResult<Box<dyn WireSession>>> {
        Box::pin(async move {
            self.state.sessions_started.fetch_add(1, Ordering::SeqCst);
            let id = doc! {
                "id": Bson::Binary(Binary {
                    subtype: BinarySubtype::Uuid,
                    bytes: Uuid::new_v4().as_bytes().to_vec(),
                })
            };
            Ok(Box::new(StubSession {
                state: self.state.clone(),
                id,
            }) as Box<dyn WireSession>)
        })
    }

    fn servers(&self) -> WireResult<Vec<ServerStatus>> {
        Ok(self.statuses.clone())
    }

    fn select_server<'a>(
        &'a self,
        _read_preference: Option<&'a ReadPreference>,
    ) -> BoxFuture<'a, WireResult<ServerStatus>> {
        Box::pin(async move {
            match self.statuses.first() {
                Some(status) => Ok(status.clone()),
                None => Err(WireFailure::new(
                    WireDomain::ServerSelection,
                    13053,
                    "no servers available",
                )),
            }
        })
    }
}

struct StubSession {
    state: Arc<StubState>,
    id: Document,
}

impl WireSession for StubSession {
    fn id(&self) -> &Document {
        &self.id
    }

    fn end(&mut self) -> BoxFuture<'_, WireResult<()>> {
        Box::pin(async move {
            self.state.sessions_ended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// A registry backed by a fresh [`StubDriver`], plus the driver's counters.
pub(crate) fn stub_registry() -> (Arc<ClientRegistry>, Arc<StubState>) {
    let driver = StubDriver::new();
    let state = driver.state();
    (Arc::new(ClientRegistry::new(driver)), state)
}

/// A registry around a customized [`StubDriver`].
pub(crate) fn registry_with(driver: StubDriver) -> (Arc<ClientRegistry>, Arc<StubState>) {
    let state = driver.state();
    (Arc::new(ClientRegistry::new(driver)), state)
}

pub(crate) fn standalone_status(id: u32, host: &str) -> ServerStatus {
    ServerStatus::builder()
        .id(ServerId::new(id))
        .address(ServerAddress::Tcp {
            host: host.to_string(),
            port: Some(27017),
        })
        .server_type("Standalone")
        .build()
}
