//! Contains the clients to interact with a MongoDB deployment.

pub mod options;
pub mod session;


use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    bson::Document,
    client::{
        options::{ClientOptions, DriverOptions},
        session::{ClientSession, SessionOptions},
    },
    concern::{ReadConcern, WriteConcern},
    error::{Error, Result},
    operation::{BulkWrite, CommandShape, ExecuteOptions, Namespace, Query, ResolvedConcerns},
    registry::{ClientKey, ClientRegistry, HandleId, PersistedClient, ProcessId},
    results::WriteResult,
    selection_criteria::{verify_max_staleness, ReadPreference},
    topology::{ServerDescription, ServerId},
    trace::SERVER_SELECTION_TRACING_EVENT_TARGET,
    wire::OperationContext,
};

/// This is the main entry point for the API. A `Client` is a handle to a
/// MongoDB deployment, backed by a wire client minted by the
/// [`ClientRegistry`] it is registered in.
///
/// `Client` uses [`std::sync::Arc`] internally, so it can be shared and
/// cloned safely among threads. Handles built from structurally equal options
/// share one wire client; dropping a handle never tears the wire client down.
///
/// ## Default options
///
/// The read concern, read preference, and write concern carried in this
/// client's [`ClientOptions`] are inherited by every executed operation
/// unless the caller's [`ExecuteOptions`] override them.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    id: HandleId,
    registry: Arc<ClientRegistry>,
    key: ClientKey,
    entry: Weak<PersistedClient>,
    options: ClientOptions,
    driver_options: DriverOptions,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.registry.unregister_handle(self.id);
    }
}

impl Client {
    /// Creates a new `Client` connected to the deployment specified by `uri`,
    /// registered in `registry`.
    pub async fn with_uri_str(
        registry: &Arc<ClientRegistry>,
        uri: impl AsRef<str>,
    ) -> Result<Self> {
        let options = ClientOptions::parse(uri)?;
        Self::with_options(registry, options, Default::default()).await
    }

    /// Creates a new `Client` with the given options, registered in
    /// `registry`.
    pub async fn with_options(
        registry: &Arc<ClientRegistry>,
        options: ClientOptions,
        driver_options: DriverOptions,
    ) -> Result<Self> {
        options.validate()?;

        let key = ClientKey::new(&options, &driver_options)?;
        let persistent = !driver_options.disable_client_persistence;
        let entry = registry
            .acquire(&key, &options, persistent, ProcessId::current())
            .await?;

        let registry = registry.clone();
        let inner = Arc::new_cyclic(|weak| ClientInner {
            id: registry.register_handle(weak.clone()),
            registry: registry.clone(),
            key,
            entry: Arc::downgrade(&entry),
            options,
            driver_options,
        });

        Ok(Self { inner })
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// The digest identifying this client's logical connection target.
    /// Clients with equal keys share one wire client.
    pub fn key(&self) -> &ClientKey {
        &self.inner.key
    }

    /// Whether this client's wire client persists across requests.
    pub fn persistent(&self) -> bool {
        !self.inner.driver_options.disable_client_persistence
    }

    /// The default read concern for operations executed on this client.
    pub fn read_concern(&self) -> Option<&ReadConcern> {
        self.inner.options.read_concern.as_ref()
    }

    /// The default read preference for operations executed on this client.
    pub fn read_preference(&self) -> Option<&ReadPreference> {
        self.inner.options.read_preference.as_ref()
    }

    /// The default write concern for operations executed on this client.
    pub fn write_concern(&self) -> Option<&WriteConcern> {
        self.inner.options.write_concern.as_ref()
    }

    fn persisted(&self) -> Result<Arc<PersistedClient>> {
        self.inner.entry.upgrade().ok_or_else(|| {
            Error::runtime("the client's underlying connection handle has been destroyed")
        })
    }

    /// Every wire access goes through here, so a client inherited across a
    /// fork is reset before its first use in the new process.
    fn checked_wire(&self) -> Result<Arc<PersistedClient>> {
        let entry = self.persisted()?;
        entry.reset_once(ProcessId::current());
        Ok(entry)
    }

    /// Starts a new [`ClientSession`].
    pub async fn start_session(
        &self,
        options: impl Into<Option<SessionOptions>>,
    ) -> Result<ClientSession> {
        let options = options.into();
        let entry = self.checked_wire()?;
        let wire = entry
            .wire()
            .start_session(options.as_ref())
            .await
            .map_err(Error::from)?;
        Ok(ClientSession::new(wire, self.clone(), options))
    }

    /// Resolves the caller's options against this client's defaults and masks
    /// them through the executed command's shape.
    fn prepare<'a>(
        &self,
        shape: CommandShape,
        options: Option<ExecuteOptions<'a>>,
    ) -> Result<PreparedOperation<'a>> {
        let mut options = options;

        let (session, server_id) = match options.as_ref() {
            Some(options) => (options.session, options.server_id),
            None => (None, None),
        };

        if let Some(session) = session {
            if !session.owned_by(self) {
                return Err(Error::logic("the session was started by a different client"));
            }
        }

        resolve_options!(self, options, [read_concern, read_preference, write_concern]);

        let concerns = ResolvedConcerns::select(shape, options.unwrap_or_default());

        if let Some(ref write_concern) = concerns.write_concern {
            write_concern.validate()?;
            if session.is_some() && !write_concern.is_acknowledged() {
                return Err(Error::invalid_argument(
                    "a session cannot be used with an unacknowledged write concern",
                ));
            }
        }

        if let Some(max_staleness) = concerns
            .read_preference
            .as_ref()
            .and_then(ReadPreference::max_staleness)
        {
            verify_max_staleness(max_staleness)?;
        }

        Ok(PreparedOperation {
            concerns,
            session,
            server_id,
        })
    }

    async fn run_command(
        &self,
        shape: CommandShape,
        db: &str,
        command: Document,
        options: Option<ExecuteOptions<'_>>,
    ) -> Result<Document> {
        let prepared = self.prepare(shape, options)?;
        let entry = self.checked_wire()?;
        let context = prepared.context()?;
        entry
            .wire()
            .execute_command(db, &command, context)
            .await
            .map_err(Error::from)
    }

    /// Runs `command` on `db` exactly as provided. All three concern types
    /// from the resolved options are attached.
    pub async fn execute_command(
        &self,
        db: impl AsRef<str>,
        command: Document,
        options: impl Into<Option<ExecuteOptions<'_>>>,
    ) -> Result<Document> {
        self.run_command(CommandShape::Raw, db.as_ref(), command, options.into())
            .await
    }

    /// Runs `command` on `db` as a read. Read concern and read preference are
    /// attached; a write concern in the resolved options is ignored.
    pub async fn execute_read_command(
        &self,
        db: impl AsRef<str>,
        command: Document,
        options: impl Into<Option<ExecuteOptions<'_>>>,
    ) -> Result<Document> {
        self.run_command(CommandShape::Read, db.as_ref(), command, options.into())
            .await
    }

    /// Runs `command` on `db` as a write. Only the write concern from the
    /// resolved options is attached; a read preference is ignored.
    pub async fn execute_write_command(
        &self,
        db: impl AsRef<str>,
        command: Document,
        options: impl Into<Option<ExecuteOptions<'_>>>,
    ) -> Result<Document> {
        self.run_command(CommandShape::Write, db.as_ref(), command, options.into())
            .await
    }

    /// Runs `command` on `db` as a command that both reads and writes. Read
    /// and write concerns are attached, and the command is routed to a
    /// primary.
    pub async fn execute_read_write_command(
        &self,
        db: impl AsRef<str>,
        command: Document,
        options: impl Into<Option<ExecuteOptions<'_>>>,
    ) -> Result<Document> {
        self.run_command(CommandShape::ReadWrite, db.as_ref(), command, options.into())
            .await
    }

    /// Runs a find against `namespace` and returns the first reply batch.
    /// Read concern and read preference are attached.
    pub async fn execute_query(
        &self,
        namespace: &Namespace,
        query: impl Into<Query>,
        options: impl Into<Option<ExecuteOptions<'_>>>,
    ) -> Result<Document> {
        let query = query.into();
        let prepared = self.prepare(CommandShape::Read, options.into())?;
        let entry = self.checked_wire()?;
        let context = prepared.context()?;
        entry
            .wire()
            .execute_query(namespace, &query, context)
            .await
            .map_err(Error::from)
    }

    /// Applies `bulk` to `namespace`. Only the write concern is attached. An
    /// empty batch is rejected with
    /// [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument).
    pub async fn execute_bulk_write(
        &self,
        namespace: &Namespace,
        bulk: &BulkWrite,
        options: impl Into<Option<ExecuteOptions<'_>>>,
    ) -> Result<WriteResult> {
        if bulk.is_empty() {
            return Err(Error::invalid_argument("cannot execute an empty bulk write"));
        }

        let prepared = self.prepare(CommandShape::Write, options.into())?;
        let entry = self.checked_wire()?;
        let context = prepared.context()?;
        entry
            .wire()
            .execute_bulk_write(namespace, bulk, context)
            .await
            .map_err(Error::from)
    }

    /// A point-in-time snapshot of every server the wire client's topology
    /// currently tracks. This reads local monitoring state and never blocks
    /// on the network.
    pub fn servers(&self) -> Result<Vec<ServerDescription>> {
        let entry = self.checked_wire()?;
        let statuses = entry.wire().servers().map_err(Error::from)?;
        Ok(statuses.into_iter().map(ServerDescription::from).collect())
    }

    /// Selects a server matching `read_preference`, waiting for topology
    /// discovery when necessary. `None` selects under the primary read
    /// preference.
    pub async fn select_server(
        &self,
        read_preference: Option<&ReadPreference>,
    ) -> Result<ServerDescription> {
        let entry = self.checked_wire()?;
        let status = entry
            .wire()
            .select_server(read_preference)
            .await
            .map_err(Error::from)?;
        let description = ServerDescription::from(status);

        tracing::debug!(
            target: SERVER_SELECTION_TRACING_EVENT_TARGET,
            address = %description.address,
            server_type = ?description.server_type,
            "selected a server"
        );

        Ok(description)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Client")
            .field("key", &self.inner.key)
            .field("options", &self.inner.options)
            .finish()
    }
}

/// A caller's options resolved against the client defaults and masked by a
/// command shape, ready to be turned into a wire operation context.
struct PreparedOperation<'a> {
    concerns: ResolvedConcerns,
    session: Option<&'a ClientSession>,
    server_id: Option<ServerId>,
}

impl PreparedOperation<'_> {
    fn context(&self) -> Result<OperationContext<'_>> {
        let session = match self.session {
            Some(session) => Some(session.wire()?),
            None => None,
        };

        Ok(OperationContext {
            read_concern: self.concerns.read_concern.as_ref(),
            read_preference: self.concerns.read_preference.as_ref(),
            write_concern: self.concerns.write_concern.as_ref(),
            session,
            server_id: self.server_id,
        })
    }
}
