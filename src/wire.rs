//! The interface between this crate and the wire library that owns sockets,
//! topology monitoring, and message encoding.
//!
//! This crate never performs I/O itself. A host integration supplies one
//! [`WireDriver`] when constructing the [`ClientRegistry`](crate::ClientRegistry),
//! and everything the registry hands out is backed by the [`WireClient`] and
//! [`WireSession`] handles that driver mints. Failures cross the boundary as
//! [`WireFailure`] values and are translated into crate
//! [`Error`](crate::error::Error)s at the call sites that receive them.

use std::{fmt, time::Duration};

use futures_core::future::BoxFuture;
use typed_builder::TypedBuilder;

use crate::{
    bson::Document,
    client::{
        options::{ClientOptions, ServerAddress},
        session::SessionOptions,
    },
    concern::{ReadConcern, WriteConcern},
    operation::{BulkWrite, Namespace, Query},
    results::WriteResult,
    selection_criteria::{ReadPreference, TagSet},
    topology::ServerId,
};

/// The result type for all wire library methods.
pub type WireResult<T> = std::result::Result<T, WireFailure>;

/// Mints [`WireClient`] handles for deployments. One driver serves the whole
/// process; the registry owns it for its lifetime.
pub trait WireDriver: Send + Sync + 'static {
    /// Establishes a new client handle for the deployment described by
    /// `options`.
    fn create_client<'a>(
        &'a self,
        options: &'a ClientOptions,
    ) -> BoxFuture<'a, WireResult<Box<dyn WireClient>>>;
}

/// A live handle to one deployment inside the wire library, owning its
/// connection pools and topology state.
pub trait WireClient: Send + Sync + 'static {
    /// Discards pooled connections and invalidates outstanding sessions
    /// without tearing the handle down. Called when the handle is first used
    /// by a process that did not create it.
    fn reset(&self);

    /// Runs `command` against `db` and returns the server's reply.
    fn execute_command<'a>(
        &'a self,
        db: &'a str,
        command: &'a Document,
        context: OperationContext<'a>,
    ) -> BoxFuture<'a, WireResult<Document>>;

    /// Runs a find against `namespace` and returns the first reply batch.
    fn execute_query<'a>(
        &'a self,
        namespace: &'a Namespace,
        query: &'a Query,
        context: OperationContext<'a>,
    ) -> BoxFuture<'a, WireResult<Document>>;

    /// Applies a batch of writes to `namespace`.
    fn execute_bulk_write<'a>(
        &'a self,
        namespace: &'a Namespace,
        bulk: &'a BulkWrite,
        context: OperationContext<'a>,
    ) -> BoxFuture<'a, WireResult<WriteResult>>;

    /// Starts a logical session on the deployment.
    fn start_session<'a>(
        &'a self,
        options: Option<&'a SessionOptions>,
    ) -> BoxFuture<'a, WireResult<Box<dyn WireSession>>>;

    /// The servers currently tracked by this handle's topology. This reads
    /// local monitoring state and never blocks on the network.
    fn servers(&self) -> WireResult<Vec<ServerStatus>>;

    /// Selects a server matching `read_preference`, waiting for topology
    /// discovery if necessary. `None` selects under primary read preference.
    fn select_server<'a>(
        &'a self,
        read_preference: Option<&'a ReadPreference>,
    ) -> BoxFuture<'a, WireResult<ServerStatus>>;
}

/// A logical session minted by a [`WireClient`].
pub trait WireSession: Send + Sync + 'static {
    /// The logical session id document, e.g. `{ "id": <uuid> }`.
    fn id(&self) -> &Document;

    /// Ends the session on the server side. Called at most once per session.
    fn end(&mut self) -> BoxFuture<'_, WireResult<()>>;
}

/// The per-operation state resolved by this crate and handed to the wire
/// library alongside an operation's payload.
///
/// Concern fields already reflect the executed command's shape: a field the
/// shape does not select is always `None` here, regardless of what the caller
/// passed.
#[derive(Clone, Copy, Default)]
pub struct OperationContext<'a> {
    /// The read concern to attach to the command.
    pub read_concern: Option<&'a ReadConcern>,
    /// The read preference to route the command under.
    pub read_preference: Option<&'a ReadPreference>,
    /// The write concern to attach to the command.
    pub write_concern: Option<&'a WriteConcern>,
    /// The session to run the command under.
    pub session: Option<&'a dyn WireSession>,
    /// Pins the command to the server with this id instead of selecting one.
    pub server_id: Option<ServerId>,
}

/// A failure reported by the wire library: a domain and code pair, a
/// human-readable message, and any error labels attached by the server.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct WireFailure {
    /// The subsystem that reported the failure.
    pub domain: WireDomain,
    /// The error code, in the domain's numbering.
    pub code: i32,
    /// A human-readable description of the failure.
    pub message: String,
    /// Error labels attached by the server.
    pub labels: Vec<String>,
}

impl WireFailure {
    /// Creates a failure with no labels attached.
    pub fn new(domain: WireDomain, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
            labels: Vec::new(),
        }
    }

    /// Attaches error labels to the failure.
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }
}

impl fmt::Display for WireFailure {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{} error (code {}): {}",
            self.domain, self.code, self.message
        )
    }
}

/// The subsystems of the wire library that report failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum WireDomain {
    /// Client handle management.
    Client,
    /// Socket and TLS streams.
    Stream,
    /// Wire protocol framing and message parsing.
    Protocol,
    /// Cursor iteration.
    Cursor,
    /// Query construction and execution.
    Query,
    /// Command dispatch, including server-reported command errors.
    Command,
    /// Write concern enforcement.
    WriteConcern,
    /// Server selection.
    ServerSelection,
    /// Server-side execution.
    Server,
    /// Logical session management.
    Session,
}

impl fmt::Display for WireDomain {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            WireDomain::Client => "client",
            WireDomain::Stream => "stream",
            WireDomain::Protocol => "protocol",
            WireDomain::Cursor => "cursor",
            WireDomain::Query => "query",
            WireDomain::Command => "command",
            WireDomain::WriteConcern => "write concern",
            WireDomain::ServerSelection => "server selection",
            WireDomain::Server => "server",
            WireDomain::Session => "session",
        };
        fmt.write_str(name)
    }
}

/// Well-known wire library error codes that receive dedicated translation.
pub mod codes {
    /// Authentication failed while establishing a connection. Reported under
    /// [`WireDomain::Client`](super::WireDomain::Client).
    pub const CLIENT_AUTHENTICATE: i32 = 11;

    /// A command argument was rejected before dispatch. Reported under
    /// [`WireDomain::Command`](super::WireDomain::Command).
    pub const COMMAND_INVALID_ARG: i32 = 22;
}

/// A point-in-time report on one server, produced by the wire library's
/// topology monitoring.
///
/// The `server_type` field carries the wire library's native type string;
/// [`ServerType::classify`](crate::topology::ServerType::classify) maps it
/// onto the closed role enumeration.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ServerStatus {
    /// The identifier the wire library assigned to this server.
    #[builder(!default)]
    pub id: ServerId,

    /// The address the server was discovered at.
    #[builder(!default)]
    pub address: ServerAddress,

    /// The wire library's native server type string.
    pub server_type: String,

    /// The latest round trip time measured against this server, if any
    /// measurement has completed.
    pub round_trip_time: Option<Duration>,

    /// The server's replica set tags.
    pub tags: TagSet,
}
