//! Contains the functionality for client sessions.


use std::{fmt, sync::Arc};

use typed_builder::TypedBuilder;

use crate::{
    bson::Document,
    client::Client,
    error::{Error, Result},
    wire::WireSession,
};

/// A MongoDB client session. This struct represents a logical session used
/// for ordering sequential operations.
///
/// Sessions are started with [`Client::start_session`](crate::Client) and can
/// only be used with the client that started them; passing a session to a
/// different client's execution methods fails with
/// [`ErrorKind::Logic`](crate::error::ErrorKind::Logic).
///
/// `ClientSession` instances are not thread safe or fork safe. They can only
/// be used by one thread or process at a time.
pub struct ClientSession {
    wire: Option<Box<dyn WireSession>>,
    client: Client,
    options: Option<SessionOptions>,
}

impl ClientSession {
    pub(crate) fn new(
        wire: Box<dyn WireSession>,
        client: Client,
        options: Option<SessionOptions>,
    ) -> Self {
        Self {
            wire: Some(wire),
            client,
            options,
        }
    }

    /// The client used to create this session.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// The id of this session, or `None` once the session has been ended.
    pub fn id(&self) -> Option<&Document> {
        self.wire.as_ref().map(|wire| wire.id())
    }

    /// The options used to create this session.
    pub fn options(&self) -> Option<&SessionOptions> {
        self.options.as_ref()
    }

    /// Whether operations executed in this session are causally consistent.
    /// Defaults to true when the option was not set.
    pub fn causal_consistency(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|options| options.causal_consistency)
            .unwrap_or(true)
    }

    /// Whether this session was started by `client`. A session started by one
    /// handle cannot be used through another, even one connected to the same
    /// deployment.
    pub(crate) fn owned_by(&self, client: &Client) -> bool {
        Arc::ptr_eq(&self.client.inner, &client.inner)
    }

    pub(crate) fn wire(&self) -> Result<&dyn WireSession> {
        self.wire
            .as_deref()
            .ok_or_else(|| Error::logic("the session has been ended and cannot be used"))
    }

    /// Ends the session on the server. Further calls are no-ops, and any
    /// later use of the session in an operation fails with
    /// [`ErrorKind::Logic`](crate::error::ErrorKind::Logic).
    pub async fn end(&mut self) -> Result<()> {
        let result = match self.wire.as_mut() {
            Some(wire) => wire.end().await,
            None => return Ok(()),
        };

        // Local session state is released even when the server-side end
        // fails.
        self.wire = None;
        result.map_err(Error::from)
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ClientSession")
            .field("id", &self.id())
            .field("options", &self.options)
            .finish()
    }
}

/// Contains the options that can be used to create a new
/// [`ClientSession`].
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct SessionOptions {
    /// Whether operations executed in the session are causally consistent.
    /// Defaults to true when unset.
    pub causal_consistency: Option<bool>,
}
