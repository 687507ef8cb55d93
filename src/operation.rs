//! Contains the types used to describe and execute operations against a
//! deployment.


use std::str::FromStr;

use serde::Serialize;
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::Document,
    client::session::ClientSession,
    concern::{ReadConcern, WriteConcern},
    error::{Error, Result},
    selection_criteria::ReadPreference,
    topology::ServerId,
};

bitflags::bitflags! {
    /// The concern types that can be attached to an outgoing command.
    ///
    /// The bit values are stable: read concern is `0x01`, read preference is
    /// `0x02`, and write concern is `0x04`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ConcernFlags: u8 {
        /// The command accepts a read concern.
        const READ_CONCERN = 0x01;
        /// The command is routed under a read preference.
        const READ_PREFERENCE = 0x02;
        /// The command accepts a write concern.
        const WRITE_CONCERN = 0x04;
    }
}

/// The shape of a command, which determines the concern types taken from the
/// caller's options and attached to the dispatched operation. Options outside
/// the shape's concern set are ignored without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandShape {
    /// A generic command; all three concern types apply.
    Raw,

    /// A command that only reads; read concern and read preference apply.
    Read,

    /// A command that only writes; only write concern applies.
    Write,

    /// A command that reads and writes; read concern and write concern apply,
    /// and the command is always routed to a primary.
    ReadWrite,
}

impl CommandShape {
    /// The concern types attached to commands of this shape.
    pub const fn concerns(self) -> ConcernFlags {
        match self {
            CommandShape::Raw => ConcernFlags::all(),
            CommandShape::Read => {
                ConcernFlags::READ_CONCERN.union(ConcernFlags::READ_PREFERENCE)
            }
            CommandShape::Write => ConcernFlags::WRITE_CONCERN,
            CommandShape::ReadWrite => {
                ConcernFlags::READ_CONCERN.union(ConcernFlags::WRITE_CONCERN)
            }
        }
    }
}

/// The options accepted by every execution method on
/// [`Client`](crate::Client).
///
/// Which of the concern fields take effect depends on the shape of the
/// executed command; see [`CommandShape`].
#[derive(Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ExecuteOptions<'a> {
    /// The read concern to attach, for shapes that read.
    pub read_concern: Option<ReadConcern>,

    /// The read preference to route under, for shapes that are read-only.
    pub read_preference: Option<ReadPreference>,

    /// The write concern to attach, for shapes that write.
    pub write_concern: Option<WriteConcern>,

    /// The session to execute under. The session must have been started by
    /// the client executing the operation.
    pub session: Option<&'a ClientSession>,

    /// Pins execution to the server with the given id rather than running
    /// server selection.
    pub server_id: Option<ServerId>,
}

/// The concerns remaining after masking a caller's options through a command
/// shape.
#[derive(Clone, Debug, Default)]
pub(crate) struct ResolvedConcerns {
    pub(crate) read_concern: Option<ReadConcern>,
    pub(crate) read_preference: Option<ReadPreference>,
    pub(crate) write_concern: Option<WriteConcern>,
}

impl ResolvedConcerns {
    /// Keeps the concerns selected by `shape` and silently discards the rest.
    pub(crate) fn select(shape: CommandShape, options: ExecuteOptions<'_>) -> Self {
        let flags = shape.concerns();
        Self {
            read_concern: if flags.contains(ConcernFlags::READ_CONCERN) {
                options.read_concern
            } else {
                None
            },
            read_preference: if flags.contains(ConcernFlags::READ_PREFERENCE) {
                options.read_preference
            } else {
                None
            },
            write_concern: if flags.contains(ConcernFlags::WRITE_CONCERN) {
                options.write_concern
            } else {
                None
            },
        }
    }
}

/// A database and collection pair that identifies where an operation runs.
#[derive(Clone, Debug, Eq, Hash, PartialEq, derive_more::Display)]
#[display("{db}.{coll}")]
pub struct Namespace {
    /// The database name.
    pub db: String,

    /// The collection name.
    pub coll: String,
}

impl Namespace {
    /// Creates a namespace from a database and collection name.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self {
                db: db.to_string(),
                coll: coll.to_string(),
            }),
            _ => Err(Error::invalid_argument(format!(
                "invalid namespace specified: {}",
                s
            ))),
        }
    }
}

/// A query payload: a filter plus the standard result modifiers.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct Query {
    /// The filter that returned documents must match.
    #[builder(!default)]
    pub filter: Document,

    /// The maximum number of documents to return.
    pub limit: Option<i64>,

    /// The number of matching documents to skip before returning results.
    pub skip: Option<u64>,

    /// The order in which to return documents.
    pub sort: Option<Document>,

    /// Limits the fields of the returned documents.
    pub projection: Option<Document>,
}

impl From<Document> for Query {
    fn from(filter: Document) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }
}

/// An ordered list of write models executed as a single batch against one
/// namespace.
#[derive(Clone, Debug, Default)]
pub struct BulkWrite {
    ordered: bool,
    models: Vec<WriteModel>,
}

impl BulkWrite {
    /// Creates an empty batch. When `ordered` is true the server stops
    /// applying models at the first error; otherwise it attempts every model.
    pub fn new(ordered: bool) -> Self {
        Self {
            ordered,
            models: Vec::new(),
        }
    }

    /// Appends an insert of `document` to the batch.
    pub fn insert(&mut self, document: Document) -> &mut Self {
        self.models.push(WriteModel::Insert { document });
        self
    }

    /// Appends an update of the documents matching `filter` to the batch.
    pub fn update(
        &mut self,
        filter: Document,
        update: Document,
        multi: bool,
        upsert: bool,
    ) -> &mut Self {
        self.models.push(WriteModel::Update {
            filter,
            update,
            multi,
            upsert,
        });
        self
    }

    /// Appends a delete of the documents matching `filter` to the batch. A
    /// `limit` of 1 deletes at most one matching document; 0 deletes all of
    /// them.
    pub fn delete(&mut self, filter: Document, limit: u32) -> &mut Self {
        self.models.push(WriteModel::Delete { filter, limit });
        self
    }

    /// Whether the server stops applying models at the first error.
    pub fn ordered(&self) -> bool {
        self.ordered
    }

    /// The models appended so far, in execution order.
    pub fn models(&self) -> &[WriteModel] {
        &self.models
    }

    /// The number of models appended so far.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no models have been appended.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// A single write within a [`BulkWrite`] batch.
#[derive(Clone, Debug)]
pub enum WriteModel {
    /// Inserts a document.
    Insert {
        /// The document to insert.
        document: Document,
    },

    /// Updates documents matching a filter.
    Update {
        /// The filter that documents to update must match.
        filter: Document,
        /// The modifications to apply.
        update: Document,
        /// Whether to update every matching document rather than the first.
        multi: bool,
        /// Whether to insert the document if no document matches the filter.
        upsert: bool,
    },

    /// Deletes documents matching a filter.
    Delete {
        /// The filter that documents to delete must match.
        filter: Document,
        /// 1 to delete at most one matching document, 0 to delete all.
        limit: u32,
    },
}
