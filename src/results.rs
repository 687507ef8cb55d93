//! Contains the types of results returned by write operations.

use serde::{Deserialize, Serialize};

use crate::bson::{Bson, Document};

/// The server's summary of an executed
/// [`BulkWrite`](crate::operation::BulkWrite).
///
/// Counts are only meaningful for acknowledged writes; an unacknowledged
/// write reports zero for every count.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    /// Whether the write was acknowledged by the server.
    #[serde(default)]
    pub acknowledged: bool,

    /// The number of documents inserted by the batch.
    #[serde(default)]
    pub inserted_count: u64,

    /// The number of documents matched by update models in the batch.
    #[serde(default)]
    pub matched_count: u64,

    /// The number of documents modified by update models in the batch.
    #[serde(default)]
    pub modified_count: u64,

    /// The number of documents upserted by update models in the batch.
    #[serde(default)]
    pub upserted_count: u64,

    /// The number of documents deleted by delete models in the batch.
    #[serde(default)]
    pub deleted_count: u64,

    /// The `_id` values of upserted documents, in model order.
    #[serde(default)]
    pub upserted_ids: Vec<Bson>,

    /// The server's raw reply to the final command of the batch.
    #[serde(default)]
    pub reply: Document,
}
