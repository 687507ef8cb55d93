//! This crate contains the client management core shared by MongoDB driver
//! integrations: client construction and deduplication, logical sessions,
//! and the option handling for executing commands, queries, and bulk writes
//! against a deployment. It uses the [`bson`] crate for BSON support.
//!
//! The crate performs no I/O of its own. Sockets, topology monitoring, and
//! wire protocol encoding belong to a wire library that the embedding
//! integration supplies through the traits in the [`wire`] module. What this
//! crate owns is everything between the integration's API surface and that
//! boundary: which wire client a handle maps to, when that wire client is
//! created, reset, and destroyed, and what option state accompanies each
//! dispatched operation.
//!
//! # The registry
//!
//! Every [`Client`] handle is registered in a [`ClientRegistry`]. The
//! registry digests each handle's options into a [`ClientKey`] and hands
//! handles with equal keys the same underlying wire client, so repeated
//! construction against the same deployment reuses connection pools instead
//! of growing them. Persistent wire clients outlive the handles built on
//! them and are only torn down by [`ClientRegistry::shutdown`]; clients that
//! opt out of persistence via
//! [`DriverOptions::disable_client_persistence`](options::DriverOptions::disable_client_persistence)
//! are torn down when the current request ends.
//!
//! The registry also tracks process ids: a wire client inherited across a
//! fork is reset before its first use in the child and is never destroyed by
//! a process other than the one that created it.
//!
//! # Connecting
//!
//! Parsing a connection string produces a
//! [`ClientOptions`](options::ClientOptions) struct, which can also be
//! assembled or adjusted by hand:
//!
//! ```
//! # fn main() -> mongodb_driver_core::error::Result<()> {
//! use mongodb_driver_core::options::ClientOptions;
//!
//! let mut options = ClientOptions::parse("mongodb://localhost:27017")?;
//! options.app_name = Some("My App".to_string());
//! # Ok(()) }
//! ```
//!
//! A [`Client`] is built from options and a registry:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mongodb_driver_core::{bson::doc, Client, ClientRegistry};
//!
//! async fn ping(registry: &Arc<ClientRegistry>) -> mongodb_driver_core::error::Result<()> {
//!     let client = Client::with_uri_str(registry, "mongodb://localhost:27017").await?;
//!     let reply = client.execute_command("admin", doc! { "ping": 1 }, None).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```
//!
//! # Executing operations
//!
//! The execution methods differ only in the shape of the dispatched command,
//! which controls the concerns attached to it; see
//! [`CommandShape`](options::CommandShape). Unset execution options inherit
//! the client's defaults.
//!
//! ```no_run
//! use mongodb_driver_core::{bson::doc, BulkWrite, Client, Namespace};
//!
//! async fn seed(client: &Client) -> mongodb_driver_core::error::Result<()> {
//!     let mut batch = BulkWrite::new(true);
//!     batch
//!         .insert(doc! { "title": "1984", "author": "George Orwell" })
//!         .insert(doc! { "title": "Animal Farm", "author": "George Orwell" });
//!
//!     let result = client
//!         .execute_bulk_write(&Namespace::new("mydb", "books"), &batch, None)
//!         .await?;
//!     println!("inserted {} documents", result.inserted_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Minimum supported Rust version (MSRV)
//!
//! The MSRV for this crate is currently 1.83.0. This will rarely be
//! increased, and if it ever is, it will only happen in a minor or major
//! version release.

#![warn(missing_docs)]
#![cfg_attr(docsrs, warn(rustdoc::missing_crate_level_docs))]

#[macro_use]
pub mod options;

pub use ::bson;

mod client;
mod concern;
pub mod error;
mod operation;
mod registry;
pub mod results;
mod selection_criteria;
mod serde_util;
#[cfg(test)]
mod test_util;
mod topology;
mod trace;
pub mod wire;

pub use crate::{
    client::{session::ClientSession, Client},
    error::{Error, ErrorDomain, ErrorKind, Result},
    operation::{BulkWrite, Namespace, Query, WriteModel},
    registry::{ClientKey, ClientRegistry, ProcessId},
    results::WriteResult,
    topology::{ServerDescription, ServerId, ServerType},
};
