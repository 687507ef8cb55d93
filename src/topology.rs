//! Contains the types describing the servers of a deployment.

#[cfg(test)]
mod test;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{client::options::ServerAddress, selection_criteria::TagSet, wire::ServerStatus};

/// An opaque identifier for a server within a topology, assigned by the wire
/// library. Ids are only meaningful to the client that produced them and may
/// be used to pin operations to a specific server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServerId(u32);

impl ServerId {
    /// Creates a server id from the wire library's raw value.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw value of this id.
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// The possible roles a server can have in a topology.
///
/// Each role has a stable integer representation returned by
/// [`ServerType::to_i32`]; existing values are never reassigned.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[non_exhaustive]
pub enum ServerType {
    /// A server whose role is not yet known.
    Unknown = 0,

    /// A single, standalone server.
    Standalone = 1,

    /// A router to a sharded cluster, i.e. `mongos`.
    Mongos = 2,

    /// A server that monitoring believes to be the primary but that has not
    /// yet been confirmed by a handshake.
    PossiblePrimary = 3,

    /// The primary of a replica set.
    #[serde(rename = "RSPrimary")]
    RsPrimary = 4,

    /// A secondary of a replica set.
    #[serde(rename = "RSSecondary")]
    RsSecondary = 5,

    /// A replica set arbiter.
    #[serde(rename = "RSArbiter")]
    RsArbiter = 6,

    /// A replica set member that is not primary, secondary, or arbiter, such
    /// as a hidden member.
    #[serde(rename = "RSOther")]
    RsOther = 7,

    /// A replica set member that does not report a set name, such as a member
    /// that is still starting up.
    #[serde(rename = "RSGhost")]
    RsGhost = 8,
}

impl Default for ServerType {
    fn default() -> Self {
        ServerType::Unknown
    }
}

impl ServerType {
    /// Maps a wire library's native server type string onto the role
    /// enumeration. Unrecognized strings, including any types introduced by
    /// future wire libraries, classify as [`ServerType::Unknown`].
    pub fn classify(native: &str) -> Self {
        match native {
            "Standalone" => ServerType::Standalone,
            "Mongos" => ServerType::Mongos,
            "PossiblePrimary" => ServerType::PossiblePrimary,
            "RSPrimary" => ServerType::RsPrimary,
            "RSSecondary" => ServerType::RsSecondary,
            "RSArbiter" => ServerType::RsArbiter,
            "RSOther" => ServerType::RsOther,
            "RSGhost" => ServerType::RsGhost,
            _ => ServerType::Unknown,
        }
    }

    /// The native string representation of this role, i.e. the inverse of
    /// [`ServerType::classify`].
    pub fn as_str(self) -> &'static str {
        match self {
            ServerType::Unknown => "Unknown",
            ServerType::Standalone => "Standalone",
            ServerType::Mongos => "Mongos",
            ServerType::PossiblePrimary => "PossiblePrimary",
            ServerType::RsPrimary => "RSPrimary",
            ServerType::RsSecondary => "RSSecondary",
            ServerType::RsArbiter => "RSArbiter",
            ServerType::RsOther => "RSOther",
            ServerType::RsGhost => "RSGhost",
        }
    }

    /// The stable integer representation of this role.
    pub const fn to_i32(self) -> i32 {
        self as i32
    }

    /// Whether a server of this role can be selected for operations.
    pub fn is_data_bearing(self) -> bool {
        matches!(
            self,
            ServerType::Standalone
                | ServerType::Mongos
                | ServerType::RsPrimary
                | ServerType::RsSecondary
        )
    }
}

/// A description of the state of one server, taken at a single point in time.
///
/// Descriptions are snapshots: once handed out they are never updated, even
/// if the topology changes afterwards.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ServerDescription {
    /// The identifier the wire library assigned to this server.
    pub id: ServerId,

    /// The address of this server.
    pub address: ServerAddress,

    /// The role of this server in the topology.
    pub server_type: ServerType,

    /// The latest round trip time measured against this server, if any
    /// measurement has completed.
    pub round_trip_time: Option<Duration>,

    /// The replica set tags of this server.
    pub tags: TagSet,
}

impl From<ServerStatus> for ServerDescription {
    fn from(status: ServerStatus) -> Self {
        Self {
            id: status.id,
            address: status.address,
            server_type: ServerType::classify(&status.server_type),
            round_trip_time: status.round_trip_time,
            tags: status.tags,
        }
    }
}

impl ServerDescription {
    /// Whether this server was in a selectable state when the description was
    /// taken.
    pub fn is_data_bearing(&self) -> bool {
        self.server_type.is_data_bearing()
    }
}
