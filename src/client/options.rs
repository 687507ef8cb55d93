//! Contains the types for the options used to configure clients.

#[cfg(test)]
mod test;

use std::{
    fmt,
    hash::{Hash, Hasher},
    time::Duration,
};

use serde::Serialize;
use serde_with::skip_serializing_none;
use strsim::jaro_winkler;
use typed_builder::TypedBuilder;

use crate::{
    concern::{Acknowledgment, ReadConcern, ReadConcernLevel, WriteConcern},
    error::{Error, Result},
    selection_criteria::{verify_max_staleness, ReadPreference, TagSet},
    serde_util,
};

const DEFAULT_PORT: u16 = 27017;

const URI_OPTIONS: &[&str] = &[
    "appname",
    "connecttimeoutms",
    "directconnection",
    "journal",
    "maxstalenessseconds",
    "readconcernlevel",
    "readpreference",
    "readpreferencetags",
    "replicaset",
    "serverselectiontimeoutms",
    "sockettimeoutms",
    "ssl",
    "tls",
    "w",
    "wtimeoutms",
];

/// Reserved characters as defined by [Section 2.2 of RFC-3986](https://tools.ietf.org/html/rfc3986#section-2.2).
/// Usernames and passwords that contain these characters must instead include
/// the URL encoded version of them in the connection string.
const USERINFO_RESERVED_CHARACTERS: &[char] = &[':', '/', '?', '#', '[', ']', '@'];

const ILLEGAL_DATABASE_CHARACTERS: &[char] = &['/', '\\', ' ', '"', '$', '.'];

/// An enum representing the address of a MongoDB server.
#[derive(Clone, Debug, Eq, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum ServerAddress {
    /// A TCP/IP host and port combination.
    Tcp {
        /// The hostname of the address.
        host: String,

        /// The port of the address.
        ///
        /// The default is 27017.
        port: Option<u16>,
    },
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::Tcp {
            host: "localhost".into(),
            port: None,
        }
    }
}

impl PartialEq for ServerAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Tcp { host, port },
                Self::Tcp {
                    host: other_host,
                    port: other_port,
                },
            ) => {
                host == other_host
                    && port.unwrap_or(DEFAULT_PORT) == other_port.unwrap_or(DEFAULT_PORT)
            }
        }
    }
}

impl Hash for ServerAddress {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        match self {
            Self::Tcp { host, port } => {
                host.hash(state);
                port.unwrap_or(DEFAULT_PORT).hash(state);
            }
        }
    }
}

impl ServerAddress {
    /// Parses an address string into a `ServerAddress`.
    pub fn parse(address: impl AsRef<str>) -> Result<Self> {
        let address = address.as_ref();
        let mut parts = address.split(':');

        let host = match parts.next() {
            Some(part) if !part.is_empty() => part,
            _ => {
                return Err(Error::invalid_argument(format!(
                    "invalid server address: {}",
                    address
                )))
            }
        };

        let port = match parts.next() {
            Some(part) => {
                let port = match part.parse::<u16>() {
                    Ok(port) if port != 0 => port,
                    _ => {
                        return Err(Error::invalid_argument(format!(
                            "port must be an integer between 1 and 65535: {}",
                            part
                        )))
                    }
                };

                if parts.next().is_some() {
                    return Err(Error::invalid_argument(format!(
                        "invalid server address: {}",
                        address
                    )));
                }

                Some(port)
            }
            None => None,
        };

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }

    /// The hostname of this address.
    pub fn host(&self) -> &str {
        match self {
            Self::Tcp { host, .. } => host.as_str(),
        }
    }

    /// The port of this address, if one was specified.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => *port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => {
                write!(fmt, "{}:{}", host, port.unwrap_or(DEFAULT_PORT))
            }
        }
    }
}

/// An authentication credential. This crate carries the credential to the
/// wire library opaquely; it only participates in the client digest.
#[skip_serializing_none]
#[derive(Clone, Default, PartialEq, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct Credential {
    /// The username to authenticate with.
    pub username: Option<String>,

    /// The password to authenticate with.
    pub password: Option<String>,

    /// The database to authenticate against.
    pub source: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "REDACTED"))
            .field("source", &self.source)
            .finish()
    }
}

/// Contains the options that can be used to create a new
/// [`Client`](crate::Client).
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ClientOptions {
    /// The initial list of seeds that the client should connect to.
    ///
    /// Note that the wire library will autodiscover other nodes in the
    /// cluster. To connect directly to a single server (rather than
    /// autodiscovering the rest of the cluster), set the `direct_connection`
    /// field to `true`.
    #[builder(default = vec![ServerAddress::default()])]
    pub hosts: Vec<ServerAddress>,

    /// The application name that the client will send to the server as part
    /// of the handshake.
    pub app_name: Option<String>,

    /// The connect timeout passed to the wire library for new connections.
    #[serde(
        rename = "connectTimeoutMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub connect_timeout: Option<Duration>,

    /// The credential to authenticate with.
    pub credential: Option<Credential>,

    /// The default database for this client.
    pub default_database: Option<String>,

    /// Whether to connect directly to the first host in `hosts` rather than
    /// discovering the deployment's topology.
    pub direct_connection: Option<bool>,

    /// The default read concern for operations executed on the client.
    pub read_concern: Option<ReadConcern>,

    /// The default read preference for operations executed on the client.
    pub read_preference: Option<ReadPreference>,

    /// The name of the replica set that the client should connect to.
    #[serde(rename = "replicaSet")]
    pub repl_set_name: Option<String>,

    /// The amount of time the wire library should attempt to select a server
    /// for an operation before timing out.
    #[serde(
        rename = "serverSelectionTimeoutMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub server_selection_timeout: Option<Duration>,

    /// The socket timeout passed to the wire library for established
    /// connections.
    #[serde(
        rename = "socketTimeoutMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub socket_timeout: Option<Duration>,

    /// Whether to connect over TLS.
    pub tls: Option<bool>,

    /// The default write concern for operations executed on the client.
    pub write_concern: Option<WriteConcern>,

    /// The connection string these options were parsed from, if any. Options
    /// parsed from a string and equivalent options assembled by hand produce
    /// distinct digests.
    #[builder(setter(skip))]
    pub(crate) original_uri: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientOptions {
    /// Parses a MongoDB connection string into a `ClientOptions` struct.
    ///
    /// The format of a MongoDB connection string is:
    ///
    /// ```text
    /// mongodb://[username:password@]host1[:port1][,...hostN[:portN]][/[defaultauthdb][?options]]
    /// ```
    ///
    /// See the documentation [here](https://www.mongodb.com/docs/manual/reference/connection-string/)
    /// for more details. The recognized query options are `appName`,
    /// `connectTimeoutMS`, `directConnection`, `journal`,
    /// `maxStalenessSeconds`, `readConcernLevel`, `readPreference`,
    /// `readPreferenceTags`, `replicaSet`, `serverSelectionTimeoutMS`,
    /// `socketTimeoutMS`, `ssl`, `tls`, `w`, and `wTimeoutMS`; any other
    /// option fails with
    /// [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument).
    pub fn parse(uri: impl AsRef<str>) -> Result<Self> {
        let uri = uri.as_ref();
        let mut options: Self = ConnectionStringParser::parse(uri)?.into();
        options.original_uri = Some(uri.to_string());
        Ok(options)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::invalid_argument(
                "connection options must contain at least one host",
            ));
        }

        if self.direct_connection == Some(true) && self.hosts.len() > 1 {
            return Err(Error::invalid_argument(
                "cannot specify multiple seeds with directConnection=true",
            ));
        }

        if let Some(ref write_concern) = self.write_concern {
            write_concern.validate()?;
        }

        if let Some(max_staleness) = self
            .read_preference
            .as_ref()
            .and_then(ReadPreference::max_staleness)
        {
            verify_max_staleness(max_staleness)?;
        }

        Ok(())
    }
}

/// Driver-level options. These shape handle lifetime and handshake metadata
/// rather than the connection itself, and are digested separately from
/// [`ClientOptions`].
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DriverOptions {
    /// Ties the client to the current request instead of persisting it
    /// across requests. Defaults to false.
    pub disable_client_persistence: bool,

    /// Metadata about the integration wrapping this library, appended to the
    /// handshake by the wire library.
    pub driver_info: Option<DriverInfo>,
}

/// Extra information to append to the driver version in the metadata of the
/// connection handshake.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DriverInfo {
    /// The name of the library wrapping this crate.
    #[builder(setter(into))]
    pub name: String,

    /// The version of the library wrapping this crate.
    #[builder(default, setter(into))]
    pub version: Option<String>,

    /// Optional platform information for the wrapping library.
    #[builder(default, setter(into))]
    pub platform: Option<String>,
}

#[derive(Debug, Default)]
struct ConnectionStringParser {
    hosts: Vec<ServerAddress>,
    app_name: Option<String>,
    connect_timeout: Option<Duration>,
    credential: Option<Credential>,
    default_database: Option<String>,
    direct_connection: Option<bool>,
    read_concern: Option<ReadConcern>,
    read_preference: Option<ReadPreference>,
    read_preference_tags: Option<Vec<TagSet>>,
    max_staleness: Option<Duration>,
    repl_set_name: Option<String>,
    server_selection_timeout: Option<Duration>,
    socket_timeout: Option<Duration>,
    tls: Option<bool>,
    write_concern: Option<WriteConcern>,
}

impl From<ConnectionStringParser> for ClientOptions {
    fn from(parser: ConnectionStringParser) -> Self {
        Self {
            hosts: parser.hosts,
            app_name: parser.app_name,
            connect_timeout: parser.connect_timeout,
            credential: parser.credential,
            default_database: parser.default_database,
            direct_connection: parser.direct_connection,
            read_concern: parser.read_concern,
            read_preference: parser.read_preference,
            repl_set_name: parser.repl_set_name,
            server_selection_timeout: parser.server_selection_timeout,
            socket_timeout: parser.socket_timeout,
            tls: parser.tls,
            write_concern: parser.write_concern,
            original_uri: None,
        }
    }
}

/// Splits `s` around the character at index `i`, mapping empty sides to
/// `None`.
fn exclusive_split_at(s: &str, i: usize) -> (Option<&str>, Option<&str>) {
    let (l, r) = s.split_at(i);

    let lout = if !l.is_empty() { Some(l) } else { None };
    let rout = if r.len() > 1 { Some(&r[1..]) } else { None };

    (lout, rout)
}

fn percent_decode(s: &str, err_message: &str) -> Result<String> {
    match percent_encoding::percent_decode_str(s).decode_utf8() {
        Ok(result) => Ok(result.to_string()),
        Err(_) => Err(Error::invalid_argument(err_message)),
    }
}

fn validate_userinfo(s: &str, userinfo_type: &str) -> Result<()> {
    if s.chars().any(|c| USERINFO_RESERVED_CHARACTERS.contains(&c)) {
        return Err(Error::invalid_argument(format!(
            "{} must be URL encoded",
            userinfo_type
        )));
    }

    // All instances of '%' must be part of a percent-encoded substring, so
    // every '%' must be followed by two hexadecimal digits.
    if s.split('%')
        .skip(1)
        .any(|part| part.len() < 2 || part[0..2].chars().any(|c| !c.is_ascii_hexdigit()))
    {
        return Err(Error::invalid_argument(
            "username/password cannot contain unescaped %",
        ));
    }

    Ok(())
}

impl ConnectionStringParser {
    fn parse(s: &str) -> Result<Self> {
        let end_of_scheme = match s.find("://") {
            Some(index) => index,
            None => {
                return Err(Error::invalid_argument(
                    "connection string contains no scheme",
                ))
            }
        };

        match &s[..end_of_scheme] {
            "mongodb" => {}
            "mongodb+srv" => {
                return Err(Error::invalid_argument(
                    "mongodb+srv connection strings are not supported",
                ))
            }
            other => {
                return Err(Error::invalid_argument(format!(
                    "invalid connection string scheme: {}",
                    other
                )))
            }
        }

        let after_scheme = &s[end_of_scheme + 3..];

        let (pre_slash, post_slash) = match after_scheme.find('/') {
            Some(slash_index) => match exclusive_split_at(after_scheme, slash_index) {
                (Some(section), remainder) => (section, remainder),
                (None, _) => return Err(Error::invalid_argument("missing hosts")),
            },
            None => {
                if after_scheme.find('?').is_some() {
                    return Err(Error::invalid_argument(
                        "missing delimiting slash between hosts and options",
                    ));
                }
                (after_scheme, None)
            }
        };

        let (database, options_section) = match post_slash {
            Some(section) => match section.find('?') {
                Some(index) => exclusive_split_at(section, index),
                None => (post_slash, None),
            },
            None => (None, None),
        };

        let default_database = match database {
            Some(database) => {
                let decoded = percent_decode(database, "database name must be URL encoded")?;
                if decoded
                    .chars()
                    .any(|c| ILLEGAL_DATABASE_CHARACTERS.contains(&c))
                {
                    return Err(Error::invalid_argument(
                        "illegal character in database name",
                    ));
                }
                Some(decoded)
            }
            None => None,
        };

        // If '@' is present in the host section, everything before it must be
        // interpreted as credentials, even when they are empty.
        let (cred_section, hosts_section) = match pre_slash.rfind('@') {
            Some(index) => {
                let (creds, hosts) = exclusive_split_at(pre_slash, index);
                match hosts {
                    Some(hosts) => (creds, hosts),
                    None => return Err(Error::invalid_argument("missing hosts")),
                }
            }
            None => (None, pre_slash),
        };

        let hosts = hosts_section
            .split(',')
            .map(|host| {
                if host.is_empty() {
                    return Err(Error::invalid_argument(
                        "connection string contains no host",
                    ));
                }
                ServerAddress::parse(host)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut parser = Self {
            hosts,
            default_database,
            ..Default::default()
        };

        if let Some(creds) = cred_section {
            // Lack of a ':' means the whole string is the username.
            let (username, password) = match creds.find(':') {
                Some(index) => match exclusive_split_at(creds, index) {
                    (username, None) => (username, Some("")),
                    (username, password) => (username, password),
                },
                None => (Some(creds), None),
            };

            let mut credential = Credential::default();
            if let Some(username) = username {
                validate_userinfo(username, "username")?;
                credential.username =
                    Some(percent_decode(username, "username must be URL encoded")?);
            }
            if let Some(password) = password {
                validate_userinfo(password, "password")?;
                credential.password =
                    Some(percent_decode(password, "password must be URL encoded")?);
            }
            parser.credential = Some(credential);
        }

        if let Some(options_section) = options_section {
            parser.parse_options(options_section)?;
        }

        Ok(parser)
    }

    fn parse_options(&mut self, options: &str) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }

        let mut keys: Vec<String> = Vec::new();

        for option_pair in options.split('&') {
            let (key, value) = match option_pair.find('=') {
                Some(index) => option_pair.split_at(index),
                None => {
                    return Err(Error::invalid_argument(format!(
                        "connection string option is not a `key=value` pair: {}",
                        option_pair
                    )))
                }
            };

            let key = key.to_lowercase();
            if key != "readpreferencetags" && keys.contains(&key) {
                return Err(Error::invalid_argument(
                    "repeated options are not allowed in the connection string",
                ));
            }

            // Skip the '=' leading the value.
            let value = percent_encoding::percent_decode(&value.as_bytes()[1..])
                .decode_utf8_lossy();
            self.parse_option_pair(&key, value.as_ref())?;
            keys.push(key);
        }

        if let Some(tag_sets) = self.read_preference_tags.take() {
            self.read_preference = match self.read_preference.take() {
                Some(read_preference) => Some(read_preference.with_tags(tag_sets)?),
                None => {
                    return Err(Error::invalid_argument(
                        "cannot set read preference tags without also setting read preference \
                         mode",
                    ))
                }
            };
        }

        if let Some(max_staleness) = self.max_staleness.take() {
            self.read_preference = match self.read_preference.take() {
                Some(read_preference) => Some(read_preference.with_max_staleness(max_staleness)?),
                None => {
                    return Err(Error::invalid_argument(
                        "cannot set max staleness without also setting read preference mode",
                    ))
                }
            };
        }

        Ok(())
    }

    fn parse_option_pair(&mut self, key: &str, value: &str) -> Result<()> {
        macro_rules! get_bool {
            ($value:expr, $option:expr) => {
                match $value {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(Error::invalid_argument(format!(
                            "connection string `{}` option must be a boolean",
                            $option
                        )))
                    }
                }
            };
        }

        macro_rules! get_duration {
            ($value:expr, $option:expr) => {
                match $value.parse::<u64>() {
                    Ok(i) => i,
                    Err(_) => {
                        return Err(Error::invalid_argument(format!(
                            "connection string `{}` option must be a non-negative integer",
                            $option
                        )))
                    }
                }
            };
        }

        match key {
            "appname" => {
                self.app_name = Some(value.into());
            }
            k @ "connecttimeoutms" => {
                self.connect_timeout = Some(Duration::from_millis(get_duration!(value, k)));
            }
            k @ "directconnection" => {
                self.direct_connection = Some(get_bool!(value, k));
            }
            k @ "journal" => {
                let write_concern = self.write_concern.get_or_insert_with(Default::default);
                write_concern.journal = Some(get_bool!(value, k));
            }
            k @ "maxstalenessseconds" => {
                let seconds = match value.parse::<i64>() {
                    Ok(seconds) if seconds >= -1 => seconds,
                    _ => {
                        return Err(Error::invalid_argument(format!(
                            "connection string `{}` option must be -1 or a non-negative integer",
                            k
                        )))
                    }
                };

                // -1 explicitly requests no staleness bound.
                if seconds >= 0 {
                    let max_staleness = Duration::from_secs(seconds as u64);
                    verify_max_staleness(max_staleness)?;
                    self.max_staleness = Some(max_staleness);
                }
            }
            "readconcernlevel" => {
                self.read_concern = Some(ReadConcernLevel::from_str(value).into());
            }
            "readpreference" => {
                self.read_preference = Some(match value.to_lowercase().as_str() {
                    "primary" => ReadPreference::Primary,
                    "secondary" => ReadPreference::Secondary { options: None },
                    "primarypreferred" => ReadPreference::PrimaryPreferred { options: None },
                    "secondarypreferred" => ReadPreference::SecondaryPreferred { options: None },
                    "nearest" => ReadPreference::Nearest { options: None },
                    other => {
                        return Err(Error::invalid_argument(format!(
                            "'{}' is not a valid read preference",
                            other
                        )))
                    }
                });
            }
            "readpreferencetags" => {
                let tags: Result<TagSet> = if value.is_empty() {
                    Ok(TagSet::new())
                } else {
                    value
                        .split(',')
                        .map(|tag| match tag.split_once(':') {
                            Some((key, value)) if !key.is_empty() => {
                                Ok((key.to_string(), value.to_string()))
                            }
                            _ => Err(Error::invalid_argument(format!(
                                "'{}' is not a valid read preference tag (which must be of the \
                                 form 'key:value')",
                                tag
                            ))),
                        })
                        .collect()
                };

                self.read_preference_tags
                    .get_or_insert_with(Vec::new)
                    .push(tags?);
            }
            "replicaset" => {
                self.repl_set_name = Some(value.to_string());
            }
            k @ "serverselectiontimeoutms" => {
                self.server_selection_timeout =
                    Some(Duration::from_millis(get_duration!(value, k)));
            }
            k @ "sockettimeoutms" => {
                self.socket_timeout = Some(Duration::from_millis(get_duration!(value, k)));
            }
            k @ "tls" | k @ "ssl" => {
                let tls = get_bool!(value, k);
                match self.tls {
                    Some(existing) if existing != tls => {
                        return Err(Error::invalid_argument(
                            "all instances of `tls` and `ssl` must have the same value",
                        ));
                    }
                    _ => self.tls = Some(tls),
                }
            }
            "w" => {
                let write_concern = self.write_concern.get_or_insert_with(Default::default);

                match value.parse::<i32>() {
                    Ok(w) if w < 0 => {
                        return Err(Error::invalid_argument(
                            "connection string `w` option cannot be a negative integer",
                        ))
                    }
                    Ok(w) => {
                        write_concern.w = Some(Acknowledgment::from(w as u32));
                    }
                    Err(_) => {
                        write_concern.w = Some(Acknowledgment::from(value.to_string()));
                    }
                }
            }
            k @ "wtimeoutms" => {
                let write_concern = self.write_concern.get_or_insert_with(Default::default);
                write_concern.w_timeout = Some(Duration::from_millis(get_duration!(value, k)));
            }
            other => {
                let (closest_score, closest_option) =
                    URI_OPTIONS.iter().fold((0.0, ""), |acc, option| {
                        let score = jaro_winkler(option, other).abs();
                        if score > acc.0 {
                            (score, *option)
                        } else {
                            acc
                        }
                    });

                let mut message = format!("{} is an invalid option", other);
                if closest_score >= 0.84 {
                    message.push_str(&format!(
                        ". An option with a similar name exists: {}",
                        closest_option
                    ));
                }

                return Err(Error::invalid_argument(message));
            }
        }

        Ok(())
    }
}
