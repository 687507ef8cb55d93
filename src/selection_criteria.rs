//! Contains the types related to read preferences.

#[cfg(test)]
mod test;

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    error::{ErrorKind, Result},
    serde_util,
};

/// Specifies how the driver routes read operations to the members of a
/// deployment.
///
/// See the documentation [here](https://www.mongodb.com/docs/manual/core/read-preference) for more
/// details.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ReadPreference {
    /// Only route this operation to the primary.
    Primary,

    /// Only route this operation to a secondary.
    Secondary {
        /// Options for which secondaries are eligible.
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to the primary if it's available, but fall back
    /// to the secondaries if not.
    PrimaryPreferred {
        /// Options for which secondaries are eligible.
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to a secondary if one is available, but fall back
    /// to the primary if not.
    SecondaryPreferred {
        /// Options for which secondaries are eligible.
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to the node with the least network latency
    /// regardless of whether it's the primary or a secondary.
    Nearest {
        /// Options for which servers are eligible.
        options: Option<ReadPreferenceOptions>,
    },
}

impl<'de> Deserialize<'de> for ReadPreference {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Debug, Deserialize)]
        struct ReadPreferenceHelper {
            mode: String,
            #[serde(flatten)]
            options: Option<ReadPreferenceOptions>,
        }

        let helper = ReadPreferenceHelper::deserialize(deserializer)?;
        ReadPreference::from_parts(&helper.mode, helper.options).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ReadPreference {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ReadPreferenceHelper<'a> {
            mode: &'a str,

            #[serde(flatten)]
            options: Option<&'a ReadPreferenceOptions>,
        }

        let helper = ReadPreferenceHelper {
            mode: self.mode(),
            options: self.options(),
        };
        helper.serialize(serializer)
    }
}

/// Specifies read preference options for non-primary read preferences.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder, Serialize, Deserialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReadPreferenceOptions {
    /// Specifies which replica set members should be considered for
    /// operations. Each tag set will be checked in order until one or more
    /// servers is found with each tag in the set.
    #[serde(alias = "tag_sets")]
    pub tag_sets: Option<Vec<TagSet>>,

    /// Specifies the maximum amount of lag behind the primary that a
    /// secondary can be to be considered for the given operation. The minimum
    /// accepted value is 90 seconds.
    ///
    /// If not specified, there is no maximum staleness bound.
    #[serde(
        rename = "maxStalenessSeconds",
        default,
        with = "serde_util::duration_option_as_int_seconds"
    )]
    pub max_staleness: Option<Duration>,
}

impl ReadPreferenceOptions {
    pub(crate) fn is_default(&self) -> bool {
        self.max_staleness.is_none()
            && self
                .tag_sets
                .as_ref()
                .map(|tag_sets| tag_sets.is_empty())
                .unwrap_or(true)
    }
}

impl ReadPreference {
    /// Constructs a read preference from a mode string and options, as they
    /// appear in connection strings and option documents. Mode matching is
    /// case insensitive.
    pub(crate) fn from_parts(
        mode: &str,
        options: Option<ReadPreferenceOptions>,
    ) -> Result<Self> {
        let read_preference = match mode.to_lowercase().as_str() {
            "primary" => {
                if options
                    .as_ref()
                    .map(|options| !options.is_default())
                    .unwrap_or(false)
                {
                    return Err(ErrorKind::InvalidArgument {
                        message: format!(
                            "no options can be specified with read preference mode primary, \
                             but got {:?}",
                            options
                        ),
                    }
                    .into());
                }
                ReadPreference::Primary
            }
            "primarypreferred" => ReadPreference::PrimaryPreferred { options },
            "secondary" => ReadPreference::Secondary { options },
            "secondarypreferred" => ReadPreference::SecondaryPreferred { options },
            "nearest" => ReadPreference::Nearest { options },
            other => {
                return Err(ErrorKind::InvalidArgument {
                    message: format!("invalid read preference mode: {}", other),
                }
                .into())
            }
        };
        Ok(read_preference)
    }

    /// The string representation of this read preference's mode.
    pub fn mode(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::Secondary { .. } => "secondary",
            ReadPreference::PrimaryPreferred { .. } => "primaryPreferred",
            ReadPreference::SecondaryPreferred { .. } => "secondaryPreferred",
            ReadPreference::Nearest { .. } => "nearest",
        }
    }

    pub(crate) fn options(&self) -> Option<&ReadPreferenceOptions> {
        match self {
            ReadPreference::Primary => None,
            ReadPreference::Secondary { options }
            | ReadPreference::PrimaryPreferred { options }
            | ReadPreference::SecondaryPreferred { options }
            | ReadPreference::Nearest { options } => options.as_ref(),
        }
    }

    /// The maximum staleness bound of this read preference, if one is set.
    pub fn max_staleness(&self) -> Option<Duration> {
        self.options().and_then(|options| options.max_staleness)
    }

    /// The tag sets of this read preference, if any are set.
    pub fn tag_sets(&self) -> Option<&Vec<TagSet>> {
        self.options().and_then(|options| options.tag_sets.as_ref())
    }

    /// Creates a new `ReadPreference` with the given tag sets.
    ///
    /// Tag sets are not applicable for `ReadPreference::Primary`, so this
    /// returns an error if `self` is a primary read preference.
    pub fn with_tags(mut self, tag_sets: Vec<TagSet>) -> Result<Self> {
        let options = match self {
            ReadPreference::Primary => {
                return Err(ErrorKind::InvalidArgument {
                    message: "tag sets can only be specified with a non-primary read preference"
                        .to_string(),
                }
                .into());
            }
            ReadPreference::Secondary { ref mut options } => options,
            ReadPreference::PrimaryPreferred { ref mut options } => options,
            ReadPreference::SecondaryPreferred { ref mut options } => options,
            ReadPreference::Nearest { ref mut options } => options,
        };

        options.get_or_insert_with(Default::default).tag_sets = Some(tag_sets);
        Ok(self)
    }

    /// Creates a new `ReadPreference` with the given maximum staleness bound.
    ///
    /// A maximum staleness bound is not applicable for
    /// `ReadPreference::Primary`, so this returns an error if `self` is a
    /// primary read preference.
    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Result<Self> {
        let options = match self {
            ReadPreference::Primary => {
                return Err(ErrorKind::InvalidArgument {
                    message: "a maximum staleness bound can only be specified with a non-primary \
                              read preference"
                        .to_string(),
                }
                .into());
            }
            ReadPreference::Secondary { ref mut options } => options,
            ReadPreference::PrimaryPreferred { ref mut options } => options,
            ReadPreference::SecondaryPreferred { ref mut options } => options,
            ReadPreference::Nearest { ref mut options } => options,
        };

        options.get_or_insert_with(Default::default).max_staleness = Some(max_staleness);
        Ok(self)
    }
}

/// A read preference tag set. See the documentation [here](https://www.mongodb.com/docs/manual/tutorial/configure-replica-set-tag-sets/)
/// for more details.
pub type TagSet = HashMap<String, String>;

pub(crate) fn verify_max_staleness(max_staleness: Duration) -> Result<()> {
    if max_staleness > Duration::from_secs(0) && max_staleness < Duration::from_secs(90) {
        return Err(ErrorKind::InvalidArgument {
            message: "max staleness cannot be both positive and less than 90 seconds".to_string(),
        }
        .into());
    }
    Ok(())
}
