//! Newtype wrappers for identifiers exchanged with helpers and clients.
//!
//! Identifiers serialize/deserialize as plain strings so they can be handed to
//! the bus layer unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Caller-supplied key for one unit of requested work.
    TaskId
);

string_newtype!(
    /// Transaction identifier handed to clients, e.g. `/7_1a2b3c4d_data`.
    TransactionId
);

impl TransactionId {
    /// Derive the identifier for job `job` created at `created_at`.
    ///
    /// The job index keeps identifiers unique within one daemon run; the
    /// digest suffix keeps them distinct across restarts.
    pub fn generate(job: u32, created_at: DateTime<Utc>) -> Self {
        let seed = format!(
            "{job}:{}",
            created_at.timestamp_nanos_opt().unwrap_or_default()
        );
        let digest = blake3::hash(seed.as_bytes()).to_hex().to_string();
        Self(format!("/{job}_{}_data", &digest[..8]))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackageIdError {
    #[error("invalid package id '{0}': expected name;version;arch;data")]
    Malformed(String),
    #[error("invalid package id '{0}': name must not be empty")]
    EmptyName(String),
}

/// A structurally valid package identifier of the form `name;version;arch;data`.
///
/// Only the name is required to be non-empty; helpers routinely leave the
/// version, architecture, or repository data blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    name: String,
    version: String,
    arch: String,
    data: String,
}

impl PackageId {
    pub fn parse(text: &str) -> Result<Self, PackageIdError> {
        let sections: Vec<&str> = text.split(';').collect();
        let [name, version, arch, data] = sections.as_slice() else {
            return Err(PackageIdError::Malformed(text.to_owned()));
        };
        if name.is_empty() {
            return Err(PackageIdError::EmptyName(text.to_owned()));
        }
        Ok(Self {
            name: (*name).to_owned(),
            version: (*version).to_owned(),
            arch: (*arch).to_owned(),
            data: (*data).to_owned(),
        })
    }

    pub fn new(name: &str, version: &str, arch: &str, data: &str) -> Result<Self, PackageIdError> {
        Self::parse(&format!("{name};{version};{arch};{data}"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.name, self.version, self.arch, self.data
        )
    }
}

impl std::str::FromStr for PackageId {
    type Err = PackageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
