//! ILP address and address-prefix types.
//!
//! Reference: [ILP Addresses - v2.0.0](https://github.com/interledger/rfcs/blob/master/0015-ilp-addresses/0015-ilp-addresses.md).

// Addresses are never empty.
#![allow(clippy::len_without_is_empty)]

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

const MAX_ADDRESS_LENGTH: usize = 1023;
const SEPARATOR: char = '.';

static SCHEMES: &[&str] = &[
    "g", "private", "example", "peer", "self", "test", "test1", "test2", "test3", "local",
];

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid ILP address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid ILP address prefix: {0:?}")]
    InvalidPrefix(String),
}

/// Checks the segment rules shared by addresses and prefixes and returns the
/// number of segments, or `None` if the string is malformed.
fn count_valid_segments(value: &str) -> Option<usize> {
    if value.is_empty() || value.len() > MAX_ADDRESS_LENGTH {
        return None;
    }
    let mut segments = 0;
    for (i, segment) in value.split(SEPARATOR).enumerate() {
        if segment.is_empty() || !segment.bytes().all(is_segment_byte) {
            return None;
        }
        if i == 0 && !is_scheme(segment) {
            return None;
        }
        segments += 1;
    }
    Some(segments)
}

fn is_scheme(segment: &str) -> bool {
    SCHEMES.contains(&segment)
}

/// <https://github.com/interledger/rfcs/blob/master/0015-ilp-addresses/0015-ilp-addresses.md#address-requirements>
fn is_segment_byte(byte: u8) -> bool {
    byte == b'_'
        || byte == b'-'
        || byte == b'~'
        || (b'A'..=b'Z').contains(&byte)
        || (b'a'..=b'z').contains(&byte)
        || (b'0'..=b'9').contains(&byte)
}

/// A full ILP address, such as `g.us.bank.alice`. Always has a valid scheme and
/// at least two segments.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    /// # Panics
    ///
    /// Panics if the string is not a valid ILP address.
    pub fn new(address: &'static str) -> Self {
        Address::from_str(address).expect("invalid ILP address")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ```text
    /// scheme = "g" / "private" / "example" / "peer" / "self" /
    ///          "test" / "test1" / "test2" / "test3" / "local"
    /// ```
    pub fn scheme(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    pub fn with_suffix(&self, suffix: &str) -> Result<Address, AddressError> {
        Address::from_str(&format!("{}{}{}", self.0, SEPARATOR, suffix))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        match count_valid_segments(address) {
            Some(segments) if segments > 1 => Ok(Address(address.to_string())),
            _ => Err(AddressError::InvalidAddress(address.to_string())),
        }
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(address: String) -> Result<Self, Self::Error> {
        match count_valid_segments(&address) {
            Some(segments) if segments > 1 => Ok(Address(address)),
            _ => Err(AddressError::InvalidAddress(address)),
        }
    }
}

impl AsRef<str> for Address {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.debug_tuple("Address").field(&self.0).finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A range of ILP addresses, such as `g.us.bank` or the global prefix `g`.
///
/// Unlike an [`Address`], a prefix may consist of the scheme alone. All prefix
/// relations are segment-aware: `g.bank` is an ancestor of `g.bank.alice`
/// but not of `g.bankers`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressPrefix(String);

impl AddressPrefix {
    /// # Panics
    ///
    /// Panics if the string is not a valid ILP address prefix.
    pub fn new(prefix: &'static str) -> Self {
        AddressPrefix::from_str(prefix).expect("invalid ILP address prefix")
    }

    /// The root of the production Interledger, which the default route points at.
    pub fn global() -> Self {
        AddressPrefix("g".to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// The first segment of this prefix (for example `g` for `g.us.bank`).
    pub fn root_prefix(&self) -> AddressPrefix {
        match self.0.find(SEPARATOR) {
            Some(index) => AddressPrefix(self.0[..index].to_string()),
            None => self.clone(),
        }
    }

    /// This prefix with its last segment removed, or `None` for a root prefix.
    pub fn parent(&self) -> Option<AddressPrefix> {
        self.0
            .rfind(SEPARATOR)
            .map(|index| AddressPrefix(self.0[..index].to_string()))
    }

    pub fn is_root(&self) -> bool {
        !self.0.contains(SEPARATOR)
    }

    /// Returns true if `other` equals this prefix or is one of its ancestors.
    pub fn starts_with(&self, other: &AddressPrefix) -> bool {
        is_segment_prefix(&self.0, &other.0)
    }

    /// Returns true if `address` falls inside the range described by this prefix.
    pub fn is_prefix_of(&self, address: &Address) -> bool {
        is_segment_prefix(address.as_str(), &self.0)
    }

    pub fn with_suffix(&self, suffix: &str) -> Result<AddressPrefix, AddressError> {
        AddressPrefix::from_str(&format!("{}{}{}", self.0, SEPARATOR, suffix))
    }
}

fn is_segment_prefix(value: &str, prefix: &str) -> bool {
    value.starts_with(prefix)
        && (value.len() == prefix.len() || value[prefix.len()..].starts_with(SEPARATOR))
}

impl FromStr for AddressPrefix {
    type Err = AddressError;

    fn from_str(prefix: &str) -> Result<Self, Self::Err> {
        match count_valid_segments(prefix) {
            Some(_) => Ok(AddressPrefix(prefix.to_string())),
            None => Err(AddressError::InvalidPrefix(prefix.to_string())),
        }
    }
}

impl From<&Address> for AddressPrefix {
    fn from(address: &Address) -> Self {
        AddressPrefix(address.0.clone())
    }
}

impl From<Address> for AddressPrefix {
    fn from(address: Address) -> Self {
        AddressPrefix(address.0)
    }
}

impl AsRef<str> for AddressPrefix {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AddressPrefix {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.debug_tuple("AddressPrefix").field(&self.0).finish()
    }
}

impl fmt::Display for AddressPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(any(feature = "serde", test))]
mod serialization {
    use super::{Address, AddressPrefix};
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    impl Serialize for Address {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(self.as_str())
        }
    }

    impl<'de> Deserialize<'de> for Address {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let string = String::deserialize(deserializer)?;
            Address::from_str(&string).map_err(D::Error::custom)
        }
    }

    impl Serialize for AddressPrefix {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(self.as_str())
        }
    }

    impl<'de> Deserialize<'de> for AddressPrefix {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let string = String::deserialize(deserializer)?;
            AddressPrefix::from_str(&string).map_err(D::Error::custom)
        }
    }
}
