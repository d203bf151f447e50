//! Value Objects for the stock ledger

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest identifier the ledger table accepts (`VARCHAR(50)`).
pub const LOCATION_ID_MAX_LEN: usize = 50;

/// Location identifier: lowercase ASCII letters, digits and hyphens.
///
/// Immutable once constructed. Equality and hashing use the canonical string,
/// so a `LocationId` can be used directly as a map key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationId(String);

impl LocationId {
    /// Strict constructor, rejects anything outside `[a-z0-9-]+`.
    pub fn new(value: impl Into<String>) -> Result<Self, LocationIdError> {
        let value = value.into();
        if value.is_empty() { return Err(LocationIdError::Empty); }
        if value.len() > LOCATION_ID_MAX_LEN { return Err(LocationIdError::TooLong); }
        if let Some(c) = value.chars().find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')) {
            return Err(LocationIdError::InvalidChar(c));
        }
        Ok(Self(value))
    }

    /// Lenient constructor for form and cookie input: trims, lowercases and
    /// drops disallowed characters before validating what is left.
    pub fn sanitize(raw: &str) -> Result<Self, LocationIdError> {
        let cleaned: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
            .collect();
        Self::new(cleaned)
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for LocationId {
    type Error = LocationIdError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<LocationId> for String {
    fn from(id: LocationId) -> Self { id.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationIdError { Empty, TooLong, InvalidChar(char) }
impl std::error::Error for LocationIdError {}
impl fmt::Display for LocationIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "location id empty"),
            Self::TooLong => write!(f, "location id longer than {LOCATION_ID_MAX_LEN} characters"),
            Self::InvalidChar(c) => write!(f, "location id contains invalid character {c:?}"),
        }
    }
}

/// Host platform product identifier (always positive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    pub fn new(value: i64) -> Option<Self> { (value > 0).then_some(Self(value)) }
    pub fn value(&self) -> i64 { self.0 }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Host platform order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    pub fn new(value: i64) -> Option<Self> { (value > 0).then_some(Self(value)) }
    pub fn value(&self) -> i64 { self.0 }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Host platform user identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(u64);

impl ActorId {
    pub fn new(value: u64) -> Self { Self(value) }
    pub fn value(&self) -> u64 { self.0 }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Signed, non-zero stock adjustment.
///
/// Parsed from `(+|-)?digits`. A token without a sign means "add".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockDelta(i64);

impl StockDelta {
    pub fn new(value: i64) -> Result<Self, DeltaError> {
        if value == 0 { return Err(DeltaError::Zero); }
        Ok(Self(value))
    }

    pub fn parse(token: &str) -> Result<Self, DeltaError> {
        let token = token.trim();
        let (negative, digits) = match token.as_bytes().first() {
            None => return Err(DeltaError::Empty),
            Some(b'+') => (false, &token[1..]),
            Some(b'-') => (true, &token[1..]),
            Some(_) => (false, token),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DeltaError::Malformed(token.to_string()));
        }
        let magnitude: i64 = digits.parse().map_err(|_| DeltaError::Overflow)?;
        Self::new(if negative { -magnitude } else { magnitude })
    }

    /// Decrement by an order line quantity.
    pub fn remove(quantity: u32) -> Result<Self, DeltaError> { Self::new(-i64::from(quantity)) }

    /// Increment by an order line quantity.
    pub fn restore(quantity: u32) -> Result<Self, DeltaError> { Self::new(i64::from(quantity)) }

    pub fn value(&self) -> i64 { self.0 }
}

impl fmt::Display for StockDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:+}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaError { Empty, Zero, Malformed(String), Overflow }
impl std::error::Error for DeltaError {}
impl fmt::Display for DeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "adjustment is empty"),
            Self::Zero => write!(f, "adjustment of 0 changes nothing"),
            Self::Malformed(t) => write!(f, "adjustment {t:?} is not of the form +N or -N"),
            Self::Overflow => write!(f, "adjustment is too large"),
        }
    }
}

/// Non-negative stock quantity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }

    /// Clamps negatives to zero and saturates at `u32::MAX`.
    pub fn clamped(value: i64) -> Self { Self(value.clamp(0, i64::from(u32::MAX)) as u32) }

    pub fn value(&self) -> u32 { self.0 }

    /// `max(0, self + delta)`.
    pub fn apply(&self, delta: StockDelta) -> Self { Self::clamped(i64::from(self.0).saturating_add(delta.value())) }

    pub fn is_zero(&self) -> bool { self.0 == 0 }
}
