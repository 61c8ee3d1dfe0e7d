//! Core type definitions for reservo.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TXID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused within a
/// process, so lock ownership can never be confused between transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a transaction ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide transaction ID.
    #[must_use]
    pub fn allocate() -> Self {
        Self(NEXT_TXID.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a countable resource pool (e.g. a flight's seat inventory).
    ResourceId
);

string_id!(
    /// Identifier of one allocatable unit within a resource.
    UnitId
);

string_id!(
    /// Identifier of the party holding a unit.
    RequesterId
);

impl UnitId {
    /// Derives the ID of the `index`-th unit of a resource.
    #[must_use]
    pub fn for_resource(resource: &ResourceId, index: u32) -> Self {
        Self(format!("{resource}/{index:04}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ids_are_unique() {
        let a = TransactionId::allocate();
        let b = TransactionId::allocate();
        assert!(b > a);
    }

    #[test]
    fn transaction_id_display() {
        assert_eq!(TransactionId::new(7).to_string(), "txn:7");
    }

    #[test]
    fn unit_id_for_resource() {
        let flight = ResourceId::new("FL100");
        assert_eq!(UnitId::for_resource(&flight, 3).as_str(), "FL100/0003");
    }
}
