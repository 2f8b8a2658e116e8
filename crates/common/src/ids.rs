//! Typed identifiers.
//!
//! Each identifier wraps a UUID so that an order id can never be passed where
//! a catalog item id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifies a storefront user (authentication happens elsewhere).
    UserId
);
uuid_id!(
    /// Identifies a sellable catalog item (frame or lens).
    CatalogItemId
);
uuid_id!(
    /// Identifies an optional service add-on attached to a cart line.
    ServiceId
);
uuid_id!(
    /// Identifies a shipping address owned by a user.
    AddressId
);
uuid_id!(CartId);
uuid_id!(CartLineId);
uuid_id!(OrderId);
uuid_id!(OrderLineId);
uuid_id!(
    /// Identifies a restock notification subscription.
    SubscriptionId
);
