//! Opaque handles returned by `subscribe` calls.
//!
//! Listener and subscriber handles are distinct types so one can never be
//! used to unregister the other.

use std::fmt;

use uuid::Uuid;

macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh handle.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.simple(), f)
            }
        }
    };
}

define_id!(
    /// Handle for a credential-change listener registered on the store.
    ListenerId
);

define_id!(
    /// Handle for a realtime event subscriber.
    SubscriberId
);
