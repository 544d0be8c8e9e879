//! Strongly-typed identifiers.
//!
//! Backend instances and runs are identified by UUIDs so that two values
//! built from identical configuration never collide.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! new_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// A fresh, process-unique id.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// The shared id of stateless, interchangeable instances.
            pub const fn shared() -> Self {
                Self(Uuid::nil())
            }

            pub fn is_shared(&self) -> bool {
                self.0.is_nil()
            }

            /// Lowercase hex without dashes; safe inside SQL identifiers.
            pub fn simple(&self) -> String {
                self.0.simple().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(RunId);
new_id!(InstanceId);
