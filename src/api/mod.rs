//! The graphics object model driven by the harness.
//!
//! Objects are reference counted and discovered through `query_interface`;
//! every interface is a trait whose supertrait is [`Unknown`]. Enum values
//! match the vendor numbering so they can be passed through unchanged.

/// Declares a `#[repr(u32)]` enum with a fallible conversion from its raw value.
macro_rules! api_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u32)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl TryFrom<u32> for $name {
            type Error = u32;

            fn try_from(value: u32) -> Result<Self, u32> {
                $(if value == $value {
                    return Ok($name::$variant);
                })+
                Err(value)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value as u32
            }
        }
    };
}

pub mod com;
pub mod format;
pub mod interfaces;
pub mod root_signature;
pub mod types;

pub use com::{get_refcount, iid, ComInterface, ComObject, ComPtr, Guid, RefCount, Unknown};
pub use format::Format;
pub use interfaces::*;
pub use root_signature::*;
pub use types::*;
