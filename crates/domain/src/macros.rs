//! Macro for implementing Display and FromStr for wire-named enums
//!
//! Operation types, error kinds, conflict types and sync phases all travel
//! as stable lowercase strings (SQLite columns, event names, JSON). This macro
//! keeps the string table next to the enum so both directions stay in sync.
//!
//! # Example
//!
//! ```rust
//! use tipsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum QueueState {
//!     Pending,
//!     Failed,
//! }
//!
//! impl_domain_status_conversions!(QueueState {
//!     Pending => "pending",
//!     Failed => "failed",
//! });
//!
//! assert_eq!(QueueState::Failed.to_string(), "failed");
//! assert_eq!("PENDING".parse::<QueueState>(), Ok(QueueState::Pending));
//! ```

/// Implements Display and FromStr traits for wire-named enums
///
/// Parsing is case-insensitive; output always uses the declared string.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Stable wire name for this variant.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
