//! Unity Patcher Core
//!
//! Shared value model for the patcher: the field tree of a decoded
//! Unity object, class identifiers, and the common error type.

pub mod class_id;
pub mod error;
pub mod unity_value;

pub use class_id::ClassIdType;
pub use error::{Result, UnityAssetError};
pub use unity_value::UnityValue;
