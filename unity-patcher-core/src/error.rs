//! Errors raised while interpreting object field trees

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UnityAssetError>;

#[derive(Error, Debug)]
pub enum UnityAssetError {
    /// A field the layout requires is missing from the tree
    #[error("Property '{property}' not found in class '{class_name}'")]
    PropertyNotFound {
        property: String,
        class_name: String,
    },

    /// A tree value has the wrong shape for its layout node
    #[error("Type conversion error: cannot convert {from} to {to}")]
    TypeConversion { from: String, to: String },
}

impl UnityAssetError {
    pub fn property_not_found<S: Into<String>>(property: S, class_name: S) -> Self {
        Self::PropertyNotFound {
            property: property.into(),
            class_name: class_name.into(),
        }
    }

    pub fn type_conversion<S: Into<String>>(from: S, to: S) -> Self {
        Self::TypeConversion {
            from: from.into(),
            to: to.into(),
        }
    }
}
