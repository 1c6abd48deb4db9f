//! TypeTree data structures
//!
//! A typetree describes the field layout of one serialized class. Nodes
//! are stored flat in files (depth-first, with a level per node) and kept
//! here as a nested tree.

use crate::error::{BinaryError, Result};
use serde::{Deserialize, Serialize};

/// Meta flag: align the stream to 4 bytes after this field
pub const ALIGN_FLAG: i32 = 0x4000;

/// A node in the Unity TypeTree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTreeNode {
    /// Type name (e.g., "int", "string", "GameObject")
    #[serde(alias = "m_Type")]
    pub type_name: String,
    /// Field name (e.g., "m_Name", "m_IsActive")
    #[serde(alias = "m_Name")]
    pub name: String,
    /// Size in bytes (-1 for variable size)
    #[serde(default, alias = "m_ByteSize")]
    pub byte_size: i32,
    /// Index in the flat node list
    #[serde(default, alias = "m_Index")]
    pub index: i32,
    /// Bit 0 marks the `Array` node of a vector
    #[serde(default, alias = "m_TypeFlags")]
    pub type_flags: i32,
    /// Version of this type
    #[serde(default, alias = "m_Version")]
    pub version: i32,
    /// Meta flags (alignment, etc.)
    #[serde(default, alias = "m_MetaFlag")]
    pub meta_flags: i32,
    /// Depth level in the tree
    #[serde(default, alias = "m_Level")]
    pub level: i32,
    /// Reference type hash
    #[serde(default)]
    pub ref_type_hash: u64,
    /// Child nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TypeTreeNode>,
}

impl TypeTreeNode {
    /// Create a new node with basic information
    pub fn with_info(type_name: &str, name: &str, level: i32) -> Self {
        Self {
            type_name: type_name.to_string(),
            name: name.to_string(),
            level,
            byte_size: -1,
            ..Default::default()
        }
    }

    /// Check if this node is the `Array` node of a vector
    pub fn is_array(&self) -> bool {
        self.type_flags & 1 != 0 || self.type_name == "Array"
    }

    /// Check if this node is aligned
    pub fn is_aligned(&self) -> bool {
        self.meta_flags & ALIGN_FLAG != 0
    }

    /// Find a direct child by field name
    pub fn find_child(&self, name: &str) -> Option<&TypeTreeNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Rebuild the nesting of a flat depth-first node list
    pub fn from_flat(nodes: Vec<TypeTreeNode>) -> Result<TypeTreeNode> {
        let mut stack: Vec<TypeTreeNode> = Vec::new();
        let mut iter = nodes.into_iter();
        let mut root = iter
            .next()
            .ok_or_else(|| BinaryError::invalid_data("Empty typetree"))?;
        root.children.clear();
        let root_level = root.level;
        stack.push(root);

        for mut node in iter {
            node.children.clear();
            if node.level <= root_level {
                return Err(BinaryError::invalid_data(format!(
                    "Typetree node '{}' has level {} outside the root",
                    node.name, node.level
                )));
            }
            while stack.last().map(|top| top.level >= node.level).unwrap_or(false) {
                collapse(&mut stack);
            }
            stack.push(node);
        }
        while stack.len() > 1 {
            collapse(&mut stack);
        }
        stack
            .pop()
            .ok_or_else(|| BinaryError::invalid_data("Empty typetree"))
    }

    /// Flatten back to depth-first order
    pub fn to_flat(&self) -> Vec<TypeTreeNode> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<TypeTreeNode>) {
        let mut node = self.clone();
        node.children.clear();
        out.push(node);
        for child in &self.children {
            child.flatten_into(out);
        }
    }
}

fn collapse(stack: &mut Vec<TypeTreeNode>) {
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(done);
        } else {
            stack.push(done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(type_name: &str, name: &str, level: i32) -> TypeTreeNode {
        TypeTreeNode::with_info(type_name, name, level)
    }

    #[test]
    fn test_from_flat_builds_nesting() {
        let flat = vec![
            node("TextAsset", "Base", 0),
            node("string", "m_Name", 1),
            node("Array", "Array", 2),
            node("int", "size", 3),
            node("char", "data", 3),
            node("string", "m_Script", 1),
        ];
        let root = TypeTreeNode::from_flat(flat.clone()).unwrap();

        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].children[0].children.len(), 2);
        assert_eq!(root.find_child("m_Script").map(|n| n.level), Some(1));
        assert_eq!(root.to_flat(), flat);
    }

    #[test]
    fn test_from_flat_rejects_second_root() {
        let flat = vec![node("A", "Base", 0), node("B", "Base", 0)];
        assert!(TypeTreeNode::from_flat(flat).is_err());
    }

    #[test]
    fn test_deserialize_generator_layout() {
        let json = r#"[{"m_Type": "MonoBehaviour", "m_Name": "Base", "m_Level": 0, "m_MetaFlag": 0},
                       {"m_Type": "int", "m_Name": "m_Score", "m_Level": 1, "m_MetaFlag": 16384}]"#;
        let flat: Vec<TypeTreeNode> = serde_json::from_str(json).unwrap();
        let root = TypeTreeNode::from_flat(flat).unwrap();
        assert!(root.children[0].is_aligned());
    }
}
