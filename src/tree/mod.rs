//! Tree document access.
//!
//! A memo vault is a permissioned directory tree addressed by opaque
//! [`TreeLocation`]s rather than raw paths. Everything that touches the vault
//! goes through [`TreeAccessor`], so the indexer and the repository work the
//! same against a local directory or any other tree provider.

pub mod local;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use local::{LocalTree, LocalTreeOpener};

/// Opaque reference to a file or directory inside the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeLocation(String);

impl TreeLocation {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TreeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TreeLocation {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub location: TreeLocation,
    pub name: String,
    pub is_dir: bool,
}

impl TreeNode {
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

/// Operations the platform storage layer provides over a granted tree.
///
/// All calls may block on slow or removable storage; async callers run them
/// on `spawn_blocking`.
pub trait TreeAccessor: Send + Sync {
    /// The tree root. Fails when the granted root is gone.
    fn root(&self) -> Result<TreeNode>;

    fn list_children(&self, dir: &TreeLocation) -> Result<Vec<TreeNode>>;

    fn create_directory(&self, parent: &TreeLocation, name: &str) -> Result<TreeNode>;

    /// Create a new file. Providers may rename on collision; the returned
    /// node carries the final name.
    fn create_file(&self, parent: &TreeLocation, media_type: &str, name: &str) -> Result<TreeNode>;

    fn read(&self, location: &TreeLocation) -> Result<Vec<u8>>;

    fn write(&self, location: &TreeLocation, content: &[u8]) -> Result<()>;

    /// Declared media type, `None` for directories or unknown types.
    fn media_type(&self, location: &TreeLocation) -> Option<String>;

    fn find_child(&self, dir: &TreeLocation, name: &str) -> Result<Option<TreeNode>> {
        Ok(self
            .list_children(dir)?
            .into_iter()
            .find(|child| child.name == name))
    }

    fn find_or_create_directory(&self, parent: &TreeLocation, name: &str) -> Result<TreeNode> {
        match self.find_child(parent, name)? {
            Some(node) if node.is_dir => Ok(node),
            Some(node) => Err(Error::Tree(format!(
                "{} exists but is not a directory",
                node.location
            ))),
            None => self.create_directory(parent, name),
        }
    }

    fn read_to_string(&self, location: &TreeLocation) -> Result<String> {
        let bytes = self.read(location)?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Tree(format!("{} is not valid UTF-8: {}", location, e)))
    }
}

/// Opens the tree behind a stored root location.
pub trait TreeOpener: Send + Sync {
    fn open_tree(&self, root: &str) -> Result<Arc<dyn TreeAccessor>>;
}
