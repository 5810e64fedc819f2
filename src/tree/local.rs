use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{TreeAccessor, TreeLocation, TreeNode, TreeOpener};
use crate::error::{Error, Result};

/// Suffix for in-flight writes; such files are never reported as children.
const TEMP_SUFFIX: &str = ".handymemo-tmp";

/// [`TreeAccessor`] over a local directory.
///
/// Locations are root-relative paths joined with `/`; the root itself is the
/// empty location. Any location containing a parent or absolute component is
/// rejected, so a location can never escape the root.
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Tree(format!("Root directory not found: {}", root.display())));
        }
        Ok(Self { root })
    }

    /// Map a location to its filesystem path under the root.
    pub fn resolve(&self, location: &TreeLocation) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in location.as_str().split('/').filter(|s| !s.is_empty()) {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(name)), None) => path.push(name),
                _ => {
                    return Err(Error::Tree(format!("Invalid tree location: {}", location)));
                }
            }
        }
        Ok(path)
    }

    fn child_location(parent: &TreeLocation, name: &str) -> Result<TreeLocation> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
            return Err(Error::Tree(format!("Invalid child name: {:?}", name)));
        }
        if parent.as_str().is_empty() {
            Ok(TreeLocation::new(name))
        } else {
            Ok(TreeLocation::new(format!("{}/{}", parent.as_str(), name)))
        }
    }

    fn node_for(&self, location: TreeLocation, name: String) -> Result<TreeNode> {
        let is_dir = self.resolve(&location)?.is_dir();
        Ok(TreeNode { location, name, is_dir })
    }
}

/// Opens stored roots as local directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTreeOpener;

impl TreeOpener for LocalTreeOpener {
    fn open_tree(&self, root: &str) -> Result<Arc<dyn TreeAccessor>> {
        Ok(Arc::new(LocalTree::open(root)?))
    }
}

/// Pick a non-existing sibling name: `name.md` -> `name (1).md`, `name (2).md`...
fn resolve_collision(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }
    let stem = target
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let ext = target.extension().map(|e| e.to_string_lossy().to_string());
    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut counter = 1;
    loop {
        let new_name = match &ext {
            Some(e) => format!("{} ({}).{}", stem, counter, e),
            None => format!("{} ({})", stem, counter),
        };
        let candidate = parent.join(&new_name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Atomic file write: write to a temp file in the same directory, then rename.
///
/// A concurrent indexing pass never reads a half-written memo this way.
pub(crate) fn atomic_write_file(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp_path = path.with_file_name(format!("{}{}", file_name, TEMP_SUFFIX));

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Hidden entries and in-flight atomic writes are not part of the tree.
fn is_visible(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(TEMP_SUFFIX)
}

impl TreeAccessor for LocalTree {
    fn root(&self) -> Result<TreeNode> {
        if !self.root.is_dir() {
            return Err(Error::Tree(format!(
                "Root directory not found: {}",
                self.root.display()
            )));
        }
        Ok(TreeNode {
            location: TreeLocation::new(""),
            name: self
                .root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            is_dir: true,
        })
    }

    fn list_children(&self, dir: &TreeLocation) -> Result<Vec<TreeNode>> {
        let dir_path = self.resolve(dir)?;
        let mut children = Vec::new();

        for entry in fs::read_dir(&dir_path)?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_visible(&name) {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            children.push(TreeNode {
                location: Self::child_location(dir, &name)?,
                name,
                is_dir,
            });
        }

        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn find_child(&self, dir: &TreeLocation, name: &str) -> Result<Option<TreeNode>> {
        if !is_visible(name) {
            return Ok(None);
        }
        let location = match Self::child_location(dir, name) {
            Ok(location) => location,
            Err(_) => return Ok(None),
        };
        if !self.resolve(&location)?.exists() {
            return Ok(None);
        }
        self.node_for(location, name.to_string()).map(Some)
    }

    fn create_directory(&self, parent: &TreeLocation, name: &str) -> Result<TreeNode> {
        let location = Self::child_location(parent, name)?;
        let path = self.resolve(&location)?;
        fs::create_dir_all(&path)?;
        Ok(TreeNode {
            location,
            name: name.to_string(),
            is_dir: true,
        })
    }

    fn create_file(&self, parent: &TreeLocation, _media_type: &str, name: &str) -> Result<TreeNode> {
        let requested = self.resolve(&Self::child_location(parent, name)?)?;
        let target = resolve_collision(&requested);
        let final_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::Tree(format!("Invalid file name: {:?}", name)))?;

        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)?;

        Ok(TreeNode {
            location: Self::child_location(parent, &final_name)?,
            name: final_name,
            is_dir: false,
        })
    }

    fn read(&self, location: &TreeLocation) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(location)?)?)
    }

    fn write(&self, location: &TreeLocation, content: &[u8]) -> Result<()> {
        atomic_write_file(&self.resolve(location)?, content)
    }

    fn media_type(&self, location: &TreeLocation) -> Option<String> {
        let path = self.resolve(location).ok()?;
        if !path.is_file() {
            return None;
        }
        mime_guess::from_path(&path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(LocalTree::open(&missing).is_err(), "없는 루트는 열 수 없어야 함");
    }

    #[test]
    fn test_locations_are_root_relative() {
        let temp_dir = TempDir::new().unwrap();
        let tree = LocalTree::open(temp_dir.path()).unwrap();
        let root = tree.root().unwrap();

        let memos = tree.find_or_create_directory(&root.location, "memos").unwrap();
        let year = tree.find_or_create_directory(&memos.location, "2024").unwrap();
        assert_eq!(year.location.as_str(), "memos/2024");
        assert!(temp_dir.path().join("memos/2024").is_dir());
    }

    #[test]
    fn test_resolve_rejects_escaping_locations() {
        let temp_dir = TempDir::new().unwrap();
        let tree = LocalTree::open(temp_dir.path()).unwrap();
        assert!(tree.resolve(&TreeLocation::from("memos/../../etc")).is_err());
        assert!(tree.resolve(&TreeLocation::from("memos/2024")).is_ok());
    }

    #[test]
    fn test_create_file_avoids_collision() {
        let temp_dir = TempDir::new().unwrap();
        let tree = LocalTree::open(temp_dir.path()).unwrap();
        let root = TreeLocation::from("");

        let first = tree.create_file(&root, "text/markdown", "a.md").unwrap();
        let second = tree.create_file(&root, "text/markdown", "a.md").unwrap();
        assert_eq!(first.name, "a.md");
        assert_eq!(second.name, "a (1).md");
    }

    #[test]
    fn test_write_then_read_and_skip_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let tree = LocalTree::open(temp_dir.path()).unwrap();
        let root = TreeLocation::from("");

        let node = tree.create_file(&root, "text/markdown", "note.md").unwrap();
        tree.write(&node.location, "hello".as_bytes()).unwrap();
        fs::write(temp_dir.path().join("other.md.handymemo-tmp"), "partial").unwrap();
        fs::write(temp_dir.path().join(".hidden"), "x").unwrap();

        assert_eq!(tree.read_to_string(&node.location).unwrap(), "hello");
        let names: Vec<String> = tree
            .list_children(&root)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["note.md".to_string()]);
    }

    #[test]
    fn test_find_child_hides_what_listing_hides() {
        let temp_dir = TempDir::new().unwrap();
        let tree = LocalTree::open(temp_dir.path()).unwrap();
        let root = TreeLocation::from("");
        fs::write(temp_dir.path().join(".x.jpg"), "x").unwrap();
        fs::write(temp_dir.path().join("y.jpg.handymemo-tmp"), "partial").unwrap();
        fs::write(temp_dir.path().join("z.jpg"), "z").unwrap();

        assert!(tree.find_child(&root, ".x.jpg").unwrap().is_none(), "숨김 파일은 찾을 수 없어야 함");
        assert!(tree.find_child(&root, "y.jpg.handymemo-tmp").unwrap().is_none());
        assert!(tree.find_child(&root, "z.jpg").unwrap().is_some());
    }

    #[test]
    fn test_media_type_from_extension() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("clip.mp4"), "v").unwrap();
        fs::write(temp_dir.path().join("pic.jpg"), "i").unwrap();
        let tree = LocalTree::open(temp_dir.path()).unwrap();

        assert_eq!(tree.media_type(&TreeLocation::from("clip.mp4")).as_deref(), Some("video/mp4"));
        assert_eq!(tree.media_type(&TreeLocation::from("pic.jpg")).as_deref(), Some("image/jpeg"));
        assert_eq!(tree.media_type(&TreeLocation::from("")), None);
    }
}
