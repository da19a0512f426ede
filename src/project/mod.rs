//! Project module metadata and source discovery.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Directories never walked for mutable sources. `tests/` and `benches/`
/// hold test code, which is not a mutation target.
const SKIP_DIRS: &[&str] = &["target", "tests", "benches", "node_modules"];

/// The package under test.
#[derive(Debug, Clone)]
pub struct ProjectModule {
    /// Package name from the manifest.
    pub name: String,
    /// Absolute root directory (the directory holding `Cargo.toml`).
    pub root: PathBuf,
    /// Subdirectory the user invoked from, relative to `root`. Used to
    /// scope enumeration and as the test runner's working directory.
    pub calling_dir: PathBuf,
}

impl ProjectModule {
    /// Locate the package containing `start` by walking up to the nearest
    /// manifest with a `[package]` section.
    pub fn discover(start: &Path) -> Result<Self> {
        let start = start
            .canonicalize()
            .with_context(|| format!("failed to resolve project path {:?}", start))?;

        for dir in start.ancestors() {
            let manifest = dir.join("Cargo.toml");
            if !manifest.exists() {
                continue;
            }
            if let Some(name) = parse_package_name(&manifest) {
                let calling_dir = start
                    .strip_prefix(dir)
                    .map(Path::to_path_buf)
                    .unwrap_or_default();

                return Ok(Self {
                    name,
                    root: dir.to_path_buf(),
                    calling_dir,
                });
            }
        }

        anyhow::bail!("no Cargo.toml with a [package] section above {:?}", start)
    }

    /// Directory enumeration starts from: the calling subdirectory when the
    /// user invoked from inside the package, else the root.
    pub fn enumeration_root(&self) -> PathBuf {
        self.root.join(&self.calling_dir)
    }
}

/// Parse `Cargo.toml` for the package name.
fn parse_package_name(manifest: &Path) -> Option<String> {
    let content = std::fs::read_to_string(manifest).ok()?;
    let doc: toml::Value = content.parse().ok()?;
    doc.get("package")?
        .get("name")?
        .as_str()
        .map(String::from)
}

/// Find every mutable source file under `root`, returned as paths relative
/// to `root`, sorted for deterministic enumeration order.
pub fn find_source_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if !root.is_dir() {
        return Ok(files);
    }

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.path() == root {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_ref())
        })
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().is_some_and(|ext| ext == "rs") {
            let rel = path
                .strip_prefix(root)
                .expect("walkdir yields paths under its root");
            files.push(rel.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, name: &str) {
        std::fs::write(
            dir.join("Cargo.toml"),
            format!("[package]\nname = \"{name}\"\nversion = \"0.1.0\"\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_discover_at_package_root() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), "myproject");

        let module = ProjectModule::discover(temp.path()).unwrap();
        assert_eq!(module.name, "myproject");
        assert_eq!(module.calling_dir, PathBuf::new());
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), "myproject");
        let sub = temp.path().join("src/inner");
        std::fs::create_dir_all(&sub).unwrap();

        let module = ProjectModule::discover(&sub).unwrap();
        assert_eq!(module.name, "myproject");
        assert_eq!(module.calling_dir, PathBuf::from("src/inner"));
        assert_eq!(module.enumeration_root(), sub.canonicalize().unwrap());
    }

    #[test]
    fn test_discover_without_manifest_fails() {
        let temp = TempDir::new().unwrap();
        assert!(ProjectModule::discover(temp.path()).is_err());
    }

    #[test]
    fn test_workspace_manifest_without_package_is_skipped() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("Cargo.toml"),
            "[workspace]\nmembers = [\"member\"]\n",
        )
        .unwrap();
        let member = temp.path().join("member");
        std::fs::create_dir_all(&member).unwrap();
        write_manifest(&member, "member");

        let module = ProjectModule::discover(&member).unwrap();
        assert_eq!(module.name, "member");
    }

    #[test]
    fn test_find_source_files_skips_tests_and_target() {
        let temp = TempDir::new().unwrap();
        for dir in ["src", "target/debug", "tests", ".git"] {
            std::fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        std::fs::write(temp.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(temp.path().join("src/b.rs"), "").unwrap();
        std::fs::write(temp.path().join("target/debug/gen.rs"), "").unwrap();
        std::fs::write(temp.path().join("tests/it.rs"), "").unwrap();
        std::fs::write(temp.path().join("notes.md"), "").unwrap();

        let files = find_source_files(temp.path()).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("src/b.rs"), PathBuf::from("src/lib.rs")]
        );
    }

    #[test]
    fn test_find_source_files_on_missing_dir() {
        let files = find_source_files(Path::new("does/not/exist")).unwrap();
        assert!(files.is_empty());
    }
}
