//! in-memory collection of template files
//!
//! [SourceTree] maps slash separated paths (relative to the template root) to file contents.
//! Files ending in `.tf` form modules (one module per directory), `.tfvars` files hold variable
//! values, and `.json` files are kept so a plan can be addressed by its path in the tree.
//!
//! Paths are ordered, so every consumer sees files in the same order.
use indexmap::IndexMap;
use std::path::Path;

#[derive(Default, Debug, Clone)]
pub struct SourceTree {
    files: IndexMap<String, String>,
}

impl SourceTree {
    pub fn insert(&mut self, path: impl AsRef<str>, contents: impl Into<String>) {
        let path = normalize(path.as_ref());
        self.files.insert(path, contents.into());
        self.files.sort_keys();
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(&normalize(path)).map(String::as_str)
    }

    pub fn files(&self) -> &IndexMap<String, String> {
        &self.files
    }

    /// `.tf` files directly inside `dir`
    pub fn module_files<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.files
            .iter()
            .filter(move |(path, _)| path.ends_with(".tf") && parent(path) == dir)
            .map(|(path, contents)| (path.as_str(), contents.as_str()))
    }

    pub fn has_module(&self, dir: &str) -> bool {
        self.module_files(dir).next().is_some()
    }

    /// All `.tfvars` files, in path order
    pub fn var_files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files
            .iter()
            .filter(|(path, _)| path.ends_with(".tfvars"))
            .map(|(path, contents)| (path.as_str(), contents.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SourceTree {
    /// Recursively loads a template directory
    ///
    /// Hidden directories and `.terraform` are skipped.
    pub fn load_directory(dir_path: &Path) -> Result<Self, LoadError> {
        let root = dir_path.canonicalize()?;
        tracing::info!(path=%root.display(), "loading template directory");

        let mut tree = SourceTree::default();
        tree.load_recursive(&root, "")?;

        if tree.module_files("").next().is_none() {
            return Err(LoadError::NoFilesFound);
        }

        Ok(tree)
    }

    fn load_recursive(&mut self, dir_path: &Path, prefix: &str) -> Result<(), LoadError> {
        let mut entries = std::fs::read_dir(dir_path)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for dir_entry in entries {
            let file_name = dir_entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                file_name.clone()
            } else {
                format!("{prefix}/{file_name}")
            };

            let file_type = dir_entry.file_type()?;
            if file_type.is_dir() {
                if file_name.starts_with('.') {
                    continue;
                }
                self.load_recursive(&dir_entry.path(), &relative)?;
                continue;
            }

            let is_template_file = [".tf", ".tfvars", ".json"]
                .iter()
                .any(|extension| file_name.ends_with(extension));
            if !file_type.is_file() || !is_template_file {
                continue;
            }

            tracing::debug!(path = relative, "loading file");
            let contents = std::fs::read_to_string(dir_entry.path())?;
            self.insert(relative, contents);
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No .tf files found in directory")]
    NoFilesFound,
    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

/// Directory part of a tree path, `""` for the root
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolves `relative` against the tree directory `dir`
pub fn join(dir: &str, relative: &str) -> String {
    if dir.is_empty() {
        normalize(relative)
    } else {
        normalize(&format!("{dir}/{relative}"))
    }
}

/// Removes `.` segments, folds `..` segments and strips leading/trailing slashes
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = vec![];
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Utility macro to create a [SourceTree]
///
/// Create from a single root module file (named `main.tf`)
/// ```
/// # use preview::source_tree;
/// let tree = source_tree!(r#"variable "region" {}"#);
/// assert!(tree.get("main.tf").is_some());
/// ```
///
/// Create from multiple files
/// ```
/// # use preview::source_tree;
/// let tree = source_tree! {
///   "main.tf" => r#"module "net" { source = "./net" }"#,
///   "net/main.tf" => r#"output "zone" { value = "a" }"#
/// };
/// assert_eq!(tree.module_files("net").count(), 1);
/// ```
#[macro_export]
macro_rules! source_tree {
    // single root module file
    { $expr:expr } => {
        {
            let mut tree = $crate::source_tree::SourceTree::default();
            tree.insert("main.tf", $expr);
            tree
        }
    };
    // multiple files
    { $($path:expr => $expr:expr),+ $(,)? } => {
        {
            let mut tree = $crate::source_tree::SourceTree::default();
            $(
                tree.insert($path, $expr);
            )+
            tree
        }
    };
}
