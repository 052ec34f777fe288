//! A filesystem handle carried in the context.
//!
//! Commands that read files shouldn't reach for the process-wide filesystem directly. Instead,
//! a [`FileSystem`] handle is put into the context (usually by a modifier) and the commands take
//! it from there. Tests can then hand in a [`MemFs`] and production code a [`DirFs`].
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use cliboot::fileutils::{self, MemFs};
//! use cliboot::Context;
//!
//! let files = MemFs::new().with_file("greeting.txt", "hello");
//! let ctx = fileutils::apply_root_dir(&Context::background(), Arc::new(files));
//!
//! let fs = fileutils::root_dir_from_context(&ctx);
//! assert_eq!(b"hello".to_vec(), fs.read(Path::new("greeting.txt")).unwrap());
//! ```

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::fs::File;
use std::io::{Cursor, Error as IoError, ErrorKind, Read, Result as IoResult};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::trace;

use crate::context::Context;
use crate::utils;

/// Read access to a tree of files.
pub trait FileSystem: Send + Sync {
    /// Opens a file for reading.
    fn open(&self, path: &Path) -> IoResult<Box<dyn Read + Send>>;

    /// Checks if there's a file on the path.
    fn exists(&self, path: &Path) -> bool;

    /// Reads the whole file.
    fn read(&self, path: &Path) -> IoResult<Vec<u8>> {
        let mut content = Vec::new();
        self.open(path)?.read_to_end(&mut content)?;
        Ok(content)
    }
}

/// The files under one directory on the disk.
///
/// Paths are relative to the root. Absolute paths and paths climbing above the root (with `..`)
/// are refused.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    /// Creates the handle. The root is made absolute right away.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirFs {
            root: utils::absolute_path(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> IoResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => (),
                _ => {
                    return Err(IoError::new(
                        ErrorKind::InvalidInput,
                        format!("Path {:?} escapes the root directory", path),
                    ));
                }
            }
        }
        Ok(resolved)
    }
}

impl FileSystem for DirFs {
    fn open(&self, path: &Path) -> IoResult<Box<dyn Read + Send>> {
        let resolved = self.resolve(path)?;
        trace!("Opening {:?}", resolved);
        Ok(Box::new(File::open(resolved)?))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// An in-memory set of files.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct MemFs {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file.
    pub fn with_file<P: Into<PathBuf>, C: Into<Vec<u8>>>(mut self, path: P, content: C) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert<P: Into<PathBuf>, C: Into<Vec<u8>>>(&mut self, path: P, content: C) {
        self.files.insert(path.into(), content.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileSystem for MemFs {
    fn open(&self, path: &Path) -> IoResult<Box<dyn Read + Send>> {
        match self.files.get(path) {
            Some(content) => Ok(Box::new(Cursor::new(content.clone()))),
            None => Err(IoError::new(
                ErrorKind::NotFound,
                format!("File {:?} not found", path),
            )),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

impl Debug for MemFs {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let mut paths = self.files.keys().collect::<Vec<_>>();
        paths.sort();
        fmt.debug_tuple("MemFs").field(&paths).finish()
    }
}

#[derive(Clone)]
struct RootDir(Arc<dyn FileSystem>);

/// Stores the filesystem handle in the context.
///
/// Applying another one later shadows this one.
pub fn apply_root_dir(ctx: &Context, fs: Arc<dyn FileSystem>) -> Context {
    ctx.with_value(RootDir(fs))
}

/// Retrieves the filesystem handle from the context, if there's one.
pub fn try_root_dir_from_context(ctx: &Context) -> Option<Arc<dyn FileSystem>> {
    ctx.get::<RootDir>().map(|root| Arc::clone(&root.0))
}

/// Retrieves the filesystem handle from the context.
///
/// # Panics
///
/// If no handle was stored. The code path leading here is broken.
pub fn root_dir_from_context(ctx: &Context) -> Arc<dyn FileSystem> {
    match try_root_dir_from_context(ctx) {
        Some(fs) => fs,
        None => panic!("No root dir found in context, bad code path"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    struct Other(&'static str);

    fn mem(path: &str, content: &str) -> Arc<dyn FileSystem> {
        Arc::new(MemFs::new().with_file(path, content))
    }

    #[test]
    fn read_through_context() {
        let ctx = apply_root_dir(&Context::background(), mem("test.txt", "test content"));
        let fs = root_dir_from_context(&ctx);
        assert!(fs.exists(Path::new("test.txt")));
        assert_eq!(b"test content".to_vec(), fs.read(Path::new("test.txt")).unwrap());
        let err = fs.read(Path::new("missing.txt")).unwrap_err();
        assert_eq!(ErrorKind::NotFound, err.kind());
    }

    #[test]
    #[should_panic(expected = "No root dir found in context")]
    fn missing_panics() {
        root_dir_from_context(&Context::background().with_value(Other("wrong key")));
    }

    #[test]
    fn isolation() {
        let ctx1 = apply_root_dir(&Context::background(), mem("file1.txt", "content1"));
        let ctx2 = apply_root_dir(&Context::background(), mem("file2.txt", "content2"));
        let fs1 = root_dir_from_context(&ctx1);
        let fs2 = root_dir_from_context(&ctx2);
        assert!(fs1.exists(Path::new("file1.txt")));
        assert!(!fs1.exists(Path::new("file2.txt")));
        assert!(fs2.exists(Path::new("file2.txt")));
        assert!(!fs2.exists(Path::new("file1.txt")));
    }

    #[test]
    fn chaining_and_overwrite() {
        let ctx = Context::background().with_value(Other("otherValue"));
        let ctx = apply_root_dir(&ctx, mem("first.txt", "first"));
        let ctx = apply_root_dir(&ctx, mem("second.txt", "second"));
        let fs = root_dir_from_context(&ctx);
        assert!(fs.exists(Path::new("second.txt")));
        assert!(!fs.exists(Path::new("first.txt")));
        assert_eq!("otherValue", ctx.get::<Other>().unwrap().0);
    }

    #[test]
    fn dir_fs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("file.txt"), "on disk").unwrap();

        let root = DirFs::new(dir.path());
        assert!(root.root().is_absolute());
        assert!(root.exists(Path::new("sub/file.txt")));
        assert!(root.exists(Path::new("./sub/file.txt")));
        assert!(!root.exists(Path::new("sub")));
        assert_eq!(b"on disk".to_vec(), root.read(Path::new("sub/file.txt")).unwrap());

        let err = root.read(Path::new("../escape.txt")).unwrap_err();
        assert_eq!(ErrorKind::InvalidInput, err.kind());
        let err = root.open(&dir.path().join("sub/file.txt")).err().unwrap();
        assert_eq!(ErrorKind::InvalidInput, err.kind());
    }

    #[test]
    fn mem_fs_debug() {
        let files = MemFs::new().with_file("b", "").with_file("a", "");
        assert_eq!(2, files.len());
        assert_eq!(r#"MemFs(["a", "b"])"#, format!("{:?}", files));
    }
}
