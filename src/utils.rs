//! Various utilities.
//!
//! All the little things that are useful through the library or user's code, and don't really fit
//! anywhere else.

use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{Result as IoResult, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

/// Turns a path into an absolute one.
///
/// Relative paths are resolved against the current directory and canonicalized if possible, so
/// changing the current directory later on doesn't make them point elsewhere. The function never
/// fails, a step that can't be done is skipped.
pub fn absolute_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let mut absolute = if path.is_absolute() {
        PathBuf::new()
    } else {
        env::current_dir().unwrap_or_else(|e| {
            warn!("Path {:?} can't be made absolute: {}", path, e);
            PathBuf::new()
        })
    };
    absolute.push(path);
    absolute.canonicalize().unwrap_or(absolute)
}

/// An in-memory output sink that can be cloned.
///
/// All the clones write into the same buffer. This is handy to capture what the application
/// writes to its outputs (see [`Cli::set_output`][crate::Cli::set_output]), for example in
/// tests.
///
/// # Examples
///
/// ```rust
/// use std::io::Write;
///
/// use cliboot::utils::SharedBuffer;
///
/// let buffer = SharedBuffer::new();
/// let mut writer = buffer.clone();
/// write!(writer, "hello").unwrap();
/// assert_eq!("hello", buffer.contents());
/// ```
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A (lossy) textual copy of what was written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Takes the content out, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Debug for SharedBuffer {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "SharedBuffer({} bytes)", self.0.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs() {
        let current = env::current_dir().unwrap();
        let parent = absolute_path("..");
        assert!(parent.is_absolute());
        assert!(current.starts_with(parent));

        let child = absolute_path("this-likely-doesn't-exist");
        assert!(child.is_absolute());
        assert!(child.starts_with(current));
    }

    #[test]
    fn shared_buffer() {
        let buffer = SharedBuffer::new();
        let mut w1 = buffer.clone();
        let mut w2 = buffer.clone();
        w1.write_all(b"one ").unwrap();
        w2.write_all(b"two").unwrap();
        assert_eq!("one two", buffer.contents());
        assert_eq!(b"one two".to_vec(), buffer.take());
        assert!(buffer.contents().is_empty());
        assert_eq!("SharedBuffer(0 bytes)", format!("{:?}", buffer));
    }
}
