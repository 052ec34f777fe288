//! Decoding structured data into typed values.
//!
//! Each supported format is behind a cargo feature of the same name (`json`, `yaml`,
//! `toml-format`); all of them are on by default. The errors tell where in the document the
//! decoding failed.
//!
//! # Examples
//!
//! ```rust
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, Eq, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! let person: Person = cliboot::load::from_yaml("name: Ada\nage: 42\n".as_bytes()).unwrap();
//! assert_eq!(Person { name: "Ada".to_owned(), age: 42 }, person);
//! ```

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::{Error as IoError, Read};
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;

use crate::fileutils::FileSystem;

/// Decoding failed.
#[derive(Debug)]
#[non_exhaustive]
pub enum LoadError {
    /// The data couldn't be read.
    Io(IoError),
    #[cfg(feature = "json")]
    Json(serde_path_to_error::Error<serde_json::Error>),
    #[cfg(feature = "yaml")]
    Yaml(serde_path_to_error::Error<serde_yaml::Error>),
    #[cfg(feature = "toml-format")]
    Toml(serde_path_to_error::Error<toml::de::Error>),
    /// The file extension doesn't correspond to any supported format.
    UnknownFormat(PathBuf),
}

impl Display for LoadError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            LoadError::Io(_) => write!(fmt, "Failed to read the data"),
            #[cfg(feature = "json")]
            LoadError::Json(e) => write!(fmt, "Invalid JSON at {}", e.path()),
            #[cfg(feature = "yaml")]
            LoadError::Yaml(e) => write!(fmt, "Invalid YAML at {}", e.path()),
            #[cfg(feature = "toml-format")]
            LoadError::Toml(e) => write!(fmt, "Invalid TOML at {}", e.path()),
            LoadError::UnknownFormat(path) => {
                write!(fmt, "Don't know how to decode {}", path.display())
            }
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            #[cfg(feature = "json")]
            LoadError::Json(e) => Some(e.inner()),
            #[cfg(feature = "yaml")]
            LoadError::Yaml(e) => Some(e.inner()),
            #[cfg(feature = "toml-format")]
            LoadError::Toml(e) => Some(e.inner()),
            LoadError::UnknownFormat(_) => None,
        }
    }
}

impl From<IoError> for LoadError {
    fn from(e: IoError) -> Self {
        LoadError::Io(e)
    }
}

/// Decodes a JSON document.
#[cfg(feature = "json")]
pub fn from_json<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, LoadError> {
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    serde_path_to_error::deserialize(&mut deserializer).map_err(LoadError::Json)
}

/// Decodes a YAML document.
#[cfg(feature = "yaml")]
pub fn from_yaml<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, LoadError> {
    let deserializer = serde_yaml::Deserializer::from_reader(reader);
    serde_path_to_error::deserialize(deserializer).map_err(LoadError::Yaml)
}

/// Decodes a TOML document.
#[cfg(feature = "toml-format")]
pub fn from_toml<T: DeserializeOwned, R: Read>(mut reader: R) -> Result<T, LoadError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    let mut deserializer = toml::Deserializer::new(&content);
    serde_path_to_error::deserialize(&mut deserializer).map_err(LoadError::Toml)
}

/// Reads a file and decodes it according to its extension.
///
/// Recognized extensions are `json`, `yaml`, `yml` and `toml` (as long as the corresponding
/// feature is enabled).
pub fn from_path<T: DeserializeOwned>(fs: &dyn FileSystem, path: &Path) -> Result<T, LoadError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    debug!("Loading {} as {:?}", path.display(), ext);
    match ext.as_deref() {
        #[cfg(feature = "json")]
        Some("json") => from_json(fs.open(path)?),
        #[cfg(feature = "yaml")]
        Some("yaml") | Some("yml") => from_yaml(fs.open(path)?),
        #[cfg(feature = "toml-format")]
        Some("toml") => from_toml(fs.open(path)?),
        _ => Err(LoadError::UnknownFormat(path.to_owned())),
    }
}
