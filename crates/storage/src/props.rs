//! Revision/transaction property hashes. Spec.md treats the node-revision
//! serializer as an external collaborator; properties are a simpler opaque
//! hash this crate owns directly, serialized with `bincode` the way the
//! teacher codebase serializes its own on-disk records.

use fsfs_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A property hash: string keys to opaque byte values (properties may be
/// binary, e.g. `svn:entry:committed-date` vs. arbitrary user props).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropHash(pub BTreeMap<String, Vec<u8>>);

impl PropHash {
    pub fn new() -> Self {
        PropHash::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(|v| v.as_slice())
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        self.set(key, value.as_ref().as_bytes().to_vec());
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

pub fn write(path: &Path, props: &PropHash) -> Result<()> {
    let bytes = bincode::serialize(props).map_err(|e| fsfs_core::Error::corrupt(e.to_string()))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn read(path: &Path) -> Result<PropHash> {
    match std::fs::read(path) {
        Ok(bytes) => bincode::deserialize(&bytes).map_err(|e| fsfs_core::Error::corrupt(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PropHash::new()),
        Err(e) => Err(e.into()),
    }
}
