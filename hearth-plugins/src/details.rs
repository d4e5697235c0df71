//! ## hearth-plugins::details
//! **Plugin identity derived from the canonical library path**

use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identity of a loaded plugin: BLAKE3 of the canonical path,
/// truncated to 64 bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(u64);

impl PluginId {
    pub fn from_path(canonical: &Path) -> Self {
        let hash = blake3::hash(canonical.as_os_str().as_encoded_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        PluginId(u64::from_le_bytes(bytes))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

impl fmt::Debug for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginId({self})")
    }
}

/// Immutable facts about a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDetails {
    pub id: PluginId,
    /// File stem without the platform `lib` prefix.
    pub name: String,
    /// Canonical path of the library.
    pub path: PathBuf,
    /// Extension, without the dot. Empty if the file has none.
    pub ext: String,
}

impl PluginDetails {
    /// `canonical` must already be canonicalized.
    pub fn from_path(canonical: PathBuf) -> Self {
        let stem = canonical
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match stem.strip_prefix("lib") {
            Some(rest) if !rest.is_empty() => rest.to_string(),
            _ => stem,
        };
        let ext = canonical
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: PluginId::from_path(&canonical),
            name,
            path: canonical,
            ext,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_split_path() {
        let details = PluginDetails::from_path(PathBuf::from("/opt/hearth/libping_plugin.so"));
        assert_eq!(details.name, "ping_plugin");
        assert_eq!(details.ext, "so");
        assert_eq!(details.id, PluginId::from_path(Path::new("/opt/hearth/libping_plugin.so")));

        let bare = PluginDetails::from_path(PathBuf::from("/opt/hearth/lib"));
        assert_eq!(bare.name, "lib");
        assert_eq!(bare.ext, "");
    }

    #[test]
    fn id_depends_on_path_only() {
        let a = PluginId::from_path(Path::new("/a/libx.so"));
        let b = PluginId::from_path(Path::new("/b/libx.so"));
        assert_ne!(a, b);
        assert_eq!(a, PluginId::from_path(Path::new("/a/libx.so")));
        assert_eq!(a.to_string().len(), 16);
    }
}
