// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Source mount resolution.
//!
//! Decides how local source maps into the container, from path structure
//! only:
//!
//! | Source | Layout |
//! |--------|--------|
//! | a file | `Flat`, its directory mounted |
//! | a directory with the entry at its root | `Flat` |
//! | a directory with the entry one level down | `Nested` |
//! | `packaged` requested | `Packaged` (require-style, Node.js only) |
//!
//! The mount root always lands at [`CONTAINER_ROOT`], so relative requires
//! resolve the same way they do in the platform's unpacked archive.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::runtimes::RuntimeProfile;

/// Where the mounted source appears inside the container.
pub const CONTAINER_ROOT: &str = "/code";

/// How the entry file is presented to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountLayout {
    /// Entry file directly at the mount root, loaded as a script.
    Flat,
    /// Entry file one or more levels below the mount root.
    Nested,
    /// Entry loaded through `require` as an installed package.
    Packaged,
}

/// Resolved mapping of local source into the container.
#[derive(Debug, Clone, PartialEq)]
pub struct MountDescriptor {
    /// Host directory bind-mounted at [`CONTAINER_ROOT`].
    pub host_path: PathBuf,
    /// Entry file relative to `host_path`.
    pub entry: PathBuf,
    /// Layout.
    pub layout: MountLayout,
}

impl MountDescriptor {
    /// Absolute entry path inside the container.
    pub fn entry_in_container(&self) -> String {
        let relative: Vec<String> = self
            .entry
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        format!("{}/{}", CONTAINER_ROOT, relative.join("/"))
    }

    /// Directory the change watcher observes.
    pub fn watch_root(&self) -> &Path {
        &self.host_path
    }
}

#[derive(Deserialize)]
struct PackageJson {
    main: Option<String>,
}

/// Resolves a local source path against a runtime profile.
#[derive(Debug, Clone, Default)]
pub struct SourceMountResolver {
    /// Explicit entry file relative to a source directory.
    pub entry: Option<String>,
    /// Whether to present the source as a require-style package.
    pub packaged: bool,
}

impl SourceMountResolver {
    /// Create a resolver.
    pub fn new(entry: Option<String>, packaged: bool) -> Self {
        Self { entry, packaged }
    }

    /// Resolve `source` for `profile`.
    pub fn resolve(&self, source: &Path, profile: &RuntimeProfile) -> Result<MountDescriptor> {
        let source = source.canonicalize().map_err(|e| {
            BridgeError::UnsupportedLayout(format!("{}: {}", source.display(), e))
        })?;

        let descriptor = if self.packaged {
            self.resolve_packaged(&source, profile)?
        } else if source.is_file() {
            flat_file(&source)?
        } else {
            self.resolve_directory(&source, profile)?
        };

        debug!(
            host_path = %descriptor.host_path.display(),
            entry = %descriptor.entry.display(),
            layout = ?descriptor.layout,
            "Resolved source mount"
        );
        Ok(descriptor)
    }

    fn resolve_packaged(&self, source: &Path, profile: &RuntimeProfile) -> Result<MountDescriptor> {
        if !profile.supports_packaged {
            return Err(BridgeError::UnsupportedLayout(format!(
                "packaged layout is not available for {}",
                profile.kind
            )));
        }

        let (root, entry) = if source.is_file() {
            let mount = flat_file(source)?;
            (mount.host_path, mount.entry)
        } else {
            let entry = match &self.entry {
                Some(entry) => PathBuf::from(entry),
                None => package_main(source)?.unwrap_or_else(|| PathBuf::from("index.js")),
            };
            (source.to_path_buf(), entry)
        };

        let entry = contained_entry(&root, &entry)?;

        Ok(MountDescriptor {
            host_path: root,
            entry,
            layout: MountLayout::Packaged,
        })
    }

    fn resolve_directory(&self, dir: &Path, profile: &RuntimeProfile) -> Result<MountDescriptor> {
        if let Some(entry) = &self.entry {
            let entry = contained_entry(dir, Path::new(entry))?;
            let layout = if entry.components().count() > 1 {
                MountLayout::Nested
            } else {
                MountLayout::Flat
            };
            return Ok(MountDescriptor {
                host_path: dir.to_path_buf(),
                entry,
                layout,
            });
        }

        if let Some(entry) = find_entry(dir, profile.entry_candidates) {
            return Ok(MountDescriptor {
                host_path: dir.to_path_buf(),
                entry: PathBuf::from(entry),
                layout: MountLayout::Flat,
            });
        }

        for sub in subdirectories(dir)? {
            if let Some(entry) = find_entry(&dir.join(&sub), profile.entry_candidates) {
                return Ok(MountDescriptor {
                    host_path: dir.to_path_buf(),
                    entry: Path::new(&sub).join(entry),
                    layout: MountLayout::Nested,
                });
            }
        }

        Err(BridgeError::UnsupportedLayout(format!(
            "no entry file ({}) found in {} or one level below",
            profile.entry_candidates.join(", "),
            dir.display()
        )))
    }
}

/// Locate `entry` under `root`, returning it relative to `root`.
///
/// Entries that resolve outside `root` (through `..` or a symlink) cannot be
/// reached from the container mount and are rejected.
fn contained_entry(root: &Path, entry: &Path) -> Result<PathBuf> {
    let resolved = root
        .join(entry)
        .canonicalize()
        .ok()
        .filter(|p| p.is_file())
        .ok_or_else(|| {
            BridgeError::UnsupportedLayout(format!(
                "entry {} not found in {}",
                entry.display(),
                root.display()
            ))
        })?;

    match resolved.strip_prefix(root) {
        Ok(relative) => Ok(relative.to_path_buf()),
        Err(_) => Err(BridgeError::UnsupportedLayout(format!(
            "entry {} resolves outside {}",
            entry.display(),
            root.display()
        ))),
    }
}

fn flat_file(file: &Path) -> Result<MountDescriptor> {
    let (Some(parent), Some(name)) = (file.parent(), file.file_name()) else {
        return Err(BridgeError::UnsupportedLayout(format!(
            "{} has no parent directory",
            file.display()
        )));
    };
    Ok(MountDescriptor {
        host_path: parent.to_path_buf(),
        entry: PathBuf::from(name),
        layout: MountLayout::Flat,
    })
}

fn find_entry(dir: &Path, candidates: &[&'static str]) -> Option<&'static str> {
    candidates
        .iter()
        .copied()
        .find(|candidate| dir.join(candidate).is_file())
}

/// Visible subdirectories, sorted so resolution is deterministic.
fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| BridgeError::UnsupportedLayout(format!("{}: {}", dir.display(), e)))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.') && name != "node_modules")
        .collect();
    names.sort();
    Ok(names)
}

fn package_main(dir: &Path) -> Result<Option<PathBuf>> {
    let manifest = dir.join("package.json");
    if !manifest.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&manifest)
        .map_err(|e| BridgeError::UnsupportedLayout(format!("{}: {}", manifest.display(), e)))?;
    let package: PackageJson = serde_json::from_str(&raw)
        .map_err(|e| BridgeError::UnsupportedLayout(format!("{}: {}", manifest.display(), e)))?;
    Ok(package.main.map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_in_container() {
        let mount = MountDescriptor {
            host_path: PathBuf::from("/src"),
            entry: PathBuf::from("lib/index.js"),
            layout: MountLayout::Nested,
        };
        assert_eq!(mount.entry_in_container(), "/code/lib/index.js");

        let dotted = MountDescriptor {
            entry: PathBuf::from("./index.js"),
            ..mount
        };
        assert_eq!(dotted.entry_in_container(), "/code/index.js");
    }
}
