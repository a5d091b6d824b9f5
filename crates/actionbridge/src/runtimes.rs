// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-language runtime profiles.
//!
//! A profile knows which image runs an action kind locally, where its
//! debugger listens, how entry files are named and how to build the `/init`
//! payload that loads mounted source on every run.

use actionbridge_client::ActionExec;
use serde_json::{Value, json};

use crate::error::{BridgeError, Result};
use crate::mount::{CONTAINER_ROOT, MountDescriptor, MountLayout};

/// Language family of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFamily {
    /// `nodejs:*`
    Node,
    /// `python:*`
    Python,
    /// Unknown kind with an explicit image.
    Custom,
}

/// How to run one action kind locally.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeProfile {
    /// Action kind, e.g. `nodejs:18`.
    pub kind: String,
    /// Language family.
    pub family: RuntimeFamily,
    /// Container image.
    pub image: String,
    /// Debugger port inside the container.
    pub debug_port: u16,
    /// Entry file names tried when a directory is mounted.
    pub entry_candidates: &'static [&'static str],
    /// Whether the require-style package layout applies.
    pub supports_packaged: bool,
}

const NODE_ENTRIES: &[&str] = &["index.js", "main.js", "action.js"];
const PYTHON_ENTRIES: &[&str] = &["__main__.py", "main.py"];

const DEFAULT_NODE_VERSION: &str = "20";

/// Resolve the profile for an action kind.
///
/// `image` overrides the profile's image; for unknown kinds it is required.
pub fn profile_for(kind: &str, image: Option<&str>) -> Result<RuntimeProfile> {
    let (family, version) = match kind.split_once(':') {
        Some(("nodejs", version)) => (RuntimeFamily::Node, version),
        Some(("python", version)) => (RuntimeFamily::Python, version),
        _ if image.is_some() => (RuntimeFamily::Custom, ""),
        _ => return Err(BridgeError::UnsupportedRuntime(kind.to_string())),
    };

    let profile = match family {
        RuntimeFamily::Node => {
            let version = match version {
                "default" | "" => DEFAULT_NODE_VERSION,
                v => v,
            };
            RuntimeProfile {
                kind: kind.to_string(),
                family,
                image: format!("openwhisk/action-nodejs-v{}", version),
                debug_port: 9229,
                entry_candidates: NODE_ENTRIES,
                supports_packaged: true,
            }
        }
        RuntimeFamily::Python => {
            let image = match version {
                "3" | "default" | "" => "openwhisk/python3action".to_string(),
                v => format!("openwhisk/action-python-v{}", v),
            };
            RuntimeProfile {
                kind: kind.to_string(),
                family,
                image,
                debug_port: 5678,
                entry_candidates: PYTHON_ENTRIES,
                supports_packaged: false,
            }
        }
        RuntimeFamily::Custom => RuntimeProfile {
            kind: kind.to_string(),
            family,
            image: String::new(),
            debug_port: 9229,
            entry_candidates: &[],
            supports_packaged: false,
        },
    };

    Ok(match image {
        Some(image) => RuntimeProfile {
            image: image.to_string(),
            ..profile
        },
        None => profile,
    })
}

impl RuntimeProfile {
    /// Command override that starts the runtime with its debugger enabled.
    ///
    /// `None` keeps the image's own command.
    pub fn debug_command(&self) -> Option<Vec<String>> {
        match self.family {
            RuntimeFamily::Node => Some(
                [
                    "node",
                    "--expose-gc",
                    &format!("--inspect=0.0.0.0:{}", self.debug_port),
                    "app.js",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ),
            RuntimeFamily::Python | RuntimeFamily::Custom => None,
        }
    }

    /// `/init` payload that loads the mounted entry on every run.
    pub fn init_for_mount(
        &self,
        action_name: &str,
        main: &str,
        mount: &MountDescriptor,
    ) -> Result<Value> {
        let entry = mount.entry_in_container();
        let code = match (self.family, mount.layout) {
            (RuntimeFamily::Node, MountLayout::Packaged) => node_require_loader(&entry, main),
            (RuntimeFamily::Node, _) => node_script_loader(&entry, main),
            (RuntimeFamily::Python, _) => python_loader(&entry, main, self.debug_port),
            (RuntimeFamily::Custom, _) => {
                return Err(BridgeError::UnsupportedRuntime(format!(
                    "{} (local source cannot be mounted into a custom image)",
                    self.kind
                )));
            }
        };

        Ok(json!({
            "value": {
                "name": action_name,
                "main": "main",
                "code": code,
                "binary": false,
            }
        }))
    }

    /// `/init` payload for the deployed code itself.
    pub fn init_inline(&self, action_name: &str, exec: &ActionExec) -> Value {
        json!({
            "value": {
                "name": action_name,
                "main": exec.main.as_deref().unwrap_or("main"),
                "code": exec.code.as_deref().unwrap_or_default(),
                "binary": exec.binary,
            }
        })
    }
}

/// Compiles a plain action script on every run so edits apply immediately.
///
/// The script is compiled under its mounted path so debugger breakpoints and
/// stack frames refer to the real file. The module wrapper keeps the first
/// line in place; the export shim is appended after the last line.
fn node_script_loader(entry: &str, main: &str) -> String {
    format!(
        r#"const fs = require('fs');
const path = require('path');
const vm = require('vm');
const Module = require('module');

function main(params) {{
    const file = {entry:?};
    const source = fs.readFileSync(file, 'utf8') +
        '\n;if (typeof {main} === "function" && !module.exports.{main}) module.exports.{main} = {main};';
    const wrapper = new vm.Script(Module.wrap(source), {{ filename: file }}).runInThisContext();
    const mod = {{ exports: {{}} }};
    wrapper.call(mod.exports, mod.exports, Module.createRequire(file), mod, file, path.dirname(file));
    const entry = typeof mod.exports === 'function' ? mod.exports : mod.exports.{main};
    return entry(params);
}}
"#,
    )
}

/// Requires the mounted package on every run, dropping cached modules first.
fn node_require_loader(entry: &str, main: &str) -> String {
    format!(
        r#"function main(params) {{
    const root = {root:?};
    Object.keys(require.cache)
        .filter((k) => k.startsWith(root))
        .forEach((k) => delete require.cache[k]);
    const mod = require({entry:?});
    const entry = typeof mod === 'function' ? mod : mod.{main};
    return entry(params);
}}
"#,
        root = format!("{}/", CONTAINER_ROOT),
    )
}

/// Imports the mounted file through importlib on every run.
fn python_loader(entry: &str, main: &str, debug_port: u16) -> String {
    format!(
        r#"import importlib.util
import os
import sys

try:
    import debugpy
    debugpy.listen(("0.0.0.0", {debug_port}))
except Exception:
    pass


def main(args):
    path = {entry:?}
    folder = os.path.dirname(path)
    if folder not in sys.path:
        sys.path.insert(0, folder)
    spec = importlib.util.spec_from_file_location("actionbridge_entry", path)
    module = importlib.util.module_from_spec(spec)
    spec.loader.exec_module(module)
    return getattr(module, {main:?})(args)
"#,
    )
}
