//! Static execution policy, expressed as data.
//!
//! The policy is two deny-sets: import roots and bare-name call targets.
//! Everything not listed is allowed - this is defense-in-depth against
//! obviously dangerous APIs, not a capability sandbox. Both sets are plain
//! serde data so deployments can extend them from configuration without an
//! engine change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Import roots denied by default: operating-system, process, filesystem,
/// networking, and archive modules.
const DENIED_MODULES: &[&str] = &[
    "bz2",
    "ftplib",
    "glob",
    "gzip",
    "http",
    "lzma",
    "multiprocessing",
    "os",
    "pathlib",
    "shutil",
    "socket",
    "ssl",
    "subprocess",
    "sys",
    "tarfile",
    "tempfile",
    "urllib",
    "zipfile",
];

/// Builtins denied as direct call targets: dynamic execution, raw file
/// access, and dynamic import.
const DENIED_BUILTINS: &[&str] = &["__import__", "compile", "eval", "exec", "open"];

/// Deny-sets the analyzer enforces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DenyPolicy {
    /// Top-level module names rejected in `import` / `from … import`.
    pub denied_modules: BTreeSet<String>,

    /// Bare names rejected as direct call targets.
    pub denied_builtins: BTreeSet<String>,
}

impl Default for DenyPolicy {
    fn default() -> Self {
        Self {
            denied_modules: DENIED_MODULES.iter().map(|s| s.to_string()).collect(),
            denied_builtins: DENIED_BUILTINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DenyPolicy {
    /// Whether `root` (the first dotted segment of an import) is denied.
    pub fn denies_module(&self, root: &str) -> bool {
        self.denied_modules.contains(root)
    }

    /// Whether `name` is denied as a direct call target.
    pub fn denies_call(&self, name: &str) -> bool {
        self.denied_builtins.contains(name)
    }
}
