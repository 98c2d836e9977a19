//! Exported method registration.
//!
//! Each runner is advertised once per configured label, under the
//! label-qualified name `<label>.<runner>`. A master addresses the agent by
//! one of these names, which lets it target platform capabilities ("linux",
//! "gpu", ...) without knowing individual agents.

use std::collections::BTreeMap;
use std::sync::Arc;

use bosun_core::{ScriptRunner, ShellRunner};
use tracing::info;

/// Table of exported build methods.
pub struct ServiceMap {
    methods: BTreeMap<String, Arc<dyn ScriptRunner>>,
}

impl ServiceMap {
    pub fn new(labels: &[String], runners: Vec<Arc<dyn ScriptRunner>>) -> Self {
        let mut methods = BTreeMap::new();
        for runner in &runners {
            for label in labels {
                let method = format!("{label}.{}", runner.name());
                info!("--> method {method} exported");
                methods.insert(method, Arc::clone(runner));
            }
        }
        ServiceMap { methods }
    }

    /// Exported method names, in stable order.
    pub fn methods(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    pub fn runner_for(&self, method: &str) -> Option<Arc<dyn ScriptRunner>> {
        self.methods.get(method).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// The runners available on this platform.
///
/// The shell runner is always present; platform-specific runners (the
/// original deployment shipped a PowerShell one on Windows) register here.
pub fn platform_runners() -> Vec<Arc<dyn ScriptRunner>> {
    vec![Arc::new(ShellRunner::default())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn methods_are_label_qualified() {
        let map = ServiceMap::new(&labels(&["linux", "fast"]), platform_runners());
        assert_eq!(map.methods(), vec!["fast.shell", "linux.shell"]);
    }

    #[test]
    fn lookup_finds_registered_methods_only() {
        let map = ServiceMap::new(&labels(&["linux"]), platform_runners());
        assert!(map.runner_for("linux.shell").is_some());
        assert!(map.runner_for("windows.shell").is_none());
        assert!(map.runner_for("shell").is_none());
    }

    #[test]
    fn no_labels_means_no_methods() {
        let map = ServiceMap::new(&[], platform_runners());
        assert!(map.is_empty());
    }
}
