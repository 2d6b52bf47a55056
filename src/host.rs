use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

/// Lists the network interfaces present on the host
pub trait InterfaceLister: Send + Sync {
    fn interfaces(&self) -> io::Result<BTreeSet<String>>;
}

/// Reads interface names from sysfs
#[derive(Debug, Clone)]
pub struct SysfsInterfaces {
    root: PathBuf,
}

impl SysfsInterfaces {
    pub fn new() -> Self {
        Self::with_root("/sys/class/net")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsInterfaces {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceLister for SysfsInterfaces {
    fn interfaces(&self) -> io::Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(&self.root)? {
            names.insert(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

/// Fixed interface set for tests and simulations
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces(pub BTreeSet<String>);

impl StaticInterfaces {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl InterfaceLister for StaticInterfaces {
    fn interfaces(&self) -> io::Result<BTreeSet<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sysfs_lists_directory_entries() {
        let dir = TempDir::new().unwrap();
        for name in ["lo", "eth0", "br-monitoring"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }

        let names = SysfsInterfaces::with_root(dir.path()).interfaces().unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["br-monitoring", "eth0", "lo"]
        );
    }

    #[test]
    fn test_sysfs_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let lister = SysfsInterfaces::with_root(dir.path().join("absent"));
        assert!(lister.interfaces().is_err());
    }

    #[test]
    fn test_static_interfaces() {
        let lister = StaticInterfaces::new(["eth0", "br-monitoring"]);
        assert!(lister.interfaces().unwrap().contains("br-monitoring"));
    }
}
