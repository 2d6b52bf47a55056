use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes a timestamped copy of the firewall state before changes
#[derive(Debug, Clone)]
pub struct BackupWriter {
    dir: PathBuf,
}

impl BackupWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write both listings into `ufw-rules-<timestamp>.txt`
    pub fn write(&self, numbered: &str, verbose: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let now = Utc::now();
        let path = self
            .dir
            .join(format!("ufw-rules-{}.txt", now.format("%Y%m%dT%H%M%S%.3fZ")));

        let contents = format!(
            "# netwarden backup {}\n\n## ufw status numbered\n{}\n## ufw status verbose\n{}",
            now.to_rfc3339(),
            numbered,
            verbose
        );
        std::fs::write(&path, contents)?;

        info!(path = %path.display(), "Wrote firewall backup");
        Ok(path)
    }
}
