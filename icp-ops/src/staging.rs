use std::{
    env, fs,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::errors::{Error, Result};

/// Default staging directory name, relative to the current working directory.
pub const DEFAULT_DIR_NAME: &str = "staging";

/// Working directory for rendered command files and the objects
/// materialized for kubectl "-f".
#[derive(Debug)]
pub enum Staging {
    /// Kept after the run; a stale directory from a previous run is reused.
    Fixed(PathBuf),
    /// Created fresh for this run and removed on drop.
    Temporary(TempDir),
}

impl Staging {
    pub fn fixed(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            log::info!("creating staging dir '{}'", dir.display());
            fs::create_dir_all(&dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
        }
        Ok(Staging::Fixed(dir))
    }

    /// "./staging" under the current working directory.
    pub fn default_dir() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| Error::io(".", e))?;
        Self::fixed(cwd.join(DEFAULT_DIR_NAME))
    }

    pub fn temporary() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("icp-staging-")
            .tempdir()
            .map_err(|e| Error::io(env::temp_dir().display().to_string(), e))?;
        log::info!("created temporary staging dir '{}'", dir.path().display());
        Ok(Staging::Temporary(dir))
    }

    pub fn path(&self) -> &Path {
        match self {
            Staging::Fixed(p) => p.as_path(),
            Staging::Temporary(d) => d.path(),
        }
    }

    /// Path of the rendered command file for a template,
    /// "<staging>/<template-root>-command.<ext>".
    /// e.g., "cmds/01-load.yaml" becomes "<staging>/01-load-command.yaml".
    pub fn command_file_path(&self, template_path: &Path) -> PathBuf {
        let root = template_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_name = match template_path.extension() {
            Some(ext) => format!("{}-command.{}", root, ext.to_string_lossy()),
            None => format!("{}-command", root),
        };
        self.path().join(file_name)
    }
}

#[test]
fn test_staging() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let dir = tmp_dir.path().join("staging");

    let s = Staging::fixed(&dir).unwrap();
    assert!(dir.exists());
    assert_eq!(
        s.command_file_path(Path::new("/opt/cmds/01-load.yaml")),
        dir.join("01-load-command.yaml")
    );
    assert_eq!(
        s.command_file_path(Path::new("README")),
        dir.join("README-command")
    );
    drop(s);
    assert!(dir.exists());

    let s = Staging::temporary().unwrap();
    let p = s.path().to_path_buf();
    assert!(p.exists());
    drop(s);
    assert!(!p.exists());
}
