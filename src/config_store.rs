//! Directory bookkeeping for imported OpenVPN config files.

use crate::app_dirs;
use crate::config::{parse_config, ConfigFileRecord, SupervisorError};
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions accepted for import.
const CONFIG_EXTENSIONS: [&str; 2] = ["ovpn", "conf"];

/// Manages the directory of imported config files.
///
/// Records are plain file copies named by their original base name; importing
/// a file whose name already exists overwrites the previous copy.
pub struct ConfigStore {
  dir: PathBuf,
}

impl Default for ConfigStore {
  fn default() -> Self {
    Self::new()
  }
}

impl ConfigStore {
  /// Store rooted in the application data area.
  pub fn new() -> Self {
    Self::with_dir(app_dirs::configs_dir())
  }

  /// Store rooted in an explicit directory.
  pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  /// The directory records live in.
  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Copy the given files into the store.
  ///
  /// Each file must carry a recognized extension and parse as an OpenVPN
  /// client config; the first failure aborts the import.
  pub fn import(&self, paths: &[PathBuf]) -> Result<Vec<ConfigFileRecord>, SupervisorError> {
    fs::create_dir_all(&self.dir)?;

    let mut records = Vec::with_capacity(paths.len());
    for source in paths {
      let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
          SupervisorError::InvalidConfig(format!("unusable file name: {}", source.display()))
        })?;

      let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
      if !CONFIG_EXTENSIONS.contains(&extension) {
        return Err(SupervisorError::InvalidConfig(format!(
          "unsupported extension: {name}"
        )));
      }

      let content = fs::read_to_string(source)?;
      parse_config(&content)?;

      let dest = self.dir.join(name);
      fs::copy(source, &dest)
        .map_err(|e| SupervisorError::Storage(format!("failed to copy {name}: {e}")))?;

      log::info!("[store] imported {name}");
      records.push(ConfigFileRecord {
        name: name.to_string(),
        path: dest,
      });
    }

    Ok(records)
  }

  /// List every record currently in the store, sorted by name.
  pub fn list(&self) -> Result<Vec<ConfigFileRecord>, SupervisorError> {
    if !self.dir.exists() {
      return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(&self.dir)? {
      let entry = entry?;
      if !entry.file_type()?.is_file() {
        continue;
      }
      let Ok(name) = entry.file_name().into_string() else {
        continue;
      };
      records.push(ConfigFileRecord {
        name,
        path: entry.path(),
      });
    }

    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
  }
}
