use directories::BaseDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

static BASE_DIRS: OnceLock<BaseDirs> = OnceLock::new();

fn base_dirs() -> &'static BaseDirs {
  BASE_DIRS.get_or_init(|| BaseDirs::new().expect("Failed to get base directories"))
}

pub fn app_name() -> &'static str {
  if cfg!(debug_assertions) {
    "OvpnBridgeDev"
  } else {
    "OvpnBridge"
  }
}

/// Private data area for this application.
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("OVPNBRIDGE_DATA_DIR") {
    return PathBuf::from(dir);
  }

  base_dirs().data_local_dir().join(app_name())
}

/// Directory holding imported OpenVPN config files.
pub fn configs_dir() -> PathBuf {
  data_dir().join("ovpn_configs")
}
