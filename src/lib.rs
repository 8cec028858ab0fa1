//! OpenVPN process supervision and management-interface bridging.
//!
//! This crate provides:
//! - A process supervisor owning at most one external OpenVPN process,
//!   spawned with a TCP management interface and observed until exit
//! - A management channel that sends the interface's line commands and
//!   forwards its data stream
//! - A typed event bus fanning process output, management data and exit
//!   notifications out to any number of subscribers
//! - A config store for imported `.ovpn`/`.conf` files

mod app_dirs;
mod config;
mod config_store;
mod events;
mod management;
mod supervisor;

pub use config::{
  parse_config, ConfigFileRecord, OvpnConfig, ProcessExit, ProcessState, ProcessStatus,
  SessionState, StartOptions, SupervisorError,
};
pub use config_store::ConfigStore;
pub use events::EventBus;
pub use management::ManagementChannel;
pub use supervisor::{ProcessSupervisor, SupervisorConfig, DEFAULT_MANAGEMENT_PORT};
