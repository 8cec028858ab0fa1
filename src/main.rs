use clap::{Parser, Subcommand};
use ovpnbridge::{
  ConfigStore, EventBus, ProcessSupervisor, StartOptions, SupervisorConfig,
  DEFAULT_MANAGEMENT_PORT,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
  name = "ovpnbridge",
  about = "Supervise an OpenVPN client process from the command line",
  version
)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Copy OpenVPN config files into the local store
  Import {
    /// Files to import (.ovpn or .conf)
    files: Vec<PathBuf>,
  },
  /// List imported config files
  List,
  /// Start OpenVPN with a stored config and stream its events until exit
  Connect {
    /// Name of an imported config file
    name: String,
    /// Path to the openvpn executable
    #[arg(long)]
    openvpn: Option<PathBuf>,
    /// Management interface port
    #[arg(long, default_value_t = DEFAULT_MANAGEMENT_PORT)]
    management_port: u16,
  },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  env_logger::init();

  let cli = Cli::parse();
  let store = ConfigStore::new();

  match cli.command {
    Commands::Import { files } => {
      for record in store.import(&files)? {
        println!("{}\t{}", record.name, record.path.display());
      }
    }
    Commands::List => {
      for record in store.list()? {
        println!("{}\t{}", record.name, record.path.display());
      }
    }
    Commands::Connect {
      name,
      openvpn,
      management_port,
    } => {
      let record = store
        .list()?
        .into_iter()
        .find(|r| r.name == name)
        .ok_or_else(|| format!("no imported config named {name}"))?;

      let bus = EventBus::new();
      let supervisor = ProcessSupervisor::with_config(
        bus.clone(),
        SupervisorConfig {
          management_port,
          ..SupervisorConfig::default()
        },
      );

      let mut logs = bus.subscribe_logs();
      let mut management = bus.subscribe_management();
      let mut exits = bus.subscribe_exits();

      let mut options = StartOptions::new(record.path);
      if let Some(path) = openvpn {
        options = options.with_executable(path);
      }
      supervisor.start(options).await?;

      loop {
        tokio::select! {
          event = logs.recv() => {
            if let Ok(text) = event {
              print!("{text}");
            }
          }
          event = management.recv() => {
            if let Ok(text) = event {
              print!("{text}");
            }
          }
          event = exits.recv() => {
            if let Ok(exit) = event {
              println!("{}", serde_json::to_string(&exit)?);
              break;
            }
          }
          _ = tokio::signal::ctrl_c() => {
            // Ask for a graceful shutdown; the exit event ends the loop.
            let _ = supervisor.stop().await;
          }
        }
      }
    }
  }

  Ok(())
}
