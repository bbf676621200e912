use crate::cli::args::{unescape, Args, Command, ConfigArgs, ConfigCommand, ExecArgs};
use crate::cli::output::{ConsoleWriter, ExchangeReport, OutputWriter};
use crate::core::communication::{LoopbackDevice, LoopbackTransport, Transport};
use crate::core::session::Session;
use crate::domain::config::{AtPortConfig, GlobalConfig, SessionConfig};
use crate::domain::error::{AtPortError, AtPortResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::{available_ports, SerialTransport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Port name that selects the built-in echo device
pub const LOOPBACK_PORT: &str = "loop://";

/// Execute CLI command
pub async fn execute_command(args: Args) -> AtPortResult<()> {
    let writer = ConsoleWriter::new(args.output);

    // Load configuration using ConfigManager
    let config_manager = ConfigManager::new()?;
    let config = if let Some(config_path) = &args.config {
        config_manager.load_config_from_path(config_path.as_ref())?
    } else {
        config_manager.load_config()?
    };

    // Initialize logging
    if !args.quiet {
        setup_logging(&config.global, args.verbose)?;
    }

    match args.command {
        Command::Exec(exec_args) => execute_exec(exec_args, &writer, &config, args.verbose).await,
        Command::Ports => {
            let ports = available_ports()?;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::Config(config_args) => execute_config_command(config_args, &writer, &config, &config_manager),
        Command::Version => {
            writer.write_message(&format!("atport {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

/// Resolve the device path and line settings from config plus flags.
pub fn resolve_target(args: &ExecArgs, config: &AtPortConfig) -> AtPortResult<(String, SessionConfig)> {
    let (path, mut session) = match (&args.device, &args.port) {
        (Some(name), _) => {
            let device = config.find_device(name).ok_or_else(|| AtPortError::Config {
                message: format!("Device '{}' not found in configuration", name),
            })?;
            (device.port.clone(), device.session.clone())
        }
        (None, Some(port)) => (port.clone(), SessionConfig::default()),
        (None, None) => {
            return Err(AtPortError::InvalidInput(
                "Either --device or --port is required".to_string(),
            ))
        }
    };

    if let Some(baud) = args.baud {
        session.baud_rate = baud;
    }
    if let Some(data_bits) = args.data_bits {
        session.data_bits = data_bits;
    }
    if let Some(stop_bits) = args.stop_bits {
        session.stop_bits = stop_bits;
    }
    if let Some(parity) = args.parity {
        session.parity = parity.into();
    }
    if let Some(flow_control) = args.flow_control {
        session.flow_control = flow_control.into();
    }
    if let Some(line_end) = &args.line_end {
        session.line_terminator = unescape(line_end);
    }
    if let Some(quiet_ms) = args.quiet_ms {
        session.quiet_timeout_ms = quiet_ms;
    }

    session.validate()?;
    Ok((path, session))
}

async fn execute_exec(
    args: ExecArgs,
    writer: &ConsoleWriter,
    config: &AtPortConfig,
    verbose: bool,
) -> AtPortResult<()> {
    let (path, session_config) = resolve_target(&args, config)?;

    let transport: Arc<dyn Transport> = if path == LOOPBACK_PORT {
        let (transport, device) = LoopbackTransport::pair();
        spawn_echo_device(device);
        Arc::new(transport)
    } else {
        Arc::new(SerialTransport::new())
    };

    let session = Session::new(path, session_config, transport);
    session.open().await?;

    let deadline_ms = args.deadline_ms.unwrap_or(config.global.deadline_ms);
    let mut reports = Vec::with_capacity(args.commands.len());
    let outcome = run_commands(&session, &args, deadline_ms, &mut reports).await;

    let closed = session.close().await;

    writer.write_exchanges(&reports)?;
    if verbose {
        writer.write_session_summary(&session.state())?;
    }

    outcome?;
    closed?;
    Ok(())
}

async fn run_commands(
    session: &Session,
    args: &ExecArgs,
    deadline_ms: u64,
    reports: &mut Vec<ExchangeReport>,
) -> AtPortResult<()> {
    let terminator = args.until.as_deref();

    for command in &args.commands {
        let started = Instant::now();
        let response = if deadline_ms > 0 {
            session
                .execute_within(command, terminator, Duration::from_millis(deadline_ms))
                .await?
        } else {
            session.execute(command, terminator).await?
        };

        reports.push(ExchangeReport {
            command: command.clone(),
            terminator: terminator.map(str::to_string),
            response,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    Ok(())
}

/// Answer every command with its own text followed by `OK`.
fn spawn_echo_device(device: LoopbackDevice) {
    tokio::spawn(async move {
        while let Some(bytes) = device.next_write().await {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let terminator = device.line_terminator();
            let command = text.strip_suffix(terminator.as_str()).unwrap_or(&text);

            debug!("Echo device answering '{}'", command);
            device.send_line(command);
            device.send_line("OK");
        }
    });
}

fn execute_config_command(
    args: ConfigArgs,
    writer: &ConsoleWriter,
    config: &AtPortConfig,
    config_manager: &ConfigManager,
) -> AtPortResult<()> {
    match args.command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
            Ok(())
        }
        ConfigCommand::Validate { file } => {
            let result = match &file {
                Some(path) => config_manager.load_config_from_path(path.as_ref()).map(|_| ()),
                None => config_manager.load_config().map(|_| ()),
            };
            match result {
                Ok(()) => writer.write_message(&format!(
                    "Configuration {} is valid",
                    file.as_deref().unwrap_or("(merged)")
                ))?,
                Err(e) => writer.write_error(&format!("Configuration validation failed: {}", e))?,
            }
            Ok(())
        }
        ConfigCommand::Init { dir, global } => {
            if global {
                let global_path = config_manager.get_global_config_path_ref();
                if global_path.exists() {
                    return Err(AtPortError::Config {
                        message: format!("Global configuration already exists at '{}'", global_path.display()),
                    });
                }
                config_manager.save_config_to_path(global_path, &AtPortConfig::default())?;
                writer.write_message(&format!("Global configuration initialized at '{}'", global_path.display()))?;
            } else {
                let root = match dir {
                    Some(dir) => dir.into(),
                    None => std::env::current_dir()?,
                };
                let created = config_manager.init_project_config(&root)?;
                writer.write_message(&format!("Project configuration initialized at '{}'", created.display()))?;
            }
            Ok(())
        }
        ConfigCommand::Devices => {
            writer.write_devices(&config.devices)?;
            Ok(())
        }
    }
}

fn setup_logging(config: &GlobalConfig, verbose: bool) -> AtPortResult<()> {
    let level = if verbose { "debug" } else { config.log_level.as_str() };

    init_logging(level).map_err(|e| AtPortError::Config {
        message: format!("Failed to initialize logging: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::ParityArg;
    use crate::domain::config::{DeviceConfig, ParityConfig};

    fn exec_args(port: Option<&str>, device: Option<&str>) -> ExecArgs {
        ExecArgs {
            device: device.map(str::to_string),
            port: port.map(str::to_string),
            baud: None,
            data_bits: None,
            stop_bits: None,
            parity: None,
            flow_control: None,
            line_end: None,
            quiet_ms: None,
            until: None,
            deadline_ms: None,
            commands: vec!["AT".to_string()],
        }
    }

    #[test]
    fn test_resolve_port_uses_defaults() {
        let (path, session) = resolve_target(&exec_args(Some("/dev/ttyACM0"), None), &AtPortConfig::default()).unwrap();

        assert_eq!(path, "/dev/ttyACM0");
        assert_eq!(session, SessionConfig::default());
    }

    #[test]
    fn test_resolve_device_applies_overrides() {
        let config = AtPortConfig {
            global: GlobalConfig::default(),
            devices: vec![DeviceConfig {
                name: "radio".to_string(),
                description: String::new(),
                port: "/dev/ttyUSB3".to_string(),
                session: SessionConfig { baud_rate: 9600, ..Default::default() },
            }],
        };

        let mut args = exec_args(None, Some("radio"));
        args.parity = Some(ParityArg::Even);
        args.line_end = Some("\\n".to_string());
        args.quiet_ms = Some(300);

        let (path, session) = resolve_target(&args, &config).unwrap();
        assert_eq!(path, "/dev/ttyUSB3");
        assert_eq!(session.baud_rate, 9600);
        assert_eq!(session.parity, ParityConfig::Even);
        assert_eq!(session.line_terminator, "\n");
        assert_eq!(session.quiet_timeout_ms, 300);
    }

    #[test]
    fn test_resolve_unknown_device_fails() {
        let result = resolve_target(&exec_args(None, Some("missing")), &AtPortConfig::default());
        assert!(matches!(result, Err(AtPortError::Config { .. })));
    }

    #[test]
    fn test_resolve_rejects_invalid_override() {
        let mut args = exec_args(Some("/dev/ttyACM0"), None);
        args.quiet_ms = Some(0);
        assert!(resolve_target(&args, &AtPortConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_echo_device_round_trip() {
        let (transport, device) = LoopbackTransport::pair();
        spawn_echo_device(device);

        let session = Session::new(LOOPBACK_PORT, SessionConfig::default(), Arc::new(transport));
        session.open().await.unwrap();

        let mut args = exec_args(Some(LOOPBACK_PORT), None);
        args.until = Some("OK".to_string());
        args.commands = vec!["ATE0".to_string(), "AT+CSQ".to_string()];

        let mut reports = Vec::new();
        run_commands(&session, &args, 0, &mut reports).await.unwrap();
        session.close().await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].response, "ATE0\nOK");
        assert_eq!(reports[1].response, "AT+CSQ\nOK");
    }
}
