use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Command line arguments for AtPort
#[derive(Parser, Debug)]
#[command(
    name = "atport",
    version = env!("CARGO_PKG_VERSION"),
    about = "Send command lines to a serial device and capture the replies",
    long_about = "A command/response tool for line-oriented serial devices such as AT modems and radio modules. Each reply ends at an explicit terminator line or after a quiet period."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run command lines against a device and print each reply
    Exec(ExecArgs),
    /// List available serial ports
    Ports,
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Arguments of `exec`
#[derive(ClapArgs, Debug)]
pub struct ExecArgs {
    /// Device name from the configuration
    #[arg(short, long, conflicts_with = "port")]
    pub device: Option<String>,

    /// Serial port path (`loop://` runs against a built-in echo device)
    #[arg(short, long, required_unless_present = "device")]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Data bits
    #[arg(long)]
    pub data_bits: Option<u8>,

    /// Stop bits
    #[arg(long)]
    pub stop_bits: Option<u8>,

    /// Parity
    #[arg(long, value_enum)]
    pub parity: Option<ParityArg>,

    /// Flow control
    #[arg(long, value_enum)]
    pub flow_control: Option<FlowControlArg>,

    /// Line terminator, escapes \r \n \t \\ are understood
    #[arg(long)]
    pub line_end: Option<String>,

    /// Quiet period in milliseconds that ends a reply without terminator
    #[arg(long)]
    pub quiet_ms: Option<u64>,

    /// Stop reading at the first line equal to this (e.g. OK)
    #[arg(short, long)]
    pub until: Option<String>,

    /// Give up on an exchange after this many milliseconds (0 waits forever)
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Command lines, executed in order
    #[arg(required = true, num_args = 1..)]
    pub commands: Vec<String>,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate {
        /// Configuration file path
        file: Option<String>,
    },
    /// Create default configuration
    Init {
        /// Project directory to create `.atport/config.toml` in
        #[arg(short = 'd', long)]
        dir: Option<String>,
        /// Write the global configuration instead
        #[arg(short, long)]
        global: bool,
    },
    /// List device configurations
    Devices,
}

/// Parity configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ParityArg {
    None,
    Even,
    Odd,
}

/// Flow control configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

impl From<ParityArg> for crate::domain::config::ParityConfig {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Self::None,
            ParityArg::Even => Self::Even,
            ParityArg::Odd => Self::Odd,
        }
    }
}

impl From<FlowControlArg> for crate::domain::config::FlowControlConfig {
    fn from(flow_control: FlowControlArg) -> Self {
        match flow_control {
            FlowControlArg::None => Self::None,
            FlowControlArg::Software => Self::Software,
            FlowControlArg::Hardware => Self::Hardware,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}

/// Expand `\r`, `\n`, `\t` and `\\` in a terminator given on the command line
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_exec() {
        let args = Args::try_parse_from([
            "atport", "exec", "--port", "/dev/ttyACM0", "--until", "OK", "--quiet-ms", "250", "ATE0", "AT",
        ])
        .unwrap();

        let Command::Exec(exec) = args.command else {
            panic!("expected exec");
        };
        assert_eq!(exec.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(exec.until.as_deref(), Some("OK"));
        assert_eq!(exec.quiet_ms, Some(250));
        assert_eq!(exec.commands, vec!["ATE0", "AT"]);
    }

    #[test]
    fn test_exec_requires_port_or_device() {
        assert!(Args::try_parse_from(["atport", "exec", "AT"]).is_err());
        assert!(Args::try_parse_from(["atport", "exec", "--device", "modem", "AT"]).is_ok());
        assert!(Args::try_parse_from(["atport", "exec", "--device", "m", "--port", "/dev/x", "AT"]).is_err());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\\r\\n"), "\r\n");
        assert_eq!(unescape(";"), ";");
        assert_eq!(unescape("a\\tb\\\\"), "a\tb\\");
        assert_eq!(unescape("\\x"), "\\x");
        assert_eq!(unescape("end\\"), "end\\");
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }
}
