//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Webcompat: dual-run intervention probes for Firefox site workarounds
#[derive(Parser, Debug)]
#[command(name = "webcompat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the probe fleet against a live browser
    Run(RunArgs),

    /// List probe metadata without executing any bodies
    List(ListArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Directory of probe YAML files (searched recursively)
    #[arg(long, default_value = "probes")]
    pub probe_path: PathBuf,

    /// Platform to gate probes against: linux, mac, windows, android
    /// (detected from the host when omitted)
    #[arg(long)]
    pub platform: Option<String>,

    /// Number of probes holding live browser sessions at once
    #[arg(short = 'j', long, default_value_t = webcompat::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Run Firefox headless
    #[arg(long)]
    pub headless: bool,

    /// Deadline for probes that do not declare their own, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_per_probe: Option<u64>,

    /// Only run probes whose id matches (regex, falling back to substring)
    #[arg(long, value_name = "FILTER")]
    pub only_id: Option<String>,

    /// Directory for the JSON/JUnit reports and failure screenshots
    #[arg(short, long, default_value = "target/webcompat")]
    pub output: PathBuf,

    /// Attach to a running WebDriver endpoint instead of spawning geckodriver
    #[arg(long, value_name = "URL")]
    pub webdriver_url: Option<String>,

    /// Firefox major version assumed for gating before a session reports
    /// the real one
    #[arg(long, value_name = "MAJOR")]
    pub firefox_version: Option<u32>,

    /// JSON file mapping site names to login credentials
    #[arg(long, env = "WEBCOMPAT_CREDENTIALS", value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    /// geckodriver binary to spawn
    #[arg(long, default_value = "geckodriver")]
    pub geckodriver: PathBuf,

    /// Firefox binary to hand to geckodriver instead of the system default
    #[arg(long, value_name = "BINARY")]
    pub firefox: Option<PathBuf>,

    /// Declare that the host draws classic space-taking scrollbars
    #[arg(long)]
    pub visible_scrollbars: bool,

    /// Declare that the host is physical hardware, not a VM
    #[arg(long)]
    pub physical_device: bool,

    /// Do not retry probes that end in an infrastructure error
    #[arg(long)]
    pub no_retry: bool,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Directory of probe YAML files (searched recursively)
    #[arg(long, default_value = "probes")]
    pub probe_path: PathBuf,

    /// Only list probes whose id matches (regex, falling back to substring)
    #[arg(long, value_name = "FILTER")]
    pub only_id: Option<String>,

    /// Emit metadata as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Color output argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatically detect color support
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
