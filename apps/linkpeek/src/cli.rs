use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ENV_API_BASE, ENV_TOKEN};
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "linkpeek",
    about = "Preview the hyperlinks of a design file the way the plugin panel would",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = ENV_API_BASE,
        default_value = remote_docs::DEFAULT_API_BASE,
        help = "Base URL of the file metadata service"
    )]
    pub api_base: String,

    #[arg(
        long,
        global = true,
        env = ENV_TOKEN,
        hide_env_values = true,
        help = "Personal access token for the file metadata service"
    )]
    pub token: Option<String>,

    #[arg(
        long = "timeout-secs",
        global = true,
        default_value_t = 30,
        help = "Give up on any single bridge operation after this many seconds"
    )]
    pub timeout_secs: u64,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "LINKPEEK_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "LINKPEEK_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a file, replay selections and print the active link for each.
    Preview(PreviewArgs),
    /// Drop a row of rectangles onto the first page of a snapshot.
    Rectangles(RectanglesArgs),
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Share url of the file, e.g. https://www.figma.com/file/<key>/<name>
    pub locator: String,

    #[arg(
        long,
        value_name = "PATH",
        help = "Serve the file from a snapshot on disk instead of the network"
    )]
    pub snapshot: Option<PathBuf>,

    #[arg(
        long = "select",
        value_name = "NODE_ID",
        help = "Select a node and report the active link; repeatable"
    )]
    pub select: Vec<String>,

    #[arg(long, value_name = "URL", help = "Type a url into the preview bar")]
    pub manual_url: Option<String>,

    #[arg(long, help = "Switch to the desktop-width frame after loading")]
    pub desktop: bool,

    #[arg(
        long = "place-svg",
        value_name = "PATH",
        help = "Place an SVG file on the current page"
    )]
    pub place_svg: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RectanglesArgs {
    pub count: usize,

    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_with_repeated_selections() {
        let cli = Cli::try_parse_from([
            "linkpeek",
            "preview",
            "https://www.figma.com/file/ABC123/x",
            "--snapshot",
            "doc.json",
            "--select",
            "1:2",
            "--select",
            "1:3",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.logging.level, LogLevel::Debug);
        assert_eq!(cli.timeout_secs, 30);
        match cli.command {
            Command::Preview(args) => {
                assert_eq!(args.select, vec!["1:2", "1:3"]);
                assert_eq!(args.snapshot, Some(PathBuf::from("doc.json")));
                assert!(!args.desktop);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rectangles_needs_a_count() {
        assert!(Cli::try_parse_from(["linkpeek", "rectangles"]).is_err());
        let cli = Cli::try_parse_from(["linkpeek", "rectangles", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Rectangles(RectanglesArgs { count: 3, .. })));
    }
}
