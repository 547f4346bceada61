//! Command-line argument parsing

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use audilink_common::LogFormat;

/// Parsed command line
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Args {
    pub username: Option<String>,
    pub password: Option<String>,
    pub config: Option<PathBuf>,
    pub token_file: Option<PathBuf>,
    pub log_format: LogFormat,
    pub help: bool,
}

impl Args {
    /// Parse arguments, excluding the program name
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg, None),
            };
            let mut value = || -> anyhow::Result<String> {
                match inline.clone() {
                    Some(value) => Ok(value),
                    None => args.next().ok_or_else(|| anyhow!("{flag} requires a value")),
                }
            };

            match flag.as_str() {
                "-u" | "--username" => parsed.username = Some(value()?),
                "-p" | "--password" => parsed.password = Some(value()?),
                "-c" | "--config" => parsed.config = Some(PathBuf::from(value()?)),
                "--token-file" => parsed.token_file = Some(PathBuf::from(value()?)),
                "--log-format" => {
                    let raw = value()?;
                    parsed.log_format = raw
                        .parse()
                        .map_err(|e: String| anyhow!(e))
                        .with_context(|| format!("invalid --log-format {raw}"))?;
                }
                "-h" | "--help" => parsed.help = true,
                other => bail!("unknown argument: {other}"),
            }
        }

        Ok(parsed)
    }
}

pub const USAGE: &str = "\
audilink - log in to myAudi and list vehicles

USAGE:
    audilink [OPTIONS]

OPTIONS:
    -u, --username <EMAIL>     Account email (or AUDILINK_USERNAME)
    -p, --password <PASSWORD>  Account password (or AUDILINK_PASSWORD)
    -c, --config <FILE>        JSON or TOML config file
        --token-file <FILE>    Session file (default ~/.audi_tokens.json)
        --log-format <FORMAT>  pretty or json
    -h, --help                 Show this help message

Log levels follow RUST_LOG (default info).";
