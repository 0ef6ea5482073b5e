//! preview cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; preview ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Preview parameters and tags of the template in the work directory
    #[command(alias = "p")]
    Preview(PreviewCommand),

    /// List the parameters recorded in a state file (`terraform show -json`)
    State(StateCommand),
}

#[derive(Parser, Debug)]
pub struct PreviewCommand {
    /// Parameter value as `name=value`
    ///
    /// Can be specified multiple times.
    #[clap(short = 'p', long = "parameter", value_parser = parse_parameter)]
    pub parameters: Vec<(String, String)>,

    /// Plan to take resource values from (`terraform show -json` of a plan)
    #[clap(long = "plan")]
    pub plan: Option<PathBuf>,

    /// Stop after this many evaluation passes
    #[clap(long = "max-passes")]
    pub max_passes: Option<usize>,

    #[clap(flatten)]
    pub owner: OwnerArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct StateCommand {
    /// State file to read
    pub file: PathBuf,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct OwnerArgs {
    /// Read the workspace owner from a JSON file
    ///
    /// The other --owner-* arguments override fields of the file.
    #[clap(long = "owner-file")]
    pub file: Option<PathBuf>,

    #[clap(long = "owner-name")]
    pub name: Option<String>,

    #[clap(long = "owner-email")]
    pub email: Option<String>,

    /// Group of the owner, can be specified multiple times
    #[clap(long = "owner-group")]
    pub groups: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

fn parse_parameter(arg: &str) -> Result<(String, String), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {arg:?}"))?;
    if name.is_empty() {
        return Err(format!("parameter name is empty in {arg:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}
