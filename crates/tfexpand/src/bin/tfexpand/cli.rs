//! tfexpand cli interface

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
    /// This is equivalent to running { cd <directory>; tfexpand ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a configuration into concrete resource instances
    ///
    /// Loads a single .tf file or all .tf files of a directory
    #[command(alias = "eval")]
    Evaluate(EvaluateCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct EvaluateCommand {
    /// File or directory to evaluate
    #[arg(default_value = ".")]
    pub path: PathBuf,

    #[clap(flatten)]
    pub limits: LimitArgs,

    #[clap(flatten)]
    pub variables: VariableArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct LimitArgs {
    /// Maximum number of instances a single `count` may create
    #[arg(long = "max-count", env = "TFEXPAND_MAX_COUNT_EXPANSION")]
    pub max_count: u32,

    /// Maximum number of instances a single `for_each` may create
    #[arg(long = "max-for-each", env = "TFEXPAND_MAX_FOR_EACH_EXPANSION")]
    pub max_for_each: u32,

    /// Maximum nesting of local modules
    #[arg(long = "max-module-depth")]
    pub max_module_depth: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct VariableArgs {
    /// Set a variable: name=value
    ///
    /// The value is read as HCL literal (number, bool, list, map, "quoted string")
    /// and as plain text otherwise. Takes precedence over --var-file.
    #[arg(long = "var")]
    pub assignments: Vec<String>,

    /// Load variables from a .tfvars file
    ///
    /// Can be specified multiple times, later files win.
    #[arg(long = "var-file")]
    pub files: Vec<PathBuf>,
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

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Raw HCL documents as loaded
    Documents {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Parsed resources, variables, locals, modules and providers
    Document {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}
