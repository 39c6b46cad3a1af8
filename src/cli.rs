use std::path::PathBuf;

use clap::{ArgAction, ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "scriptrun", about = "Run a script through an external interpreter", version)]
#[command(group(ArgGroup::new("source").args(["script", "file"]).multiple(false)))]
pub struct Cli {
    /// Interpreter executable (defaults to SCRIPTRUN_INTERPRETER, /bin/sh or cmd.exe).
    #[arg(short = 'i', long)]
    pub interpreter: Option<String>,

    /// Flag passed to the interpreter before the script path, e.g. `-c` or `/c`.
    #[arg(short = 'p', long, allow_hyphen_values = true)]
    pub parameter: Option<String>,

    /// Script text to run.
    #[arg(short = 's', long)]
    pub script: Option<String>,

    /// Read the script text from a file.
    ///
    /// Without --script or --file the script is read from stdin when it is piped.
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Kill the script after this many seconds (0 disables the limit).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print `{"result": ..., "exitStatus": ...}` instead of the raw output.
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
