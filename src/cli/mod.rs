use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "magic_block", version, about = "Compile block-graph workspaces into LLM prompts and run them")]
pub struct Args {
    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for templates, custom blocks and run artifacts
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    /// Save each execution's request/response under <store>/runs
    #[arg(long, global = true, default_value_t = false)]
    pub save_runs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the prompt compiled from a workspace snapshot (.json/.yaml)
    Compile {
        file: PathBuf,
        /// Fail on malformed graphs instead of omitting the affected blocks
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Compile snapshots and execute the prompts concurrently
    Run(RunArgs),
    /// List registered block kinds, including custom ones
    Kinds,
    #[command(subcommand)]
    Template(TemplateCommand),
    #[command(subcommand)]
    Block(BlockCommand),
}

#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Rewrite each prompt through the optimizer before executing it
    #[arg(long, default_value_t = false)]
    pub optimize: bool,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub progress: bool,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// Save a snapshot and its compiled prompt under a name
    Save { file: PathBuf, #[arg(long)] name: String },
    List,
    /// Print a saved template's prompt
    Show { key: String },
    /// Write a saved template's workspace as JSON (stdout when no --out)
    Load {
        key: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Delete {
        key: String,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// List built-in presets, or write one out by id
    Preset {
        id: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export a snapshot in shareable form
    Export {
        file: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a shared workspace into the template store
    Import { file: PathBuf, #[arg(long)] name: String },
}

#[derive(Subcommand, Debug)]
pub enum BlockCommand {
    /// Define a custom block kind
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    List,
    Remove { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_run_with_globals() {
        let args = Args::try_parse_from([
            "magic_block", "run", "a.json", "b.yaml", "--optimize", "--store", "/tmp/s", "--save-runs",
        ])
        .unwrap();
        assert!(args.save_runs);
        assert_eq!(args.store, Some(PathBuf::from("/tmp/s")));
        match args.command {
            Command::Run(r) => {
                assert_eq!(r.files.len(), 2);
                assert!(r.optimize);
                assert!(r.progress);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_block_add() {
        let args =
            Args::try_parse_from(["magic_block", "block", "add", "--name", "審稿", "--color", "#4a90e2"]).unwrap();
        assert!(matches!(args.command, Command::Block(BlockCommand::Add { ref name, .. }) if name == "審稿"));
    }
}
