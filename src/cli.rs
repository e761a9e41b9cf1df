/** Command line argument definition using subcommands.
 *
 * The clap definitions drive parsing; [`completion_model`] mirrors them as
 * the declarative model the `--_complete` protocol walks. Keep the two in
 * sync when changing arguments.
 */
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use git_subrepo::complete::Action;
use git_subrepo::complete::Arguments;
use git_subrepo::complete::Keyword;
use git_subrepo::complete::Nargs;
use git_subrepo::complete::decode_action;
use git_subrepo::complete::decode_nargs;
use std::collections::BTreeMap;
use std::path::PathBuf;

const ABOUT: &str = "Sub-repository support for git.

git-subrepo embeds the state of another repository at a chosen directory as \
ordinary commits, with no submodule pointers and no out-of-tree metadata.\
";

#[derive(Parser, Debug)]
#[command(name = "git-subrepo", about = ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug, Default)]
pub struct CommonArgs {
    /// Print each executed command.
    #[arg(long)]
    pub debug_commands: bool,

    /// Print the full error chain instead of a one-line diagnostic.
    #[arg(long)]
    pub debug_exceptions: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a subrepo at a specific commit.
    Import(Import),
    /// Rewrite import commits to follow amended upstream commits.
    Reimport(Reimport),
    /// Delete an imported subrepo.
    Delete(Delete),
    /// Show the subrepos imported in the history of HEAD.
    Tree,
    /// Rewrite the commit at HEAD during a reimport rebase.
    #[command(name = "reimport-one", hide = true)]
    ReimportOne(ReimportOne),
}

impl Commands {
    pub fn common(&self) -> CommonArgs {
        match self {
            Commands::Import(args) => args.common.clone(),
            Commands::Reimport(args) => args.common.clone(),
            Commands::Delete(args) => args.common.clone(),
            Commands::Tree => CommonArgs::default(),
            Commands::ReimportOne(args) => args.common.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct Import {
    /// Import even if the commit does not belong to the remote repository.
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Open an editor to adjust the commit message.
    #[arg(long, short = 'e')]
    pub edit: bool,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Name of a remote repository in an up-to-date state. Add one with
    /// `git remote add -f <name> <url>`.
    pub repo: String,

    /// The directory to import the subrepo at, relative to the working
    /// directory. `.` imports into the repository root.
    pub prefix: PathBuf,

    /// The commit of the remote repository to import.
    pub commit: String,
}

#[derive(Args, Debug)]
pub struct Reimport {
    /// Only match commits on this branch of the remote repository.
    #[arg(long)]
    pub branch: Option<String>,

    /// Print each executed command.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct Delete {
    /// Open an editor to adjust the commit message.
    #[arg(long, short = 'e')]
    pub edit: bool,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Name of the remote repository the subrepo was imported from.
    pub repo: String,

    /// The directory the subrepo is imported at.
    pub prefix: PathBuf,
}

#[derive(Args, Debug)]
pub struct ReimportOne {
    /// Only match commits on this branch of the remote repository.
    #[arg(long)]
    pub branch: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// The completion model mirroring the clap definitions above.
pub fn completion_model() -> Arguments {
    let flag = || Keyword::Option(decode_action(Action::StoreTrue));
    let value = || Keyword::Option(decode_action(Action::Store));
    let help = || Keyword::Option(decode_action(Action::Help));
    let positional = || decode_nargs(Nargs::Exactly(1));
    let common = |keywords: &mut BTreeMap<String, Keyword>| {
        keywords.insert("--debug-commands".to_owned(), flag());
        keywords.insert("--debug-exceptions".to_owned(), flag());
        keywords.insert("-h".to_owned(), help());
        keywords.insert("--help".to_owned(), help());
    };

    let import = {
        let mut keywords = BTreeMap::new();
        keywords.insert("-f".to_owned(), flag());
        keywords.insert("--force".to_owned(), flag());
        keywords.insert("-e".to_owned(), flag());
        keywords.insert("--edit".to_owned(), flag());
        common(&mut keywords);
        Arguments {
            positionals: vec![positional(); 3],
            keywords,
        }
    };
    let reimport = {
        let mut keywords = BTreeMap::new();
        keywords.insert("--branch".to_owned(), value());
        keywords.insert("-v".to_owned(), flag());
        keywords.insert("--verbose".to_owned(), flag());
        common(&mut keywords);
        Arguments {
            positionals: Vec::new(),
            keywords,
        }
    };
    let delete = {
        let mut keywords = BTreeMap::new();
        keywords.insert("-e".to_owned(), flag());
        keywords.insert("--edit".to_owned(), flag());
        common(&mut keywords);
        Arguments {
            positionals: vec![positional(); 2],
            keywords,
        }
    };
    let tree = Arguments::default();

    let mut keywords = BTreeMap::new();
    keywords.insert("import".to_owned(), Keyword::Subcommand(import));
    keywords.insert("reimport".to_owned(), Keyword::Subcommand(reimport));
    keywords.insert("delete".to_owned(), Keyword::Subcommand(delete));
    keywords.insert("tree".to_owned(), Keyword::Subcommand(tree));
    keywords.insert("-h".to_owned(), help());
    keywords.insert("--help".to_owned(), help());
    Arguments {
        positionals: Vec::new(),
        keywords,
    }
}
