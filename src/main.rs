mod cli;

use crate::cli::Cli;
use crate::cli::Commands;
use anyhow::Result;
use clap::Parser as _;
use git_subrepo::complete;
use git_subrepo::delete::DeleteOptions;
use git_subrepo::error::Error;
use git_subrepo::import::ImportOptions;
use git_subrepo::reimport::ReimportOptions;
use git_subrepo::subrepo::HostRepo;
use git_subrepo::tree;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    // The completion protocol bypasses regular argument parsing: its word
    // list may contain anything, including '--'.
    if let Some(index) = args.iter().position(|arg| arg == complete::COMPLETE_OPTION) {
        let escaped = complete::escape_double_dash(&args, index + 1);
        return run_complete(&escaped[index + 1..]);
    }

    let cli = Cli::parse();
    let common = cli.command.common();
    let verbose = common.debug_commands
        || matches!(&cli.command, Commands::Reimport(args) if args.verbose);
    git_subrepo::log::init(if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    match dispatch(&cli.command) {
        Ok(()) => 0,
        Err(err) => {
            if common.debug_exceptions {
                eprintln!("{err:?}");
            } else {
                eprintln!("{err:#}");
            }
            match err.downcast_ref::<Error>() {
                Some(error) => error.exit_code(),
                None => 1,
            }
        }
    }
}

fn dispatch(command: &Commands) -> Result<()> {
    let host = HostRepo::from_cwd()?;
    match command {
        Commands::Import(args) => git_subrepo::import::import(
            &host,
            &args.repo,
            &args.prefix,
            &args.commit,
            &ImportOptions {
                force: args.force,
                edit: args.edit,
            },
        ),
        Commands::Reimport(args) => git_subrepo::reimport::reimport(
            &host,
            &ReimportOptions {
                branch: args.branch.clone(),
                debug_commands: args.common.debug_commands || args.verbose,
            },
        ),
        Commands::Delete(args) => git_subrepo::delete::delete(
            &host,
            &args.repo,
            &args.prefix,
            &DeleteOptions { edit: args.edit },
        ),
        Commands::Tree => {
            print!("{}", tree::render(&host)?);
            Ok(())
        }
        Commands::ReimportOne(args) => git_subrepo::reimport::reimport_one(
            &host,
            &ReimportOptions {
                branch: args.branch.clone(),
                debug_commands: args.common.debug_commands,
            },
        ),
    }
}

/// Handle `--_complete <index> <argv0> <word>...`: print one candidate per
/// line and exit 0 exactly when at least one candidate was found.
fn run_complete(values: &[String]) -> i32 {
    let values = complete::unescape_double_dash(values);
    let Some((index, rest)) = values.split_first() else {
        return 1;
    };
    let Ok(index) = index.parse::<usize>() else {
        return 1;
    };
    let Some((_argv0, words)) = rest.split_first() else {
        return 1;
    };
    let words = &words[..index.min(words.len())];
    let candidates = complete::complete(&cli::completion_model(), words);
    for candidate in &candidates {
        println!("{candidate}");
    }
    if candidates.is_empty() { 1 } else { 0 }
}
