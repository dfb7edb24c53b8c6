//! Audion command line tools.
//!
//! Provides the `audion` binary. `replay` folds a recorded debugger event
//! log through the same integrator the devtools server runs and prints the
//! resulting graphs, either as the `{"allGraphs": ...}` message a render
//! surface receives or as a short human summary.

mod replay;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use audion_core::{IntegratorOptions, LayoutOptions, RankDir};
use audion_transfer::DevtoolsMessage;

use crate::replay::{lay_out, replay, summary, ReplayError};

/// Web Audio graph inspector tools.
#[derive(Parser)]
#[command(name = "audion", about = "Web Audio graph inspector tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded event log (one JSON event per line).
    Replay {
        /// Path to the event log.
        events: PathBuf,

        /// Position vertices with the layered layout.
        #[arg(long)]
        layout: bool,

        /// Rank direction for --layout: LR, RL, TB, BT.
        #[arg(long, default_value = "LR", value_parser = parse_rankdir)]
        rankdir: RankDir,

        /// Print only this context.
        #[arg(long)]
        context: Option<String>,

        /// Print a human-readable summary instead of JSON.
        #[arg(long)]
        summary: bool,

        /// Count parameter creation and destruction as graph updates.
        #[arg(long)]
        emit_param_updates: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            events,
            layout,
            rankdir,
            context,
            summary,
            emit_param_updates,
        } => {
            let layout = layout.then(|| LayoutOptions {
                rankdir,
                ..LayoutOptions::default()
            });
            let options = IntegratorOptions { emit_param_updates };
            let exit_code = run_replay(&events, layout, context, summary, options);
            process::exit(exit_code);
        }
    }
}

/// Execute the replay subcommand.
///
/// Returns exit code: 0 = success, 1 = invalid input, 3 = I/O error.
fn run_replay(
    path: &Path,
    layout: Option<LayoutOptions>,
    context: Option<String>,
    print_summary: bool,
    options: IntegratorOptions,
) -> i32 {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: failed to open '{}': {}", path.display(), e);
            return 3;
        }
    };

    let mut result = match replay(BufReader::new(file), options) {
        Ok(r) => r,
        Err(ReplayError::Io(e)) => {
            eprintln!("Error: failed to read '{}': {}", path.display(), e);
            return 3;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if let Some(id) = &context {
        result.all_graphs.retain(|key, _| key.as_str() == id);
        if result.all_graphs.is_empty() {
            eprintln!("Error: no live context '{}' at the end of the log", id);
            return 1;
        }
    }

    if let Some(layout_options) = layout {
        if let Err(e) = lay_out(&mut result.all_graphs, &layout_options) {
            eprintln!("Error: layout failed: {}", e);
            return 1;
        }
    }

    if print_summary {
        print!("{}", summary(&result));
        return 0;
    }
    for (line, e) in &result.rejected {
        eprintln!("Warning: line {}: {}", line, e);
    }

    let message = match context {
        Some(_) => match result.all_graphs.into_values().next() {
            Some(serialized) => DevtoolsMessage::GraphContext(serialized),
            None => return 1,
        },
        None => DevtoolsMessage::AllGraphs(result.all_graphs),
    };
    match serde_json::to_string_pretty(&message) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: failed to encode graphs: {}", e);
            1
        }
    }
}

/// Parse a rank direction string.
fn parse_rankdir(s: &str) -> Result<RankDir, String> {
    match s.to_ascii_uppercase().as_str() {
        "LR" => Ok(RankDir::LR),
        "RL" => Ok(RankDir::RL),
        "TB" => Ok(RankDir::TB),
        "BT" => Ok(RankDir::BT),
        _ => Err(format!("invalid rank direction '{}': use LR, RL, TB or BT", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rankdir_parsing() {
        assert_eq!(parse_rankdir("tb"), Ok(RankDir::TB));
        assert_eq!(parse_rankdir("LR"), Ok(RankDir::LR));
        assert!(parse_rankdir("up").is_err());
    }

    #[test]
    fn missing_log_is_an_io_error() {
        let path = PathBuf::from("/nonexistent/audion/events.jsonl");
        assert_eq!(
            run_replay(&path, None, None, false, IntegratorOptions::default()),
            3
        );
    }

    #[test]
    fn cli_arguments_parse() {
        let cli = Cli::try_parse_from([
            "audion", "replay", "events.jsonl", "--layout", "--rankdir", "TB", "--summary",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay {
                layout,
                rankdir,
                summary,
                context,
                ..
            } => {
                assert!(layout);
                assert!(summary);
                assert_eq!(rankdir, RankDir::TB);
                assert_eq!(context, None);
            }
        }
    }
}
