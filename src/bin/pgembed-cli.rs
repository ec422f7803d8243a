//! pgembed command-line tool
//!
//! ```bash
//! # Create a cluster
//! pgembed-cli initdb ./pgdata --user postgres
//!
//! # Interactive SQL shell
//! pgembed-cli shell ./pgdata --db postgres --no-fsync
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgembed::{BootstrapOptions, BootstrapOutcome, Embedded, PerformanceConfig, QueryResult};
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Embedded relational engine tool
#[derive(Parser, Debug)]
#[command(name = "pgembed-cli", version, about = "Create and query in-process database clusters")]
struct Args {
    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new data directory
    Initdb {
        data_dir: PathBuf,

        /// Bootstrap superuser
        #[arg(short = 'U', long, default_value = "postgres", env = "PGEMBED_USER")]
        user: String,

        /// Server encoding
        #[arg(short = 'E', long)]
        encoding: Option<String>,

        /// Collation and ctype locale
        #[arg(long)]
        locale: Option<String>,
    },

    /// Interactive SQL shell on an existing data directory
    Shell {
        data_dir: PathBuf,

        /// Database to connect to
        #[arg(short = 'd', long, default_value = "postgres")]
        db: String,

        #[arg(short = 'U', long, default_value = "postgres", env = "PGEMBED_USER")]
        user: String,

        /// Turn off fsync, synchronous commit and full page writes
        #[arg(long)]
        no_fsync: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Initdb {
            data_dir,
            user,
            encoding,
            locale,
        } => {
            let mut options = BootstrapOptions::new(user);
            options.encoding = encoding;
            options.locale = locale;
            let outcome = pgembed::bootstrap(&data_dir, &options)
                .with_context(|| format!("could not initialize {}", data_dir.display()))?;
            match outcome {
                BootstrapOutcome::Created => println!("Success. Data directory {} created.", data_dir.display()),
                BootstrapOutcome::AlreadyInitialized => {
                    println!("Data directory {} is already initialized.", data_dir.display())
                }
            }
            Ok(())
        }
        Command::Shell {
            data_dir,
            db,
            user,
            no_fsync,
        } => {
            let performance = if no_fsync {
                PerformanceConfig::for_testing()
            } else {
                PerformanceConfig::durable()
            };
            let engine = Embedded::builder(&data_dir)
                .database(&db)
                .user(&user)
                .performance(performance)
                .open()
                .with_context(|| format!("could not open {}", data_dir.display()))?;
            info!(data_dir = %data_dir.display(), database = %db, "shell started");
            interactive_mode(&engine, &db)
        }
    }
}

fn interactive_mode(engine: &Embedded, db: &str) -> Result<()> {
    println!("pgembed v{VERSION}");
    println!("Connected to database \"{db}\". Type '.help' for help, '.exit' to quit\n");

    let stdin = io::stdin();
    let mut buffer = String::new();
    let mut statement = String::new();

    loop {
        let prompt = match (statement.is_empty(), engine.in_transaction()) {
            (true, false) => format!("{db}=> "),
            (true, true) => format!("{db}*> "),
            (false, _) => format!("{db}-> "),
        };
        print!("{prompt}");
        io::stdout().flush()?;

        buffer.clear();
        if stdin.lock().read_line(&mut buffer)? == 0 {
            println!();
            break;
        }
        let input = buffer.trim();

        if input.starts_with('.') {
            if !statement.is_empty() {
                eprintln!("Warning: incomplete statement discarded");
                statement.clear();
            }
            if !dot_command(engine, input) {
                break;
            }
            continue;
        }
        if input.is_empty() {
            continue;
        }

        statement.push_str(input);
        statement.push('\n');
        if input.ends_with(';') {
            match engine.execute(statement.trim()) {
                Ok(result) => display_result(&result),
                Err(e) => eprintln!("ERROR: {e}"),
            }
            statement.clear();
            print_notifications(engine);
        }
    }
    Ok(())
}

/// Run a `.command`. Returns false to leave the shell.
fn dot_command(engine: &Embedded, input: &str) -> bool {
    let mut parts = input.splitn(3, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let first = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let outcome = match (command, first) {
        (".exit" | ".quit", _) => return false,
        (".help", _) => {
            print_interactive_help();
            Ok(())
        }
        (".begin", _) => engine.begin(),
        (".commit", _) => engine.commit(),
        (".rollback", _) => engine.rollback(),
        (".listen", Some(channel)) => engine.listen(channel),
        (".unlisten", Some(channel)) => engine.unlisten(channel),
        (".unlisten", None) => engine.unlisten_all(),
        (".notify", Some(channel)) => engine.notify(channel, rest),
        (".poll", _) => {
            if !print_notifications(engine) {
                println!("No notifications.");
            }
            Ok(())
        }
        (".listen" | ".notify", None) => {
            eprintln!("Usage: {command} <channel>{}", if command == ".notify" { " [payload]" } else { "" });
            return true;
        }
        _ => {
            eprintln!("Unknown command: {input}");
            println!("Type '.help' for available commands");
            return true;
        }
    };
    if let Err(e) = outcome {
        eprintln!("ERROR: {e}");
    }
    true
}

/// Print pending notifications; false when there were none.
fn print_notifications(engine: &Embedded) -> bool {
    let notifications = engine.drain_notifications();
    for n in &notifications {
        if n.payload.is_empty() {
            println!("Asynchronous notification \"{}\" received from server process with PID {}.", n.channel, n.sender_pid);
        } else {
            println!(
                "Asynchronous notification \"{}\" with payload \"{}\" received from server process with PID {}.",
                n.channel, n.payload, n.sender_pid
            );
        }
    }
    !notifications.is_empty()
}

fn print_interactive_help() {
    println!(
        r#"
Statements end with ';' and may span several lines.

Commands:
  .help                     Show this help
  .exit, .quit              Leave the shell
  .begin                    Start a transaction
  .commit                   Commit the transaction
  .rollback                 Roll back the transaction
  .listen <channel>         Listen on a channel
  .unlisten [channel]       Stop listening (all channels without argument)
  .notify <channel> [text]  Send a notification
  .poll                     Show received notifications
"#
    );
}

fn display_result(result: &QueryResult) {
    if result.column_count == 0 {
        println!("{} ({} row(s))", status_tag(result), result.row_count);
        return;
    }
    display_table(&result.column_names, &result.values);
    println!("({} row{})", result.row_count, if result.row_count == 1 { "" } else { "s" });
}

fn status_tag(result: &QueryResult) -> &'static str {
    use pgembed::backend::SpiStatus;
    match result.status {
        SpiStatus::Utility => "OK",
        SpiStatus::Select => "SELECT",
        SpiStatus::Insert | SpiStatus::InsertReturning => "INSERT",
        SpiStatus::Delete | SpiStatus::DeleteReturning => "DELETE",
        SpiStatus::Update | SpiStatus::UpdateReturning => "UPDATE",
    }
}

const MAX_CELL_WIDTH: usize = 50;

fn cell_text(value: &Option<String>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(s) if s.chars().count() > MAX_CELL_WIDTH => {
            let cut: String = s.chars().take(MAX_CELL_WIDTH - 3).collect();
            format!("{cut}...")
        }
        Some(s) => s.clone(),
    }
}

fn display_table(columns: &[String], rows: &[Vec<Option<String>>]) {
    let cells: Vec<Vec<String>> = rows.iter().map(|row| row.iter().map(cell_text).collect()).collect();
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let rule = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        println!("{left}{}{right}", segments.join(mid));
    };
    let line = |values: &[String]| {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, w)| format!(" {:w$} ", values.get(i).map(String::as_str).unwrap_or(""), w = w))
            .collect();
        println!("│{}│", padded.join("│"));
    };

    rule("┌", "┬", "┐");
    line(columns);
    rule("├", "┼", "┤");
    for row in &cells {
        line(row);
    }
    rule("└", "┴", "┘");
}
