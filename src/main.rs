use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use rox::ast_printer::Ast;
use rox::error::LoxError;
use rox::interpreter::Interpreter;
use rox::lox::{Lox, RunError, EXIT_RUNTIME_ERROR, EXIT_STATIC_ERROR};
use rox::parser::Parser;
use rox::scanner::Scanner;
use rox::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to rox.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Print the token stream as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse { filename: PathBuf },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs input from a file as a Lox program; starts a REPL without one
    Run { filename: Option<PathBuf> },

    /// Starts an interactive prompt
    Repl,
}

/// Reads a whole script through a memory map.
fn read_file(filename: &PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;

    let len = file
        .metadata()
        .context(format!("Failed to stat file {:?}", filename))?
        .len();

    // Mapping a zero-length file fails on some platforms.
    if len == 0 {
        return Ok(String::new());
    }

    // SAFETY: the map is read once and copied out before anything else could
    // observe a concurrent truncation of the file.
    let mmap = unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;

    let text = std::str::from_utf8(&mmap)
        .context(format!("File {:?} is not valid UTF-8", filename))?
        .to_owned();

    info!("Read {} bytes from {:?}", text.len(), filename);

    Ok(text)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("rox.log").context("Failed to create rox.log")?;

    Builder::new()
        .format(|buf, record| {
            // Strip 'rox::' from module path
            let module = record.module_path().unwrap_or("<unnamed>");
            let module = module.strip_prefix("rox::").unwrap_or(module);
            writeln!(
                buf,
                "{} [{}:{}] - {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to rox.log");
    Ok(())
}

fn report(errors: &[LoxError]) {
    for e in errors {
        eprintln!("{}", e);
    }
}

/// Scan a file, bailing out with the static exit status on lexical errors.
fn scan_or_exit(source: &str) -> Vec<Token<'_>> {
    let (tokens, errors) = Scanner::scan_all(source);

    if !errors.is_empty() {
        report(&errors);
        std::process::exit(EXIT_STATIC_ERROR);
    }

    tokens
}

fn run_file(filename: &PathBuf) -> Result<()> {
    info!("Running Run subcommand");
    let source = read_file(filename)?;
    let mut lox = Lox::new();

    if let Err(e) = lox.run(&source) {
        debug!("Run failed: {}", e);
        report(e.diagnostics());
        std::process::exit(e.exit_code());
    }

    info!("Program executed successfully");
    Ok(())
}

fn run_prompt() -> Result<()> {
    info!("Starting REPL");
    let mut lox = Lox::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        // Errors end the line, never the session.
        if let Err(e) = lox.run(&line) {
            match &e {
                RunError::Static(errors) => report(errors),
                RunError::Runtime(error) => eprintln!("{}", error),
            }
        }
    }

    info!("REPL finished");
    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::from_default_env().init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename, json } => {
            info!("Running Tokenize subcommand");
            let source = read_file(&filename)?;
            let (tokens, errors) = Scanner::scan_all(&source);

            if json {
                println!("{}", serde_json::to_string_pretty(&tokens)?);
            } else {
                for token in &tokens {
                    println!("{}", token);
                }
            }

            if !errors.is_empty() {
                report(&errors);
                std::process::exit(EXIT_STATIC_ERROR);
            }
        }

        Commands::Parse { filename } => {
            info!("Running Parse subcommand");
            let source = read_file(&filename)?;
            let tokens = scan_or_exit(&source);

            match Parser::new(&tokens).parse_expression() {
                Ok(expr) => println!("{}", Ast.print(&expr)),
                Err(errors) => {
                    report(&errors);
                    std::process::exit(EXIT_STATIC_ERROR);
                }
            }
        }

        Commands::Evaluate { filename } => {
            info!("Running Evaluate subcommand");
            let source = read_file(&filename)?;
            let tokens = scan_or_exit(&source);

            let expr = match Parser::new(&tokens).parse_expression() {
                Ok(expr) => expr,
                Err(errors) => {
                    report(&errors);
                    std::process::exit(EXIT_STATIC_ERROR);
                }
            };

            match Interpreter::new().evaluate_expression(&expr) {
                Ok(value) => println!("{}", value),
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(EXIT_RUNTIME_ERROR);
                }
            }
        }

        Commands::Run {
            filename: Some(filename),
        } => run_file(&filename)?,

        Commands::Run { filename: None } | Commands::Repl => run_prompt()?,
    }

    Ok(())
}
