use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use monkey::bytecode::disasm::{print_bytecode, print_bytecode_stats};
use monkey::frontend::token_dumper::TokenDumper;
use monkey::frontend::{Lexer, parse_source};
use monkey::{Session, VmConfig, repl};

/// Monkey bytecode compiler and virtual machine.
#[derive(Parser, Debug)]
#[command(name = "monkey", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    limits: Limits,

    /// Log filter used when RUST_LOG is not set (e.g. `debug`, `monkey=trace`).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Args, Debug)]
struct Limits {
    /// Operand stack slots.
    #[arg(long, global = true, default_value_t = 2048)]
    stack_size: usize,

    /// Maximum call depth.
    #[arg(long, global = true, default_value_t = 1024)]
    max_frames: usize,

    /// Global variable slots.
    #[arg(long, global = true, default_value_t = 65536)]
    globals_size: usize,
}

impl From<&Limits> for VmConfig {
    fn from(limits: &Limits) -> Self {
        VmConfig {
            stack_size: limits.stack_size,
            max_frames: limits.max_frames,
            globals_size: limits.globals_size,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a Monkey file
    Run {
        file: PathBuf,

        /// Print the disassembly before running
        #[arg(long)]
        dump_bytecode: bool,
    },

    /// Evaluate a Monkey source string
    Eval { source: String },

    /// Dump an intermediate representation of a file
    Dump {
        file: PathBuf,

        #[arg(long)]
        tokens: bool,

        #[arg(long)]
        ast: bool,

        #[arg(long)]
        bytecode: bool,

        /// Append opcode counts to the bytecode dump
        #[arg(long, requires = "bytecode")]
        stats: bool,

        /// Disable ANSI colors in the token dump
        #[arg(long)]
        no_color: bool,
    },

    /// Start an interactive session (default)
    Repl,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let session = Session::with_config(VmConfig::from(&cli.limits));

    match cli.command.unwrap_or(Command::Repl) {
        Command::Run {
            file,
            dump_bytecode,
        } => run_file(session, &file, dump_bytecode),
        Command::Eval { source } => eval(session, &source),
        Command::Dump {
            file,
            tokens,
            ast,
            bytecode,
            stats,
            no_color,
        } => {
            let source = read_source(&file)?;
            if tokens {
                let tokens = Lexer::new(&source).tokenize()?;
                let mut dumper = TokenDumper::new();
                if no_color {
                    dumper = dumper.no_color();
                }
                dumper.dump(&tokens);
            } else if ast {
                let program = parse_source(&source)?;
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else if bytecode {
                let mut session = session;
                let bc = session.compile(&source)?;
                print_bytecode(&bc);
                if stats {
                    print_bytecode_stats(&bc);
                }
            } else {
                bail!("dump needs one of --tokens, --ast or --bytecode");
            }
            Ok(())
        }
        Command::Repl => {
            println!("Monkey {} (Ctrl-D to exit)", env!("CARGO_PKG_VERSION"));
            repl::start(session)
        }
    }
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn run_file(mut session: Session, file: &Path, dump_bytecode: bool) -> anyhow::Result<()> {
    let source = read_source(file)?;
    let bytecode = session.compile(&source)?;
    if dump_bytecode {
        print_bytecode(&bytecode);
    }
    session.run(bytecode)?;
    Ok(())
}

fn eval(mut session: Session, source: &str) -> anyhow::Result<()> {
    let value = session.eval(source)?;
    println!("{value}");
    Ok(())
}
