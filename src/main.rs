use clap::{Parser as ClapParser, Subcommand};
use pipeline_expr::cli::{self, CheckOptions, CheckResult, CliError, RefsOptions};
use pipeline_expr::output::{to_json, to_json_pretty};
use pipeline_expr::TracingTraceWriter;
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "pexpr")]
#[command(about = "pexpr - Evaluate and analyze CI/CD workflow expressions")]
#[command(version)]
struct Cli {
    /// Write the evaluation trace to stderr (-t for info, -tt for every node)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    trace: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and evaluate an expression
    Check {
        /// The expression to evaluate
        expression: String,

        /// JSON object of named-values (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Only validate syntax, don't evaluate
        #[arg(long)]
        syntax_only: bool,

        /// Memory limit in bytes
        #[arg(long, default_value_t = 0)]
        max_memory: usize,

        /// Secret value to mask in trace output (repeatable)
        #[arg(short, long = "secret")]
        secrets: Vec<String>,

        /// Regular expression whose matches are masked (repeatable)
        #[arg(long = "secret-pattern")]
        secret_patterns: Vec<String>,
    },

    /// Report which context patterns an expression may reference
    Refs {
        /// The expression to analyze
        expression: String,

        /// Patterns such as `github.event` or `needs.*.outputs`
        #[arg(required = true)]
        patterns: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.trace);

    let result = match cli.command {
        Commands::Check {
            expression,
            input,
            pretty,
            syntax_only,
            max_memory,
            secrets,
            secret_patterns,
        } => run_check(CheckOptions {
            expression,
            input,
            pretty,
            syntax_only,
            max_memory,
            secrets,
            secret_patterns,
        }),
        Commands::Refs { expression, patterns } => run_refs(RefsOptions { expression, patterns }),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "pipeline_expr=info",
        _ => "pipeline_expr=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn run_check(mut options: CheckOptions) -> Result<(), CliError> {
    if options.input.is_none() && !options.syntax_only && !atty::is(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        if !buffer.trim().is_empty() {
            options.input = Some(buffer);
        }
    }

    match cli::execute_check(&options, &TracingTraceWriter)? {
        CheckResult::SyntaxValid => println!("Syntax is valid"),
        CheckResult::Success(value) => {
            let json = if options.pretty { to_json_pretty(&value) } else { to_json(&value) };
            println!("{}", json);
        }
    }
    Ok(())
}

fn run_refs(options: RefsOptions) -> Result<(), CliError> {
    let found = cli::execute_refs(&options, &TracingTraceWriter)?;
    for (pattern, referenced) in options.patterns.iter().zip(found) {
        println!("{pattern}\t{referenced}");
    }
    Ok(())
}
