use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use spanrules::{
    DiagnosticRenderer, EngineBuilder, EngineConfig, EngineError, OutputContext, ParseResult,
    Trace,
};
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "spanrules")]
#[command(about = "Trace invariant rule checker", long_about = None)]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a rule expression and print its diagnostics
    Check {
        /// Rule file, or `-` for stdin
        input: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Evaluate traces (JSON, one per line) against a rule directory
    Eval {
        /// Path to rules directory
        #[arg(short, long)]
        rules: Vec<PathBuf>,

        /// Trace file; stdin when omitted
        #[arg(short, long)]
        traces: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Html,
    Markdown,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(io::stderr)
            .init();
    }

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Check { input, format } => check(&input, format, config),
        Command::Eval { rules, traces } => eval(rules, traces.as_deref(), config),
    }
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .context("reading rule from stdin")?;
        Ok(source)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading rule file {}", input))
    }
}

fn check(input: &str, format: Format, config: EngineConfig) -> anyhow::Result<ExitCode> {
    let source = read_input(input)?;
    let result = spanrules::parse_rule_with_limits(&source, &config.limits);

    let context = match format {
        Format::Text | Format::Json => OutputContext::Plain,
        Format::Html => OutputContext::Html,
        Format::Markdown => OutputContext::Markdown,
    };
    let renderer =
        DiagnosticRenderer::new(context).with_max_message_length(config.limits.max_message_length);
    let rendered = renderer.render_result(&result);

    match format {
        Format::Text => print_text(&rendered, &source),
        Format::Json => println!("{}", serde_json::to_string_pretty(&rendered)?),
        Format::Html => {
            println!("<ul class=\"diagnostics\">");
            for d in rendered.diagnostics() {
                println!(
                    "  <li class=\"{}\" data-line=\"{}\" data-column=\"{}\">{}</li>",
                    d.severity, d.line, d.column, d.message
                );
            }
            println!("</ul>");
        }
        Format::Markdown => {
            for d in rendered.diagnostics() {
                println!("- **{}** ({}:{}): {}", d.severity, d.line, d.column, d.message);
            }
        }
    }

    Ok(if result.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_text(result: &ParseResult, source: &str) {
    for d in result.diagnostics() {
        println!("{}", d.format_with_source(source));
    }
    if result.valid {
        println!("rule is valid ({} warning(s))", result.warnings.len());
    } else {
        println!("rule is invalid ({} error(s))", result.errors.len());
    }
}

fn eval(rules: Vec<PathBuf>, traces: Option<&Path>, config: EngineConfig) -> anyhow::Result<ExitCode> {
    let builder = rules.iter().fold(EngineBuilder::from_config(config), |b, dir| {
        b.add_rule_dir(dir.to_string_lossy())
    });
    let engine = builder.build().context("building rule engine")?;
    eprintln!("Loaded {} rules", engine.rules().len());

    let reader: Box<dyn BufRead> = match traces {
        Some(path) => Box::new(io::BufReader::new(
            std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    // Process traces
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let trace: Trace = serde_json::from_str(&line)
            .with_context(|| format!("invalid trace on line {}", number + 1))?;

        let violations = match engine.evaluate_trace(&trace) {
            Ok(v) => v,
            Err(EngineError::ResourceLimit(reason)) => {
                tracing::warn!(trace_id = %trace.trace_id, %reason, "trace skipped");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        for violation in &violations {
            println!("{}", serde_json::to_string(violation)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}
