use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use novelsmith::cli::CommandContext;
use novelsmith::cli::commands;
use novelsmith::novel::NewProject;

#[derive(Parser)]
#[command(name = "novelsmith")]
#[command(version, about = "Multi-agent LLM pipeline for long-form fiction manuscripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file layered over the global and project files
    #[arg(long, short, global = true, env = "NOVELSMITH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize novelsmith in the current directory
    Init {
        #[arg(long, short, help = "Overwrite existing initialization")]
        force: bool,
    },

    /// Create a project from a premise
    New {
        #[arg(long, short)]
        title: String,
        #[arg(long, short, help = "One-paragraph premise of the story")]
        premise: String,
        #[arg(long, short, default_value = "literary fiction")]
        genre: String,
        #[arg(long, default_value = "")]
        tone: String,
        #[arg(long, short = 'n', default_value = "12", help = "Number of regular chapters")]
        chapters: u32,
        #[arg(long, help = "Add a prologue (chapter 0)")]
        prologue: bool,
        #[arg(long, help = "Add an epilogue")]
        epilogue: bool,
        #[arg(long = "author-note", help = "Add an author's note")]
        author_note: bool,
        #[arg(long = "style", help = "Free-form style notes for every writer call")]
        style_notes: Option<String>,
    },

    /// Generate a project from the start
    Generate {
        #[arg(help = "Project id or unique prefix")]
        project: String,
        #[arg(long = "no-scenes", help = "Hide per-scene progress lines")]
        no_scenes: bool,
    },

    /// Resume a paused, cancelled or failed project
    Resume {
        #[arg(help = "Project id or unique prefix")]
        project: String,
        #[arg(long = "no-scenes", help = "Hide per-scene progress lines")]
        no_scenes: bool,
    },

    /// Ask a running project to pause after its current stage
    Pause { project: String },

    /// Cancel a running, paused or failed project
    Cancel { project: String },

    /// Archive a finished, cancelled or never-started project
    Archive { project: String },

    /// List projects, or show one project in detail
    Status {
        #[arg(help = "Project id or unique prefix")]
        project: Option<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
        #[arg(short = 'd', long, help = "Include chapter notes and summaries")]
        detailed: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mnovelsmith encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }

        eprintln!(
            "\n\x1b[33mCommitted stages are safe; \
             'novelsmith resume <project>' continues from there.\x1b[0m"
        );
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::New {
            title,
            premise,
            genre,
            tone,
            chapters,
            prologue,
            epilogue,
            author_note,
            style_notes,
        } => {
            let ctx = CommandContext::load(config)?;
            commands::new::run(
                &ctx,
                NewProject {
                    title,
                    premise,
                    genre,
                    tone,
                    chapter_count: chapters,
                    has_prologue: prologue,
                    has_epilogue: epilogue,
                    has_author_note: author_note,
                    style_notes,
                },
            )?;
        }
        Commands::Generate { project, no_scenes } => {
            let ctx = CommandContext::load(config)?;
            let rt = Runtime::new()?;
            rt.block_on(commands::generate::run(&ctx, &project, false, !no_scenes))?;
        }
        Commands::Resume { project, no_scenes } => {
            let ctx = CommandContext::load(config)?;
            let rt = Runtime::new()?;
            rt.block_on(commands::generate::run(&ctx, &project, true, !no_scenes))?;
        }
        Commands::Pause { project } => {
            commands::lifecycle::pause(&CommandContext::load(config)?, &project)?;
        }
        Commands::Cancel { project } => {
            commands::lifecycle::cancel(&CommandContext::load(config)?, &project)?;
        }
        Commands::Archive { project } => {
            commands::lifecycle::archive(&CommandContext::load(config)?, &project)?;
        }
        Commands::Status {
            project,
            format,
            detailed,
        } => {
            let ctx = CommandContext::load(config)?;
            commands::status::run(&ctx, project.as_deref(), &format, detailed)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                commands::config::show(config, &format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project(force)?;
                }
            }
        },
    }

    Ok(())
}
