mod charset;
mod commands;

use clap::Parser;
use clap::Subcommand;
use commands::CaptureArgs;
use commands::RecordSource;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MARGINALIA_LOG";

#[derive(Parser)]
#[command(name = "marginalia")]
#[command(about = "Capture text selections as portable records and find them again")]
#[command(version)]
struct Cli {
    /// Log at debug level regardless of MARGINALIA_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select text in a saved page and print its selection record
    Capture {
        /// Saved HTML page
        #[arg(long)]
        page: PathBuf,
        /// Address the page was loaded from
        #[arg(long)]
        url: String,
        /// Text to select
        #[arg(long)]
        text: String,
        /// Which match of --text to select, starting at 1
        #[arg(long, default_value_t = 1)]
        occurrence: usize,
        /// Note id to store the record under
        #[arg(long, requires = "store")]
        note: Option<String>,
        /// Highlight store directory
        #[arg(long, requires = "note")]
        store: Option<PathBuf>,
    },
    /// Find a recorded selection in a saved page
    Relocate {
        #[arg(long)]
        page: PathBuf,
        #[arg(long)]
        url: String,
        /// Selection record JSON file
        #[arg(long, conflicts_with = "note", required_unless_present = "note")]
        record: Option<PathBuf>,
        #[arg(long, requires = "store")]
        note: Option<String>,
        #[arg(long, requires = "note")]
        store: Option<PathBuf>,
    },
    /// List stored highlights for a site
    Show {
        #[arg(long)]
        store: PathBuf,
        /// Site host, e.g. example.com
        #[arg(long)]
        site: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = match cli.command {
        Commands::Capture {
            page,
            url,
            text,
            occurrence,
            note,
            store,
        } => commands::capture(CaptureArgs {
            page,
            url,
            text,
            occurrence,
            note,
            store,
        }),
        Commands::Relocate {
            page,
            url,
            record,
            note,
            store,
        } => {
            let source = match (record, note, store) {
                (Some(path), _, _) => RecordSource::File(path),
                (None, Some(note), Some(store)) => RecordSource::Stored { note, store },
                _ => {
                    eprintln!("relocate needs --record or --note with --store");
                    return ExitCode::from(2);
                }
            };
            commands::relocate(&page, &url, source)
        }
        Commands::Show { store, site } => commands::show(store, &site),
    };

    match output {
        Ok(text) => {
            if !text.is_empty() {
                println!("{text}");
            }
            ExitCode::SUCCESS
        }
        Err(failure) => {
            error!(code = failure.code, "command failed");
            eprintln!("marginalia: {failure}");
            ExitCode::FAILURE
        }
    }
}
