use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

mod api;
mod cli;
mod core;
mod host;
mod poller;

use crate::core::models::{OutputFormat, TaskQuery};
use crate::core::settings::Settings;

#[derive(Parser)]
#[command(name = "pagemail")]
#[command(author, version, about = "Submit and watch PageMail web page captures")]
struct Cli {
    /// Log at debug level regardless of config
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List capture tasks
    List {
        /// Only show tasks with this status
        #[arg(long)]
        status: Option<String>,

        /// Page number
        #[arg(long)]
        page: Option<u32>,

        /// Tasks per page
        #[arg(long)]
        limit: Option<u32>,

        /// Keep polling and reprint on change
        #[arg(short, long)]
        watch: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one capture task
    Show {
        id: String,

        /// Keep polling until the task completes or fails
        #[arg(short, long)]
        watch: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit a URL for capture
    Submit {
        url: String,

        /// Output format; repeat for several (default: pdf)
        #[arg(short, long = "format", value_enum)]
        formats: Vec<OutputFormat>,

        /// Cookie header to send when loading the page
        #[arg(long)]
        cookies: Option<String>,

        /// Deliver results to this email delivery ID
        #[arg(long, conflicts_with = "deliver_webhook")]
        deliver_email: Option<String>,

        /// Deliver results to this webhook delivery ID
        #[arg(long)]
        deliver_webhook: Option<String>,

        /// Watch the task until it completes or fails
        #[arg(short, long)]
        watch: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Queue a failed capture task again
    Retry { id: String },

    /// Delete a capture task
    Delete { id: String },

    /// Download the captured files of a task
    Download {
        id: String,

        /// Only download this format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Directory to save into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

fn log_filter(debug: bool) -> EnvFilter {
    let default_level = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn init_logging(debug: bool) -> FilterHandle {
    let (filter, handle) = reload::Layer::new(log_filter(debug));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    handle
}

/// Raises the level to debug when the config asks for it, unless `RUST_LOG`
/// or `--verbose` already decided.
fn apply_debug(filter: &FilterHandle, settings: &Settings, verbose: bool) {
    if !settings.debug || verbose || std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return;
    }
    if let Err(e) = filter.reload(EnvFilter::new("debug")) {
        tracing::warn!(error = %e, "Failed to raise log level");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let filter = init_logging(cli.verbose);
    let settings = Settings::load()?;
    apply_debug(&filter, &settings, cli.verbose);
    tracing::debug!(
        path = ?Settings::config_path(),
        base_url = %settings.api.base_url,
        "Settings loaded"
    );

    match cli.command {
        Commands::List {
            status,
            page,
            limit,
            watch,
            json,
        } => {
            let query = TaskQuery {
                page,
                limit,
                status,
            };
            cli::list::run(&settings, query, watch, json).await
        }
        Commands::Show { id, watch, json } => cli::show::run(&settings, id, watch, json).await,
        Commands::Submit {
            url,
            formats,
            cookies,
            deliver_email,
            deliver_webhook,
            watch,
            json,
        } => {
            let submission = cli::submit::Submission {
                url,
                formats,
                cookies,
                deliver_email,
                deliver_webhook,
            };
            cli::submit::run(&settings, submission, watch, json).await
        }
        Commands::Retry { id } => cli::retry::run(&settings, id).await,
        Commands::Delete { id } => cli::delete::run(&settings, id).await,
        Commands::Download { id, format, output } => {
            cli::download::run(&settings, id, format, output).await
        }
        Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_events_logged_and_debug_applied() {
        let captured = Captured::default();
        let (filter, handle) = reload::Layer::new(EnvFilter::new("info"));
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry().with(filter).with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            let dir = tempfile::tempdir().unwrap();
            let mut settings = Settings::load_from(&dir.path().join("config.toml")).unwrap();
            tracing::debug!("before config debug");

            settings.debug = true;
            apply_debug(&handle, &settings, false);
            tracing::debug!("after config debug");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Config file not found, using defaults"));
        assert!(!output.contains("before config debug"));
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            assert!(output.contains("after config debug"));
        }
    }
}
