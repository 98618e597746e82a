//! Chronicle CLI
//!
//! Run a mirror session from the terminal, import a folder once, or check
//! which ignore rule applies to a path.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chronicle::config::ChronicleConfig;
use chronicle::error::{ChronicleError, Result};
use chronicle::remote::{with_timeout, Collaborators, RepoHost};
use chronicle::session::Session;
use chronicle::sync::{import_tree, Reconciler};
use chronicle::types::{RepoAction, SessionSpec, Visibility};
use chronicle::watch::{is_builtin_excluded, load_ignore_rules_from, PathFilter};

#[derive(Parser)]
#[command(name = "chronicle")]
#[command(about = "Mirror a local folder to GitHub with a summarized change log")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/chronicle/config.toml)
    #[arg(long, env = "CHRONICLE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a folder and sync it until Ctrl-C
    Watch {
        /// Folder to monitor
        dir: String,
        /// Repository name
        repo: String,
        /// Create the repository instead of using an existing one
        #[arg(long)]
        create: bool,
        /// Visibility when creating (public, private)
        #[arg(long, default_value = "private")]
        visibility: String,
        /// Upload existing files before watching
        #[arg(long)]
        import: bool,
    },
    /// Upload every eligible file once
    Import {
        /// Folder to upload
        dir: String,
        /// Existing repository name
        repo: String,
    },
    /// Show whether a path would be synced
    CheckIgnore {
        /// Monitored folder
        dir: String,
        /// Path relative to the folder
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(|p| PathBuf::from(shellexpand::tilde(&p).as_ref()));
    let config = ChronicleConfig::load(config_path.as_deref())?;

    match cli.command {
        Commands::Watch {
            dir,
            repo,
            create,
            visibility,
            import,
        } => {
            let spec = SessionSpec {
                directory_path: expand(&dir),
                repo_id: repo,
                repo_action: if create {
                    RepoAction::Create
                } else {
                    RepoAction::UseExisting
                },
                visibility: visibility.parse::<Visibility>()?,
                import_existing: import,
            };

            let collaborators = Collaborators::from_env(&config)?;
            let session = Session::start(spec, &collaborators, config).await?;
            if let Some(report) = session.import_report() {
                println!(
                    "Imported {} files ({} unchanged, {} ignored)",
                    report.uploaded.len(),
                    report.unchanged.len(),
                    report.ignored.len()
                );
            }
            println!(
                "Monitoring {} and syncing with {}. Press Ctrl-C to stop.",
                session.root().display(),
                session.repo_id()
            );

            tokio::signal::ctrl_c().await?;

            match session.stop().await? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("Nothing pending, stopped."),
            }
        }

        Commands::Import { dir, repo } => {
            let root = expand(&dir);
            let collaborators = Collaborators::from_env(&config)?;
            if !with_timeout(config.request_timeout(), collaborators.host.exists(&repo)).await? {
                return Err(ChronicleError::RepoNotFound(repo));
            }

            let reconciler = Reconciler::new(root, repo, &collaborators, config);
            let report = import_tree(&reconciler).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::CheckIgnore { dir, path } => {
            let root = expand(&dir);
            let relative = path.trim_start_matches("./").replace('\\', "/");
            let filter = PathFilter::from_config(&config);
            println!("{}", describe_ignore(&root, &relative, &filter));
        }
    }

    Ok(())
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn describe_ignore(root: &Path, relative: &str, filter: &PathFilter) -> String {
    if !filter.is_ignored(root, relative) {
        return format!("{}: synced", relative);
    }
    if is_builtin_excluded(relative) {
        return format!("{}: ignored (.git is never synced)", relative);
    }
    if filter.is_reserved(relative) {
        return format!("{}: ignored (remote change log)", relative);
    }

    let ignore_file = filter.ignore_file();
    let root_rules = load_ignore_rules_from(root, ignore_file);
    if let Some(rule) = root_rules.matching_rule(relative) {
        return format!("{}: ignored by {}:{}", relative, ignore_file, rule.pattern());
    }

    match relative.rsplit_once('/') {
        Some((parent, leaf)) => {
            let rules = load_ignore_rules_from(&root.join(parent), ignore_file);
            match rules.matching_rule(leaf) {
                Some(rule) => format!(
                    "{}: ignored by {}/{}:{}",
                    relative,
                    parent,
                    ignore_file,
                    rule.pattern()
                ),
                None => format!("{}: ignored", relative),
            }
        }
        None => format!("{}: ignored", relative),
    }
}
