//! Webhook receiver entry point.
//!
//! This binary is the composition root for the whole system. Responsibilities:
//!
//! 1. **Parse flags**: listen address, config path, deployment convention,
//!    and launcher limits. Every flag has a `WEBHOOK_RECEIVER_*` environment
//!    fallback.
//! 2. **Wire logging**: configure `tracing-subscriber` from `RUST_LOG`
//!    (default `info`) in text or JSON form. All spans and events from every
//!    crate in the workspace flow through this subscriber.
//! 3. **Load configuration**: read the YAML project file once, report which
//!    entries are usable, and freeze it into a shared [`pipeline::ConfigStore`].
//! 4. **Construct infrastructure**: build the [`launcher::ProcessLauncher`],
//!    inject it into a [`pipeline::HookPipeline`], and hand that to the
//!    [`listener`] serve loop until Ctrl-C or SIGTERM.
//!
//! A missing or unparseable config file is fatal at startup. Nothing after
//! startup is.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use launcher::{PayloadDelivery, ProcessLauncher};
use listener::{ReceiverState, DEFAULT_MAX_BODY_BYTES};
use pipeline::{
    ConfigEntry, ConfigStore, HookConvention, HookPipeline, ProjectId, ProjectPath, RequestParser,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs configured commands when a code-hosting webhook arrives", long_about = None)]
struct Cli {
    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_ADDRESS",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        help = "Address to listen on"
    )]
    address: IpAddr,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_PORT",
        default_value_t = 8666,
        help = "Port to listen on"
    )]
    port: u16,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_CONFIG",
        value_name = "PATH",
        help = "YAML file mapping project ids to command, secret and background"
    )]
    config: PathBuf,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_CONVENTION",
        value_enum,
        default_value_t = Convention::Gitlab,
        help = "Where the hosting service puts the token and project id"
    )]
    convention: Convention,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_TOKEN_HEADER",
        value_name = "NAME",
        conflicts_with = "no_token_header",
        help = "Header carrying the secret token (overrides the convention)"
    )]
    token_header: Option<String>,

    #[arg(long, help = "Never read the secret token from a header")]
    no_token_header: bool,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_TOKEN_FIELD",
        value_name = "KEY",
        help = "Top-level payload key carrying the secret token (overrides the convention)"
    )]
    token_field: Option<String>,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_PROJECT_PATH",
        value_name = "DOTTED.PATH",
        value_parser = parse_project_path,
        help = "Payload path to the project id, e.g. project.name (overrides the convention)"
    )]
    project_path: Option<ProjectPath>,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_PAYLOAD_DELIVERY",
        value_name = "stdin|none",
        default_value = "stdin",
        help = "Whether commands receive the request body on stdin"
    )]
    payload_delivery: PayloadDelivery,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_COMMAND_TIMEOUT",
        value_name = "SECONDS",
        default_value_t = 0,
        help = "Kill foreground commands after this many seconds (0 = no limit)"
    )]
    command_timeout: u64,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_MAX_BODY_BYTES",
        value_name = "BYTES",
        default_value_t = DEFAULT_MAX_BODY_BYTES,
        help = "Largest accepted webhook body"
    )]
    max_body_bytes: usize,

    #[arg(
        long,
        env = "WEBHOOK_RECEIVER_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text,
        help = "Log output format"
    )]
    log_format: LogFormat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Convention {
    /// Token in `X-Gitlab-Token`, project at `project.name`.
    Gitlab,
    /// Token in the payload's `secret` field, project at `repository.html_url`.
    Gitea,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    fn default_timeout(&self) -> Option<Duration> {
        (self.command_timeout > 0).then(|| Duration::from_secs(self.command_timeout))
    }

    /// The selected preset with any individual overrides applied.
    fn hook_convention(&self) -> HookConvention {
        let preset = match self.convention {
            Convention::Gitlab => HookConvention::gitlab(),
            Convention::Gitea => HookConvention::gitea(),
        };
        let token_header = if self.no_token_header {
            None
        } else {
            self.token_header
                .clone()
                .or_else(|| preset.token_header().map(str::to_string))
        };
        let token_field = self
            .token_field
            .clone()
            .or_else(|| preset.token_field().map(str::to_string));
        let project_path = self
            .project_path
            .clone()
            .unwrap_or_else(|| preset.project_path().clone());
        HookConvention::new(token_header, token_field, project_path)
    }
}

fn parse_project_path(value: &str) -> Result<ProjectPath, String> {
    ProjectPath::parse(value)
        .ok_or_else(|| format!("'{value}' is not a dotted key path (e.g. project.name)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let store = load_config(&cli.config)?;
    report_config(&cli.config, &store);

    let convention = cli.hook_convention();
    info!(
        token_header = convention.token_header().unwrap_or("-"),
        token_field = convention.token_field().unwrap_or("-"),
        project_path = %convention.project_path(),
        "hook convention"
    );

    let launcher = ProcessLauncher::new(cli.payload_delivery, cli.default_timeout());
    let pipeline = HookPipeline::new(
        Arc::new(store),
        RequestParser::new(convention),
        Arc::new(launcher),
    );
    let state = ReceiverState::new(pipeline, cli.max_body_bytes);

    let addr = cli.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    listener::serve(listener, state, shutdown_signal()).await?;
    info!("webhook receiver stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn load_config(path: &Path) -> anyhow::Result<ConfigStore> {
    let document = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    ConfigStore::from_yaml_str(&document)
        .with_context(|| format!("invalid config file {}", path.display()))
}

/// Logs how many projects can be dispatched and why the others cannot.
fn report_config(path: &Path, store: &ConfigStore) {
    info!(
        config = %path.display(),
        projects = store.len(),
        complete = store.complete_count(),
        "configuration loaded"
    );
    if store.is_empty() {
        warn!("no projects configured; every hook will be rejected");
    }
    for (project, missing) in incomplete_entries(store) {
        warn!(%project, missing, "project entry is incomplete and will never run");
    }
}

/// Projects that can never be dispatched, with the first field each lacks.
fn incomplete_entries(store: &ConfigStore) -> Vec<(&ProjectId, &'static str)> {
    store
        .entries()
        .filter_map(|(project, entry)| match entry {
            ConfigEntry::Incomplete { missing } => Some((project, *missing)),
            ConfigEntry::Complete(_) => None,
        })
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["webhook-receiver"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("flags parse")
    }

    #[test]
    fn defaults() {
        let cli = parse(&["--config", "hooks.yaml"]);
        assert_eq!(cli.listen_addr(), "0.0.0.0:8666".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.config, PathBuf::from("hooks.yaml"));
        assert_eq!(cli.convention, Convention::Gitlab);
        assert_eq!(cli.payload_delivery, PayloadDelivery::Stdin);
        assert_eq!(cli.default_timeout(), None);
        assert_eq!(cli.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert_eq!(cli.hook_convention(), HookConvention::gitlab());
    }

    #[test]
    fn config_is_required() {
        assert!(Cli::try_parse_from(["webhook-receiver"]).is_err());
    }

    #[test]
    fn listen_flags() {
        let cli = parse(&["--config", "c.yaml", "--address", "127.0.0.1", "--port", "9000"]);
        assert_eq!(cli.listen_addr(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn gitea_preset() {
        let cli = parse(&["--config", "c.yaml", "--convention", "gitea"]);
        assert_eq!(cli.hook_convention(), HookConvention::gitea());
    }

    #[test]
    fn overrides_apply_on_top_of_preset() {
        let cli = parse(&[
            "--config",
            "c.yaml",
            "--convention",
            "gitea",
            "--token-header",
            "X-Hook-Secret",
            "--project-path",
            "repository.full_name",
        ]);
        let convention = cli.hook_convention();
        assert_eq!(convention.token_header(), Some("x-hook-secret"));
        assert_eq!(convention.token_field(), Some("secret"));
        assert_eq!(convention.project_path().to_string(), "repository.full_name");
    }

    #[test]
    fn header_lookup_can_be_disabled() {
        let cli = parse(&["--config", "c.yaml", "--no-token-header"]);
        let convention = cli.hook_convention();
        assert_eq!(convention.token_header(), None);
        assert_eq!(convention.token_field(), Some("secret"));
    }

    #[test]
    fn token_header_conflicts_with_no_token_header() {
        let result = Cli::try_parse_from([
            "webhook-receiver",
            "--config",
            "c.yaml",
            "--token-header",
            "X-Token",
            "--no-token-header",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_bad_project_path() {
        let result = Cli::try_parse_from([
            "webhook-receiver",
            "--config",
            "c.yaml",
            "--project-path",
            "project..name",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn launcher_flags() {
        let cli = parse(&[
            "--config",
            "c.yaml",
            "--payload-delivery",
            "none",
            "--command-timeout",
            "30",
            "--max-body-bytes",
            "4096",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.payload_delivery, PayloadDelivery::Discard);
        assert_eq!(cli.default_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cli.max_body_bytes, 4096);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_payload_delivery() {
        let result = Cli::try_parse_from([
            "webhook-receiver",
            "--config",
            "c.yaml",
            "--payload-delivery",
            "argv",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn load_config_reads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proj-a:\n  command: echo hi\n  secret: s3cr3t\nproj-b:\n  secret: x").unwrap();
        let store = load_config(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.complete_count(), 1);
    }

    #[test]
    fn incomplete_entries_name_the_missing_field() {
        let store = ConfigStore::from_yaml_str(
            "ok:\n  command: deploy\n  secret: x\nno-cmd:\n  secret: x\nno-secret:\n  command: deploy\nbare:\n",
        )
        .unwrap();
        let incomplete: Vec<(&str, &str)> = incomplete_entries(&store)
            .into_iter()
            .map(|(project, missing)| (project.as_str(), missing))
            .collect();
        assert_eq!(
            incomplete,
            vec![("bare", "command"), ("no-cmd", "command"), ("no-secret", "secret")]
        );
    }

    #[test]
    fn complete_config_reports_nothing_incomplete() {
        let store = ConfigStore::from_yaml_str("ok:\n  command: deploy\n  secret: x\n").unwrap();
        assert!(incomplete_entries(&store).is_empty());
    }

    #[test]
    fn load_config_fails_for_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_config(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn load_config_fails_for_bad_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "- just\n- a list").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }
}
