use anyhow::{Context as _, Result};
use clap::Parser;
use oauth2_token_auth::{MicrosoftClient, TerminalAuthorizer, TokenAcquisitionEngine};
use oauth2_token_config::{Config, LogConfig, LogFormat};
use oauth2_token_store::FileCacheStore;
use oauth2_token_types::{CacheStore, TokenError};
use std::{
    io::{IsTerminal as _, Write as _},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "get-oauth2-token",
    version,
    about = "Fetch an OAuth2 access token for IMAP/SMTP, refreshing from a local cache when possible"
)]
struct Cli {
    /// Where to write the token, `-` for stdout.
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    output: String,
    /// Client (application) id.
    #[arg(long, value_name = "ID")]
    client: Option<String>,
    /// Client secret, for confidential clients.
    #[arg(long, value_name = "SECRET")]
    secret: Option<String>,
    /// Requested scope. May be given several times and replaces the configured list.
    #[arg(long = "scope", value_name = "SCOPE")]
    scopes: Vec<String>,
    /// Token cache file. Without one, nothing is kept between runs.
    #[arg(long, value_name = "FILE")]
    cache: Option<PathBuf>,
    #[arg(long, value_name = "URI")]
    redirect_uri: Option<String>,
    /// Identity provider base URL.
    #[arg(long, value_name = "URL")]
    authority: Option<String>,
    /// YAML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print the XOAUTH2 string instead of the bare access token.
    #[arg(long)]
    auth_string: bool,
    /// Allow the browser authorization step (default: when stdout is a terminal).
    #[arg(long, overrides_with = "no_interactive")]
    interactive: bool,
    /// Never prompt; fail if the cache cannot produce a token.
    #[arg(long, overrides_with = "interactive")]
    no_interactive: bool,
    /// Open the authorization URL in the system browser.
    #[arg(long)]
    open_browser: bool,
    /// Debug logging, and full error chains on failure.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn interactive(&self) -> bool {
        self.interactive_or(std::io::stdout().is_terminal())
    }

    /// Explicit flags win; otherwise a captured stdout means a headless caller.
    fn interactive_or(&self, stdout_is_terminal: bool) -> bool {
        if self.interactive {
            true
        } else if self.no_interactive {
            false
        } else {
            stdout_is_terminal
        }
    }

    fn load_config(&self) -> Result<Config> {
        let mut config =
            Config::load(self.config.as_deref()).context("cannot load configuration")?;
        if let Some(client) = &self.client {
            config.client_id.clone_from(client);
        }
        if self.secret.is_some() {
            config.client_secret.clone_from(&self.secret);
        }
        if !self.scopes.is_empty() {
            config.scopes.clone_from(&self.scopes);
        }
        if self.cache.is_some() {
            config.cache.clone_from(&self.cache);
        }
        if let Some(uri) = &self.redirect_uri {
            config.redirect_uri.clone_from(uri);
        }
        if let Some(authority) = &self.authority {
            config.authority.clone_from(authority);
        }
        config.open_browser |= self.open_browser;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LogConfig::default(), cli.debug);
            return fail(e, cli.debug);
        }
    };
    init_tracing(&config.log, cli.debug);

    match run(&cli, &config).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => fail(e, cli.debug),
    }
}

/// `RUST_LOG` wins over the configured level; `--debug` wins over both.
fn init_tracing(log: &LogConfig, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&log.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match log.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    drop(result);
}

fn fail(error: anyhow::Error, debug: bool) -> Result<ExitCode> {
    if debug {
        return Err(error);
    }
    tracing::error!("{error:#}");
    Ok(ExitCode::FAILURE)
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    config.validate()?;
    let interactive = cli.interactive();

    let client = Arc::new(MicrosoftClient::new(
        config.client_identity()?,
        &config.authority,
    ));
    let authorizer = Arc::new(TerminalAuthorizer::stdin(config.open_browser));
    let store = config.cache.as_ref().map(|path| {
        tracing::debug!(cache = %path.display(), "using token cache");
        Arc::new(FileCacheStore::new(path)) as Arc<dyn CacheStore>
    });
    if store.is_none() {
        tracing::debug!("no token cache configured");
    }

    let mut engine = TokenAcquisitionEngine::open(
        client,
        authorizer,
        store,
        config.scope_set()?,
        config.redirect_uri.clone(),
    )
    .await?;

    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let output = acquire_until(&mut engine, interactive, cli.auth_string, interrupt).await?;
    write_output(&cli.output, &output)
}

/// Run the acquisition until it completes or `interrupt` fires, then persist
/// the cache in both cases.
async fn acquire_until(
    engine: &mut TokenAcquisitionEngine,
    interactive: bool,
    auth_string: bool,
    interrupt: impl Future<Output = ()>,
) -> Result<String> {
    let outcome = tokio::select! {
        result = acquire(&mut *engine, interactive, auth_string) => Some(result),
        () = interrupt => None,
    };

    let persisted = engine.persist().await;
    match outcome {
        Some(Ok(output)) => {
            persisted?;
            Ok(output)
        }
        Some(Err(e)) => {
            if let Err(save_err) = persisted {
                tracing::error!(error = %save_err, "cannot save token cache");
            }
            Err(e.into())
        }
        None => {
            persisted?;
            anyhow::bail!("interrupted")
        }
    }
}

async fn acquire(
    engine: &mut TokenAcquisitionEngine,
    interactive: bool,
    auth_string: bool,
) -> Result<String, TokenError> {
    let token = engine.get_token(interactive).await?;
    if auth_string {
        // The token is now cached, so this second lookup is silent.
        return engine.auth_string().await;
    }
    Ok(token)
}

/// Stdout gets a trailing newline, a file gets the value unchanged.
fn write_output(target: &str, output: &str) -> Result<()> {
    if target == "-" {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{output}")?;
        stdout.flush()?;
        return Ok(());
    }
    let path = Path::new(target);
    std::fs::write(path, output)
        .with_context(|| format!("cannot write {}", path.display()))
}
