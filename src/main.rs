use anyhow::{Context, Result, bail};
use clap::Parser;
use flagsweep::credentials::check_token_format;
use flagsweep::env::{SystemEnvironment, TOKEN_ENV, TOKEN_FILE_ENV, resolve_token};
use flagsweep::flags::archive_flags;
use flagsweep::{ClientOptions, ConfigurationError, FlagClient, FlagService};
use serde::Serialize;

/// flagsweep - feature flag management API client
///
/// The API token is read from FLAGSWEEP_API_TOKEN, or from the file named by
/// FLAGSWEEP_API_TOKEN_FILE. FLAGSWEEP_BASE_URL overrides the API location.
///
/// Examples:
///   flagsweep flags list my-project
///   flagsweep flags archive my-project old-banner old-footer
#[derive(Parser, Debug)]
#[command(author, version = env!("FLAGSWEEP_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL (defaults to https://app.launchdarkly.com)
    #[arg(long = "base-url", value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Maximum requests issued per second (minimum 1)
    #[arg(long = "max-rps", value_name = "N", global = true, allow_negative_numbers = true)]
    max_rps: Option<i64>,

    /// Additional attempts for transient failures (minimum 0)
    #[arg(long = "max-retries", value_name = "N", global = true, allow_negative_numbers = true)]
    max_retries: Option<i64>,

    /// Per-attempt timeout in milliseconds (minimum 1000)
    #[arg(long = "timeout-ms", value_name = "MS", global = true, allow_negative_numbers = true)]
    timeout_ms: Option<i64>,

    /// Skip requests while the API is considered unhealthy
    #[arg(long = "degrade", global = true)]
    degrade: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Feature flag operations
    Flags {
        #[command(subcommand)]
        command: FlagCommands,
    },

    /// Probe the API and print health statistics
    Health,

    /// Check the API token against the strict token format
    CheckToken,
}

#[derive(clap::Subcommand, Debug)]
enum FlagCommands {
    /// List flags in a project
    List { project: String },

    /// Show one flag
    Get { project: String, key: String },

    /// Archive one or more flags
    Archive {
        project: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Restore an archived flag
    Restore { project: String, key: String },

    /// Show evaluation activity of a flag in an environment
    Status {
        project: String,
        environment: String,
        key: String,
    },
}

impl Cli {
    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            max_rps: self.max_rps,
            max_retries: self.max_retries,
            timeout_ms: self.timeout_ms,
            enable_graceful_degradation: Some(self.degrade),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

async fn run_flags(client: &FlagClient, command: FlagCommands) -> Result<()> {
    match command {
        FlagCommands::List { project } => print_json(&client.list_flags(&project).await?),
        FlagCommands::Get { project, key } => print_json(&client.get_flag(&project, &key).await?),
        FlagCommands::Archive { project, keys } => {
            let summary = archive_flags(client, &project, &keys).await;
            print_json(&summary.archived)?;
            for (key, error) in &summary.failed {
                eprintln!("{}: {}", key, error);
            }
            if !summary.failed.is_empty() {
                bail!("{} of {} flags could not be archived", summary.failed.len(), keys.len());
            }
            Ok(())
        }
        FlagCommands::Restore { project, key } => {
            print_json(&client.restore_flag(&project, &key).await?)
        }
        FlagCommands::Status {
            project,
            environment,
            key,
        } => print_json(&client.get_flag_status(&project, &environment, &key).await?),
    }
}

async fn check_token(env: &SystemEnvironment) -> Result<()> {
    let token = resolve_token(env)
        .await?
        .ok_or(ConfigurationError::MissingToken)
        .with_context(|| format!("Set {} or {}", TOKEN_ENV, TOKEN_FILE_ENV))?;
    check_token_format(&token)?;
    println!("Token format OK");
    Ok(())
}

async fn connect(env: &SystemEnvironment, options: ClientOptions) -> Result<FlagClient> {
    FlagClient::from_env(env, options)
        .await
        .context("Failed to configure API client")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let env = SystemEnvironment;
    let options = cli.client_options();

    match cli.command {
        Commands::CheckToken => check_token(&env).await?,
        Commands::Flags { command } => {
            let client = connect(&env, options).await?;
            run_flags(&client, command).await?;
        }
        Commands::Health => {
            let client = connect(&env, options).await?;
            let result = client.check_health().await;
            print_json(&client.health_stats())?;
            if let Some(error) = result.error {
                bail!("Health check failed: {}", error);
            }
        }
    }
    Ok(())
}
