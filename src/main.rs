use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use calagent_auth::{BrowserConsent, CredentialManager};
use calagent_core::Config;
use calagent_tools::{definitions, gemini_tools, openai_tools, CalendarFacade, Toolbox};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/calagent/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Sign in to Google, opening the consent page if needed
    Auth,
    /// Forget the stored credential
    SignOut,
    /// Print the tool definitions
    Tools {
        #[arg(long, value_enum, default_value_t = ToolFormat::Openai)]
        format: ToolFormat,
    },
    /// Invoke one tool and print its result record
    Call {
        /// Tool name, e.g. get_calendar_events
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Serve tool calls as JSON lines on stdin/stdout
    Stdio,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ToolFormat {
    Openai,
    Gemini,
    Plain,
}

/// One line of `stdio` input.
#[derive(Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init { force } => init_config(cli.config, force),
        Command::Auth => {
            let config = load_config(cli.config.as_deref())?;
            let manager = credential_manager(&config);
            let credential = manager
                .obtain_credential()
                .await
                .context("Google sign-in failed")?;
            tracing::info!("Credential stored at {}", manager.token_path().display());
            eprintln!("Signed in. Scopes: {}", credential.scopes.join(", "));
            Ok(())
        }
        Command::SignOut => {
            let config = load_config(cli.config.as_deref())?;
            let manager = credential_manager(&config);
            manager.sign_out().await.context("Failed to sign out")?;
            eprintln!("Signed out.");
            Ok(())
        }
        Command::Tools { format } => {
            let tools = definitions();
            let rendered = match format {
                ToolFormat::Openai => openai_tools(&tools),
                ToolFormat::Gemini => gemini_tools(&tools),
                ToolFormat::Plain => serde_json::to_value(&tools)?,
            };
            println!("{}", serde_json::to_string_pretty(&rendered)?);
            Ok(())
        }
        Command::Call { tool, args } => {
            let arguments: Value =
                serde_json::from_str(&args).context("--args must be a JSON object")?;
            let config = load_config(cli.config.as_deref())?;
            let toolbox = toolbox(&config);
            let record = toolbox.invoke(&tool, arguments).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Stdio => {
            let config = load_config(cli.config.as_deref())?;
            serve_stdio(&config).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let (config, validation) = Config::load_validated(path).map_err(|e| {
        let hint = e.user_message();
        anyhow::Error::new(e).context(hint)
    })?;
    calagent_core::init_logging(&config.logging.filter);

    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }

    tracing::debug!("Using token file {}", config.auth.token_path.display());
    Ok(config)
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    calagent_core::init_logging("info");

    let path = path.unwrap_or_else(Config::default_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Config::default()
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

fn credential_manager(config: &Config) -> CredentialManager<BrowserConsent> {
    let consent = BrowserConsent {
        port: config.auth.callback_port,
        open_browser: config.auth.open_browser,
    };
    CredentialManager::with_consent(
        &config.auth.token_path,
        &config.auth.client_secrets_path,
        config.auth.scopes.clone(),
        consent,
    )
}

fn toolbox(config: &Config) -> Toolbox<CredentialManager<BrowserConsent>> {
    let facade = CalendarFacade::new(credential_manager(config))
        .with_base_url(&config.calendar.api_base_url)
        .with_default_timezone(config.calendar.timezone.clone());
    Toolbox::new(facade)
}

async fn serve_stdio(config: &Config) -> Result<()> {
    let toolbox = toolbox(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!("Serving tool calls on stdin");

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record = match serde_json::from_str::<ToolCall>(line) {
            Ok(call) => toolbox.invoke(&call.name, call.arguments).await?,
            Err(e) => {
                tracing::warn!("Malformed tool call: {}", e);
                serde_json::json!({
                    "success": false,
                    "error": format!("An error occurred: malformed tool call: {}", e),
                    "error_kind": "invalid_input",
                })
            }
        };

        println!("{}", serde_json::to_string(&record)?);
    }

    tracing::info!("stdin closed, exiting");
    Ok(())
}
