use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    forms::{
        Attachment, DatatypeChoice, DatatypeForm, MessageContent, MessageForm, PoolForm,
        TokenAction, TokenForm,
    },
    ActiveForm, AppState, SandboxApi, SubmitOutcome,
};
use serde::Serialize;
use shared::{domain::TokenPoolType, protocol::BalanceQuery};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Drive a ledger sandbox server from the command line")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:3001")]
    server_url: String,

    /// Return as soon as the server accepts a submission.
    #[arg(long)]
    no_wait: bool,

    /// Give up waiting for a confirmation after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List network organizations
    Orgs {
        #[arg(long)]
        exclude_self: bool,
    },
    /// List verifiers keyed by organization DID
    Verifiers,
    /// List datatypes
    Datatypes,
    /// Show one datatype by name and version
    Datatype { name: String, version: String },
    /// List token pools
    Pools,
    /// Show token balances (non-zero by default)
    Balances {
        #[arg(long)]
        pool: Option<String>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        balance: Option<String>,
    },
    /// Broadcast a message to every organization
    Broadcast(MessageArgs),
    /// Send a message to selected organizations
    Private {
        #[command(flatten)]
        message: MessageArgs,
        /// Recipient DID; repeat for several.
        #[arg(long = "recipient", required = true)]
        recipients: Vec<String>,
    },
    /// Define a JSON-schema datatype
    DefineDatatype {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "1.0")]
        version: String,
        /// Schema as inline JSON.
        #[arg(long)]
        schema: String,
    },
    /// Create a token pool
    CreatePool {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        symbol: String,
        #[arg(long = "type", value_enum, default_value_t = PoolKind::Fungible)]
        pool_type: PoolKind,
    },
    /// Mint tokens into a pool
    Mint(TokenArgs),
    /// Burn tokens from a pool
    Burn(TokenArgs),
    /// Transfer tokens to another key
    Transfer {
        #[command(flatten)]
        token: TokenArgs,
        #[arg(long)]
        to: String,
    },
    /// Print relayed network events as they arrive
    Watch,
}

#[derive(Args, Debug)]
struct MessageArgs {
    /// Plain-text message body.
    value: Option<String>,
    /// JSON message body, used instead of the text value.
    #[arg(long, conflicts_with_all = ["value", "file"])]
    json: Option<String>,
    /// Bind the JSON body to a datatype, as `name:version`.
    #[arg(long, requires = "json")]
    datatype: Option<String>,
    /// Send a file as the message data.
    #[arg(long, conflicts_with = "value")]
    file: Option<PathBuf>,
    #[arg(long, default_value = "")]
    tag: String,
    #[arg(long, default_value = "")]
    topic: String,
}

#[derive(Args, Debug)]
struct TokenArgs {
    #[arg(long)]
    pool: String,
    #[arg(long)]
    amount: String,
    #[arg(long, default_value = "")]
    token_index: String,
    /// Attach a file as the transfer's message.
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long, default_value = "")]
    tag: String,
    #[arg(long, default_value = "")]
    topic: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PoolKind {
    Fungible,
    Nonfungible,
}

impl From<PoolKind> for TokenPoolType {
    fn from(kind: PoolKind) -> Self {
        match kind {
            PoolKind::Fungible => TokenPoolType::Fungible,
            PoolKind::Nonfungible => TokenPoolType::Nonfungible,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let api = SandboxApi::new(cli.server_url.clone());

    let form = match cli.command {
        Command::Orgs { exclude_self } => return print_json(&api.organizations(exclude_self).await?),
        Command::Verifiers => return print_json(&api.verifiers().await?),
        Command::Datatypes => return print_json(&api.datatypes().await?),
        Command::Datatype { name, version } => {
            return print_json(&api.datatype(&name, &version).await?)
        }
        Command::Pools => return print_json(&api.token_pools().await?),
        Command::Balances { pool, key, balance } => {
            let query = BalanceQuery { pool, key, balance };
            return print_json(&api.balances(&query).await?);
        }
        Command::Watch => return watch(&cli.server_url).await,
        Command::Broadcast(args) => ActiveForm::Message(message_form(args, Vec::new()).await?),
        Command::Private {
            message,
            recipients,
        } => ActiveForm::Message(message_form(message, recipients).await?),
        Command::DefineDatatype {
            name,
            version,
            schema,
        } => ActiveForm::Datatype(DatatypeForm {
            name,
            version,
            schema: serde_json::from_str(&schema).context("schema is not valid JSON")?,
        }),
        Command::CreatePool {
            name,
            symbol,
            pool_type,
        } => ActiveForm::Pool(PoolForm {
            name,
            symbol,
            pool_type: pool_type.into(),
            config: None,
        }),
        Command::Mint(args) => ActiveForm::Token(token_form(TokenAction::Mint, args, None).await?),
        Command::Burn(args) => ActiveForm::Token(token_form(TokenAction::Burn, args, None).await?),
        Command::Transfer { token, to } => {
            ActiveForm::Token(token_form(TokenAction::Transfer, token, Some(to)).await?)
        }
    };

    submit(&cli.server_url, form, cli.no_wait, cli.timeout_secs).await
}

async fn submit(
    server_url: &str,
    form: ActiveForm,
    no_wait: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let mut state = AppState::connect(server_url).await?;
    state.select_form(form);

    let outcome = state.submit().await?;
    let accepted = match outcome {
        SubmitOutcome::Accepted(accepted) => accepted,
        SubmitOutcome::Completed(body) => {
            state.shutdown();
            return print_json(&body);
        }
    };
    print_json(&accepted)?;

    if no_wait {
        state.shutdown();
        return Ok(());
    }
    if !state.is_ws_connected() {
        state.shutdown();
        bail!("event relay is not connected; cannot wait for {}", accepted.id);
    }

    info!(id = %accepted.id, "waiting for confirmation");
    let waited = match timeout_secs {
        Some(secs) => tokio::time::timeout(
            Duration::from_secs(secs),
            state.wait_for_confirmation(),
        )
        .await
        .with_context(|| format!("no confirmation for {} within {secs}s", accepted.id))?,
        None => state.wait_for_confirmation().await,
    };
    let confirmation = waited?;
    state.shutdown();

    if let Some(confirmation) = confirmation {
        println!(
            "{:?}: {}",
            confirmation.resolution, confirmation.event.event_type
        );
    }
    Ok(())
}

async fn watch(server_url: &str) -> Result<()> {
    let mut state = AppState::connect(server_url).await?;
    if !state.is_ws_connected() {
        bail!("event relay at {server_url} is not reachable");
    }
    let mut events = state.watcher.subscribe();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event feed lagged; some events were not printed");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        println!("{}", serde_json::to_string(&event)?);
        state.clear_new_events();
    }
    state.shutdown();
    Ok(())
}

async fn message_form(args: MessageArgs, recipients: Vec<String>) -> Result<MessageForm> {
    let content = if let Some(path) = args.file {
        MessageContent::File(read_attachment(path).await?)
    } else if let Some(json) = args.json {
        let datatype = args
            .datatype
            .map(|raw| match raw.split_once(':') {
                Some((name, version)) => Ok(DatatypeChoice {
                    name: name.to_string(),
                    version: version.to_string(),
                }),
                None => bail!("datatype must be given as name:version, got '{raw}'"),
            })
            .transpose()?;
        MessageContent::Json {
            value: serde_json::from_str(&json).context("message is not valid JSON")?,
            datatype,
        }
    } else {
        MessageContent::Text(args.value.unwrap_or_default())
    };

    Ok(MessageForm {
        private: !recipients.is_empty(),
        tag: args.tag,
        topic: args.topic,
        content,
        recipients,
    })
}

async fn token_form(action: TokenAction, args: TokenArgs, to: Option<String>) -> Result<TokenForm> {
    let attachment = match args.file {
        Some(path) => Some(read_attachment(path).await?),
        None => None,
    };
    Ok(TokenForm {
        action,
        pool: args.pool,
        amount: args.amount,
        token_index: args.token_index,
        to: to.unwrap_or_default(),
        tag: args.tag,
        topic: args.topic,
        attachment,
    })
}

async fn read_attachment(path: PathBuf) -> Result<Attachment> {
    Attachment::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
