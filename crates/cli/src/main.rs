use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use models::review::CreateReview;
use reqwest::Method;
use secrecy::SecretString;
use serde::Serialize;
use services::services::{
    api_client::{ApiClient, ApiError, RequestOptions},
    config::{ClientConfig, ReferencePolicy},
    credential_store::{
        CredentialStore, FallbackCredentialStore, FileCredentialStore, MemoryCredentialStore,
    },
    review_gate::{GateDecision, ReviewGate},
    workshop_api::WorkshopApi,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod terminal;

use terminal::{TerminalNotifier, TerminalRedirect, TerminalReviewPrompt};

#[derive(Parser, Debug)]
#[command(
    name = "workshop",
    version,
    about = "Command-line client for the workshop management API"
)]
struct Cli {
    /// Backend base URL (defaults to WORKSHOP_API_URL, also read from .env)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Storage key the bearer token is kept under
    #[arg(long, env = "WORKSHOP_TOKEN_KEY", global = true)]
    token_key: Option<String>,

    /// Resolve $ref back-references instead of passing them through
    #[arg(long, global = true)]
    resolve_refs: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn", global = true)]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the bearer token
    Login {
        email: String,
        /// Prompted for when omitted
        #[arg(long, env = "WORKSHOP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored bearer token
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List users (admin)
    Users,
    /// List or look up inventory items
    Inventory {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        search: Option<String>,
        /// Only items at or below their reorder level
        #[arg(long)]
        low_stock: bool,
    },
    /// List or look up orders
    Orders {
        #[arg(long)]
        id: Option<i64>,
        /// Only pending and in-progress orders
        #[arg(long)]
        open: bool,
    },
    /// List invoices
    Invoices {
        /// Only invoices still awaiting payment
        #[arg(long)]
        outstanding: bool,
    },
    /// List reviews
    Reviews {
        /// Only completed orders still waiting for a review
        #[arg(long)]
        pending: bool,
    },
    /// Review a completed order
    Review {
        order_id: i64,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Show time slots for a day
    Slots {
        /// Day to query (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Hide fully booked slots
        #[arg(long)]
        available: bool,
    },
    /// Mechanic workload summary
    Dashboard,
    /// Poll for pending reviews until interrupted
    WatchReviews {
        #[arg(long, default_value = "60")]
        interval_secs: u64,
    },
    /// Fetch any API path and print the normalized JSON
    Get { path: String },
}

impl Command {
    /// Commands that stay usable while reviews are pending
    fn bypasses_review_gate(&self) -> bool {
        matches!(
            self,
            Command::Login { .. }
                | Command::Logout
                | Command::Whoami
                | Command::Reviews { .. }
                | Command::Review { .. }
                | Command::WatchReviews { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    utils::log::init_tracing(&cli.log);

    let api = build_api(&cli)?;

    match run(cli.command, &api).await {
        Ok(()) => Ok(()),
        // The client already told the user; don't print the same failure twice
        Err(e) if e.downcast_ref::<ApiError>().is_some_and(already_reported) => {
            std::process::exit(1)
        }
        Err(e) => Err(e),
    }
}

fn already_reported(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::Unauthorized | ApiError::Http { .. } | ApiError::Transport(_) | ApiError::Timeout
    )
}

fn build_api(cli: &Cli) -> anyhow::Result<WorkshopApi> {
    let mut config = ClientConfig::from_env_with_base(cli.api_url.as_deref())
        .context("set --api-url or WORKSHOP_API_URL")?;
    if let Some(key) = &cli.token_key {
        config = config.with_token_key(key.clone());
    }
    if cli.resolve_refs {
        config = config.with_reference_policy(ReferencePolicy::Resolve);
    }

    let credentials: Arc<dyn CredentialStore> =
        match FileCredentialStore::in_config_dir(config.token_key.clone()) {
            Ok(store) => Arc::new(FallbackCredentialStore::new(store)),
            Err(e) => {
                warn!(error = %e, "no persistent credential storage, token kept for this run only");
                Arc::new(MemoryCredentialStore::default())
            }
        };

    let client = ApiClient::new(
        config,
        credentials,
        Arc::new(TerminalNotifier),
        Arc::new(TerminalRedirect),
    )?;
    Ok(WorkshopApi::new(client))
}

async fn run(command: Command, api: &WorkshopApi) -> anyhow::Result<()> {
    if !command.bypasses_review_gate() {
        enforce_review_gate(api).await?;
    }

    match command {
        Command::Login { email, password } => {
            let password = match password {
                Some(password) => SecretString::from(password),
                None => SecretString::from(
                    dialoguer::Password::new()
                        .with_prompt("Password")
                        .interact()
                        .context("failed to read password")?,
                ),
            };
            let user = api.login(&email, &password).await?;
            match user {
                Some(user) => println!("Signed in as {} ({})", user.display_name(), user.role),
                None => println!("Signed in as {email}"),
            }
        }
        Command::Logout => {
            api.logout()?;
            println!("Signed out");
        }
        Command::Whoami => {
            if !api.is_logged_in()? {
                return Err(anyhow!("not signed in; run `workshop login <email>`"));
            }
            print_json(&api.current_user(RequestOptions::default()).await?)?;
        }
        Command::Users => print_json(&api.list_users(RequestOptions::default()).await?)?,
        Command::Inventory {
            id: Some(id), ..
        } => print_json(&api.get_inventory_item(id, RequestOptions::default()).await?)?,
        Command::Inventory {
            id: None,
            search,
            low_stock,
        } => {
            let mut items = api
                .list_inventory(search.as_deref(), RequestOptions::default())
                .await?;
            if low_stock {
                items.retain(|item| item.needs_reorder());
            }
            print_json(&items)?;
        }
        Command::Orders { id: Some(id), .. } => {
            print_json(&api.get_order(id, RequestOptions::default()).await?)?
        }
        Command::Orders { id: None, open } => {
            let mut orders = api.list_orders(RequestOptions::default()).await?;
            if open {
                orders.retain(|order| order.is_open());
            }
            print_json(&orders)?;
        }
        Command::Invoices { outstanding } => {
            let mut invoices = api.list_invoices(RequestOptions::default()).await?;
            if outstanding {
                invoices.retain(|invoice| invoice.is_outstanding());
            }
            print_json(&invoices)?;
        }
        Command::Reviews { pending: true } => {
            print_json(&api.pending_reviews(RequestOptions::default()).await?)?
        }
        Command::Reviews { pending: false } => {
            print_json(&api.list_reviews(RequestOptions::default()).await?)?
        }
        Command::Review {
            order_id,
            rating,
            comment,
        } => {
            let review = CreateReview::new(order_id, rating, comment)?;
            let created = api.submit_review(&review, RequestOptions::default()).await?;
            println!("Review #{} recorded for order #{}", created.id, created.order_id);
        }
        Command::Slots { date, available } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let mut slots = api.available_slots(date, RequestOptions::default()).await?;
            if available {
                slots.retain(|slot| slot.is_available());
            }
            for slot in &slots {
                println!(
                    "{} - {}  {}/{} seats free",
                    slot.start_time.format("%H:%M"),
                    slot.end_time.format("%H:%M"),
                    slot.available_seats(),
                    slot.capacity
                );
            }
            if slots.is_empty() {
                println!("No time slots on {date}");
            }
        }
        Command::Dashboard => {
            print_json(&api.mechanic_dashboard(RequestOptions::default()).await?)?
        }
        Command::WatchReviews { interval_secs } => {
            let cancel = CancellationToken::new();
            let handle = ReviewGate::new(api.clone()).spawn(
                Duration::from_secs(interval_secs.max(1)),
                Arc::new(TerminalReviewPrompt),
                cancel.clone(),
            );
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            cancel.cancel();
            handle.await?;
        }
        Command::Get { path } => {
            let value = api
                .client()
                .request(Method::GET, &path, None, RequestOptions::default())
                .await?;
            print_json(&value)?;
        }
    }

    Ok(())
}

/// Block the command while completed orders still need a review. Failing to
/// check is not a reason to block.
async fn enforce_review_gate(api: &WorkshopApi) -> anyhow::Result<()> {
    if !api.is_logged_in()? {
        return Ok(());
    }

    match ReviewGate::new(api.clone()).check().await {
        Ok(GateDecision::Clear) => Ok(()),
        Ok(GateDecision::ReviewsRequired(pending)) => {
            terminal::print_pending(&pending);
            Err(anyhow!("pending reviews must be completed first"))
        }
        Err(e @ ApiError::Unauthorized) => Err(e.into()),
        Err(e) => {
            warn!(error = %e, "could not check pending reviews");
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
