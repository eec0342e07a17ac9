use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lapidary::common::{AppConfig, Clock, SystemClock};
use lapidary::gate::{AccessGate, Capability, GateOutcome};
use lapidary::http::{AuthContext, HttpClient};
use lapidary::inventory::InventoryService;
use lapidary::query::QueryClient;
use lapidary::session::bridge::{AbsentBridge, IdentityBridge, StaticIdentity};
use lapidary::session::store::IdentityStore;
use lapidary::session::{AuthState, SessionProvider};

#[derive(Parser)]
#[command(name = "lapidary")]
#[command(about = "Diamond inventory client")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every diamond in the inventory
    List,
    /// Show one diamond
    Show {
        #[arg(help = "Diamond id")]
        id: i64,
    },
    /// Print the inventory count
    Count,
    /// Print the resolved session
    Whoami,
    /// Check admin access for the current user
    IsAdmin,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let auth = AuthContext::new();
    let http = HttpClient::new(&config, auth.clone())?;
    let queries = QueryClient::new(&config, clock.clone());

    // No embedding host on the command line; the configured fallback
    // identity is the only way in.
    let fallback = config
        .fallback
        .as_ref()
        .map(|fb| Arc::new(StaticIdentity::from_config(fb)) as Arc<dyn IdentityBridge>);
    let provider = SessionProvider::new(
        Arc::new(AbsentBridge),
        fallback,
        IdentityStore::open()?,
        auth,
        config.resolve_timeout(),
        clock,
    );

    let state = provider.resolve().await;

    if let Commands::Whoami = cli.command {
        match state {
            AuthState::Authenticated(session) => {
                println!(
                    "{} (id {}, source {:?})",
                    session.user.name, session.user.id, session.source
                );
            }
            other => println!("{:?}", other),
        }
        return Ok(());
    }

    // Every other command needs an identity; fail fast without one.
    if !matches!(state, AuthState::Authenticated(_)) {
        eprintln!(
            "Error: not authenticated ({:?}); configure a fallback identity",
            state
        );
        process::exit(1);
    }

    let inventory = InventoryService::new(http.clone(), queries.clone());

    match cli.command {
        Commands::List => {
            let outcome = inventory.list().await?;
            for diamond in outcome.value {
                println!(
                    "#{} {:.2}ct {} {} {} - {} cents{}",
                    diamond.id,
                    diamond.carat,
                    diamond.color,
                    diamond.clarity,
                    diamond.cut,
                    diamond.price_cents,
                    if diamond.available { "" } else { " (sold)" }
                );
            }
        }
        Commands::Show { id } => {
            let outcome = inventory.get(id).await?;
            println!("{:#?}", outcome.value);
        }
        Commands::Count => {
            let outcome = inventory.count().await?;
            println!("{}", outcome.value);
        }
        Commands::IsAdmin => {
            let gate = AccessGate::new(
                provider,
                queries,
                Arc::new(http),
                config.fallback_route.clone(),
            )
            .with_inline_denial();
            match gate.evaluate(Capability::Admin).await {
                GateOutcome::Render => println!("admin"),
                GateOutcome::Deny(message) => println!("denied: {message}"),
                other => println!("{:?}", other),
            }
        }
        Commands::Whoami => unreachable!(),
    }

    Ok(())
}
