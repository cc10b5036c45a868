//! Command-line storefront client.
//!
//! Run with: cargo run -p storefront-cli -- login you@example.com secret
//!
//! The session is persisted to a JSON state file and restored on every run,
//! so `cart` and `tickets` work in later invocations until `logout`.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use storefront_api::{ApiClient, BookingForm, ClientConfig, OrderForm, cart_total};
use storefront_core::User;
use storefront_guard::{GuardDecision, RouteGuard};
use storefront_session::{RestoreOutcome, SessionConfig, SessionStore, storage::FileStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Store = SessionStore<FileStore, ApiClient>;

#[derive(Parser, Debug)]
#[command(name = "storefront", about = "Storefront and event-booking client")]
struct Cli {
    #[arg(long, env = "STOREFRONT_BASE_URL", default_value = storefront_api::DEFAULT_BASE_URL)]
    base_url: String,

    /// Where the session is persisted between runs.
    #[arg(long, env = "STOREFRONT_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Request timeout in seconds.
    #[arg(long, env = "STOREFRONT_TIMEOUT", default_value_t = 15)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the signed-in user.
    Whoami,
    Login {
        email: String,
        password: String,
    },
    Register {
        name: String,
        email: String,
        password: String,
    },
    Logout,
    Products,
    Events,
    /// Show the cart (requires login).
    Cart,
    /// Show booked events (requires login).
    Tickets,
    /// Add a product to the cart (requires login).
    Order(OrderArgs),
    /// Book tickets for an event (requires login).
    Book(BookArgs),
}

#[derive(Args, Debug)]
struct OrderArgs {
    product_id: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    phone: String,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
}

#[derive(Args, Debug)]
struct BookArgs {
    event_id: String,
    #[arg(long)]
    phone: String,
    #[arg(long, default_value_t = 1)]
    people: u32,
}

fn default_state_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("storefront")
        .join("session.json")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = ApiClient::new(
        ClientConfig::new(&cli.base_url).with_timeout(Duration::from_secs(cli.timeout)),
    )
    .context("building API client")?;
    let state_file = cli.state_file.unwrap_or_else(default_state_file);
    tracing::debug!(path = %state_file.display(), "Using state file");

    let store = SessionStore::new(
        FileStore::new(state_file),
        client.clone(),
        SessionConfig::default(),
    );
    if let RestoreOutcome::Corrupt(reason) = store.restore().await {
        eprintln!("Saved session was unreadable and has been cleared ({reason})");
    }

    run(cli.command, &store, &client).await
}

async fn run(command: Command, store: &Store, client: &ApiClient) -> anyhow::Result<()> {
    match command {
        Command::Whoami => match store.user() {
            Some(user) => print_user(&user),
            None => println!("Not signed in"),
        },
        Command::Login { email, password } => {
            let user = store.login(&email, &password).await?;
            println!("Welcome back, {}", user.name);
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let user = store.register(&name, &email, &password).await?;
            println!("Account created for {}", user.name);
        }
        Command::Logout => {
            store.logout().await;
            println!("Signed out");
        }
        Command::Products => {
            for p in client.list_products().await? {
                let category = p.category.as_deref().unwrap_or("-");
                println!("{}  {:<32} ${:>8.2}  {category}", p.id, p.name, p.price);
            }
        }
        Command::Events => {
            for e in client.list_events().await? {
                println!("{}  {:<32} {}  {}", e.id, e.title, e.date, e.location);
            }
        }
        Command::Cart => {
            require_login(store)?;
            let cart = client.my_cart().await?;
            if cart.is_empty() {
                println!("Your cart is empty");
            }
            for item in &cart {
                println!(
                    "{:<32} x{:<3} ${:>8.2}",
                    item.product.name,
                    item.quantity_or_one(),
                    item.product.price
                );
            }
            if !cart.is_empty() {
                println!("Total: ${:.2}", cart_total(&cart));
            }
        }
        Command::Tickets => {
            require_login(store)?;
            for e in client.my_events().await? {
                println!("{:<32} {}  {}", e.title, e.date, e.location);
            }
        }
        Command::Order(args) => {
            let user = require_login(store)?;
            let form = OrderForm {
                address: args.address,
                phone: args.phone,
                quantity: args.quantity,
                ..OrderForm::prefilled(&user)
            };
            client.add_to_cart(&args.product_id, &form).await?;
            println!("Added to cart");
        }
        Command::Book(args) => {
            let user = require_login(store)?;
            let form = BookingForm {
                phone: args.phone,
                people: args.people,
                ..BookingForm::prefilled(&user)
            };
            client.book_event(&args.event_id, &form).await?;
            println!("Ticket booked for {} people", form.people);
        }
    }
    Ok(())
}

/// Gate protected commands the same way protected views are gated.
fn require_login(store: &Store) -> anyhow::Result<User> {
    let state = store.state();
    match RouteGuard::default().decide(&state) {
        GuardDecision::Render => state.user.context("session has no user"),
        GuardDecision::Redirect { .. } => {
            bail!("Please log in first: storefront login <email> <password>")
        }
        GuardDecision::Wait => bail!("Session is still loading"),
    }
}

fn print_user(user: &User) {
    match &user.email {
        Some(email) => println!("{} <{email}> (id {})", user.name, user.id),
        None => println!("{} (id {})", user.name, user.id),
    }
}
