use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sheriapay::config::Config;
use sheriapay::db::{create_pool, init_db, queries, AppState};
use sheriapay::handlers;
use sheriapay::models::{CreateRegistrationIntent, ProductKind};
use sheriapay::providers::{MpesaClient, PaystackClient};

#[derive(Parser, Debug)]
#[command(name = "sheriapay")]
#[command(about = "Payment lifecycle and reconciliation engine for the Sheria library")]
struct Cli {
    /// Seed the database with dev data (institution, products, account, registration)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with dev data for manual testing against sandbox
/// provider credentials. Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM content_products", [], |row| row.get(0))
        .expect("Failed to count products");
    if existing > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("Seeding dev data");

    let institution = queries::create_institution(&conn, "Dev Law School", 5)
        .expect("Failed to create dev institution");

    let one_time = queries::create_content_product(
        &conn,
        "Case Digest Bundle",
        ProductKind::OneTime,
        250_000,
        "KES",
    )
    .expect("Failed to create dev product");

    let subscription = queries::create_content_product(
        &conn,
        "Full Library Access",
        ProductKind::Subscription,
        150_000,
        "KES",
    )
    .expect("Failed to create dev subscription product");

    let document = queries::create_legal_document(&conn, "Land Act Commentary 2024", 50_000, "KES")
        .expect("Failed to create dev document");

    let account = queries::create_account(&conn, "dev@sheria.local", "Dev Advocate", None)
        .expect("Failed to create dev account");
    let token = queries::create_api_token(&conn, &account.id).expect("Failed to issue dev token");

    let registration = queries::create_registration_intent(
        &conn,
        &CreateRegistrationIntent {
            email: "newuser@sheria.local".to_string(),
            name: "New User".to_string(),
            institution_id: Some(institution.id.clone()),
        },
    )
    .expect("Failed to create dev registration");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  account_token: {}", token);
    println!("  account_id: {}", account.id);
    println!("  institution_id: {}", institution.id);
    println!("  one_time_product_id: {}", one_time.id);
    println!("  subscription_product_id: {}", subscription.id);
    println!("  document_id: {}", document.id);
    println!("  registration_intent_id: {}", registration.id);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheriapay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.operator_token.is_empty() {
        tracing::warn!("OPERATOR_TOKEN is empty; operator endpoints will reject all requests");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        mpesa: MpesaClient::new(config.mpesa.clone()),
        paystack: PaystackClient::new(config.paystack.clone()),
        operator_token: config.operator_token.clone(),
        vat_rate_bps: config.vat_rate_bps,
        signup_fee_cents: config.signup_fee_cents,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set SHERIAPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Sheriapay server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
