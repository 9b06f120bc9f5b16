use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use store_orders::schema::create_schema;
use store_orders::telemetry::init_tracing;
use store_orders::{PostgresUnitOfWork, StoreConfig, StoreService};

#[derive(Parser)]
#[command(name = "store-cli")]
#[command(about = "Operator tool for the order store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store tables if they do not exist
    Migrate,

    /// Register a user who can own orders
    AddUser { username: String },

    /// Add a product to the catalog
    AddProduct {
        name: String,
        price: Decimal,
        quantity: i32,
    },

    /// Show one product with its current stock
    ShowProduct { id: Uuid },

    /// Place an order; repeat a product id to order several units
    PlaceOrder {
        #[arg(long)]
        user: Uuid,
        #[arg(required = true)]
        products: Vec<Uuid>,
    },

    /// Show a placed order
    ShowOrder { id: Uuid },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = StoreConfig::from_env().context("load store config")?;
    let pool = config.connect().await.context("failed to connect to Postgres")?;

    if let Commands::Migrate = cli.cmd {
        create_schema(&pool).await.context("create schema")?;
        println!("schema ready");
        return Ok(());
    }

    let uow = PostgresUnitOfWork::new(Arc::new(pool)).with_lock_timeout(config.lock_timeout);
    let service = StoreService::new(uow).with_stock_precheck(config.stock_precheck);

    match cli.cmd {
        Commands::Migrate => {}
        Commands::AddUser { username } => print_json(&service.create_user(&username).await?)?,
        Commands::AddProduct {
            name,
            price,
            quantity,
        } => print_json(&service.create_product(&name, price, quantity).await?)?,
        Commands::ShowProduct { id } => print_json(&service.get_product(id).await?)?,
        Commands::PlaceOrder { user, products } => {
            print_json(&service.place_order(user, &products).await?)?
        }
        Commands::ShowOrder { id } => print_json(&service.get_order(id).await?)?,
    }
    Ok(())
}
