//! `intentd` — the intent recognition service binary.

use server::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServiceConfig::load()?;
    server::start_server(config).await
}
