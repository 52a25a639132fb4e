use dotenvy::dotenv;
use folio_stats::error::ApplicationError;
use folio_stats::{config, logger, server};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = config::load()?;

    let _guard = logger::init(&config)?;

    server::run(config).await
}
