use bookstore::config::ProvisionConfig;
use bookstore::{harness, Book, Decimal, Error};
use std::str::FromStr;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match ProvisionConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => fail(e.into()),
    };

    let price = match Decimal::from_str("20.29") {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Invalid sample price: {}", e);
            std::process::exit(1);
        }
    };
    let book = Book::new("gtc", "Osagie", price);

    tracing::info!(backend = %config.backend, "Starting smoke run");

    match harness::run(&config, &book).await {
        Ok(report) => {
            let id = report
                .book
                .id
                .map(|id| id.to_string())
                .unwrap_or_default();
            tracing::info!(
                migrations_applied = report.migrations_applied,
                %id,
                "Smoke run succeeded"
            );
            println!("{}", id);
        }
        Err(e) => fail(e),
    }
}

fn fail(e: Error) -> ! {
    eprintln!("Smoke run failed at {} stage: {}", e.stage(), e);
    std::process::exit(1);
}
