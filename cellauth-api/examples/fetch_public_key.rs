use std::time::Duration;

use cellauth_api::{ApiError, HttpKeyFetcher, KeyFetcher};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let cell_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://localhost:8443/cell1/".to_string());

    let fetcher = HttpKeyFetcher::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    println!("Fetching {}", fetcher.public_key_url(&cell_url));
    match fetcher.fetch_public_key(&cell_url).await {
        Ok(response) => {
            println!("Cell: {}", response.cell_url);
            println!("Public key: {}", response.public_key);
        }
        Err(e) if e.is_transient() => println!("Cell unreachable, try again later: {}", e),
        Err(e) => println!("Cell refused to publish a key: {}", e),
    }

    Ok(())
}
