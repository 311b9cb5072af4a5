use anyhow::Result;
use maap::{Client, SearchQuery};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configure the host and token via env vars or a `.maaprc` file.
    let client = Client::from_env()?;

    let query = SearchQuery::new()
        .short_name("GEDI02_A")
        .bounding_box("-122.6,37.6,-122.3,37.9")
        .limit(3);
    let granules = client.search_granules(&query)?;

    for granule in &granules {
        println!("{}", granule.description());
    }

    if let Some(first) = granules.first() {
        let path = first.download(Path::new("."), false)?;
        println!("saved {}", path.display());
    }
    Ok(())
}
