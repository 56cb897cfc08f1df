use super::print_outcome;
use crate::services::ScrapeRequest;
use crate::state::SharedState;

pub async fn cmd_reset(state: &SharedState) -> anyhow::Result<()> {
    let (properties, runs) = state.store.reset().await?;
    println!("Removed {properties} listings and {runs} scrape runs.");
    println!("Scraping every source...");

    let outcome = state
        .scrape
        .run(ScrapeRequest {
            force: true,
            ..Default::default()
        })
        .await?;
    print_outcome(&outcome);
    Ok(())
}
