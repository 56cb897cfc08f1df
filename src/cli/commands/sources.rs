use crate::state::SharedState;

pub async fn cmd_sources(state: &SharedState) -> anyhow::Result<()> {
    let runs = state.store.list_scrape_runs().await?;

    println!("Sources ({} enabled)", state.scrape.registry().all().len());
    println!("{:-<70}", "");

    for scraper in state.scrape.registry().all() {
        let count = state
            .store
            .count_properties_for_source(scraper.source())
            .await?;
        let last = runs
            .iter()
            .find(|r| r.source == scraper.source())
            .map_or_else(
                || "never".to_string(),
                |r| r.last_run_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            );

        println!("{} ({})", scraper.display_name(), scraper.source());
        println!("  {} | {} listings | last run: {}", scraper.base_url(), count, last);
    }

    Ok(())
}
