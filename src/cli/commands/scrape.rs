use crate::domain::{PriceRange, SourceSelector};
use crate::services::{ScrapeOutcome, ScrapeRequest, SourceOutcome};
use crate::state::SharedState;

pub async fn cmd_scrape(
    state: &SharedState,
    source: &str,
    force: bool,
    price_range: Option<PriceRange>,
) -> anyhow::Result<()> {
    let request = ScrapeRequest {
        source: SourceSelector::parse(source),
        force,
        price_range,
    };

    let outcome = state.scrape.run(request).await?;
    print_outcome(&outcome);
    Ok(())
}

pub fn print_outcome(outcome: &ScrapeOutcome) {
    for source in &outcome.sources {
        match source {
            SourceOutcome::Cached {
                source,
                last_run_at,
                ..
            } => println!(
                "  {source:<28} cached (last run {})",
                last_run_at.format("%Y-%m-%d %H:%M UTC")
            ),
            SourceOutcome::Completed {
                source,
                found,
                new_properties,
                removed,
                skipped,
                ..
            } => println!(
                "  {source:<28} {found} found, {new_properties} new, {removed} removed, {skipped} skipped"
            ),
            SourceOutcome::Failed { source, error } => {
                println!("  {source:<28} FAILED: {error}");
            }
        }
    }

    println!("{:-<70}", "");
    println!(
        "Total: {} found, {} new ({} cached, {} failed)",
        outcome.total_found, outcome.new_properties, outcome.cached, outcome.failed
    );
}
