use crate::db::{Page, PropertyFilter, SortOrder};
use crate::scrapers::common::format_thousands;
use crate::state::SharedState;

pub async fn cmd_list(state: &SharedState, limit: u64, source: Option<String>) -> anyhow::Result<()> {
    let filter = PropertyFilter {
        source,
        ..Default::default()
    };
    let total = state.store.count_properties(&filter).await?;
    let properties = state
        .store
        .list_properties(&filter, SortOrder::Newest, Page::new(None, Some(limit)))
        .await?;

    if properties.is_empty() {
        println!("No listings stored.");
        println!();
        println!("Fetch some with: arriendos scrape");
        return Ok(());
    }

    println!("Listings ({} of {} total)", properties.len(), total);
    println!("{:-<70}", "");

    for p in properties {
        let price = p
            .price
            .map_or_else(|| "?".to_string(), |v| format!("${}", format_thousands(v, '.')));
        let rooms = p.bedrooms.map_or_else(|| "?".to_string(), |b| b.to_string());
        let area = p.area.map_or_else(|| "?".to_string(), |a| a.to_string());

        println!("#{} {} [{}]", p.id, p.title, p.location);
        println!(
            "  {} | {} m² | {} alcobas | {} | {}",
            price, area, rooms, p.source, p.link
        );
    }

    Ok(())
}
