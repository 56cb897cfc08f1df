pub mod prelude;

pub mod properties;
pub mod scrape_runs;
