pub mod property;
pub mod scrape_run;
