mod list;
mod reset;
mod scrape;
mod sources;

pub use list::cmd_list;
pub use reset::cmd_reset;
pub use scrape::{cmd_scrape, print_outcome};
pub use sources::cmd_sources;
