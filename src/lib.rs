pub mod bot;
pub mod config;
pub mod discount;
pub mod duration;
pub mod form_token;
pub mod portal;

pub use config::Config;
pub use discount::DiscountTicket;
pub use portal::{Portal, Settle, Settlement, SettlementError};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Current wall clock of the portal, which runs on Korea Standard Time.
pub fn portal_now() -> chrono::NaiveDateTime {
    chrono::Utc::now()
        .with_timezone(&chrono::FixedOffset::east_opt(9 * 60 * 60).unwrap())
        .naive_local()
}

#[macro_export]
macro_rules! selector {
    ($selector:literal) => {{
        static SELECTOR: once_cell::sync::OnceCell<scraper::Selector> =
            once_cell::sync::OnceCell::new();
        SELECTOR.get_or_init(|| scraper::Selector::parse($selector).unwrap())
    }};
}

#[macro_export]
macro_rules! regex {
    ($regex:literal) => {{
        static REGEX: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
        REGEX.get_or_init(|| regex::Regex::new($regex).unwrap())
    }};
}
