#![forbid(unsafe_code)]

pub mod cli;
pub mod epub;
pub mod export;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod sanitize;
pub mod scrape;
pub mod sink;
pub mod templates;
