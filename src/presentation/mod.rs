pub mod card;
#[cfg(feature = "cli")]
pub mod cli_summary;
