//! Terminal output for the one-shot commands

pub mod rates;
pub mod setup;
pub mod ui;
