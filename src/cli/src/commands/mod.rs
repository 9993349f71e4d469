pub mod config;
pub mod events;
pub mod replay;
pub mod simulate;
