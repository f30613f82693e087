pub mod cli;
pub mod config;
pub mod core;
pub mod exit;
pub mod export;
pub mod grid;
pub mod logs;
pub mod platform;
pub mod source;
pub mod tui;
pub mod ui;
