pub mod anchor;
pub mod annotations;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod layout;
pub mod loader;
pub mod logging;
pub mod models;
pub mod profile;
pub mod progress;
pub mod session;
pub mod settings;
pub mod state;
