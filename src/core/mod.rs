/// Core modules: components, configuration, errors and the app-level plugin
pub mod components;
pub mod config;
pub mod constants;
pub mod error;
pub mod game;
