pub mod api;
pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod models;
pub mod render;
pub mod services;
pub mod state;
