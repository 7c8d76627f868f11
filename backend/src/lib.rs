pub mod bot;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod recognition;
pub mod repositories;
pub mod services;
pub mod state;
pub mod telegram;
pub mod utils;
pub mod validation;
