pub mod access;
pub mod api;
pub mod blog;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod generation;
pub mod user;
pub mod utils;
