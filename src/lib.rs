pub mod config;
pub mod directory;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod models;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;
