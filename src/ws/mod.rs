// WebSocket endpoint feeding the broadcast hub

pub mod connection;

pub use connection::ws_handler;
