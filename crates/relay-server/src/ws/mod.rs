//! WebSocket endpoints

pub mod session;
