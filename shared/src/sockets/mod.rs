pub mod broadcast;
pub mod connections;
pub mod handler;

pub use handler::handle_websocket_event;
