pub mod http;
pub mod subsystems;
pub mod unavailable;
