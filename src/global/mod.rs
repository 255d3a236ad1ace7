// Globally available exports
pub mod block;
pub mod error;
pub mod file_info;
pub mod header;
pub mod name;
