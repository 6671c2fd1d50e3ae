pub mod admin_header;
pub mod token_storage;

pub use admin_header::AdminHeader;
