pub mod backends;
pub mod config;
pub mod firestore;
pub mod http;
pub mod local_store;
pub mod memory_documents;
pub mod spreadsheet;
