pub mod document;
pub mod fingerprint;
pub mod merge;
pub mod ports;
pub mod product;
pub mod snapshot;
pub mod subscription;
pub mod value_objects;
