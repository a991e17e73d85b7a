pub mod controller;
pub mod monitoring;
pub mod repository;
