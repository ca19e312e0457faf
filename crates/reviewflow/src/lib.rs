pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod jobs;
pub mod reviews;
pub mod synth;
