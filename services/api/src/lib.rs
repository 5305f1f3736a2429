pub mod adapters;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod sweeper;
pub mod web;
