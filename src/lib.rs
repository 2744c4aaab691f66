//! Task Tracker Library
//!
//! A task-tracking HTTP API whose tasks live in memory and are persisted to
//! a single JSON file after every change.

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
