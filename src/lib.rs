//! Violation Monitor Library
//!
//! Watches a camera through an external object detector and reports
//! public-order violations (smoking, littering, graffiti) to Telegram.
//!
//! This crate provides the core functionality for:
//! - Loading settings from the environment and editing `.env` files
//! - Loading the violation knowledge base (articles and fines)
//! - Turning raw detections into violation candidates
//! - Monitoring a detector feed and storing evidence
//! - Sending alerts and running a photo-analysis bot

pub mod commands;
pub mod config;
pub mod detection;
pub mod monitor;
pub mod ontology;
pub mod telegram;
