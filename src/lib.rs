//! bubblewatch - Feed repetition monitor
//!
//! Scores how self-similar a batch of feed texts is, reports when a feed turns
//! repetitive, keeps a bounded history of the dominant keywords across all
//! monitored contexts, and resolves searches that lead outside the bubble.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod explore;
pub mod history;
pub mod monitor;
pub mod settings;
pub mod storage;

pub use error::{BubbleError, Result};
