//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod cluster;
pub mod events;
pub mod files;
pub mod health;
pub mod jobs;
pub mod network;
