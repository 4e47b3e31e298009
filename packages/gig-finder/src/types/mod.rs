//! Core types for gig-finder.

pub mod config;
pub mod entity;
pub mod record;
