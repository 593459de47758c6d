//! # Wired Support
//!
//! Shared utilities for the Wired DI framework.
//!
//! This crate provides:
//! - Text rendering for error messages and condition reports
//! - Type-name shortening used when printing type identifiers

pub mod rendering;
