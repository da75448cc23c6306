//! Papillon Core - Shared types library.
//!
//! This crate provides common types used across all Papillon components:
//! - `site` - Public-facing events and e-commerce site
//! - `admin` - Section-scoped administration panels
//! - `auth` - Identity verification and session authority
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere. In particular the role predicates in [`types::role`]
//! are total functions: every role value, including unknown ones, produces a
//! deterministic answer.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and emails, plus the
//!   role/section model and its access predicates

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
