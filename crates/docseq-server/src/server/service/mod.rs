//! HTTP service exposing identifier generation to business-entity flows.
//!
//! ## Structure
//!
//! - [`handler`] - shared [`handler::AppState`], routes and request handlers.

pub mod handler;
