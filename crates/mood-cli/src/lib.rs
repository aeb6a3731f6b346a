//! Terminal client for the mood tracker
//!
//! - `client`: uploads images to the prediction backend
//! - `display`: label and confidence formatting
//! - `dataset`: training folder inspection

pub mod client;
pub mod dataset;
pub mod display;

pub use client::{ClientError, PredictClient, RemoteOutcome, DEFAULT_BACKEND_URL};
