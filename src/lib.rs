//! Shared energy bill splitting: metered properties pay for their own
//! consumption, one unmetered residual receiver absorbs the rest of the
//! group total, and bills are checked against history.

pub mod allocate;
pub mod config;
pub mod draft;
pub mod history;
pub mod model;
pub mod mqtt;
pub mod reading;
pub mod store;
pub mod validate;
