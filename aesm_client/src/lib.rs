//! Client side of the AESM broker bridge.
//!
//! [`AeServices`] is what applications call. It sends one request per call
//! over a [`Transport`], retries while the service answers busy, and reports
//! failures as an [`aesm_core::status::LayeredError`]. [`sgx`] folds such an
//! error back into the single status code legacy callers expect, and
//! [`timeouts`] holds the timeouts those callers used.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod services;
pub mod sgx;
pub mod timeouts;
pub mod transport;

pub use services::{AeServices, ClientConfig, OpenedSession};
pub use transport::{RetryPolicy, Transport, Transporter};
