//! Conformance harness for a D3D12-style command-submission API.
//!
//! The crate bundles the API surface ([`api`]), a software implementation of
//! it ([`reference`]), the helpers tests are written with ([`harness`]) and
//! the registered tests themselves ([`suite`]).

pub mod api;
pub mod config;
pub mod dxbc;
pub mod error;
pub mod harness;
pub mod platform;
pub mod reference;
pub mod suite;

pub use config::Config;
pub use error::{ApiResult, HarnessError, Hresult};
