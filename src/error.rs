//! Error Module
//!
//! Status codes returned by API calls and the errors raised by the harness.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::api::{HeapType, ResourceStates};
use crate::dxbc::DxbcError;

/// A 32-bit API status code.
///
/// Only failure codes travel through `Err`; `S_OK`/`S_FALSE` exist so tests
/// can name them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hresult(pub i32);

impl Hresult {
    pub const S_OK: Hresult = Hresult(0);
    pub const S_FALSE: Hresult = Hresult(1);
    pub const E_NOTIMPL: Hresult = Hresult(0x8000_4001_u32 as i32);
    pub const E_NOINTERFACE: Hresult = Hresult(0x8000_4002_u32 as i32);
    pub const E_POINTER: Hresult = Hresult(0x8000_4003_u32 as i32);
    pub const E_FAIL: Hresult = Hresult(0x8000_4005_u32 as i32);
    pub const E_OUTOFMEMORY: Hresult = Hresult(0x8007_000e_u32 as i32);
    pub const E_INVALIDARG: Hresult = Hresult(0x8007_0057_u32 as i32);
    pub const DXGI_ERROR_NOT_FOUND: Hresult = Hresult(0x887a_0002_u32 as i32);
    pub const DXGI_ERROR_UNSUPPORTED: Hresult = Hresult(0x887a_0004_u32 as i32);
    pub const DXGI_ERROR_DEVICE_REMOVED: Hresult = Hresult(0x887a_0005_u32 as i32);

    pub fn succeeded(self) -> bool {
        self.0 >= 0
    }

    pub fn failed(self) -> bool {
        self.0 < 0
    }

    /// Symbolic name for the well-known codes.
    pub fn name(self) -> &'static str {
        match self {
            Self::S_OK => "S_OK",
            Self::S_FALSE => "S_FALSE",
            Self::E_NOTIMPL => "E_NOTIMPL",
            Self::E_NOINTERFACE => "E_NOINTERFACE",
            Self::E_POINTER => "E_POINTER",
            Self::E_FAIL => "E_FAIL",
            Self::E_OUTOFMEMORY => "E_OUTOFMEMORY",
            Self::E_INVALIDARG => "E_INVALIDARG",
            Self::DXGI_ERROR_NOT_FOUND => "DXGI_ERROR_NOT_FOUND",
            Self::DXGI_ERROR_UNSUPPORTED => "DXGI_ERROR_UNSUPPORTED",
            Self::DXGI_ERROR_DEVICE_REMOVED => "DXGI_ERROR_DEVICE_REMOVED",
            _ => "HRESULT",
        }
    }
}

impl fmt::Display for Hresult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.0 as u32)
    }
}

impl std::error::Error for Hresult {}

impl fmt::Debug for Hresult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#010x})", self.name(), self.0 as u32)
    }
}

/// Result of an API call.
pub type ApiResult<T> = Result<T, Hresult>;

/// Folds an API result into the status code it carries.
pub fn hr_of<T>(result: &ApiResult<T>) -> Hresult {
    match result {
        Ok(_) => Hresult::S_OK,
        Err(hr) => *hr,
    }
}

/// Errors raised by the harness itself.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// No device could be created on this host; the test is inapplicable.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(Hresult),

    #[error("{call} failed: {hr}")]
    Api { call: &'static str, hr: Hresult },

    #[error("malformed DXBC: {0}")]
    Dxbc(#[from] DxbcError),

    #[error("{heap:?} heap resources cannot start in state {state:?}")]
    IllegalInitialState {
        heap: HeapType,
        state: ResourceStates,
    },

    #[error("sub-resource {index} data is shorter than its footprint")]
    ShortData { index: u32 },

    #[error("fence did not reach {value} within {timeout_ms} ms")]
    WaitTimeout { value: u64, timeout_ms: u32 },

    #[error("platform error: {0}")]
    Platform(#[from] io::Error),
}

impl HarnessError {
    pub fn api(call: &'static str) -> impl FnOnce(Hresult) -> HarnessError {
        move |hr| HarnessError::Api { call, hr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hresult_classification() {
        assert!(Hresult::S_OK.succeeded());
        assert!(Hresult::S_FALSE.succeeded());
        assert!(Hresult::E_INVALIDARG.failed());
        assert_eq!(Hresult::E_INVALIDARG.0 as u32, 0x80070057);
    }

    #[test]
    fn test_hresult_display() {
        assert_eq!(Hresult::E_FAIL.to_string(), "E_FAIL (0x80004005)");
        assert_eq!(Hresult(-1).name(), "HRESULT");
    }

    #[test]
    fn test_hr_of() {
        let ok: ApiResult<u32> = Ok(3);
        let err: ApiResult<u32> = Err(Hresult::E_NOINTERFACE);
        assert_eq!(hr_of(&ok), Hresult::S_OK);
        assert_eq!(hr_of(&err), Hresult::E_NOINTERFACE);
    }
}
