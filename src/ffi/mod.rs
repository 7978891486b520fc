//! Native boundary - status codes, vtable layouts and owned interface pointers
//!
//! Design: everything that touches raw interface pointers lives here.
//! - `abi.rs` - `#[repr(C)]` function-table layouts and array helpers
//! - `hstring.rs` - owned immutable string handles
//! - `object_ref.rs` - `ObjectReference`, the refcount-balanced pointer owner
//! - `vtable.rs` - process-lifetime function-table allocation

pub mod abi;
mod hstring;
mod object_ref;
mod vtable;

pub use abi::RawPtr;
pub use hstring::HString;
pub use object_ref::{ExecutionContext, ObjectReference};
pub use vtable::{FunctionTable, FunctionTableAllocator};

use crate::errors::{ProjectionError, Result};
use std::fmt;

/// Native status code
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: HResult = HResult(0);
    pub const S_FALSE: HResult = HResult(1);
    pub const E_NOTIMPL: HResult = HResult(0x8000_4001_u32 as i32);
    pub const E_NOINTERFACE: HResult = HResult(0x8000_4002_u32 as i32);
    pub const E_POINTER: HResult = HResult(0x8000_4003_u32 as i32);
    pub const E_FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    pub const E_OUTOFMEMORY: HResult = HResult(0x8007_000e_u32 as i32);
    pub const E_INVALIDARG: HResult = HResult(0x8007_0057_u32 as i32);
    /// Object has been closed / disconnected
    pub const RO_E_CLOSED: HResult = HResult(0x8000_0013_u32 as i32);
    pub const COR_E_MISSINGMETHOD: HResult = HResult(0x8013_1513_u32 as i32);

    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    /// Success codes map to `Ok`, failures to `ProjectionError`
    #[inline]
    pub fn ok(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(ProjectionError::from(self))
        }
    }

    /// Translate the outcome of a boundary operation into a status code
    pub fn from_result<T>(result: &Result<T>) -> HResult {
        match result {
            Ok(_) => Self::S_OK,
            Err(err) => err.to_hresult(),
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult({})", self)
    }
}
