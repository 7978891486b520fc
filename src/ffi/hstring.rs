//! Immutable UTF-16 string handles passed across the boundary

use super::abi::HStringAbi;
use std::fmt;

struct Header {
    buffer: Box<[u16]>,
}

/// Owned string handle; the empty string is the null handle
#[derive(Default)]
pub struct HString(Option<Box<Header>>);

impl HString {
    pub fn new(text: &str) -> Self {
        if text.is_empty() {
            return Self(None);
        }
        let buffer: Box<[u16]> = text.encode_utf16().collect();
        Self(Some(Box::new(Header { buffer })))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_wide(&self) -> &[u16] {
        match &self.0 {
            Some(header) => &header.buffer,
            None => &[],
        }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(self.as_wide())
    }

    /// Transfer ownership to a native caller
    pub fn into_abi(self) -> HStringAbi {
        match self.0 {
            Some(header) => Box::into_raw(header) as HStringAbi,
            None => std::ptr::null_mut(),
        }
    }

    /// Take ownership of a handle produced by [`HString::into_abi`]
    ///
    /// # Safety
    /// `handle` must be null or an unreleased handle from `into_abi`.
    pub unsafe fn from_abi(handle: HStringAbi) -> Self {
        if handle.is_null() {
            Self(None)
        } else {
            Self(Some(Box::from_raw(handle as *mut Header)))
        }
    }
}

impl From<&str> for HString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for HString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for HString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_null() {
        assert!(HString::new("").into_abi().is_null());
        let back = unsafe { HString::from_abi(std::ptr::null_mut()) };
        assert!(back.is_empty());
    }

    #[test]
    fn test_transfer_preserves_text() {
        let handle = HString::new("Demo.Widget").into_abi();
        let back = unsafe { HString::from_abi(handle) };
        assert_eq!(back.to_string(), "Demo.Widget");
    }
}
