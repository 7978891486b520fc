//! Error taxonomy for the projection layer
//!
//! Every boundary-crossing operation returns `Result<T>`. At the outermost
//! `extern "system"` entry points the error is translated back into the
//! native status-code space with [`ProjectionError::to_hresult`].

use crate::core::guid::Guid;
use crate::ffi::HResult;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// A native call returned an unexpected failure code
    #[error("native call failed: {0}")]
    Native(HResult),

    /// A capability the caller required is not exposed by the object
    #[error("interface {iid} is not supported")]
    NoInterface { iid: Guid },

    /// A mapped type lacks the conversion needed to construct it
    #[error("type {ty} has no {entry_point} entry point")]
    MissingEntryPoint { ty: String, entry_point: &'static str },

    #[error("null interface pointer")]
    NullPointer,

    /// The managed object behind a wrapper has been collected
    #[error("object has been disconnected from its managed target")]
    Disconnected,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProjectionError {
    /// Status code reported to native callers
    pub fn to_hresult(&self) -> HResult {
        match self {
            Self::Native(hr) => *hr,
            Self::NoInterface { .. } => HResult::E_NOINTERFACE,
            Self::MissingEntryPoint { .. } => HResult::COR_E_MISSINGMETHOD,
            Self::NullPointer => HResult::E_POINTER,
            Self::Disconnected => HResult::RO_E_CLOSED,
            Self::Config(_) => HResult::E_INVALIDARG,
        }
    }

    pub fn missing_entry_point(ty: impl ToString, entry_point: &'static str) -> Self {
        Self::MissingEntryPoint {
            ty: ty.to_string(),
            entry_point,
        }
    }
}

impl From<HResult> for ProjectionError {
    fn from(hr: HResult) -> Self {
        // E_NOINTERFACE stays `Native`; callers that know the IID build `NoInterface`.
        match hr {
            HResult::E_POINTER => Self::NullPointer,
            hr => Self::Native(hr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guid::iids::IID_IMARSHAL;

    #[test]
    fn test_hresult_translation() {
        assert_eq!(
            ProjectionError::NoInterface { iid: IID_IMARSHAL }.to_hresult(),
            HResult::E_NOINTERFACE
        );
        assert_eq!(ProjectionError::Disconnected.to_hresult(), HResult::RO_E_CLOSED);
        assert_eq!(
            ProjectionError::Native(HResult::E_FAIL).to_hresult(),
            HResult::E_FAIL
        );
    }

    #[test]
    fn test_display() {
        let err = ProjectionError::missing_entry_point("Demo.Point", "BoxedValue");
        assert_eq!(err.to_string(), "type Demo.Point has no BoxedValue entry point");
        assert_eq!(
            ProjectionError::Native(HResult::E_FAIL).to_string(),
            "native call failed: 0x80004005"
        );
    }
}
