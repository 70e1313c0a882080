use crate::store::StoreError;
use serde::Serialize;

/// Success flag plus a human-readable message, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Reply {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Reply {
            success: false,
            message: message.into(),
        }
    }

    /// Expected failures become a failed reply; storage faults pass through.
    pub fn from_result<T>(
        result: Result<T, StoreError>,
        describe: impl FnOnce(T) -> String,
    ) -> Result<Reply, StoreError> {
        match result {
            Ok(value) => Ok(Reply::ok(describe(value))),
            Err(err) if err.is_expected() => Ok(Reply::failed(err.to_string())),
            Err(err) => Err(err),
        }
    }
}
