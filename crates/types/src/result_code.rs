//! Result codes returned across the consensus boundary
//!
//! Every validation or application outcome is one of these codes. They are
//! values, not errors: callers branch on them and `0` always means OK.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of `check_tx` / `deliver_tx` / `commit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResultCode {
    Ok = 0,
    Internal = 1,
    Malformed = 2,
    BadNonce = 3,
    InsufficientFunds = 4,
    InvalidSignature = 5,
    GasLimitExceeded = 6,
}

impl ResultCode {
    /// Wire integer for this code
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Parse a wire integer
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Ok,
            1 => Self::Internal,
            2 => Self::Malformed,
            3 => Self::BadNonce,
            4 => Self::InsufficientFunds,
            5 => Self::InvalidSignature,
            6 => Self::GasLimitExceeded,
            _ => return None,
        })
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Stable name used in logs and RPC responses
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Internal => "Internal",
            Self::Malformed => "Malformed",
            Self::BadNonce => "BadNonce",
            Self::InsufficientFunds => "InsufficientFunds",
            Self::InvalidSignature => "InvalidSignature",
            Self::GasLimitExceeded => "GasLimitExceeded",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
