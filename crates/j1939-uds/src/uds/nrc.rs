//! UDS Negative Response Codes (NRC)

use std::fmt;

/// UDS Negative Response Codes (ISO 14229-1:2013 Table A.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeResponseCode {
    GeneralReject,
    ServiceNotSupported,
    SubFunctionNotSupported,
    IncorrectMessageLengthOrFormat,
    ResponseTooLong,
    BusyRepeatRequest,
    ConditionsNotCorrect,
    RequestSequenceError,
    RequestOutOfRange,
    SecurityAccessDenied,
    InvalidKey,
    ExceededNumberOfAttempts,
    RequiredTimeDelayNotExpired,
    ResponsePending,
    SubFunctionNotSupportedInActiveSession,
    ServiceNotSupportedInActiveSession,
    /// Code outside the table above
    Unknown(u8),
}

impl From<u8> for NegativeResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0x10 => Self::GeneralReject,
            0x11 => Self::ServiceNotSupported,
            0x12 => Self::SubFunctionNotSupported,
            0x13 => Self::IncorrectMessageLengthOrFormat,
            0x14 => Self::ResponseTooLong,
            0x21 => Self::BusyRepeatRequest,
            0x22 => Self::ConditionsNotCorrect,
            0x24 => Self::RequestSequenceError,
            0x31 => Self::RequestOutOfRange,
            0x33 => Self::SecurityAccessDenied,
            0x35 => Self::InvalidKey,
            0x36 => Self::ExceededNumberOfAttempts,
            0x37 => Self::RequiredTimeDelayNotExpired,
            0x78 => Self::ResponsePending,
            0x7E => Self::SubFunctionNotSupportedInActiveSession,
            0x7F => Self::ServiceNotSupportedInActiveSession,
            other => Self::Unknown(other),
        }
    }
}

impl From<NegativeResponseCode> for u8 {
    fn from(nrc: NegativeResponseCode) -> Self {
        match nrc {
            NegativeResponseCode::GeneralReject => 0x10,
            NegativeResponseCode::ServiceNotSupported => 0x11,
            NegativeResponseCode::SubFunctionNotSupported => 0x12,
            NegativeResponseCode::IncorrectMessageLengthOrFormat => 0x13,
            NegativeResponseCode::ResponseTooLong => 0x14,
            NegativeResponseCode::BusyRepeatRequest => 0x21,
            NegativeResponseCode::ConditionsNotCorrect => 0x22,
            NegativeResponseCode::RequestSequenceError => 0x24,
            NegativeResponseCode::RequestOutOfRange => 0x31,
            NegativeResponseCode::SecurityAccessDenied => 0x33,
            NegativeResponseCode::InvalidKey => 0x35,
            NegativeResponseCode::ExceededNumberOfAttempts => 0x36,
            NegativeResponseCode::RequiredTimeDelayNotExpired => 0x37,
            NegativeResponseCode::ResponsePending => 0x78,
            NegativeResponseCode::SubFunctionNotSupportedInActiveSession => 0x7E,
            NegativeResponseCode::ServiceNotSupportedInActiveSession => 0x7F,
            NegativeResponseCode::Unknown(v) => v,
        }
    }
}

impl NegativeResponseCode {
    /// Human-readable meaning, "Unknown Response Code" outside the table
    pub fn description(self) -> &'static str {
        match self {
            Self::GeneralReject => "General Reject",
            Self::ServiceNotSupported => "Service Not Supported",
            Self::SubFunctionNotSupported => "Subfunction Not Supported",
            Self::IncorrectMessageLengthOrFormat => "Incorrect Message Length or Invalid Format",
            Self::ResponseTooLong => "Response Too Long",
            Self::BusyRepeatRequest => "Busy Repeat Request",
            Self::ConditionsNotCorrect => "Conditions Not Correct",
            Self::RequestSequenceError => "Request Sequence Error",
            Self::RequestOutOfRange => "Request Out of Range",
            Self::SecurityAccessDenied => "Security Access Denied",
            Self::InvalidKey => "Invalid Key",
            Self::ExceededNumberOfAttempts => "Exceeded Number of Attempts",
            Self::RequiredTimeDelayNotExpired => "Required Time Delay Not Expired",
            Self::ResponsePending => "Request Correctly Received, Response Pending",
            Self::SubFunctionNotSupportedInActiveSession => {
                "Subfunction Not Supported in Active Session"
            }
            Self::ServiceNotSupportedInActiveSession => "Service Not Supported in Active Session",
            Self::Unknown(_) => "Unknown Response Code",
        }
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: u8 = (*self).into();
        write!(f, "{} (0x{:02X})", self.description(), value)
    }
}
