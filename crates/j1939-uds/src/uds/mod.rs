//! UDS (Unified Diagnostic Services, ISO 14229-1) interpretation
//!
//! Decoding here is advisory and display-oriented: unknown services,
//! identifiers and response codes resolve to placeholder text and never
//! fail.

mod interpreter;
mod message;
mod nrc;

pub use interpreter::{decode, printable_chars, service_name, Decoded, KnownDid, ServiceName};
pub use message::{bytes_repr, hex_string, UdsMessage, UdsMessageLog};
pub use nrc::NegativeResponseCode;

/// Positive responses carry the request SID with this bit set
pub const POSITIVE_RESPONSE_BIT: u8 = 0x40;

/// Standard UDS service ID constants
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const READ_DATA_BY_ID: u8 = 0x22;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const COMMUNICATION_CONTROL: u8 = 0x28;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const ACCESS_TIMING_PARAMETER: u8 = 0x83;
    pub const SECURED_DATA_TRANSMISSION: u8 = 0x84;
    pub const CONTROL_DTC_SETTING: u8 = 0x85;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;

    /// Positive response to ReadDataByIdentifier
    pub const READ_DATA_BY_ID_RESPONSE: u8 = READ_DATA_BY_ID | super::POSITIVE_RESPONSE_BIT;
}

/// Standard UDS Data Identifiers (ISO 14229-1 Annex C)
pub mod standard_did {
    pub const BOOT_SOFTWARE_ID: u16 = 0xF180;
    pub const APPLICATION_SOFTWARE_ID: u16 = 0xF181;
    pub const ACTIVE_DIAGNOSTIC_SESSION: u16 = 0xF186;
    pub const ECU_SERIAL_NUMBER: u16 = 0xF18C;
    pub const VIN: u16 = 0xF190;
    pub const SUPPLIER_HW_NUMBER: u16 = 0xF192;
    pub const SUPPLIER_HW_VERSION: u16 = 0xF193;
    pub const SUPPLIER_SW_VERSION: u16 = 0xF195;
    pub const SYSTEM_NAME: u16 = 0xF197;
}

/// Diagnostic session types for DiagnosticSessionControl (0x10)
pub mod session_type {
    pub const DEFAULT: u8 = 0x01;
    /// Bit 7 set: suppress positive response
    pub const SUPPRESS_POSITIVE_RESPONSE: u8 = 0x80;
}

/// The UDS services this crate recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    NegativeResponse,
    DiagnosticSessionControl,
    EcuReset,
    SecurityAccess,
    ReadDataByIdentifier,
    CommunicationControl,
    TesterPresent,
    AccessTimingParameter,
    SecuredDataTransmission,
    ControlDtcSetting,
    RoutineControl,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 11] = [
        Self::NegativeResponse,
        Self::DiagnosticSessionControl,
        Self::EcuReset,
        Self::SecurityAccess,
        Self::ReadDataByIdentifier,
        Self::CommunicationControl,
        Self::TesterPresent,
        Self::AccessTimingParameter,
        Self::SecuredDataTransmission,
        Self::ControlDtcSetting,
        Self::RoutineControl,
    ];

    pub fn from_sid(sid: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.sid() == sid)
    }

    pub fn sid(self) -> u8 {
        match self {
            Self::NegativeResponse => service_id::NEGATIVE_RESPONSE,
            Self::DiagnosticSessionControl => service_id::DIAGNOSTIC_SESSION_CONTROL,
            Self::EcuReset => service_id::ECU_RESET,
            Self::SecurityAccess => service_id::SECURITY_ACCESS,
            Self::ReadDataByIdentifier => service_id::READ_DATA_BY_ID,
            Self::CommunicationControl => service_id::COMMUNICATION_CONTROL,
            Self::TesterPresent => service_id::TESTER_PRESENT,
            Self::AccessTimingParameter => service_id::ACCESS_TIMING_PARAMETER,
            Self::SecuredDataTransmission => service_id::SECURED_DATA_TRANSMISSION,
            Self::ControlDtcSetting => service_id::CONTROL_DTC_SETTING,
            Self::RoutineControl => service_id::ROUTINE_CONTROL,
        }
    }

    /// Service name per ISO 14229-1:2013 Table 23
    pub fn name(self) -> &'static str {
        match self {
            Self::NegativeResponse => "Negative Response",
            Self::DiagnosticSessionControl => "Diagnostic Session Control",
            Self::EcuReset => "ECU Reset",
            Self::SecurityAccess => "Security Access",
            Self::ReadDataByIdentifier => "Read Data By Identifier",
            Self::CommunicationControl => "Communication Control",
            Self::TesterPresent => "Tester Present",
            Self::AccessTimingParameter => "Access Timing Parameter",
            Self::SecuredDataTransmission => "Secure Data Transmission",
            Self::ControlDtcSetting => "Control DTC Setting",
            Self::RoutineControl => "Routine Control",
        }
    }
}

/// True when `response_sid` is the positive response to `request_sid`
pub fn is_positive_response(request_sid: u8, response_sid: u8) -> bool {
    response_sid ^ request_sid == POSITIVE_RESPONSE_BIT
}
