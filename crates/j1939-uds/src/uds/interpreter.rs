//! Service and parameter lookup for display

use std::fmt;

use super::{service_id, standard_did, NegativeResponseCode, ServiceKind, POSITIVE_RESPONSE_BIT};

/// Resolved name of a service identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceName {
    /// SID is a known request (or the negative response SID)
    Request(ServiceKind),
    /// SID is the positive response to a known request
    Response(ServiceKind),
    Unknown,
}

impl ServiceName {
    pub fn resolve(sid: u8) -> Self {
        if let Some(kind) = ServiceKind::from_sid(sid) {
            return Self::Request(kind);
        }
        match ServiceKind::from_sid(sid & !POSITIVE_RESPONSE_BIT) {
            Some(kind) => Self::Response(kind),
            None => Self::Unknown,
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(kind) => f.write_str(kind.name()),
            Self::Response(kind) => write!(f, "Res. {}", kind.name()),
            Self::Unknown => f.write_str("Unknown SID"),
        }
    }
}

/// Human-readable name of a service identifier
pub fn service_name(sid: u8) -> String {
    ServiceName::resolve(sid).to_string()
}

/// How a known data identifier's value is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DidEncoding {
    Ascii,
    /// Left for the caller to interpret
    Raw,
}

/// Data identifiers decoded in ReadDataByIdentifier responses (ISO 14229-1 Table C.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownDid {
    BootSoftwareIdentification,
    ApplicationSoftwareIdentification,
    ActiveDiagnosticSession,
    EcuSerialNumber,
    VehicleIdentificationNumber,
    SupplierHardwareNumber,
    SupplierHardwareVersion,
    SupplierSoftwareVersion,
    SystemName,
}

impl KnownDid {
    pub fn from_did(did: u16) -> Option<Self> {
        match did {
            standard_did::BOOT_SOFTWARE_ID => Some(Self::BootSoftwareIdentification),
            standard_did::APPLICATION_SOFTWARE_ID => Some(Self::ApplicationSoftwareIdentification),
            standard_did::ACTIVE_DIAGNOSTIC_SESSION => Some(Self::ActiveDiagnosticSession),
            standard_did::ECU_SERIAL_NUMBER => Some(Self::EcuSerialNumber),
            standard_did::VIN => Some(Self::VehicleIdentificationNumber),
            standard_did::SUPPLIER_HW_NUMBER => Some(Self::SupplierHardwareNumber),
            standard_did::SUPPLIER_HW_VERSION => Some(Self::SupplierHardwareVersion),
            standard_did::SUPPLIER_SW_VERSION => Some(Self::SupplierSoftwareVersion),
            standard_did::SYSTEM_NAME => Some(Self::SystemName),
            _ => None,
        }
    }

    pub fn meaning(self) -> &'static str {
        match self {
            Self::BootSoftwareIdentification => "Boot Software Identification",
            Self::ApplicationSoftwareIdentification => "Application Software Identification",
            Self::ActiveDiagnosticSession => "Active Diagnostic Session",
            Self::EcuSerialNumber => "ECU Serial Number",
            Self::VehicleIdentificationNumber => "Vehicle Identification Number",
            Self::SupplierHardwareNumber => "System Supplier ECU Hardware Number",
            Self::SupplierHardwareVersion => "System Supplier ECU Hardware Version Number",
            Self::SupplierSoftwareVersion => "System Supplier ECU Software Version Number",
            Self::SystemName => "System Name or Engine Type",
        }
    }

    fn encoding(self) -> DidEncoding {
        match self {
            Self::EcuSerialNumber | Self::VehicleIdentificationNumber => DidEncoding::Ascii,
            _ => DidEncoding::Raw,
        }
    }
}

/// Display decoding of one UDS message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub meaning: String,
    pub value: String,
    pub units: String,
}

/// Decode the parameters following `sid`
///
/// - `0x62`: 2-byte big-endian DID, ASCII value for VIN and serial number
/// - `0x7F`: `params[1]` is the negative response code
/// - anything else: `params[1..5]` as a big-endian u32, else `params[1..3]`
///   as a u16. This last case is a display heuristic only; it is not a
///   protocol-correct decoding and nothing should depend on it.
pub fn decode(sid: u8, params: &[u8]) -> Decoded {
    match sid {
        service_id::READ_DATA_BY_ID_RESPONSE => decode_read_data_response(params),
        service_id::NEGATIVE_RESPONSE => Decoded {
            meaning: params
                .get(1)
                .map(|&code| NegativeResponseCode::from(code).description())
                .unwrap_or(NegativeResponseCode::Unknown(0).description())
                .to_string(),
            ..Default::default()
        },
        _ => Decoded {
            meaning: numeric_heuristic(params).unwrap_or_default(),
            ..Default::default()
        },
    }
}

fn decode_read_data_response(params: &[u8]) -> Decoded {
    let Some(did_bytes) = params.get(0..2) else {
        return Decoded::default();
    };
    let did = u16::from_be_bytes([did_bytes[0], did_bytes[1]]);
    let Some(known) = KnownDid::from_did(did) else {
        return Decoded::default();
    };

    match known.encoding() {
        DidEncoding::Ascii => Decoded {
            meaning: known.meaning().to_string(),
            value: ascii_ignore(&params[2..]),
            units: "ASCII".to_string(),
        },
        DidEncoding::Raw => Decoded {
            meaning: known.meaning().to_string(),
            ..Default::default()
        },
    }
}

fn numeric_heuristic(params: &[u8]) -> Option<String> {
    if let Some(b) = params.get(1..5) {
        return Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]).to_string());
    }
    params
        .get(1..3)
        .map(|b| u16::from_be_bytes([b[0], b[1]]).to_string())
}

/// ASCII text with non-ASCII bytes skipped
fn ascii_ignore(bytes: &[u8]) -> String {
    bytes.iter().filter(|b| b.is_ascii()).map(|&b| b as char).collect()
}

/// Printable ASCII characters only (0x20..=0x7E)
pub fn printable_chars(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| (0x20..=0x7E).contains(*b))
        .map(|&b| b as char)
        .collect()
}
