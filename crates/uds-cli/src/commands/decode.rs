//! Decode command - interpret a UDS payload offline

use anyhow::{Context, Result};
use j1939_uds::UdsMessage;

use crate::output::OutputContext;

pub fn decode(payload: &str, ctx: &OutputContext) -> Result<()> {
    let bytes = parse_payload(payload)?;
    let message = UdsMessage::from_payload(0, "", 0, &bytes).context("Empty payload")?;

    ctx.print_kv(&[
        ("SID", message.sid.clone()),
        ("Service", message.service_name.clone()),
        ("Meaning", message.meaning.clone()),
        ("Value", message.value.clone()),
        ("Units", message.units.clone()),
        ("Raw Bytes", message.raw_bytes.clone()),
        ("Encoded Bytes", message.encoded_bytes.clone()),
    ]);
    Ok(())
}

/// Hex bytes with optional whitespace and `0x` prefix
fn parse_payload(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).with_context(|| format!("Invalid hex payload: {:?}", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("62 F1 90 31", vec![0x62, 0xF1, 0x90, 0x31])]
    #[case("0x7f2231", vec![0x7F, 0x22, 0x31])]
    #[case("  3E 00 ", vec![0x3E, 0x00])]
    fn test_parse_payload(#[case] input: &str, #[case] expected: Vec<u8>) {
        assert_eq!(parse_payload(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_payload_rejects_odd_digits() {
        assert!(parse_payload("62 F").is_err());
    }
}
