// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line framing for envelopes: one JSON object per `\n`-terminated line.
//!
//! Oversized or undecodable lines are protocol violations for the sending
//! instance only; the failure never propagates to other instances.

use tessera_core::TesseraError;

use crate::envelope::Envelope;

/// Ceiling on a single serialized envelope, newline excluded.
pub const MAX_ENVELOPE_BYTES: usize = 256 * 1024;

/// Serializes an envelope to its wire line (newline not included).
pub fn encode_line(envelope: &Envelope) -> Result<String, TesseraError> {
    let line = serde_json::to_string(envelope)
        .map_err(|e| TesseraError::Internal(format!("envelope serialization failed: {e}")))?;
    if line.len() > MAX_ENVELOPE_BYTES {
        return Err(TesseraError::ProtocolViolation {
            detail: format!(
                "outgoing envelope of {} bytes exceeds the {MAX_ENVELOPE_BYTES} byte ceiling",
                line.len()
            ),
        });
    }
    Ok(line)
}

/// Parses one wire line into an envelope.
pub fn decode_line(line: &str) -> Result<Envelope, TesseraError> {
    if line.len() > MAX_ENVELOPE_BYTES {
        return Err(TesseraError::ProtocolViolation {
            detail: format!(
                "incoming line of {} bytes exceeds the {MAX_ENVELOPE_BYTES} byte ceiling",
                line.len()
            ),
        });
    }
    serde_json::from_str(line).map_err(|e| TesseraError::ProtocolViolation {
        detail: format!("undecodable envelope: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;
    use proptest::prelude::*;
    use serde_json::json;
    use tessera_core::types::InstanceId;

    #[test]
    fn encode_then_decode_preserves_envelope() {
        let env = Envelope::request(
            EnvelopeKind::Configure,
            InstanceId("i-1".into()),
            json!({"settings": {"format": "24h"}}),
            17,
        );
        let line = encode_line(&env).unwrap();
        let back = decode_line(&line).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn oversized_line_is_a_protocol_violation() {
        let big = "x".repeat(MAX_ENVELOPE_BYTES + 1);
        let err = decode_line(&big).unwrap_err();
        assert!(matches!(err, TesseraError::ProtocolViolation { .. }));
    }

    #[test]
    fn oversized_payload_is_rejected_on_encode() {
        let env = Envelope::event(
            EnvelopeKind::Update,
            InstanceId("i-1".into()),
            json!({"blob": "y".repeat(MAX_ENVELOPE_BYTES)}),
            0,
        );
        let err = encode_line(&env).unwrap_err();
        assert!(matches!(err, TesseraError::ProtocolViolation { .. }));
    }

    #[test]
    fn missing_required_fields_fail_to_decode() {
        let err = decode_line(r#"{"kind":"update"}"#).unwrap_err();
        assert!(matches!(err, TesseraError::ProtocolViolation { .. }));
    }

    #[test]
    fn unknown_kind_fails_to_decode() {
        let line = r#"{"kind":"heartbeat","instanceId":"i-1","payload":{},"timestampMonotonic":0}"#;
        let err = decode_line(line).unwrap_err();
        assert!(matches!(err, TesseraError::ProtocolViolation { .. }));
    }

    proptest! {
        // Arbitrary junk must surface as ProtocolViolation, never a panic.
        #[test]
        fn decode_never_panics_on_arbitrary_input(line in ".{0,512}") {
            let _ = decode_line(&line);
        }
    }
}
