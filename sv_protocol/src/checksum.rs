use tracing::{event, Level};

use crate::types::{ChecksumMode, ProtocolError};

/// XOR of every byte of the payload (the text between `$` and `*`), as two uppercase hex digits
pub fn compute_checksum(payload: &str) -> String {
    let checksum: u8 = payload.bytes().fold(0_u8, |acc, b| acc ^ b);
    format!("{:02X}", checksum)
}

/// Checks the `*CC` suffix of a received sentence against its payload.
/// Lenient mode only reports a mismatch in the log.
pub fn verify_checksum(sentence: &str, mode: ChecksumMode) -> Result<(), ProtocolError> {
    let result = check(sentence);

    match (mode, result) {
        (_, Ok(())) => Ok(()),
        (ChecksumMode::Strict, Err(e)) => Err(e),
        (ChecksumMode::Lenient, Err(e)) => {
            event!(Level::TRACE, "Ignoring checksum problem in lenient mode: {}", e);
            Ok(())
        }
    }
}

fn check(sentence: &str) -> Result<(), ProtocolError> {
    let body = sentence.trim_end_matches(['\r', '\n']);
    let body = body.strip_prefix('$').unwrap_or(body);

    let (payload, found) = body
        .split_once('*')
        .ok_or_else(|| ProtocolError::MissingChecksum(sentence.to_string()))?;

    let found = found.trim();
    if found.is_empty() {
        return Err(ProtocolError::MissingChecksum(sentence.to_string()));
    }

    let expected = compute_checksum(payload);
    if !expected.eq_ignore_ascii_case(found) {
        return Err(ProtocolError::ChecksumMismatch {
            expected,
            found: found.to_string(),
        });
    }

    Ok(())
}
