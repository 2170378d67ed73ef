//! Line protocol spoken over the rendezvous connection.
//!
//! Messages are newline-delimited. Content is never parsed: every line is
//! treated as a sign of life, whatever it says.

/// The heartbeat line.
pub const HEARTBEAT: &[u8] = b"ping\n";

/// Line delimiter.
pub const DELIMITER: u8 = b'\n';

/// Longest frame a reader accepts, delimiter included.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Turn one raw frame into a printable line.
///
/// Strips the delimiter and a trailing `\r`; invalid UTF-8 is replaced
/// rather than rejected.
pub fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(&[DELIMITER]).unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
