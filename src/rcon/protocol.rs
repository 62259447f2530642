//! Out-of-band datagram framing
//!
//! Requests are four `0xFF` bytes, `rcon `, the password, a space, the
//! command and two newlines. Replies carry the same four-byte marker
//! followed by `print\n`, which shows up as `????print\n` once decoded.

/// Marker that opens every out-of-band datagram
pub const OOB_PREFIX: [u8; 4] = [0xFF; 4];

/// Header that opens every reply after lossy decoding
pub const PRINT_HEADER: &str = "????print\n";

/// Build the datagram for one command
pub fn frame_command(password: &str, command: &str) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(OOB_PREFIX.len() + password.len() + command.len() + 8);
    datagram.extend_from_slice(&OOB_PREFIX);
    datagram.extend_from_slice(b"rcon ");
    datagram.extend_from_slice(password.as_bytes());
    datagram.push(b' ');
    datagram.extend_from_slice(command.as_bytes());
    datagram.extend_from_slice(b"\n\n");
    datagram
}

/// Decode a reply as ASCII; anything outside the range becomes `?`
pub fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// Turn a raw reply into printable text
///
/// Framing is stripped first so a password that happens to occur inside
/// `print` cannot break the header; the password is then redacted.
pub fn sanitize_response(bytes: &[u8], password: &str, redaction_marker: &str) -> String {
    let text = decode_ascii(bytes)
        .replace(PRINT_HEADER, "")
        .replace('\0', "");
    if password.is_empty() {
        return text;
    }
    text.replace(password, redaction_marker)
}

/// Quote a chat line for the `say` command
pub fn say_command(message: &str) -> String {
    format!("say \"{}\"", message.replace('"', "'"))
}
