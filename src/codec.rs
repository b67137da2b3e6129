//! Decoding of `/proc/net/tcp` style endpoints.

/// Turns a kernel `HEXADDR:HEXPORT` pair into `a.b.c.d:port`.
///
/// The address is stored as a little-endian `u32`, so the hex text is read
/// back to front two digits at a time. Input without exactly one `:` is
/// returned unchanged.
pub fn decode_address(raw: &str) -> String {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 2 {
        return raw.to_string();
    }
    let (addr, port) = (parts[0], parts[1]);

    let bytes = addr.as_bytes();
    let mut octets = Vec::with_capacity(bytes.len() / 2);
    let mut end = bytes.len();
    while end >= 2 {
        let octet = std::str::from_utf8(&bytes[end - 2..end])
            .ok()
            .and_then(|chunk| u8::from_str_radix(chunk, 16).ok())
            .unwrap_or(0);
        octets.push(octet.to_string());
        end -= 2;
    }

    let port = u16::from_str_radix(port, 16).unwrap_or(0);
    format!("{}:{}", octets.join("."), port)
}

pub fn tcp_state_name(code: &str) -> &'static str {
    match u8::from_str_radix(code.trim(), 16) {
        Ok(0x01) => "ESTABLISHED",
        Ok(0x02) => "SYN_SENT",
        Ok(0x03) => "SYN_RECV",
        Ok(0x04) => "FIN_WAIT1",
        Ok(0x05) => "FIN_WAIT2",
        Ok(0x06) => "TIME_WAIT",
        Ok(0x07) => "CLOSE",
        Ok(0x08) => "CLOSE_WAIT",
        Ok(0x09) => "LAST_ACK",
        Ok(0x0A) => "LISTEN",
        Ok(0x0B) => "CLOSING",
        _ => "UNKNOWN",
    }
}
