//! Pure validators guarding outbound protocol invariants (RFC 6455).

/// Admissibility table for the RFC 7230 `token` character class.
///
/// Indexed by ASCII code; 1 marks a character allowed in extension names and
/// parameter names. Shared with the extension negotiation codec.
pub(crate) const TOKEN_CHARS: [u8; 128] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //   0 - 15
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //  16 - 31
    0, 1, 0, 1, 1, 1, 1, 1, 0, 0, 1, 1, 0, 1, 1, 0, //  32 - 47
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, //  48 - 63
    0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //  64 - 79
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 1, 1, //  80 - 95
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //  96 - 111
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1, 0, 1, 0, // 112 - 127
];

/// Returns `true` if `c` belongs to the RFC 7230 `token` character class.
#[inline]
pub(crate) fn is_token_char(c: u8) -> bool {
    c < 128 && TOKEN_CHARS[c as usize] == 1
}

/// Checks whether a status code is allowed in a close frame (RFC 6455
/// Section 7.4).
///
/// Valid codes are 1000-1014 excluding 1004, 1005 and 1006 (reserved for
/// local use only), plus the registered/private range 3000-4999.
#[must_use]
pub const fn is_valid_close_code(code: u16) -> bool {
    (code >= 1000 && code <= 1014 && code != 1004 && code != 1005 && code != 1006)
        || (code >= 3000 && code <= 4999)
}

/// Inputs at or above this length delegate to the standard library's
/// validator, which wins on large buffers.
const UTF8_SCAN_CUTOVER: usize = 24;

/// Checks whether a buffer contains only well-formed UTF-8.
///
/// Strict acceptance: overlong encodings, surrogate code points and
/// out-of-range 4-byte sequences are rejected. Never panics.
#[must_use]
pub fn is_valid_utf8(data: &[u8]) -> bool {
    if data.len() >= UTF8_SCAN_CUTOVER {
        return std::str::from_utf8(data).is_ok();
    }
    scan_utf8(data)
}

/// Byte-class scanner for short inputs, behaviorally identical to the
/// standard library validator.
fn scan_utf8(data: &[u8]) -> bool {
    let len = data.len();
    let mut i = 0;

    while i < len {
        let byte = data[i];

        if byte & 0x80 == 0 {
            // 0xxxxxxx
            i += 1;
        } else if byte & 0xe0 == 0xc0 {
            // 110xxxxx 10xxxxxx
            if i + 1 >= len || data[i + 1] & 0xc0 != 0x80 || byte & 0xfe == 0xc0 {
                return false;
            }
            i += 2;
        } else if byte & 0xf0 == 0xe0 {
            // 1110xxxx 10xxxxxx 10xxxxxx
            if i + 2 >= len
                || data[i + 1] & 0xc0 != 0x80
                || data[i + 2] & 0xc0 != 0x80
                || (byte == 0xe0 && data[i + 1] & 0xe0 == 0x80)
                || (byte == 0xed && data[i + 1] & 0xe0 == 0xa0)
            {
                return false;
            }
            i += 3;
        } else if byte & 0xf8 == 0xf0 {
            // 11110xxx 10xxxxxx 10xxxxxx 10xxxxxx
            if i + 3 >= len
                || data[i + 1] & 0xc0 != 0x80
                || data[i + 2] & 0xc0 != 0x80
                || data[i + 3] & 0xc0 != 0x80
                || (byte == 0xf0 && data[i + 1] & 0xf0 == 0x80)
                || (byte == 0xf4 && data[i + 1] > 0x8f)
                || byte > 0xf4
            {
                return false;
            }
            i += 4;
        } else {
            return false;
        }
    }
    true
}
