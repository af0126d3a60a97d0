//! Text encoding detection and round-tripping.
//!
//! Files are decoded with the encoding announced by their byte-order mark and
//! written back with the same encoding, BOM included, so an updater that edits
//! text never silently converts a UTF-16 file to UTF-8.

use std::fmt;

use thiserror::Error;

const UTF7_BOM_PREFIX: [u8; 3] = [0x2b, 0x2f, 0x76];
const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];
const UTF16LE_BOM: [u8; 2] = [0xff, 0xfe];
const UTF16BE_BOM: [u8; 2] = [0xfe, 0xff];
const UTF32LE_BOM: [u8; 4] = [0xff, 0xfe, 0x00, 0x00];
const UTF32BE_BOM: [u8; 4] = [0x00, 0x00, 0xfe, 0xff];

const BYTE_ORDER_MARK: char = '\u{feff}';

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Errors from decoding or encoding text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid {encoding} data: {message}")]
    Invalid {
        encoding: TextEncoding,
        message: String,
    },

    #[error("character {ch:?} cannot be represented in {encoding}")]
    Unrepresentable { encoding: TextEncoding, ch: char },
}

/// A text encoding recognised by [`TextEncoding::detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8 without a byte-order mark. The default.
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    Utf7,
    /// No BOM and not valid UTF-8: one byte per character.
    Latin1,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Bom => "utf-8 (bom)",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Utf32Le => "utf-32le",
            TextEncoding::Utf32Be => "utf-32be",
            TextEncoding::Utf7 => "utf-7",
            TextEncoding::Latin1 => "latin-1",
        };
        f.write_str(name)
    }
}

impl TextEncoding {
    /// Inspect the byte-order mark of `bytes`.
    ///
    /// Without a BOM, valid UTF-8 is [`TextEncoding::Utf8`]; anything else
    /// falls back to the single-byte [`TextEncoding::Latin1`].
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&UTF7_BOM_PREFIX) {
            TextEncoding::Utf7
        } else if bytes.starts_with(&UTF8_BOM) {
            TextEncoding::Utf8Bom
        } else if bytes.starts_with(&UTF32LE_BOM) {
            TextEncoding::Utf32Le
        } else if bytes.starts_with(&UTF16LE_BOM) {
            TextEncoding::Utf16Le
        } else if bytes.starts_with(&UTF16BE_BOM) {
            TextEncoding::Utf16Be
        } else if bytes.starts_with(&UTF32BE_BOM) {
            TextEncoding::Utf32Be
        } else if std::str::from_utf8(bytes).is_ok() {
            TextEncoding::Utf8
        } else {
            TextEncoding::Latin1
        }
    }

    /// Decode `bytes`, dropping the byte-order mark.
    pub fn decode(self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            TextEncoding::Utf8 => self.decode_utf8(bytes),
            TextEncoding::Utf8Bom => {
                self.decode_utf8(bytes.strip_prefix(&UTF8_BOM[..]).unwrap_or(bytes))
            }
            TextEncoding::Utf16Le => self.decode_utf16(
                bytes.strip_prefix(&UTF16LE_BOM[..]).unwrap_or(bytes),
                u16::from_le_bytes,
            ),
            TextEncoding::Utf16Be => self.decode_utf16(
                bytes.strip_prefix(&UTF16BE_BOM[..]).unwrap_or(bytes),
                u16::from_be_bytes,
            ),
            TextEncoding::Utf32Le => self.decode_utf32(
                bytes.strip_prefix(&UTF32LE_BOM[..]).unwrap_or(bytes),
                u32::from_le_bytes,
            ),
            TextEncoding::Utf32Be => self.decode_utf32(
                bytes.strip_prefix(&UTF32BE_BOM[..]).unwrap_or(bytes),
                u32::from_be_bytes,
            ),
            TextEncoding::Utf7 => {
                let text = decode_utf7(bytes)?;
                Ok(text
                    .strip_prefix(BYTE_ORDER_MARK)
                    .map(str::to_owned)
                    .unwrap_or(text))
            }
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Encode `text`, prefixed with this encoding's byte-order mark.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodingError> {
        let encoded = match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf8Bom => [&UTF8_BOM[..], text.as_bytes()].concat(),
            TextEncoding::Utf16Le => {
                let mut out = UTF16LE_BOM.to_vec();
                out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
                out
            }
            TextEncoding::Utf16Be => {
                let mut out = UTF16BE_BOM.to_vec();
                out.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
                out
            }
            TextEncoding::Utf32Le => {
                let mut out = UTF32LE_BOM.to_vec();
                out.extend(text.chars().flat_map(|c| u32::from(c).to_le_bytes()));
                out
            }
            TextEncoding::Utf32Be => {
                let mut out = UTF32BE_BOM.to_vec();
                out.extend(text.chars().flat_map(|c| u32::from(c).to_be_bytes()));
                out
            }
            TextEncoding::Utf7 => {
                let mut with_bom = String::with_capacity(text.len() + 3);
                with_bom.push(BYTE_ORDER_MARK);
                with_bom.push_str(text);
                encode_utf7(&with_bom)
            }
            TextEncoding::Latin1 => text
                .chars()
                .map(|ch| {
                    u8::try_from(u32::from(ch))
                        .map_err(|_| EncodingError::Unrepresentable { encoding: self, ch })
                })
                .collect::<Result<Vec<u8>, _>>()?,
        };
        Ok(encoded)
    }

    fn invalid(self, message: impl Into<String>) -> EncodingError {
        EncodingError::Invalid {
            encoding: self,
            message: message.into(),
        }
    }

    fn decode_utf8(self, bytes: &[u8]) -> Result<String, EncodingError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| self.invalid(e.to_string()))
    }

    fn decode_utf16(
        self,
        bytes: &[u8],
        unit: fn([u8; 2]) -> u16,
    ) -> Result<String, EncodingError> {
        if bytes.len() % 2 != 0 {
            return Err(self.invalid("odd number of bytes"));
        }
        let units = bytes.chunks_exact(2).map(|c| unit([c[0], c[1]]));
        char::decode_utf16(units)
            .collect::<Result<String, _>>()
            .map_err(|e| self.invalid(e.to_string()))
    }

    fn decode_utf32(
        self,
        bytes: &[u8],
        unit: fn([u8; 4]) -> u32,
    ) -> Result<String, EncodingError> {
        if bytes.len() % 4 != 0 {
            return Err(self.invalid("length is not a multiple of 4"));
        }
        bytes
            .chunks_exact(4)
            .map(|c| {
                let value = unit([c[0], c[1], c[2], c[3]]);
                char::from_u32(value)
                    .ok_or_else(|| self.invalid(format!("invalid code point {value:#x}")))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// UTF-7 (RFC 2152)
// ---------------------------------------------------------------------------

fn is_utf7_direct(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'(),-./:? \t\r\n".contains(c)
}

fn base64_value(b: u8) -> Option<u32> {
    BASE64_ALPHABET
        .iter()
        .position(|&a| a == b)
        .map(|p| p as u32)
}

fn decode_utf7(bytes: &[u8]) -> Result<String, EncodingError> {
    let invalid = |message: &str| TextEncoding::Utf7.invalid(message);
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'+' {
            if !b.is_ascii() {
                return Err(invalid("non-ASCII byte outside a shifted sequence"));
            }
            out.push(char::from(b));
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && base64_value(bytes[end]).is_some() {
            end += 1;
        }

        if end == start {
            // "+-" encodes a literal plus sign.
            if bytes.get(end) == Some(&b'-') {
                out.push('+');
                i = end + 1;
                continue;
            }
            return Err(invalid("empty shifted sequence"));
        }

        let mut units = Vec::new();
        let mut acc: u32 = 0;
        let mut bits = 0u32;
        for &c in &bytes[start..end] {
            let value = base64_value(c).ok_or_else(|| invalid("bad base64 digit"))?;
            acc = (acc << 6) | value;
            bits += 6;
            if bits >= 16 {
                bits -= 16;
                units.push((acc >> bits) as u16);
                acc &= (1 << bits) - 1;
            }
        }
        let decoded = char::decode_utf16(units)
            .collect::<Result<String, _>>()
            .map_err(|e| invalid(&e.to_string()))?;
        out.push_str(&decoded);

        i = end;
        if bytes.get(i) == Some(&b'-') {
            i += 1;
        }
    }

    Ok(out)
}

fn encode_utf7(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut shifted = false;
    let mut acc: u32 = 0;
    let mut bits = 0u32;

    let flush = |out: &mut Vec<u8>, acc: &mut u32, bits: &mut u32| {
        if *bits > 0 {
            let index = (*acc << (6 - *bits)) & 0x3f;
            out.push(BASE64_ALPHABET[index as usize]);
        }
        out.push(b'-');
        *acc = 0;
        *bits = 0;
    };

    for c in text.chars() {
        if is_utf7_direct(c) || c == '+' {
            if shifted {
                flush(&mut out, &mut acc, &mut bits);
                shifted = false;
            }
            if c == '+' {
                out.extend_from_slice(b"+-");
            } else {
                out.push(c as u8);
            }
            continue;
        }

        if !shifted {
            out.push(b'+');
            shifted = true;
        }
        let mut buf = [0u16; 2];
        for unit in c.encode_utf16(&mut buf) {
            acc = (acc << 16) | u32::from(*unit);
            bits += 16;
            while bits >= 6 {
                bits -= 6;
                out.push(BASE64_ALPHABET[((acc >> bits) & 0x3f) as usize]);
            }
            acc &= (1 << bits) - 1;
        }
    }

    if shifted {
        flush(&mut out, &mut acc, &mut bits);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0xef, 0xbb, 0xbf, b'a'], TextEncoding::Utf8Bom)]
    #[case(&[0xff, 0xfe, b'a', 0x00], TextEncoding::Utf16Le)]
    #[case(&[0xfe, 0xff, 0x00, b'a'], TextEncoding::Utf16Be)]
    #[case(&[0xff, 0xfe, 0x00, 0x00], TextEncoding::Utf32Le)]
    #[case(&[0x00, 0x00, 0xfe, 0xff], TextEncoding::Utf32Be)]
    #[case(b"+/v8-hi", TextEncoding::Utf7)]
    #[case(b"plain text", TextEncoding::Utf8)]
    #[case(&[b'c', b'a', b'f', 0xe9], TextEncoding::Latin1)]
    #[case(b"", TextEncoding::Utf8)]
    fn detect_by_bom(#[case] bytes: &[u8], #[case] expected: TextEncoding) {
        assert_eq!(TextEncoding::detect(bytes), expected);
    }

    #[test]
    fn utf16le_decode_strips_bom_and_encode_restores_it() {
        let bytes = [0xff, 0xfe, b'h', 0x00, b'i', 0x00];
        let text = TextEncoding::Utf16Le.decode(&bytes).unwrap();
        assert_eq!(text, "hi");
        assert_eq!(TextEncoding::Utf16Le.encode(&text).unwrap(), bytes.to_vec());
    }

    #[test]
    fn utf32be_preserves_astral_characters() {
        let encoded = TextEncoding::Utf32Be.encode("a\u{1f600}").unwrap();
        assert_eq!(&encoded[..4], &UTF32BE_BOM);
        assert_eq!(
            TextEncoding::detect(&encoded),
            TextEncoding::Utf32Be,
        );
        assert_eq!(
            TextEncoding::Utf32Be.decode(&encoded).unwrap(),
            "a\u{1f600}"
        );
    }

    #[test]
    fn utf7_decodes_rfc_examples() {
        // RFC 2152: "Hi Mom -☺-!"
        assert_eq!(
            decode_utf7(b"Hi Mom -+Jjo--!").unwrap(),
            "Hi Mom -\u{263a}-!"
        );
        assert_eq!(decode_utf7(b"1 +- 1").unwrap(), "1 + 1");
        assert_eq!(decode_utf7(b"+ZeVnLIqe-").unwrap(), "\u{65e5}\u{672c}\u{8a9e}");
    }

    #[test]
    fn utf7_output_is_detected_and_decoded() {
        let text = "caf\u{e9} + tea";
        let encoded = TextEncoding::Utf7.encode(text).unwrap();
        assert!(encoded.iter().all(u8::is_ascii));
        assert_eq!(TextEncoding::detect(&encoded), TextEncoding::Utf7);
        assert_eq!(TextEncoding::Utf7.decode(&encoded).unwrap(), text);
    }

    #[test]
    fn latin1_rejects_wide_characters() {
        assert_eq!(
            TextEncoding::Latin1.encode("\u{263a}").unwrap_err(),
            EncodingError::Unrepresentable {
                encoding: TextEncoding::Latin1,
                ch: '\u{263a}',
            }
        );
        assert_eq!(
            TextEncoding::Latin1.encode("caf\u{e9}").unwrap(),
            vec![b'c', b'a', b'f', 0xe9]
        );
    }

    #[test]
    fn odd_length_utf16_is_invalid() {
        assert!(matches!(
            TextEncoding::Utf16Le.decode(&[0xff, 0xfe, b'a']),
            Err(EncodingError::Invalid { .. })
        ));
    }
}
