// Nix's base32 is not RFC 4648: the alphabet omits E O U T and digits are
// emitted in reverse bit order, so no registry crate covers it.

// omitted: E O U T
const ALPHABET: &[u8] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Number of base32 characters needed for `n` bytes of input.
pub const fn encoded_len(n: usize) -> usize {
    if n == 0 { 0 } else { (n * 8 - 1) / 5 + 1 }
}

/// Encodes a byte slice into nix-style base32.
pub fn encode(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(bytes.len()));

    for n in (0..encoded_len(bytes.len())).rev() {
        let b = n * 5;
        let i = b / 8;
        let j = b % 8;
        let lo = bytes[i].checked_shr(j as u32).unwrap_or(0);
        let hi = if i + 1 < bytes.len() {
            bytes[i + 1].checked_shl((8 - j) as u32).unwrap_or(0)
        } else {
            0
        };
        out.push(ALPHABET[((lo | hi) & 0x1f) as usize]);
    }

    out
}

/// Decodes nix-style base32 back into bytes.
///
/// The caller is expected to know the digest length; trailing bits that do
/// not fit a whole byte must be zero in a canonical encoding, but are
/// dropped here like the C++ implementation does.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, InvalidBase32> {
    let out_len = input.len() * 5 / 8;
    let mut out = vec![0u8; out_len];

    for (n, &c) in input.iter().rev().enumerate() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or(InvalidBase32(c))? as u8;

        let b = n * 5;
        let i = b / 8;
        let j = b % 8;

        if i < out_len {
            out[i] |= digit << j;
            if j > 3 && i + 1 < out_len {
                out[i + 1] |= digit >> (8 - j);
            }
        }
    }

    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid nix base32 character: {}", char::from(*.0))]
pub struct InvalidBase32(pub u8);
