//! Lexical and semantic fingerprints over manuscript content.
//!
//! The lexical digest is an exact-content SHA-256: any byte change anywhere
//! in the tracked content changes it. The semantic signature is a 64-bit
//! simhash over word tokens, so paraphrase-level edits keep most bits in
//! common while unrelated text diverges. Both are pure functions of their
//! inputs.

use sha2::{Digest, Sha256};
use siphasher::sip::SipHasher24;
use std::fmt;
use std::hash::Hasher;

use crate::error::{EngineError, EngineResult};

/// Width of the semantic signature in bits.
pub const SIGNATURE_BITS: u32 = 64;

// Fixed keys so signatures are stable across runs and hosts.
const TOKEN_HASH_KEYS: (u64, u64) = (0x6d68_7562_2d73_6967, 0x6669_6e67_6572_7072);

/// Reject content that signals an upstream decode failure. Extraction output
/// that arrived through a lossy conversion carries U+FFFD; NUL never appears
/// in legitimate manuscript text.
pub fn canonicalize(text: &str) -> EngineResult<&str> {
    if text.contains('\u{0}') {
        return Err(EngineError::encoding("content contains NUL bytes"));
    }
    if text.contains('\u{FFFD}') {
        return Err(EngineError::encoding(
            "content contains replacement characters from a failed decode",
        ));
    }
    Ok(text)
}

/// SHA-256 hex digest over the length-framed concatenation of `parts`.
///
/// Each part is preceded by its byte length so distinct part boundaries can
/// never collide (`["ab", "c"]` vs `["a", "bc"]`). Empty input hashes the
/// empty frame sequence.
pub fn lexical_digest(parts: &[&str]) -> EngineResult<String> {
    let mut hasher = Sha256::new();
    for part in parts {
        let part = canonicalize(part)?;
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// A 64-bit locality-sensitive signature of manuscript meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(u64);

impl Signature {
    pub fn zero() -> Self {
        Signature(0)
    }

    pub fn bits(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Signature {
    /// Grouped-bit rendering (`"10110010 01001100 ..."`), eight octets of
    /// the signature from most to least significant.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in 0..8 {
            if group > 0 {
                f.write_str(" ")?;
            }
            let octet = (self.0 >> (56 - group * 8)) & 0xff;
            write!(f, "{octet:08b}")?;
        }
        Ok(())
    }
}

/// Parse a grouped-bit signature string. Lenient: whitespace is ignored and
/// anything that is not a full 64 bits of `0`/`1` yields the bits that were
/// present, left-aligned. Round-trips exactly with [`Signature`]'s display.
pub fn parse_signature(text: &str) -> Signature {
    let mut bits = 0u64;
    let mut count = 0u32;
    for ch in text.chars() {
        let bit = match ch {
            '0' => 0,
            '1' => 1,
            _ => continue,
        };
        if count == SIGNATURE_BITS {
            break;
        }
        bits = (bits << 1) | bit;
        count += 1;
    }
    if count == 0 {
        return Signature::zero();
    }
    Signature(bits << (SIGNATURE_BITS - count))
}

/// Compute the simhash signature of `text`.
///
/// Word tokens (lowercased alphanumeric runs) each contribute a keyed 64-bit
/// hash; every bit position accumulates +1/-1 by that hash's bit and the
/// sign of the sum becomes the signature bit. Empty or token-free content
/// yields the all-zero signature.
pub fn semantic_signature(text: &str) -> EngineResult<Signature> {
    let text = canonicalize(text)?;
    let mut acc = [0i32; SIGNATURE_BITS as usize];
    let mut saw_token = false;
    for token in tokens(text) {
        saw_token = true;
        let hash = token_hash(&token);
        for (position, slot) in acc.iter_mut().enumerate() {
            if hash >> position & 1 == 1 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }
    if !saw_token {
        return Ok(Signature::zero());
    }
    let mut bits = 0u64;
    for (position, slot) in acc.iter().enumerate() {
        if *slot > 0 {
            bits |= 1 << position;
        }
    }
    Ok(Signature(bits))
}

/// Similarity of two signatures in [0, 100], monotone in bit overlap and
/// exactly 100 for identical signatures. Rounded to two decimals.
pub fn similarity(a: Signature, b: Signature) -> f64 {
    let matching = SIGNATURE_BITS - (a.bits() ^ b.bits()).count_ones();
    round2(f64::from(matching) * 100.0 / f64::from(SIGNATURE_BITS))
}

/// Round to two decimal places, the precision the similarity score is
/// reported and stored at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn token_hash(token: &str) -> u64 {
    let mut hasher = SipHasher24::new_with_keys(TOKEN_HASH_KEYS.0, TOKEN_HASH_KEYS.1);
    hasher.write(token.as_bytes());
    hasher.finish()
}
