//! Page checksum primitive.
//!
//! A whole-page CRC-32 (reversed polynomial `0xEDB8_8320`, seed
//! `0xFFFF_FFFF`, final complement) — exactly the parameters `crc32fast`
//! implements, so we reuse it rather than hand-rolling a table.
//!
//! Pages are checksummed with their `crc` header field zeroed; the
//! caller is responsible for zeroing that field before calling
//! [`checksum`] and for restoring it afterwards.

use crc32fast::Hasher;

#[must_use]
pub fn checksum(image: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(image);
    hasher.finalize()
}
