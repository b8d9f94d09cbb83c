//! Identifier generation
//!
//! Provides:
//! - Random room codes, and ordered enumeration of small code spaces
//! - Opaque client id generation

/// Length of a generated room code in characters
pub const ROOM_CODE_LENGTH: usize = 6;

/// Characters used in room codes (unambiguous set)
const ROOM_CODE_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Number of random bytes in a client id
const CLIENT_ID_BYTES: usize = 8;

/// Generate a random room code of `len` characters (e.g. "K7QH2M")
pub fn generate_room_code(len: usize) -> Result<String, getrandom::Error> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes)?;

    // 256 is a multiple of the alphabet size, so the modulo is unbiased
    Ok(bytes
        .iter()
        .map(|b| ROOM_CODE_CHARS[(*b as usize) % ROOM_CODE_CHARS.len()] as char)
        .collect())
}

/// Number of distinct room codes of `len` characters, or None if it
/// does not fit in a u64
pub fn room_code_space(len: usize) -> Option<u64> {
    let len = u32::try_from(len).ok()?;
    (ROOM_CODE_CHARS.len() as u64).checked_pow(len)
}

/// The `index`-th room code of `len` characters in alphabet order.
/// `index` is taken modulo the code space.
pub fn room_code_at(len: usize, mut index: u64) -> String {
    let base = ROOM_CODE_CHARS.len() as u64;
    let mut code = vec![0u8; len];
    for slot in code.iter_mut().rev() {
        *slot = ROOM_CODE_CHARS[(index % base) as usize];
        index /= base;
    }
    code.into_iter().map(char::from).collect()
}

/// Generate an opaque client id (16 hex chars)
pub fn generate_client_id() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; CLIENT_ID_BYTES];
    getrandom::fill(&mut bytes)?;
    Ok(hex::encode(bytes))
}
