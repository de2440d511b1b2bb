//! Buffer-level cipher modes over the block engine.
//!
//! `chained` is CBC-shaped but XORs and reloads its carry register
//! with every 32-bit word byte-reversed. The pattern is part of the
//! wire contract and is reproduced here exactly as the devices expect
//! it, not simplified to textbook CBC.

use super::{AesError, ExpandedKey, BLOCK_SIZE};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// ECB over a whole buffer, in place. The buffer must be a multiple of
/// the block size.
pub fn ecb(key: &[u8; 16], data: &mut [u8], direction: Direction) -> Result<(), AesError> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(AesError::BlockAlignment(data.len()));
    }

    let expanded = ExpandedKey::expand(key)?;
    let mut block = [0u8; BLOCK_SIZE];
    for chunk in data.chunks_mut(BLOCK_SIZE) {
        block.copy_from_slice(chunk);
        match direction {
            Direction::Encrypt => expanded.encrypt_block(&mut block),
            Direction::Decrypt => expanded.decrypt_block(&mut block),
        }
        chunk.copy_from_slice(&block);
    }
    Ok(())
}

/// Chained mode, in place, with an implicit zero IV. A short trailing
/// chunk is run on a zero-padded block; only the chunk's own bytes are
/// written back.
pub fn chained(key: &[u8], data: &mut [u8], direction: Direction) -> Result<(), AesError> {
    let expanded = ExpandedKey::expand(key)?;

    let mut register = [0u8; BLOCK_SIZE];
    let mut offset = 0;
    while offset < data.len() {
        let chunk = ::std::cmp::min(BLOCK_SIZE, data.len() - offset);
        let mut block = [0u8; BLOCK_SIZE];
        block[..chunk].copy_from_slice(&data[offset..offset + chunk]);

        match direction {
            Direction::Encrypt => {
                xor_word_swapped(&mut block, &register);
                let mut cipher = [0u8; BLOCK_SIZE];
                expanded.encrypt_block_from(&block, &mut cipher);
                data[offset..offset + chunk].copy_from_slice(&cipher[..chunk]);
                load_word_swapped(&mut register, &cipher);
            }
            Direction::Decrypt => {
                let mut plain = [0u8; BLOCK_SIZE];
                expanded.decrypt_block_from(&block, &mut plain);
                xor_word_swapped(&mut plain, &register);
                data[offset..offset + chunk].copy_from_slice(&plain[..chunk]);
                load_word_swapped(&mut register, &block);
            }
        }

        offset += chunk;
    }
    Ok(())
}

/// MAC-then-encrypt: derives the CMAC subkeys from `E_hash(0)`, folds
/// the seed into a single padded block and encrypts it under `hash`
/// used as the AES key. The seed is either exactly one block (first
/// subkey) or shorter (0x80-terminated, second subkey).
pub fn encrypt_mac(hash: &[u8; 16], seed: &[u8], out: &mut [u8; 16]) -> Result<(), AesError> {
    if seed.len() > BLOCK_SIZE {
        return Err(AesError::SeedLength(seed.len()));
    }

    // E_hash(0^16): one chained block from the zero register.
    let mut leading = [0u8; BLOCK_SIZE];
    chained(hash, &mut leading, Direction::Encrypt)?;
    let k1 = double_subkey(&leading);
    let k2 = double_subkey(&k1);

    let mut scratch = [0u8; BLOCK_SIZE];
    if seed.len() == BLOCK_SIZE {
        for i in 0..BLOCK_SIZE {
            scratch[i] = seed[i] ^ k1[i];
        }
    } else {
        scratch[..seed.len()].copy_from_slice(seed);
        scratch[seed.len()] = 0x80;
        for i in 0..BLOCK_SIZE {
            scratch[i] ^= k2[i];
        }
    }

    let expanded = ExpandedKey::expand(hash)?;
    expanded.encrypt_block_from(&scratch, out);
    Ok(())
}

// Subkey doubling: shift the 128-bit value left one bit and fold in
// 0x87 when the high bit falls off.
fn double_subkey(value: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        let carry = if i == 15 { 0 } else { value[i + 1] >> 7 };
        out[i] = (value[i] << 1) | carry;
    }
    if value[0] & 0x80 != 0 {
        out[15] ^= 0x87;
    }
    out
}

// block[4w + j] ^= register[4w + 3 - j]: the register is applied with
// each 32-bit word byte-reversed.
fn xor_word_swapped(block: &mut [u8; 16], register: &[u8; 16]) {
    for word in 0..4 {
        for j in 0..4 {
            block[4 * word + j] ^= register[4 * word + 3 - j];
        }
    }
}

fn load_word_swapped(register: &mut [u8; 16], source: &[u8; 16]) {
    for word in 0..4 {
        for j in 0..4 {
            register[4 * word + j] = source[4 * word + 3 - j];
        }
    }
}

#[cfg(test)]
mod tests {
    use hex;

    use super::super::ExpandedKey;
    use super::{chained, ecb, encrypt_mac, Direction};

    const KEY: [u8; 16] = hex!("000102030405060708090a0b0c0d0e0f");

    #[test]
    fn ecb_single_block_is_the_raw_cipher() {
        let mut data = hex!("00112233445566778899aabbccddeeff");
        ecb(&KEY, &mut data, Direction::Encrypt).unwrap();
        assert_eq!(data, hex!("69c4e0d86a7b0430d8cdb78070b4c55a"));
        ecb(&KEY, &mut data, Direction::Decrypt).unwrap();
        assert_eq!(data, hex!("00112233445566778899aabbccddeeff"));
    }

    #[test]
    fn ecb_rejects_unaligned_buffers() {
        let mut data = [0u8; 30];
        assert!(ecb(&KEY, &mut data, Direction::Encrypt).is_err());
    }

    #[test]
    fn chained_fixed_vector() {
        // Three identical plaintext blocks; the register keeps the
        // ciphertext from repeating.
        let mut data = [0u8; 48];
        for chunk in data.chunks_mut(16) {
            chunk.copy_from_slice(&hex!("00112233445566778899aabbccddeeff"));
        }
        chained(&KEY, &mut data, Direction::Encrypt).unwrap();
        assert_eq!(
            hex::encode(&data[..]),
            "69c4e0d86a7b0430d8cdb78070b4c55a7d7786be32d059a60ca8021a65dd9f090165797a8a1dba85b4c0f11caead88eb",
        );
    }

    #[test]
    fn chained_round_trips() {
        for len in &[16usize, 32, 48, 832] {
            let mut data: Vec<u8> = (0..*len).map(|i| (i * 7 + 3) as u8).collect();
            let original = data.clone();
            chained(&KEY, &mut data, Direction::Encrypt).unwrap();
            assert_ne!(data, original);
            chained(&KEY, &mut data, Direction::Decrypt).unwrap();
            assert_eq!(data, original);
        }
    }

    #[test]
    fn chained_register_carries_previous_ciphertext() {
        // On full blocks the double byte-reversal cancels, so block 2
        // must equal E(P2 ^ C1).
        let mut data = [0u8; 32];
        data[16..].copy_from_slice(b"a second block!!");
        chained(&KEY, &mut data, Direction::Encrypt).unwrap();

        let expanded = ExpandedKey::expand(&KEY).unwrap();
        let mut expected = [0u8; 16];
        for i in 0..16 {
            expected[i] = b"a second block!!"[i] ^ data[i];
        }
        expanded.encrypt_block(&mut expected);
        assert_eq!(&data[16..], &expected[..]);
    }

    #[test]
    fn chained_short_tail_only_touches_its_own_bytes() {
        let mut data = [0xaau8; 24];
        let mut reference = [0xaau8; 32];
        reference[24..].copy_from_slice(&[0; 8]);
        chained(&KEY, &mut data, Direction::Encrypt).unwrap();
        chained(&KEY, &mut reference, Direction::Encrypt).unwrap();
        // The tail is the truncated encryption of the padded block.
        assert_eq!(&data[16..24], &reference[16..24]);

        let mut back = data;
        chained(&KEY, &mut back, Direction::Decrypt).unwrap();
        assert_eq!(&back[..16], &[0xaau8; 16][..]);
    }

    #[test]
    fn mac_matches_rfc_4493_empty_message() {
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let mut tag = [0u8; 16];
        encrypt_mac(&key, &[], &mut tag).unwrap();
        assert_eq!(tag, hex!("bb1d6929e95937287fa37d129b756746"));
    }

    #[test]
    fn mac_matches_rfc_4493_one_block_message() {
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let message = hex!("6bc1bee22e409f96e93d7e117393172a");
        let mut tag = [0u8; 16];
        encrypt_mac(&key, &message, &mut tag).unwrap();
        assert_eq!(tag, hex!("070a16b46b4d4144f79bdd9dd04a287c"));
    }

    #[test]
    fn mac_is_deterministic_and_keyed() {
        let key = hex!("9c41e76b08d2f3a55e60b91c24d8a7f3");
        let mut first = [0u8; 16];
        let mut second = [0u8; 16];
        encrypt_mac(&key, &hex!("00000007"), &mut first).unwrap();
        encrypt_mac(&key, &hex!("00000007"), &mut second).unwrap();
        assert_eq!(first, second);

        encrypt_mac(&key, &hex!("00000008"), &mut second).unwrap();
        assert_ne!(first, second);

        let other_key = hex!("9c41e76b08d2f3a55e60b91c24d8a7f2");
        encrypt_mac(&other_key, &hex!("00000007"), &mut second).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn mac_rejects_oversized_seeds() {
        let key = [0u8; 16];
        let mut tag = [0u8; 16];
        assert!(encrypt_mac(&key, &[0u8; 17], &mut tag).is_err());
    }
}
