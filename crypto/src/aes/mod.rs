//! AES engine with the expanded-schedule layout the protocol fixes.
//!
//! The schedule buffer holds the round count, then two consecutive
//! copies of the raw key schedule. Encryption reads round keys from the
//! first copy, front to back; decryption reads from the second copy,
//! back to front, after its inner round keys have been rewritten by an
//! InvMixColumns pass. One table-lookup round body then serves both
//! directions.

pub mod modes;
pub mod tables;

use std::{error, fmt};

use byteorder::{BigEndian, ByteOrder};
use zeroize::Zeroize;

use self::tables::{IMC0, IMC1, IMC2, IMC3, INV_SBOX, RCON, SBOX};
use self::tables::{TD0, TD1, TD2, TD3, TE0, TE1, TE2, TE3};

pub const BLOCK_SIZE: usize = 16;

// Room for the round count, two 240-byte schedules and padding.
const SCHEDULE_SIZE: usize = 484;

#[derive(Debug, Eq, PartialEq)]
pub enum AesError {
    /// Key is not 16, 24 or 32 bytes.
    KeyLength(usize),
    /// Buffer handed to the block-aligned mode is not a multiple of 16.
    BlockAlignment(usize),
    /// MAC seed does not fit a single block.
    SeedLength(usize),
}

impl error::Error for AesError {}

impl fmt::Display for AesError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::AesError::*;

        match self {
            &KeyLength(len) => write!(f, "aes key length {} not in {{16, 24, 32}}", len),
            &BlockAlignment(len) => write!(f, "buffer length {} not a multiple of 16", len),
            &SeedLength(len) => write!(f, "mac seed of {} bytes exceeds one block", len),
        }
    }
}

/// Expanded key schedule. Exclusively owned by the cipher operation
/// that created it; the buffer is wiped on drop.
pub struct ExpandedKey {
    buf: [u8; SCHEDULE_SIZE],
}

impl ExpandedKey {
    pub fn expand(key: &[u8]) -> Result<ExpandedKey, AesError> {
        let rounds = match key.len() {
            16 => 10,
            24 => 12,
            32 => 14,
            n => return Err(AesError::KeyLength(n)),
        };
        let inner_len = 16 * (rounds + 1);

        let mut buf = [0u8; SCHEDULE_SIZE];
        buf[0] = rounds as u8;
        expand_inner(key, &mut buf[4..4 + inner_len]);
        {
            let (first, second) = buf[4..].split_at_mut(inner_len);
            second[..inner_len].copy_from_slice(first);
        }
        inv_mix_columns(&mut buf[4 + inner_len..4 + 2 * inner_len], rounds);

        Ok(ExpandedKey { buf: buf })
    }

    fn rounds(&self) -> usize {
        self.buf[0] as usize
    }

    fn word(&self, offset: usize) -> u32 {
        BigEndian::read_u32(&self.buf[offset..offset + 4])
    }

    pub fn encrypt_block(&self, block: &mut [u8; 16]) {
        let input = *block;
        self.encrypt_block_from(&input, block);
    }

    pub fn decrypt_block(&self, block: &mut [u8; 16]) {
        let input = *block;
        self.decrypt_block_from(&input, block);
    }

    /// Encrypts `input` into `out`; `out`'s prior contents are ignored.
    pub fn encrypt_block_from(&self, input: &[u8; 16], out: &mut [u8; 16]) {
        let rounds = self.rounds();
        let mut off = 4;

        let mut s0 = BigEndian::read_u32(&input[0..4]) ^ self.word(off);
        let mut s1 = BigEndian::read_u32(&input[4..8]) ^ self.word(off + 4);
        let mut s2 = BigEndian::read_u32(&input[8..12]) ^ self.word(off + 8);
        let mut s3 = BigEndian::read_u32(&input[12..16]) ^ self.word(off + 12);

        for _ in 1..rounds {
            let t0 = TE0[(s0 >> 24) as usize]
                ^ TE1[((s1 >> 16) & 0xff) as usize]
                ^ TE2[((s2 >> 8) & 0xff) as usize]
                ^ TE3[(s3 & 0xff) as usize];
            let t1 = TE0[(s1 >> 24) as usize]
                ^ TE1[((s2 >> 16) & 0xff) as usize]
                ^ TE2[((s3 >> 8) & 0xff) as usize]
                ^ TE3[(s0 & 0xff) as usize];
            let t2 = TE0[(s2 >> 24) as usize]
                ^ TE1[((s3 >> 16) & 0xff) as usize]
                ^ TE2[((s0 >> 8) & 0xff) as usize]
                ^ TE3[(s1 & 0xff) as usize];
            let t3 = TE0[(s3 >> 24) as usize]
                ^ TE1[((s0 >> 16) & 0xff) as usize]
                ^ TE2[((s1 >> 8) & 0xff) as usize]
                ^ TE3[(s2 & 0xff) as usize];

            off += 16;
            s0 = t0 ^ self.word(off);
            s1 = t1 ^ self.word(off + 4);
            s2 = t2 ^ self.word(off + 8);
            s3 = t3 ^ self.word(off + 12);
        }

        off += 16;
        let o0 = sub_word(s0 >> 24, s1 >> 16, s2 >> 8, s3);
        let o1 = sub_word(s1 >> 24, s2 >> 16, s3 >> 8, s0);
        let o2 = sub_word(s2 >> 24, s3 >> 16, s0 >> 8, s1);
        let o3 = sub_word(s3 >> 24, s0 >> 16, s1 >> 8, s2);

        BigEndian::write_u32(&mut out[0..4], o0 ^ self.word(off));
        BigEndian::write_u32(&mut out[4..8], o1 ^ self.word(off + 4));
        BigEndian::write_u32(&mut out[8..12], o2 ^ self.word(off + 8));
        BigEndian::write_u32(&mut out[12..16], o3 ^ self.word(off + 12));
    }

    /// Decrypts `input` into `out`; `out`'s prior contents are ignored.
    pub fn decrypt_block_from(&self, input: &[u8; 16], out: &mut [u8; 16]) {
        let rounds = self.rounds();
        // Last round key of the second schedule copy.
        let mut off = 4 + 16 * (rounds + 1) + 16 * rounds;

        let mut s0 = BigEndian::read_u32(&input[0..4]) ^ self.word(off);
        let mut s1 = BigEndian::read_u32(&input[4..8]) ^ self.word(off + 4);
        let mut s2 = BigEndian::read_u32(&input[8..12]) ^ self.word(off + 8);
        let mut s3 = BigEndian::read_u32(&input[12..16]) ^ self.word(off + 12);

        for _ in 1..rounds {
            let t0 = TD0[(s0 >> 24) as usize]
                ^ TD1[((s3 >> 16) & 0xff) as usize]
                ^ TD2[((s2 >> 8) & 0xff) as usize]
                ^ TD3[(s1 & 0xff) as usize];
            let t1 = TD0[(s1 >> 24) as usize]
                ^ TD1[((s0 >> 16) & 0xff) as usize]
                ^ TD2[((s3 >> 8) & 0xff) as usize]
                ^ TD3[(s2 & 0xff) as usize];
            let t2 = TD0[(s2 >> 24) as usize]
                ^ TD1[((s1 >> 16) & 0xff) as usize]
                ^ TD2[((s0 >> 8) & 0xff) as usize]
                ^ TD3[(s3 & 0xff) as usize];
            let t3 = TD0[(s3 >> 24) as usize]
                ^ TD1[((s2 >> 16) & 0xff) as usize]
                ^ TD2[((s1 >> 8) & 0xff) as usize]
                ^ TD3[(s0 & 0xff) as usize];

            off -= 16;
            s0 = t0 ^ self.word(off);
            s1 = t1 ^ self.word(off + 4);
            s2 = t2 ^ self.word(off + 8);
            s3 = t3 ^ self.word(off + 12);
        }

        off -= 16;
        let o0 = inv_sub_word(s0 >> 24, s3 >> 16, s2 >> 8, s1);
        let o1 = inv_sub_word(s1 >> 24, s0 >> 16, s3 >> 8, s2);
        let o2 = inv_sub_word(s2 >> 24, s1 >> 16, s0 >> 8, s3);
        let o3 = inv_sub_word(s3 >> 24, s2 >> 16, s1 >> 8, s0);

        BigEndian::write_u32(&mut out[0..4], o0 ^ self.word(off));
        BigEndian::write_u32(&mut out[4..8], o1 ^ self.word(off + 4));
        BigEndian::write_u32(&mut out[8..12], o2 ^ self.word(off + 8));
        BigEndian::write_u32(&mut out[12..16], o3 ^ self.word(off + 12));
    }
}

impl Drop for ExpandedKey {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}

fn sub_word(b3: u32, b2: u32, b1: u32, b0: u32) -> u32 {
    (SBOX[(b3 & 0xff) as usize] as u32) << 24
        | (SBOX[(b2 & 0xff) as usize] as u32) << 16
        | (SBOX[(b1 & 0xff) as usize] as u32) << 8
        | SBOX[(b0 & 0xff) as usize] as u32
}

fn inv_sub_word(b3: u32, b2: u32, b1: u32, b0: u32) -> u32 {
    (INV_SBOX[(b3 & 0xff) as usize] as u32) << 24
        | (INV_SBOX[(b2 & 0xff) as usize] as u32) << 16
        | (INV_SBOX[(b1 & 0xff) as usize] as u32) << 8
        | INV_SBOX[(b0 & 0xff) as usize] as u32
}

// Standard Rijndael schedule; 256-bit keys take an extra S-box pass
// midway through each key-length stride.
fn expand_inner(key: &[u8], out: &mut [u8]) {
    let key_len = key.len();
    out[..key_len].copy_from_slice(key);

    let mut rcon = 0;
    let mut i = key_len;
    while i < out.len() {
        let mut t = [out[i - 4], out[i - 3], out[i - 2], out[i - 1]];
        if i % key_len == 0 {
            t = [
                SBOX[t[1] as usize] ^ RCON[rcon],
                SBOX[t[2] as usize],
                SBOX[t[3] as usize],
                SBOX[t[0] as usize],
            ];
            rcon += 1;
        } else if key_len > 24 && i % key_len == 16 {
            t = [
                SBOX[t[0] as usize],
                SBOX[t[1] as usize],
                SBOX[t[2] as usize],
                SBOX[t[3] as usize],
            ];
        }
        for j in 0..4 {
            out[i + j] = out[i + j - key_len] ^ t[j];
        }
        i += 4;
    }
}

// Rewrites round keys 1..rounds-1 of a schedule copy in place, so that
// decryption can use the same round body as encryption.
fn inv_mix_columns(schedule: &mut [u8], rounds: usize) {
    for round in 1..rounds {
        for column in 0..4 {
            let o = 16 * round + 4 * column;
            let word = IMC0[schedule[o] as usize]
                ^ IMC1[schedule[o + 1] as usize]
                ^ IMC2[schedule[o + 2] as usize]
                ^ IMC3[schedule[o + 3] as usize];
            BigEndian::write_u32(&mut schedule[o..o + 4], word);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand;

    use super::ExpandedKey;

    // FIPS-197 appendix C vectors.
    const PLAINTEXT: [u8; 16] = hex!("00112233445566778899aabbccddeeff");

    #[test]
    fn fips_197_aes_128() {
        let key = ExpandedKey::expand(&hex!("000102030405060708090a0b0c0d0e0f")).unwrap();
        let mut block = PLAINTEXT;
        key.encrypt_block(&mut block);
        assert_eq!(block, hex!("69c4e0d86a7b0430d8cdb78070b4c55a"));
        key.decrypt_block(&mut block);
        assert_eq!(block, PLAINTEXT);
    }

    #[test]
    fn fips_197_aes_192() {
        let key =
            ExpandedKey::expand(&hex!("000102030405060708090a0b0c0d0e0f1011121314151617"))
                .unwrap();
        let mut block = PLAINTEXT;
        key.encrypt_block(&mut block);
        assert_eq!(block, hex!("dda97ca4864cdfe06eaf70a0ec0d7191"));
        key.decrypt_block(&mut block);
        assert_eq!(block, PLAINTEXT);
    }

    #[test]
    fn fips_197_aes_256() {
        let key = ExpandedKey::expand(&hex!(
            "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
        ))
        .unwrap();
        let mut block = PLAINTEXT;
        key.encrypt_block(&mut block);
        assert_eq!(block, hex!("8ea2b7ca516745bfeafc49904b496089"));
        key.decrypt_block(&mut block);
        assert_eq!(block, PLAINTEXT);
    }

    #[test]
    fn random_round_trips() {
        for _ in 0..32 {
            let key: [u8; 16] = rand::random();
            let block: [u8; 16] = rand::random();
            let expanded = ExpandedKey::expand(&key).unwrap();
            let mut work = block;
            expanded.encrypt_block(&mut work);
            expanded.decrypt_block(&mut work);
            assert_eq!(work, block);
        }
    }

    #[test]
    fn rejects_bad_key_lengths() {
        assert!(ExpandedKey::expand(&[0u8; 15]).is_err());
        assert!(ExpandedKey::expand(&[0u8; 17]).is_err());
        assert!(ExpandedKey::expand(&[]).is_err());
    }

    #[test]
    fn seeded_form_ignores_output_contents() {
        let key = ExpandedKey::expand(&hex!("000102030405060708090a0b0c0d0e0f")).unwrap();
        let input = *b"sixteen byte in.";
        let mut out = hex!("ffffffffffffffffffffffffffffffff");
        key.encrypt_block_from(&input, &mut out);
        let mut reference = input;
        key.encrypt_block(&mut reference);
        assert_eq!(out, reference);
    }
}
