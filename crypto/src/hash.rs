use byteorder::{BigEndian, ByteOrder};
use zeroize::Zeroize;

// Initial hash value, FIPS 180-2 section 5.3.1.
const IV: [u32; 5] = [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476, 0xc3d2e1f0];

// Round constants, one per 20-round span.
const K: [u32; 4] = [0x5a827999, 0x6ed9eba1, 0x8f1bbcdc, 0xca62c1d6];

/// Incremental SHA-1 engine.
///
/// The total-length counter is a 32-bit word with an explicit overflow
/// word: absorbing wraps the low word and bumps the high word when
/// `new_low < old_low`. Finalisation splits the bit length as
/// `(high << 3) | (low >> 29)` and `low << 3`, writes both big-endian
/// into the padding block, and leaves the engine reset for reuse.
///
/// `mgf` layers the protocol's mask-generation function on top: block
/// `i` of the output is `SHA1(seed || be32(i))`.
pub struct Sha1 {
    buffer: [u8; 64],
    state: [u32; 5],
    length_high: u32,
    length_low: u32,
}

impl Sha1 {
    pub fn new() -> Self {
        Sha1 {
            buffer: [0; 64],
            state: IV,
            length_high: 0,
            length_low: 0,
        }
    }

    /// Restores the initial hash value and clears both length counters.
    /// The input buffer is left alone; the fill position derives from
    /// the length counter, so stale bytes are never read.
    pub fn reset(&mut self) {
        self.state = IV;
        self.length_high = 0;
        self.length_low = 0;
    }

    pub fn absorb(&mut self, data: &[u8]) {
        let mut fill = (self.length_low & 0x3f) as usize;

        let new_low = self.length_low.wrapping_add(data.len() as u32);
        if new_low < self.length_low {
            self.length_high += 1;
        }
        self.length_low = new_low;

        let mut rest = data;
        if fill != 0 {
            let take = ::std::cmp::min(64 - fill, rest.len());
            self.buffer[fill..fill + take].copy_from_slice(&rest[..take]);
            rest = &rest[take..];
            fill += take;
            if fill < 64 {
                return;
            }
            let block = self.buffer;
            Self::compute(&mut self.state, &block);
        }

        while rest.len() > 63 {
            Self::compute(&mut self.state, &rest[..64]);
            rest = &rest[64..];
        }

        if !rest.is_empty() {
            self.buffer[..rest.len()].copy_from_slice(rest);
        }
    }

    /// Pads, runs the last transform and writes the 20-byte digest.
    /// The engine comes back reset, with the buffer zeroised.
    pub fn finalize(&mut self, out: &mut [u8; 20]) {
        let mut tail = 64 - (self.length_low & 0x3f) as usize;
        if tail <= 8 {
            tail += 64;
        }

        let mut pad = [0u8; 72];
        pad[0] = 0x80;
        let high = (self.length_high << 3) | (self.length_low >> 29);
        let low = self.length_low << 3;
        BigEndian::write_u32(&mut pad[tail - 8..tail - 4], high);
        BigEndian::write_u32(&mut pad[tail - 4..tail], low);
        self.absorb(&pad[..tail]);

        for i in 0..5 {
            BigEndian::write_u32(&mut out[4 * i..4 * i + 4], self.state[i]);
        }

        self.buffer.zeroize();
        self.reset();
    }

    /// Mask-generation function: `out_len / 20 + 1` independent SHA-1
    /// blocks over `seed || be32(counter)`. Callers consume only the
    /// first `out_len` bytes of the returned buffer.
    pub fn mgf(&mut self, seed: &[u8], out_len: usize) -> Vec<u8> {
        let blocks = out_len / 20 + 1;
        let mut out = vec![0u8; blocks * 20];
        let mut counter = [0u8; 4];
        let mut digest = [0u8; 20];

        for i in 0..blocks {
            BigEndian::write_u32(&mut counter, i as u32);
            self.reset();
            self.absorb(seed);
            self.absorb(&counter);
            self.finalize(&mut digest);
            out[i * 20..(i + 1) * 20].copy_from_slice(&digest);
        }

        out
    }

    fn compute(state: &mut [u32; 5], block: &[u8]) {
        let mut w = [0u32; 80];
        for i in 0..16 {
            w[i] = BigEndian::read_u32(&block[4 * i..4 * i + 4]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }

        let mut a = state[0];
        let mut b = state[1];
        let mut c = state[2];
        let mut d = state[3];
        let mut e = state[4];

        for i in 0..80 {
            let s = i / 20;
            let f = match s {
                0 => (b & c) ^ (!b & d),
                2 => (b & c) ^ (b & d) ^ (c & d),
                _ => b ^ c ^ d,
            };
            let t = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(K[s])
                .wrapping_add(w[i]);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = t;
        }

        state[0] = state[0].wrapping_add(a);
        state[1] = state[1].wrapping_add(b);
        state[2] = state[2].wrapping_add(c);
        state[3] = state[3].wrapping_add(d);
        state[4] = state[4].wrapping_add(e);
    }
}

impl Drop for Sha1 {
    fn drop(&mut self) {
        self.buffer.zeroize();
        self.state.zeroize();
        self.length_high.zeroize();
        self.length_low.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use hex;

    use super::Sha1;

    fn digest_of(data: &[u8]) -> [u8; 20] {
        let mut engine = Sha1::new();
        let mut out = [0u8; 20];
        engine.absorb(data);
        engine.finalize(&mut out);
        out
    }

    #[test]
    fn empty_string() {
        assert_eq!(
            digest_of(b""),
            hex!("da39a3ee5e6b4b0d3255bfef95601890afd80709"),
        );
    }

    #[test]
    fn abc() {
        assert_eq!(
            digest_of(b"abc"),
            hex!("a9993e364706816aba3e25717850c26c9cd0d89c"),
        );
    }

    #[test]
    fn two_blocks() {
        // 56 bytes, so the padding spills into a second block.
        assert_eq!(
            digest_of(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq"),
            hex!("84983e441c3bd26ebaae4aa1f95129e5e54670f1"),
        );
    }

    #[test]
    fn incremental_absorb_matches_one_shot() {
        let data = b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq";
        let mut engine = Sha1::new();
        let mut out = [0u8; 20];
        for chunk in data.chunks(7) {
            engine.absorb(chunk);
        }
        engine.finalize(&mut out);
        assert_eq!(out, digest_of(data));
    }

    #[test]
    fn finalize_resets_the_engine() {
        let mut engine = Sha1::new();
        let mut first = [0u8; 20];
        let mut second = [0u8; 20];
        engine.absorb(b"abc");
        engine.finalize(&mut first);
        engine.absorb(b"abc");
        engine.finalize(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn mgf_fixed_vectors() {
        let mut engine = Sha1::new();
        // 20 requested bytes still yield two 20-byte blocks.
        let mask = engine.mgf(b"abc", 20);
        assert_eq!(
            hex::encode(&mask),
            "a03eb8ac3e6ad809805ec489ce85f2cefe8d00c69595e19565aec43db343f6e8c11e1224a7617f6f",
        );

        let mask = engine.mgf(b"abc", 45);
        assert_eq!(
            hex::encode(&mask),
            "a03eb8ac3e6ad809805ec489ce85f2cefe8d00c69595e19565aec43db343f6e8c11e1224a7617f6f8d54d36ca26d2a23f0224a86d02eccd714a4cff5",
        );
    }

    #[test]
    fn mgf_is_deterministic_after_other_use() {
        let mut engine = Sha1::new();
        let before = engine.mgf(b"some seed material", 107);

        let mut digest = [0u8; 20];
        engine.absorb(b"unrelated traffic");
        engine.finalize(&mut digest);

        let after = engine.mgf(b"some seed material", 107);
        assert_eq!(before, after);
    }
}
