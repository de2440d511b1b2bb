use std::{error, fmt};

use num_bigint::BigUint;

/// RSA key pair built from big-endian hex strings.
///
/// There is deliberately no `sign`/`decrypt` split: the protocol does
/// its own padding and uses the bare private-key exponentiation for
/// both, so a single `private_op` is exposed and each call site says
/// which role it plays. The public half exists for symmetry and lets
/// tests close the loop.
pub struct RsaKeyPair {
    modulus: BigUint,
    public_exponent: BigUint,
    private_exponent: BigUint,
}

#[derive(Debug, Eq, PartialEq)]
pub enum RsaError {
    /// One of the hex strings did not parse as a big-endian integer.
    BadHex(&'static str),
    /// The result does not fit the caller's output buffer.
    OutputTooShort { needed: usize, available: usize },
}

impl error::Error for RsaError {}

impl fmt::Display for RsaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::RsaError::*;

        match self {
            &BadHex(field) => write!(f, "rsa {} is not valid hex", field),
            &OutputTooShort { needed, available } => {
                write!(f, "rsa result needs {} bytes, buffer has {}", needed, available)
            }
        }
    }
}

impl RsaKeyPair {
    pub fn from_hex(
        modulus: &str,
        private_exponent: &str,
        public_exponent: &str,
    ) -> Result<Self, RsaError> {
        Ok(RsaKeyPair {
            modulus: parse_hex(modulus, "modulus")?,
            private_exponent: parse_hex(private_exponent, "private exponent")?,
            public_exponent: parse_hex(public_exponent, "public exponent")?,
        })
    }

    /// Raw `input^d mod N`, big-endian in and out, the result
    /// left-padded with zeros to exactly `out.len()` bytes. No padding
    /// scheme is applied or checked here.
    pub fn private_op(&self, input: &[u8], out: &mut [u8]) -> Result<(), RsaError> {
        let value = BigUint::from_bytes_be(input).modpow(&self.private_exponent, &self.modulus);
        write_left_padded(&value, out)
    }

    /// Raw `input^e mod N`; the inverse of `private_op`.
    pub fn public_op(&self, input: &[u8], out: &mut [u8]) -> Result<(), RsaError> {
        let value = BigUint::from_bytes_be(input).modpow(&self.public_exponent, &self.modulus);
        write_left_padded(&value, out)
    }
}

fn parse_hex(digits: &str, field: &'static str) -> Result<BigUint, RsaError> {
    BigUint::parse_bytes(digits.as_bytes(), 16).ok_or(RsaError::BadHex(field))
}

fn write_left_padded(value: &BigUint, out: &mut [u8]) -> Result<(), RsaError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > out.len() {
        return Err(RsaError::OutputTooShort {
            needed: bytes.len(),
            available: out.len(),
        });
    }
    let pad = out.len() - bytes.len();
    for b in &mut out[..pad] {
        *b = 0;
    }
    out[pad..].copy_from_slice(&bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use hex;

    use super::{RsaError, RsaKeyPair};

    // 1024-bit test-only key.
    const N: &'static str =
        "92943D3008CE60F85394351B3E1CC29374FF0A30C14F620487BBFE538B297BF8\
         98551C1EF53B13F58DFED38762884E76499133FD1F1BDFF607ED7B91C2C34257\
         4A2C42DEBA2ADDDA7E403977C521014C4F9FDF6C7A38BD01E54DEC61AC6A65EB\
         8A51BBFB2D570200A11CFF9C9D611FC3E028D44DC62BDE53F11FE560C1F99A27";
    const D: &'static str =
        "84CAF1A80BC254CD8482979E27A64C8CE4888DC5DFCBB8241C882EFFA6EA9D5A\
         793F59EB9E05B8AE54C71101ED3D49C016240B327D3576AFE13CC01F2C90530F\
         7A3A198FFBA79BDEBFDEFB72B8C028636D5E455173E9E28BF1C11B04519E8A6D\
         2C04DCB87A40F6A22B3A99AD3DA507C3C407E2E39763A293678F09AA1733A5F9";
    const E: &'static str = "010001";

    fn key() -> RsaKeyPair {
        RsaKeyPair::from_hex(N, D, E).unwrap()
    }

    #[test]
    fn fixed_private_op() {
        let input = hex::decode(
            "00b3618ca9f3d21738ca0ee304dabbfddaa9cc61dedf530e652d657f35b2100b\
             c05897a5484005a4500a19fb4f23e17d4d9faf4675793ebb89d5c39cf081491c\
             d29d0e145948f0774e09681a2bae56fa1cc35848a59c33a2770d6114716865e7\
             9dc2af221250d7662fae271b7e0684023354bf100fb685f92fb35f9ff99922db",
        )
        .unwrap();
        let mut out = [0u8; 128];
        key().private_op(&input, &mut out).unwrap();
        assert_eq!(
            hex::encode(&out[..]),
            "5f8cf1ba78bd63b35f54cb9b9a2d2f1fe0ceefa97884674f5a6b6fcc3816dd20\
             2725e202adb355f3df75a0e54a0a43c5a8267ea4b1be86f394f48e655175c080\
             40e432f573495f7887b8c74741ba8e67f1e3b727c77b14ae292955620f626930\
             bbb645fa6214e504b837cbc61a04efc1f674130ad0c157db9506d156a42fb605",
        );
    }

    #[test]
    fn public_op_inverts_private_op() {
        let key = key();
        let mut message = [0u8; 128];
        message[0] = 0;
        for i in 1..128 {
            message[i] = (i * 31) as u8;
        }
        let mut transformed = [0u8; 128];
        let mut recovered = [0u8; 128];
        key.private_op(&message, &mut transformed).unwrap();
        key.public_op(&transformed, &mut recovered).unwrap();
        assert_eq!(&recovered[..], &message[..]);
    }

    #[test]
    fn short_results_are_left_padded() {
        // 1^d mod N == 1, which must land in the last byte only.
        let key = key();
        let input = [1u8];
        let mut out = [0xffu8; 128];
        key.private_op(&input, &mut out).unwrap();
        assert_eq!(&out[..127], &[0u8; 127][..]);
        assert_eq!(out[127], 1);
    }

    #[test]
    fn oversized_results_are_refused() {
        let key = key();
        let input = [0xffu8; 128];
        let mut out = [0u8; 16];
        match key.private_op(&input, &mut out) {
            Err(RsaError::OutputTooShort { available: 16, .. }) => (),
            other => panic!("expected OutputTooShort, got {:?}", other.err()),
        }
    }

    #[test]
    fn bad_hex_is_reported_by_field() {
        assert_eq!(
            RsaKeyPair::from_hex("zz", D, E).err(),
            Some(RsaError::BadHex("modulus")),
        );
        assert_eq!(
            RsaKeyPair::from_hex(N, "not hex", E).err(),
            Some(RsaError::BadHex("private exponent")),
        );
    }
}
