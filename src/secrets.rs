//! Loader for the five-line `~/.mtpz-data` secrets file.
//!
//! The file carries, one hex line each: the RSA public exponent, the
//! 16-byte storage encryption key, the RSA modulus, the RSA private
//! exponent and the application certificate blob. The modulus and the
//! exponents stay in hex form because the RSA engine consumes hex; the
//! encryption key and the certificates are decoded to raw bytes.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::{env, error, fmt};

use hex;
use zeroize::Zeroize;

// Per-line caps, one more than the longest legal line so an oversized
// line is detected rather than silently split.
const PUBLIC_EXPONENT_CAP: u64 = 7;
const ENCRYPTION_KEY_CAP: u64 = 33;
const MODULUS_CAP: u64 = 257;
const PRIVATE_KEY_CAP: u64 = 257;
const CERTIFICATES_CAP: u64 = 1259;

/// The per-installation key material, immutable once loaded and wiped
/// on drop. Secret fields never appear in `Debug` output or logs.
pub struct Secrets {
    public_exponent: String,
    encryption_key: [u8; 16],
    modulus: String,
    private_key: String,
    certificates: Vec<u8>,
}

#[derive(Debug)]
pub enum SecretsError {
    Io(io::Error),
    /// The named line (or the home directory) is absent.
    Missing(&'static str),
    /// The named line is not valid hex.
    Hex(&'static str, hex::FromHexError),
    /// The named line has the wrong number of hex digits.
    Length {
        line: &'static str,
        expected: usize,
        found: usize,
    },
}

impl error::Error for SecretsError {
    fn cause(&self) -> Option<&dyn error::Error> {
        match self {
            &SecretsError::Io(ref e) => Some(e),
            &SecretsError::Hex(_, ref e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SecretsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::SecretsError::*;

        match self {
            &Io(ref e) => write!(f, "io error: {}", e),
            &Missing(what) => write!(f, "{} is missing", what),
            &Hex(line, ref e) => write!(f, "{} line is not valid hex: {}", line, e),
            &Length { line, expected, found } => {
                write!(f, "{} line has {} hex digits, expected {}", line, found, expected)
            }
        }
    }
}

impl Secrets {
    /// Loads `$HOME/.mtpz-data`, logging one error line on failure.
    /// A missing file or a malformed line both leave MTPZ disabled.
    pub fn load_default() -> Result<Secrets, SecretsError> {
        let result = env::var_os("HOME")
            .ok_or(SecretsError::Missing("home directory"))
            .and_then(|home| {
                let mut path = PathBuf::from(home);
                path.push(".mtpz-data");
                Secrets::load(&path)
            });
        if let Err(ref error) = result {
            error!("(MTPZ) Unable to load ~/.mtpz-data: {}. MTPZ disabled.", error);
        }
        result
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Secrets, SecretsError> {
        let file = File::open(path).map_err(SecretsError::Io)?;
        Secrets::parse(BufReader::new(file))
    }

    pub fn parse<R: BufRead>(mut reader: R) -> Result<Secrets, SecretsError> {
        let public_exponent = read_line(&mut reader, PUBLIC_EXPONENT_CAP, "public exponent")?;
        if public_exponent.len() > 6 {
            return Err(SecretsError::Length {
                line: "public exponent",
                expected: 6,
                found: public_exponent.len(),
            });
        }
        check_hex_digits(&public_exponent, "public exponent")?;

        let key_hex = read_line(&mut reader, ENCRYPTION_KEY_CAP, "encryption key")?;
        if key_hex.len() != 32 {
            return Err(SecretsError::Length {
                line: "encryption key",
                expected: 32,
                found: key_hex.len(),
            });
        }
        let key_bytes =
            hex::decode(&key_hex).map_err(|e| SecretsError::Hex("encryption key", e))?;
        let mut encryption_key = [0u8; 16];
        encryption_key.copy_from_slice(&key_bytes);

        let modulus = read_line(&mut reader, MODULUS_CAP, "modulus")?;
        if modulus.len() != 256 {
            return Err(SecretsError::Length {
                line: "modulus",
                expected: 256,
                found: modulus.len(),
            });
        }
        check_hex_digits(&modulus, "modulus")?;

        let private_key = read_line(&mut reader, PRIVATE_KEY_CAP, "private key")?;
        if private_key.len() != 256 {
            return Err(SecretsError::Length {
                line: "private key",
                expected: 256,
                found: private_key.len(),
            });
        }
        check_hex_digits(&private_key, "private key")?;

        let certs_hex = read_line(&mut reader, CERTIFICATES_CAP, "certificates")?;
        if certs_hex.len() > 1258 {
            return Err(SecretsError::Length {
                line: "certificates",
                expected: 1258,
                found: certs_hex.len(),
            });
        }
        let certificates =
            hex::decode(&certs_hex).map_err(|e| SecretsError::Hex("certificates", e))?;

        Ok(Secrets {
            public_exponent: public_exponent,
            encryption_key: encryption_key,
            modulus: modulus,
            private_key: private_key,
            certificates: certificates,
        })
    }

    /// RSA public exponent, hex.
    pub fn public_exponent(&self) -> &str {
        &self.public_exponent
    }

    /// AES key for protected storage operations; the handshake itself
    /// does not consume it.
    pub fn encryption_key(&self) -> &[u8; 16] {
        &self.encryption_key
    }

    /// RSA modulus, 256 hex digits.
    pub fn modulus(&self) -> &str {
        &self.modulus
    }

    /// RSA private exponent, 256 hex digits.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Application certificate blob, embedded verbatim in the
    /// certificate message.
    pub fn certificates(&self) -> &[u8] {
        &self.certificates
    }
}

impl Drop for Secrets {
    fn drop(&mut self) {
        self.public_exponent.zeroize();
        self.encryption_key.zeroize();
        self.modulus.zeroize();
        self.private_key.zeroize();
        self.certificates.zeroize();
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Secrets {{ certificates: {} bytes }}", self.certificates.len())
    }
}

// One line, at most `cap` bytes, one trailing newline stripped.
fn read_line<R: BufRead>(
    reader: &mut R,
    cap: u64,
    line: &'static str,
) -> Result<String, SecretsError> {
    let mut out = String::new();
    let read = reader
        .by_ref()
        .take(cap)
        .read_line(&mut out)
        .map_err(SecretsError::Io)?;
    if read == 0 {
        return Err(SecretsError::Missing(line));
    }
    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

fn check_hex_digits(digits: &str, line: &'static str) -> Result<(), SecretsError> {
    for (index, c) in digits.chars().enumerate() {
        if !c.is_digit(16) {
            return Err(SecretsError::Hex(
                line,
                hex::FromHexError::InvalidHexCharacter { c: c, index: index },
            ));
        }
    }
    Ok(())
}
