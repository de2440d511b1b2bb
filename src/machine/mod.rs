//! The MTPZ handshake state machine.
//!
//! One `Machine` drives one exchange: it announces the client, sends
//! the application certificate message, validates and unwraps the
//! device's response, answers with a MAC'd confirmation and finally
//! derives the four session parameters that enable trusted file
//! operations. Every step is chained through the previous step's MAC
//! inputs, so the sequence is strictly ordered and a single failure
//! abandons the session.

#[cfg(test)]
mod test_handshake;

use std::{error, fmt, io};

use byteorder::{BigEndian, ByteOrder};
use rand;
use zeroize::Zeroize;

use crypto::aes::modes::{self, Direction};
use crypto::aes::AesError;
use crypto::hash::Sha1;
use crypto::rsa::{RsaError, RsaKeyPair};

use secrets::Secrets;
use transport::Transport;

/// Identity announced to the device before the handshake starts.
pub const DEFAULT_SESSION_INITIATOR_INFO: &'static str = "libmtp/Sajid Anwar - MTPZClassDriver";

// The certificate message embeds exactly this many certificate bytes.
const CERTIFICATES_LEN: usize = 0x275;

// 7-byte preamble, certificates, length-prefixed client random,
// 3 marker bytes, 128-byte signature.
const CERTIFICATE_MESSAGE_LEN: usize = 7 + CERTIFICATES_LEN + 2 + 16 + 3 + 128;

// Both RSA blocks on the wire are 1024-bit.
const RSA_BLOCK_LEN: usize = 128;

// The encrypted portion of the device response.
const RESPONSE_BODY_LEN: usize = 832;

#[derive(Debug)]
pub enum HandshakeError {
    /// Propagated verbatim from the transport; retrying is the
    /// caller's choice.
    Transport(io::Error),
    /// A fixed preamble byte did not match.
    Preamble { offset: usize, found: u8 },
    /// A length field pointed past the end of the buffer.
    Truncated { needed: usize, available: usize },
    /// The response body did not echo the client random.
    RandomMismatch,
    /// The secrets bundle carries a certificate blob of the wrong size.
    Certificates { found: usize },
    Rsa(RsaError),
    Mac(AesError),
}

impl error::Error for HandshakeError {
    fn cause(&self) -> Option<&dyn error::Error> {
        use self::HandshakeError::*;

        match self {
            &Transport(ref e) => Some(e),
            &Rsa(ref e) => Some(e),
            &Mac(ref e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::HandshakeError::*;

        match self {
            &Transport(ref e) => write!(f, "transport error: {}", e),
            &Preamble { offset, found } => {
                write!(f, "unexpected response byte {:#04x} at offset {}", found, offset)
            }
            &Truncated { needed, available } => {
                write!(f, "response truncated: needed {}, had {}", needed, available)
            }
            &RandomMismatch => write!(f, "device did not echo the client random"),
            &Certificates { found } => {
                write!(f, "certificate blob is {} bytes, expected {}", found, CERTIFICATES_LEN)
            }
            &Rsa(ref e) => write!(f, "rsa error: {}", e),
            &Mac(ref e) => write!(f, "cipher error: {}", e),
        }
    }
}

/// Where the exchange currently stands. Any failure parks the machine
/// in `Failed`; a fresh handshake starts over from `Start`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    Start,
    SentCertificate,
    GotResponse,
    SentConfirmation,
    Open,
    Failed,
}

// Device MAC material: the 16-byte hash and the 4-byte MAC counter it
// arrives with. Wiped on drop.
struct MacHash {
    hash: [u8; 16],
    counter: [u8; 4],
}

impl Drop for MacHash {
    fn drop(&mut self) {
        self.hash.zeroize();
        self.counter.zeroize();
    }
}

// The session-freshness nonce, wiped on drop.
struct ClientRandom([u8; 16]);

impl Drop for ClientRandom {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

pub struct Machine {
    secrets: Secrets,
    initiator_info: String,
    random_gen: fn() -> [u8; 16],
    state: State,
}

impl Machine {
    /// Creates a machine over a loaded secrets bundle. The last
    /// parameter is a set of variadic options applied in order, used
    /// to override the identity string or the random generator.
    pub fn new<F>(secrets: Secrets, options: &[F]) -> Self
    where
        F: Fn(&mut Machine),
    {
        let mut machine = Machine {
            secrets: secrets,
            initiator_info: DEFAULT_SESSION_INITIATOR_INFO.to_owned(),
            random_gen: || rand::random(),
            state: State::Start,
        };

        for option in options {
            option(&mut machine);
        }

        machine
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Overrides the identity string announced to the device.
    pub fn set_initiator_info(&mut self, info: &str) {
        self.initiator_info = info.to_owned();
    }

    /// Overrides the client-random source. The default draws from the
    /// process RNG; tests substitute a fixed generator.
    pub fn set_random_generator(&mut self, gen: fn() -> [u8; 16]) {
        self.random_gen = gen;
    }

    /// Runs the whole exchange over the given transport. On success
    /// the machine is `Open` and the device has accepted the session
    /// parameters; on any failure it is `Failed` and nothing
    /// session-level has changed on either side.
    pub fn handshake<T: Transport>(&mut self, transport: &mut T) -> Result<(), HandshakeError> {
        match self.run(transport) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.state = State::Failed;
                Err(error)
            }
        }
    }

    fn run<T: Transport>(&mut self, transport: &mut T) -> Result<(), HandshakeError> {
        self.state = State::Start;

        info!("(MTPZ) Setting session initiator info.");
        transport
            .set_session_initiator_info(&self.initiator_info)
            .map_err(HandshakeError::Transport)?;

        info!("(MTPZ) Resetting handshake.");
        transport.reset_handshake().map_err(HandshakeError::Transport)?;

        info!("(MTPZ) Sending application certificate message.");
        let random = ClientRandom((self.random_gen)());
        let message = self.certificate_message(&random.0)?;
        transport
            .send_application_request(&message)
            .map_err(HandshakeError::Transport)?;
        self.state = State::SentCertificate;

        info!("(MTPZ) Getting and validating handshake response.");
        let response = transport
            .get_application_response()
            .map_err(HandshakeError::Transport)?;
        let machash = self.validate_response(&response, &random.0)?;
        self.state = State::GotResponse;

        info!("(MTPZ) Sending confirmation message.");
        let confirmation = confirmation_message(&machash).map_err(HandshakeError::Mac)?;
        transport
            .send_application_request(&confirmation)
            .map_err(HandshakeError::Transport)?;
        self.state = State::SentConfirmation;

        info!("(MTPZ) Opening secure sync session.");
        let params = session_parameters(&machash).map_err(HandshakeError::Mac)?;
        transport
            .enable_trusted_files_operations(params)
            .map_err(HandshakeError::Transport)?;
        self.state = State::Open;

        Ok(())
    }

    // The 785-byte application certificate message: preamble,
    // certificates, length-prefixed client random, then an RSA
    // signature over everything past the first two bytes, encoded
    // EMSA-PSS-style with the SHA-1 MGF as the mask.
    fn certificate_message(&self, random: &[u8; 16]) -> Result<Vec<u8>, HandshakeError> {
        let certificates = self.secrets.certificates();
        if certificates.len() != CERTIFICATES_LEN {
            return Err(HandshakeError::Certificates {
                found: certificates.len(),
            });
        }

        let mut message = Vec::with_capacity(CERTIFICATE_MESSAGE_LEN);
        message.extend_from_slice(&[0x02, 0x01, 0x01, 0x00, 0x00, 0x02, 0x75]);
        message.extend_from_slice(certificates);
        message.extend_from_slice(&[0x00, 0x10]);
        message.extend_from_slice(random);

        let mut state = Sha1::new();
        let mut inner = [0u8; 28];
        state.absorb(&message[2..]);
        {
            let mut digest = [0u8; 20];
            state.finalize(&mut digest);
            inner[8..28].copy_from_slice(&digest);
        }

        let mut hash = [0u8; 20];
        state.absorb(&inner);
        state.finalize(&mut hash);

        let mask = state.mgf(&hash, 107);

        let mut encoded = [0u8; RSA_BLOCK_LEN];
        encoded[107..127].copy_from_slice(&hash);
        encoded[106] = 0x01;
        for i in 0..107 {
            encoded[i] ^= mask[i];
        }
        encoded[0] &= 0x7f;
        encoded[127] = 0xbc;

        // Private-key operation in its signing role; the padding was
        // applied above.
        let rsa = self.rsa_key()?;
        let mut signature = [0u8; RSA_BLOCK_LEN];
        rsa.private_op(&encoded, &mut signature)
            .map_err(HandshakeError::Rsa)?;

        message.extend_from_slice(&[0x01, 0x00, 0x80]);
        message.extend_from_slice(&signature);
        debug_assert_eq!(message.len(), CERTIFICATE_MESSAGE_LEN);

        Ok(message)
    }

    // Checks the response framing, unwraps the RSA block into the hash
    // key, decrypts the body with it and walks the body frame down to
    // the machash.
    fn validate_response(
        &self,
        response: &[u8],
        random: &[u8; 16],
    ) -> Result<MacHash, HandshakeError> {
        let mut reader = Reader::new(response);

        // 02 02 ?? 80; the third byte carries no meaning.
        reader.expect(0x02)?;
        reader.expect(0x02)?;
        reader.skip(1)?;
        reader.expect(0x80)?;
        let wrapped = reader.take(RSA_BLOCK_LEN)?;

        // Private-key operation in its decrypting role, then the
        // two-pass MGF unmasking that exposes the hash key.
        let rsa = self.rsa_key()?;
        let mut message = [0u8; RSA_BLOCK_LEN];
        rsa.private_op(wrapped, &mut message)
            .map_err(HandshakeError::Rsa)?;

        let mut state = Sha1::new();
        let mask = state.mgf(&message[21..], 20);
        for i in 0..20 {
            message[1 + i] ^= mask[i];
        }
        let mask = state.mgf(&message[1..21], 107);
        for i in 0..107 {
            message[21 + i] ^= mask[i];
        }

        let mut hash_key = [0u8; 16];
        hash_key.copy_from_slice(&message[112..128]);
        message.zeroize();

        // ?? ?? 03 40, then the 832-byte encrypted body.
        reader.skip(2)?;
        reader.expect(0x03)?;
        reader.expect(0x40)?;
        let mut body = [0u8; RESPONSE_BODY_LEN];
        body.copy_from_slice(reader.take(RESPONSE_BODY_LEN)?);

        modes::chained(&hash_key, &mut body, Direction::Decrypt).map_err(HandshakeError::Mac)?;
        hash_key.zeroize();

        let machash = self.parse_body(&body, random);
        body.zeroize();
        machash
    }

    // The decrypted body is a frame of length-prefixed fields; every
    // advance is checked against the remaining bytes. Only the echoed
    // random and the machash matter to the client.
    fn parse_body(&self, body: &[u8], random: &[u8; 16]) -> Result<MacHash, HandshakeError> {
        let mut reader = Reader::new(body);
        reader.skip(1)?;

        let certs_len = reader.read_u32()? as usize;
        reader.skip(certs_len)?;

        let rand_len = reader.read_u16()? as usize;
        let echoed = reader.take(rand_len)?;
        if echoed.len() < 16 {
            return Err(HandshakeError::Truncated {
                needed: 16,
                available: echoed.len(),
            });
        }
        if &echoed[..16] != &random[..] {
            return Err(HandshakeError::RandomMismatch);
        }

        let device_rand_len = reader.read_u16()? as usize;
        reader.skip(device_rand_len)?;

        reader.skip(1)?;
        let signature_len = reader.read_u16()? as usize;
        reader.skip(signature_len)?;

        reader.skip(1)?;
        let machash_len = reader.read_u16()? as usize;
        let machash_bytes = reader.take(machash_len)?;
        if machash_bytes.len() < 20 {
            return Err(HandshakeError::Truncated {
                needed: 20,
                available: machash_bytes.len(),
            });
        }

        let mut machash = MacHash {
            hash: [0; 16],
            counter: [0; 4],
        };
        machash.hash.copy_from_slice(&machash_bytes[..16]);
        machash.counter.copy_from_slice(&machash_bytes[16..20]);
        Ok(machash)
    }

    fn rsa_key(&self) -> Result<RsaKeyPair, HandshakeError> {
        RsaKeyPair::from_hex(
            self.secrets.modulus(),
            self.secrets.private_key(),
            self.secrets.public_exponent(),
        )
        .map_err(HandshakeError::Rsa)
    }
}

// 02 03 00 10, then the MAC of a near-zero seed under the machash.
fn confirmation_message(machash: &MacHash) -> Result<[u8; 20], AesError> {
    let mut message = [0u8; 20];
    message[..4].copy_from_slice(&[0x02, 0x03, 0x00, 0x10]);

    let mut seed = [0u8; 16];
    seed[15] = 0x01;
    let mut tag = [0u8; 16];
    modes::encrypt_mac(&machash.hash, &seed, &mut tag)?;
    message[4..].copy_from_slice(&tag);
    Ok(message)
}

// The MAC of the device's counter under the machash, read out as four
// big-endian words.
fn session_parameters(machash: &MacHash) -> Result<[u32; 4], AesError> {
    let mut tag = [0u8; 16];
    modes::encrypt_mac(&machash.hash, &machash.counter, &mut tag)?;

    let mut params = [0u32; 4];
    for i in 0..4 {
        params[i] = BigEndian::read_u32(&tag[4 * i..4 * i + 4]);
    }
    tag.zeroize();
    Ok(params)
}

// Length-checked cursor over a framed buffer.
struct Reader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader {
            buf: buf,
            position: 0,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], HandshakeError> {
        let available = self.buf.len() - self.position;
        if available < len {
            return Err(HandshakeError::Truncated {
                needed: len,
                available: available,
            });
        }
        let slice = &self.buf[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), HandshakeError> {
        self.take(len).map(|_| ())
    }

    fn expect(&mut self, value: u8) -> Result<(), HandshakeError> {
        let offset = self.position;
        let found = self.take(1)?[0];
        if found != value {
            return Err(HandshakeError::Preamble {
                offset: offset,
                found: found,
            });
        }
        Ok(())
    }

    fn read_u16(&mut self) -> Result<u16, HandshakeError> {
        self.take(2).map(BigEndian::read_u16)
    }

    fn read_u32(&mut self) -> Result<u32, HandshakeError> {
        self.take(4).map(BigEndian::read_u32)
    }
}
