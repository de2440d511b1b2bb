use std::io;

/// The vendor-extension request primitives the handshake consumes.
///
/// These map onto MTP device-property and WMDRMPD extension requests;
/// the transport behind them (USB enumeration, PTP framing, retries)
/// is entirely the implementor's business. Every call blocks until the
/// device answers, and the first failure aborts the handshake.
pub trait Transport {
    /// Announces the client identity before the exchange starts.
    fn set_session_initiator_info(&mut self, info: &str) -> io::Result<()>;

    /// Clears any half-finished handshake state on the device.
    fn reset_handshake(&mut self) -> io::Result<()>;

    /// Ships a handshake payload (certificate or confirmation message).
    fn send_application_request(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Fetches the device's handshake response.
    fn get_application_response(&mut self) -> io::Result<Vec<u8>>;

    /// Enables trusted file operations with the four derived session
    /// parameters; the device checks them against its own derivation.
    fn enable_trusted_files_operations(&mut self, params: [u32; 4]) -> io::Result<()>;
}
