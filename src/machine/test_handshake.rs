use std::io::{self, Cursor};

use hex;

use secrets::Secrets;
use transport::Transport;

use super::{HandshakeError, Machine, State, DEFAULT_SESSION_INITIATOR_INFO};

// Fixture secrets: a throwaway 1024-bit RSA key and synthetic
// certificate bytes. Real MTPZ key material is never distributed.
const PUBLIC_EXPONENT: &'static str = "010001";
const ENCRYPTION_KEY: &'static str = "a6d05c12d3bc96da0019e1828d19027c";
const MODULUS: &'static str =
    "92943D3008CE60F85394351B3E1CC29374FF0A30C14F620487BBFE538B297BF8\
     98551C1EF53B13F58DFED38762884E76499133FD1F1BDFF607ED7B91C2C34257\
     4A2C42DEBA2ADDDA7E403977C521014C4F9FDF6C7A38BD01E54DEC61AC6A65EB\
     8A51BBFB2D570200A11CFF9C9D611FC3E028D44DC62BDE53F11FE560C1F99A27";
const PRIVATE_KEY: &'static str =
    "84CAF1A80BC254CD8482979E27A64C8CE4888DC5DFCBB8241C882EFFA6EA9D5A\
     793F59EB9E05B8AE54C71101ED3D49C016240B327D3576AFE13CC01F2C90530F\
     7A3A198FFBA79BDEBFDEFB72B8C028636D5E455173E9E28BF1C11B04519E8A6D\
     2C04DCB87A40F6A22B3A99AD3DA507C3C407E2E39763A293678F09AA1733A5F9";
const CERTIFICATES: &'static str =
    "d1eff68348b4c7b7ce03de15d60c8a0d9a1ee84b9bea055e1e36be3eba962b13\
     edf5af606fd11b97145725f247417663ea24610bec935f571174f9aef0accaef\
     08b618bd06444e226a73e5fc40fabb1424bb6d65e33f4ed1a6ca446b6b914c27\
     05b6232a3535d182ed05590d850e9d524545b89c74b5b6b42cfb4d106ea98cf9\
     2c5aa567243a296a041749fed0a1d0debfefc66ee938b79fab84d9d1f35f481e\
     9bb962a86b86324a55d33a6f16d7b4efc30d009755f9d571dc6afedc0fc37806\
     9293c9487fd2ac8a37b597458768a658ee9d658e347230372af2a761aeb30861\
     647db0a9edb5a693ef850475b5b63d00173f4c9538ad050a3a6f0d35e5aa1ff8\
     a979313cf38f6f05677a7e642c643a1977993d3d8b66bcf6c44e99d908a9b0ae\
     2622d64931e5d7100a0a2a86ea437f7dc08ca3f8b1b9c042c81b2bfe7b970c27\
     2b18d10b79b82dab8771f0abd1b7f98c2fdf152b1214dcb6fdacc807ae58c18d\
     e121fe564a1b468bdf50640438ee8ceda8ee6cfa57792fca19912dd15242a94f\
     db55a1d95793be4b66204116213c0acca3ca0e6c57f05a1dff42321b0800cac6\
     3eb8f700a7fad2f5832c24f0d1ec5b5c89eab88f8ba9aceaeda30fb95147686a\
     62e7e9957a88f81ba03f59fb75ed2e5330d63131a7e56c784e01f1900d0d4da7\
     f1f316476e21793412b3a30ebd75be4671ab2d3c632671b8d25663d2d1d7e0c5\
     3a206526dac5464246ea70da3111c1e74ff0c7c5332ea3056a0735efda5d2dd7\
     6e3036d82cd23e230b3e4565e7350961a8a461c442773c381671885a517383bf\
     5281253b8ab27ecf152c0745d5b1ce7f89e17e7bce082a2dc2dd6bb3d2fe3398\
     71418798ff347613e0aa5000d2ff36b8a614950e7e";

// Golden wire bytes for the fixture secrets and the fixed client
// random: the 785-byte application certificate message, a response a
// conforming device could produce (hash key wrapped to our public key,
// body encrypted under it, machash with counter 7), the 20-byte
// confirmation and the four session parameters.
const CERTIFICATE_MESSAGE: &'static str =
    "02010100000275d1eff68348b4c7b7ce03de15d60c8a0d9a1ee84b9bea055e1e\
     36be3eba962b13edf5af606fd11b97145725f247417663ea24610bec935f5711\
     74f9aef0accaef08b618bd06444e226a73e5fc40fabb1424bb6d65e33f4ed1a6\
     ca446b6b914c2705b6232a3535d182ed05590d850e9d524545b89c74b5b6b42c\
     fb4d106ea98cf92c5aa567243a296a041749fed0a1d0debfefc66ee938b79fab\
     84d9d1f35f481e9bb962a86b86324a55d33a6f16d7b4efc30d009755f9d571dc\
     6afedc0fc378069293c9487fd2ac8a37b597458768a658ee9d658e347230372a\
     f2a761aeb30861647db0a9edb5a693ef850475b5b63d00173f4c9538ad050a3a\
     6f0d35e5aa1ff8a979313cf38f6f05677a7e642c643a1977993d3d8b66bcf6c4\
     4e99d908a9b0ae2622d64931e5d7100a0a2a86ea437f7dc08ca3f8b1b9c042c8\
     1b2bfe7b970c272b18d10b79b82dab8771f0abd1b7f98c2fdf152b1214dcb6fd\
     acc807ae58c18de121fe564a1b468bdf50640438ee8ceda8ee6cfa57792fca19\
     912dd15242a94fdb55a1d95793be4b66204116213c0acca3ca0e6c57f05a1dff\
     42321b0800cac63eb8f700a7fad2f5832c24f0d1ec5b5c89eab88f8ba9aceaed\
     a30fb95147686a62e7e9957a88f81ba03f59fb75ed2e5330d63131a7e56c784e\
     01f1900d0d4da7f1f316476e21793412b3a30ebd75be4671ab2d3c632671b8d2\
     5663d2d1d7e0c53a206526dac5464246ea70da3111c1e74ff0c7c5332ea3056a\
     0735efda5d2dd76e3036d82cd23e230b3e4565e7350961a8a461c442773c3816\
     71885a517383bf5281253b8ab27ecf152c0745d5b1ce7f89e17e7bce082a2dc2\
     dd6bb3d2fe339871418798ff347613e0aa5000d2ff36b8a614950e7e00108d1f\
     0c9a4be2375e6c90d4a1f3b8027d0100808c5f65c29a4ab0bf17e7aa7a0c60a1\
     1235a7e62d3d968a0e69d8d7badd941d28655e2111d75c3aa720223afb00c14f\
     133fbcce6d80a65c33aa5067405af52ee31354e08c4c0f3f0eb76135ac59f12c\
     e846b06b6900f9a65dd8b0968f0d12c775e6ae540f97a6a65bc7332791ff6fbc\
     1ea7b04afd3a43abafe0378c0ea503bd6b";
const DEVICE_RESPONSE: &'static str =
    "0202008074c850e94ce222e30dfe596a93a3e945425a7c272bfc516f523a2e9c\
     da4f099a9bc76460148ddfa5be4fd82489b15c04a88d169306fa3f54b8683ccd\
     aa38a9d318113871797b31184c84e1cd4b6a0eb20dc1823c9eea2bc19c00689f\
     58a86dab117d742f33024fe87e45c4aaa6492ea12c569488897f2954bf050e58\
     a2af539c0000034007a9de2d6f55c8d651de0d587c212ac192bcda8b8d01e3ce\
     d93054d5cc359d5bd5f424285cf00810d5e2a5ef9929d8653e1db21b83e6b4ef\
     b63587c7cf86b2b4eef892a4ac0ad14a0a0f269a875983a03c9f398c8f4f5ecf\
     281644522ceed49386ea6ebe01039deb34d0658b094dcc138f9e1a4b2cab1d16\
     3a33882adfa44172ca62cbd5df8869b869c2b926ac0910333a0a71f90b9a3c7c\
     a90ed7d2f75bd73b2a601023be58b4b5a7f809388e96a122f6d14915715336b3\
     ec6d1c40682e9bb514d6398c424e09b145be0cdee56c144ac5285f8d8f149923\
     06e2e8c2371b21a5d922acc448c804e18cc439171655d409b460c75ebfd0f740\
     830608eee1fbb78dcf4b7a7b058047d3f5ef11a794a2aecf4016825790d82729\
     2dd6b0e48903203890f0c591a86c9e4278ef4e76c78597fcd48789436e91b8be\
     e52e6390b7da57d1073f9d4e75e127bd7b4b91ca6b18759d5456a5f761199dc1\
     3093e494a4c8dea4e35b17d6d0e345586d60d9c940845c5b9b68841e7cc33a10\
     cf00e45720acdc714c7bd1100edb401052bb47d94d34074f1242f0dca6db0839\
     c1f986eb0aa3e75ffa18b4ed37902007bddc8b7609976c4870f4f241aa75a1a4\
     d3bc6db5acb2c0c8d6d8ceda61cc24b8408e6e0ef9ceeffa0e10fc31e1aed653\
     1dfb4b62751743df73738554b18b8beef6dfeed2c37a9fabef835f743caebcdd\
     f9ec24c6901a92ce5481c1d25b9c85de183961eea37c28821580abf5fea94504\
     491ed1847f3568371cec7f263bf1b7fc6ee19199f50d74d516ef72a398a3583b\
     0a2cbb06b8f0a1224d83bcc42d9a1dfd7fea4e6ddaa5481a7871ebe997db1461\
     fb94148774b045fea0f34c70c279716229a546745548234c1bfb066282ca16ab\
     2c97b48dc438f2b7041515c701e738668b2118c3504e566f3d2c0baa4f7a4d24\
     661bdce95dd6e10d5ec7f14d57011e664c59b5d7b4ad1f5d345800ec6d06a39f\
     376bc71323932f3df591d1c39b9a29e7c8d629a3d835e665c11669faa109b6d9\
     600f1305c13fecac0b35ee9399b80a141b8c20c6a1c9375f5f2ad0b48349998a\
     92e764b97eb72da58a4ab32235ad9654ae7639f4962a05b31eb74250001286c3\
     4e053381d9cda45a789f60d3ac5db0b9b9d74b8be2a0b8f8d4bc76a36c2af744\
     1bda9abe1bc83870";
const RESPONSE_WITH_WRONG_RANDOM: &'static str =
    "0202008074c850e94ce222e30dfe596a93a3e945425a7c272bfc516f523a2e9c\
     da4f099a9bc76460148ddfa5be4fd82489b15c04a88d169306fa3f54b8683ccd\
     aa38a9d318113871797b31184c84e1cd4b6a0eb20dc1823c9eea2bc19c00689f\
     58a86dab117d742f33024fe87e45c4aaa6492ea12c569488897f2954bf050e58\
     a2af539c0000034007a9de2d6f55c8d651de0d587c212ac192bcda8b8d01e3ce\
     d93054d5cc359d5bd5f424285cf00810d5e2a5ef9929d8653e1db21b83e6b4ef\
     b63587c7cf86b2b4eef892a4ac0ad14a0a0f269a875983a03c9f398c8f4f5ecf\
     281644522ceed49386ea6ebe01039deb34d0658b094dcc138f9e1a4b2cab1d16\
     3a33882adfa44172ca62cbd5df8869b869c2b926ac0910333a0a71f90b9a3c7c\
     a90ed7d2f75bd73b2a601023be58b4b5a7f809388e96a122f6d14915715336b3\
     ec6d1c40682e9bb514d6398c424e09b145be0cdee56c144ac5285f8d8f149923\
     06e2e8c2371b21a5d922acc448c804e18cc439171655d409b460c75ebfd0f740\
     830608eee1fbb78dcf4b7a7b058047d3f5ef11a794a2aecf4016825790d82729\
     2dd6b0e48903203890f0c591a86c9e4278ef4e76c78597fcd48789436e91b8be\
     e52e6390b7da57d1073f9d4e75e127bd7b4b91ca6b18759d5456a5f761199dc1\
     3093e494a4c8dea4e35b17d6d0e345586d60d9c940845c5b9b68841e7cc33a10\
     cf00e45720acdc714c7bd1100edb401052bb47d94d34074f1242f0dca6db0839\
     c1f986eb0aa3e75ffa18b4ed37902007bddc8b7609976c4870f4f241aa75a1a4\
     d3bc6db5acb2c0c8d6d8ceda61cc24b8408e6e0ef9ceeffa0e10fc31e1aed653\
     1dfb4b62751743df73738554b18b8beef6dfeed2c37a9fabef835f743caebcdd\
     f9ec24c6901a92ce5481c1d25b9c85de183961eea37c28821580abf5fea94504\
     491ed1847f3568371cec7f263bf1b7fc6ee19199f50d74d516ef72a398a3583b\
     0a2cbb06b8f0a1224d83bcc42d9a1dfd7fea4e6ddaa5481a7871ebe997db1461\
     fb94148774b045fea0f34c70c279716229a546745548234c912eb09fa86fae7e\
     afd0fc648c44a4eb7f9f5128ce3ed8049ab0974514e174d3aff1b3697deb4196\
     9d8825ffdcf5f0bff4c2e24d482627b307663742e6648a006c04d1a845339872\
     70e84126364a612bf0c5c35ca4dce6ac2d8dc0908aaac46606f5dae0c2a92ec9\
     49cb6f7f5e62800be68c7865c76f1718f721efbfd476616d14d972a41c77e99e\
     2681768b67f7a2f87df31cd2f604f566707b6d879e9c2c6797aeebfae48767b1\
     cd4054feec448f84ad52531c1162423d90cd7fd96a99db3d35253b583fb1d9be\
     2a7b36d561bc35f3";
const CONFIRMATION_MESSAGE: &'static str = "02030010c67d7733456b86d7ce830429e006f193";
const SESSION_PARAMS: [u32; 4] = [0xb3402e99, 0x8d8ea898, 0x3219dc70, 0x96e6c358];

fn fixture_secrets() -> Secrets {
    let file = format!(
        "{}\n{}\n{}\n{}\n{}\n",
        PUBLIC_EXPONENT, ENCRYPTION_KEY, MODULUS, PRIVATE_KEY, CERTIFICATES,
    );
    Secrets::parse(Cursor::new(file)).unwrap()
}

fn fixed_random() -> [u8; 16] {
    hex!("8d1f0c9a4be2375e6c90d4a1f3b8027d")
}

fn fixture_machine() -> Machine {
    Machine::new(
        fixture_secrets(),
        &[|machine: &mut Machine| machine.set_random_generator(fixed_random)],
    )
}

// Plays one canned response and records everything the machine does.
struct ScriptedTransport {
    response: Option<Vec<u8>>,
    fail_sends: bool,
    initiator_info: Option<String>,
    resets: usize,
    requests: Vec<Vec<u8>>,
    enabled_with: Vec<[u32; 4]>,
}

impl ScriptedTransport {
    fn new(response: Option<Vec<u8>>) -> Self {
        ScriptedTransport {
            response: response,
            fail_sends: false,
            initiator_info: None,
            resets: 0,
            requests: Vec::new(),
            enabled_with: Vec::new(),
        }
    }

    fn replaying() -> Self {
        ScriptedTransport::new(Some(hex::decode(DEVICE_RESPONSE).unwrap()))
    }
}

impl Transport for ScriptedTransport {
    fn set_session_initiator_info(&mut self, info: &str) -> io::Result<()> {
        self.initiator_info = Some(info.to_owned());
        Ok(())
    }

    fn reset_handshake(&mut self) -> io::Result<()> {
        self.resets += 1;
        Ok(())
    }

    fn send_application_request(&mut self, payload: &[u8]) -> io::Result<()> {
        if self.fail_sends {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device detached"));
        }
        self.requests.push(payload.to_vec());
        Ok(())
    }

    fn get_application_response(&mut self) -> io::Result<Vec<u8>> {
        self.response
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no response scripted"))
    }

    fn enable_trusted_files_operations(&mut self, params: [u32; 4]) -> io::Result<()> {
        self.enabled_with.push(params);
        Ok(())
    }
}

#[test]
fn golden_certificate_message() {
    let machine = fixture_machine();
    let message = machine.certificate_message(&fixed_random()).unwrap();
    assert_eq!(message.len(), 785);
    assert_eq!(hex::encode(&message), CERTIFICATE_MESSAGE);
}

#[test]
fn happy_path_opens_the_session() {
    let mut machine = fixture_machine();
    let mut transport = ScriptedTransport::replaying();

    machine.handshake(&mut transport).unwrap();

    assert_eq!(machine.state(), State::Open);
    assert_eq!(
        transport.initiator_info.as_ref().map(|s| s.as_str()),
        Some(DEFAULT_SESSION_INITIATOR_INFO),
    );
    assert_eq!(transport.resets, 1);
    assert_eq!(transport.requests.len(), 2);
    assert_eq!(hex::encode(&transport.requests[0]), CERTIFICATE_MESSAGE);
    assert_eq!(hex::encode(&transport.requests[1]), CONFIRMATION_MESSAGE);
    assert_eq!(transport.enabled_with, vec![SESSION_PARAMS]);
}

#[test]
fn identity_can_be_customised() {
    let mut machine = Machine::new(
        fixture_secrets(),
        &[|machine: &mut Machine| {
            machine.set_random_generator(fixed_random);
            machine.set_initiator_info("acme-sync/0.3");
        }],
    );
    let mut transport = ScriptedTransport::replaying();

    machine.handshake(&mut transport).unwrap();
    assert_eq!(
        transport.initiator_info.as_ref().map(|s| s.as_str()),
        Some("acme-sync/0.3"),
    );
}

#[test]
fn bad_preamble_is_a_framing_error() {
    let mut response = hex::decode(DEVICE_RESPONSE).unwrap();
    response[3] = 0x7f;

    let mut machine = fixture_machine();
    let mut transport = ScriptedTransport::new(Some(response));

    match machine.handshake(&mut transport) {
        Err(HandshakeError::Preamble { offset: 3, found: 0x7f }) => (),
        other => panic!("expected preamble error, got {:?}", other),
    }
    assert_eq!(machine.state(), State::Failed);
    // No confirmation goes out after a framing failure.
    assert_eq!(transport.requests.len(), 1);
    assert!(transport.enabled_with.is_empty());
}

#[test]
fn wrong_client_random_fails_validation() {
    let mut machine = fixture_machine();
    let mut transport =
        ScriptedTransport::new(Some(hex::decode(RESPONSE_WITH_WRONG_RANDOM).unwrap()));

    match machine.handshake(&mut transport) {
        Err(HandshakeError::RandomMismatch) => (),
        other => panic!("expected random mismatch, got {:?}", other),
    }
    assert_eq!(machine.state(), State::Failed);
    assert_eq!(transport.requests.len(), 1);
    assert!(transport.enabled_with.is_empty());
}

#[test]
fn short_response_is_a_framing_error() {
    let mut response = hex::decode(DEVICE_RESPONSE).unwrap();
    response.truncate(800);

    let mut machine = fixture_machine();
    let mut transport = ScriptedTransport::new(Some(response));

    match machine.handshake(&mut transport) {
        Err(HandshakeError::Truncated { needed: 832, .. }) => (),
        other => panic!("expected truncation error, got {:?}", other),
    }
    assert_eq!(machine.state(), State::Failed);
    assert_eq!(transport.requests.len(), 1);
    assert!(transport.enabled_with.is_empty());
}

#[test]
fn transport_failures_propagate() {
    let mut machine = fixture_machine();
    let mut transport = ScriptedTransport::replaying();
    transport.fail_sends = true;

    match machine.handshake(&mut transport) {
        Err(HandshakeError::Transport(ref e)) if e.kind() == io::ErrorKind::BrokenPipe => (),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert_eq!(machine.state(), State::Failed);
    assert!(transport.enabled_with.is_empty());
}

#[test]
fn undersized_certificate_blob_is_refused() {
    let file = format!(
        "{}\n{}\n{}\n{}\n{}\n",
        PUBLIC_EXPONENT,
        ENCRYPTION_KEY,
        MODULUS,
        PRIVATE_KEY,
        &CERTIFICATES[..CERTIFICATES.len() - 2],
    );
    let secrets = Secrets::parse(Cursor::new(file)).unwrap();
    let mut machine = Machine::new(
        secrets,
        &[|machine: &mut Machine| machine.set_random_generator(fixed_random)],
    );
    let mut transport = ScriptedTransport::replaying();

    match machine.handshake(&mut transport) {
        Err(HandshakeError::Certificates { found: 628 }) => (),
        other => panic!("expected certificate-size error, got {:?}", other),
    }
    // The failure happens before anything is sent.
    assert!(transport.requests.is_empty());
}
