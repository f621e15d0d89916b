#![no_main]

use libfuzzer_sys::fuzz_target;
use rt5_protocol::core::packet::Packet;
use rt5_protocol::protocol::login::{AccountCreation, LoginRequest};
use rt5_protocol::utils::rsa::{test_keys, RsaKeyPair};
use std::sync::OnceLock;

fn key() -> Option<&'static RsaKeyPair> {
    static KEY: OnceLock<Option<RsaKeyPair>> = OnceLock::new();
    KEY.get_or_init(|| test_keys::keypair().ok()).as_ref()
}

fuzz_target!(|data: &[u8]| {
    let Some(key) = key() else {
        return;
    };

    if let Ok(request) = LoginRequest::decode(&mut Packet::from_bytes(data), key) {
        // Anything that decodes must survive re-encoding.
        let _ = request.display_name();
        let _ = request.encode(key);
    }
    let _ = AccountCreation::decode(&mut Packet::from_bytes(data), key);
});
