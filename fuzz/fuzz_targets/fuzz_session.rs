#![no_main]

use libfuzzer_sys::fuzz_target;
use rt5_protocol::config::ServerSettings;
use rt5_protocol::context::ServerContext;
use rt5_protocol::engine::NoopHooks;
use rt5_protocol::protocol::Session;
use rt5_protocol::store::{JsonMapKeys, MemoryAssetStore};
use rt5_protocol::transport::outbox;
use rt5_protocol::utils::rsa::test_keys;
use std::sync::{Arc, OnceLock};

fn context() -> Option<Arc<ServerContext>> {
    static CTX: OnceLock<Option<Arc<ServerContext>>> = OnceLock::new();
    CTX.get_or_init(|| {
        let settings = ServerSettings::default_with_overrides(|s| {
            s.world.max_players = 2;
            s.world.slot_size = 5000;
        });
        let assets = MemoryAssetStore::new().with_group(255, 255, vec![1, 2, 3]);
        let ctx = ServerContext::new(
            settings,
            Arc::new(assets),
            Arc::new(JsonMapKeys::default()),
            Arc::new(NoopHooks),
        )
        .ok()?;
        Some(Arc::new(ctx.with_rsa_key(test_keys::keypair().ok()?)))
    })
    .clone()
}

fuzz_target!(|data: &[u8]| {
    let Some(ctx) = context() else {
        return;
    };

    // Feed the input as up to three separate reads on one connection.
    let (outbox, mut rx) = outbox::channel(ctx.settings.server.outbox_capacity);
    let mut session = Session::new(ctx, outbox, ([127, 0, 0, 1], 43594).into());
    for chunk in data.chunks(data.len().div_ceil(3).max(1)) {
        let mut chunk = chunk.to_vec();
        let _ = session.handle(&mut chunk);
        while rx.try_recv().is_some() {}
        if session.is_closed() {
            break;
        }
    }
});
