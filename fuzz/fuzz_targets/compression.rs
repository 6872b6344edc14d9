#![no_main]

//! Differential fuzzing of triple compression: for an arbitrary stack script,
//! replaying the compressed capture must give the same verdict as the direct
//! walk for every probe capability.

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use caswalk::capability::{
    CapabilityRc, FileIoCapability, SecurityCapability, SecurityFlags, UiCapability,
};
use caswalk::{CapabilitySet, FrameDescriptor, FrameSecurityState, SecurityContext};

fn pool() -> Vec<CapabilityRc> {
    vec![
        Arc::new(SecurityCapability::execution()),
        Arc::new(SecurityCapability::with_flags(SecurityFlags::ASSERTION)),
        Arc::new(SecurityCapability::unrestricted()),
        Arc::new(FileIoCapability::none().with_read("/a")),
        Arc::new(FileIoCapability::none().with_read("/b")),
        Arc::new(FileIoCapability::none().with_read("/a").with_read("/b")),
        Arc::new(UiCapability::safe_windows()),
        Arc::new(UiCapability::unrestricted()),
    ]
}

fn set_from(ctx: &SecurityContext, pool: &[CapabilityRc], byte: u8) -> CapabilitySet {
    if byte == 0xFF {
        return ctx.unrestricted_set();
    }
    let mut set = ctx.empty_set();
    for (i, cap) in pool.iter().enumerate() {
        if byte & (1 << (i % 8)) != 0 {
            let _ = set.add_capability(Arc::clone(cap));
        }
    }
    set
}

fuzz_target!(|data: &[u8]| {
    let ctx = SecurityContext::new();
    let pool = pool();

    // Each frame consumes 5 bytes: grant, refused, assert, deny, permit.
    let mut frames = Vec::new();
    for chunk in data.chunks_exact(5).take(32) {
        let mut frame = FrameDescriptor::new(set_from(&ctx, &pool, chunk[0]));
        if chunk[1] != 0 {
            frame = frame.with_refused(&set_from(&ctx, &pool, chunk[1]));
        }
        let mut state = FrameSecurityState::new();
        if chunk[2] == 0xFE {
            state.set_assert_all();
        } else if chunk[2] != 0 {
            state.set_assert(&set_from(&ctx, &pool, chunk[2]));
        }
        if chunk[3] != 0 {
            state.set_deny(&set_from(&ctx, &pool, chunk[3]));
        }
        if chunk[4] != 0 {
            state.set_permit_only(&set_from(&ctx, &pool, chunk[4]));
        }
        if state.is_active() {
            frame = frame.with_state(&state);
        }
        frames.push(frame);
    }

    let captured = ctx.capture(frames.clone());
    for cap in &pool {
        let token = ctx.registry().resolve(cap.as_ref()).unwrap();
        let direct = ctx.demand(cap.as_ref(), frames.clone()).is_ok();
        let replayed = captured.check_demand(cap.as_ref(), token).is_ok();
        assert_eq!(direct, replayed, "verdict mismatch for {cap}");
    }
});
