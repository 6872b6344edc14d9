//! Triple-compression transparency tests.
//!
//! The compressed triple list exists purely as a performance representation:
//! replaying it must produce the same Allow/Deny verdict for every possible
//! demand as walking the original per-frame records directly. These tests
//! check that differentially over a large space of synthetic stacks built
//! from a seeded generator, plus a handful of hand-picked adversarial
//! shapes.

use std::sync::Arc;

use rayon::prelude::*;

use caswalk::capability::{
    Capability, CapabilityRc, FileIoCapability, SecurityCapability, SecurityFlags, UiCapability,
};
use caswalk::{CapabilitySet, FrameDescriptor, FrameSecurityState, SecurityContext};

/// Minimal deterministic generator so runs are reproducible without an RNG
/// dependency.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1))
    }

    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 16
    }

    fn chance(&mut self, percent: u64) -> bool {
        self.next() % 100 < percent
    }

    fn pick(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

fn capability_pool() -> Vec<CapabilityRc> {
    vec![
        Arc::new(SecurityCapability::execution()),
        Arc::new(SecurityCapability::with_flags(SecurityFlags::ASSERTION)),
        Arc::new(SecurityCapability::with_flags(
            SecurityFlags::EXECUTION | SecurityFlags::UNSAFE_CODE,
        )),
        Arc::new(SecurityCapability::unrestricted()),
        Arc::new(FileIoCapability::none().with_read("/a")),
        Arc::new(FileIoCapability::none().with_read("/b")),
        Arc::new(FileIoCapability::none().with_read("/a").with_read("/b")),
        Arc::new(FileIoCapability::none().with_write("/a")),
        Arc::new(UiCapability::safe_windows()),
        Arc::new(UiCapability::unrestricted()),
    ]
}

/// A random set drawn from the pool; occasionally unrestricted.
fn random_set(ctx: &SecurityContext, pool: &[CapabilityRc], rng: &mut Lcg) -> CapabilitySet {
    if rng.chance(10) {
        return ctx.unrestricted_set();
    }
    let mut set = ctx.empty_set();
    let picks = rng.pick(4);
    for _ in 0..picks {
        let cap = Arc::clone(&pool[rng.pick(pool.len())]);
        set.add_capability(cap).expect("pool capability resolves");
    }
    set
}

fn random_stack(
    ctx: &SecurityContext,
    pool: &[CapabilityRc],
    rng: &mut Lcg,
    depth: usize,
) -> Vec<FrameDescriptor> {
    (0..depth)
        .map(|_| {
            let mut frame = FrameDescriptor::new(random_set(ctx, pool, rng));
            if rng.chance(30) {
                let refused = random_set(ctx, pool, rng);
                if !refused.is_unrestricted() {
                    frame = frame.with_refused(&refused);
                }
            }
            if rng.chance(50) {
                let mut state = FrameSecurityState::new();
                if rng.chance(40) {
                    state.set_assert(&random_set(ctx, pool, rng));
                }
                if rng.chance(5) {
                    state.set_assert_all();
                }
                if rng.chance(25) {
                    state.set_deny(&random_set(ctx, pool, rng));
                }
                if rng.chance(20) {
                    state.set_permit_only(&random_set(ctx, pool, rng));
                }
                if rng.chance(30) {
                    state.declare_assert(&random_set(ctx, pool, rng));
                }
                if rng.chance(15) {
                    state.declare_deny(&random_set(ctx, pool, rng));
                }
                frame = frame.with_state(&state);
            }
            frame
        })
        .collect()
}

/// Replays every pool capability and a few demand sets against both the
/// direct walk and the compressed capture, panicking on any verdict mismatch.
fn assert_transparent(seed: u64) {
    let ctx = SecurityContext::new();
    let pool = capability_pool();
    let mut rng = Lcg::new(seed);

    let depth = 1 + rng.pick(8);
    let frames = random_stack(&ctx, &pool, &mut rng, depth);
    let captured = ctx.capture(frames.clone());

    for cap in &pool {
        let token = ctx
            .registry()
            .resolve(cap.as_ref())
            .expect("pool capability resolves");

        let direct = ctx.demand(cap.as_ref(), frames.clone()).is_ok();
        let replayed = captured.check_demand(cap.as_ref(), token).is_ok();
        assert_eq!(
            direct, replayed,
            "verdict mismatch for {} on seed {} (depth {}): direct {} vs replay {}",
            cap, seed, depth, direct, replayed
        );
    }

    let mut demand_rng = Lcg::new(seed ^ 0xDEAD_BEEF);
    for _ in 0..4 {
        let demanded = random_set(&ctx, &pool, &mut demand_rng);
        let direct = ctx.demand_set(&demanded, frames.clone()).is_ok();
        let replayed = captured.check_set_demand(&demanded).is_ok();
        assert_eq!(
            direct, replayed,
            "set-demand mismatch for {} on seed {} (depth {})",
            demanded, seed, depth
        );
    }
}

#[test]
fn test_compression_transparency_fuzz() {
    (0u64..500).into_par_iter().for_each(assert_transparent);
}

#[test]
fn test_compression_transparency_deep_stacks() {
    (1000u64..1040).into_par_iter().for_each(|seed| {
        let ctx = SecurityContext::new();
        let pool = capability_pool();
        let mut rng = Lcg::new(seed);

        let frames = random_stack(&ctx, &pool, &mut rng, 64);
        let captured = ctx.capture(frames.clone());

        for cap in &pool {
            let token = ctx.registry().resolve(cap.as_ref()).unwrap();
            let direct = ctx.demand(cap.as_ref(), frames.clone()).is_ok();
            let replayed = captured.check_demand(cap.as_ref(), token).is_ok();
            assert_eq!(direct, replayed, "mismatch for {cap} on seed {seed}");
        }
    });
}

#[test]
fn test_compression_is_actually_compressing() {
    let ctx = SecurityContext::new();
    let grant = ctx
        .set_of([Arc::new(SecurityCapability::execution()) as CapabilityRc])
        .unwrap();

    // 64 frames with identical grants and no conflicting assertions fold
    // into a single segment.
    let frames: Vec<_> = (0..64)
        .map(|_| FrameDescriptor::new(grant.clone()))
        .collect();
    let captured = ctx.capture(frames);
    assert_eq!(captured.len(), 1);
}

#[test]
fn test_shield_survives_compression() {
    let ctx = SecurityContext::new();
    let grant = ctx
        .set_of([Arc::new(SecurityCapability::execution()) as CapabilityRc])
        .unwrap();

    let mut state = FrameSecurityState::new();
    state.set_assert(&grant);

    let frames = vec![
        FrameDescriptor::new(grant.clone()).with_state(&state),
        FrameDescriptor::new(ctx.empty_set()),
    ];

    let captured = ctx.capture(frames.clone());
    let cap = SecurityCapability::execution();
    let token = ctx.registry().resolve(&cap).unwrap();

    assert!(ctx.demand(&cap, frames).is_ok());
    assert!(captured.check_demand(&cap, token).is_ok());
}

#[test]
fn test_inner_refusal_survives_compression() {
    let ctx = SecurityContext::new();
    let all = ctx.unrestricted_set();
    let refused = ctx
        .set_of([Arc::new(UiCapability::safe_windows()) as CapabilityRc])
        .unwrap();

    // The inner assembly refuses UI; an outer frame asserts it. The refusal
    // is inner, so it must win in both representations.
    let mut state = FrameSecurityState::new();
    let mut ui_assert = ctx.empty_set();
    ui_assert
        .add_capability(Arc::new(UiCapability::unrestricted()))
        .unwrap();
    state.set_assert(&ui_assert);

    let frames = vec![
        FrameDescriptor::new(all.clone()).with_refused(&refused),
        FrameDescriptor::new(all).with_state(&state),
    ];

    let captured = ctx.capture(frames.clone());
    let ui = UiCapability::safe_windows();
    let token = ctx.registry().resolve(&ui).unwrap();

    assert!(ctx.demand(&ui, frames).is_err());
    assert!(captured.check_demand(&ui, token).is_err());
}

#[test]
fn test_outer_deny_after_assert_all_survives_for_normal_demands() {
    use caswalk::capability::downcast_arg;
    use std::any::Any;
    use std::fmt;

    /// Normal-classified capability: not covered by unrestricted assertions.
    #[derive(Debug, Clone)]
    struct SealCapability;

    impl fmt::Display for SealCapability {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Seal")
        }
    }

    impl Capability for SealCapability {
        fn qualified_name(&self) -> &str {
            "tests::SealCapability"
        }
        fn supports_unrestricted(&self) -> bool {
            false
        }
        fn is_unrestricted(&self) -> bool {
            false
        }
        fn is_vacuous(&self) -> bool {
            false
        }
        fn is_subset_of(&self, other: &dyn Capability) -> caswalk::Result<bool> {
            downcast_arg::<Self>(self, other)?;
            Ok(true)
        }
        fn union(&self, other: &dyn Capability) -> caswalk::Result<CapabilityRc> {
            downcast_arg::<Self>(self, other)?;
            Ok(Arc::new(SealCapability))
        }
        fn intersect(&self, other: &dyn Capability) -> caswalk::Result<Option<CapabilityRc>> {
            downcast_arg::<Self>(self, other)?;
            Ok(Some(Arc::new(SealCapability)))
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    let ctx = SecurityContext::new();
    let mut grant = ctx.unrestricted_set();
    grant
        .add_capability(Arc::new(SealCapability))
        .unwrap();

    let mut inner = FrameSecurityState::new();
    inner.set_assert_all();

    let seal_set = ctx
        .set_of([Arc::new(SealCapability) as CapabilityRc])
        .unwrap();
    let mut outer = FrameSecurityState::new();
    outer.set_deny(&seal_set);

    let frames = vec![
        FrameDescriptor::new(grant.clone()).with_state(&inner),
        FrameDescriptor::new(grant).with_state(&outer),
    ];

    let captured = ctx.capture(frames.clone());
    let seal = SealCapability;
    let token = ctx.registry().resolve(&seal).unwrap();

    // The unrestricted assertion does not cover the Normal-classified seal,
    // so the outer deny must reject it in both representations.
    assert!(ctx.demand(&seal, frames.clone()).is_err());
    assert!(captured.check_demand(&seal, token).is_err());

    // While an unrestricted-capable demand still halts at the assertion.
    let exec = SecurityCapability::execution();
    let exec_token = ctx.registry().resolve(&exec).unwrap();
    assert!(ctx.demand(&exec, frames).is_ok());
    assert!(captured.check_demand(&exec, exec_token).is_ok());
}
