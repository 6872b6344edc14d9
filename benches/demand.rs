//! Benchmarks for demand evaluation.
//!
//! Measures the three hot paths:
//! - Direct frame-by-frame demand walks over deep stacks
//! - Capture plus replay through the compressed triple list
//! - The capability-set algebra the walks are built on

extern crate caswalk;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use caswalk::capability::{CapabilityRc, FileIoCapability, SecurityCapability, UiCapability};
use caswalk::{CapabilitySet, FrameDescriptor, FrameSecurityState, SecurityContext};

fn grant_set(ctx: &SecurityContext) -> CapabilitySet {
    ctx.set_of([
        Arc::new(SecurityCapability::execution()) as CapabilityRc,
        Arc::new(FileIoCapability::none().with_read("/data")) as CapabilityRc,
        Arc::new(UiCapability::safe_windows()) as CapabilityRc,
    ])
    .expect("grant set")
}

fn deep_stack(ctx: &SecurityContext, depth: usize) -> Vec<FrameDescriptor> {
    let grant = grant_set(ctx);
    (0..depth)
        .map(|_| FrameDescriptor::new(grant.clone()))
        .collect()
}

/// Benchmark a successful demand over 64 plain frames.
fn bench_direct_walk_64_frames(c: &mut Criterion) {
    let ctx = SecurityContext::new();
    let frames = deep_stack(&ctx, 64);
    let cap = SecurityCapability::execution();

    c.bench_function("walk_direct_64", |b| {
        b.iter(|| {
            ctx.demand(black_box(&cap), black_box(frames.clone()))
                .unwrap();
        });
    });
}

/// Benchmark a demand walk that halts at an inner assertion.
fn bench_direct_walk_with_assert(c: &mut Criterion) {
    let ctx = SecurityContext::new();
    let grant = grant_set(&ctx);
    let mut state = FrameSecurityState::new();
    state.set_assert(&grant);

    let mut frames = deep_stack(&ctx, 64);
    frames[4] = FrameDescriptor::new(grant).with_state(&state);
    let cap = SecurityCapability::execution();

    c.bench_function("walk_assert_halt", |b| {
        b.iter(|| {
            ctx.demand(black_box(&cap), black_box(frames.clone()))
                .unwrap();
        });
    });
}

/// Benchmark capturing 64 frames into triples.
fn bench_capture_64_frames(c: &mut Criterion) {
    let ctx = SecurityContext::new();
    let frames = deep_stack(&ctx, 64);

    c.bench_function("capture_64", |b| {
        b.iter(|| black_box(ctx.capture(black_box(frames.clone()))));
    });
}

/// Benchmark replaying a demand against an already-captured stack.
fn bench_replay_captured(c: &mut Criterion) {
    let ctx = SecurityContext::new();
    let captured = ctx.capture(deep_stack(&ctx, 64));
    let cap = SecurityCapability::execution();
    let token = ctx.registry().resolve(&cap).expect("resolve");

    c.bench_function("replay_captured", |b| {
        b.iter(|| {
            captured
                .check_demand(black_box(&cap), black_box(token))
                .unwrap();
        });
    });
}

/// Benchmark set union over sets with several entry kinds.
fn bench_set_union(c: &mut Criterion) {
    let ctx = SecurityContext::new();
    let a = grant_set(&ctx);
    let b = ctx
        .set_of([
            Arc::new(FileIoCapability::none().with_write("/data")) as CapabilityRc,
            Arc::new(UiCapability::unrestricted()) as CapabilityRc,
        ])
        .expect("set");

    c.bench_function("set_union", |bench| {
        bench.iter(|| black_box(a.union(black_box(&b)).unwrap()));
    });
}

/// Benchmark token resolution through the read cache.
fn bench_token_resolution(c: &mut Criterion) {
    let ctx = SecurityContext::new();
    let cap = SecurityCapability::execution();
    // Prime the cache
    ctx.registry().resolve(&cap).expect("resolve");

    c.bench_function("token_resolve_cached", |b| {
        b.iter(|| black_box(ctx.registry().resolve(black_box(&cap)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_direct_walk_64_frames,
    bench_direct_walk_with_assert,
    bench_capture_64_frames,
    bench_replay_captured,
    bench_set_union,
    bench_token_resolution
);
criterion_main!(benches);
