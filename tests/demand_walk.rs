//! Demand walk integration tests.
//!
//! Full walks over synthetic stacks built from the public API: assembly
//! grants and refusals per frame, frame modifier records on top, and both the
//! single-capability and set-demand entry points.

use std::sync::Arc;

use caswalk::capability::{
    CapabilityRc, FileIoCapability, SecurityCapability, SecurityFlags, UiCapability,
};
use caswalk::{Error, FrameDescriptor, FrameSecurityState, Result, SecurityContext};

fn exec() -> SecurityCapability {
    SecurityCapability::execution()
}

fn exec_rc() -> CapabilityRc {
    Arc::new(exec())
}

#[test]
fn test_demand_succeeds_when_every_frame_is_granted() -> Result<()> {
    let ctx = SecurityContext::new();
    let grant = ctx.set_of([exec_rc()])?;

    let frames = vec![
        FrameDescriptor::new(grant.clone()),
        FrameDescriptor::new(grant.clone()),
        FrameDescriptor::new(grant),
    ];

    ctx.demand(&exec(), frames)
}

#[test]
fn test_demand_fails_on_first_lacking_frame() -> Result<()> {
    let ctx = SecurityContext::new();
    let grant = ctx.set_of([exec_rc()])?;
    let empty = ctx.empty_set();

    let frames = vec![
        FrameDescriptor::new(grant.clone()),
        FrameDescriptor::new(empty),
        FrameDescriptor::new(grant),
    ];

    match ctx.demand(&exec(), frames) {
        Err(Error::DemandDenied { demanded, .. }) => {
            assert!(demanded.contains("Security"));
            Ok(())
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[test]
fn test_assertion_shields_callers_from_outer_frames() -> Result<()> {
    let ctx = SecurityContext::new();
    let grant = ctx.set_of([exec_rc()])?;
    let untrusted = ctx.empty_set();

    let mut state = FrameSecurityState::new();
    state.set_assert(&grant);

    // Inner frame asserts; the outer frame's grant does not contain the
    // capability, yet the demand issued inside the inner frame succeeds.
    let shielded = vec![
        FrameDescriptor::new(grant.clone()).with_state(&state),
        FrameDescriptor::new(untrusted.clone()),
    ];
    ctx.demand(&exec(), shielded)?;

    // Issued outside any asserting frame, the same demand fails.
    let exposed = vec![
        FrameDescriptor::new(grant).with_state(&FrameSecurityState::new()),
        FrameDescriptor::new(untrusted),
    ];
    assert!(ctx.demand(&exec(), exposed).is_err());

    Ok(())
}

#[test]
fn test_deny_rejects_even_when_granted() -> Result<()> {
    let ctx = SecurityContext::new();
    let grant = ctx.set_of([exec_rc()])?;

    let mut state = FrameSecurityState::new();
    state.set_deny(&grant);

    let frames = vec![
        FrameDescriptor::new(grant.clone()),
        FrameDescriptor::new(grant.clone()).with_state(&state),
        FrameDescriptor::new(grant),
    ];

    assert!(ctx.demand(&exec(), frames).is_err());
    Ok(())
}

#[test]
fn test_permit_only_restricts_to_subset() -> Result<()> {
    let ctx = SecurityContext::new();
    let mut grant = ctx.set_of([exec_rc()])?;
    grant.add_capability(Arc::new(UiCapability::unrestricted()))?;

    let permit = ctx.set_of([exec_rc()])?;
    let mut state = FrameSecurityState::new();
    state.set_permit_only(&permit);

    let frames = || {
        vec![
            FrameDescriptor::new(grant.clone()).with_state(&state),
            FrameDescriptor::new(grant.clone()),
        ]
    };

    // Within the permitted subset: allowed
    ctx.demand(&exec(), frames())?;
    // Outside it: rejected despite the generous grant
    assert!(ctx.demand(&UiCapability::safe_windows(), frames()).is_err());

    Ok(())
}

#[test]
fn test_assembly_refusal_rejects_demand() -> Result<()> {
    let ctx = SecurityContext::new();
    let mut grant = ctx.set_of([exec_rc()])?;
    grant.add_capability(Arc::new(UiCapability::unrestricted()))?;
    let refused = ctx.set_of([Arc::new(UiCapability::safe_windows()) as CapabilityRc])?;

    let frames = vec![FrameDescriptor::new(grant).with_refused(&refused)];

    assert!(ctx.demand(&UiCapability::safe_windows(), frames).is_err());
    Ok(())
}

#[test]
fn test_revert_makes_frame_transparent_again() -> Result<()> {
    let ctx = SecurityContext::new();
    let grant = ctx.set_of([exec_rc()])?;

    let mut state = FrameSecurityState::new();
    state.set_deny(&grant);
    state.revert_deny();

    let frames = vec![
        FrameDescriptor::new(grant.clone()).with_state(&state),
        FrameDescriptor::new(grant),
    ];

    ctx.demand(&exec(), frames)
}

#[test]
fn test_set_demand_threads_shrunk_set_outward() -> Result<()> {
    let ctx = SecurityContext::new();

    // The inner frame asserts file access only; the outer frame holds only
    // execution. The set demand must shrink after the assertion so the file
    // part is never re-checked outward.
    let file_read = FileIoCapability::none().with_read("/data");
    let mut inner_grant = ctx.set_of([exec_rc()])?;
    inner_grant.add_capability(Arc::new(file_read.clone()))?;
    let asserted = ctx.set_of([Arc::new(file_read.clone()) as CapabilityRc])?;
    let outer_grant = ctx.set_of([exec_rc()])?;

    let mut state = FrameSecurityState::new();
    state.set_assert(&asserted);

    let mut demanded = ctx.set_of([exec_rc()])?;
    demanded.add_capability(Arc::new(file_read))?;

    let frames = vec![
        FrameDescriptor::new(inner_grant).with_state(&state),
        FrameDescriptor::new(outer_grant),
    ];

    ctx.demand_set(&demanded, frames)
}

#[test]
fn test_set_demand_reports_first_faulting_capability() -> Result<()> {
    let ctx = SecurityContext::new();
    let grant = ctx.set_of([exec_rc()])?;

    let mut demanded = ctx.set_of([exec_rc()])?;
    demanded.add_capability(Arc::new(UiCapability::safe_windows()))?;

    let frames = vec![FrameDescriptor::new(grant)];

    match ctx.demand_set(&demanded, frames) {
        Err(Error::DemandDenied { demanded, .. }) => {
            assert!(demanded.contains("Ui"));
            Ok(())
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[test]
fn test_empty_set_demand_is_trivially_satisfied() -> Result<()> {
    let ctx = SecurityContext::new();
    let demanded = ctx.empty_set();

    // Even against a stack that grants nothing
    let frames = vec![FrameDescriptor::new(ctx.empty_set())];
    ctx.demand_set(&demanded, frames)
}

#[test]
fn test_assert_all_shields_everything_unrestricted_capable() -> Result<()> {
    let ctx = SecurityContext::new();
    let mut state = FrameSecurityState::new();
    state.set_assert_all();

    let frames = vec![
        FrameDescriptor::new(ctx.empty_set()).with_state(&state),
        FrameDescriptor::new(ctx.empty_set()),
    ];

    let heavy = SecurityCapability::with_flags(
        SecurityFlags::EXECUTION | SecurityFlags::UNSAFE_CODE | SecurityFlags::INFRASTRUCTURE,
    );
    ctx.demand(&heavy, frames)
}

#[test]
fn test_unrestricted_grants_satisfy_unrestricted_demands() -> Result<()> {
    let ctx = SecurityContext::new();
    let all = ctx.unrestricted_set();

    let frames = vec![
        FrameDescriptor::new(all.clone()),
        FrameDescriptor::new(all.clone()),
    ];
    ctx.demand_set(&all, frames)?;

    // One restricted frame breaks it
    let frames = vec![
        FrameDescriptor::new(all.clone()),
        FrameDescriptor::new(ctx.set_of([exec_rc()])?),
    ];
    assert!(ctx.demand_set(&all, frames).is_err());

    Ok(())
}
