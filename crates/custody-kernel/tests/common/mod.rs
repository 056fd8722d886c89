#![allow(dead_code)]

use std::time::Duration;

use custody_kernel::{
    ConfirmationEvent, ConfirmationMachine, EnforcementAdapter, ExecutionTicket, Gesture,
    KernelConfig, MockPlatform, SessionId, WindowIdentity,
};

pub struct Harness {
    pub mocks: MockPlatform,
    pub adapter: EnforcementAdapter,
    pub id: SessionId,
}

pub fn adapter(config: KernelConfig, mocks: MockPlatform) -> Harness {
    let adapter = EnforcementAdapter::new(config, mocks.platform()).unwrap();
    Harness {
        mocks,
        adapter,
        id: SessionId::from("ses-1"),
    }
}

/// An adapter with a session bound, confirmed and executing.
pub fn executing() -> Harness {
    executing_with(KernelConfig::default(), MockPlatform::new())
}

pub fn executing_with(config: KernelConfig, mocks: MockPlatform) -> Harness {
    let h = adapter(config, mocks);
    h.adapter.open_session(h.id.clone()).unwrap();
    h.adapter.confirm_session(&h.id).unwrap();
    h
}

pub fn editor_window() -> WindowIdentity {
    WindowIdentity {
        pid: 4242,
        window_number: 17,
        created_at_ms: 1_700_000_000_000,
        owner_path: "/Applications/Editor.app".into(),
    }
}

/// Walk a confirmation machine through hold, arm and a separate confirm gesture.
pub fn confirm(
    machine: &mut ConfirmationMachine,
    advance: impl Fn(Duration),
) -> ExecutionTicket {
    let ctx = machine.context().clone();
    machine.transition(ConfirmationEvent::Show, &ctx).unwrap();
    machine
        .transition(
            ConfirmationEvent::HoldStart {
                gesture: Gesture::PointerHold,
            },
            &ctx,
        )
        .unwrap();
    advance(Duration::from_millis(450));
    machine
        .transition(
            ConfirmationEvent::HoldRelease {
                gesture: Gesture::PointerHold,
            },
            &ctx,
        )
        .unwrap();
    machine
        .transition(ConfirmationEvent::PresentConfirm, &ctx)
        .unwrap();
    machine
        .transition(
            ConfirmationEvent::Confirm {
                gesture: Gesture::KeyPress,
            },
            &ctx,
        )
        .unwrap()
        .ticket
        .expect("confirm issues a ticket")
}
