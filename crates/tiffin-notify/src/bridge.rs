//! Dispatch bridge: translates ledger insertions into user-facing side
//! effects (toast, badge count, audible cue). Owns no state of its own.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use tiffin_wire::OrderEventKind;

use crate::error::NotifyError;
use crate::ledger::NotificationRecord;

pub const NEW_ORDER_TOAST_DURATION: Duration = Duration::from_secs(5);
pub const STATUS_CHANGE_TOAST_DURATION: Duration = Duration::from_secs(4);
pub const GENERIC_TOAST_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Info,
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub kind: ToastKind,
    pub text: String,
    pub duration: Duration,
}

/// Presentation surface the bridge drives; the embedding UI implements this.
pub trait NotificationSink: Send + Sync {
    fn toast(&self, toast: Toast);
    fn badge(&self, unread: usize);
}

/// Local audible cue. Playback is best effort; the bridge swallows failures.
pub trait CuePlayer: Send + Sync {
    fn play_cue(&self) -> Result<(), NotifyError>;
}

/// Rings the terminal bell. The closest thing to a short tone a headless
/// client can synthesize locally.
pub struct TerminalBell;

impl CuePlayer for TerminalBell {
    fn play_cue(&self) -> Result<(), NotifyError> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// No-op cue for tests and embeddings with their own audio story.
pub struct SilentCue;

impl CuePlayer for SilentCue {
    fn play_cue(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub struct DispatchBridge {
    sink: Arc<dyn NotificationSink>,
    cue: Arc<dyn CuePlayer>,
}

impl DispatchBridge {
    pub fn new(sink: Arc<dyn NotificationSink>, cue: Arc<dyn CuePlayer>) -> Self {
        Self { sink, cue }
    }

    /// Fire the side effects for a freshly inserted record.
    pub fn on_insert(&self, record: &NotificationRecord, unread: usize) {
        self.sink.toast(toast_for(record));
        self.sink.badge(unread);
        if let Err(err) = self.cue.play_cue() {
            warn!(target: "tiffin::bridge", %err, "notification cue failed");
        }
    }
}

/// Toast content and weight by event kind: new orders get the loud
/// success treatment, status changes a neutral one, everything else a short
/// generic blip.
pub fn toast_for(record: &NotificationRecord) -> Toast {
    match record.kind {
        OrderEventKind::NewOrder => Toast {
            kind: ToastKind::Success,
            text: labelled(record),
            duration: NEW_ORDER_TOAST_DURATION,
        },
        OrderEventKind::StatusChange => Toast {
            kind: ToastKind::Info,
            text: labelled(record),
            duration: STATUS_CHANGE_TOAST_DURATION,
        },
        OrderEventKind::Other => Toast {
            kind: ToastKind::Generic,
            text: record.message.clone(),
            duration: GENERIC_TOAST_DURATION,
        },
    }
}

fn labelled(record: &NotificationRecord) -> String {
    match &record.order_number {
        Some(number) => format!("{} - Order #{}", record.message, number),
        None => record.message.clone(),
    }
}
