use std::fmt;

use chrono::{DateTime, Local};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessSource {
    Authorised,
    MessageReceived,
    MessageSent,
    KeepAliveReply,
}

impl fmt::Display for LivenessSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LivenessSource::Authorised => "authorisation done",
            LivenessSource::MessageReceived => "read connection is alive, new message in chat",
            LivenessSource::MessageSent => "message sent",
            LivenessSource::KeepAliveReply => "write connection answered keep-alive",
        };
        f.write_str(text)
    }
}

/// Proof that the connection pair produced traffic at `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessEvent {
    pub source: LivenessSource,
    pub at: DateTime<Local>,
}

impl LivenessEvent {
    pub fn now(source: LivenessSource) -> Self {
        Self {
            source,
            at: Local::now(),
        }
    }
}

pub type LivenessSender = UnboundedSender<LivenessEvent>;
pub type LivenessReceiver = UnboundedReceiver<LivenessEvent>;

/// Emits an event. The watchdog is a sibling in the same task group, so a
/// closed channel only happens while the group is being torn down.
pub fn beat(sender: &LivenessSender, source: LivenessSource) {
    let _ = sender.send(LivenessEvent::now(source));
}
