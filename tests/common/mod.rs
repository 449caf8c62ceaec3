//! Scripted in-memory connection backend for driving peer sessions without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use avatar_rtc::peer::connection::{FrameChannel, Notifier, PeerConnection, PeerConnector};
use avatar_rtc::peer::media::LocalMedia;
use avatar_rtc::peer::types::{IceCandidate, SdpKind, SessionDescription};
use avatar_rtc::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the fake connection saw, shared with the test body.
#[derive(Default)]
pub struct Script {
    calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    notifier: Mutex<Option<Notifier>>,
}

impl Script {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Handle the connection uses to report state, channels and candidates.
    pub fn notifier(&self) -> Notifier {
        self.notifier
            .lock()
            .unwrap()
            .clone()
            .expect("connection not opened yet")
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub script: Arc<Script>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, label: &str) -> Arc<dyn FrameChannel> {
        Arc::new(ScriptedChannel {
            label: label.to_owned(),
            script: self.script.clone(),
        })
    }
}

#[async_trait]
impl PeerConnector for ScriptedConnector {
    async fn connect(&self, notifier: Notifier) -> Result<Arc<dyn PeerConnection>> {
        self.script.record("connect");
        *self.script.notifier.lock().unwrap() = Some(notifier);
        Ok(Arc::new(ScriptedConnection {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Script>,
}

fn kind_name(kind: SdpKind) -> &'static str {
    match kind {
        SdpKind::Offer => "offer",
        SdpKind::Answer => "answer",
    }
}

#[async_trait]
impl PeerConnection for ScriptedConnection {
    async fn add_media(&self, media: &LocalMedia) -> Result<()> {
        self.script.record(format!("add_media:{}", media.tracks().len()));
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn FrameChannel>> {
        self.script.record(format!("create_data_channel:{label}"));
        Ok(Arc::new(ScriptedChannel {
            label: label.to_owned(),
            script: self.script.clone(),
        }))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.script.record("create_offer");
        Ok(SessionDescription::offer("v=0 scripted-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.script.record("create_answer");
        Ok(SessionDescription::answer("v=0 scripted-answer"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.script.record(format!("set_local:{}", kind_name(desc.kind)));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.script.record(format!("set_remote:{}", kind_name(desc.kind)));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.script.record(format!("add_candidate:{}", candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.script.record("close");
        Ok(())
    }
}

struct ScriptedChannel {
    label: String,
    script: Arc<Script>,
}

#[async_trait]
impl FrameChannel for ScriptedChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.script.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.script.record("channel_close");
        Ok(())
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
