use crate::error::Result;
use crate::peer::connection::{FrameChannel, Notification, Notifier};
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

/// Wires data-channel callbacks into `notifier`, on both the side that
/// created the channel and the side that adopted it.
pub fn attach_dc(dc: &Arc<RTCDataChannel>, notifier: Notifier) {
    tracing::debug!(label = dc.label(), "attaching data channel handlers");

    let weak = Arc::downgrade(dc);
    let n = notifier.clone();
    dc.on_open(Box::new(move || {
        if let Some(dc) = weak.upgrade() {
            tracing::info!(label = dc.label(), "data channel opened");
            n.notify(Notification::ChannelOpened(Arc::new(RtcFrameChannel::new(dc))));
        }
        Box::pin(async {})
    }));

    let n = notifier.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        tracing::trace!(len = msg.data.len(), "data channel message");
        n.notify(Notification::ChannelMessage(msg.data));
        Box::pin(async {})
    }));

    dc.on_close(Box::new(move || {
        tracing::info!("data channel closed");
        notifier.notify(Notification::ChannelClosed);
        Box::pin(async {})
    }));
}

pub struct RtcFrameChannel {
    dc: Arc<RTCDataChannel>,
}

impl RtcFrameChannel {
    pub fn new(dc: Arc<RTCDataChannel>) -> Self {
        Self { dc }
    }
}

#[async_trait]
impl FrameChannel for RtcFrameChannel {
    fn label(&self) -> String {
        self.dc.label().to_owned()
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.dc.send_text(text).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.dc.close().await?;
        Ok(())
    }
}
