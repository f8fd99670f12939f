//! Business logic layer (hardware-independent)

use crate::clock::{SoftClock, TimeStruct};
use crate::config::Settings;
use crate::error::Error;
use crate::model::{Channel, FeedSet};
use crate::scene::{Scene, WidgetId};
use crate::traits::{FeedHandle, FeedReader, MessageHandler};
use heapless::String;

/// Everything the main loop mutates: the scene, the software clock and the
/// polling schedule.
pub struct AppLogic {
    scene: Scene,
    clock: Option<SoftClock>,
    feeds: FeedSet,
    tick_ms: u64,
    poll_interval_ms: u64,
    last_poll_ms: Option<u64>,
}

impl AppLogic {
    pub fn new(feeds: FeedSet, settings: &Settings) -> Self {
        Self {
            scene: Scene::new(),
            clock: None,
            feeds,
            tick_ms: settings.tick_ms,
            poll_interval_ms: settings.poll_interval_ms,
            last_poll_ms: None,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn feeds(&self) -> &FeedSet {
        &self.feeds
    }

    pub fn clock(&self) -> Option<&SoftClock> {
        self.clock.as_ref()
    }

    /// Adopt an authoritative time, starting the clock on first use.
    pub fn set_time(&mut self, time: &TimeStruct, now_ms: u64) {
        match self.clock.as_mut() {
            Some(clock) => clock.resync(time, now_ms),
            None => self.clock = Some(SoftClock::new(time, now_ms, self.tick_ms)),
        }
        log::info!("Clock set to {:02}:{:02}:{:02}", time.hour, time.min, time.sec);
    }

    /// True until the clock has been set, and whenever the minute wrapped.
    pub fn resync_due(&self) -> bool {
        self.clock.as_ref().is_none_or(SoftClock::resync_due)
    }

    pub fn advance_clock(&mut self, now_ms: u64) -> u32 {
        self.clock.as_mut().map_or(0, |clock| clock.advance(now_ms))
    }

    pub fn poll_due(&self, now_ms: u64) -> bool {
        match self.last_poll_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.poll_interval_ms,
            None => true,
        }
    }

    /// Start the poll interval. Called when an attempt begins, not when it
    /// succeeds.
    pub fn mark_polled(&mut self, now_ms: u64) {
        self.last_poll_ms = Some(now_ms);
    }

    fn touch_timestamp(&mut self) {
        if let Some(clock) = &self.clock {
            self.scene.set_text(WidgetId::UpdatedText, &clock.last_updated());
        }
    }

    /// Fetch all three feeds, then show them together.
    ///
    /// Nothing on screen changes unless every fetch and parse succeeded.
    pub async fn update_values<R: FeedReader>(
        &mut self,
        reader: &mut R,
        handles: &[FeedHandle; 3],
    ) -> Result<(), Error> {
        let mut texts: [String<32>; 3] = Default::default();
        let slots = Channel::ALL.into_iter().zip(handles).zip(texts.iter_mut());
        for ((channel, handle), text) in slots {
            let payload = reader.receive_data(handle).await?;
            *text = self.feeds.render(channel, &payload)?;
        }

        for (channel, text) in Channel::ALL.into_iter().zip(texts.iter()) {
            self.scene.set_text(WidgetId::value_label(channel), text);
        }
        self.touch_timestamp();
        log::info!("Values: {} | {} | {}", texts[0], texts[1], texts[2]);
        Ok(())
    }
}

impl MessageHandler for AppLogic {
    fn on_message(&mut self, feed: &str, payload: &str) -> Result<(), Error> {
        log::info!("Feed {} received new value: {}", feed, payload);
        if let Some(channel) = self.feeds.channel_for(feed) {
            let text = self.feeds.render(channel, payload)?;
            self.scene.set_text(WidgetId::value_label(channel), &text);
        }
        self.touch_timestamp();
        Ok(())
    }
}
