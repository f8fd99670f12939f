//! Main loop for both firmware variants
//!
//! One iteration ensures the radio is joined, services the telemetry channel,
//! resyncs the clock if due and repaints, all inside one guarded block. A
//! transient failure anywhere in that block resets the radio once and skips
//! the rest of the iteration.

use core::convert::Infallible;

use crate::aio::mqtt::{MqttClient, MqttOptions};
use crate::config::Settings;
use crate::error::Error;
use crate::logic::AppLogic;
use crate::traits::{
    Connector, FeedHandle, FeedReader, LightPhase, MessageSource, Radio, Screen, StatusLight,
    TimeBase, TimeSource,
};

/// How one guarded iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New values were fetched or pushed
    Updated,
    /// Nothing to do this time
    Idle,
    /// A transient error was absorbed by resetting the radio
    Recovered(Error),
}

/// Owns the board-facing half of the app: radio, light, screen and time.
pub struct Runner<R, L, S, T> {
    pub radio: R,
    pub light: L,
    pub screen: S,
    pub time: T,
    settings: Settings,
    failures: u32,
}

impl<R, L, S, T> Runner<R, L, S, T>
where
    R: Radio,
    L: StatusLight,
    S: Screen,
    T: TimeBase,
{
    pub fn new(radio: R, light: L, screen: S, time: T, settings: Settings) -> Self {
        Self {
            radio,
            light,
            screen,
            time,
            settings,
            failures: 0,
        }
    }

    /// Consecutive transient failures since the last clean iteration.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Join the network under the join policy, resetting the radio between
    /// attempts.
    pub async fn join_network(&mut self) -> Result<(), Error> {
        let policy = self.settings.join_retry;
        let mut attempt = 1;
        loop {
            self.light.show(LightPhase::Connecting);
            log::info!("Connecting to WiFi (attempt {})", attempt);
            match self.radio.join().await {
                Ok(()) => {
                    log::info!("Connected to WiFi");
                    self.light.show(LightPhase::Off);
                    return Ok(());
                }
                Err(e) if e.is_transient() && policy.allows(attempt + 1) => {
                    let delay = policy.delay_for(attempt);
                    log::warn!("WiFi join failed: {}. Retrying in {} ms", e, delay);
                    self.light.show(LightPhase::Fault);
                    self.radio.reset().await;
                    self.time.sleep_ms(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("WiFi join gave up after {} attempts: {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn ensure_joined(&mut self) -> Result<(), Error> {
        if self.radio.is_connected() {
            return Ok(());
        }
        self.light.show(LightPhase::Connecting);
        self.radio.join().await?;
        self.light.show(LightPhase::Off);
        Ok(())
    }

    async fn resync_if_due<C: TimeSource>(
        &mut self,
        app: &mut AppLogic,
        clock: &mut C,
    ) -> Result<(), Error> {
        if app.resync_due() {
            let time = clock.receive_time().await?;
            app.set_time(&time, self.time.now_ms());
        }
        Ok(())
    }

    /// Close out an iteration: advance the clock, then absorb or propagate
    /// the error.
    async fn settle(
        &mut self,
        app: &mut AppLogic,
        result: Result<Outcome, Error>,
    ) -> Result<Outcome, Error> {
        app.advance_clock(self.time.now_ms());
        match result {
            Ok(outcome) => {
                self.failures = 0;
                Ok(outcome)
            }
            Err(e) if e.is_transient() => {
                self.failures += 1;
                log::warn!("Failed to get data, retrying: {}", e);
                self.light.show(LightPhase::Fault);
                self.radio.reset().await;

                let policy = self.settings.recovery_retry;
                if !policy.allows(self.failures + 1) {
                    log::error!("Giving up after {} consecutive failures", self.failures);
                    return Err(e);
                }
                self.time.sleep_ms(policy.delay_for(self.failures)).await;
                Ok(Outcome::Recovered(e))
            }
            Err(e) => {
                log::error!("Unrecoverable error: {}", e);
                Err(e)
            }
        }
    }

    async fn bring_up_polling<F>(
        &mut self,
        app: &mut AppLogic,
        service: &mut F,
    ) -> Result<[FeedHandle; 3], Error>
    where
        F: FeedReader + TimeSource,
    {
        self.ensure_joined().await?;
        let mut handles: [FeedHandle; 3] = Default::default();
        for (handle, key) in handles.iter_mut().zip(app.feeds().keys()) {
            *handle = service.resolve_feed(key).await?;
        }
        self.resync_if_due(app, service).await?;
        app.mark_polled(self.time.now_ms());
        app.update_values(service, &handles).await?;
        self.screen.refresh(app.scene_mut())?;
        Ok(handles)
    }

    async fn polling_step<F>(
        &mut self,
        app: &mut AppLogic,
        service: &mut F,
        handles: &[FeedHandle; 3],
    ) -> Result<Outcome, Error>
    where
        F: FeedReader + TimeSource,
    {
        self.ensure_joined().await?;
        let now = self.time.now_ms();
        let mut outcome = Outcome::Idle;
        if app.poll_due(now) {
            app.mark_polled(now);
            app.update_values(service, handles).await?;
            outcome = Outcome::Updated;
        }
        self.resync_if_due(app, service).await?;
        self.screen.refresh(app.scene_mut())?;
        Ok(outcome)
    }

    /// One guarded iteration of the polling variant.
    pub async fn poll_iteration<F>(
        &mut self,
        app: &mut AppLogic,
        service: &mut F,
        handles: &[FeedHandle; 3],
    ) -> Result<Outcome, Error>
    where
        F: FeedReader + TimeSource,
    {
        let result = self.polling_step(app, service, handles).await;
        self.settle(app, result).await
    }

    /// Polling variant: resolve the feeds once, then poll them every
    /// `poll_interval_ms` until a fatal error.
    pub async fn run_polling<F>(
        &mut self,
        app: &mut AppLogic,
        service: &mut F,
    ) -> Result<Infallible, Error>
    where
        F: FeedReader + TimeSource,
    {
        self.join_network().await?;
        let handles = loop {
            match self.bring_up_polling(app, service).await {
                Ok(handles) => {
                    self.settle(app, Ok(Outcome::Updated)).await?;
                    break handles;
                }
                Err(e) => {
                    self.settle(app, Err(e)).await?;
                }
            }
        };

        loop {
            self.poll_iteration(app, service, &handles).await?;
            self.time.sleep_ms(self.settings.loop_delay_ms).await;
        }
    }

    /// Connect, follow every feed and fetch the time.
    pub async fn open_session<'c, 'o, C, K>(
        &mut self,
        app: &mut AppLogic,
        connector: &'c mut C,
        clock: &mut K,
        broker: (&str, u16),
        options: MqttOptions<'o>,
    ) -> Result<MqttClient<'o, C::Link<'c>>, Error>
    where
        C: Connector,
        K: TimeSource,
    {
        self.ensure_joined().await?;
        let link = connector.open(broker.0, broker.1).await?;
        let mut client = MqttClient::new(link, options);
        let now = self.time.now_ms();
        client.connect(app, now).await?;
        for feed in app.feeds().keys() {
            client.follow(feed, now).await?;
        }
        self.resync_if_due(app, clock).await?;
        self.screen.refresh(app.scene_mut())?;
        Ok(client)
    }

    async fn subscription_step<M, K>(
        &mut self,
        app: &mut AppLogic,
        session: &mut M,
        clock: &mut K,
    ) -> Result<Outcome, Error>
    where
        M: MessageSource,
        K: TimeSource,
    {
        self.ensure_joined().await?;
        let dirty_before = app.scene().is_dirty();
        session.pump(app, self.time.now_ms()).await?;
        let outcome = if app.scene().is_dirty() && !dirty_before {
            Outcome::Updated
        } else {
            Outcome::Idle
        };
        self.resync_if_due(app, clock).await?;
        self.screen.refresh(app.scene_mut())?;
        Ok(outcome)
    }

    /// One guarded iteration of the subscription variant.
    pub async fn subscription_iteration<M, K>(
        &mut self,
        app: &mut AppLogic,
        session: &mut M,
        clock: &mut K,
    ) -> Result<Outcome, Error>
    where
        M: MessageSource,
        K: TimeSource,
    {
        let result = self.subscription_step(app, session, clock).await;
        self.settle(app, result).await
    }

    /// Subscription variant: keep an MQTT session open and pump it. Any
    /// recovered failure drops the session and opens a fresh one.
    pub async fn run_subscription<C, K>(
        &mut self,
        app: &mut AppLogic,
        connector: &mut C,
        clock: &mut K,
        broker: (&str, u16),
        options: MqttOptions<'_>,
    ) -> Result<Infallible, Error>
    where
        C: Connector,
        K: TimeSource,
    {
        self.join_network().await?;
        loop {
            let mut client = match self.open_session(app, connector, clock, broker, options).await {
                Ok(client) => client,
                Err(e) => {
                    self.settle(app, Err(e)).await?;
                    continue;
                }
            };

            loop {
                let outcome = self.subscription_iteration(app, &mut client, clock).await?;
                if let Outcome::Recovered(_) = outcome {
                    client.disconnect(app).await;
                    break;
                }
                self.time.sleep_ms(self.settings.loop_delay_ms).await;
            }
        }
    }
}
