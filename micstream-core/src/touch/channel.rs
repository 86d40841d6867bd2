//! Touch command channel.
//!
//! Every public operation only enqueues a [`Gesture`]. One worker task
//! drains the queue in submission order, expands each gesture into timed
//! primitive events, and sends them over a lazily created connection.
//!
//! # Failure policy
//!
//! Any setup or send failure drops the whole connection (socket and
//! destination together), reports a status event, and abandons the rest
//! of the current gesture. The next gesture reconnects from scratch.
//! There is no backoff and no retry limit.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{TouchEvent, TouchKind};
use crate::error::StreamError;
use crate::status::StatusReporter;
use crate::touch::gesture::{Gesture, GestureTiming};
use crate::touch::link::{Connector, DatagramLink};

// ── TouchChannel ─────────────────────────────────────────────────

/// Caller-side handle to the touch worker.
///
/// Must be created inside a Tokio runtime.
pub struct TouchChannel {
    tx: Option<mpsc::UnboundedSender<Gesture>>,
    worker: Option<JoinHandle<()>>,
}

impl TouchChannel {
    /// Spawn the worker for `connector`.
    pub fn spawn<C: Connector>(
        connector: C,
        timing: GestureTiming,
        status: StatusReporter,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = TouchWorker {
            connector,
            link: None,
            timing,
            status,
        };
        Self {
            tx: Some(tx),
            worker: Some(tokio::spawn(worker.run(rx))),
        }
    }

    /// Queue one primitive event.
    pub fn send_primitive(&self, kind: TouchKind, x: i16, y: i16) -> Result<(), StreamError> {
        self.submit(Gesture::primitive(kind, x, y))
    }

    /// Queue Press, hold, Release at `(x, y)`.
    pub fn tap(&self, x: i16, y: i16) -> Result<(), StreamError> {
        self.submit(Gesture::Tap { x, y })
    }

    /// Queue a linear swipe from `(x1, y1)` to `(x2, y2)`.
    pub fn swipe(&self, x1: i16, y1: i16, x2: i16, y2: i16, steps: u16) -> Result<(), StreamError> {
        self.submit(Gesture::Swipe {
            from: (x1, y1),
            to: (x2, y2),
            steps,
        })
    }

    /// Queue an arbitrary gesture. Off-screen points are clamped to the
    /// nearest edge pixel.
    pub fn submit(&self, gesture: Gesture) -> Result<(), StreamError> {
        let tx = self.tx.as_ref().ok_or(StreamError::ChannelClosed)?;
        let clamped = gesture.clamped();
        if clamped != gesture {
            debug!("clamped {gesture:?} to {clamped:?}");
        }
        tx.send(clamped).map_err(|_| StreamError::ChannelClosed)
    }

    /// Whether the channel still accepts work.
    pub fn is_open(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Stop accepting work and drop the connection immediately.
    /// Queued gestures are discarded.
    pub fn close(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }

    /// Stop accepting work and wait until everything queued so far has
    /// been sent (or has failed).
    pub async fn drain(mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("touch worker ended abnormally: {e}");
            }
        }
    }
}

impl Drop for TouchChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ── TouchWorker ──────────────────────────────────────────────────

struct TouchWorker<C: Connector> {
    connector: C,
    /// `None` until the first send and after every failure.
    link: Option<C::Link>,
    timing: GestureTiming,
    status: StatusReporter,
}

impl<C: Connector> TouchWorker<C> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Gesture>) {
        while let Some(gesture) = rx.recv().await {
            self.perform(gesture).await;
        }
        debug!("touch queue closed; worker exiting");
    }

    async fn perform(&mut self, gesture: Gesture) {
        for step in gesture.plan(&self.timing) {
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
            if let Err(e) = self.send(step.event).await {
                self.invalidate(&e);
                return;
            }
        }
    }

    async fn send(&mut self, event: TouchEvent) -> Result<(), StreamError> {
        let link = match self.link.take() {
            Some(link) => link,
            None => Self::establish(&self.connector, &self.status).await?,
        };
        let link = self.link.insert(link);
        link.send(&event.encode()).await
    }

    async fn establish(connector: &C, status: &StatusReporter) -> Result<C::Link, StreamError> {
        let (link, outcome) = connector.connect().await?;
        let msg = format!("Touch ready -> {} {}", connector.destination(), outcome.label());
        info!("{msg}");
        status.report(true, msg);
        Ok(link)
    }

    fn invalidate(&mut self, err: &StreamError) {
        warn!("touch send error: {err}");
        self.link = None;
        self.status.report(false, err.status_text());
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;

    use super::*;
    use crate::binder::BindOutcome;
    use crate::status::{StatusEvent, StatusSource, status_channel};

    /// Everything the fake link was asked to do.
    #[derive(Clone, Default)]
    struct Wire {
        connects: Arc<AtomicUsize>,
        fail_connect: Arc<AtomicBool>,
        fail_next_send: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<(Instant, usize, TouchEvent)>>>,
    }

    impl Wire {
        fn events(&self) -> Vec<TouchEvent> {
            self.sent.lock().unwrap().iter().map(|(_, _, e)| *e).collect()
        }
    }

    struct FakeConnector(Wire);

    struct FakeLink {
        generation: usize,
        wire: Wire,
    }

    #[async_trait]
    impl DatagramLink for FakeLink {
        async fn send(&mut self, payload: &[u8]) -> Result<(), StreamError> {
            if self.wire.fail_next_send.swap(false, Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::NetworkUnreachable, "unreachable").into());
            }
            let ev = TouchEvent::decode(payload)?;
            self.wire
                .sent
                .lock()
                .unwrap()
                .push((Instant::now(), self.generation, ev));
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Link = FakeLink;

        async fn connect(&self) -> Result<(FakeLink, BindOutcome), StreamError> {
            if self.0.fail_connect.load(Ordering::SeqCst) {
                return Err(StreamError::NoAddress("head-unit".into()));
            }
            let generation = self.0.connects.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((
                FakeLink {
                    generation,
                    wire: self.0.clone(),
                },
                BindOutcome::DefaultRoute {
                    reason: "test".into(),
                },
            ))
        }

        fn destination(&self) -> String {
            "head-unit:8001".into()
        }
    }

    fn channel(wire: &Wire) -> (TouchChannel, mpsc::Receiver<StatusEvent>) {
        let (status, rx) = status_channel(StatusSource::Touch);
        let ch = TouchChannel::spawn(
            FakeConnector(wire.clone()),
            GestureTiming::default(),
            status,
        );
        (ch, rx)
    }

    /// Yield to the worker until `n` events have gone out.
    async fn wait_for_events(wire: &Wire, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while wire.events().len() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timeout");
    }

    #[tokio::test]
    async fn swipe_sends_twelve_events_in_order() {
        let wire = Wire::default();
        let (ch, _rx) = channel(&wire);
        ch.swipe(0, 500, 0, 250, 10).unwrap();
        ch.drain().await;

        let evs = wire.events();
        assert_eq!(evs.len(), 12);
        assert_eq!(evs[0], TouchEvent::press(0, 500));
        for i in 1..=10 {
            assert_eq!(evs[i], TouchEvent::move_to(0, 500 - 25 * i as i16));
        }
        assert_eq!(evs[11], TouchEvent::release(0, 250));
    }

    #[tokio::test]
    async fn tap_holds_before_release() {
        let wire = Wire::default();
        let (ch, _rx) = channel(&wire);
        ch.tap(512, 740).unwrap();
        ch.drain().await;

        let sent = wire.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].2, TouchEvent::press(512, 740));
        assert_eq!(sent[1].2, TouchEvent::release(512, 740));
        assert!(sent[1].0.duration_since(sent[0].0) >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn gestures_keep_submission_order() {
        let wire = Wire::default();
        let (ch, _rx) = channel(&wire);
        ch.tap(1, 1).unwrap();
        ch.send_primitive(TouchKind::Press, 2, 2).unwrap();
        ch.send_primitive(TouchKind::Release, 3, 3).unwrap();
        ch.drain().await;

        assert_eq!(
            wire.events(),
            [
                TouchEvent::press(1, 1),
                TouchEvent::release(1, 1),
                TouchEvent::press(2, 2),
                TouchEvent::release(3, 3),
            ]
        );
    }

    #[tokio::test]
    async fn connection_is_reused_until_failure() {
        let wire = Wire::default();
        let (ch, mut rx) = channel(&wire);
        ch.send_primitive(TouchKind::Press, 10, 10).unwrap();
        ch.send_primitive(TouchKind::Release, 10, 10).unwrap();
        ch.drain().await;

        assert_eq!(wire.connects.load(Ordering::SeqCst), 1);
        let ready = rx.recv().await.unwrap();
        assert!(ready.connected);
        assert_eq!(ready.message, "Touch ready -> head-unit:8001 (default route)");
    }

    #[tokio::test]
    async fn send_failure_forces_fresh_connection() {
        let wire = Wire::default();
        let (ch, mut rx) = channel(&wire);

        ch.send_primitive(TouchKind::Press, 1, 1).unwrap();
        wait_for_events(&wire, 1).await;
        wire.fail_next_send.store(true, Ordering::SeqCst);
        ch.send_primitive(TouchKind::Move, 2, 2).unwrap();
        ch.send_primitive(TouchKind::Release, 3, 3).unwrap();
        ch.drain().await;

        assert_eq!(wire.connects.load(Ordering::SeqCst), 2);
        let sent = wire.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!((sent[0].1, sent[0].2), (1, TouchEvent::press(1, 1)));
        assert_eq!((sent[1].1, sent[1].2), (2, TouchEvent::release(3, 3)));

        let statuses: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let flags: Vec<_> = statuses.iter().map(|s| s.connected).collect();
        assert_eq!(flags, [true, false, true]);
        assert!(statuses[1].message.starts_with("Error: "));
    }

    #[tokio::test]
    async fn failure_abandons_rest_of_gesture() {
        let wire = Wire::default();
        let (ch, _rx) = channel(&wire);
        ch.send_primitive(TouchKind::Move, 0, 0).unwrap();
        ch.drain().await;

        wire.fail_next_send.store(true, Ordering::SeqCst);
        let (ch, _rx) = channel(&wire);
        ch.tap(5, 5).unwrap();
        ch.drain().await;

        // Press failed, so the Release was never attempted.
        assert_eq!(wire.events(), [TouchEvent::move_to(0, 0)]);
    }

    #[tokio::test]
    async fn setup_failure_reports_and_retries_next_time() {
        let wire = Wire::default();
        wire.fail_connect.store(true, Ordering::SeqCst);
        let (ch, mut rx) = channel(&wire);
        ch.send_primitive(TouchKind::Press, 1, 1).unwrap();
        ch.send_primitive(TouchKind::Press, 2, 2).unwrap();
        ch.drain().await;

        assert!(wire.events().is_empty());
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(!first.connected && !second.connected);
        assert!(first.message.contains("head-unit"));
    }

    #[tokio::test]
    async fn off_screen_points_are_clamped() {
        let wire = Wire::default();
        let (ch, _rx) = channel(&wire);
        ch.tap(5000, 5000).unwrap();
        ch.send_primitive(TouchKind::Move, -20, 100).unwrap();
        ch.drain().await;

        assert_eq!(
            wire.events(),
            [
                TouchEvent::press(1023, 767),
                TouchEvent::release(1023, 767),
                TouchEvent::move_to(0, 100),
            ]
        );
    }

    #[tokio::test]
    async fn extreme_swipe_keeps_worker_alive() {
        let wire = Wire::default();
        let (status, _rx) = status_channel(StatusSource::Touch);
        let timing = GestureTiming {
            tap_hold: Duration::ZERO,
            swipe_step: Duration::ZERO,
            swipe_release: Duration::ZERO,
        };
        let ch = TouchChannel::spawn(FakeConnector(wire.clone()), timing, status);

        ch.swipe(i16::MIN, i16::MIN, i16::MAX, i16::MAX, u16::MAX).unwrap();
        ch.tap(1, 2).unwrap();
        wait_for_events(&wire, u16::MAX as usize + 4).await;
        assert!(ch.is_open());
        assert!(ch.tap(3, 4).is_ok());
        ch.drain().await;

        let evs = wire.events();
        assert_eq!(evs.len(), u16::MAX as usize + 6);
        assert_eq!(evs[0], TouchEvent::press(0, 0));
        assert!(evs.iter().all(TouchEvent::in_bounds));
        assert_eq!(evs[u16::MAX as usize + 1], TouchEvent::release(1023, 767));
        assert_eq!(evs[u16::MAX as usize + 4], TouchEvent::press(3, 4));
    }

    #[tokio::test]
    async fn closed_channel_rejects_work() {
        let wire = Wire::default();
        let (mut ch, _rx) = channel(&wire);
        assert!(ch.is_open());
        ch.close();
        assert!(!ch.is_open());
        assert!(matches!(ch.tap(1, 1), Err(StreamError::ChannelClosed)));
        ch.close();
    }
}
