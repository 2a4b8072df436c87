//! Event loops for the keyboard and the gamepad.
//!
//! [`KeyboardTranslator`] runs every keyboard event through the chord state
//! machine, [`GamepadRelay`] forwards the gamepad untouched. Both wait on
//! their source and on the cancellation token; once an event has been taken
//! its output is written and flushed before cancellation is looked at again.

use super::error::LoopError;
use crate::mapping::{ChordTranslator, RawEvent};
use crate::sink::SharedSink;
use chrono::{DateTime, Local};
use evdev::EventStream;
use std::future::Future;
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A stream of events from one physical device.
pub trait EventSource: Send {
    fn recv(&mut self) -> impl Future<Output = io::Result<RawEvent>> + Send;

    /// Key codes currently held, ascending.
    fn active_keys(&self) -> io::Result<Vec<u16>>;
}

impl EventSource for EventStream {
    fn recv(&mut self) -> impl Future<Output = io::Result<RawEvent>> + Send {
        async move { self.next_event().await.map(RawEvent::from) }
    }

    fn active_keys(&self) -> io::Result<Vec<u16>> {
        let state = self.device().get_key_state()?;
        Ok(state.iter().map(|key| key.code()).collect())
    }
}

/// Periodic throughput logging for a loop.
struct LoopStats {
    name: &'static str,
    events: u64,
    last_log: DateTime<Local>,
    interval: chrono::Duration,
}

impl LoopStats {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            events: 0,
            last_log: Local::now(),
            interval: chrono::Duration::seconds(10),
        }
    }

    fn record(&mut self) {
        self.events += 1;
        let now = Local::now();
        if now - self.last_log > self.interval {
            debug!(
                "{} stats: {} events in last {} seconds (avg {:.2}/sec)",
                self.name,
                self.events,
                self.interval.num_seconds(),
                self.events as f64 / self.interval.num_seconds() as f64
            );
            self.events = 0;
            self.last_log = now;
        }
    }
}

/// Emits a batch; a sink failure cancels the whole daemon.
pub(crate) async fn emit_or_cancel(
    sink: &SharedSink,
    events: &[RawEvent],
    token: &CancellationToken,
    loop_name: &str,
) -> Result<(), LoopError> {
    if let Err(e) = sink.emit(events).await {
        error!("{}: sink unusable, requesting shutdown: {}", loop_name, e);
        token.cancel();
        return Err(e.into());
    }
    Ok(())
}

/// Keyboard loop: chord translation, suppression, output.
pub struct KeyboardTranslator<S> {
    source: S,
    translator: ChordTranslator,
    sink: SharedSink,
}

impl<S: EventSource> KeyboardTranslator<S> {
    pub fn new(source: S, translator: ChordTranslator, sink: SharedSink) -> Self {
        Self {
            source,
            translator,
            sink,
        }
    }

    pub async fn run(mut self, token: CancellationToken) -> Result<(), LoopError> {
        info!("Starting keyboard translator loop");
        let mut stats = LoopStats::new("Keyboard translator");

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = self.source.recv() => event,
            };
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("Keyboard stream ended: {}", e);
                    return Err(e.into());
                }
            };

            let active = self.source.active_keys()?;
            let translation = self.translator.translate(&event, &active);
            if let Some((button, edge)) = translation.fired {
                info!("{} {:?}", button, edge);
            }
            emit_or_cancel(&self.sink, &translation.events, &token, "Keyboard translator").await?;
            stats.record();
        }

        info!("Keyboard translator loop cancelled");
        Ok(())
    }
}

/// Gamepad loop: every event forwarded unchanged.
pub struct GamepadRelay<S> {
    source: S,
    sink: SharedSink,
}

impl<S: EventSource> GamepadRelay<S> {
    pub fn new(source: S, sink: SharedSink) -> Self {
        Self { source, sink }
    }

    pub async fn run(mut self, token: CancellationToken) -> Result<(), LoopError> {
        info!("Starting gamepad relay loop");
        let mut stats = LoopStats::new("Gamepad relay");

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = self.source.recv() => event,
            };
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("Gamepad stream ended: {}", e);
                    return Err(e.into());
                }
            };

            emit_or_cancel(&self.sink, &[event], &token, "Gamepad relay").await?;
            stats.record();
        }

        info!("Gamepad relay loop cancelled");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::mpsc;

    /// Source fed through a channel; the active set travels with each event.
    pub struct ChannelSource {
        rx: mpsc::UnboundedReceiver<(RawEvent, Vec<u16>)>,
        active: Vec<u16>,
    }

    impl ChannelSource {
        pub fn new() -> (mpsc::UnboundedSender<(RawEvent, Vec<u16>)>, Self) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                tx,
                Self {
                    rx,
                    active: Vec::new(),
                },
            )
        }
    }

    impl EventSource for ChannelSource {
        fn recv(&mut self) -> impl Future<Output = io::Result<RawEvent>> + Send {
            async move {
                match self.rx.recv().await {
                    Some((event, active)) => {
                        self.active = active;
                        Ok(event)
                    }
                    None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "device gone")),
                }
            }
        }

        fn active_keys(&self) -> io::Result<Vec<u16>> {
            Ok(self.active.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ChannelSource;
    use super::*;
    use crate::mapping::tables::{GEN1, GEN2};
    use crate::mapping::{EV_KEY, EV_MSC, EV_SYN, MSC_SCAN};
    use crate::sink::testing::RecordingSink;
    use evdev::KeyCode;
    use std::time::Duration;

    const MODE: u16 = KeyCode::BTN_MODE.0;
    const NORTH: u16 = KeyCode::BTN_NORTH.0;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn keyboard_chord_is_emitted_as_one_batch() {
        let recorder = RecordingSink::default();
        let sink = SharedSink::new(recorder.clone());
        let (tx, source) = ChannelSource::new();
        let token = CancellationToken::new();
        let task = tokio::spawn(
            KeyboardTranslator::new(source, ChordTranslator::new(&GEN1), sink).run(token.clone()),
        );

        // Press: scan codes and the raw chord keys are swallowed.
        tx.send((RawEvent::new(EV_MSC, MSC_SCAN, 0xdb), vec![97, 125])).unwrap();
        tx.send((RawEvent::key(24, 1), vec![24, 97, 125])).unwrap();
        tx.send((RawEvent::new(EV_SYN, 0, 0), vec![24, 97, 125])).unwrap();
        // Release
        tx.send((RawEvent::key(24, 0), vec![97])).unwrap();
        // Unrelated key passes through.
        tx.send((RawEvent::key(30, 1), vec![30])).unwrap();
        settle().await;

        token.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(
            recorder.batches(),
            vec![
                vec![(EV_KEY, MODE, 1), (EV_KEY, NORTH, 1)],
                vec![(EV_KEY, MODE, 0), (EV_KEY, NORTH, 0)],
                vec![(EV_KEY, 30, 1)],
            ]
        );
    }

    #[tokio::test]
    async fn gen2_home_press() {
        let recorder = RecordingSink::default();
        let sink = SharedSink::new(recorder.clone());
        let (tx, source) = ChannelSource::new();
        let token = CancellationToken::new();
        let task = tokio::spawn(
            KeyboardTranslator::new(source, ChordTranslator::new(&GEN2), sink).run(token.clone()),
        );

        tx.send((RawEvent::key(133, 1), vec![96, 105, 133])).unwrap();
        settle().await;
        token.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(recorder.batches(), vec![vec![(EV_KEY, MODE, 1)]]);
    }

    #[tokio::test]
    async fn relay_forwards_every_event() {
        let recorder = RecordingSink::default();
        let sink = SharedSink::new(recorder.clone());
        let (tx, source) = ChannelSource::new();
        let token = CancellationToken::new();
        let task = tokio::spawn(GamepadRelay::new(source, sink).run(token.clone()));

        tx.send((RawEvent::key(304, 1), vec![304])).unwrap();
        tx.send((RawEvent::new(3, 0, -1200), vec![304])).unwrap();
        tx.send((RawEvent::new(EV_SYN, 0, 0), vec![304])).unwrap();
        settle().await;
        token.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(
            recorder.batches(),
            vec![vec![(EV_KEY, 304, 1)], vec![(3, 0, -1200)]]
        );
    }

    #[tokio::test]
    async fn source_failure_stays_local() {
        let recorder = RecordingSink::default();
        let sink = SharedSink::new(recorder);
        let (tx, source) = ChannelSource::new();
        let token = CancellationToken::new();
        let task = tokio::spawn(GamepadRelay::new(source, sink).run(token.clone()));

        drop(tx);
        let result = task.await.unwrap();
        assert!(matches!(result, Err(LoopError::Source(_))));
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn sink_failure_cancels_everything() {
        let recorder = RecordingSink {
            fail_after: Some(0),
            ..Default::default()
        };
        let sink = SharedSink::new(recorder);
        let (tx, source) = ChannelSource::new();
        let token = CancellationToken::new();
        let task = tokio::spawn(GamepadRelay::new(source, sink).run(token.clone()));

        tx.send((RawEvent::key(304, 1), vec![304])).unwrap();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(LoopError::Sink(_))));
        assert!(token.is_cancelled());
    }
}
