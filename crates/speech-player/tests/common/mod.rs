#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use speech_player::{OpenSink, OutputConfig, OutputSink, SpeechQueue};
use speech_queue_types::{ItemStatus, QueueItemInfo};

/// Something the worker did to the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Start,
    Chunk(Vec<f32>),
    Stop,
    Close,
}

/// Shared view of a [`RecordingSink`] the test keeps after handing the sink to the worker.
#[derive(Clone, Default)]
pub struct Probe {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    fail_writes: Arc<AtomicUsize>,
    panic_writes: Arc<AtomicUsize>,
    fail_opens: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
    device_lost: Arc<AtomicBool>,
    write_delay: Duration,
}

impl Probe {
    pub fn with_write_delay(delay: Duration) -> Self {
        Self {
            write_delay: delay,
            ..Self::default()
        }
    }

    /// Fail the next `n` chunk writes.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Panic inside the next `n` chunk writes.
    pub fn panic_next_writes(&self, n: usize) {
        self.panic_writes.store(n, Ordering::SeqCst);
    }

    /// Make the current sink report a lost device until it is reopened.
    pub fn lose_device(&self) {
        self.device_lost.store(true, Ordering::SeqCst);
    }

    /// Fail the next `n` sink opens.
    pub fn fail_next_opens(&self, n: usize) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Successful sink opens so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn chunks(&self) -> Vec<Vec<f32>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Chunk(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &SinkEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| std::mem::discriminant(*e) == std::mem::discriminant(wanted))
            .count()
    }

    pub fn opener(&self) -> OpenSink {
        let probe = self.clone();
        Box::new(move |_cfg: &OutputConfig| -> Result<Box<dyn OutputSink>> {
            if take_one(&probe.fail_opens) {
                bail!("injected open failure");
            }
            probe.device_lost.store(false, Ordering::SeqCst);
            probe.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingSink {
                probe: probe.clone(),
                active: false,
                closed: false,
            }))
        })
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory [`OutputSink`] that records every call.
pub struct RecordingSink {
    probe: Probe,
    active: bool,
    closed: bool,
}

impl OutputSink for RecordingSink {
    fn device_name(&self) -> Option<String> {
        Some("recording".to_string())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn start(&mut self) -> Result<()> {
        self.active = true;
        self.probe.push(SinkEvent::Start);
        Ok(())
    }

    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        if !self.active {
            bail!("write to a stopped stream");
        }
        if !self.probe.write_delay.is_zero() {
            thread::sleep(self.probe.write_delay);
        }
        if take_one(&self.probe.panic_writes) {
            panic!("injected write panic");
        }
        if self.probe.device_lost.load(Ordering::SeqCst) {
            bail!("device lost");
        }
        if take_one(&self.probe.fail_writes) {
            bail!("injected write failure");
        }
        self.probe.push(SinkEvent::Chunk(chunk.to_vec()));
        Ok(())
    }

    fn drain(&mut self, cancel: &dyn Fn() -> bool) -> Result<bool> {
        Ok(!cancel())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        self.probe.push(SinkEvent::Stop);
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if self.active {
            let _ = self.stop();
        }
        self.closed = true;
        self.probe.push(SinkEvent::Close);
    }

    fn is_failed(&self) -> bool {
        self.probe.device_lost.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Small, fast format for engine tests: 8 kHz stereo, 64-frame chunks.
pub fn test_config() -> OutputConfig {
    OutputConfig {
        sample_rate: 8_000,
        channels: 2,
        chunk_frames: 64,
        buffer_chunks: 2,
        device: None,
        idle_poll: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(2),
        max_retained_items: 64,
    }
}

pub fn start(config: OutputConfig, probe: &Probe) -> SpeechQueue {
    SpeechQueue::start_with(config, probe.opener()).expect("engine starts")
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn item(engine: &SpeechQueue, id: &str) -> Option<QueueItemInfo> {
    engine.status().items.into_iter().find(|i| i.id == id)
}

pub fn status_of(engine: &SpeechQueue, id: &str) -> Option<ItemStatus> {
    item(engine, id).map(|i| i.status)
}

pub fn wait_terminal(engine: &SpeechQueue, id: &str) -> Option<ItemStatus> {
    let mut last = None;
    wait_until(Duration::from_secs(5), || {
        last = status_of(engine, id);
        last.is_some_and(ItemStatus::is_terminal)
    });
    last
}

/// `frames` of a constant mono signal.
pub fn tone(frames: usize, level: f32) -> Vec<f32> {
    vec![level; frames]
}
