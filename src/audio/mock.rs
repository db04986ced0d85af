// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::VecDeque, fmt, sync::Arc, thread, time::Duration};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use crate::audio::{BlockCompletion, DeviceError, DeviceSink, OutputFormat};

/// Played blocks kept for inspection. Older blocks are dropped first.
const MAX_RECORDED_BLOCKS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Blocks wait until the test completes them through a [`Handle`].
    Manual,
    /// Blocks are completed as soon as the device thread sees them.
    Immediate,
    /// Blocks are completed after their playback duration has elapsed.
    RealTime,
    /// Opening the device fails.
    Failing,
}

#[derive(Default)]
struct State {
    open: bool,
    closed: bool,
    submitted: usize,
    pending: VecDeque<Vec<i16>>,
    played: VecDeque<Vec<i16>>,
    completion: Option<BlockCompletion>,
}

impl State {
    fn record(&mut self, block: Vec<i16>) {
        if self.played.len() == MAX_RECORDED_BLOCKS {
            self.played.pop_front();
        }
        self.played.push_back(block);
    }
}

/// A mock device. Doesn't actually play anything.
pub struct Sink {
    name: String,
    mode: Mode,
    state: Arc<Mutex<State>>,
    block_tx: Option<Sender<Vec<i16>>>,
    join: Option<thread::JoinHandle<()>>,
}

impl Sink {
    fn new(name: &str, mode: Mode) -> Sink {
        Sink {
            name: name.to_string(),
            mode,
            state: Arc::new(Mutex::new(State::default())),
            block_tx: None,
            join: None,
        }
    }

    /// A sink whose blocks are completed only through [`Handle::complete`].
    pub fn manual(name: &str) -> Sink {
        Sink::new(name, Mode::Manual)
    }

    /// A sink that completes every block as soon as it is submitted.
    pub fn immediate(name: &str) -> Sink {
        Sink::new(name, Mode::Immediate)
    }

    /// A sink that completes every block after the time it would take to play.
    pub fn real_time(name: &str) -> Sink {
        Sink::new(name, Mode::RealTime)
    }

    /// A sink that cannot be opened.
    pub fn failing(name: &str) -> Sink {
        Sink::new(name, Mode::Failing)
    }

    /// Returns a handle for inspecting and driving the sink from another
    /// thread.
    pub fn handle(&self) -> Handle {
        Handle {
            state: self.state.clone(),
        }
    }

    fn spawn_device_thread(
        &mut self,
        format: &OutputFormat,
        completion: BlockCompletion,
    ) -> Result<(), DeviceError> {
        let (block_tx, block_rx) = unbounded::<Vec<i16>>();
        let state = self.state.clone();
        let pace = self.mode == Mode::RealTime;
        let frame_duration = format.time_step();
        let channels = usize::from(format.channel_count.max(1));

        let join = thread::Builder::new()
            .name(format!("mock device {}", self.name))
            .spawn(move || {
                for block in block_rx.iter() {
                    if pace {
                        let frames = block.len() / channels;
                        spin_sleep::sleep(Duration::from_secs_f64(frames as f64 * frame_duration));
                    }
                    state.lock().record(block);
                    completion.signal();
                }
            })
            .map_err(|e| DeviceError::StreamBuild(e.to_string()))?;

        self.block_tx = Some(block_tx);
        self.join = Some(join);
        Ok(())
    }
}

impl DeviceSink for Sink {
    fn open(
        &mut self,
        format: &OutputFormat,
        completion: BlockCompletion,
    ) -> Result<(), DeviceError> {
        let span = span!(Level::INFO, "open device (mock)");
        let _enter = span.enter();

        match self.mode {
            Mode::Failing => {
                return Err(DeviceError::StreamBuild(format!(
                    "mock device {} refused to open",
                    self.name
                )))
            }
            Mode::Manual => {
                self.state.lock().completion = Some(completion);
            }
            Mode::Immediate | Mode::RealTime => self.spawn_device_thread(format, completion)?,
        }

        self.state.lock().open = true;
        info!(device = self.name, format = %format, "Opened device.");
        Ok(())
    }

    fn submit(&mut self, block: &[i16]) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DeviceError::Closed);
        }
        if !state.open {
            return Err(DeviceError::NotOpen);
        }
        state.submitted += 1;

        match self.block_tx.as_ref() {
            Some(block_tx) => {
                drop(state);
                block_tx
                    .send(block.to_vec())
                    .map_err(|_| DeviceError::Closed)
            }
            None => {
                state.pending.push_back(block.to_vec());
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.open = false;
            state.completion = None;
        }

        self.block_tx = None;
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                debug!(device = self.name, "Mock device thread panicked");
            }
        }
        info!(device = self.name, "Closed device.");
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// Inspects and drives a mock sink.
#[derive(Clone)]
pub struct Handle {
    state: Arc<Mutex<State>>,
}

impl Handle {
    /// Completes up to `count` pending blocks in submission order. Returns the
    /// number of blocks completed. Only manual sinks hold pending blocks.
    pub fn complete(&self, count: usize) -> usize {
        let (completed, completion) = {
            let mut state = self.state.lock();
            let mut completed = 0;
            while completed < count {
                let Some(block) = state.pending.pop_front() else {
                    break;
                };
                state.record(block);
                completed += 1;
            }
            (completed, state.completion.clone())
        };

        // Signal outside the lock so a woken render thread can submit freely.
        if let Some(completion) = completion {
            for _ in 0..completed {
                completion.signal();
            }
        }
        completed
    }

    /// Total number of blocks submitted.
    pub fn submitted(&self) -> usize {
        self.state.lock().submitted
    }

    /// Blocks submitted but not yet completed.
    pub fn pending_blocks(&self) -> Vec<Vec<i16>> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// The most recently completed blocks, oldest first.
    pub fn played_blocks(&self) -> Vec<Vec<i16>> {
        self.state.lock().played.iter().cloned().collect()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FreeBlocks;
    use crate::testutil::eventually;

    fn open(sink: &mut Sink, blocks: usize) -> Arc<FreeBlocks> {
        let free_blocks = Arc::new(FreeBlocks::new(blocks));
        sink.open(
            &OutputFormat::new(44100, 2).unwrap(),
            BlockCompletion::new(free_blocks.clone()),
        )
        .unwrap();
        free_blocks
    }

    #[test]
    fn test_submit_requires_open() {
        let mut sink = Sink::manual("mock");
        assert!(matches!(sink.submit(&[0; 4]), Err(DeviceError::NotOpen)));

        open(&mut sink, 2);
        sink.submit(&[0; 4]).unwrap();
        sink.close();
        assert!(matches!(sink.submit(&[0; 4]), Err(DeviceError::Closed)));
    }

    #[test]
    fn test_manual_completion_order() {
        let mut sink = Sink::manual("mock");
        let handle = sink.handle();
        let free_blocks = open(&mut sink, 2);
        assert!(handle.is_open());

        sink.submit(&[1, 1]).unwrap();
        sink.submit(&[2, 2]).unwrap();
        assert_eq!(handle.pending_blocks(), vec![vec![1, 1], vec![2, 2]]);

        assert_eq!(handle.complete(1), 1);
        assert_eq!(handle.played_blocks(), vec![vec![1, 1]]);
        assert_eq!(handle.pending_blocks(), vec![vec![2, 2]]);

        assert_eq!(handle.complete(5), 1);
        assert_eq!(handle.complete(5), 0);
        assert_eq!(handle.submitted(), 2);
        assert_eq!(free_blocks.available(), 2);
    }

    #[test]
    fn test_immediate_completes_in_background() {
        let mut sink = Sink::immediate("mock");
        let handle = sink.handle();
        let free_blocks = open(&mut sink, 4);

        sink.submit(&[7; 8]).unwrap();
        eventually(|| handle.played_blocks().len() == 1, "Block never played");
        assert_eq!(handle.played_blocks(), vec![vec![7; 8]]);
        assert!(handle.pending_blocks().is_empty());
        assert_eq!(free_blocks.available(), 4);

        sink.close();
        assert!(handle.is_closed());
        assert!(!handle.is_open());
    }

    #[test]
    fn test_real_time_paces_blocks() {
        let mut sink = Sink::real_time("mock");
        let handle = sink.handle();
        open(&mut sink, 4);

        // 441 stereo frames at 44.1kHz is 10ms.
        let start = std::time::Instant::now();
        sink.submit(&[0; 882]).unwrap();
        eventually(|| handle.played_blocks().len() == 1, "Block never played");
        assert!(start.elapsed() >= Duration::from_millis(9));
    }

    #[test]
    fn test_failing_open() {
        let mut sink = Sink::failing("mock-broken");
        let free_blocks = Arc::new(FreeBlocks::new(1));
        let result = sink.open(
            &OutputFormat::default(),
            BlockCompletion::new(free_blocks),
        );
        assert!(matches!(result, Err(DeviceError::StreamBuild(_))));
        assert!(!sink.handle().is_open());
    }

    #[test]
    fn test_display() {
        assert_eq!(Sink::manual("mock-a").to_string(), "mock-a (Mock)");
    }
}
