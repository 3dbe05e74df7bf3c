//! Audio downmix stage.
//!
//! Multi-channel blocks are folded to mono on a dedicated thread so the frame
//! loop never waits on audio math. Blocks travel by value over bounded
//! channels; a `Stop` message ends the thread and drops its receiver.

use std::thread::JoinHandle;

use clipfx_common::{FxError, FxResult};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Per-channel downmix weights by channel index (L, R, C, LFE, Ls, Rs).
pub const DOWNMIX_WEIGHTS: [f32; 6] = [0.85, 0.85, 0.85, 0.3, 0.5, 0.5];

/// Planar audio: one sample vector per channel, all of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiChannelBlock {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl MultiChannelBlock {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames in the block; the shortest channel wins if lengths disagree.
    pub fn frame_count(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }
}

/// One downmixed block.
#[derive(Debug, Clone, PartialEq)]
pub struct MonoBlock {
    pub samples: Vec<f32>,
    pub frame_count: usize,
}

/// Messages accepted by the downmix thread.
#[derive(Debug)]
pub enum DownmixMessage {
    AudioBlock(MultiChannelBlock),
    Stop,
}

/// Weight applied to channel `channel` of an `n`-channel layout.
pub fn channel_weight(channel: usize, channel_count: usize) -> f32 {
    DOWNMIX_WEIGHTS
        .get(channel)
        .copied()
        .unwrap_or(1.0 / channel_count.max(1) as f32)
}

/// Fold `block` to mono. Mono input is passed through untouched.
pub fn downmix(block: MultiChannelBlock) -> MonoBlock {
    let frame_count = block.frame_count();
    let n = block.channel_count();

    if n == 1 {
        let mut samples = block.channels.into_iter().next().unwrap_or_default();
        samples.truncate(frame_count);
        return MonoBlock {
            samples,
            frame_count,
        };
    }

    let mut samples = vec![0.0f32; frame_count];
    for (ch, input) in block.channels.iter().enumerate() {
        let weight = channel_weight(ch, n);
        for (out, sample) in samples.iter_mut().zip(input) {
            *out += sample * weight;
        }
    }
    MonoBlock {
        samples,
        frame_count,
    }
}

/// Handle to a running downmix thread.
///
/// Dropping the handle without `stop` detaches the thread; it exits once it
/// sees either channel disconnect.
#[derive(Debug)]
pub struct DownmixStage {
    input: Sender<DownmixMessage>,
    output: Receiver<MonoBlock>,
    handle: Option<JoinHandle<u64>>,
}

impl DownmixStage {
    /// Start the thread. `capacity` bounds both channels.
    pub fn spawn(capacity: usize) -> FxResult<Self> {
        let capacity = capacity.max(1);
        let (input, input_rx) = bounded::<DownmixMessage>(capacity);
        let (output_tx, output) = bounded::<MonoBlock>(capacity);

        let handle = std::thread::Builder::new()
            .name("clipfx-downmix".to_string())
            .spawn(move || run_downmix(input_rx, output_tx))
            .map_err(|e| FxError::resource(format!("Failed to spawn downmix thread: {e}")))?;

        tracing::debug!(capacity, "Downmix stage started");
        Ok(Self {
            input,
            output,
            handle: Some(handle),
        })
    }

    /// Queue a block, blocking while the input channel is full.
    ///
    /// Fails once the stage has stopped.
    pub fn send(&self, block: MultiChannelBlock) -> FxResult<()> {
        self.input
            .send(DownmixMessage::AudioBlock(block))
            .map_err(|_| FxError::invalid_state("Downmix stage has stopped"))
    }

    /// Next mono block if one is ready.
    pub fn try_recv(&self) -> Option<MonoBlock> {
        match self.output.try_recv() {
            Ok(block) => Some(block),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next mono block. `None` once the thread has exited and
    /// everything it produced has been drained.
    pub fn recv(&self) -> Option<MonoBlock> {
        self.output.recv().ok()
    }

    /// Every mono block ready right now.
    pub fn drain_ready(&self) -> Vec<MonoBlock> {
        self.output.try_iter().collect()
    }

    /// Ask the thread to exit. Blocks queued before the stop are still
    /// processed; anything sent after it is rejected.
    pub fn stop(&self) {
        if self.input.send(DownmixMessage::Stop).is_err() {
            tracing::trace!("Downmix stage already stopped");
        }
    }

    /// Stop the thread while draining its output, so a full output channel
    /// cannot hold up the stop message. Returns every block the thread
    /// emitted that had not been received yet.
    pub fn stop_and_drain(&mut self) -> FxResult<Vec<MonoBlock>> {
        let mut drained = Vec::new();
        loop {
            crossbeam_channel::select! {
                send(self.input, DownmixMessage::Stop) -> _sent => break,
                recv(self.output) -> block => match block {
                    Ok(block) => drained.push(block),
                    // Thread already gone; the stop send fails right away.
                    Err(_) => std::thread::yield_now(),
                },
            }
        }
        self.join()?;
        drained.extend(self.output.try_iter());
        Ok(drained)
    }

    /// Sender for producers on other threads. Sends fail once the stage has
    /// stopped.
    pub fn input(&self) -> Sender<DownmixMessage> {
        self.input.clone()
    }

    /// Wait for the thread to exit. Returns the number of blocks emitted.
    pub fn join(&mut self) -> FxResult<u64> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| FxError::invalid_state("Downmix thread panicked")),
            None => Ok(0),
        }
    }
}

fn run_downmix(input: Receiver<DownmixMessage>, output: Sender<MonoBlock>) -> u64 {
    let mut emitted = 0u64;
    while let Ok(message) = input.recv() {
        match message {
            DownmixMessage::AudioBlock(block) => {
                if block.frame_count() == 0 || block.channel_count() == 0 {
                    continue;
                }
                if output.send(downmix(block)).is_err() {
                    tracing::debug!("Downmix output closed");
                    break;
                }
                emitted += 1;
            }
            DownmixMessage::Stop => break,
        }
    }
    tracing::debug!(emitted, "Downmix stage exiting");
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn block(channels: usize, frames: usize, value: f32) -> MultiChannelBlock {
        MultiChannelBlock::new(vec![vec![value; frames]; channels], 48_000)
    }

    #[test]
    fn test_weights_table_and_fallback() {
        assert_eq!(channel_weight(0, 2), 0.85);
        assert_eq!(channel_weight(3, 6), 0.3);
        assert_eq!(channel_weight(5, 6), 0.5);
        assert_eq!(channel_weight(6, 8), 1.0 / 8.0);
        assert_eq!(channel_weight(7, 8), 1.0 / 8.0);
    }

    #[test]
    fn test_mono_passes_through() {
        let input = MultiChannelBlock::new(vec![vec![0.1, -0.2, 0.3]], 44_100);
        let mono = downmix(input);
        assert_eq!(mono.samples, vec![0.1, -0.2, 0.3]);
        assert_eq!(mono.frame_count, 3);
    }

    #[test]
    fn test_stereo_is_weighted_sum() {
        let input = MultiChannelBlock::new(vec![vec![1.0, 0.5], vec![1.0, -0.5]], 48_000);
        let mono = downmix(input);
        assert!((mono.samples[0] - 1.7).abs() < 1e-6);
        assert!(mono.samples[1].abs() < 1e-6);
    }

    #[test]
    fn test_five_one_layout() {
        let mono = downmix(block(6, 2, 1.0));
        let expected: f32 = DOWNMIX_WEIGHTS.iter().sum();
        assert!((mono.samples[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_stage_emits_each_block() {
        let mut stage = DownmixStage::spawn(4).unwrap();
        stage.send(block(2, 128, 0.5)).unwrap();
        stage.send(block(2, 64, 0.5)).unwrap();

        let first = stage.recv().unwrap();
        let second = stage.recv().unwrap();
        assert_eq!(first.frame_count, 128);
        assert_eq!(second.frame_count, 64);

        stage.stop();
        assert_eq!(stage.join().unwrap(), 2);
    }

    #[test]
    fn test_empty_blocks_are_skipped() {
        let mut stage = DownmixStage::spawn(4).unwrap();
        stage.send(block(2, 0, 0.0)).unwrap();
        stage.send(MultiChannelBlock::new(vec![], 48_000)).unwrap();
        stage.send(block(1, 8, 0.25)).unwrap();
        stage.stop();
        assert_eq!(stage.join().unwrap(), 1);

        let blocks: Vec<_> = std::iter::from_fn(|| stage.recv()).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples, vec![0.25; 8]);
    }

    #[test]
    fn test_stop_after_first_block_drops_the_second() {
        let mut stage = DownmixStage::spawn(4).unwrap();
        stage.send(block(2, 16, 0.5)).unwrap();
        stage.stop();
        // Either queued behind the stop or rejected outright.
        let _ = stage.send(block(2, 32, 0.5));
        assert_eq!(stage.join().unwrap(), 1);

        assert!(stage.send(block(2, 16, 0.5)).is_err());

        let first = stage.recv().unwrap();
        assert_eq!(first.frame_count, 16);
        assert!(stage.recv().is_none());
    }

    #[test]
    fn test_stop_and_drain_with_full_output() {
        let mut stage = DownmixStage::spawn(1).unwrap();
        let producer = stage.input();
        let feeder = std::thread::spawn(move || {
            let mut sent = 0;
            for _ in 0..8 {
                if producer
                    .send(DownmixMessage::AudioBlock(block(2, 4, 0.1)))
                    .is_err()
                {
                    break;
                }
                sent += 1;
            }
            sent
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        let drained = stage.stop_and_drain().unwrap();
        let sent = feeder.join().unwrap();
        assert!(drained.len() <= sent);
        assert!(drained.iter().all(|b| b.frame_count == 4));
        assert!(stage.send(block(2, 4, 0.1)).is_err());
    }

    proptest! {
        #[test]
        fn prop_output_length_matches_shortest_channel(
            lens in proptest::collection::vec(0usize..64, 1..8),
        ) {
            let channels = lens.iter().map(|len| vec![0.5f32; *len]).collect();
            let mono = downmix(MultiChannelBlock::new(channels, 48_000));
            let shortest = *lens.iter().min().unwrap();
            prop_assert_eq!(mono.frame_count, shortest);
            prop_assert_eq!(mono.samples.len(), shortest);
        }
    }
}
