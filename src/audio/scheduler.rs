//! Gapless playback scheduling.
//!
//! Every inbound chunk is queued to begin at `max(now, next_start_time)` so
//! consecutive chunks play back to back with no gap, then `next_start_time`
//! advances by the chunk duration. The live set tracks buffers between
//! scheduling and natural completion; an interrupt (barge-in) stops them all
//! at once and resets the clock tail to zero so no stale model audio can
//! overlap new user speech.

use crate::audio::playback::{HandleId, PlaybackChunk, PlaybackSink};
use crate::error::Result;
use std::collections::HashSet;

pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    next_start_time: f64,
    live: HashSet<HandleId>,
    held: bool,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            next_start_time: 0.0,
            live: HashSet::new(),
            held: false,
        }
    }

    /// Schedule a chunk for gapless playback.
    ///
    /// `next_start_time` is monotonically non-decreasing here; it only
    /// resets through [`interrupt`](Self::interrupt).
    pub fn enqueue(&mut self, chunk: PlaybackChunk) -> Result<()> {
        let start = self.sink.now().max(self.next_start_time);
        let duration = chunk.duration_secs();
        let id = self.sink.schedule(chunk, start)?;
        self.next_start_time = start + duration;
        self.live.insert(id);
        Ok(())
    }

    /// A buffer finished playing on its own; drop it from the live set.
    pub fn mark_finished(&mut self, id: HandleId) {
        self.live.remove(&id);
    }

    /// Barge-in: stop every live buffer immediately and reset the clock
    /// tail, guaranteeing no stale audio overlaps what comes next.
    pub fn interrupt(&mut self) {
        for id in self.live.drain() {
            self.sink.stop(id);
        }
        self.next_start_time = 0.0;
    }

    /// Suspend or resume the sink clock. Nothing is discarded; resuming
    /// continues exactly where playback left off.
    pub fn set_held(&mut self, held: bool) {
        if self.held == held {
            return;
        }
        self.held = held;
        if held {
            self.sink.suspend();
        } else {
            self.sink.resume();
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::{MockPlaybackSink, MockSinkHandle};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn scheduler() -> (
        PlaybackScheduler,
        MockSinkHandle,
        UnboundedReceiver<HandleId>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = MockPlaybackSink::new(tx);
        let handle = sink.handle();
        (PlaybackScheduler::new(Box::new(sink)), handle, rx)
    }

    fn chunk(duration_secs: f64) -> PlaybackChunk {
        let samples = vec![0i16; (duration_secs * 24000.0) as usize];
        PlaybackChunk::from_samples(samples, 24000)
    }

    #[test]
    fn test_chunks_schedule_back_to_back() {
        let (mut scheduler, handle, _rx) = scheduler();

        scheduler.enqueue(chunk(1.0)).unwrap();
        scheduler.enqueue(chunk(0.5)).unwrap();
        scheduler.enqueue(chunk(0.25)).unwrap();

        let state = handle.lock().unwrap();
        let starts: Vec<f64> = state.scheduled.iter().map(|&(_, start, _)| start).collect();
        assert_eq!(starts, vec![0.0, 1.0, 1.5]);
        assert!((scheduler.next_start_time() - 1.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_late_chunk_starts_at_current_time() {
        let (mut scheduler, handle, _rx) = scheduler();

        scheduler.enqueue(chunk(0.5)).unwrap();
        // The queue drains and time moves past its tail.
        MockPlaybackSink::advance(&handle, 2.0);

        scheduler.enqueue(chunk(0.5)).unwrap();
        let state = handle.lock().unwrap();
        let (_, start, _) = *state.scheduled.last().unwrap();
        assert!((start - 2.0).abs() < f64::EPSILON);
        assert!((scheduler.next_start_time() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_next_start_time_is_monotonic_during_playback() {
        let (mut scheduler, handle, _rx) = scheduler();

        let mut previous = scheduler.next_start_time();
        for _ in 0..5 {
            scheduler.enqueue(chunk(0.1)).unwrap();
            assert!(scheduler.next_start_time() >= previous);
            previous = scheduler.next_start_time();
            MockPlaybackSink::advance(&handle, 0.05);
        }
    }

    #[test]
    fn test_interrupt_stops_everything_and_resets_clock_tail() {
        let (mut scheduler, handle, _rx) = scheduler();

        for _ in 0..4 {
            scheduler.enqueue(chunk(1.0)).unwrap();
        }
        assert_eq!(scheduler.live_count(), 4);

        scheduler.interrupt();

        assert_eq!(scheduler.live_count(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
        let state = handle.lock().unwrap();
        assert!(state.scheduled.is_empty());
        assert_eq!(state.stopped.len(), 4);
    }

    #[test]
    fn test_interrupt_with_empty_queue_is_safe() {
        let (mut scheduler, _handle, _rx) = scheduler();
        scheduler.interrupt();
        assert_eq!(scheduler.live_count(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
    }

    #[tokio::test]
    async fn test_natural_completion_shrinks_live_set() {
        let (mut scheduler, handle, mut rx) = scheduler();

        scheduler.enqueue(chunk(0.5)).unwrap();
        scheduler.enqueue(chunk(0.5)).unwrap();
        MockPlaybackSink::advance(&handle, 0.6);

        let finished = rx.recv().await.unwrap();
        scheduler.mark_finished(finished);

        assert_eq!(scheduler.live_count(), 1);
        // Completion does not touch the clock tail.
        assert!((scheduler.next_start_time() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hold_toggle_leaves_schedule_untouched() {
        let (mut scheduler, handle, _rx) = scheduler();

        scheduler.enqueue(chunk(1.0)).unwrap();
        scheduler.enqueue(chunk(1.0)).unwrap();
        let before_live = scheduler.live_count();
        let before_tail = scheduler.next_start_time();

        scheduler.set_held(true);
        assert!(handle.lock().unwrap().suspended);
        scheduler.set_held(false);
        assert!(!handle.lock().unwrap().suspended);

        assert_eq!(scheduler.live_count(), before_live);
        assert!((scheduler.next_start_time() - before_tail).abs() < f64::EPSILON);
        assert_eq!(handle.lock().unwrap().scheduled.len(), 2);
        assert!(handle.lock().unwrap().stopped.is_empty());
    }

    #[test]
    fn test_hold_is_idempotent() {
        let (mut scheduler, handle, _rx) = scheduler();
        scheduler.set_held(true);
        scheduler.set_held(true);
        assert!(scheduler.is_held());
        scheduler.set_held(false);
        assert!(!handle.lock().unwrap().suspended);
    }

    #[test]
    fn test_playback_continues_where_hold_left_off() {
        let (mut scheduler, handle, _rx) = scheduler();

        scheduler.enqueue(chunk(2.0)).unwrap();
        MockPlaybackSink::advance(&handle, 0.5);

        scheduler.set_held(true);
        MockPlaybackSink::advance(&handle, 10.0); // frozen, no effect
        scheduler.set_held(false);

        // A chunk queued after resume lands at the original tail, not 10s later.
        scheduler.enqueue(chunk(1.0)).unwrap();
        let state = handle.lock().unwrap();
        let (_, start, _) = *state.scheduled.last().unwrap();
        assert!((start - 2.0).abs() < f64::EPSILON);
    }
}
