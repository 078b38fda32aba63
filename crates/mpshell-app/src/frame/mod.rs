pub mod convert;

use std::collections::TryReserveError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::renderer::types::FrameDescriptor;

/// Spare buffers kept per session: one being written, one waiting, one being uploaded.
const POOL_SIZE: usize = 3;

/// One complete RGBA8 frame, tagged with the session that produced it.
pub struct FrameBuffer {
    pub generation: u64,
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl FrameBuffer {
    fn allocate(generation: u64, descriptor: &FrameDescriptor) -> Result<Self, TryReserveError> {
        let len = descriptor.rgba_len();
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len)?;
        pixels.resize(len, 0);
        Ok(Self {
            generation,
            sequence: 0,
            width: descriptor.width,
            height: descriptor.height,
            pixels,
        })
    }
}

struct ExchangeState {
    generation: u64,
    descriptor: Option<FrameDescriptor>,
    /// Latest complete frame not yet taken by the composite pass.
    ready: Option<FrameBuffer>,
    spare: Vec<FrameBuffer>,
}

/// Single-slot handoff between the frame writer and the composite pass.
///
/// The writer fills a spare buffer without holding the lock, then swaps it into
/// the ready slot. Publishing again before the composite pass takes the slot
/// replaces the waiting frame, so a burst of frames collapses to the latest.
/// Buffers move by value; whoever holds one owns it outright.
pub struct FrameExchange {
    state: Mutex<ExchangeState>,
    published: AtomicU64,
    dropped: AtomicU64,
    presented: AtomicU64,
}

/// Counters for log output and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExchangeStats {
    pub published: u64,
    pub dropped: u64,
    pub presented: u64,
}

impl FrameExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExchangeState {
                generation: 0,
                descriptor: None,
                ready: None,
                spare: Vec::new(),
            }),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            presented: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExchangeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate buffers for a new session and invalidate everything from the old one.
    /// On allocation failure the current session is left untouched.
    pub fn begin_session(&self, descriptor: FrameDescriptor) -> Result<u64, TryReserveError> {
        let mut fresh = Vec::with_capacity(POOL_SIZE);
        for _ in 0..POOL_SIZE {
            // tagged below, once the generation is known
            fresh.push(FrameBuffer::allocate(0, &descriptor)?);
        }

        let mut state = self.lock();
        state.generation += 1;
        let generation = state.generation;
        for frame in &mut fresh {
            frame.generation = generation;
        }
        state.descriptor = Some(descriptor);
        state.ready = None;
        state.spare = fresh;
        Ok(generation)
    }

    pub fn end_session(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.descriptor = None;
        state.ready = None;
        state.spare.clear();
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[cfg(test)]
    pub fn descriptor(&self) -> Option<FrameDescriptor> {
        self.lock().descriptor
    }

    /// Fill a spare buffer via `fill` and make it the ready frame.
    ///
    /// Returns false if `generation` is no longer current, either before or after
    /// filling; the buffer is discarded in that case.
    pub fn publish(&self, generation: u64, fill: impl FnOnce(&mut [u8])) -> bool {
        let (spare, descriptor) = {
            let mut state = self.lock();
            if state.generation != generation {
                return false;
            }
            let Some(descriptor) = state.descriptor else {
                return false;
            };
            (state.spare.pop(), descriptor)
        };

        let mut frame = match spare {
            Some(frame) => frame,
            None => match FrameBuffer::allocate(generation, &descriptor) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("Dropping frame, buffer allocation failed: {e}");
                    return false;
                }
            },
        };

        fill(&mut frame.pixels);
        frame.sequence = self.published.fetch_add(1, Ordering::Relaxed) + 1;

        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        if let Some(stale) = state.ready.replace(frame) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            state.spare.push(stale);
        }
        true
    }

    /// Take the latest complete frame, if one arrived since the last call.
    #[cfg(test)]
    pub fn take_latest(&self) -> Option<FrameBuffer> {
        let frame = self.lock().ready.take();
        if frame.is_some() {
            self.presented.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Take the ready frame only if it belongs to `generation`.
    ///
    /// A frame from a newer session stays in the slot until the composite pass
    /// has switched to that session's geometry.
    pub fn take_for(&self, generation: u64) -> Option<FrameBuffer> {
        let frame = {
            let mut state = self.lock();
            match &state.ready {
                Some(frame) if frame.generation == generation => state.ready.take(),
                _ => None,
            }
        };
        if frame.is_some() {
            self.presented.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Hand a frame back after upload. Frames from an ended session are freed.
    pub fn recycle(&self, frame: FrameBuffer) {
        let mut state = self.lock();
        if frame.generation == state.generation && state.spare.len() < POOL_SIZE {
            state.spare.push(frame);
        }
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        self.lock().ready.is_some()
    }

    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            presented: self.presented.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::renderer::types::RendererLimits;

    fn descriptor(width: i32, height: i32) -> FrameDescriptor {
        FrameDescriptor::validate(width, height, 4, 100, &RendererLimits::default()).unwrap()
    }

    #[test]
    fn nothing_pending_without_session() {
        let ex = FrameExchange::new();
        assert!(!ex.publish(0, |_| panic!("should not fill")));
        assert!(ex.take_latest().is_none());
        assert!(ex.descriptor().is_none());
    }

    #[test]
    fn burst_collapses_to_latest_frame() {
        let ex = FrameExchange::new();
        let generation = ex.begin_session(descriptor(2, 2)).unwrap();

        for value in 1..=3u8 {
            assert!(ex.publish(generation, |px| px.fill(value)));
        }

        let frame = ex.take_latest().expect("one frame ready");
        assert!(frame.pixels.iter().all(|&p| p == 3));
        assert_eq!(frame.sequence, 3);
        assert!(ex.take_latest().is_none());

        let stats = ex.stats();
        assert_eq!(stats.published, 3);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.presented, 1);
    }

    #[test]
    fn frames_carry_their_own_dimensions() {
        let ex = FrameExchange::new();
        let g1 = ex.begin_session(descriptor(4, 2)).unwrap();
        assert!(ex.publish(g1, |px| px.fill(1)));

        let g2 = ex.begin_session(descriptor(8, 6)).unwrap();
        assert!(g2 > g1);
        // the frame from the first session was discarded with it
        assert!(ex.take_latest().is_none());

        assert!(ex.publish(g2, |px| px.fill(2)));
        let frame = ex.take_latest().unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(frame.pixels.len(), 8 * 6 * 4);
    }

    #[test]
    fn next_session_frame_waits_for_its_geometry() {
        let ex = FrameExchange::new();
        let first = ex.begin_session(descriptor(4, 2)).unwrap();
        let second = ex.begin_session(descriptor(8, 6)).unwrap();
        assert!(ex.publish(second, |px| px.fill(7)));

        // the composite pass still holds the first session's geometry
        assert!(ex.take_for(first).is_none());
        assert!(ex.has_pending());
        assert_eq!(ex.stats().presented, 0);

        let frame = ex.take_for(second).expect("frame kept for its session");
        assert_eq!((frame.width, frame.height), (8, 6));
        assert!(frame.pixels.iter().all(|&p| p == 7));
        assert_eq!(ex.stats().presented, 1);
    }

    #[test]
    fn publish_for_stale_generation_is_rejected() {
        let ex = FrameExchange::new();
        let generation = ex.begin_session(descriptor(2, 2)).unwrap();
        ex.end_session();
        assert!(!ex.publish(generation, |px| px.fill(9)));
        assert!(!ex.has_pending());
    }

    #[test]
    fn ending_session_while_frame_is_held_is_safe() {
        let ex = FrameExchange::new();
        let generation = ex.begin_session(descriptor(2, 2)).unwrap();
        assert!(ex.publish(generation, |px| px.fill(5)));
        let held = ex.take_latest().unwrap();

        ex.end_session();
        // the holder still owns valid pixels
        assert!(held.pixels.iter().all(|&p| p == 5));
        ex.recycle(held);
        assert!(ex.descriptor().is_none());
    }

    #[test]
    fn recycled_buffers_are_reused() {
        let ex = FrameExchange::new();
        let generation = ex.begin_session(descriptor(2, 2)).unwrap();
        for round in 0..10u8 {
            assert!(ex.publish(generation, |px| px.fill(round)));
            let frame = ex.take_latest().unwrap();
            assert_eq!(frame.pixels[0], round);
            ex.recycle(frame);
        }
        assert_eq!(ex.stats().dropped, 0);
    }

    #[test]
    fn writer_thread_never_shows_torn_frames() {
        let ex = Arc::new(FrameExchange::new());
        let generation = ex.begin_session(descriptor(16, 16)).unwrap();

        let writer = {
            let ex = ex.clone();
            std::thread::spawn(move || {
                for value in 0..200u32 {
                    ex.publish(generation, |px| px.fill((value % 251) as u8));
                }
            })
        };

        let mut seen = 0;
        while !writer.is_finished() || ex.has_pending() {
            if let Some(frame) = ex.take_latest() {
                let first = frame.pixels[0];
                assert!(frame.pixels.iter().all(|&p| p == first), "torn frame");
                seen += 1;
                ex.recycle(frame);
            }
        }
        writer.join().unwrap();
        assert!(seen >= 1);
    }
}
