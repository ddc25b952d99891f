//! Detection cache: the latest believed-true set of on-screen elements.
//!
//! The cache is an immutable [`CacheSnapshot`] behind an `Arc`. A refresh
//! builds a complete new snapshot off-lock and swaps the pointer, so readers
//! either see the old snapshot or the new one, never a mix. Capture and
//! inference are serialised by a separate pipeline lock that readers never
//! touch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::errors::PilotResult;
use crate::perception::traits::{Detector, FrameSource};
use crate::perception::types::{CaptureRegion, DetectionRecord, Frame, Point, RawDetection};

#[derive(Debug, Default)]
pub struct CacheSnapshot {
    entries: HashMap<String, Vec<DetectionRecord>>,
    refreshed_at: Option<Instant>,
    generation: u64,
}

impl CacheSnapshot {
    fn build(raws: &[RawDetection], origin: Point, refreshed_at: Instant, generation: u64) -> Self {
        let mut entries: HashMap<String, Vec<DetectionRecord>> = HashMap::new();
        for raw in raws {
            match DetectionRecord::from_raw(raw, origin) {
                Some(rec) => entries.entry(rec.element_name.clone()).or_default().push(rec),
                None => tracing::debug!(label = %raw.label, bbox = ?raw.bbox, "dropping degenerate detection"),
            }
        }
        Self {
            entries,
            refreshed_at: Some(refreshed_at),
            generation,
        }
    }

    /// Records for `name` in detector output order; empty if unseen.
    pub fn get(&self, name: &str) -> &[DetectionRecord] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|v| !v.is_empty())
    }

    pub fn element_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DetectionRecord])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn detection_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn refreshed_at(&self) -> Option<Instant> {
        self.refreshed_at
    }

    /// 0 for the initial empty snapshot, +1 per committed refresh.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stale iff strictly older than `threshold`. Never-refreshed is stale.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        match self.refreshed_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) > threshold,
        }
    }
}

struct Pipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub refreshes: u64,
    pub failures: u64,
}

pub struct DetectionCache {
    current: Mutex<Arc<CacheSnapshot>>,
    pipeline: Mutex<Pipeline>,
    clock: Arc<dyn Clock>,
    confidence: f32,
    region: Option<CaptureRegion>,
    refreshes: AtomicU64,
    failures: AtomicU64,
}

impl DetectionCache {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        clock: Arc<dyn Clock>,
        confidence: f32,
        region: Option<CaptureRegion>,
    ) -> Self {
        Self {
            current: Mutex::new(Arc::new(CacheSnapshot::default())),
            pipeline: Mutex::new(Pipeline { source, detector }),
            clock,
            confidence,
            region,
            refreshes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// The snapshot as of the most recently completed refresh.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        self.snapshot().is_stale(now, threshold)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Capture from the configured source and replace the cache.
    /// On failure the previous snapshot stays in place and the error is returned.
    pub fn refresh(&self) -> PilotResult<Arc<CacheSnapshot>> {
        match self.refresh_inner(None, &|| true)? {
            Some(snapshot) => Ok(snapshot),
            None => Ok(self.snapshot()),
        }
    }

    /// Grab a frame from the configured source without running detection.
    pub fn capture(&self) -> PilotResult<Frame> {
        let pipeline = self.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
        pipeline.source.capture(self.region)
    }

    /// Run detection on an already-captured frame and replace the cache.
    pub fn refresh_with_frame(&self, frame: &Frame) -> PilotResult<Arc<CacheSnapshot>> {
        match self.refresh_inner(Some(frame), &|| true)? {
            Some(snapshot) => Ok(snapshot),
            None => Ok(self.snapshot()),
        }
    }

    /// Like [`refresh`](Self::refresh), but the result is only committed if
    /// `should_commit` still holds once inference finishes. `Ok(None)` means
    /// the pass completed and was discarded.
    pub fn refresh_guarded(
        &self,
        should_commit: &dyn Fn() -> bool,
    ) -> PilotResult<Option<Arc<CacheSnapshot>>> {
        self.refresh_inner(None, should_commit)
    }

    fn refresh_inner(
        &self,
        frame: Option<&Frame>,
        should_commit: &dyn Fn() -> bool,
    ) -> PilotResult<Option<Arc<CacheSnapshot>>> {
        let mut pipeline = self.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
        let started = self.clock.now();

        let result = match frame {
            Some(frame) => pipeline
                .detector
                .detect(frame, self.confidence)
                .map(|raws| (raws, frame.origin)),
            None => pipeline.source.capture(self.region).and_then(|frame| {
                pipeline
                    .detector
                    .detect(&frame, self.confidence)
                    .map(|raws| (raws, frame.origin))
            }),
        };

        let (raws, origin) = match result {
            Ok(ok) => ok,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "detection refresh failed; keeping previous cache");
                return Err(e);
            }
        };

        if !should_commit() {
            tracing::debug!(detections = raws.len(), "refresh discarded before commit");
            return Ok(None);
        }

        let snapshot = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            let next = Arc::new(CacheSnapshot::build(
                &raws,
                origin,
                started,
                current.generation + 1,
            ));
            *current = next.clone();
            next
        };
        drop(pipeline);

        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            generation = snapshot.generation(),
            elements = snapshot.entries.len(),
            detections = snapshot.detection_count(),
            "detection cache refreshed"
        );
        Ok(Some(snapshot))
    }
}
