//! Effect controller: owns the effect parameters and the current result
//! slot, and re-runs the pipeline whenever either the photo or the
//! parameters change.
//!
//! Each run is a background thread. Runs are tagged with a capture
//! generation and a render generation; a run only publishes if both still
//! match the slot when it finishes, so the latest request always wins and
//! stale results are dropped instead of applied out of order.
//!
//! ```text
//! Idle → Captured → Processing → Ready ⇄ Processing (parameter change)
//!   ↑___________________________________|  (retake)
//! ```

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use image::DynamicImage;

use crate::geometry::{derive_geometry, EffectParams, IndicatorGeometry, Point};
use crate::pipeline::{Detected, Pipeline, Processor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectState {
    #[default]
    Idle,
    Captured,
    Processing,
    Ready,
}

/// Notifications for whoever renders the UI.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StateChanged(EffectState),
    /// A new processed image was published.
    ResultReady {
        generation: u64,
        image: Arc<DynamicImage>,
        applied: bool,
    },
    /// Range indicator moved or resized; `None` when there is no face.
    IndicatorChanged(Option<IndicatorGeometry>),
}

#[derive(Debug, Default)]
struct Slot {
    state: EffectState,
    capture_gen: u64,
    render_gen: u64,
    params: EffectParams,
    captured: Option<Arc<DynamicImage>>,
    detected: Option<Arc<Detected>>,
    processed: Option<Arc<DynamicImage>>,
    applied: bool,
}

struct RenderJob {
    image: Arc<DynamicImage>,
    detected: Arc<Detected>,
    params: EffectParams,
    capture_gen: u64,
    render_gen: u64,
}

#[derive(Clone)]
struct Shared {
    processor: Arc<dyn Processor>,
    slot: Arc<Mutex<Slot>>,
    events: Sender<ControllerEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: ControllerEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, slot: &mut Slot, state: EffectState) {
        if slot.state != state {
            slot.state = state;
            self.emit(ControllerEvent::StateChanged(state));
        }
    }

    fn indicator(&self, slot: &Slot) -> Option<IndicatorGeometry> {
        let detected = slot.detected.as_ref()?;
        derive_geometry(&detected.face, &slot.params, self.processor.settings())
            .ok()
            .map(|g| IndicatorGeometry::from_geometry(&g))
    }

    fn run_capture(&self, image: Arc<DynamicImage>, capture_gen: u64) {
        {
            let mut slot = self.lock();
            if slot.capture_gen != capture_gen {
                return;
            }
            self.set_state(&mut slot, EffectState::Processing);
        }

        let detection = self.processor.detect(&image);

        let job = {
            let mut slot = self.lock();
            if slot.capture_gen != capture_gen {
                log::debug!("discarding detection for superseded capture {}", capture_gen);
                return;
            }
            match detection {
                Ok(detected) => {
                    let detected = Arc::new(detected);
                    slot.detected = Some(detected.clone());
                    slot.render_gen += 1;
                    self.emit(ControllerEvent::IndicatorChanged(self.indicator(&slot)));
                    RenderJob {
                        image,
                        detected,
                        params: slot.params,
                        capture_gen,
                        render_gen: slot.render_gen,
                    }
                }
                Err(e) => {
                    log::warn!("detection failed, showing original photo: {}", e);
                    slot.render_gen += 1;
                    slot.processed = Some(image.clone());
                    slot.applied = false;
                    self.emit(ControllerEvent::ResultReady {
                        generation: slot.render_gen,
                        image,
                        applied: false,
                    });
                    self.set_state(&mut slot, EffectState::Ready);
                    return;
                }
            }
        };

        self.run_render(job);
    }

    fn run_render(&self, job: RenderJob) {
        let outcome = self.processor.render(&job.image, &job.detected, &job.params);

        let mut slot = self.lock();
        if slot.capture_gen != job.capture_gen || slot.render_gen != job.render_gen {
            log::debug!("discarding stale render {}", job.render_gen);
            return;
        }
        let image = Arc::new(outcome.image);
        slot.processed = Some(image.clone());
        slot.applied = outcome.applied;
        self.emit(ControllerEvent::ResultReady {
            generation: job.render_gen,
            image,
            applied: outcome.applied,
        });
        self.set_state(&mut slot, EffectState::Ready);
    }
}

pub struct EffectController {
    shared: Shared,
    workers: Vec<JoinHandle<()>>,
}

impl EffectController {
    /// Create a controller and the receiving end of its event channel.
    pub fn new(pipeline: Pipeline, params: EffectParams) -> (Self, Receiver<ControllerEvent>) {
        Self::with_processor(Arc::new(pipeline), params)
    }

    pub fn with_processor(
        processor: Arc<dyn Processor>,
        params: EffectParams,
    ) -> (Self, Receiver<ControllerEvent>) {
        let (tx, rx) = mpsc::channel();
        let slot = Slot {
            params,
            ..Slot::default()
        };
        let controller = Self {
            shared: Shared {
                processor,
                slot: Arc::new(Mutex::new(slot)),
                events: tx,
            },
            workers: Vec::new(),
        };
        (controller, rx)
    }

    /// A new photo arrived. Supersedes anything in flight for the previous
    /// one and returns the capture generation.
    pub fn capture(&mut self, image: DynamicImage) -> u64 {
        let image = Arc::new(image);
        let capture_gen = {
            let mut slot = self.shared.lock();
            slot.capture_gen += 1;
            slot.render_gen += 1;
            slot.captured = Some(image.clone());
            slot.detected = None;
            slot.processed = None;
            slot.applied = false;
            self.shared.set_state(&mut slot, EffectState::Captured);
            slot.capture_gen
        };
        log::info!("processing capture {}", capture_gen);

        let shared = self.shared.clone();
        self.spawn(move || shared.run_capture(image, capture_gen));
        capture_gen
    }

    /// Drop the current photo and go back to `Idle`. Runs still in flight
    /// finish but never publish.
    pub fn retake(&mut self) {
        let mut slot = self.shared.lock();
        slot.capture_gen += 1;
        slot.render_gen += 1;
        slot.captured = None;
        slot.detected = None;
        slot.processed = None;
        slot.applied = false;
        self.shared.emit(ControllerEvent::IndicatorChanged(None));
        self.shared.set_state(&mut slot, EffectState::Idle);
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.update_params(|p| p.intensity = intensity.clamp(0.0, 1.0));
    }

    pub fn set_face_effect_radius(&mut self, radius: f32) {
        self.update_params(|p| p.face_effect_radius = radius);
    }

    pub fn set_center_offset(&mut self, offset: Point) {
        self.update_params(|p| p.center_offset = offset);
    }

    pub fn set_params(&mut self, params: EffectParams) {
        self.update_params(|p| *p = params);
    }

    /// Re-run the warp step only; detection results of the current capture
    /// are reused. Before detection finishes the new values are simply
    /// picked up by the capture run.
    fn update_params(&mut self, update: impl FnOnce(&mut EffectParams)) {
        let job = {
            let mut slot = self.shared.lock();
            update(&mut slot.params);
            self.shared
                .emit(ControllerEvent::IndicatorChanged(self.shared.indicator(&slot)));

            let (Some(image), Some(detected)) = (slot.captured.clone(), slot.detected.clone())
            else {
                return;
            };
            slot.render_gen += 1;
            self.shared.set_state(&mut slot, EffectState::Processing);
            RenderJob {
                image,
                detected,
                params: slot.params,
                capture_gen: slot.capture_gen,
                render_gen: slot.render_gen,
            }
        };

        let shared = self.shared.clone();
        self.spawn(move || shared.run_render(job));
    }

    fn spawn(&mut self, run: impl FnOnce() + Send + 'static) {
        self.workers.retain(|h| !h.is_finished());
        self.workers.push(thread::spawn(run));
    }

    /// Block until every run issued so far has finished.
    pub fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("effect worker panicked");
            }
        }
    }

    pub fn state(&self) -> EffectState {
        self.shared.lock().state
    }

    pub fn params(&self) -> EffectParams {
        self.shared.lock().params
    }

    pub fn captured(&self) -> Option<Arc<DynamicImage>> {
        self.shared.lock().captured.clone()
    }

    /// The image to display, save or share.
    pub fn processed(&self) -> Option<Arc<DynamicImage>> {
        self.shared.lock().processed.clone()
    }

    /// Whether the published image carries the effect.
    pub fn effect_applied(&self) -> bool {
        self.shared.lock().applied
    }

    pub fn indicator(&self) -> Option<IndicatorGeometry> {
        let slot = self.shared.lock();
        self.shared.indicator(&slot)
    }
}

impl Drop for EffectController {
    fn drop(&mut self) {
        self.join();
    }
}
