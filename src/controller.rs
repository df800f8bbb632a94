//! Debounced generation controller.
//!
//! Input changes (text, dark color, light color) restart a quiet-period timer. When the timer
//! fires the pipeline runs once with the latest inputs on the blocking pool. A newer request
//! never cancels a generation that already started, but only the most recently started
//! generation may publish its result: last request wins, not last response.
//!
//! ```text
//! Idle --input--> Pending --timer--> Generating --result--> Idle
//!                  ^   |                  |
//!                  +---+ input            +--input--> Pending (old result discarded if superseded)
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use image::Rgba;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use crate::color;
use crate::config::GeneratorConfig;
use crate::error::{QrError, Result};
use crate::export;
use crate::qrcode::QrCode;
use crate::render::RenderedQr;

/// Inputs of one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub text: String,
    pub dark_color: String,
    pub light_color: String,
}

/// Something that turns a request into an image. Runs on a blocking thread.
pub trait Pipeline: Send + Sync + 'static {
    fn generate(&self, request: &GenerationRequest) -> Result<RenderedQr>;
}

/// The real pipeline: segment, encode, build and render.
#[derive(Debug, Clone)]
pub struct QrPipeline {
    config: GeneratorConfig,
    dark_fallback: Rgba<u8>,
    light_fallback: Rgba<u8>,
}

impl QrPipeline {
    pub fn new(config: GeneratorConfig) -> Self {
        let dark_fallback = color::resolve_or(&config.dark_color, Rgba([0, 0, 0, 255]));
        let light_fallback = color::resolve_or(&config.light_color, Rgba([255, 255, 255, 255]));
        Self { config, dark_fallback, light_fallback }
    }
}

impl Pipeline for QrPipeline {
    fn generate(&self, request: &GenerationRequest) -> Result<RenderedQr> {
        self.config.validate()?;
        let qr = QrCode::encode_text_with(&request.text, &self.config.encode_options())?;
        let dark = color::resolve_or(&request.dark_color, self.dark_fallback);
        let light = color::resolve_or(&request.light_color, self.light_fallback);
        let scale = self.config.pixels_per_module_for(qr.size());
        Ok(RenderedQr::new(&qr, dark, light, self.config.quiet_zone, scale))
    }
}

/// Where the controller is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// A debounce timer is armed.
    Pending,
    /// A generation is running and no timer is armed.
    Generating,
}

/// What the presentation layer should show.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub phase: Phase,
    /// Image on display. Kept when a later generation fails; cleared by blank text.
    pub image: Option<Arc<RenderedQr>>,
    /// Failure of the latest applied generation, if it failed.
    pub error: Option<Arc<QrError>>,
    /// Number of generations whose outcome was applied.
    pub completed: u64,
}

struct State {
    inputs: GenerationRequest,
    /// Id of the most recent input change.
    next_id: u64,
    /// Id of the most recently started generation.
    latest_started: u64,
    in_flight: usize,
    timer: Option<JoinHandle<()>>,
    disposed: bool,
}

impl State {
    fn phase(&self) -> Phase {
        if self.timer.is_some() {
            Phase::Pending
        } else if self.in_flight > 0 {
            Phase::Generating
        } else {
            Phase::Idle
        }
    }
}

struct Shared<P> {
    pipeline: P,
    debounce: Duration,
    state: Mutex<State>,
    snapshot: watch::Sender<Snapshot>,
}

impl<P: Pipeline> Shared<P> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State, update: impl FnOnce(&mut Snapshot)) {
        let phase = state.phase();
        self.snapshot.send_modify(|snap| {
            snap.phase = phase;
            update(snap);
        });
    }

    /// Body of one debounce cycle.
    async fn run(self: Arc<Self>, id: u64) {
        tokio::time::sleep(self.debounce).await;
        let Some(request) = self.start(id) else {
            return;
        };
        tracing::info!(id, chars = request.text.chars().count(), "Generation started");
        let worker = Arc::clone(&self);
        let outcome = tokio::task::spawn_blocking(move || worker.pipeline.generate(&request)).await;
        self.finish(id, outcome);
    }

    fn start(&self, id: u64) -> Option<GenerationRequest> {
        let mut state = self.lock();
        if state.disposed || state.next_id != id {
            return None;
        }
        state.timer = None;
        state.latest_started = id;
        if state.inputs.text.trim().is_empty() {
            tracing::debug!(id, "Blank text, clearing output without generating");
            self.publish(&state, |snap| {
                snap.image = None;
                snap.error = None;
                snap.completed += 1;
            });
            return None;
        }
        state.in_flight += 1;
        self.publish(&state, |_| {});
        Some(state.inputs.clone())
    }

    fn finish(&self, id: u64, outcome: std::result::Result<Result<RenderedQr>, JoinError>) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.disposed {
            tracing::debug!(id, "Discarding result that arrived after dispose");
            return;
        }
        if state.latest_started != id {
            tracing::debug!(id, latest = state.latest_started, "Discarding superseded result");
            self.publish(&state, |_| {});
            return;
        }
        let outcome = outcome
            .unwrap_or_else(|e| Err(QrError::Internal(format!("generation task failed: {}", e))));
        match outcome {
            Ok(rendered) => {
                tracing::info!(
                    id,
                    version = rendered.version.value(),
                    width = rendered.width(),
                    "Generation applied"
                );
                self.publish(&state, |snap| {
                    snap.image = Some(Arc::new(rendered));
                    snap.error = None;
                    snap.completed += 1;
                });
            }
            Err(e) => {
                if matches!(e, QrError::Internal(_)) {
                    tracing::error!(id, error = %e, "Generation aborted, keeping previous image");
                } else {
                    tracing::warn!(id, error = %e, "Generation failed, keeping previous image");
                }
                self.publish(&state, |snap| {
                    snap.error = Some(Arc::new(e));
                    snap.completed += 1;
                });
            }
        }
    }
}

/// Owns the in-flight request state between the UI and the pipeline.
///
/// Dropping the controller disposes it.
pub struct GenerationController<P: Pipeline = QrPipeline> {
    shared: Arc<Shared<P>>,
    runtime: Handle,
}

impl GenerationController<QrPipeline> {
    /// Controller running the real pipeline with `config`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn from_config(config: GeneratorConfig) -> Self {
        let pipeline = QrPipeline::new(config.clone());
        Self::new(pipeline, &config)
    }
}

impl<P: Pipeline> GenerationController<P> {
    /// Takes the debounce period and the initial colors from `config`. Text starts empty.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(pipeline: P, config: &GeneratorConfig) -> Self {
        let inputs = GenerationRequest {
            text: String::new(),
            dark_color: config.dark_color.clone(),
            light_color: config.light_color.clone(),
        };
        let (snapshot, _) = watch::channel(Snapshot::default());
        let state = State {
            inputs,
            next_id: 0,
            latest_started: 0,
            in_flight: 0,
            timer: None,
            disposed: false,
        };
        let shared = Shared {
            pipeline,
            debounce: config.debounce(),
            state: Mutex::new(state),
            snapshot,
        };
        Self { shared: Arc::new(shared), runtime: Handle::current() }
    }

    /// Replaces all three inputs and restarts the debounce window.
    pub fn request_generation(
        &self,
        text: impl Into<String>,
        dark_color: impl Into<String>,
        light_color: impl Into<String>,
    ) {
        let (text, dark_color, light_color) = (text.into(), dark_color.into(), light_color.into());
        self.update(|inputs| {
            inputs.text = text;
            inputs.dark_color = dark_color;
            inputs.light_color = light_color;
        });
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|inputs| inputs.text = text);
    }

    pub fn set_dark_color(&self, color: impl Into<String>) {
        let color = color.into();
        self.update(|inputs| inputs.dark_color = color);
    }

    pub fn set_light_color(&self, color: impl Into<String>) {
        let color = color.into();
        self.update(|inputs| inputs.light_color = color);
    }

    /// Switches both colors to a named preset as one change. Returns `false` for unknown names.
    pub fn apply_preset(&self, name: &str) -> bool {
        let Some(preset) = color::preset(name) else {
            return false;
        };
        self.update(|inputs| {
            inputs.dark_color = preset.dark.to_string();
            inputs.light_color = preset.light.to_string();
        });
        true
    }

    fn update(&self, change: impl FnOnce(&mut GenerationRequest)) {
        let mut state = self.shared.lock();
        if state.disposed {
            tracing::debug!("Ignoring input change on disposed controller");
            return;
        }
        change(&mut state.inputs);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.next_id += 1;
        let id = state.next_id;
        state.timer = Some(self.runtime.spawn(Arc::clone(&self.shared).run(id)));
        self.shared.publish(&state, |_| {});
    }

    /// Current inputs, including changes still waiting for the timer.
    pub fn inputs(&self) -> GenerationRequest {
        self.shared.lock().inputs.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase()
    }

    /// Whether any generation is running, superseded ones included.
    pub fn is_generating(&self) -> bool {
        self.shared.lock().in_flight > 0
    }

    pub fn current_image(&self) -> Option<Arc<RenderedQr>> {
        self.shared.snapshot.borrow().image.clone()
    }

    /// Saves the displayed image as `qr-code-<millis>.png` under `directory`.
    /// Returns `Ok(None)` when nothing is displayed.
    pub fn download(&self, directory: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        match self.current_image() {
            Some(rendered) => export::save_png(&rendered.image, directory).map(Some),
            None => Ok(None),
        }
    }

    /// Cancels the pending timer and drops any result still on its way. Further input is ignored.
    pub fn dispose(&self) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        tracing::info!(in_flight = state.in_flight, "Generation controller disposed");
        self.shared.publish(&state, |_| {});
    }
}

impl<P: Pipeline> Drop for GenerationController<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Condvar;

    use crate::qrcode::QrCodeEcc;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn config() -> GeneratorConfig {
        GeneratorConfig { debounce_ms: 300, ..GeneratorConfig::default() }
    }

    /// Blocking pipelines hold back the paused clock, so tests using them run in real time.
    fn real_time_config() -> GeneratorConfig {
        GeneratorConfig { debounce_ms: 50, ..GeneratorConfig::default() }
    }

    /// Renders at one pixel per character so tests can tell results apart by width.
    fn render_marked(text: &str) -> Result<RenderedQr> {
        let qr = QrCode::encode_text(text, QrCodeEcc::Low)?;
        let (dark, light) = (Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]));
        Ok(RenderedQr::new(&qr, dark, light, 0, text.len() as u32))
    }

    #[derive(Default)]
    struct RecordingPipeline {
        calls: Mutex<Vec<GenerationRequest>>,
    }

    impl Pipeline for Arc<RecordingPipeline> {
        fn generate(&self, request: &GenerationRequest) -> Result<RenderedQr> {
            self.calls.lock().unwrap().push(request.clone());
            render_marked(&request.text)
        }
    }

    impl RecordingPipeline {
        fn texts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|r| r.text.clone()).collect()
        }
    }

    /// Blocks each generation until the test releases its text.
    #[derive(Default)]
    struct GatedPipeline {
        entered: Mutex<Vec<String>>,
        released: Mutex<HashSet<String>>,
        gate: Condvar,
    }

    impl GatedPipeline {
        fn release(&self, text: &str) {
            self.released.lock().unwrap().insert(text.to_string());
            self.gate.notify_all();
        }

        fn entered(&self) -> usize {
            self.entered.lock().unwrap().len()
        }
    }

    impl Pipeline for Arc<GatedPipeline> {
        fn generate(&self, request: &GenerationRequest) -> Result<RenderedQr> {
            self.entered.lock().unwrap().push(request.text.clone());
            let mut released = self.released.lock().unwrap();
            while !released.contains(&request.text) {
                released = self.gate.wait(released).unwrap();
            }
            drop(released);
            render_marked(&request.text)
        }
    }

    async fn until(mut cond: impl FnMut() -> bool) {
        for _ in 0..5_000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    async fn wait_completed(rx: &mut watch::Receiver<Snapshot>, n: u64) -> Snapshot {
        let completed = rx.wait_for(|s| s.completed >= n);
        tokio::time::timeout(Duration::from_secs(10), completed)
            .await
            .expect("generation did not complete")
            .unwrap()
            .clone()
    }

    #[tokio::test(start_paused = true)]
    async fn blank_text_skips_pipeline() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &config());
        let mut rx = controller.subscribe();

        controller.request_generation("", "#000000", "#ffffff");
        let snap = wait_completed(&mut rx, 1).await;

        assert!(snap.image.is_none());
        assert!(snap.error.is_none());
        assert_eq!(snap.phase, Phase::Idle);
        assert!(pipeline.texts().is_empty());

        controller.set_text("   ");
        wait_completed(&mut rx, 2).await;
        assert!(pipeline.texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_typing_generates_once_with_final_text() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &config());
        let mut rx = controller.subscribe();

        controller.set_text("a");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_text("ab");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_text("abc");
        assert_eq!(controller.phase(), Phase::Pending);

        let snap = wait_completed(&mut rx, 1).await;
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(pipeline.texts(), vec!["abc".to_string()]);
        assert_eq!(snap.image.unwrap().pixels_per_module, 3);
        assert_eq!(controller.snapshot().completed, 1);
        assert_eq!(controller.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_before_the_window_elapses() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &config());

        controller.set_text("hello");
        tokio::time::sleep(DEBOUNCE - Duration::from_millis(1)).await;
        assert!(pipeline.texts().is_empty());
        controller.set_text("hello!");
        tokio::time::sleep(DEBOUNCE - Duration::from_millis(1)).await;
        assert!(pipeline.texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn color_change_alone_reuses_text() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &config());
        let mut rx = controller.subscribe();

        controller.request_generation("hello", "#000000", "#ffffff");
        wait_completed(&mut rx, 1).await;
        controller.set_dark_color("#ff0000");
        wait_completed(&mut rx, 2).await;
        tokio::time::sleep(DEBOUNCE * 3).await;

        let calls = pipeline.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].text, "hello");
        assert_eq!(calls[1].dark_color, "#ff0000");
        assert_eq!(calls[1].light_color, "#ffffff");
    }

    #[tokio::test(start_paused = true)]
    async fn preset_changes_both_colors_in_one_generation() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &config());
        let mut rx = controller.subscribe();

        controller.set_text("preset");
        assert!(controller.apply_preset("Forest"));
        assert!(!controller.apply_preset("Neon"));
        wait_completed(&mut rx, 1).await;
        tokio::time::sleep(DEBOUNCE * 3).await;

        let calls = pipeline.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].dark_color, "#166534");
        assert_eq!(calls[0].light_color, "#dcfce7");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stale_result_never_overwrites_newer_one() {
        let pipeline = Arc::new(GatedPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &real_time_config());
        let mut rx = controller.subscribe();

        controller.set_text("first");
        until(|| pipeline.entered() == 1).await;
        assert_eq!(controller.phase(), Phase::Generating);

        // Queues its own cycle without cancelling "first".
        controller.set_text("second");
        assert_eq!(controller.phase(), Phase::Pending);
        until(|| pipeline.entered() == 2).await;

        pipeline.release("second");
        let snap = wait_completed(&mut rx, 1).await;
        assert_eq!(snap.image.unwrap().pixels_per_module, 6);

        pipeline.release("first");
        until(|| !controller.is_generating()).await;
        let snap = controller.snapshot();
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.image.unwrap().pixels_per_module, 6);
        assert_eq!(snap.phase, Phase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn in_order_results_are_both_applied() {
        let pipeline = Arc::new(GatedPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &real_time_config());
        let mut rx = controller.subscribe();

        controller.set_text("first");
        until(|| pipeline.entered() == 1).await;
        pipeline.release("first");
        let snap = wait_completed(&mut rx, 1).await;
        assert_eq!(snap.image.unwrap().pixels_per_module, 5);

        controller.set_text("second");
        until(|| pipeline.entered() == 2).await;
        pipeline.release("second");
        let snap = wait_completed(&mut rx, 2).await;
        assert_eq!(snap.image.unwrap().pixels_per_module, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_pending_timer() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &config());

        controller.set_text("never");
        controller.dispose();
        controller.set_text("ignored");
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert!(pipeline.texts().is_empty());
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.inputs().text, "never");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dispose_discards_in_flight_result() {
        let pipeline = Arc::new(GatedPipeline::default());
        let controller = GenerationController::new(Arc::clone(&pipeline), &real_time_config());

        controller.set_text("late");
        until(|| pipeline.entered() == 1).await;
        controller.dispose();
        pipeline.release("late");
        until(|| !controller.is_generating()).await;

        let snap = controller.snapshot();
        assert!(snap.image.is_none());
        assert_eq!(snap.completed, 0);
    }

    #[test]
    fn pipeline_rejects_oversized_config() {
        let config =
            GeneratorConfig { pixels_per_module: Some(u32::MAX), ..GeneratorConfig::default() };
        let request = GenerationRequest {
            text: "x".to_string(),
            dark_color: "#000".to_string(),
            light_color: "#fff".to_string(),
        };
        let result = QrPipeline::new(config).generate(&request);
        assert!(matches!(result, Err(QrError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_previous_image() {
        let controller = GenerationController::from_config(config());
        let mut rx = controller.subscribe();

        controller.set_text("https://example.com");
        let first = wait_completed(&mut rx, 1).await.image.unwrap();

        controller.set_text("x".repeat(3000));
        let snap = wait_completed(&mut rx, 2).await;
        assert!(matches!(snap.error.as_deref(), Some(QrError::CapacityExceeded { .. })));
        assert!(Arc::ptr_eq(snap.image.as_ref().unwrap(), &first));

        controller.set_text("");
        let snap = wait_completed(&mut rx, 3).await;
        assert!(snap.image.is_none());
        assert!(snap.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn real_pipeline_uses_configured_scale_and_colors() {
        let controller = GenerationController::from_config(config());
        let mut rx = controller.subscribe();

        controller.request_generation("HELLO", "#112233", "not-a-color");
        let rendered = wait_completed(&mut rx, 1).await.image.unwrap();

        // Version 1 with a 4-module quiet zone is 29 modules; 256 / 29 = 8.
        assert_eq!(rendered.pixels_per_module, 8);
        assert_eq!(rendered.width(), 29 * 8);
        // The unusable light color falls back to the configured default.
        assert_eq!(*rendered.image.get_pixel(0, 0), Rgba([0xad, 0xff, 0x2f, 255]));
        assert_eq!(*rendered.image.get_pixel(32, 32), Rgba([0x11, 0x22, 0x33, 255]));
    }

    #[tokio::test(start_paused = true)]
    async fn download_saves_current_image() {
        let controller = GenerationController::from_config(config());
        let dir = std::env::temp_dir().join(format!("qrforge-download-{}", std::process::id()));
        assert_eq!(controller.download(&dir).unwrap(), None);

        let mut rx = controller.subscribe();
        controller.set_text("download me");
        wait_completed(&mut rx, 1).await;

        let path = controller.download(&dir).unwrap().unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
