//! Display state controller
//!
//! Two halves share one [`RenderLock`]:
//!
//! - [`ControllerState`] lives inside the lock. It owns the render backend,
//!   the mode machine, the last good [`DisplayState`], the eye animator and
//!   the face frame buffer. Every method on it runs with the lock held.
//! - [`Controller`] lives in the network task. It owns the transport and the
//!   periodic tasks, and only takes the lock to publish results, never across
//!   a network call.
//!
//! The animation task calls [`ControllerState::animate`] under the same lock,
//! so it never sees a half-applied mode change.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::pixelcolor::{Rgb565, Rgb888, RgbColor};

use crate::chat::ChatClient;
use crate::config::Config;
use crate::eye::{self, EyeAnimator};
use crate::face::{FrameDecoder, FrameError, FrameFetcher, FrameStats, Tile};
use crate::framebuffer::{AllocationError, FrameBuffer};
use crate::input::{Gesture, InputQueue, InputState};
use crate::mode::{ModeController, Transition};
use crate::poller::{PollOutcome, StatePoller};
use crate::render::{LabelText, LayerId, LayerSpec, RenderBackend, RenderLock};
use crate::scene::Scene;
use crate::scheduler::PeriodicTask;
use crate::state::{DisplayState, Mode, truncate_str};
use crate::status::{self, status_text};
use crate::transport::Transport;

/// Label while a chat request is outstanding
pub const CHAT_PENDING: &str = "Thinking...";
/// Label when a chat request failed
pub const CHAT_FAILED: &str = "No reply";

/// Allocate the face frame buffer and its receive buffer together; FACE mode
/// needs both.
pub fn allocate_face(config: &Config) -> Result<(FrameBuffer, FrameFetcher), AllocationError> {
    let frame = FrameBuffer::allocate(config.display_size, config.display_size)?;
    let fetcher = FrameFetcher::new(config)?;
    Ok((frame, fetcher))
}

/// Everything guarded by the render lock
pub struct ControllerState<B: RenderBackend> {
    backend: B,
    modes: ModeController,
    display: DisplayState,
    animator: EyeAnimator,
    face: Option<FrameBuffer>,
    ever_connected: bool,
    /// Last text derived from the display state
    status: LabelText,
    /// Text currently on the label (status or chat reply)
    label: LabelText,
}

impl<B: RenderBackend> ControllerState<B> {
    /// Create every layer and the initial label. A failed face allocation
    /// disables FACE mode for good.
    pub fn new(mut backend: B, config: &Config, face: Result<FrameBuffer, AllocationError>) -> Self {
        for (layer, spec) in eye::layer_specs() {
            backend.create_layer(layer, &spec);
        }
        backend.create_layer(
            LayerId::Face,
            &LayerSpec::circle(config.display_size, Rgb888::BLACK).hidden(),
        );

        let mut modes = ModeController::new();
        let face = match face {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::error!("Face frame buffer unavailable ({}); FACE mode disabled", e);
                modes.disable_face();
                None
            }
        };

        let mut state = Self {
            backend,
            modes,
            display: DisplayState::default(),
            animator: EyeAnimator::new(),
            face,
            ever_connected: false,
            status: LabelText::new(),
            label: LabelText::new(),
        };
        state.set_status(status::INITIALIZING);
        state
    }

    pub fn mode(&self) -> Mode {
        self.modes.current()
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn animator(&self) -> &EyeAnimator {
        &self.animator
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ever_connected(&self) -> bool {
        self.ever_connected
    }

    pub fn face_buffer(&self) -> Option<&FrameBuffer> {
        self.face.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// One eye animation tick; false if nothing was animated
    pub fn animate(&mut self, dt: Duration) -> bool {
        let Some(frame) = self
            .animator
            .tick(self.modes.current(), self.display.emotion(), dt)
        else {
            return false;
        };
        for command in frame.commands().iter() {
            self.backend.apply(command);
        }
        true
    }

    /// Publish the result of a status poll
    pub fn apply_poll(&mut self, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::Updated(state) => self.apply_state(state.clone()),
            PollOutcome::Skipped if !self.ever_connected => self.set_status(status::OFFLINE),
            // Stale state and label stay as they are
            PollOutcome::Skipped | PollOutcome::Failed(_) => {}
        }
    }

    /// Replace the display state and run the mode transition check
    pub fn apply_state(&mut self, state: DisplayState) {
        self.ever_connected = true;

        let shown = self.modes.resolve(state.mode());
        self.display = state.with_mode(shown);
        if let Some(transition) = self.modes.request(shown) {
            self.apply_transition(&transition);
        }

        let text: LabelText = truncate_str(status_text(self.ever_connected, &self.display));
        self.set_status(&text);
    }

    fn apply_transition(&mut self, transition: &Transition) {
        for command in transition.commands().iter() {
            self.backend.apply(command);
        }
    }

    /// Update the label only when the derived status text changes, so a chat
    /// reply stays up until there is something new to say.
    fn set_status(&mut self, text: &str) {
        if self.status.as_str() == text {
            return;
        }
        self.status = truncate_str(text);
        self.show_message(text);
    }

    /// Put arbitrary text on the label
    pub fn show_message(&mut self, text: &str) {
        if self.label.as_str() == text {
            return;
        }
        self.label = truncate_str(text);
        self.backend.set_label(&self.label);
    }

    /// Copy a decoded rectangle into the face buffer
    pub fn write_face_tile(&mut self, tile: &Tile<'_>) -> usize {
        let Some(frame) = self.face.as_mut() else {
            return 0;
        };
        frame.write_rect(
            tile.area.top_left.x,
            tile.area.top_left.y,
            tile.area.size.width,
            tile.area.size.height,
            tile.pixels,
        )
    }

    /// A complete frame is in the buffer
    pub fn commit_face_frame(&mut self) {
        self.backend.invalidate(LayerId::Face);
    }
}

impl ControllerState<Scene> {
    /// Draw the scene if anything changed; returns whether it drew
    pub fn compose<D>(&mut self, target: &mut D) -> Result<bool, D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        if !self.backend.take_redraw() {
            return Ok(false);
        }
        self.backend.draw(target, self.face.as_ref())?;
        Ok(true)
    }
}

/// Network side of the controller
pub struct Controller<T: Transport, D: FrameDecoder> {
    config: Config,
    transport: T,
    decoder: D,
    poller: StatePoller,
    fetcher: Option<FrameFetcher>,
    chat: ChatClient,
    input: InputState,
    poll_task: PeriodicTask,
    frame_task: PeriodicTask,
}

impl<T: Transport, D: FrameDecoder> Controller<T, D> {
    /// `fetcher` is `None` when FACE mode is disabled
    pub fn new(config: Config, transport: T, decoder: D, fetcher: Option<FrameFetcher>) -> Self {
        Self {
            poll_task: PeriodicTask::new(config.poll_period),
            frame_task: PeriodicTask::new(config.frame_period),
            config,
            transport,
            decoder,
            poller: StatePoller::new(),
            fetcher,
            chat: ChatClient::new(),
            input: InputState::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn poller(&self) -> &StatePoller {
        &self.poller
    }

    pub fn fetcher(&self) -> Option<&FrameFetcher> {
        self.fetcher.as_ref()
    }

    pub fn chat(&self) -> &ChatClient {
        &self.chat
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// One status poll, published under the lock
    pub async fn poll_once<M, B>(&mut self, lock: &RenderLock<M, ControllerState<B>>) -> PollOutcome
    where
        M: RawMutex,
        B: RenderBackend,
    {
        let outcome = self.poller.poll(&mut self.transport, &self.config).await;
        lock.with(|state| state.apply_poll(&outcome));
        outcome
    }

    /// One face frame. Each rectangle takes the lock on its own; the redraw
    /// is requested only after the whole frame decoded.
    pub async fn fetch_frame_once<M, B>(
        &mut self,
        lock: &RenderLock<M, ControllerState<B>>,
    ) -> Result<FrameStats, FrameError>
    where
        M: RawMutex,
        B: RenderBackend,
    {
        let Some(fetcher) = self.fetcher.as_mut() else {
            return Err(FrameError::Unavailable);
        };

        let stats = fetcher
            .fetch(
                &mut self.transport,
                &mut self.decoder,
                &self.config,
                &mut |tile| {
                    lock.with(|state| {
                        state.write_face_tile(tile);
                    })
                },
            )
            .await?;
        lock.with(|state| state.commit_face_frame());
        Ok(stats)
    }

    /// Drain queued input; returns the number of taps handled
    pub async fn handle_input<M, B, Q>(
        &mut self,
        lock: &RenderLock<M, ControllerState<B>>,
        queue: &InputQueue<Q>,
    ) -> usize
    where
        M: RawMutex,
        B: RenderBackend,
        Q: RawMutex,
    {
        let mut taps = 0;
        while let Some(event) = queue.try_next() {
            match self.input.feed(event) {
                Some(Gesture::Tap) => {
                    taps += 1;
                    self.run_chat(lock).await;
                }
                Some(Gesture::Turned(position)) => log::debug!("Encoder at {}", position),
                None => {}
            }
        }
        taps
    }

    async fn run_chat<M, B>(&mut self, lock: &RenderLock<M, ControllerState<B>>)
    where
        M: RawMutex,
        B: RenderBackend,
    {
        lock.with(|state| state.show_message(CHAT_PENDING));
        let prompt = self.config.chat_prompt;
        match self.chat.ask(&mut self.transport, &self.config, prompt).await {
            Ok(reply) => lock.with(|state| state.show_message(&reply)),
            Err(_) => lock.with(|state| state.show_message(CHAT_FAILED)),
        }
    }

    /// One scheduler pass: poll if due, fetch a frame if due and in FACE
    /// mode, then drain input.
    pub async fn run_once<M, B, Q>(
        &mut self,
        lock: &RenderLock<M, ControllerState<B>>,
        queue: &InputQueue<Q>,
    ) where
        M: RawMutex,
        B: RenderBackend,
        Q: RawMutex,
    {
        if self.poll_task.try_begin(Instant::now()) {
            self.poll_once(lock).await;
            self.poll_task.finish(Instant::now());
        }

        let face_mode = lock.with(|state| state.mode() == Mode::Face);
        if face_mode && self.fetcher.is_some() && self.frame_task.try_begin(Instant::now()) {
            // Failures are logged by the fetcher; the last frame stays up
            let _ = self.fetch_frame_once(lock).await;
            self.frame_task.finish(Instant::now());
        }

        self.handle_input(lock, queue).await;
    }

    /// Time until the next periodic task is due
    pub fn next_wake(&self, now: Instant, face_mode: bool) -> Duration {
        let poll = self.poll_task.remaining(now);
        if face_mode && self.fetcher.is_some() {
            poll.min(self.frame_task.remaining(now))
        } else {
            poll
        }
    }
}
