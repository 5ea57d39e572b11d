//! Navigation mode classification.
//!
//! The classifier watches the stream of input signals and derives how the
//! user is currently driving: keyboard, pointer, or both. The derived
//! mode is purely informational - UI layers use it to decide things like
//! whether to show a "can't jump here" affordance - and never gates a
//! navigation operation.
//!
//! The machine starts in [`NavigationMode::Auto`] and resolves on the
//! first relevant signal. Once the user mixes modalities (a key press
//! while driving with the pointer, or vice versa) it settles in
//! [`NavigationMode::Hybrid`]; callers may also force any mode
//! explicitly, e.g. when handling a step-indicator click.

use std::time::Instant;

/// Distance in cells/pixels a pointer must travel before a move counts as
/// a pointer-navigation signal. Filters out jitter from trackpads.
pub const DEFAULT_POINTER_THRESHOLD: f32 = 3.0;

/// The engine's classification of the current input modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationMode {
    /// Not yet resolved; becomes `Keyboard` or `Pointer` on the first
    /// relevant signal.
    #[default]
    Auto,
    /// Driving with the keyboard.
    Keyboard,
    /// Driving with the pointer.
    Pointer,
    /// Mixing both modalities.
    Hybrid,
}

/// State machine deriving [`NavigationMode`] from input signals.
#[derive(Debug)]
pub struct ModeClassifier {
    mode: NavigationMode,
    pointer_threshold: f32,
    last_key_at: Option<Instant>,
    last_pointer_at: Option<Instant>,
}

impl ModeClassifier {
    /// Create a classifier starting in the given mode.
    pub fn new(initial: NavigationMode) -> Self {
        Self {
            mode: initial,
            pointer_threshold: DEFAULT_POINTER_THRESHOLD,
            last_key_at: None,
            last_pointer_at: None,
        }
    }

    /// Override the pointer-move distance threshold.
    pub fn with_pointer_threshold(mut self, threshold: f32) -> Self {
        self.pointer_threshold = threshold;
        self
    }

    /// The current mode.
    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    /// When the last keyboard signal arrived.
    pub fn last_key_at(&self) -> Option<Instant> {
        self.last_key_at
    }

    /// When the last pointer signal arrived.
    pub fn last_pointer_at(&self) -> Option<Instant> {
        self.last_pointer_at
    }

    /// Force a mode explicitly. Returns `true` if the mode changed.
    pub fn set_mode(&mut self, mode: NavigationMode) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        changed
    }

    /// A navigation-relevant key event arrived. Returns `true` if the
    /// mode changed.
    pub fn on_key(&mut self) -> bool {
        self.last_key_at = Some(Instant::now());
        let next = match self.mode {
            NavigationMode::Auto => NavigationMode::Keyboard,
            NavigationMode::Pointer => NavigationMode::Hybrid,
            current => current,
        };
        self.set_mode(next)
    }

    /// The pointer moved by `(dx, dy)`. Movement below the threshold is
    /// ignored. Returns `true` if the mode changed.
    pub fn on_pointer_move(&mut self, dx: f32, dy: f32) -> bool {
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < self.pointer_threshold {
            return false;
        }
        self.on_pointer_signal()
    }

    /// A click landed on a navigable element. Returns `true` if the mode
    /// changed.
    pub fn on_pointer_click(&mut self) -> bool {
        self.on_pointer_signal()
    }

    fn on_pointer_signal(&mut self) -> bool {
        self.last_pointer_at = Some(Instant::now());
        let next = match self.mode {
            NavigationMode::Auto => NavigationMode::Pointer,
            NavigationMode::Keyboard => NavigationMode::Hybrid,
            current => current,
        };
        self.set_mode(next)
    }
}

impl Default for ModeClassifier {
    fn default() -> Self {
        Self::new(NavigationMode::Auto)
    }
}
