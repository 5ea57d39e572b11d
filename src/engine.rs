//! The focus engine: one instance per composition root.
//!
//! [`FocusEngine`] owns the registry, scope stack, history log, and mode
//! classifier, and is the only component allowed to mutate them. All
//! state sits behind a single mutex; navigation operations take a
//! snapshot under the lock, await validators with no lock held, then
//! re-acquire to commit - discarding the result if the engine moved on
//! in the meantime.
//!
//! # Concurrency discipline
//!
//! - **Single in-flight request**: while one navigation's async
//!   validation is outstanding, further navigation requests are dropped
//!   (not queued) and logged.
//! - **Generation counter**: every commit, scope change, and teardown
//!   bumps a generation; a pending validation whose snapshot generation
//!   no longer matches is discarded instead of applied.
//! - **Deferred activation**: scope restoration and auto-activation go
//!   through the injected [`Scheduler`], so a freshly-rendered target can
//!   exist before the activation fires.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use focal::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = FocusEngine::new(Arc::new(ImmediateScheduler));
//!
//! engine
//!     .register(
//!         FocusableElement::builder("patient-name")
//!             .order(1)
//!             .scope("intake-form")
//!             .build(),
//!     )
//!     .unwrap();
//!
//! assert!(engine.focus_first(NavOptions::default()).await);
//! assert_eq!(engine.active_element().as_deref(), Some("patient-name"));
//! # }
//! ```

use crate::element::{ActivateFn, ElementPatch, FocusableElement};
use crate::error::Result;
use crate::history::{FocusReason, HistoryEntry, HistoryLog, DEFAULT_HISTORY_LIMIT};
use crate::mode::{ModeClassifier, NavigationMode, DEFAULT_POINTER_THRESHOLD};
use crate::registry::ElementRegistry;
use crate::scope::{FocusScope, ScopeOptions, ScopeStack, DEFAULT_SCOPE_ID};
use crate::scheduler::Scheduler;
use crate::steps::{self, StepInputs, StepView};
use crate::validate::{consult, ValidationCtx, Validator};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

// ==================== Configuration ====================

/// Precedence between per-element jump flags and an engine-wide policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JumpPolicy {
    /// Honor each element's `allow_direct_jump` flag (plus the completion
    /// fallback).
    #[default]
    PerElement,
    /// Any registered element may be jumped to; overrides element flags.
    AllowAny,
}

/// Engine-wide configuration, set once at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default wrap behavior when a [`NavOptions`] leaves it unset.
    pub wrap_default: bool,
    /// Maximum retained history entries.
    pub history_limit: usize,
    /// Pointer-move distance threshold for mode classification.
    pub pointer_threshold: f32,
    /// Direct-jump precedence policy.
    pub jump_policy: JumpPolicy,
    /// Navigation mode the classifier starts in.
    pub initial_mode: NavigationMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wrap_default: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            pointer_threshold: DEFAULT_POINTER_THRESHOLD,
            jump_policy: JumpPolicy::default(),
            initial_mode: NavigationMode::Auto,
        }
    }
}

impl EngineConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default wrap behavior.
    pub fn wrap_default(mut self, wrap: bool) -> Self {
        self.wrap_default = wrap;
        self
    }

    /// Set the history cap.
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the pointer-move threshold.
    pub fn pointer_threshold(mut self, threshold: f32) -> Self {
        self.pointer_threshold = threshold;
        self
    }

    /// Set the jump policy.
    pub fn jump_policy(mut self, policy: JumpPolicy) -> Self {
        self.jump_policy = policy;
        self
    }

    /// Set the initial navigation mode.
    pub fn initial_mode(mut self, mode: NavigationMode) -> Self {
        self.initial_mode = mode;
        self
    }
}

/// Per-call navigation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavOptions {
    /// Wrap around at the scope boundary. `None` falls back to
    /// [`EngineConfig::wrap_default`] (which defaults to stopping at the
    /// boundary). A trapping scope forces wrap regardless.
    pub wrap: Option<bool>,
}

impl NavOptions {
    /// Options with everything unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set wrap explicitly.
    pub fn wrap(mut self, wrap: bool) -> Self {
        self.wrap = Some(wrap);
        self
    }

    /// Shorthand for `NavOptions::new().wrap(true)`.
    pub fn wrapping() -> Self {
        Self::new().wrap(true)
    }
}

// ==================== Events & subscriptions ====================

/// State-change notification delivered to subscribers after commit.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The active element changed.
    ActiveChanged {
        /// Previously active element.
        previous: Option<String>,
        /// Newly active element (`None` when activity was cleared).
        current: Option<String>,
        /// Why the change committed.
        reason: FocusReason,
    },
    /// A scope was pushed.
    ScopePushed {
        /// The pushed scope's id.
        id: String,
    },
    /// A scope was popped.
    ScopePopped {
        /// The popped scope's id.
        id: String,
    },
    /// The navigation mode changed.
    ModeChanged(NavigationMode),
    /// The history log was cleared.
    HistoryCleared,
    /// The engine was torn down via [`FocusEngine::reset`].
    Reset,
}

/// Handle returned by [`FocusEngine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

// ==================== Engine state ====================

struct EngineState {
    registry: ElementRegistry,
    scopes: ScopeStack,
    active: Option<String>,
    history: HistoryLog,
    classifier: ModeClassifier,
    /// Bumped on every commit and scope/teardown mutation; pending async
    /// validations compare against their snapshot and discard on
    /// mismatch.
    generation: u64,
    /// Whether a navigation request's validation is outstanding.
    in_flight: bool,
}

impl EngineState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            registry: ElementRegistry::new(),
            scopes: ScopeStack::new(),
            active: None,
            history: HistoryLog::new(config.history_limit),
            classifier: ModeClassifier::new(config.initial_mode)
                .with_pointer_threshold(config.pointer_threshold),
            generation: 0,
            in_flight: false,
        }
    }

    /// The ordered eligible element list for sequential navigation,
    /// including skip-flagged elements (callers filter).
    ///
    /// A trapping top scope restricts the set to its own members. With no
    /// trap, the set is the union over the open-scope chain: the top
    /// scope's members first, then each scope below it, and finally every
    /// element not claimed by an open scope (the page behind the
    /// overlays).
    fn eligible_elements(&self) -> Vec<&FocusableElement> {
        let top = self.scopes.top_scope();
        if top.trap_focus {
            return self.registry.elements_in_scope(&top.id);
        }
        if top.id == DEFAULT_SCOPE_ID {
            return self.registry.all_elements();
        }

        let open: FxHashSet<&str> = self.scopes.chain_top_down().collect();
        let mut ordered = Vec::new();
        for scope_id in self.scopes.chain_top_down() {
            if scope_id == DEFAULT_SCOPE_ID {
                let mut rest: Vec<&FocusableElement> = self
                    .registry
                    .all_elements()
                    .into_iter()
                    .filter(|element| !open.contains(element.scope_id.as_str()))
                    .collect();
                ordered.append(&mut rest);
            } else {
                ordered.extend(self.registry.elements_in_scope(scope_id));
            }
        }
        ordered
    }

    /// Whether `element` is reachable from the current scope state.
    fn is_reachable(&self, element: &FocusableElement) -> bool {
        let top = self.scopes.top_scope();
        if top.trap_focus {
            element.scope_id == top.id
        } else {
            true
        }
    }
}

// ==================== Navigation plumbing ====================

#[derive(Debug, Clone, Copy)]
enum ScanKind {
    Next,
    Previous,
    First,
    Last,
}

struct Candidate {
    id: String,
    can_receive: Option<Validator>,
}

struct NavPlan {
    current: Option<String>,
    can_leave: Option<Validator>,
    candidates: Vec<Candidate>,
    target: Option<String>,
    generation: u64,
}

// ==================== FocusEngine ====================

/// Headless focus-navigation engine. One instance per composition root;
/// create with [`FocusEngine::new`] and share the returned `Arc`.
pub struct FocusEngine {
    state: Mutex<EngineState>,
    observers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    scheduler: Arc<dyn Scheduler>,
    config: EngineConfig,
    weak_self: Weak<FocusEngine>,
}

impl FocusEngine {
    /// Create an engine with default configuration.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Self::with_config(EngineConfig::default(), scheduler)
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(config: EngineConfig, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(EngineState::new(&config)),
            observers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            scheduler,
            config,
            weak_self: weak.clone(),
        })
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ==================== Registration ====================

    /// Register a focusable element. Called by the rendering layer when
    /// the corresponding UI element mounts.
    pub fn register(&self, element: FocusableElement) -> Result<()> {
        let mut state = self.state.lock();
        tracing::debug!(id = %element.id, scope = %element.scope_id, "registering element");
        state.registry.register(element)
    }

    /// Unregister an element. Called on unmount. Unknown ids are a no-op.
    pub fn unregister(&self, id: &str) {
        let mut state = self.state.lock();
        if state.registry.unregister(id).is_none() {
            tracing::debug!(id, "unregister of unknown element ignored");
            return;
        }
        if state.active.as_deref() == Some(id) {
            state.active = None;
            state.generation += 1;
            let previous = Some(id.to_string());
            drop(state);
            self.notify(EngineEvent::ActiveChanged {
                previous,
                current: None,
                reason: FocusReason::Programmatic,
            });
        }
    }

    /// Merge a partial update into a registered element.
    pub fn update(&self, id: &str, patch: ElementPatch) -> Result<()> {
        self.state.lock().registry.update(id, patch)
    }

    /// Whether an element id is registered.
    pub fn is_registered(&self, id: &str) -> bool {
        self.state.lock().registry.contains(id)
    }

    /// Number of registered elements.
    pub fn element_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    // ==================== Navigation ====================

    /// Move to the next eligible element in order. Returns `false` when
    /// the transition was vetoed, dropped, or no eligible target exists.
    pub async fn focus_next(&self, options: NavOptions) -> bool {
        self.scan_navigate(ScanKind::Next, options, FocusReason::Keyboard)
            .await
    }

    /// Move to the previous eligible element in order.
    pub async fn focus_previous(&self, options: NavOptions) -> bool {
        self.scan_navigate(ScanKind::Previous, options, FocusReason::Keyboard)
            .await
    }

    /// Activate the first eligible element of the active scope.
    pub async fn focus_first(&self, options: NavOptions) -> bool {
        self.scan_navigate(ScanKind::First, options, FocusReason::Programmatic)
            .await
    }

    /// Activate the last eligible element of the active scope.
    pub async fn focus_last(&self, options: NavOptions) -> bool {
        self.scan_navigate(ScanKind::Last, options, FocusReason::Programmatic)
            .await
    }

    /// Jump directly to an element. Succeeds only when the target is
    /// registered, reachable from the current scope, and both the current
    /// element's leave gate and the target's receive gate pass.
    pub async fn focus_field(&self, id: &str, reason: FocusReason) -> bool {
        let plan = {
            let mut state = self.state.lock();
            if state.in_flight {
                tracing::debug!(element = id, "navigation dropped; another request is pending");
                return false;
            }
            if state.active.as_deref() == Some(id) {
                tracing::trace!(element = id, "already active");
                return true;
            }
            let Some(element) = state.registry.get(id) else {
                tracing::debug!(element = id, "direct jump to unregistered element");
                return false;
            };
            if !state.is_reachable(element) {
                tracing::debug!(
                    element = id,
                    scope = %state.scopes.top_scope().id,
                    "direct jump blocked by scope isolation"
                );
                return false;
            }
            let candidate = Candidate {
                id: element.id.clone(),
                can_receive: element.can_receive_focus.clone(),
            };
            let can_leave = state
                .active
                .as_deref()
                .and_then(|active| state.registry.get(active))
                .and_then(|element| element.can_leave_focus.clone());
            state.in_flight = true;
            NavPlan {
                current: state.active.clone(),
                can_leave,
                candidates: vec![candidate],
                target: Some(id.to_string()),
                generation: state.generation,
            }
        };
        self.resolve_plan(plan, reason).await
    }

    async fn scan_navigate(&self, kind: ScanKind, options: NavOptions, reason: FocusReason) -> bool {
        let plan = {
            let mut state = self.state.lock();
            if state.in_flight {
                tracing::debug!(?kind, "navigation dropped; another request is pending");
                return false;
            }
            let wrap =
                state.scopes.is_trapped() || options.wrap.unwrap_or(self.config.wrap_default);
            let candidates = Self::scan_candidates(&state, kind, wrap);
            if candidates.is_empty() {
                tracing::debug!(?kind, wrap, "no eligible navigation target");
                return false;
            }
            // focus_first/focus_last with the boundary element already
            // active: a no-op success, like focus_field to the active id.
            if candidates
                .first()
                .is_some_and(|candidate| Some(candidate.id.as_str()) == state.active.as_deref())
            {
                tracing::trace!(?kind, "scan target already active");
                return true;
            }
            let can_leave = state
                .active
                .as_deref()
                .and_then(|active| state.registry.get(active))
                .and_then(|element| element.can_leave_focus.clone());
            state.in_flight = true;
            NavPlan {
                current: state.active.clone(),
                can_leave,
                candidates,
                target: None,
                generation: state.generation,
            }
        };
        self.resolve_plan(plan, reason).await
    }

    /// Ordered candidate list for a scan, skip-flagged elements removed.
    /// `Next`/`Previous` start from the active element's position and
    /// exclude it via their index ranges; `First`/`Last` cover the full
    /// eligible set, active element included.
    fn scan_candidates(state: &EngineState, kind: ScanKind, wrap: bool) -> Vec<Candidate> {
        let ordered = state.eligible_elements();
        let position = state
            .active
            .as_deref()
            .and_then(|active| ordered.iter().position(|element| element.id == active));

        let indices: Vec<usize> = match kind {
            ScanKind::First => (0..ordered.len()).collect(),
            ScanKind::Last => (0..ordered.len()).rev().collect(),
            ScanKind::Next => {
                let start = position.map_or(0, |p| p + 1);
                let mut forward: Vec<usize> = (start..ordered.len()).collect();
                if wrap {
                    if let Some(p) = position {
                        forward.extend(0..p);
                    }
                }
                forward
            }
            ScanKind::Previous => {
                let end = position.unwrap_or(ordered.len());
                let mut backward: Vec<usize> = (0..end).rev().collect();
                if wrap {
                    if let Some(p) = position {
                        backward.extend(((p + 1)..ordered.len()).rev());
                    }
                }
                backward
            }
        };

        indices
            .into_iter()
            .map(|i| ordered[i])
            .filter(|element| !element.skip_in_navigation)
            .map(|element| Candidate {
                id: element.id.clone(),
                can_receive: element.can_receive_focus.clone(),
            })
            .collect()
    }

    /// Await the plan's validators with no lock held, then commit if the
    /// engine state has not moved underneath.
    async fn resolve_plan(&self, plan: NavPlan, reason: FocusReason) -> bool {
        // Leave gate on the current element
        if let Some(current) = plan.current.as_deref() {
            let ctx = ValidationCtx::leave(current, plan.target.as_deref());
            if !consult(plan.can_leave.as_ref(), ctx).await {
                tracing::debug!(element = current, "transition aborted by leave gate");
                self.clear_in_flight();
                return false;
            }
        }

        // Receive gate: first passing candidate wins. The active element
        // needs no gate, it already holds focus.
        let mut chosen: Option<String> = None;
        for candidate in &plan.candidates {
            if plan.current.as_deref() == Some(candidate.id.as_str()) {
                chosen = Some(candidate.id.clone());
                break;
            }
            let ctx = ValidationCtx::receive(candidate.id.clone(), plan.current.as_deref());
            if consult(candidate.can_receive.as_ref(), ctx).await {
                chosen = Some(candidate.id.clone());
                break;
            }
            tracing::trace!(candidate = %candidate.id, "candidate rejected by receive gate");
        }

        let mut state = self.state.lock();
        state.in_flight = false;
        if state.generation != plan.generation {
            tracing::debug!(
                snapshot = plan.generation,
                current = state.generation,
                "stale validation result discarded"
            );
            return false;
        }
        let Some(chosen) = chosen else {
            tracing::debug!("no candidate passed validation");
            return false;
        };
        if !state.registry.contains(&chosen) {
            tracing::debug!(element = %chosen, "chosen element unregistered during validation");
            return false;
        }
        if state.active.as_deref() == Some(chosen.as_str()) {
            tracing::trace!(element = %chosen, "already active");
            return true;
        }

        let (previous, activate) = Self::commit(&mut state, &chosen, reason, None);
        drop(state);

        self.run_activation(&chosen, activate);
        self.notify(EngineEvent::ActiveChanged {
            previous,
            current: Some(chosen),
            reason,
        });
        true
    }

    fn clear_in_flight(&self) {
        self.state.lock().in_flight = false;
    }

    /// Commit a transition under the lock. Caller has verified the
    /// element is registered.
    fn commit(
        state: &mut EngineState,
        id: &str,
        reason: FocusReason,
        context: Option<String>,
    ) -> (Option<String>, Option<ActivateFn>) {
        let previous = state.active.replace(id.to_string());
        state.generation += 1;

        let (scope_id, activate) = match state.registry.get(id) {
            Some(element) => (element.scope_id.clone(), Some(element.activate.clone())),
            None => (DEFAULT_SCOPE_ID.to_string(), None),
        };
        state.history.push(HistoryEntry {
            element_id: id.to_string(),
            scope_id,
            reason,
            timestamp: Instant::now(),
            previous_element_id: previous.clone(),
            context,
        });
        (previous, activate)
    }

    /// Activate an element directly, bypassing validation. Used for scope
    /// restoration and auto-activation, where history and scope facts are
    /// authoritative: the restore target held focus legitimately before
    /// the scope opened, and a receive gate that started failing while
    /// the scope was up would otherwise strand focus on nothing.
    /// Re-activates even when the id is already active - restoration must
    /// hand real input focus back to the widget. Returns `false` when the
    /// target is unregistered.
    fn activate_direct(&self, id: &str, reason: FocusReason) -> bool {
        let mut state = self.state.lock();
        if !state.registry.contains(id) {
            tracing::debug!(element = id, "deferred activation target no longer registered");
            return false;
        }
        let (previous, activate) = Self::commit(&mut state, id, reason, None);
        drop(state);

        self.run_activation(id, activate);
        self.notify(EngineEvent::ActiveChanged {
            previous,
            current: Some(id.to_string()),
            reason,
        });
        true
    }

    fn run_activation(&self, id: &str, activate: Option<ActivateFn>) {
        let Some(activate) = activate else { return };
        if catch_unwind(AssertUnwindSafe(|| activate())).is_err() {
            tracing::warn!(element = id, "activation callback panicked");
        }
    }

    /// Composite direct-jump check. `completed` is the caller's domain
    /// completion state; `custom` is an optional extra allowance.
    ///
    /// Under [`JumpPolicy::AllowAny`] every registered element passes.
    /// Otherwise the element's `allow_direct_jump` flag wins; failing
    /// that, a caller validator may allow it; failing that, the jump is
    /// allowed when every required element with a smaller order in the
    /// same scope is complete.
    pub fn can_jump_to(
        &self,
        id: &str,
        completed: &FxHashSet<String>,
        custom: Option<&dyn Fn(&FocusableElement) -> bool>,
    ) -> bool {
        let state = self.state.lock();
        let Some(element) = state.registry.get(id) else {
            return false;
        };
        if !state.is_reachable(element) {
            return false;
        }
        if self.config.jump_policy == JumpPolicy::AllowAny {
            return true;
        }
        if element.mouse.allow_direct_jump {
            return true;
        }
        if let Some(custom) = custom {
            if custom(element) {
                return true;
            }
        }
        state
            .registry
            .elements_in_scope(&element.scope_id)
            .iter()
            .filter(|earlier| earlier.order < element.order)
            .filter(|earlier| earlier.required && !earlier.skip_in_navigation)
            .all(|earlier| completed.contains(&earlier.id))
    }

    // ==================== Scopes ====================

    /// Push an isolation scope. The currently-active element is
    /// snapshotted as the default restore target; if the scope asks for
    /// auto-activation, the first eligible element is activated through
    /// the scheduler (the scope's elements may not have mounted yet).
    pub fn push_scope(&self, scope: FocusScope) -> Result<()> {
        let (scope_id, auto_activate) = {
            let mut state = self.state.lock();
            let scope_id = scope.id.clone();
            let auto_activate = scope.auto_activate_first;
            let previous = state.active.clone();
            state.scopes.push(scope, previous)?;
            state.generation += 1;
            (scope_id, auto_activate)
        };
        tracing::debug!(scope = %scope_id, "scope pushed");
        self.notify(EngineEvent::ScopePushed {
            id: scope_id.clone(),
        });

        if auto_activate {
            let weak = self.weak_self.clone();
            self.scheduler.schedule(Box::new(move || {
                if let Some(engine) = weak.upgrade() {
                    engine.auto_activate_first_in(&scope_id);
                }
            }));
        }
        Ok(())
    }

    /// Pop the topmost scope, restoring focus per its policy. Fails on
    /// the default scope.
    pub fn pop_scope(&self) -> Result<()> {
        self.pop_scope_with(FocusReason::ScopeClose)
    }

    /// Close the topmost scope if its options allow escape-close.
    /// Returns `false` when only the default scope is open or the scope
    /// does not close on escape.
    pub fn escape(&self) -> bool {
        {
            let state = self.state.lock();
            if state.scopes.depth() == 1 {
                return false;
            }
            if !state
                .scopes
                .top_scope()
                .options
                .contains(ScopeOptions::ESCAPE_CLOSES)
            {
                tracing::trace!(scope = %state.scopes.top_scope().id, "escape ignored by scope policy");
                return false;
            }
        }
        self.pop_scope_with(FocusReason::Escape).is_ok()
    }

    fn pop_scope_with(&self, reason: FocusReason) -> Result<()> {
        let (entry, cleared) = {
            let mut state = self.state.lock();
            let entry = state.scopes.pop()?;
            state.generation += 1;
            let cleared = if state
                .active
                .as_deref()
                .and_then(|id| state.registry.get(id))
                .is_some_and(|element| element.scope_id == entry.scope.id)
            {
                state.active.take()
            } else {
                None
            };
            (entry, cleared)
        };
        tracing::debug!(scope = %entry.scope.id, "scope popped");

        if let Some(on_close) = entry.scope.on_close.clone() {
            if catch_unwind(AssertUnwindSafe(|| on_close())).is_err() {
                tracing::warn!(scope = %entry.scope.id, "on_close callback panicked");
            }
        }
        self.notify(EngineEvent::ScopePopped {
            id: entry.scope.id.clone(),
        });
        if let Some(previous) = cleared {
            self.notify(EngineEvent::ActiveChanged {
                previous: Some(previous),
                current: None,
                reason,
            });
        }

        if let Some(target) = entry.restore_target() {
            let target = target.to_string();
            let weak = self.weak_self.clone();
            self.scheduler.schedule(Box::new(move || {
                if let Some(engine) = weak.upgrade() {
                    engine.activate_direct(&target, reason);
                }
            }));
        }
        Ok(())
    }

    /// Deferred half of [`FocusEngine::push_scope`] auto-activation.
    fn auto_activate_first_in(&self, scope_id: &str) {
        let first = {
            let state = self.state.lock();
            if state.scopes.top_scope().id != scope_id {
                tracing::debug!(scope = scope_id, "auto-activation skipped; scope no longer on top");
                return;
            }
            state
                .registry
                .elements_in_scope(scope_id)
                .iter()
                .find(|element| !element.skip_in_navigation)
                .map(|element| element.id.clone())
        };
        match first {
            Some(id) => {
                self.activate_direct(&id, FocusReason::ScopeOpen);
            }
            None => {
                tracing::debug!(scope = scope_id, "auto-activation found no eligible element");
            }
        }
    }

    /// Number of open scopes, including the default scope.
    pub fn scope_depth(&self) -> usize {
        self.state.lock().scopes.depth()
    }

    /// Id of the topmost scope.
    pub fn current_scope_id(&self) -> String {
        self.state.lock().scopes.top_scope().id.clone()
    }

    // ==================== History ====================

    /// Replay the previous committed focus change, bypassing validation.
    pub fn undo_focus(&self) -> bool {
        let (id, previous) = {
            let mut state = self.state.lock();
            let Some(id) = state.history.undo().map(|entry| entry.element_id.clone()) else {
                return false;
            };
            if !state.registry.contains(&id) {
                tracing::debug!(element = %id, "undo target no longer registered");
                state.history.revert_undo();
                return false;
            }
            let previous = state.active.replace(id.clone());
            state.generation += 1;
            (id, previous)
        };
        self.replay(&id, previous, FocusReason::Undo)
    }

    /// Replay the next committed focus change, bypassing validation.
    pub fn redo_focus(&self) -> bool {
        let (id, previous) = {
            let mut state = self.state.lock();
            let Some(id) = state.history.redo().map(|entry| entry.element_id.clone()) else {
                return false;
            };
            if !state.registry.contains(&id) {
                tracing::debug!(element = %id, "redo target no longer registered");
                state.history.revert_redo();
                return false;
            }
            let previous = state.active.replace(id.clone());
            state.generation += 1;
            (id, previous)
        };
        self.replay(&id, previous, FocusReason::Redo)
    }

    fn replay(&self, id: &str, previous: Option<String>, reason: FocusReason) -> bool {
        let activate = self
            .state
            .lock()
            .registry
            .get(id)
            .map(|element| element.activate.clone());
        self.run_activation(id, activate);
        self.notify(EngineEvent::ActiveChanged {
            previous,
            current: Some(id.to_string()),
            reason,
        });
        true
    }

    /// Drop the history log. The active element is untouched.
    pub fn clear_history(&self) {
        self.state.lock().history.clear();
        self.notify(EngineEvent::HistoryCleared);
    }

    /// Number of retained history entries.
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    // ==================== Mode classification ====================

    /// Feed a navigation-relevant key event to the classifier.
    pub fn handle_key_signal(&self) {
        let changed = {
            let mut state = self.state.lock();
            state.classifier.on_key()
        };
        if changed {
            self.notify_mode();
        }
    }

    /// Feed a pointer movement to the classifier.
    pub fn handle_pointer_move(&self, dx: f32, dy: f32) {
        let changed = {
            let mut state = self.state.lock();
            state.classifier.on_pointer_move(dx, dy)
        };
        if changed {
            self.notify_mode();
        }
    }

    /// Feed a captured click to the classifier. Clicks on unregistered
    /// ids are not navigation signals and are ignored.
    pub fn handle_pointer_click(&self, id: &str) {
        let changed = {
            let mut state = self.state.lock();
            if !state.registry.contains(id) {
                return;
            }
            state.classifier.on_pointer_click()
        };
        if changed {
            self.notify_mode();
        }
    }

    /// Force the navigation mode, e.g. when handling a step-indicator
    /// click.
    pub fn set_navigation_mode(&self, mode: NavigationMode) {
        let changed = self.state.lock().classifier.set_mode(mode);
        if changed {
            self.notify_mode();
        }
    }

    /// The classifier's current mode.
    pub fn navigation_mode(&self) -> NavigationMode {
        self.state.lock().classifier.mode()
    }

    fn notify_mode(&self) {
        let mode = self.navigation_mode();
        self.notify(EngineEvent::ModeChanged(mode));
    }

    // ==================== Step projection ====================

    /// Derive the ordered progress view from the registry, the active
    /// element, visited history, and caller-supplied completion state.
    pub fn project_steps(&self, inputs: &StepInputs<'_>) -> Vec<StepView> {
        let state = self.state.lock();
        let elements = state.registry.all_elements();
        let visited = state.history.visited_ids();
        steps::project(&elements, state.active.as_deref(), &visited, inputs)
    }

    // ==================== Subscriptions & inspection ====================

    /// Subscribe to state-change notifications. Callbacks run after the
    /// commit, outside the engine's state lock.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(subscriber)));
        id
    }

    /// Remove a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn notify(&self, event: EngineEvent) {
        let subscribers: Vec<Subscriber> = self
            .observers
            .read()
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&event);
        }
    }

    /// The currently-active element id.
    pub fn active_element(&self) -> Option<String> {
        self.state.lock().active.clone()
    }

    /// Tear the engine down: every map cleared, scope stack back to the
    /// default scope, history emptied, classifier reset.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.registry.clear();
            state.scopes.clear();
            state.active = None;
            state.history.clear();
            state.classifier = ModeClassifier::new(self.config.initial_mode)
                .with_pointer_threshold(self.config.pointer_threshold);
            state.generation += 1;
            state.in_flight = false;
        }
        self.notify(EngineEvent::Reset);
    }
}

impl std::fmt::Debug for FocusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FocusEngine")
            .field("elements", &state.registry.len())
            .field("scope_depth", &state.scopes.depth())
            .field("active", &state.active)
            .field("mode", &state.classifier.mode())
            .field("history_len", &state.history.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scheduler::ImmediateScheduler;
    use std::sync::atomic::AtomicUsize;

    fn engine() -> Arc<FocusEngine> {
        FocusEngine::new(Arc::new(ImmediateScheduler))
    }

    fn element(id: &str, order: i32, scope: &str) -> FocusableElement {
        FocusableElement::builder(id).order(order).scope(scope).build()
    }

    #[tokio::test]
    async fn test_focus_first_and_next_walk() {
        let engine = engine();
        for (id, order) in [("a", 1), ("b", 2), ("c", 3)] {
            engine.register(element(id, order, "form")).unwrap();
        }

        assert!(engine.focus_first(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("a"));

        assert!(engine.focus_next(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("b"));

        assert!(engine.focus_previous(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("a"));

        assert!(engine.focus_last(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_focus_first_is_idempotent_at_boundary() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine.register(element("b", 2, "form")).unwrap();

        assert!(engine.focus_first(NavOptions::default()).await);
        assert!(engine.focus_first(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("a"));
        assert_eq!(engine.history_len(), 1, "no duplicate history entry");
    }

    #[tokio::test]
    async fn test_focus_last_is_idempotent_at_boundary() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine.register(element("b", 2, "form")).unwrap();

        assert!(engine.focus_last(NavOptions::default()).await);
        assert!(engine.focus_last(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("b"));
        assert_eq!(engine.history_len(), 1);
    }

    #[tokio::test]
    async fn test_focus_first_settles_on_active_when_earlier_rejects() {
        let engine = engine();
        engine
            .register(
                FocusableElement::builder("a")
                    .order(1)
                    .scope("form")
                    .can_receive(Validator::constant(false))
                    .build(),
            )
            .unwrap();
        engine.register(element("b", 2, "form")).unwrap();

        // "a" rejects focus, so the first eligible element is "b"
        assert!(engine.focus_first(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("b"));

        assert!(engine.focus_first(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("b"));
        assert_eq!(engine.history_len(), 1);
    }

    #[tokio::test]
    async fn test_boundary_stops_without_wrap() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine.register(element("b", 2, "form")).unwrap();

        engine.focus_last(NavOptions::default()).await;
        assert!(!engine.focus_next(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("b"));

        assert!(engine.focus_next(NavOptions::wrapping()).await);
        assert_eq!(engine.active_element().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_skip_in_navigation_is_scanned_over() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine
            .register(
                FocusableElement::builder("hidden")
                    .order(2)
                    .scope("form")
                    .skip_in_navigation(true)
                    .build(),
            )
            .unwrap();
        engine.register(element("c", 3, "form")).unwrap();

        engine.focus_first(NavOptions::default()).await;
        engine.focus_next(NavOptions::default()).await;
        assert_eq!(engine.active_element().as_deref(), Some("c"));

        // Still reachable by direct jump
        assert!(engine.focus_field("hidden", FocusReason::Programmatic).await);
    }

    #[tokio::test]
    async fn test_leave_gate_vetoes_all_transitions() {
        let engine = engine();
        engine
            .register(
                FocusableElement::builder("locked")
                    .order(1)
                    .scope("form")
                    .can_leave(Validator::constant(false))
                    .build(),
            )
            .unwrap();
        engine.register(element("b", 2, "form")).unwrap();

        engine.focus_first(NavOptions::default()).await;
        assert_eq!(engine.active_element().as_deref(), Some("locked"));

        assert!(!engine.focus_next(NavOptions::default()).await);
        assert!(!engine.focus_previous(NavOptions::wrapping()).await);
        assert!(!engine.focus_field("b", FocusReason::Programmatic).await);
        assert_eq!(engine.active_element().as_deref(), Some("locked"));
    }

    #[tokio::test]
    async fn test_receive_gate_skips_candidate() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine
            .register(
                FocusableElement::builder("b")
                    .order(2)
                    .scope("form")
                    .can_receive(Validator::constant(false))
                    .build(),
            )
            .unwrap();
        engine.register(element("c", 3, "form")).unwrap();

        engine.focus_first(NavOptions::default()).await;
        // b is skipped entirely, not merely blocked
        assert!(engine.focus_next(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_trap_forces_wrap_within_scope() {
        let engine = engine();
        engine.register(element("page", 1, "form")).unwrap();
        engine.push_scope(FocusScope::modal("dialog")).unwrap();
        engine.register(element("yes", 1, "dialog")).unwrap();
        engine.register(element("no", 2, "dialog")).unwrap();

        assert!(engine.focus_first(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("yes"));

        engine.focus_next(NavOptions::default()).await;
        assert_eq!(engine.active_element().as_deref(), Some("no"));

        // Boundary wraps inside the trap instead of escaping to "page"
        assert!(engine.focus_next(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_trap_blocks_direct_jump_out() {
        let engine = engine();
        engine.register(element("page", 1, "form")).unwrap();
        engine.push_scope(FocusScope::modal("dialog")).unwrap();
        engine.register(element("ok", 1, "dialog")).unwrap();

        assert!(!engine.focus_field("page", FocusReason::Programmatic).await);
        assert!(engine.focus_field("ok", FocusReason::Programmatic).await);
    }

    #[tokio::test]
    async fn test_pop_scope_restores_previous_focus() {
        let engine = engine();
        let restored = Arc::new(AtomicUsize::new(0));
        let counter = restored.clone();
        engine
            .register(
                FocusableElement::builder("field2")
                    .order(1)
                    .scope("form")
                    .on_activate(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .build(),
            )
            .unwrap();
        engine.focus_first(NavOptions::default()).await;
        assert_eq!(restored.load(Ordering::SeqCst), 1);

        engine.push_scope(FocusScope::modal("dialog")).unwrap();
        engine.register(element("ok", 1, "dialog")).unwrap();
        engine.focus_field("ok", FocusReason::Programmatic).await;

        engine.pop_scope().unwrap();
        assert_eq!(engine.active_element().as_deref(), Some("field2"));
        assert_eq!(restored.load(Ordering::SeqCst), 2, "exactly one restore");
    }

    #[tokio::test]
    async fn test_pop_scope_restore_missing_target_is_noop() {
        let engine = engine();
        engine.register(element("field2", 1, "form")).unwrap();
        engine.focus_first(NavOptions::default()).await;

        engine.push_scope(FocusScope::modal("dialog")).unwrap();
        engine.unregister("field2");
        engine.pop_scope().unwrap();
        assert_eq!(engine.active_element(), None);
    }

    #[test]
    fn test_pop_default_scope_is_error() {
        let engine = engine();
        assert!(engine.pop_scope().is_err());
    }

    #[test]
    fn test_duplicate_scope_push_is_error() {
        let engine = engine();
        engine.push_scope(FocusScope::modal("dialog")).unwrap();
        assert!(engine.push_scope(FocusScope::modal("dialog")).is_err());
    }

    #[tokio::test]
    async fn test_auto_activate_first_on_push() {
        let engine = engine();
        engine.register(element("ok", 1, "dialog")).unwrap();
        engine
            .push_scope(FocusScope::modal("dialog").auto_activate_first(true))
            .unwrap();
        assert_eq!(engine.active_element().as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_escape_honors_scope_options() {
        let engine = engine();
        engine
            .push_scope(FocusScope::modal("sticky").options(ScopeOptions::SCROLL_LOCK))
            .unwrap();
        assert!(!engine.escape(), "scope does not close on escape");
        assert_eq!(engine.scope_depth(), 2);

        engine.pop_scope().unwrap();
        engine.push_scope(FocusScope::modal("dialog")).unwrap();
        assert!(engine.escape());
        assert_eq!(engine.scope_depth(), 1);
        assert!(!engine.escape(), "default scope never escapes");
    }

    #[tokio::test]
    async fn test_undo_redo_replays_without_validation() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        // b rejects new activations, but undo/redo bypass the gate
        engine
            .register(
                FocusableElement::builder("b")
                    .order(2)
                    .scope("form")
                    .build(),
            )
            .unwrap();

        engine.focus_first(NavOptions::default()).await;
        engine.focus_next(NavOptions::default()).await;
        assert_eq!(engine.active_element().as_deref(), Some("b"));

        engine
            .update("b", ElementPatch::new().can_receive(Some(Validator::constant(false))))
            .unwrap();

        assert!(engine.undo_focus());
        assert_eq!(engine.active_element().as_deref(), Some("a"));
        assert!(engine.redo_focus());
        assert_eq!(engine.active_element().as_deref(), Some("b"));
        assert!(!engine.redo_focus(), "index stays within bounds");
    }

    #[tokio::test]
    async fn test_clear_history_keeps_active() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine.focus_first(NavOptions::default()).await;

        engine.clear_history();
        assert_eq!(engine.history_len(), 0);
        assert_eq!(engine.active_element().as_deref(), Some("a"));
        assert!(!engine.undo_focus());
    }

    #[tokio::test]
    async fn test_unregister_active_clears_activity() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine.focus_first(NavOptions::default()).await;

        engine.unregister("a");
        assert_eq!(engine.active_element(), None);
        assert!(!engine.is_registered("a"));
    }

    #[tokio::test]
    async fn test_events_are_delivered() {
        let engine = engine();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = engine.subscribe(move |event| {
            sink.lock().push(format!("{event:?}"));
        });

        engine.register(element("a", 1, "form")).unwrap();
        engine.focus_first(NavOptions::default()).await;
        engine.push_scope(FocusScope::modal("dialog")).unwrap();
        engine.pop_scope().unwrap();
        engine.set_navigation_mode(NavigationMode::Hybrid);

        let log = events.lock().clone();
        assert!(log.iter().any(|e| e.contains("ActiveChanged")));
        assert!(log.iter().any(|e| e.contains("ScopePushed")));
        assert!(log.iter().any(|e| e.contains("ScopePopped")));
        assert!(log.iter().any(|e| e.contains("ModeChanged")));

        assert!(engine.unsubscribe(subscription));
        assert!(!engine.unsubscribe(subscription));
    }

    #[tokio::test]
    async fn test_can_jump_to_policies() {
        let engine = engine();
        engine
            .register(
                FocusableElement::builder("a")
                    .order(1)
                    .scope("form")
                    .required(true)
                    .build(),
            )
            .unwrap();
        engine
            .register(
                FocusableElement::builder("b")
                    .order(2)
                    .scope("form")
                    .build(),
            )
            .unwrap();
        engine
            .register(
                FocusableElement::builder("free")
                    .order(3)
                    .scope("form")
                    .allow_direct_jump(true)
                    .build(),
            )
            .unwrap();

        let none = FxHashSet::default();
        let mut completed = FxHashSet::default();

        assert!(!engine.can_jump_to("b", &none, None), "a incomplete");
        assert!(engine.can_jump_to("free", &none, None), "flag wins");

        completed.insert("a".to_string());
        assert!(engine.can_jump_to("b", &completed, None));

        // Custom validator as an extra allowance
        let allow_all = |_: &FocusableElement| true;
        assert!(engine.can_jump_to("b", &none, Some(&allow_all)));

        assert!(!engine.can_jump_to("ghost", &none, None));
    }

    #[tokio::test]
    async fn test_allow_any_jump_policy_overrides_flags() {
        let engine = FocusEngine::with_config(
            EngineConfig::new().jump_policy(JumpPolicy::AllowAny),
            Arc::new(ImmediateScheduler),
        );
        engine
            .register(
                FocusableElement::builder("a")
                    .order(1)
                    .scope("form")
                    .required(true)
                    .build(),
            )
            .unwrap();
        engine.register(element("b", 2, "form")).unwrap();

        let none = FxHashSet::default();
        assert!(engine.can_jump_to("b", &none, None));
    }

    #[tokio::test]
    async fn test_reset_tears_down() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine.push_scope(FocusScope::modal("dialog")).unwrap();
        engine.focus_first(NavOptions::default()).await;

        engine.reset();
        assert_eq!(engine.element_count(), 0);
        assert_eq!(engine.scope_depth(), 1);
        assert_eq!(engine.active_element(), None);
        assert_eq!(engine.history_len(), 0);
        assert_eq!(engine.navigation_mode(), NavigationMode::Auto);
    }

    #[tokio::test]
    async fn test_focus_field_to_active_element_is_trivially_true() {
        let engine = engine();
        engine.register(element("a", 1, "form")).unwrap();
        engine.focus_first(NavOptions::default()).await;

        assert!(engine.focus_field("a", FocusReason::Programmatic).await);
        assert_eq!(engine.history_len(), 1, "no duplicate history entry");
    }

    #[tokio::test]
    async fn test_wrap_default_config() {
        let engine = FocusEngine::with_config(
            EngineConfig::new().wrap_default(true),
            Arc::new(ImmediateScheduler),
        );
        engine.register(element("a", 1, "form")).unwrap();
        engine.register(element("b", 2, "form")).unwrap();

        engine.focus_last(NavOptions::default()).await;
        // Unset per-call wrap falls back to the config default
        assert!(engine.focus_next(NavOptions::default()).await);
        assert_eq!(engine.active_element().as_deref(), Some("a"));

        // Explicit per-call option still wins
        engine.focus_last(NavOptions::default()).await;
        assert!(!engine.focus_next(NavOptions::new().wrap(false)).await);
    }
}
