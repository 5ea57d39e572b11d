//! # focal
//!
//! A headless focus-navigation engine for large, multi-step, multi-modal
//! forms. `focal` decides which single interactive element is "active"
//! at every moment and governs how that activity moves in response to
//! keyboard input, pointer input, and programmatic requests. It renders
//! nothing and knows nothing about any widget technology: the rendering
//! layer registers opaque element ids with injected activation
//! callbacks, and subscribes to state-change notifications to know when
//! to re-render.
//!
//! # Architecture
//!
//! - [`registry`] - the authoritative table of registered elements.
//! - [`validate`] - uniform sync/async gatekeeping before transitions.
//! - [`scope`] - stack-disciplined isolation contexts (modals, menus)
//!   with focus trapping and restore-on-close.
//! - [`engine`] - the navigation engine: next/previous/first/last/direct
//!   jump, scope operations, subscriptions.
//! - [`mode`] - classification of the input modality (keyboard, pointer,
//!   hybrid).
//! - [`history`] - append-only log of committed changes with undo/redo.
//! - [`steps`] - the derived progress view for an external step
//!   indicator.
//! - [`scheduler`] - injected deferred-execution primitive for
//!   activations that must wait for the next frame.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use focal::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = FocusEngine::new(Arc::new(ImmediateScheduler));
//!
//! for (id, order) in [("name", 1), ("dose", 2), ("route", 3)] {
//!     engine
//!         .register(
//!             FocusableElement::builder(id)
//!                 .order(order)
//!                 .scope("prescription")
//!                 .step(id.to_uppercase())
//!                 .build(),
//!         )
//!         .unwrap();
//! }
//!
//! engine.focus_first(NavOptions::default()).await;
//! engine.focus_next(NavOptions::default()).await;
//! assert_eq!(engine.active_element().as_deref(), Some("dose"));
//!
//! // A modal interrupts; closing it restores focus to "dose".
//! engine.push_scope(FocusScope::modal("allergy-warning")).unwrap();
//! engine.pop_scope().unwrap();
//! assert_eq!(engine.active_element().as_deref(), Some("dose"));
//! # }
//! ```
//!
//! # Error policy
//!
//! Integration misuse (duplicate registration, popping the default
//! scope, pushing an already-open scope) returns [`Error`] synchronously
//! so it surfaces during development. Runtime conditions arising from
//! user input or timing - a failed validator, a vanished restore target,
//! no eligible next element - are recoverable: navigation operations
//! report them as `false` and log the detail via [`tracing`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod element;
pub mod engine;
pub mod error;
pub mod history;
pub mod mode;
pub mod registry;
pub mod scheduler;
pub mod scope;
pub mod steps;
pub mod validate;

pub use element::{ElementPatch, FocusableElement, MouseNavigation, StepMetadata};
pub use engine::{
    EngineConfig, EngineEvent, FocusEngine, JumpPolicy, NavOptions, SubscriptionId,
};
pub use error::{Error, Result, ValidationError};
pub use history::{FocusReason, HistoryEntry};
pub use mode::NavigationMode;
pub use scheduler::{ImmediateScheduler, QueueScheduler, Scheduler};
pub use scope::{FocusScope, ScopeKind, ScopeOptions, DEFAULT_SCOPE_ID};
pub use steps::{StepInputs, StepStatus, StepView};
pub use validate::{ValidationCtx, Validator};

/// Convenience re-exports for the common path.
pub mod prelude {
    pub use crate::element::{ElementPatch, FocusableElement, MouseNavigation, StepMetadata};
    pub use crate::engine::{
        EngineConfig, EngineEvent, FocusEngine, JumpPolicy, NavOptions, SubscriptionId,
    };
    pub use crate::error::{Error, Result, ValidationError};
    pub use crate::history::{FocusReason, HistoryEntry};
    pub use crate::mode::NavigationMode;
    pub use crate::scheduler::{ImmediateScheduler, QueueScheduler, Scheduler};
    pub use crate::scope::{FocusScope, ScopeKind, ScopeOptions};
    pub use crate::steps::{StepInputs, StepStatus, StepView};
    pub use crate::validate::{ValidationCtx, Validator};
}
