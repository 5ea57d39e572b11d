//! Focus scopes and the scope stack.
//!
//! A scope is an isolation context - typically one per open modal - that
//! can restrict the navigable candidate set (`trap_focus`) and remembers
//! where to restore activity when it closes. Scopes form a stack: the
//! default scope sits at the bottom and can never be popped; every pushed
//! scope records a snapshot of the element that was active at push time.
//!
//! # Example
//!
//! ```
//! use focal::scope::{FocusScope, ScopeOptions};
//!
//! let dialog = FocusScope::modal("allergy-warning")
//!     .trap_focus(true)
//!     .auto_activate_first(true)
//!     .options(ScopeOptions::ESCAPE_CLOSES | ScopeOptions::SCROLL_LOCK);
//! assert!(dialog.trap_focus);
//! ```

use bitflags::bitflags;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};

/// Id of the always-present root scope.
pub const DEFAULT_SCOPE_ID: &str = "default";

/// Callback run when a scope is popped.
pub type OnCloseFn = Arc<dyn Fn() + Send + Sync>;

bitflags! {
    /// Close policies carried on a scope. The engine stores and exposes
    /// these; enforcement (dismissing on Escape, locking scroll) is the
    /// rendering layer's job, except for [`ScopeOptions::ESCAPE_CLOSES`]
    /// which the engine's `escape()` convenience honors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScopeOptions: u8 {
        /// Escape key closes this scope.
        const ESCAPE_CLOSES = 1 << 0;
        /// A click outside the scope's surface closes it.
        const OUTSIDE_CLICK_CLOSES = 1 << 1;
        /// Background scrolling is locked while the scope is open.
        const SCROLL_LOCK = 1 << 2;
    }
}

impl Default for ScopeOptions {
    fn default() -> Self {
        ScopeOptions::ESCAPE_CLOSES
    }
}

/// What kind of isolation context a scope represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Modal dialog.
    Modal,
    /// Dropdown overlay.
    Dropdown,
    /// Menu overlay.
    Menu,
    /// The root scope.
    Default,
}

/// An isolation context for focus.
#[derive(Clone)]
pub struct FocusScope {
    /// Unique id among open scopes.
    pub id: String,
    /// What kind of context this is.
    pub kind: ScopeKind,
    /// Optional parent scope id for nested overlays.
    pub parent_scope_id: Option<String>,
    /// Restrict next/previous candidates to this scope's own elements,
    /// with wrap forced on at the boundary.
    pub trap_focus: bool,
    /// Element to reactivate when the scope closes. When unset, the
    /// element active at push time is used.
    pub restore_focus_to: Option<String>,
    /// Whether closing the scope restores focus at all.
    pub restore_on_close: bool,
    /// Activate the first eligible element of the scope after pushing.
    pub auto_activate_first: bool,
    /// Close policies.
    pub options: ScopeOptions,
    /// When the scope was created.
    pub created_at: Instant,
    /// Invoked when the scope is popped.
    pub(crate) on_close: Option<OnCloseFn>,
}

impl FocusScope {
    /// Create a scope of the given kind.
    pub fn new(id: impl Into<String>, kind: ScopeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_scope_id: None,
            trap_focus: false,
            restore_focus_to: None,
            restore_on_close: true,
            auto_activate_first: false,
            options: ScopeOptions::default(),
            created_at: Instant::now(),
            on_close: None,
        }
    }

    /// Create a modal scope (trapping by default).
    pub fn modal(id: impl Into<String>) -> Self {
        let mut scope = Self::new(id, ScopeKind::Modal);
        scope.trap_focus = true;
        scope
    }

    /// Create a dropdown scope.
    pub fn dropdown(id: impl Into<String>) -> Self {
        Self::new(id, ScopeKind::Dropdown)
    }

    /// Create a menu scope.
    pub fn menu(id: impl Into<String>) -> Self {
        Self::new(id, ScopeKind::Menu)
    }

    pub(crate) fn default_scope() -> Self {
        Self::new(DEFAULT_SCOPE_ID, ScopeKind::Default)
    }

    /// Set the parent scope id.
    pub fn parent(mut self, parent_scope_id: impl Into<String>) -> Self {
        self.parent_scope_id = Some(parent_scope_id.into());
        self
    }

    /// Set whether the scope traps focus.
    pub fn trap_focus(mut self, trap: bool) -> Self {
        self.trap_focus = trap;
        self
    }

    /// Override the element to restore on close.
    pub fn restore_focus_to(mut self, id: impl Into<String>) -> Self {
        self.restore_focus_to = Some(id.into());
        self
    }

    /// Disable restoration entirely.
    pub fn restore_on_close(mut self, restore: bool) -> Self {
        self.restore_on_close = restore;
        self
    }

    /// Activate the first eligible element after pushing.
    pub fn auto_activate_first(mut self, auto: bool) -> Self {
        self.auto_activate_first = auto;
        self
    }

    /// Set the close policies.
    pub fn options(mut self, options: ScopeOptions) -> Self {
        self.options = options;
        self
    }

    /// Run a callback when the scope is popped.
    pub fn on_close<F>(mut self, on_close: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(on_close));
        self
    }
}

impl std::fmt::Debug for FocusScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusScope")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("trap_focus", &self.trap_focus)
            .field("restore_focus_to", &self.restore_focus_to)
            .field("restore_on_close", &self.restore_on_close)
            .field("auto_activate_first", &self.auto_activate_first)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Stack entry created on push and consumed on pop.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    /// The pushed scope.
    pub scope: FocusScope,
    /// Snapshot of the active element at push time; the default
    /// restoration target.
    pub previous_focus_id: Option<String>,
}

impl ScopeEntry {
    /// The element to reactivate when this entry is popped, if any.
    pub fn restore_target(&self) -> Option<&str> {
        if !self.scope.restore_on_close {
            return None;
        }
        self.scope
            .restore_focus_to
            .as_deref()
            .or(self.previous_focus_id.as_deref())
    }
}

/// Stack of isolation contexts. The default scope is held apart from the
/// pushed overlays, so it structurally cannot be popped.
#[derive(Debug)]
pub struct ScopeStack {
    base: ScopeEntry,
    overlays: SmallVec<[ScopeEntry; 4]>,
}

impl ScopeStack {
    /// Create a stack holding only the default scope.
    pub fn new() -> Self {
        Self {
            base: ScopeEntry {
                scope: FocusScope::default_scope(),
                previous_focus_id: None,
            },
            overlays: SmallVec::new(),
        }
    }

    /// Number of open scopes, including the default scope.
    pub fn depth(&self) -> usize {
        1 + self.overlays.len()
    }

    /// The topmost entry.
    pub fn top(&self) -> &ScopeEntry {
        self.overlays.last().unwrap_or(&self.base)
    }

    /// The topmost scope.
    pub fn top_scope(&self) -> &FocusScope {
        &self.top().scope
    }

    /// Whether a scope id is currently open.
    pub fn contains(&self, id: &str) -> bool {
        id == DEFAULT_SCOPE_ID || self.overlays.iter().any(|entry| entry.scope.id == id)
    }

    /// Whether the topmost scope traps focus.
    pub fn is_trapped(&self) -> bool {
        self.top_scope().trap_focus
    }

    /// Push a scope with its previous-focus snapshot. Fails if the id is
    /// already open.
    pub fn push(&mut self, scope: FocusScope, previous_focus_id: Option<String>) -> Result<()> {
        if self.contains(&scope.id) {
            return Err(Error::ScopeAlreadyOpen { id: scope.id });
        }
        self.overlays.push(ScopeEntry {
            scope,
            previous_focus_id,
        });
        Ok(())
    }

    /// Pop the topmost scope. Fails on the default scope.
    pub fn pop(&mut self) -> Result<ScopeEntry> {
        self.overlays.pop().ok_or(Error::CannotPopDefault)
    }

    /// Scope ids from the topmost scope down to the default scope.
    pub fn chain_top_down(&self) -> impl Iterator<Item = &str> {
        self.overlays
            .iter()
            .rev()
            .map(|entry| entry.scope.id.as_str())
            .chain(std::iter::once(DEFAULT_SCOPE_ID))
    }

    /// Drop every non-default scope.
    pub fn clear(&mut self) {
        self.overlays.clear();
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_starts_with_default() {
        let stack = ScopeStack::new();
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.top_scope().id, DEFAULT_SCOPE_ID);
        assert!(!stack.is_trapped());
    }

    #[test]
    fn test_push_and_pop() {
        let mut stack = ScopeStack::new();
        stack
            .push(FocusScope::modal("dialog"), Some("field2".into()))
            .unwrap();
        assert_eq!(stack.depth(), 2);
        assert!(stack.is_trapped());
        assert!(stack.contains("dialog"));

        let entry = stack.pop().unwrap();
        assert_eq!(entry.scope.id, "dialog");
        assert_eq!(entry.previous_focus_id.as_deref(), Some("field2"));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_pop_default_fails() {
        let mut stack = ScopeStack::new();
        assert_eq!(stack.pop().unwrap_err(), Error::CannotPopDefault);
    }

    #[test]
    fn test_duplicate_push_fails() {
        let mut stack = ScopeStack::new();
        stack.push(FocusScope::modal("dialog"), None).unwrap();
        let err = stack.push(FocusScope::modal("dialog"), None).unwrap_err();
        assert_eq!(err, Error::ScopeAlreadyOpen { id: "dialog".into() });
    }

    #[test]
    fn test_restore_target_precedence() {
        // Explicit override wins over the push-time snapshot
        let entry = ScopeEntry {
            scope: FocusScope::modal("dialog").restore_focus_to("summary"),
            previous_focus_id: Some("field2".into()),
        };
        assert_eq!(entry.restore_target(), Some("summary"));

        // Snapshot is the default
        let entry = ScopeEntry {
            scope: FocusScope::modal("dialog"),
            previous_focus_id: Some("field2".into()),
        };
        assert_eq!(entry.restore_target(), Some("field2"));

        // Restoration disabled
        let entry = ScopeEntry {
            scope: FocusScope::modal("dialog").restore_on_close(false),
            previous_focus_id: Some("field2".into()),
        };
        assert_eq!(entry.restore_target(), None);
    }

    #[test]
    fn test_chain_top_down() {
        let mut stack = ScopeStack::new();
        stack.push(FocusScope::dropdown("units"), None).unwrap();
        stack.push(FocusScope::modal("confirm"), None).unwrap();
        let chain: Vec<&str> = stack.chain_top_down().collect();
        assert_eq!(chain, vec!["confirm", "units", DEFAULT_SCOPE_ID]);
    }

    #[test]
    fn test_clear_keeps_default() {
        let mut stack = ScopeStack::new();
        stack.push(FocusScope::modal("dialog"), None).unwrap();
        stack.clear();
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.top_scope().id, DEFAULT_SCOPE_ID);
    }

    #[test]
    fn test_modal_traps_by_default() {
        assert!(FocusScope::modal("m").trap_focus);
        assert!(!FocusScope::dropdown("d").trap_focus);
        assert!(!FocusScope::menu("m").trap_focus);
    }

    #[test]
    fn test_default_options_allow_escape() {
        let scope = FocusScope::modal("dialog");
        assert!(scope.options.contains(ScopeOptions::ESCAPE_CLOSES));
        assert!(!scope.options.contains(ScopeOptions::SCROLL_LOCK));
    }
}
