//! Focusable element descriptors.
//!
//! A [`FocusableElement`] is the engine's entire knowledge of one
//! navigable unit: an opaque id, an ordering, the scope it belongs to,
//! its gatekeeping validators, and an injected activation callback. The
//! engine never holds a handle to a concrete widget - giving the
//! on-screen control real input focus is the rendering layer's job,
//! performed inside the callback supplied at registration time.
//!
//! # Example
//!
//! ```
//! use focal::element::FocusableElement;
//!
//! let field = FocusableElement::builder("dosage")
//!     .order(3)
//!     .scope("prescription-form")
//!     .required(true)
//!     .step("Dosage")
//!     .on_activate(|| { /* give the dosage input focus */ })
//!     .build();
//!
//! assert_eq!(field.id, "dosage");
//! assert_eq!(field.order, 3);
//! ```

use crate::scope::DEFAULT_SCOPE_ID;
use crate::validate::Validator;
use std::sync::Arc;
use std::time::Instant;

/// Activation callback injected by the rendering layer.
pub type ActivateFn = Arc<dyn Fn() + Send + Sync>;

/// Pointer-interaction policy for one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseNavigation {
    /// Whether a pointer click may jump directly to this element even when
    /// earlier required elements are incomplete.
    pub allow_direct_jump: bool,
    /// Whether a pointer interaction keeps the element's place in the
    /// sequential flow (as opposed to restarting the scan from it).
    pub preserve_flow_on_interaction: bool,
    /// Whether completing a click interaction advances to the next element.
    pub click_advances: bool,
}

impl Default for MouseNavigation {
    fn default() -> Self {
        Self {
            allow_direct_jump: false,
            preserve_flow_on_interaction: true,
            click_advances: false,
        }
    }
}

/// Marks an element for inclusion in the projected step view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMetadata {
    /// Short label shown by the step indicator.
    pub label: String,
    /// Optional longer description.
    pub description: Option<String>,
}

impl StepMetadata {
    /// Create step metadata with a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
        }
    }

    /// Add a description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One navigable unit as known to the engine.
#[derive(Clone)]
pub struct FocusableElement {
    /// Unique id within the registry.
    pub id: String,
    /// Position in the sequential order of its scope.
    pub order: i32,
    /// The isolation context this element belongs to.
    pub scope_id: String,
    /// Skipped by `focus_next` / `focus_previous` scans (still reachable
    /// by direct jump).
    pub skip_in_navigation: bool,
    /// Whether this element must be complete before later elements may be
    /// jumped to.
    pub required: bool,
    /// Gate consulted before this element may become active.
    pub can_receive_focus: Option<Validator>,
    /// Gate consulted before activity may leave this element.
    pub can_leave_focus: Option<Validator>,
    /// Pointer-interaction policy.
    pub mouse: MouseNavigation,
    /// Present when the element appears in the projected step view.
    pub step: Option<StepMetadata>,
    /// Optional parent for nested composite fields.
    pub parent_id: Option<String>,
    /// When the element was registered.
    pub registered_at: Instant,
    /// Injected activation callback.
    pub(crate) activate: ActivateFn,
}

impl FocusableElement {
    /// Start building an element with the given id. Defaults: order 0,
    /// the default scope, no validators, no step metadata, no-op
    /// activation.
    pub fn builder(id: impl Into<String>) -> ElementBuilder {
        ElementBuilder::new(id)
    }
}

impl std::fmt::Debug for FocusableElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusableElement")
            .field("id", &self.id)
            .field("order", &self.order)
            .field("scope_id", &self.scope_id)
            .field("skip_in_navigation", &self.skip_in_navigation)
            .field("required", &self.required)
            .field("can_receive_focus", &self.can_receive_focus)
            .field("can_leave_focus", &self.can_leave_focus)
            .field("mouse", &self.mouse)
            .field("step", &self.step)
            .field("parent_id", &self.parent_id)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FocusableElement`].
#[derive(Clone)]
pub struct ElementBuilder {
    element: FocusableElement,
}

impl ElementBuilder {
    /// Create a builder with defaults.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            element: FocusableElement {
                id: id.into(),
                order: 0,
                scope_id: DEFAULT_SCOPE_ID.to_string(),
                skip_in_navigation: false,
                required: false,
                can_receive_focus: None,
                can_leave_focus: None,
                mouse: MouseNavigation::default(),
                step: None,
                parent_id: None,
                registered_at: Instant::now(),
                activate: Arc::new(|| {}),
            },
        }
    }

    /// Set the sequential order.
    pub fn order(mut self, order: i32) -> Self {
        self.element.order = order;
        self
    }

    /// Set the owning scope.
    pub fn scope(mut self, scope_id: impl Into<String>) -> Self {
        self.element.scope_id = scope_id.into();
        self
    }

    /// Skip this element during sequential scans.
    pub fn skip_in_navigation(mut self, skip: bool) -> Self {
        self.element.skip_in_navigation = skip;
        self
    }

    /// Mark the element as required for downstream jumps.
    pub fn required(mut self, required: bool) -> Self {
        self.element.required = required;
        self
    }

    /// Gate activation of this element.
    pub fn can_receive(mut self, validator: Validator) -> Self {
        self.element.can_receive_focus = Some(validator);
        self
    }

    /// Gate departure from this element.
    pub fn can_leave(mut self, validator: Validator) -> Self {
        self.element.can_leave_focus = Some(validator);
        self
    }

    /// Set the pointer-interaction policy.
    pub fn mouse(mut self, mouse: MouseNavigation) -> Self {
        self.element.mouse = mouse;
        self
    }

    /// Allow pointer clicks to jump directly to this element.
    pub fn allow_direct_jump(mut self, allow: bool) -> Self {
        self.element.mouse.allow_direct_jump = allow;
        self
    }

    /// Include the element in the step projection under this label.
    pub fn step(mut self, label: impl Into<String>) -> Self {
        self.element.step = Some(StepMetadata::new(label));
        self
    }

    /// Include the element in the step projection with full metadata.
    pub fn step_metadata(mut self, step: StepMetadata) -> Self {
        self.element.step = Some(step);
        self
    }

    /// Set the parent element for nested composite fields.
    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.element.parent_id = Some(parent_id.into());
        self
    }

    /// Set the activation callback.
    pub fn on_activate<F>(mut self, activate: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.element.activate = Arc::new(activate);
        self
    }

    /// Finish building.
    pub fn build(self) -> FocusableElement {
        self.element
    }
}

/// Partial update applied by `update`: only set fields are merged, and
/// `id` / `registered_at` never change.
#[derive(Debug, Clone, Default)]
pub struct ElementPatch {
    /// New sequential order.
    pub order: Option<i32>,
    /// New skip flag.
    pub skip_in_navigation: Option<bool>,
    /// New required flag.
    pub required: Option<bool>,
    /// New pointer policy.
    pub mouse: Option<MouseNavigation>,
    /// Replace (or clear, with `Some(None)`) the step metadata.
    pub step: Option<Option<StepMetadata>>,
    /// Replace (or clear) the receive validator.
    pub can_receive_focus: Option<Option<Validator>>,
    /// Replace (or clear) the leave validator.
    pub can_leave_focus: Option<Option<Validator>>,
    /// Replace (or clear) the parent id.
    pub parent_id: Option<Option<String>>,
}

impl ElementPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch the order.
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Patch the skip flag.
    pub fn skip_in_navigation(mut self, skip: bool) -> Self {
        self.skip_in_navigation = Some(skip);
        self
    }

    /// Patch the required flag.
    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Patch the pointer policy.
    pub fn mouse(mut self, mouse: MouseNavigation) -> Self {
        self.mouse = Some(mouse);
        self
    }

    /// Patch the step metadata.
    pub fn step(mut self, step: Option<StepMetadata>) -> Self {
        self.step = Some(step);
        self
    }

    /// Patch the receive validator.
    pub fn can_receive(mut self, validator: Option<Validator>) -> Self {
        self.can_receive_focus = Some(validator);
        self
    }

    /// Patch the leave validator.
    pub fn can_leave(mut self, validator: Option<Validator>) -> Self {
        self.can_leave_focus = Some(validator);
        self
    }

    /// Apply the patch to an element in place.
    pub(crate) fn apply(self, element: &mut FocusableElement) {
        if let Some(order) = self.order {
            element.order = order;
        }
        if let Some(skip) = self.skip_in_navigation {
            element.skip_in_navigation = skip;
        }
        if let Some(required) = self.required {
            element.required = required;
        }
        if let Some(mouse) = self.mouse {
            element.mouse = mouse;
        }
        if let Some(step) = self.step {
            element.step = step;
        }
        if let Some(validator) = self.can_receive_focus {
            element.can_receive_focus = validator;
        }
        if let Some(validator) = self.can_leave_focus {
            element.can_leave_focus = validator;
        }
        if let Some(parent) = self.parent_id {
            element.parent_id = parent;
        }
    }
}
