//! Step projection: the derived progress view for an external indicator.
//!
//! For every registered element carrying [`StepMetadata`], the projector
//! computes a status (complete / current / upcoming / disabled) and
//! whether the step may be clicked to jump directly. Completion and skip
//! state come from the caller's domain logic - the engine never decides
//! on its own that a step is done.
//!
//! [`StepMetadata`]: crate::element::StepMetadata

use crate::element::FocusableElement;
use rustc_hash::FxHashSet;

/// Status of one projected step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The step's element is the active element.
    Current,
    /// Present in the caller-supplied completed set.
    Complete,
    /// Present in the caller-supplied skipped set.
    Disabled,
    /// Everything else.
    Upcoming,
}

/// Caller-supplied domain state feeding the projection.
#[derive(Debug, Clone, Copy)]
pub struct StepInputs<'a> {
    /// Elements the domain considers complete.
    pub completed: &'a FxHashSet<String>,
    /// Elements the domain considers skipped/bypassed.
    pub skipped: &'a FxHashSet<String>,
    /// Allow jumping back to any step the user has already visited.
    pub jump_to_visited: bool,
}

impl<'a> StepInputs<'a> {
    /// Build inputs from completed and skipped sets.
    pub fn new(completed: &'a FxHashSet<String>, skipped: &'a FxHashSet<String>) -> Self {
        Self {
            completed,
            skipped,
            jump_to_visited: false,
        }
    }

    /// Enable jump-to-visited clickability.
    pub fn jump_to_visited(mut self, enabled: bool) -> Self {
        self.jump_to_visited = enabled;
        self
    }
}

/// One row of the projected step view, sorted ascending by `order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepView {
    /// The underlying element id.
    pub id: String,
    /// The element's order.
    pub order: i32,
    /// Step label.
    pub label: String,
    /// Optional step description.
    pub description: Option<String>,
    /// Derived status.
    pub status: StepStatus,
    /// Whether the indicator may offer this step as a click target.
    pub is_clickable: bool,
}

/// Project the step view from ordered elements plus external state.
///
/// `elements` must already be sorted ascending by order (the registry
/// guarantees this); entries without step metadata are ignored.
pub(crate) fn project(
    elements: &[&FocusableElement],
    active_id: Option<&str>,
    visited: &FxHashSet<String>,
    inputs: &StepInputs<'_>,
) -> Vec<StepView> {
    let steps: Vec<&FocusableElement> = elements
        .iter()
        .copied()
        .filter(|element| element.step.is_some())
        .collect();

    let mut view = Vec::with_capacity(steps.len());
    for (position, element) in steps.iter().enumerate() {
        let status = if active_id == Some(element.id.as_str()) {
            StepStatus::Current
        } else if inputs.completed.contains(&element.id) {
            StepStatus::Complete
        } else if inputs.skipped.contains(&element.id) {
            StepStatus::Disabled
        } else {
            StepStatus::Upcoming
        };

        let predecessors_complete = steps[..position].iter().all(|earlier| {
            !earlier.required
                || inputs.skipped.contains(&earlier.id)
                || inputs.completed.contains(&earlier.id)
        });

        let is_clickable = position == 0
            || status == StepStatus::Complete
            || (inputs.jump_to_visited && visited.contains(&element.id))
            || predecessors_complete;

        // Step metadata presence is the filter above.
        let Some(step) = element.step.as_ref() else {
            continue;
        };
        view.push(StepView {
            id: element.id.clone(),
            order: element.order,
            label: step.label.clone(),
            description: step.description.clone(),
            status,
            is_clickable,
        });
    }
    view
}
