//! Element registry: the authoritative table of focusable elements.
//!
//! Keyed by element id, with a secondary index from scope id to member
//! ids. Registration order is preserved (`IndexMap`), which also breaks
//! ties between elements sharing the same `order` value.

use crate::element::{ElementPatch, FocusableElement};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Ids of elements belonging to one scope, in registration order.
type ScopeMembers = SmallVec<[String; 8]>;

/// The authoritative table of currently-registered focusable elements.
#[derive(Debug, Default)]
pub struct ElementRegistry {
    elements: IndexMap<String, FocusableElement>,
    by_scope: FxHashMap<String, ScopeMembers>,
}

impl ElementRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an element. Fails if the id is already present.
    pub fn register(&mut self, element: FocusableElement) -> Result<()> {
        if self.elements.contains_key(&element.id) {
            return Err(Error::DuplicateElement {
                id: element.id.clone(),
            });
        }
        self.by_scope
            .entry(element.scope_id.clone())
            .or_default()
            .push(element.id.clone());
        self.elements.insert(element.id.clone(), element);
        Ok(())
    }

    /// Remove an element, returning it if it was registered.
    ///
    /// `shift_remove` keeps registration order for the survivors.
    pub fn unregister(&mut self, id: &str) -> Option<FocusableElement> {
        let element = self.elements.shift_remove(id)?;
        if let Some(members) = self.by_scope.get_mut(&element.scope_id) {
            members.retain(|member| member != id);
            if members.is_empty() {
                self.by_scope.remove(&element.scope_id);
            }
        }
        Some(element)
    }

    /// Merge a partial update into an element. `id` and `registered_at`
    /// are never touched.
    pub fn update(&mut self, id: &str, patch: ElementPatch) -> Result<()> {
        let element = self
            .elements
            .get_mut(id)
            .ok_or_else(|| Error::UnknownElement { id: id.to_string() })?;
        patch.apply(element);
        Ok(())
    }

    /// Look up an element by id.
    pub fn get(&self, id: &str) -> Option<&FocusableElement> {
        self.elements.get(id)
    }

    /// Whether an element id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    /// Number of registered elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements in a scope, ascending by `order` with registration
    /// order breaking ties.
    pub fn elements_in_scope(&self, scope_id: &str) -> Vec<&FocusableElement> {
        let mut members: Vec<&FocusableElement> = self
            .by_scope
            .get(scope_id)
            .map(|ids| ids.iter().filter_map(|id| self.elements.get(id)).collect())
            .unwrap_or_default();
        members.sort_by_key(|element| element.order);
        members
    }

    /// All registered elements, ascending by `order` with registration
    /// order breaking ties.
    pub fn all_elements(&self) -> Vec<&FocusableElement> {
        let mut members: Vec<&FocusableElement> = self.elements.values().collect();
        members.sort_by_key(|element| element.order);
        members
    }

    /// Scope ids with at least one member.
    pub fn scopes_with_members(&self) -> impl Iterator<Item = &str> {
        self.by_scope.keys().map(String::as_str)
    }

    /// Drop every element.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.by_scope.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::element::FocusableElement;

    fn element(id: &str, order: i32, scope: &str) -> FocusableElement {
        FocusableElement::builder(id).order(order).scope(scope).build()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ElementRegistry::new();
        registry.register(element("a", 1, "form")).unwrap();
        assert!(registry.contains("a"));
        assert_eq!(registry.get("a").unwrap().order, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ElementRegistry::new();
        registry.register(element("a", 1, "form")).unwrap();
        let err = registry.register(element("a", 2, "form")).unwrap_err();
        assert_eq!(err, Error::DuplicateElement { id: "a".into() });
        // Original registration untouched
        assert_eq!(registry.get("a").unwrap().order, 1);
    }

    #[test]
    fn test_unregister_clears_scope_membership() {
        let mut registry = ElementRegistry::new();
        registry.register(element("a", 1, "form")).unwrap();
        registry.register(element("b", 2, "form")).unwrap();

        assert!(registry.unregister("a").is_some());
        assert!(!registry.contains("a"));
        let remaining = registry.elements_in_scope("form");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");

        // Unregistering the last member removes the scope index entirely
        registry.unregister("b").unwrap();
        assert!(registry.elements_in_scope("form").is_empty());
        assert_eq!(registry.scopes_with_members().count(), 0);
    }

    #[test]
    fn test_unregister_missing_is_none() {
        let mut registry = ElementRegistry::new();
        assert!(registry.unregister("ghost").is_none());
    }

    #[test]
    fn test_elements_in_scope_sorted_by_order() {
        let mut registry = ElementRegistry::new();
        registry.register(element("c", 3, "form")).unwrap();
        registry.register(element("a", 1, "form")).unwrap();
        registry.register(element("b", 2, "form")).unwrap();
        registry.register(element("other", 1, "sidebar")).unwrap();

        let ids: Vec<&str> = registry
            .elements_in_scope("form")
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_order_ties_break_by_registration_order() {
        let mut registry = ElementRegistry::new();
        registry.register(element("first", 5, "form")).unwrap();
        registry.register(element("second", 5, "form")).unwrap();

        let ids: Vec<&str> = registry
            .elements_in_scope("form")
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_update_merges() {
        let mut registry = ElementRegistry::new();
        registry.register(element("a", 1, "form")).unwrap();
        registry
            .update("a", ElementPatch::new().order(9).required(true))
            .unwrap();
        let updated = registry.get("a").unwrap();
        assert_eq!(updated.order, 9);
        assert!(updated.required);

        let err = registry.update("ghost", ElementPatch::new()).unwrap_err();
        assert_eq!(err, Error::UnknownElement { id: "ghost".into() });
    }

    #[test]
    fn test_clear() {
        let mut registry = ElementRegistry::new();
        registry.register(element("a", 1, "form")).unwrap();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.elements_in_scope("form").is_empty());
    }
}
