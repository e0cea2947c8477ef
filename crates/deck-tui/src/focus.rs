//! FocusRing — manages keyboard focus cycling between panels.

use crate::action::ComponentId;

pub struct FocusRing {
    items: Vec<ComponentId>,
    current: usize,
}

impl FocusRing {
    pub fn new(items: Vec<ComponentId>) -> Self {
        Self { items, current: 0 }
    }

    pub fn current(&self) -> Option<ComponentId> {
        self.items.get(self.current).copied()
    }

    pub fn next(&mut self) -> Option<ComponentId> {
        if self.items.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.items.len();
        self.current()
    }

    pub fn prev(&mut self) -> Option<ComponentId> {
        if self.items.is_empty() {
            return None;
        }
        self.current = if self.current == 0 {
            self.items.len() - 1
        } else {
            self.current - 1
        };
        self.current()
    }

    /// Focus `id`.  Ids outside the ring are ignored.
    pub fn set(&mut self, id: ComponentId) {
        if let Some(pos) = self.items.iter().position(|&x| x == id) {
            self.current = pos;
        }
    }

    pub fn is_focused(&self, id: ComponentId) -> bool {
        self.current() == Some(id)
    }

    /// Replace the ring contents, keeping the focused id if it is still there.
    pub fn set_items(&mut self, items: Vec<ComponentId>) {
        let old = self.current();
        self.items = items;
        self.current = old
            .and_then(|id| self.items.iter().position(|&x| x == id))
            .unwrap_or(0);
    }

    /// Position of `id` in the ring.
    pub fn slot_of(&self, id: ComponentId) -> Option<usize> {
        self.items.iter().position(|&x| x == id)
    }

    /// Focus the Nth item in the ring (0-indexed). No-op if out of bounds.
    pub fn set_by_position(&mut self, pos: usize) -> Option<ComponentId> {
        if pos < self.items.len() {
            self.current = pos;
            self.current()
        } else {
            None
        }
    }
}

impl Default for FocusRing {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> FocusRing {
        FocusRing::new(vec![
            ComponentId::NowPlaying,
            ComponentId::Album,
            ComponentId::Queue,
        ])
    }

    #[test]
    fn next_and_prev_wrap() {
        let mut focus = ring();
        assert_eq!(focus.prev(), Some(ComponentId::Queue));
        assert_eq!(focus.next(), Some(ComponentId::NowPlaying));
        assert_eq!(focus.next(), Some(ComponentId::Album));
    }

    #[test]
    fn set_ignores_ids_outside_the_ring() {
        let mut focus = ring();
        focus.set(ComponentId::Queue);
        focus.set(ComponentId::LogPanel);
        assert!(focus.is_focused(ComponentId::Queue));
        assert_eq!(focus.set_by_position(7), None);
        assert_eq!(focus.slot_of(ComponentId::Album), Some(1));
    }

    #[test]
    fn set_items_keeps_focus_when_possible() {
        let mut focus = ring();
        focus.set(ComponentId::Album);
        focus.set_items(vec![ComponentId::Queue, ComponentId::Album]);
        assert!(focus.is_focused(ComponentId::Album));
        focus.set_items(vec![ComponentId::Queue]);
        assert!(focus.is_focused(ComponentId::Queue));
    }

    #[test]
    fn empty_ring_has_no_focus() {
        let mut focus = FocusRing::default();
        assert_eq!(focus.next(), None);
        assert_eq!(focus.current(), None);
    }
}
