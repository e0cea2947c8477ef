//! Generic scrollable + filterable list state.

pub struct ScrollableList<T> {
    pub items: Vec<T>,
    pub filtered_indices: Vec<usize>,
    pub selected: usize,
    pub scroll_offset: usize,
    pub filter: String,
    filter_fn: Box<dyn Fn(&T, &str) -> bool>,
}

impl<T> ScrollableList<T> {
    pub fn new(filter_fn: impl Fn(&T, &str) -> bool + 'static) -> Self {
        Self {
            items: Vec::new(),
            filtered_indices: Vec::new(),
            selected: 0,
            scroll_offset: 0,
            filter: String::new(),
            filter_fn: Box::new(filter_fn),
        }
    }

    /// Replace the items, keeping the selection position where possible.
    pub fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.rebuild_filter();
    }

    pub fn set_filter(&mut self, query: &str) {
        self.filter = query.to_string();
        let old_idx = self.filtered_indices.get(self.selected).copied();
        self.rebuild_filter();
        // Keep the same item selected if it survived the filter
        if let Some(prev) = old_idx {
            self.selected = self
                .filtered_indices
                .iter()
                .position(|&i| i == prev)
                .unwrap_or(0);
        }
        self.scroll_offset = 0;
    }

    pub fn rebuild_filter(&mut self) {
        if self.filter.is_empty() {
            self.filtered_indices = (0..self.items.len()).collect();
        } else {
            self.filtered_indices = self
                .items
                .iter()
                .enumerate()
                .filter(|(_, item)| (self.filter_fn)(item, &self.filter))
                .map(|(i, _)| i)
                .collect();
        }
        if self.selected >= self.filtered_indices.len() {
            self.selected = self.filtered_indices.len().saturating_sub(1);
        }
    }

    pub fn select_up(&mut self, n: usize) {
        self.selected = self.selected.saturating_sub(n);
    }

    pub fn select_down(&mut self, n: usize) {
        if self.filtered_indices.is_empty() {
            return;
        }
        self.selected = (self.selected + n).min(self.filtered_indices.len() - 1);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
        self.scroll_offset = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.filtered_indices.len().saturating_sub(1);
    }

    pub fn selected_item(&self) -> Option<&T> {
        let idx = self.filtered_indices.get(self.selected)?;
        self.items.get(*idx)
    }

    /// Select the first item matching `pred` (in filtered order).
    pub fn select_where(&mut self, pred: impl Fn(&T) -> bool) -> bool {
        let found = self
            .filtered_indices
            .iter()
            .position(|&i| pred(&self.items[i]));
        if let Some(pos) = found {
            self.selected = pos;
        }
        found.is_some()
    }

    /// Returns (original_index, &item) pairs visible in `height` rows.
    /// Call ensure_visible first to update scroll_offset.
    pub fn visible_items(&self, height: usize) -> Vec<(usize, &T)> {
        if height == 0 || self.filtered_indices.is_empty() {
            return Vec::new();
        }
        let start = self.scroll_offset.min(self.filtered_indices.len());
        let end = (start + height).min(self.filtered_indices.len());
        self.filtered_indices[start..end]
            .iter()
            .map(|&i| (i, &self.items[i]))
            .collect()
    }

    pub fn ensure_visible(&mut self, height: usize) {
        if height == 0 {
            return;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + height {
            self.scroll_offset = self.selected + 1 - height;
        }
    }

    /// Handle a click at `row` within the rendered area.
    /// Returns true if selection changed.
    pub fn handle_click(&mut self, row: usize) -> bool {
        let target = self.scroll_offset + row;
        if target < self.filtered_indices.len() {
            self.selected = target;
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.filtered_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filtered_indices.is_empty()
    }

    pub fn selected_in_view(&self, height: usize) -> usize {
        self.selected
            .saturating_sub(self.scroll_offset)
            .min(height.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> ScrollableList<String> {
        let mut list = ScrollableList::new(|s: &String, q: &str| s.contains(q));
        list.set_items(
            ["intro", "outro", "interlude", "finale"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        list
    }

    #[test]
    fn filter_keeps_selected_item_when_it_survives() {
        let mut list = names();
        list.select_down(2);
        assert_eq!(list.selected_item().map(String::as_str), Some("interlude"));

        list.set_filter("int");
        assert_eq!(list.len(), 2);
        assert_eq!(list.selected_item().map(String::as_str), Some("interlude"));

        list.set_filter("tro");
        assert_eq!(list.selected_item().map(String::as_str), Some("intro"));
    }

    #[test]
    fn selection_is_bounded() {
        let mut list = names();
        list.select_down(10);
        assert_eq!(list.selected, 3);
        list.select_up(10);
        assert_eq!(list.selected, 0);

        list.set_items(Vec::new());
        list.select_down(1);
        assert!(list.selected_item().is_none());
    }

    #[test]
    fn scrolls_to_keep_selection_visible() {
        let mut list = names();
        list.select_last();
        list.ensure_visible(2);
        assert_eq!(list.scroll_offset, 2);
        let visible: Vec<&str> = list
            .visible_items(2)
            .into_iter()
            .map(|(_, s)| s.as_str())
            .collect();
        assert_eq!(visible, ["interlude", "finale"]);
        assert_eq!(list.selected_in_view(2), 1);

        assert!(list.handle_click(0));
        assert_eq!(list.selected_item().map(String::as_str), Some("interlude"));
    }

    #[test]
    fn select_where_finds_item() {
        let mut list = names();
        assert!(list.select_where(|s| s == "outro"));
        assert_eq!(list.selected, 1);
        assert!(!list.select_where(|s| s == "missing"));
        assert_eq!(list.selected, 1);
    }
}
