use std::collections::HashSet;

/// Selected record ids. Purely id-based: ids that are missing from the
/// current record set are kept and become live again if a later fetch
/// brings the record back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: HashSet<String>,
}

impl Selection {
    pub fn toggle(&mut self, id: &str) {
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
        }
    }

    /// Selects exactly `visible`, or clears when `visible` is already the
    /// whole selection. An empty visible set leaves the selection alone.
    pub fn select_all_visible<'a, I>(&mut self, visible: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let visible: HashSet<&str> = visible.into_iter().collect();
        if visible.is_empty() {
            return;
        }
        let same = self.ids.len() == visible.len()
            && self.ids.iter().all(|id| visible.contains(id.as_str()));
        if same {
            self.ids.clear();
        } else {
            self.ids = visible.into_iter().map(str::to_string).collect();
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

/// Rows whose detail line is open. Any number may be open at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    ids: HashSet<String>,
}

impl Expansion {
    pub fn toggle(&mut self, id: &str) {
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
        }
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }
}
