use doc_model::PageRef;
use std::collections::HashSet;

/// Pages with a render in flight. A page is in here at most once.
#[derive(Debug, Default)]
pub struct PendingRequestSet {
    pages: HashSet<PageRef>,
}

impl PendingRequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the page was already pending.
    pub fn insert(&mut self, page: PageRef) -> bool {
        self.pages.insert(page)
    }

    pub fn remove(&mut self, page: &PageRef) -> bool {
        self.pages.remove(page)
    }

    pub fn contains(&self, page: &PageRef) -> bool {
        self.pages.contains(page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut pending = PendingRequestSet::new();
        let page = PageRef::new("a.pdf", 0);

        assert!(pending.insert(page.clone()));
        assert!(!pending.insert(page.clone()));
        assert_eq!(pending.len(), 1);

        assert!(pending.remove(&page));
        assert!(!pending.contains(&page));
        assert!(pending.is_empty());
    }
}
