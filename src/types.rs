/// JSON representation of one remote object.
pub type Entity = serde_json::Value;

/// One page of a list response.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T = Entity> {
    pub items: Vec<T>,
    /// Opaque continuation token; pass it back verbatim to fetch the next page.
    pub next_cursor: Option<String>,
    /// Only present when totals were requested.
    pub total: Option<u64>,
    pub start: Option<u64>,
    pub limit: Option<u64>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            total: None,
            start: None,
            limit: None,
        }
    }
}
