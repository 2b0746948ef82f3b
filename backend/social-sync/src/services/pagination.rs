/// Client-side window over an already loaded list.
///
/// The window starts at one page and grows a page at a time; it never
/// fetches anything itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationWindow {
    page_size: usize,
    window_size: usize,
}

impl PaginationWindow {
    /// A zero page size is treated as one
    pub fn new(page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            page_size,
            window_size: page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn grow(&mut self) {
        self.window_size = self.window_size.saturating_add(self.page_size);
    }

    pub fn reset(&mut self) {
        self.window_size = self.page_size;
    }

    /// The visible prefix of `items`
    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..items.len().min(self.window_size)]
    }

    pub fn has_more(&self, total: usize) -> bool {
        total > self.window_size
    }
}
