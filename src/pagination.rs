pub const DEFAULT_ITEMS_PER_PAGE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    items_per_page: usize,
    page: usize,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(DEFAULT_ITEMS_PER_PAGE)
    }
}

impl Pager {
    pub fn new(items_per_page: usize) -> Self {
        Self {
            items_per_page: items_per_page.max(1),
            page: 0,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.page.saturating_mul(self.items_per_page);
        if start >= items.len() {
            return &[];
        }
        let end = start.saturating_add(self.items_per_page).min(items.len());
        &items[start..end]
    }

    pub fn has_more(&self, len: usize) -> bool {
        len > (self.page + 1).saturating_mul(self.items_per_page)
    }

    pub fn total_pages(&self, len: usize) -> usize {
        len.div_ceil(self.items_per_page)
    }

    pub fn next(&mut self, len: usize) -> bool {
        if !self.has_more(len) {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn previous(&mut self) -> bool {
        if self.page == 0 {
            return false;
        }
        self.page -= 1;
        true
    }

    pub fn reset(&mut self) {
        self.page = 0;
    }

    pub fn set_items_per_page(&mut self, items_per_page: usize, len: usize) {
        self.items_per_page = items_per_page.max(1);
        let last = self.total_pages(len).saturating_sub(1);
        self.page = self.page.min(last);
    }
}
