//! Pure rebuild of paginated windows from a flat sorted sequence.
//!
//! One algorithm, parameterized by item type and comparator, serves both
//! the room-list view and the per-room message view.

use std::cmp::Ordering;

use eddy_feed::Cursor;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Carried forward from the previous window. Only a live remote fetch
    /// mints a true cursor; reusing the nearest prior one avoids a refetch
    /// after a purely local mutation.
    pub cursor: Option<Cursor>,
    pub is_last_page: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagedWindow<T> {
    pub pages: Vec<Page<T>>,
}

impl<T> Default for PagedWindow<T> {
    fn default() -> Self {
        Self { pages: Vec::new() }
    }
}

impl<T: Clone> PagedWindow<T> {
    /// Concatenation of all pages; reproduces the canonical-sorted flat
    /// sequence the window was built from.
    pub fn flatten(&self) -> Vec<T> {
        self.pages.iter().flat_map(|p| p.items.iter().cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Repartition `flat` into consecutive `page_size` chunks, sorted by `cmp`.
///
/// Pure — no side effects, safe inside rollback paths. Chunk `i` carries
/// the cursor of `previous.pages[min(i, last)]`. The final chunk is the
/// last page only if it reaches the end of `flat`. An empty `flat` returns
/// the prior window unchanged rather than producing zero pages.
pub fn rebuild_pages<T: Clone>(
    flat: &[T],
    previous: &PagedWindow<T>,
    page_size: usize,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> PagedWindow<T> {
    if flat.is_empty() {
        return previous.clone();
    }
    let page_size = page_size.max(1);

    let mut sorted: Vec<T> = flat.to_vec();
    sorted.sort_by(&cmp);

    let carried = |i: usize| -> Option<Cursor> {
        if previous.pages.is_empty() {
            return None;
        }
        let idx = i.min(previous.pages.len() - 1);
        previous.pages[idx].cursor.clone()
    };

    let total = sorted.len();
    let pages = sorted
        .chunks(page_size)
        .enumerate()
        .map(|(i, chunk)| Page {
            items: chunk.to_vec(),
            cursor: carried(i),
            is_last_page: i * page_size + chunk.len() == total,
        })
        .collect();

    PagedWindow { pages }
}
