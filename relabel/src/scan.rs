//! Splits a record cursor into fixed-size pages.

use config::shared::validate_page_size;
use core::pin::Pin;
use core::task::{Context, Poll};
use futures::{Stream, StreamExt, ready};
use pin_project_lite::pin_project;
use std::mem;
use std::num::NonZeroUsize;

use crate::error::RelabelResult;
use crate::types::{Page, Record};

pin_project! {
    /// Stream of pages drained from an underlying record cursor, usually a
    /// [`crate::store::RecordCursor`].
    ///
    /// Every page holds exactly `page_size` records except the last one, which may be smaller.
    /// Records keep their cursor order within a page. When the cursor fails, the records read
    /// so far are emitted as a page, followed by the error, after which the stream ends.
    ///
    /// The scanner is a single-producer abstraction: it is owned by the task that feeds the
    /// workers and is never shared.
    #[must_use = "streams do nothing unless polled"]
    #[derive(Debug)]
    pub struct PagedScanner<S> {
        #[pin]
        cursor: S,
        page_size: NonZeroUsize,
        items: Vec<Record>,
        peeked: Option<RelabelResult<Record>>,
        cursor_ended: bool,
        next_page_number: u64,
    }
}

impl<S> PagedScanner<S>
where
    S: Stream<Item = RelabelResult<Record>>,
{
    /// Creates a scanner, rejecting page sizes that are not strictly positive.
    pub fn new(cursor: S, page_size: i64) -> RelabelResult<Self> {
        let page_size = validate_page_size(page_size)?;

        Ok(Self::with_page_size(cursor, page_size))
    }

    pub fn with_page_size(cursor: S, page_size: NonZeroUsize) -> Self {
        Self {
            cursor,
            page_size,
            items: Vec::with_capacity(page_size.get()),
            peeked: None,
            cursor_ended: false,
            next_page_number: 0,
        }
    }

    pub fn page_size(&self) -> NonZeroUsize {
        self.page_size
    }

    fn take_page(items: &mut Vec<Record>, page_size: NonZeroUsize, number: &mut u64) -> Page {
        let records = mem::replace(items, Vec::with_capacity(page_size.get()));
        let page = Page::new(*number, records);
        *number += 1;

        page
    }
}

impl<S> PagedScanner<S>
where
    S: Stream<Item = RelabelResult<Record>> + Unpin,
{
    /// Returns `true` if another call to [`PagedScanner::next_page`] yields a page or an error.
    ///
    /// May pull one record from the cursor, which is kept for the next page.
    pub async fn has_next(&mut self) -> bool {
        if !self.items.is_empty() || self.peeked.is_some() {
            return true;
        }

        if self.cursor_ended {
            return false;
        }

        match self.cursor.next().await {
            Some(item) => {
                self.peeked = Some(item);
                true
            }
            None => {
                self.cursor_ended = true;
                false
            }
        }
    }

    /// Drains up to `page_size` records from the cursor into a new page.
    ///
    /// Returns `None` once the cursor is exhausted.
    pub async fn next_page(&mut self) -> Option<RelabelResult<Page>> {
        self.next().await
    }
}

impl<S> Stream for PagedScanner<S>
where
    S: Stream<Item = RelabelResult<Record>>,
{
    type Item = RelabelResult<Page>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if this.items.len() >= this.page_size.get() {
                let page = Self::take_page(this.items, *this.page_size, this.next_page_number);
                return Poll::Ready(Some(Ok(page)));
            }

            let next = match this.peeked.take() {
                Some(item) => Some(item),
                None if *this.cursor_ended => None,
                None => ready!(this.cursor.as_mut().poll_next(cx)),
            };

            match next {
                Some(Ok(record)) => this.items.push(record),
                Some(Err(err)) => {
                    *this.cursor_ended = true;

                    // Hand out what was read before the failure, the error follows.
                    if !this.items.is_empty() {
                        *this.peeked = Some(Err(err));
                        let page =
                            Self::take_page(this.items, *this.page_size, this.next_page_number);
                        return Poll::Ready(Some(Ok(page)));
                    }

                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    *this.cursor_ended = true;

                    if this.items.is_empty() {
                        return Poll::Ready(None);
                    }

                    let page = Self::take_page(this.items, *this.page_size, this.next_page_number);
                    return Poll::Ready(Some(Ok(page)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::relabel_error;
    use crate::types::RecordId;
    use futures::stream;

    fn records(count: i64) -> Vec<RelabelResult<Record>> {
        (1..=count)
            .map(|id| Ok(Record::new(RecordId(id)).with_tag("Person")))
            .collect()
    }

    async fn collect_pages<S>(mut scanner: PagedScanner<S>) -> Vec<Page>
    where
        S: Stream<Item = RelabelResult<Record>> + Unpin,
    {
        let mut pages = Vec::new();
        while scanner.has_next().await {
            pages.push(scanner.next_page().await.unwrap().unwrap());
        }

        pages
    }

    #[tokio::test]
    async fn splits_evenly_divisible_cursor() {
        let scanner = PagedScanner::new(stream::iter(records(9)), 3).unwrap();
        let pages = collect_pages(scanner).await;

        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|page| page.len() == 3));
        assert_eq!(
            pages.iter().map(|page| page.number).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn last_page_holds_the_remainder() {
        let scanner = PagedScanner::new(stream::iter(records(10)), 4).unwrap();
        let pages = collect_pages(scanner).await;

        assert_eq!(
            pages.iter().map(Page::len).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
    }

    #[tokio::test]
    async fn preserves_cursor_order_without_duplicates() {
        let scanner = PagedScanner::new(stream::iter(records(25)), 7).unwrap();
        let ids: Vec<i64> = collect_pages(scanner)
            .await
            .iter()
            .flat_map(|page| page.record_ids())
            .map(RecordId::into_inner)
            .collect();

        assert_eq!(ids, (1..=25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn page_size_of_one_yields_one_page_per_record() {
        let scanner = PagedScanner::new(stream::iter(records(5)), 1).unwrap();
        let pages = collect_pages(scanner).await;

        assert_eq!(pages.len(), 5);
    }

    #[tokio::test]
    async fn empty_cursor_has_no_pages() {
        let mut scanner = PagedScanner::new(stream::iter(records(0)), 10).unwrap();

        assert!(!scanner.has_next().await);
        assert!(scanner.next_page().await.is_none());
    }

    #[test]
    fn rejects_non_positive_page_sizes() {
        for page_size in [0, -1, i64::MIN] {
            let err = PagedScanner::new(stream::iter(records(1)), page_size).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPageSize);
        }
    }

    #[tokio::test]
    async fn cursor_error_follows_the_partial_page() {
        let mut items = records(3);
        items.push(Err(relabel_error!(ErrorKind::ScanFailed, "Scan failed")));
        items.extend(records(2));

        let mut scanner = PagedScanner::new(stream::iter(items), 2).unwrap();

        assert_eq!(scanner.next_page().await.unwrap().unwrap().len(), 2);
        assert_eq!(scanner.next_page().await.unwrap().unwrap().len(), 1);
        let err = scanner.next_page().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScanFailed);
        assert!(scanner.next_page().await.is_none());
        assert!(!scanner.has_next().await);
    }
}
