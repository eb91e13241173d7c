//! # Paging
//!
//! Lazy item streams over paged remote listings.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │  offset_pages:  fetch(1) ─► [a b c]  fetch(2) ─► [d e]  fetch(3) ─► [] │
//! │                 yields a b c d e, then ends on the first empty page    │
//! │                                                                        │
//! │  cursor_pages:  fetch(None) ─► page{items, has_next, end}              │
//! │                 fetch(Some(end)) ─► ... until has_next = false         │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A page is requested only once the consumer has drained the previous
//! one. Errors from `fetch` are yielded once and end the stream.

use std::collections::VecDeque;
use std::future::Future;

use futures_util::stream::{self, Stream};

use crate::error::{SyncError, SyncResult};

/// First page number of offset-paged listings.
pub const FIRST_PAGE: u32 = 1;

/// One page of a cursor-paged listing.
#[derive(Debug, Clone)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

struct OffsetState<F, T> {
    fetch: F,
    next_page: u32,
    buffer: VecDeque<T>,
    exhausted: bool,
}

/// Streams the items of `fetch(1)`, `fetch(2)`, ... until a page comes back empty.
pub fn offset_pages<T, F, Fut>(fetch: F) -> impl Stream<Item = SyncResult<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = SyncResult<Vec<T>>>,
{
    let state = OffsetState {
        fetch,
        next_page: FIRST_PAGE,
        buffer: VecDeque::new(),
        exhausted: false,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.buffer.pop_front() {
                return Ok(Some((item, state)));
            }
            if state.exhausted {
                return Ok(None);
            }

            let page = (state.fetch)(state.next_page).await?;
            state.next_page += 1;
            if page.is_empty() {
                state.exhausted = true;
            }
            state.buffer.extend(page);
        }
    })
}

struct CursorState<F, T> {
    fetch: F,
    cursor: Option<String>,
    buffer: VecDeque<T>,
    exhausted: bool,
}

/// Streams the items of a cursor-paged listing, following `end_cursor`
/// while `has_next_page` is set.
pub fn cursor_pages<T, F, Fut>(fetch: F) -> impl Stream<Item = SyncResult<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = SyncResult<CursorPage<T>>>,
{
    let state = CursorState {
        fetch,
        cursor: None,
        buffer: VecDeque::new(),
        exhausted: false,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.buffer.pop_front() {
                return Ok(Some((item, state)));
            }
            if state.exhausted {
                return Ok(None);
            }

            let page = (state.fetch)(state.cursor.take()).await?;
            if page.has_next_page {
                match page.end_cursor {
                    Some(cursor) => state.cursor = Some(cursor),
                    None => {
                        return Err(SyncError::InvalidResponse(
                            "hasNextPage is set but endCursor is missing".into(),
                        ))
                    }
                }
            } else {
                state.exhausted = true;
            }
            state.buffer.extend(page.items);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{StreamExt, TryStreamExt};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_offset_pages_stops_on_empty_page() {
        let pages = vec![vec![1, 2, 3], vec![4, 5], vec![], vec![6]];
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let items: Vec<i32> = offset_pages(move |page| {
            counter.fetch_add(1, Ordering::SeqCst);
            let page = pages[(page - FIRST_PAGE) as usize].clone();
            async move { Ok(page) }
        })
        .try_collect()
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_offset_pages_is_lazy() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let stream = offset_pages(move |page| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(vec![page * 10, page * 10 + 1]) }
        });
        futures_util::pin_mut!(stream);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stream.next().await.unwrap().unwrap(), 10);
        assert_eq!(stream.next().await.unwrap().unwrap(), 11);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_offset_pages_surfaces_error_once() {
        let stream = offset_pages(|page| async move {
            if page == 1 {
                Ok(vec!["a"])
            } else {
                Err(SyncError::Timeout("page 2".into()))
            }
        });

        let results: Vec<_> = stream.collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SyncError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_cursor_pages_follows_end_cursor() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let log = seen.clone();
        let items: Vec<&str> = cursor_pages(move |cursor: Option<String>| {
            log.lock().unwrap().push(cursor.clone());
            async move {
                Ok(match cursor.as_deref() {
                    None => CursorPage {
                        items: vec!["a", "b"],
                        has_next_page: true,
                        end_cursor: Some("c1".into()),
                    },
                    Some("c1") => CursorPage {
                        items: vec!["c"],
                        has_next_page: false,
                        end_cursor: Some("c2".into()),
                    },
                    Some(other) => panic!("unexpected cursor {}", other),
                })
            }
        })
        .try_collect()
        .await
        .unwrap();

        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(*seen.lock().unwrap(), vec![None, Some("c1".to_string())]);
    }

    #[tokio::test]
    async fn test_cursor_pages_is_lazy() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let stream = cursor_pages(move |_cursor: Option<String>| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(CursorPage {
                    items: vec![format!("{}-a", call), format!("{}-b", call)],
                    has_next_page: true,
                    end_cursor: Some(format!("c{}", call)),
                })
            }
        });
        futures_util::pin_mut!(stream);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stream.next().await.unwrap().unwrap(), "0-a");
        assert_eq!(stream.next().await.unwrap().unwrap(), "0-b");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), "1-a");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cursor_pages_requires_end_cursor() {
        let result: SyncResult<Vec<u8>> = cursor_pages(|_| async {
            Ok(CursorPage {
                items: vec![1],
                has_next_page: true,
                end_cursor: None,
            })
        })
        .try_collect()
        .await;

        assert!(matches!(result, Err(SyncError::InvalidResponse(_))));
    }
}
