//! Cookie-driven paged enumeration.

use crate::entry::Entry;
use crate::protocol::{PageControl, SearchRequest};
use crate::session::{Session, SessionGuard};
use crate::Result;
use dirsrv_core::error::Error;
use tracing::debug;

/// Enumerator progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// No request sent yet.
    Idle,
    /// A page request carrying `cookie` is outstanding.
    AwaitingPage {
        /// Cookie sent with the request; empty for the first page.
        cookie: Vec<u8>,
    },
    /// A page was received; `cookie` continues the result set unless empty.
    ///
    /// The next call after an empty cookie returns `None` and moves to [`PageState::Done`].
    Draining {
        /// Response cookie.
        cookie: Vec<u8>,
    },
    /// The result set is exhausted, or a request failed.
    Done,
}

/// Drives a paged search one page at a time.
///
/// All pages must be fetched through the same session; the server-side cookie is meaningless
/// elsewhere.
#[derive(Debug, Clone)]
pub struct PaginatedEnumerator {
    request: SearchRequest,
    page_size: u32,
    critical: bool,
    state: PageState,
    pages_requested: usize,
}

impl PaginatedEnumerator {
    /// Creates an enumerator with a critical paged control.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if `page_size` is zero.
    pub fn new(request: SearchRequest, page_size: u32) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::ValueError("page size must be at least 1".to_string()));
        }
        Ok(Self {
            request,
            page_size,
            critical: true,
            state: PageState::Idle,
            pages_requested: 0,
        })
    }

    /// Sets the criticality of the paged control.
    #[must_use]
    pub fn with_criticality(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &PageState {
        &self.state
    }

    /// Number of page requests sent so far.
    #[must_use]
    pub const fn pages_requested(&self) -> usize {
        self.pages_requested
    }

    /// Fetches the next page, or `None` once the result set is exhausted.
    ///
    /// A failed request moves the enumerator to [`PageState::Done`].
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error of the page request.
    pub async fn next_page(&mut self, guard: &mut SessionGuard<'_>) -> Result<Option<Vec<Entry>>> {
        let cookie = match std::mem::replace(&mut self.state, PageState::Done) {
            PageState::Idle => Vec::new(),
            PageState::Draining { cookie } if !cookie.is_empty() => cookie,
            PageState::Draining { .. } | PageState::Done => return Ok(None),
            PageState::AwaitingPage { cookie } => cookie,
        };

        let control = PageControl {
            critical: self.critical,
            size: self.page_size,
            cookie: cookie.clone(),
        };
        self.state = PageState::AwaitingPage { cookie };
        self.pages_requested += 1;

        match guard.search_page(&self.request, &control).await {
            Ok(page) => {
                debug!(
                    "Page {} of {} returned {} entries",
                    self.pages_requested,
                    self.request.base,
                    page.entries.len()
                );
                self.state = PageState::Draining {
                    cookie: page.cookie,
                };
                Ok(Some(page.entries))
            }
            Err(err) => {
                self.state = PageState::Done;
                Err(err)
            }
        }
    }

    /// Fetches every page, holding the session for the whole run.
    ///
    /// Entries are returned in response order. On failure nothing accumulated so far is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error of the
    /// first failing page request.
    pub async fn collect(mut self, session: &Session) -> Result<Vec<Entry>> {
        let mut guard = session.lock().await?;
        let mut entries = Vec::new();
        while let Some(page) = self.next_page(&mut guard).await? {
            entries.extend(page);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::DistinguishedName;
    use crate::entry::AttributeMap;
    use crate::protocol::{MockDirectoryClient, Page, ProtocolError, SearchScope};
    use dirsrv_core::config::DirectoryConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn entry(n: usize) -> Entry {
        Entry::new(
            DistinguishedName::parse(format!("uid=user{n},ou=People,dc=example")).unwrap(),
            AttributeMap::new(),
        )
    }

    fn request() -> SearchRequest {
        SearchRequest::new("ou=People,dc=example", SearchScope::Subtree, "(objectclass=*)")
    }

    fn paging_client(total: usize, fail_at: Option<usize>) -> (MockDirectoryClient, Arc<AtomicUsize>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        let mut client = MockDirectoryClient::new();
        client.expect_search_page().returning(move |_, control| {
            counter.fetch_add(1, Ordering::SeqCst);
            let offset = if control.cookie.is_empty() {
                0
            } else {
                String::from_utf8(control.cookie.clone())
                    .unwrap()
                    .parse::<usize>()
                    .unwrap()
            };
            if fail_at == Some(offset) {
                return Err(ProtocolError::Transport("connection reset".to_string()));
            }
            let end = (offset + control.size as usize).min(total);
            let cookie = if end < total {
                end.to_string().into_bytes()
            } else {
                Vec::new()
            };
            Ok(Page {
                entries: (offset..end).map(entry).collect(),
                cookie,
            })
        });
        (client, requests)
    }

    fn session_with(client: MockDirectoryClient) -> Arc<Session> {
        Session::from_client(
            DirectoryConfig::new("ldap://localhost").unwrap(),
            Box::new(client),
        )
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(matches!(
            PaginatedEnumerator::new(request(), 0),
            Err(Error::ValueError(_))
        ));
    }

    #[tokio::test]
    async fn walks_states_until_empty_cookie() {
        let (client, _) = paging_client(5, None);
        let session = session_with(client);
        let mut guard = session.lock().await.unwrap();
        let mut pager = PaginatedEnumerator::new(request(), 2).unwrap();
        assert_eq!(pager.state(), &PageState::Idle);

        let first = pager.next_page(&mut guard).await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(
            pager.state(),
            &PageState::Draining {
                cookie: b"2".to_vec()
            }
        );

        pager.next_page(&mut guard).await.unwrap().unwrap();
        let last = pager.next_page(&mut guard).await.unwrap().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(pager.state(), &PageState::Draining { cookie: Vec::new() });

        assert!(pager.next_page(&mut guard).await.unwrap().is_none());
        assert_eq!(pager.state(), &PageState::Done);
        assert!(pager.next_page(&mut guard).await.unwrap().is_none());
        assert_eq!(pager.pages_requested(), 3);
    }

    #[tokio::test]
    async fn collect_issues_one_request_per_page() {
        for (total, size, expected) in [(10usize, 3u32, 4usize), (9, 3, 3), (0, 5, 1), (1, 100, 1)] {
            let (client, requests) = paging_client(total, None);
            let entries = PaginatedEnumerator::new(request(), size)
                .unwrap()
                .collect(&session_with(client))
                .await
                .unwrap();

            assert_eq!(entries, (0..total).map(entry).collect::<Vec<_>>());
            assert_eq!(
                requests.load(Ordering::SeqCst),
                expected,
                "{total} entries in pages of {size}"
            );
        }
    }

    #[tokio::test]
    async fn failure_discards_partial_results() {
        let (client, requests) = paging_client(10, Some(4));
        let session = session_with(client);
        let err = PaginatedEnumerator::new(request(), 2)
            .unwrap()
            .collect(&session)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolError { code: 0, .. }));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn criticality_is_forwarded() {
        let mut client = MockDirectoryClient::new();
        client
            .expect_search_page()
            .withf(|_, control| !control.critical && control.size == 50)
            .times(1)
            .returning(|_, _| Ok(Page::default()));
        let session = session_with(client);
        let entries = PaginatedEnumerator::new(request(), 50)
            .unwrap()
            .with_criticality(false)
            .collect(&session)
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}
