//! Loader session: one in-flight parse per file identity
//!
//! The session is owned by the host and outlives any single view of the
//! document, so a remounted view attaches to the parse already running
//! instead of starting a second one. Each entry carries the file's
//! [`CancellationToken`]; invalidating the entry cancels everything tied to
//! that identity.

use crate::identity::FileIdentity;
use page_editor_scheduler::CancellationToken;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Errors seen by callers waiting on a session entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("load was cancelled")]
    Cancelled,
    #[error("document failed to load: {0}")]
    Failed(String),
    #[error("no load in progress for {0}")]
    NotLoading(FileIdentity),
}

enum Phase<D: ?Sized> {
    Loading,
    Ready(Arc<D>),
    Failed(String),
    Invalidated,
}

struct Entry<D: ?Sized> {
    token: CancellationToken,
    phase: watch::Sender<Phase<D>>,
}

impl<D: ?Sized> Entry<D> {
    fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Loading);
        Self {
            token: CancellationToken::new(),
            phase,
        }
    }

    fn is_reusable(&self) -> bool {
        matches!(*self.phase.borrow(), Phase::Loading | Phase::Ready(_))
    }

    fn close(&self) {
        self.token.cancel();
        self.phase.send_replace(Phase::Invalidated);
    }
}

/// Permission to parse a file, handed to exactly one caller per identity
#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub identity: FileIdentity,
    pub token: CancellationToken,
}

/// Handle for waiting on a parse started by someone else
pub struct AttachHandle<D: ?Sized> {
    token: CancellationToken,
    phase: watch::Receiver<Phase<D>>,
}

impl<D: ?Sized> AttachHandle<D> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Wait for the parse to finish
    pub async fn wait(mut self) -> Result<Arc<D>, SessionError> {
        loop {
            let settled = match &*self.phase.borrow_and_update() {
                Phase::Loading => None,
                Phase::Ready(doc) => Some(Ok(Arc::clone(doc))),
                Phase::Failed(reason) => Some(Err(SessionError::Failed(reason.clone()))),
                Phase::Invalidated => Some(Err(SessionError::Cancelled)),
            };
            if let Some(result) = settled {
                return result;
            }
            if self.phase.changed().await.is_err() {
                return Err(SessionError::Cancelled);
            }
        }
    }
}

/// Outcome of [`LoaderSession::begin_load`]
pub enum BeginLoad<D: ?Sized> {
    /// Caller owns the parse and must call `complete` or `fail`
    Started(LoadTicket),
    /// Another caller is parsing; attach instead of parsing again
    InFlight(AttachHandle<D>),
    /// Already parsed
    Ready { document: Arc<D>, token: CancellationToken },
}

/// Host-owned registry of parsed documents keyed by [`FileIdentity`]
pub struct LoaderSession<D: ?Sized> {
    entries: Mutex<HashMap<FileIdentity, Entry<D>>>,
}

impl<D: ?Sized> LoaderSession<D> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Start loading `identity`, or join the load already under way
    ///
    /// A failed or invalidated entry is replaced by a fresh one with a new
    /// token.
    pub fn begin_load(&self, identity: &FileIdentity) -> BeginLoad<D> {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(identity).filter(|entry| entry.is_reusable()) {
            let ready = match &*entry.phase.borrow() {
                Phase::Ready(document) => Some(Arc::clone(document)),
                _ => None,
            };
            return match ready {
                Some(document) => BeginLoad::Ready {
                    document,
                    token: entry.token.clone(),
                },
                None => {
                    tracing::debug!(file = %identity, "attaching to in-flight parse");
                    BeginLoad::InFlight(AttachHandle {
                        token: entry.token.clone(),
                        phase: entry.phase.subscribe(),
                    })
                }
            };
        }

        let entry = Entry::new();
        let ticket = LoadTicket {
            identity: identity.clone(),
            token: entry.token.clone(),
        };
        entries.insert(identity.clone(), entry);
        tracing::debug!(file = %identity, "starting parse");
        BeginLoad::Started(ticket)
    }

    /// Publish the parsed document for `ticket`
    ///
    /// Fails with `Cancelled` when the entry was invalidated in the meantime;
    /// the document is then dropped, never published.
    pub fn complete(&self, ticket: &LoadTicket, document: Arc<D>) -> Result<(), SessionError> {
        let entries = self.entries.lock();
        let entry = Self::owned_entry(&entries, ticket)?;
        entry.phase.send_replace(Phase::Ready(document));
        Ok(())
    }

    /// Record a parse failure; the next `begin_load` starts over
    pub fn fail(&self, ticket: &LoadTicket, reason: impl Into<String>) -> Result<(), SessionError> {
        let entries = self.entries.lock();
        let entry = Self::owned_entry(&entries, ticket)?;
        let reason = reason.into();
        tracing::warn!(file = %ticket.identity, error = %reason, "parse failed");
        entry.phase.send_replace(Phase::Failed(reason));
        Ok(())
    }

    fn owned_entry<'a>(
        entries: &'a HashMap<FileIdentity, Entry<D>>,
        ticket: &LoadTicket,
    ) -> Result<&'a Entry<D>, SessionError> {
        match entries.get(&ticket.identity) {
            Some(entry) if entry.token.same_as(&ticket.token) && !entry.token.is_cancelled() => Ok(entry),
            Some(_) => Err(SessionError::Cancelled),
            None if ticket.token.is_cancelled() => Err(SessionError::Cancelled),
            None => Err(SessionError::NotLoading(ticket.identity.clone())),
        }
    }

    /// Wait on the entry for `identity`, if there is one
    pub fn attach(&self, identity: &FileIdentity) -> Option<AttachHandle<D>> {
        self.entries.lock().get(identity).map(|entry| AttachHandle {
            token: entry.token.clone(),
            phase: entry.phase.subscribe(),
        })
    }

    /// Parsed document for `identity`, if ready
    pub fn get(&self, identity: &FileIdentity) -> Option<Arc<D>> {
        let entries = self.entries.lock();
        let entry = entries.get(identity)?;
        let phase = entry.phase.borrow();
        match &*phase {
            Phase::Ready(document) => Some(Arc::clone(document)),
            _ => None,
        }
    }

    pub fn is_loading(&self, identity: &FileIdentity) -> bool {
        self.entries
            .lock()
            .get(identity)
            .is_some_and(|entry| matches!(*entry.phase.borrow(), Phase::Loading))
    }

    /// Cancel and drop the entry for `identity`
    pub fn invalidate(&self, identity: &FileIdentity) -> bool {
        let removed = self.entries.lock().remove(identity);
        match removed {
            Some(entry) => {
                entry.close();
                tracing::debug!(file = %identity, "invalidated session entry");
                true
            }
            None => false,
        }
    }

    /// Invalidate every identity other than `identity`
    ///
    /// Returns the number of entries dropped.
    pub fn switch_to(&self, identity: &FileIdentity) -> usize {
        let stale: Vec<Entry<D>> = {
            let mut entries = self.entries.lock();
            let keys: Vec<FileIdentity> = entries.keys().filter(|key| *key != identity).cloned().collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };
        for entry in &stale {
            entry.close();
        }
        stale.len()
    }

    /// Invalidate everything
    pub fn teardown(&self) {
        let drained: Vec<Entry<D>> = self.entries.lock().drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            entry.close();
        }
        tracing::debug!(entries = drained.len(), "loader session torn down");
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<D: ?Sized> Default for LoaderSession<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> FileIdentity {
        FileIdentity::new(name, 100, 1)
    }

    fn started(begin: BeginLoad<str>) -> LoadTicket {
        match begin {
            BeginLoad::Started(ticket) => ticket,
            _ => panic!("expected a fresh load"),
        }
    }

    #[test]
    fn test_second_begin_attaches_instead_of_parsing() {
        let session: LoaderSession<str> = LoaderSession::new();
        let ticket = started(session.begin_load(&id("a.pdf")));

        match session.begin_load(&id("a.pdf")) {
            BeginLoad::InFlight(handle) => assert!(handle.token().same_as(&ticket.token)),
            _ => panic!("expected to attach"),
        }
        assert_eq!(session.len(), 1);
        assert!(session.is_loading(&id("a.pdf")));
    }

    #[tokio::test]
    async fn test_attached_waiter_sees_completed_document() {
        let session: LoaderSession<str> = LoaderSession::new();
        let ticket = started(session.begin_load(&id("a.pdf")));
        let handle = session.attach(&id("a.pdf")).unwrap();

        let (result, ()) = tokio::join!(handle.wait(), async {
            tokio::task::yield_now().await;
            session.complete(&ticket, Arc::from("parsed")).unwrap();
        });
        assert_eq!(&*result.unwrap(), "parsed");

        match session.begin_load(&id("a.pdf")) {
            BeginLoad::Ready { document, .. } => assert_eq!(&*document, "parsed"),
            _ => panic!("expected cached document"),
        }
    }

    #[tokio::test]
    async fn test_invalidate_cancels_token_and_waiters() {
        let session: LoaderSession<str> = LoaderSession::new();
        let ticket = started(session.begin_load(&id("a.pdf")));
        let handle = session.attach(&id("a.pdf")).unwrap();

        assert!(session.invalidate(&id("a.pdf")));
        assert!(ticket.token.is_cancelled());
        assert_eq!(handle.wait().await.unwrap_err(), SessionError::Cancelled);
        assert_eq!(
            session.complete(&ticket, Arc::from("late")),
            Err(SessionError::Cancelled)
        );
        assert!(session.get(&id("a.pdf")).is_none());
    }

    #[tokio::test]
    async fn test_failure_reaches_waiters_and_allows_retry() {
        let session: LoaderSession<str> = LoaderSession::new();
        let ticket = started(session.begin_load(&id("a.pdf")));
        let handle = session.attach(&id("a.pdf")).unwrap();

        session.fail(&ticket, "bad xref").unwrap();
        assert_eq!(
            handle.wait().await.unwrap_err(),
            SessionError::Failed("bad xref".into())
        );

        let retry = started(session.begin_load(&id("a.pdf")));
        assert!(!retry.token.same_as(&ticket.token));
    }

    #[test]
    fn test_stale_ticket_cannot_complete_new_entry() {
        let session: LoaderSession<str> = LoaderSession::new();
        let old = started(session.begin_load(&id("a.pdf")));
        session.invalidate(&id("a.pdf"));
        let _new = started(session.begin_load(&id("a.pdf")));

        assert_eq!(session.complete(&old, Arc::from("old")), Err(SessionError::Cancelled));
        assert!(session.is_loading(&id("a.pdf")));
    }

    #[test]
    fn test_switch_to_drops_other_identities() {
        let session: LoaderSession<str> = LoaderSession::new();
        let a = started(session.begin_load(&id("a.pdf")));
        let b = started(session.begin_load(&id("b.pdf")));

        assert_eq!(session.switch_to(&id("b.pdf")), 1);
        assert!(a.token.is_cancelled());
        assert!(!b.token.is_cancelled());
        assert_eq!(session.len(), 1);

        session.teardown();
        assert!(b.token.is_cancelled());
        assert!(session.is_empty());
    }

    #[test]
    fn test_complete_without_entry_is_reported() {
        let session: LoaderSession<str> = LoaderSession::new();
        let ticket = LoadTicket {
            identity: id("ghost.pdf"),
            token: CancellationToken::new(),
        };
        assert_eq!(
            session.complete(&ticket, Arc::from("x")),
            Err(SessionError::NotLoading(id("ghost.pdf")))
        );
    }
}
