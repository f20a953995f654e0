use crate::error::{AudioLinkError, Result};
use crate::vote::{QuorumPolicy, SharedVoteSession, VoteOutcome, VoteSession};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of a vote session within a council
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionHandle {
    type Err = AudioLinkError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| AudioLinkError::UnknownSession)
    }
}

/// Registry of concurrently running vote sessions
///
/// Finalized and abandoned sessions stay registered so their outcome can
/// still be queried; `remove` drops them.
#[derive(Debug, Default)]
pub struct Council {
    sessions: Mutex<HashMap<SessionHandle, SharedVoteSession>>,
}

impl Council {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_session(
        &self,
        expected_ballots: usize,
        quorum_threshold: f32,
        majority_fraction: f32,
    ) -> Result<SessionHandle> {
        let policy = QuorumPolicy::new(expected_ballots, quorum_threshold, majority_fraction)?;
        self.open_with_policy(policy)
    }

    pub fn open_with_policy(&self, policy: QuorumPolicy) -> Result<SessionHandle> {
        let session = SharedVoteSession::open(policy)?;
        let handle = SessionHandle::generate();
        self.sessions.lock().insert(handle, session);
        log::info!(
            "opened council session {} ({} ballots)",
            handle,
            policy.expected_ballots
        );
        Ok(handle)
    }

    /// Shared session behind a handle, for collectors that submit directly
    pub fn session(&self, handle: &SessionHandle) -> Result<SharedVoteSession> {
        self.sessions
            .lock()
            .get(handle)
            .cloned()
            .ok_or(AudioLinkError::UnknownSession)
    }

    pub fn submit_ballot(
        &self,
        handle: &SessionHandle,
        text: &str,
        resonance: f32,
    ) -> Result<Option<VoteOutcome>> {
        let outcome = self.session(handle)?.submit_ballot(text, resonance)?;
        if let Some(outcome) = &outcome {
            log::info!("council session {} finalized: {:?}", handle, outcome.decision);
        }
        Ok(outcome)
    }

    pub fn finalize(&self, handle: &SessionHandle) -> Result<VoteOutcome> {
        Ok(self.session(handle)?.close())
    }

    pub fn abandon(&self, handle: &SessionHandle) -> Result<()> {
        self.session(handle)?.abandon()?;
        log::info!("council session {} abandoned", handle);
        Ok(())
    }

    pub fn status(&self, handle: &SessionHandle) -> Result<VoteSession> {
        Ok(self.session(handle)?.snapshot())
    }

    /// Drop a session from the registry, abandoning it first if it is still
    /// collecting. Returns its final state.
    pub fn remove(&self, handle: &SessionHandle) -> Result<VoteSession> {
        let session = self
            .sessions
            .lock()
            .remove(handle)
            .ok_or(AudioLinkError::UnknownSession)?;
        match session.abandon() {
            Ok(()) | Err(AudioLinkError::SessionClosed) => {}
            Err(e) => return Err(e),
        }
        log::info!("council session {} removed", handle);
        Ok(session.snapshot())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::{Decision, SessionState};

    #[test]
    fn test_sessions_are_independent() {
        let council = Council::new();
        let a = council.open_session(2, 0.5, 0.5).unwrap();
        let b = council.open_session(2, 0.5, 0.5).unwrap();
        assert_ne!(a, b);

        council.submit_ballot(&a, "yes", 1.0).unwrap();
        let outcome = council.submit_ballot(&a, "yes", 0.9).unwrap().unwrap();
        assert_eq!(outcome.decision, Decision::Pass);

        assert_eq!(council.status(&b).unwrap().state(), &SessionState::Open);
        assert_eq!(council.len(), 2);
    }

    #[test]
    fn test_unknown_handle() {
        let council = Council::new();
        let stranger: SessionHandle = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        assert_eq!(council.finalize(&stranger), Err(AudioLinkError::UnknownSession));
        assert_eq!(
            council.submit_ballot(&stranger, "x", 1.0),
            Err(AudioLinkError::UnknownSession)
        );
        assert_eq!(
            "not-a-uuid".parse::<SessionHandle>(),
            Err(AudioLinkError::UnknownSession)
        );
    }

    #[test]
    fn test_handle_round_trips_through_text() {
        let council = Council::new();
        let handle = council.open_session(9, 0.8, 0.5).unwrap();
        let parsed: SessionHandle = handle.to_string().parse().unwrap();
        assert_eq!(parsed, handle);
    }

    #[test]
    fn test_finalize_then_submit() {
        let council = Council::new();
        let handle = council.open_session(9, 0.5, 0.5).unwrap();
        council.submit_ballot(&handle, "early", 0.9).unwrap();
        let outcome = council.finalize(&handle).unwrap();
        assert_eq!(outcome.decision, Decision::Pass);
        assert_eq!(
            council.submit_ballot(&handle, "late", 0.9),
            Err(AudioLinkError::SessionClosed)
        );
        assert_eq!(council.finalize(&handle).unwrap(), outcome);
    }

    #[test]
    fn test_abandon_and_remove() {
        let council = Council::new();
        let handle = council.open_session(3, 0.5, 0.5).unwrap();
        council.abandon(&handle).unwrap();
        assert_eq!(council.finalize(&handle).unwrap().decision, Decision::Abandoned);
        assert_eq!(council.abandon(&handle), Err(AudioLinkError::SessionClosed));

        council.remove(&handle).unwrap();
        assert!(council.is_empty());
        assert!(council.status(&handle).is_err());
        assert_eq!(council.remove(&handle).unwrap_err(), AudioLinkError::UnknownSession);
    }

    #[test]
    fn test_remove_keeps_final_state() {
        let council = Council::new();
        let open = council.open_session(3, 0.5, 0.5).unwrap();
        let done = council.open_session(1, 0.5, 0.5).unwrap();
        council.submit_ballot(&open, "pending", 0.9).unwrap();
        council.submit_ballot(&done, "aye", 0.9).unwrap();
        assert_eq!(council.len(), 2);

        let removed = council.remove(&open).unwrap();
        assert_eq!(removed.state(), &SessionState::Abandoned);
        assert_eq!(removed.ballots().len(), 1);

        let removed = council.remove(&done).unwrap();
        assert_eq!(removed.outcome().unwrap().decision, Decision::Pass);
        assert!(council.is_empty());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let council = Council::new();
        assert!(matches!(
            council.open_session(0, 0.5, 0.5),
            Err(AudioLinkError::InvalidConfig(_))
        ));
        assert!(council.is_empty());
    }
}
