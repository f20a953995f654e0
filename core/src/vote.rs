use crate::error::{AudioLinkError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Pass/fail rules fixed when a council vote opens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuorumPolicy {
    pub expected_ballots: usize,
    /// Minimum mean resonance for the motion to pass
    pub quorum_threshold: f32,
    /// Minimum share of ballots that must carry the plurality text
    pub majority_fraction: f32,
}

impl QuorumPolicy {
    pub fn new(expected_ballots: usize, quorum_threshold: f32, majority_fraction: f32) -> Result<Self> {
        let policy = Self {
            expected_ballots,
            quorum_threshold,
            majority_fraction,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.expected_ballots == 0 {
            return Err(AudioLinkError::InvalidConfig(
                "expected_ballots must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("quorum_threshold", self.quorum_threshold),
            ("majority_fraction", self.majority_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AudioLinkError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            expected_ballots: 9,
            quorum_threshold: 0.8,
            majority_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ballot {
    pub text: String,
    pub resonance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pass,
    Fail,
    Abandoned,
}

/// Final result of a session with the statistics it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome {
    pub decision: Decision,
    pub ballots_counted: usize,
    pub aggregate_resonance: f64,
    pub agreement_ratio: f64,
    pub plurality_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Open,
    Collecting,
    Finalized(VoteOutcome),
    Abandoned,
}

/// Council vote over independently received glyphs
///
/// Open -> Collecting -> Finalized(Pass | Fail) or Abandoned. The outcome is
/// a pure function of the policy and the ordered ballots.
#[derive(Debug, Clone)]
pub struct VoteSession {
    policy: QuorumPolicy,
    ballots: Vec<Ballot>,
    state: SessionState,
}

impl VoteSession {
    pub fn open(policy: QuorumPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            ballots: Vec::with_capacity(policy.expected_ballots),
            state: SessionState::Open,
        })
    }

    pub fn policy(&self) -> &QuorumPolicy {
        &self.policy
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Finalized(_) | SessionState::Abandoned)
    }

    pub fn outcome(&self) -> Option<VoteOutcome> {
        match &self.state {
            SessionState::Finalized(outcome) => Some(outcome.clone()),
            SessionState::Abandoned => Some(abandoned_outcome(self.ballots.len())),
            _ => None,
        }
    }

    /// Accept one ballot. Returns the outcome when this ballot completes the vote.
    pub fn submit_ballot(&mut self, text: &str, resonance: f32) -> Result<Option<VoteOutcome>> {
        if self.is_closed() {
            return Err(AudioLinkError::SessionClosed);
        }
        if text.trim().is_empty() {
            return Err(AudioLinkError::InvalidBallot("empty glyph text".into()));
        }
        if !resonance.is_finite() || !(0.0..=1.0).contains(&resonance) {
            return Err(AudioLinkError::InvalidBallot(format!(
                "resonance {} outside [0, 1]",
                resonance
            )));
        }

        self.ballots.push(Ballot {
            text: text.to_string(),
            resonance,
        });
        self.state = SessionState::Collecting;
        log::debug!(
            "ballot {}/{} accepted (resonance {:.3})",
            self.ballots.len(),
            self.policy.expected_ballots,
            resonance
        );

        if self.ballots.len() == self.policy.expected_ballots {
            return Ok(Some(self.seal()));
        }
        Ok(None)
    }

    /// Finalize now with whatever ballots have arrived; idempotent once closed
    pub fn close(&mut self) -> VoteOutcome {
        match self.outcome() {
            Some(outcome) => outcome,
            None => self.seal(),
        }
    }

    /// Cancel the vote without a decision
    pub fn abandon(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(AudioLinkError::SessionClosed);
        }
        log::debug!("vote abandoned after {} ballots", self.ballots.len());
        self.state = SessionState::Abandoned;
        Ok(())
    }

    fn seal(&mut self) -> VoteOutcome {
        let outcome = tally(&self.policy, &self.ballots);
        log::debug!(
            "vote finalized: {:?} (resonance {:.3}, agreement {:.3})",
            outcome.decision,
            outcome.aggregate_resonance,
            outcome.agreement_ratio
        );
        self.state = SessionState::Finalized(outcome.clone());
        outcome
    }
}

fn abandoned_outcome(ballots: usize) -> VoteOutcome {
    VoteOutcome {
        decision: Decision::Abandoned,
        ballots_counted: ballots,
        aggregate_resonance: 0.0,
        agreement_ratio: 0.0,
        plurality_text: None,
    }
}

/// Mean resonance and plurality agreement; ties go to the text heard first
pub fn tally(policy: &QuorumPolicy, ballots: &[Ballot]) -> VoteOutcome {
    if ballots.is_empty() {
        return VoteOutcome {
            decision: Decision::Fail,
            ballots_counted: 0,
            aggregate_resonance: 0.0,
            agreement_ratio: 0.0,
            plurality_text: None,
        };
    }

    let n = ballots.len() as f64;
    let aggregate_resonance =
        ballots.iter().map(|b| b.resonance as f64).sum::<f64>() / n;

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for ballot in ballots {
        match counts.iter_mut().find(|(text, _)| *text == ballot.text) {
            Some((_, count)) => *count += 1,
            None => counts.push((&ballot.text, 1)),
        }
    }
    let mut plurality = counts[0];
    for &entry in &counts[1..] {
        if entry.1 > plurality.1 {
            plurality = entry;
        }
    }
    let agreement_ratio = plurality.1 as f64 / n;

    let passes = aggregate_resonance >= policy.quorum_threshold as f64
        && agreement_ratio >= policy.majority_fraction as f64;

    VoteOutcome {
        decision: if passes { Decision::Pass } else { Decision::Fail },
        ballots_counted: ballots.len(),
        aggregate_resonance,
        agreement_ratio,
        plurality_text: Some(plurality.0.to_string()),
    }
}

/// Vote session shared between several capture sources; submissions are
/// serialized by the lock so the ballot order stays well defined
#[derive(Debug, Clone)]
pub struct SharedVoteSession {
    inner: Arc<Mutex<VoteSession>>,
}

impl SharedVoteSession {
    pub fn open(policy: QuorumPolicy) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(VoteSession::open(policy)?)),
        })
    }

    pub fn submit_ballot(&self, text: &str, resonance: f32) -> Result<Option<VoteOutcome>> {
        self.inner.lock().submit_ballot(text, resonance)
    }

    pub fn close(&self) -> VoteOutcome {
        self.inner.lock().close()
    }

    pub fn abandon(&self) -> Result<()> {
        self.inner.lock().abandon()
    }

    pub fn outcome(&self) -> Option<VoteOutcome> {
        self.inner.lock().outcome()
    }

    pub fn ballot_count(&self) -> usize {
        self.inner.lock().ballots().len()
    }

    /// Copy of the session as it stands
    pub fn snapshot(&self) -> VoteSession {
        self.inner.lock().clone()
    }
}
