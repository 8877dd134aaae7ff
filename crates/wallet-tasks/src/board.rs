use serde::Serialize;
use std::collections::BTreeSet;
use wallet_core::{DisplayableOffer, EligibilityFlag};

pub const ELIGIBILITY_TASK_LABEL: &str = "Get Your Trusted Traveler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardState {
    Empty,
    HasTasks,
}

impl BoardState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::HasTasks => "has_tasks",
        }
    }
}

/// One actionable row in the pending-tasks list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingTask {
    Eligibility(EligibilityFlag),
    CredentialOffer(DisplayableOffer),
}

impl PendingTask {
    pub fn label(&self) -> String {
        match self {
            PendingTask::Eligibility(_) => ELIGIBILITY_TASK_LABEL.to_string(),
            PendingTask::CredentialOffer(offer) => format!("Claim {}", offer.credential_name),
        }
    }

    /// Stable identity for list rendering.
    pub fn key(&self) -> String {
        match self {
            PendingTask::Eligibility(_) => "eligibility".to_string(),
            PendingTask::CredentialOffer(offer) => format!("offer:{}", offer.id()),
        }
    }
}

/// Presence is decided by the offer list and by `has_credential`, never by
/// the mere existence of a flag record.
pub fn task_presence(flag: &EligibilityFlag, offers: &[DisplayableOffer]) -> bool {
    !offers.is_empty() || flag.is_eligible()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket {
    seq: u64,
}

impl RefreshTicket {
    pub fn seq(self) -> u64 {
        self.seq
    }
}

/// Orders eligibility store reads the same way offer refreshes are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EligibilityTicket {
    seq: u64,
}

impl EligibilityTicket {
    pub fn seq(self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub started: u64,
    pub applied: u64,
    pub discarded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityOutcome {
    Changed,
    Unchanged,
    Stale,
}

#[derive(Debug, Clone, Copy, Default)]
struct SeqWindow {
    next: u64,
    applied: u64,
    floor: u64,
}

impl SeqWindow {
    fn begin(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    fn is_stale(&self, seq: u64) -> bool {
        seq < self.floor || seq <= self.applied
    }

    fn invalidate(&mut self) {
        self.floor = self.next + 1;
    }
}

/// Task state owned by the aggregator. Offer refreshes and eligibility reads
/// are sequence numbered; a result older than the newest applied one of the
/// same source is discarded.
#[derive(Debug, Clone, Default)]
pub struct TaskBoard {
    offers: Vec<DisplayableOffer>,
    eligibility: EligibilityFlag,
    eligibility_loaded: bool,
    refreshes: SeqWindow,
    eligibility_reads: SeqWindow,
    stats: RefreshStats,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.stats.started += 1;
        RefreshTicket {
            seq: self.refreshes.begin(),
        }
    }

    fn is_stale(&self, ticket: RefreshTicket) -> bool {
        self.refreshes.is_stale(ticket.seq)
    }

    pub fn apply_refresh(
        &mut self,
        ticket: RefreshTicket,
        offers: Vec<DisplayableOffer>,
    ) -> RefreshOutcome {
        if self.is_stale(ticket) {
            self.stats.discarded += 1;
            return RefreshOutcome::Stale;
        }
        let mut seen = BTreeSet::new();
        self.offers = offers
            .into_iter()
            .filter(|offer| seen.insert(offer.id().to_string()))
            .collect();
        self.refreshes.applied = ticket.seq;
        self.stats.applied += 1;
        RefreshOutcome::Applied
    }

    /// Records a failed refresh. Returns `false` when the failure belongs to
    /// a refresh that would have been discarded anyway.
    pub fn fail_refresh(&mut self, ticket: RefreshTicket) -> bool {
        if self.is_stale(ticket) {
            self.stats.discarded += 1;
            return false;
        }
        self.stats.failed += 1;
        true
    }

    /// Makes every refresh and eligibility read started so far stale.
    pub fn invalidate_in_flight(&mut self) {
        self.refreshes.invalidate();
        self.eligibility_reads.invalidate();
    }

    pub fn begin_eligibility_read(&mut self) -> EligibilityTicket {
        EligibilityTicket {
            seq: self.eligibility_reads.begin(),
        }
    }

    /// Applies a store read. An absent record keeps the current flag but
    /// still supersedes older reads.
    pub fn apply_eligibility(
        &mut self,
        ticket: EligibilityTicket,
        flag: Option<EligibilityFlag>,
    ) -> EligibilityOutcome {
        if self.eligibility_reads.is_stale(ticket.seq) {
            return EligibilityOutcome::Stale;
        }
        self.eligibility_reads.applied = ticket.seq;
        let Some(flag) = flag else {
            return EligibilityOutcome::Unchanged;
        };
        self.eligibility_loaded = true;
        if self.eligibility == flag {
            return EligibilityOutcome::Unchanged;
        }
        self.eligibility = flag;
        EligibilityOutcome::Changed
    }

    /// Returns `false` when the failed read was already superseded.
    pub fn fail_eligibility(&mut self, ticket: EligibilityTicket) -> bool {
        if self.eligibility_reads.is_stale(ticket.seq) {
            return false;
        }
        self.eligibility_reads.applied = ticket.seq;
        true
    }

    pub fn eligibility(&self) -> &EligibilityFlag {
        &self.eligibility
    }

    pub fn eligibility_loaded(&self) -> bool {
        self.eligibility_loaded
    }

    pub fn offers(&self) -> &[DisplayableOffer] {
        &self.offers
    }

    pub fn stats(&self) -> RefreshStats {
        self.stats
    }

    pub fn presence(&self) -> bool {
        task_presence(&self.eligibility, &self.offers)
    }

    pub fn state(&self) -> BoardState {
        if self.presence() {
            BoardState::HasTasks
        } else {
            BoardState::Empty
        }
    }

    /// The eligibility task, when active, always precedes credential offers.
    pub fn tasks(&self) -> Vec<PendingTask> {
        let mut tasks = Vec::with_capacity(self.offers.len() + 1);
        if self.eligibility.is_eligible() {
            tasks.push(PendingTask::Eligibility(self.eligibility.clone()));
        }
        tasks.extend(self.offers.iter().cloned().map(PendingTask::CredentialOffer));
        tasks
    }
}
