//! Dispatcher: announcement in, message filed
//!
//! Per announcement:
//!
//! ```text
//! received -> framed? -> fetch blob -> decode -> classify -> route
//!                 \           \           \
//!                  discarded   discarded   discarded
//! ```
//!
//! Nothing that goes wrong here is surfaced as an error. Discards are
//! counted and logged at debug level; a message that is not for us looks
//! exactly like one that failed to decrypt.

use crate::announcement;
use crate::envelope::{decline_prompt, Keyring, LockedKey, Message, PassphrasePrompt};
use crate::identity::{ContactDirectory, Identity, SelfIdentities};
use crate::mailbox::{Folder, Mailboxes};
use crate::metrics::{
    record_counter, record_labeled_counter, DispatchStats, DispatchStatsSnapshot, Timer,
    DECODE_DURATION_MS, DISPATCH_DISCARDED, DISPATCH_RECEIVED, DISPATCH_ROUTED,
};
use crate::network::{ContentStore, PubSubMessage, Subscription};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

/// Contact directory shared between the dispatcher and the front-end
pub type SharedContacts = Arc<RwLock<ContactDirectory>>;

/// How `run` handles announcements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One at a time, in delivery order
    Sequential,
    /// One task per announcement; completion order is arbitrary
    #[default]
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// Wrong topic or missing prefix/postfix
    NotAnnouncement,
    /// The blob could not be fetched
    FetchFailed,
    /// The blob did not decode with our keys
    NotForUs,
    /// The decode task panicked or was cancelled
    TaskFailed,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::NotAnnouncement => "not_announcement",
            DiscardReason::FetchFailed => "fetch_failed",
            DiscardReason::NotForUs => "not_for_us",
            DiscardReason::TaskFailed => "task_failed",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Routed { folder: Folder, id: u64 },
    Discarded(DiscardReason),
}

/// Pick the mailbox for a message from `sender`: our own identities first,
/// then contacts, everyone else is a contact request.
pub fn classify(sender: &Identity, selves: &SelfIdentities, contacts: &ContactDirectory) -> Folder {
    if selves.contains(sender) {
        Folder::Sent
    } else if contacts.contains(sender) {
        Folder::Inbox
    } else {
        Folder::Requests
    }
}

/// Consumes announcements and files the messages they point at
#[derive(Clone)]
pub struct Dispatcher {
    storage: Arc<dyn ContentStore>,
    selves: Arc<SelfIdentities>,
    contacts: SharedContacts,
    mailboxes: Arc<Mailboxes>,
    prompt: Arc<PassphrasePrompt<'static>>,
    topic: String,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(
        storage: Arc<dyn ContentStore>,
        selves: Arc<SelfIdentities>,
        contacts: SharedContacts,
        mailboxes: Arc<Mailboxes>,
    ) -> Self {
        Self {
            storage,
            selves,
            contacts,
            mailboxes,
            prompt: Arc::new(decline_prompt),
            topic: announcement::MAIL_TOPIC.to_string(),
            stats: Arc::new(DispatchStats::new()),
        }
    }

    /// Listen on `topic` instead of the mail topic
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Use `prompt` to unlock passphrase-protected keys. It runs on a
    /// blocking thread and may wait for user input.
    pub fn with_prompt<F>(mut self, prompt: F) -> Self
    where
        F: Fn(&[LockedKey]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.prompt = Arc::new(prompt);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn mailboxes(&self) -> &Arc<Mailboxes> {
        &self.mailboxes
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Take one pub/sub message through the whole pipeline
    pub async fn dispatch(&self, message: PubSubMessage) -> DispatchOutcome {
        self.stats.inc_received();
        record_counter(DISPATCH_RECEIVED, 1);

        let outcome = self.process(message).await;
        self.record(outcome);
        outcome
    }

    async fn process(&self, message: PubSubMessage) -> DispatchOutcome {
        if !announcement::is_on_topic(&message, &self.topic) || !announcement::is_framed(&message.payload) {
            trace!(origin = %message.origin, sequence = message.sequence, "Ignoring non-announcement");
            return DispatchOutcome::Discarded(DiscardReason::NotAnnouncement);
        }

        let address = match announcement::decode(&message.payload) {
            Ok(address) => address,
            Err(e) => {
                debug!(origin = %message.origin, error = %e, "Discarding malformed announcement");
                return DispatchOutcome::Discarded(DiscardReason::NotAnnouncement);
            }
        };

        let encrypted = match self.storage.fetch(&address).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(%address, error = %e, "Discarding announcement, fetch failed");
                return DispatchOutcome::Discarded(DiscardReason::FetchFailed);
            }
        };

        let selves = self.selves.clone();
        let contacts = self.contacts.clone();
        let mailboxes = self.mailboxes.clone();
        let prompt = self.prompt.clone();
        let stats = self.stats.clone();
        let PubSubMessage { origin, sequence, .. } = message;

        let task = tokio::task::spawn_blocking(move || {
            // decode against a snapshot so the lock is not held while prompting
            let contacts = contacts.read().unwrap_or_else(PoisonError::into_inner).clone();
            let keyring = Keyring::new(&selves, &contacts);

            let timer = Timer::new(DECODE_DURATION_MS);
            let decoded = Message::open(encrypted, origin, sequence, &keyring, prompt.as_ref());
            timer.stop();

            match decoded {
                Ok(message) => {
                    let folder = classify(message.sender(), &selves, &contacts);
                    let id = message.id();
                    if !mailboxes.route(folder, message) {
                        stats.inc_save_failed();
                    }
                    DispatchOutcome::Routed { folder, id }
                }
                Err(e) => {
                    debug!(%address, error = %e, "Discarding message, not decodable with our keys");
                    DispatchOutcome::Discarded(DiscardReason::NotForUs)
                }
            }
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Decode task failed");
                DispatchOutcome::Discarded(DiscardReason::TaskFailed)
            }
        }
    }

    fn record(&self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Routed { folder, .. } => {
                match folder {
                    Folder::Sent => self.stats.inc_sent(),
                    Folder::Inbox => self.stats.inc_inbox(),
                    Folder::Requests => self.stats.inc_requests(),
                }
                record_counter(DISPATCH_ROUTED, 1);
            }
            DispatchOutcome::Discarded(reason) => {
                match reason {
                    DiscardReason::NotAnnouncement => self.stats.inc_not_announcement(),
                    DiscardReason::FetchFailed => self.stats.inc_fetch_failed(),
                    DiscardReason::NotForUs => self.stats.inc_not_for_us(),
                    DiscardReason::TaskFailed => self.stats.inc_task_failed(),
                }
                record_labeled_counter(DISPATCH_DISCARDED, "reason", reason.as_str());
            }
        }
    }

    /// Drain `subscription` until it closes.
    ///
    /// In concurrent mode every announcement gets its own task and the loop
    /// keeps draining while they run. Tasks still in flight when the stream
    /// ends are awaited, never cancelled.
    pub async fn run(&self, mut subscription: Subscription, mode: DispatchMode) -> DispatchStatsSnapshot {
        info!(topic = %self.topic, ?mode, "Dispatcher started");
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                received = subscription.recv() => {
                    let Some(message) = received else { break };
                    match mode {
                        DispatchMode::Sequential => {
                            self.dispatch(message).await;
                        }
                        DispatchMode::Concurrent => {
                            let dispatcher = self.clone();
                            tasks.spawn(async move { dispatcher.dispatch(message).await });
                        }
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.reap(joined);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.reap(joined);
        }

        let stats = self.stats();
        info!(
            received = stats.received,
            routed = stats.routed(),
            discarded = stats.discarded(),
            "Subscription closed, dispatcher stopped"
        );
        stats
    }

    fn reap(&self, joined: Result<DispatchOutcome, tokio::task::JoinError>) {
        if let Err(e) = joined {
            warn!(error = %e, "Dispatch task failed");
            self.stats.inc_task_failed();
        }
    }
}
