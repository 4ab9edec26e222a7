//! Resequencer: turns out-of-order arrivals into in-order projection updates
//!
//! Every ingest first appends the message to the log, unconditionally. It
//! then takes the channel's [`ChannelGuard`](crate::infra::ChannelGuard) and
//! advances the channel's projection as far as the log is contiguous:
//!
//! 1. Message #1 builds a fresh projection from itself alone; any other
//!    number loads the stored projection, and without one the call ends
//!    there (the message waits in the log).
//! 2. Everything logged after the projection's cursor is loaded in order and
//!    folded until the first gap.
//! 3. The result is written with a single upsert. A failure anywhere before
//!    that write persists nothing.
//!
//! Because every ingest re-runs steps 1-3 for its channel, a late message
//! unblocks everything logged behind it.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    build_rocket_state, fold_contiguous_prefix, ChannelId, FoldError, IngestOutcome,
    IngestReceipt, Message, Rocket, ValidationMode, MAX_MESSAGE_NUMBER,
};
use crate::infra::{
    ChannelSerializer, LocalChannelLocks, MessageLog, ResequencerError, Result, RocketStore,
};
use crate::metrics::{metric_names, timed, MetricsRegistry};

/// Orchestrates logging, per-channel serialization and projection folding
pub struct Resequencer {
    log: Arc<dyn MessageLog>,
    rockets: Arc<dyn RocketStore>,
    serializer: Arc<dyn ChannelSerializer>,
    validation: ValidationMode,
    metrics: Arc<MetricsRegistry>,
}

impl Resequencer {
    /// Create a resequencer with process-local channel locks and lenient validation
    pub fn new(log: Arc<dyn MessageLog>, rockets: Arc<dyn RocketStore>) -> Self {
        Self {
            log,
            rockets,
            serializer: Arc::new(LocalChannelLocks::new()),
            validation: ValidationMode::default(),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ChannelSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_validation_mode(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn validation_mode(&self) -> ValidationMode {
        self.validation
    }

    pub fn serializer_name(&self) -> &'static str {
        self.serializer.name()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Log a message and advance its channel's projection as far as possible.
    ///
    /// Numbers above [`MAX_MESSAGE_NUMBER`] are refused before the append.
    /// `Ok` means the message is durably logged. The receipt says whether a
    /// projection was written.
    #[instrument(
        skip_all,
        fields(
            channel = %message.channel(),
            message_number = message.message_number(),
            message_type = %message.message_type(),
        )
    )]
    pub async fn ingest(&self, message: &Message) -> Result<IngestReceipt> {
        let channel = message.channel();
        let message_number = message.message_number();

        if message_number > MAX_MESSAGE_NUMBER {
            warn!("Message number out of range, not logged");
            return Err(ResequencerError::MessageNumberOutOfRange {
                channel,
                message_number,
                max: MAX_MESSAGE_NUMBER,
            });
        }

        if let Err(source) = self.log.append(message).await {
            self.metrics
                .inc_counter(metric_names::LOG_WRITE_FAILURES)
                .await;
            error!(error = %source, "Failed to append message to log");
            return Err(ResequencerError::LogWriteFailed {
                channel,
                message_number,
                source: Box::new(source),
            });
        }
        self.metrics.inc_counter(metric_names::MESSAGES_LOGGED).await;

        let _guard = self.serializer.acquire(&channel).await?;
        let outcome = timed(
            &self.metrics,
            metric_names::RECONCILE_LATENCY,
            self.advance(message),
        )
        .await?;

        Ok(IngestReceipt {
            channel,
            message_number,
            outcome,
        })
    }

    /// Fold newly contiguous messages onto the stored projection.
    ///
    /// Never appends and never takes the first-message shortcut. Writes only
    /// when at least one message was applied. `None` when the channel has no
    /// projection yet.
    #[instrument(skip_all, fields(channel = %channel))]
    pub async fn reconcile(&self, channel: &ChannelId) -> Result<Option<Rocket>> {
        let _guard = self.serializer.acquire(channel).await?;

        let Some(rocket) = self.rockets.get(channel).await? else {
            debug!("No projection to reconcile");
            return Ok(None);
        };

        let pending = self.log.range_after(channel, rocket.cursor()).await?;
        let fold = match fold_contiguous_prefix(rocket, &pending, self.validation) {
            Ok(fold) => fold,
            Err(err) => return Err(self.apply_failed(*channel, err).await),
        };

        if fold.applied > 0 {
            self.rockets.upsert(&fold.rocket).await?;
            self.metrics
                .add_counter(metric_names::MESSAGES_APPLIED, fold.applied as u64)
                .await;
            info!(
                applied = fold.applied,
                cursor = fold.rocket.cursor(),
                "Reconciled projection"
            );
        }

        Ok(Some(fold.rocket))
    }

    /// Replay the channel's whole log from sequence 1 and overwrite the projection.
    ///
    /// `None` when message 1 has not been logged yet; nothing is written then.
    #[instrument(skip_all, fields(channel = %channel))]
    pub async fn rebuild(&self, channel: &ChannelId) -> Result<Option<Rocket>> {
        let _guard = self.serializer.acquire(channel).await?;

        let history = self.log.all(channel).await?;
        let fold = match fold_contiguous_prefix(Rocket::new(*channel), &history, self.validation) {
            Ok(fold) => fold,
            Err(err) => return Err(self.apply_failed(*channel, err).await),
        };

        if fold.applied == 0 {
            debug!("Message 1 not logged, nothing to rebuild");
            return Ok(None);
        }

        self.rockets.upsert(&fold.rocket).await?;
        self.metrics
            .add_counter(metric_names::MESSAGES_APPLIED, fold.applied as u64)
            .await;
        info!(
            applied = fold.applied,
            cursor = fold.rocket.cursor(),
            "Rebuilt projection from log"
        );

        Ok(Some(fold.rocket))
    }

    /// Every logged message for a channel, ascending by sequence number
    pub async fn history(&self, channel: &ChannelId) -> Result<Vec<Message>> {
        self.log.all(channel).await
    }

    /// Steps 1-3 of an ingest; the caller holds the channel guard.
    async fn advance(&self, message: &Message) -> Result<IngestOutcome> {
        let channel = message.channel();

        let (start, seeded) = if message.message_number() == 1 {
            let built =
                build_rocket_state(channel, std::slice::from_ref(message), self.validation);
            match built {
                Ok(rocket) => (rocket, 1),
                Err(source) => {
                    return Err(self
                        .apply_failed(
                            channel,
                            FoldError {
                                message_number: 1,
                                source,
                            },
                        )
                        .await)
                }
            }
        } else {
            match self.rockets.get(&channel).await? {
                Some(rocket) => (rocket, 0),
                None => {
                    self.metrics
                        .inc_counter(metric_names::INGESTS_DEFERRED)
                        .await;
                    debug!("Channel has no projection yet, message deferred");
                    return Ok(IngestOutcome::Deferred);
                }
            }
        };

        let pending = self.log.range_after(&channel, start.cursor()).await?;
        let fold = match fold_contiguous_prefix(start, &pending, self.validation) {
            Ok(fold) => fold,
            Err(err) => return Err(self.apply_failed(channel, err).await),
        };

        if let Some(gap_at) = fold.gap_at {
            debug!(
                next_expected = fold.rocket.next_expected(),
                gap_at, "Fold stopped at gap"
            );
        }

        self.rockets.upsert(&fold.rocket).await?;

        let applied = seeded + fold.applied;
        self.metrics
            .add_counter(metric_names::MESSAGES_APPLIED, applied as u64)
            .await;
        debug!(
            applied,
            cursor = fold.rocket.cursor(),
            "Projection advanced"
        );

        Ok(IngestOutcome::Applied {
            applied,
            last_message_number: fold.rocket.cursor(),
        })
    }

    async fn apply_failed(&self, channel: ChannelId, err: FoldError) -> ResequencerError {
        self.metrics.inc_counter(metric_names::APPLY_FAILURES).await;
        error!(
            failed_message = err.message_number,
            error = %err.source,
            "Message could not be applied"
        );
        warn!(
            failed_message = err.message_number,
            "Channel stalled until the message is corrected"
        );
        ResequencerError::ApplyFailed {
            channel,
            message_number: err.message_number,
            source: err.source,
        }
    }
}
