use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::format::Formatter;
use crate::lookup::PriceLookup;
use crate::preference::UserPreference;
use crate::subscription_store::SubscriptionStore;
use crate::transport::MessageSender;

const DIGEST_TITLE: &str = "Stock Price Update";
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub notified: usize,
    pub skipped_empty: usize,
    pub skipped_unavailable: usize,
    pub failed_sends: usize,
    /// Tickers that could not be fetched this tick, sorted.
    pub unavailable: Vec<String>,
    /// Shutdown was requested before every due user was handled.
    pub interrupted: bool,
}

/// Fans quotes out to every user whose interval has elapsed.
///
/// The clock is an argument to [`run_tick`](Self::run_tick); whatever fires
/// the tick owns the cadence.
pub struct NotificationScheduler {
    store: Arc<SubscriptionStore>,
    lookup: Arc<PriceLookup>,
    sender: Arc<dyn MessageSender>,
    formatter: Formatter,
    send_timeout: Duration,
    stopping: AtomicBool,
    // held for the duration of a tick
    in_flight: Mutex<()>,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<SubscriptionStore>,
        lookup: Arc<PriceLookup>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            store,
            lookup,
            sender,
            formatter: Formatter::default(),
            send_timeout: SEND_TIMEOUT,
            stopping: AtomicBool::new(false),
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    #[instrument(name = "run_tick", skip(self), fields(now = %now))]
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        if self.is_stopping() {
            debug!("scheduler stopping, tick ignored");
            return report;
        }
        let _tick = self.in_flight.lock().await;
        if self.is_stopping() {
            debug!("scheduler stopped while tick was queued");
            return report;
        }

        let due: Vec<UserPreference> = self
            .store
            .list_all()
            .await
            .into_iter()
            .filter(|pref| pref.is_due(now))
            .collect();
        report.due = due.len();

        let (due, empty): (Vec<_>, Vec<_>) = due.into_iter().partition(|p| !p.tickers.is_empty());
        report.skipped_empty = empty.len();

        if due.is_empty() {
            debug!(skipped_empty = report.skipped_empty, "no users due");
            return report;
        }

        let results = self
            .lookup
            .fetch_many(due.iter().flat_map(|p| p.tickers.iter().cloned()))
            .await;

        report.unavailable = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        report.unavailable.sort();

        info!(
            due = due.len(),
            tickers = results.len(),
            unavailable = report.unavailable.len(),
            "quotes fetched"
        );

        for (i, pref) in due.iter().enumerate() {
            if self.is_stopping() {
                warn!(remaining = due.len() - i, "shutdown requested, ending tick early");
                report.interrupted = true;
                break;
            }

            let user_id = pref.user_id;

            if !pref.tickers.iter().any(|s| matches!(results.get(s), Some(Ok(_)))) {
                warn!(user_id, "no quotes available for user, retrying next tick");
                report.skipped_unavailable += 1;
                continue;
            }

            let text = self.formatter.digest(DIGEST_TITLE, &pref.tickers, &results, now);

            match tokio::time::timeout(self.send_timeout, self.sender.send_message(user_id, &text)).await {
                Ok(Ok(())) => debug!(user_id, "notification sent"),
                Ok(Err(e)) => {
                    warn!(user_id, error = %e, "send failed");
                    report.failed_sends += 1;
                    continue;
                }
                Err(_) => {
                    warn!(user_id, "send timed out");
                    report.failed_sends += 1;
                    continue;
                }
            }

            match self.store.mark_notified(user_id, now).await {
                Ok(()) => report.notified += 1,
                Err(e) => error!(user_id, error = %e, "mark_notified failed"),
            }
        }

        info!(
            notified = report.notified,
            failed_sends = report.failed_sends,
            skipped_unavailable = report.skipped_unavailable,
            "tick completed"
        );

        report
    }

    /// Stop picking up users. A running tick finishes the user it is on.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Request a stop and wait for the in-flight tick, if any.
    pub async fn shutdown(&self) {
        self.request_stop();
        let _ = self.in_flight.lock().await;
        info!("notification scheduler stopped");
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserId;
    use crate::backend::{MemoryBackend, PreferenceBackend};
    use crate::error::TransportError;
    use crate::lookup::RetryPolicy;
    use crate::testing::{FakeProvider, RecordingSender};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tokio::sync::Notify;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 14, 0, 0).unwrap()
    }

    async fn store() -> Arc<SubscriptionStore> {
        Arc::new(
            SubscriptionStore::open(Arc::new(MemoryBackend::new()), &[])
                .await
                .unwrap(),
        )
    }

    fn lookup(provider: FakeProvider) -> (Arc<FakeProvider>, Arc<PriceLookup>) {
        let provider = Arc::new(provider);
        let lookup = PriceLookup::new(provider.clone()).with_policy(RetryPolicy {
            attempts: 1,
            delay: std::time::Duration::ZERO,
            timeout: std::time::Duration::from_secs(1),
        });
        (provider, Arc::new(lookup))
    }

    async fn subscribe(store: &SubscriptionStore, user_id: UserId, symbols: &[&str], at: DateTime<Utc>) {
        let symbols: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
        store.set_tickers(user_id, &symbols).await.unwrap();
        store.mark_notified(user_id, at).await.unwrap();
    }

    #[tokio::test]
    async fn user_is_notified_only_after_interval() {
        let store = store().await;
        subscribe(&store, 1, &["AAPL"], t0()).await;
        store.set_interval(1, 3).await.unwrap();

        let (_, lookup) = lookup(FakeProvider::new().with_quote("AAPL", 150.0, 148.0));
        let sender = Arc::new(RecordingSender::new());
        let scheduler = NotificationScheduler::new(store.clone(), lookup, sender.clone());

        let early = scheduler.run_tick(t0() + ChronoDuration::hours(2)).await;
        assert_eq!(early.due, 0);
        assert!(sender.sent().is_empty());
        assert_eq!(store.get(1).await.unwrap().last_notified, Some(t0()));

        let on_time = t0() + ChronoDuration::hours(3);
        let report = scheduler.run_tick(on_time).await;
        assert_eq!(report.notified, 1);
        assert_eq!(sender.sent().len(), 1);
        assert_eq!(store.get(1).await.unwrap().last_notified, Some(on_time));
    }

    #[tokio::test]
    async fn failed_ticker_is_reported_unavailable() {
        let store = store().await;
        subscribe(&store, 1, &["AAPL", "MSFT"], t0()).await;

        let (_, lookup) = lookup(
            FakeProvider::new()
                .with_quote("AAPL", 150.0, 148.0)
                .with_outage("MSFT"),
        );
        let sender = Arc::new(RecordingSender::new());
        let scheduler = NotificationScheduler::new(store.clone(), lookup, sender.clone());

        let report = scheduler.run_tick(t0() + ChronoDuration::hours(2)).await;
        assert_eq!(report.notified, 1);
        assert_eq!(report.unavailable, vec!["MSFT".to_string()]);

        let text = sender.sent_to(1).unwrap();
        assert!(text.contains("📈 AAPL"));
        assert!(text.contains("Price: USD 150.00"));
        assert!(text.contains("Change: +2.00 (+1.35%)"));
        assert!(text.contains("MSFT: unavailable"));
    }

    #[tokio::test]
    async fn shared_tickers_are_fetched_once() {
        let store = store().await;
        subscribe(&store, 1, &["AAPL", "NVDA"], t0()).await;
        subscribe(&store, 2, &["AAPL"], t0()).await;
        subscribe(&store, 3, &["NVDA", "AAPL"], t0()).await;

        let (provider, lookup) = lookup(
            FakeProvider::new()
                .with_quote("AAPL", 150.0, 148.0)
                .with_quote("NVDA", 500.0, 510.0),
        );
        let sender = Arc::new(RecordingSender::new());
        let scheduler = NotificationScheduler::new(store, lookup, sender.clone());

        let report = scheduler.run_tick(t0() + ChronoDuration::hours(2)).await;
        assert_eq!(report.notified, 3);
        assert_eq!(provider.calls("AAPL"), 1);
        assert_eq!(provider.calls("NVDA"), 1);
    }

    #[tokio::test]
    async fn failed_send_does_not_abort_batch() {
        let store = store().await;
        subscribe(&store, 1, &["AAPL"], t0()).await;
        subscribe(&store, 2, &["AAPL"], t0()).await;

        let (_, lookup) = lookup(FakeProvider::new().with_quote("AAPL", 150.0, 148.0));
        let sender = Arc::new(RecordingSender::new().failing_for(1));
        let scheduler = NotificationScheduler::new(store.clone(), lookup, sender.clone());

        let now = t0() + ChronoDuration::hours(2);
        let report = scheduler.run_tick(now).await;
        assert_eq!(report.failed_sends, 1);
        assert_eq!(report.notified, 1);
        assert!(sender.sent_to(2).is_some());

        // user 1 stays due for the next tick
        assert_eq!(store.get(1).await.unwrap().last_notified, Some(t0()));
        assert_eq!(store.get(2).await.unwrap().last_notified, Some(now));
    }

    #[tokio::test]
    async fn users_without_tickers_or_quotes_are_skipped() {
        let store = store().await;
        subscribe(&store, 1, &[], t0()).await;
        subscribe(&store, 2, &["MSFT"], t0()).await;

        let (_, lookup) = lookup(FakeProvider::new().with_outage("MSFT"));
        let sender = Arc::new(RecordingSender::new());
        let scheduler = NotificationScheduler::new(store, lookup, sender.clone());

        let report = scheduler.run_tick(t0() + ChronoDuration::hours(2)).await;
        assert_eq!(report.due, 2);
        assert_eq!(report.skipped_empty, 1);
        assert_eq!(report.skipped_unavailable, 1);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn stopped_scheduler_ignores_ticks() {
        let store = store().await;
        subscribe(&store, 1, &["AAPL"], t0()).await;

        let (provider, lookup) = lookup(FakeProvider::new().with_quote("AAPL", 150.0, 148.0));
        let sender = Arc::new(RecordingSender::new());
        let scheduler = NotificationScheduler::new(store, lookup, sender.clone());

        scheduler.shutdown().await;
        let report = scheduler.run_tick(t0() + ChronoDuration::hours(5)).await;

        assert_eq!(report, TickReport::default());
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn tick_queued_behind_shutdown_does_no_work() {
        let store = store().await;
        subscribe(&store, 1, &["AAPL"], t0()).await;

        let (provider, lookup) = lookup(FakeProvider::new().with_quote("AAPL", 150.0, 148.0));
        let sender = Arc::new(RecordingSender::new());
        let scheduler = Arc::new(NotificationScheduler::new(store, lookup, sender.clone()));

        let running = scheduler.in_flight.lock().await;
        let tick = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run_tick(t0() + ChronoDuration::hours(5)).await }
        });
        tokio::task::yield_now().await;

        scheduler.request_stop();
        drop(running);

        assert_eq!(tick.await.unwrap(), TickReport::default());
        assert_eq!(provider.total_calls(), 0);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn corrupt_interval_does_not_stall_other_users() {
        let backend = Arc::new(MemoryBackend::new());
        let mut corrupt = UserPreference::new(1, &["AAPL".to_string()], t0());
        corrupt.interval_hours = u32::MAX;
        backend.upsert(&corrupt).await.unwrap();

        let store = Arc::new(SubscriptionStore::open(backend, &[]).await.unwrap());
        subscribe(&store, 2, &["AAPL"], t0()).await;

        let (_, lookup) = lookup(FakeProvider::new().with_quote("AAPL", 150.0, 148.0));
        let sender = Arc::new(RecordingSender::new());
        let scheduler = NotificationScheduler::new(store.clone(), lookup, sender.clone());

        let now = t0() + ChronoDuration::hours(3);
        let report = scheduler.run_tick(now).await;

        assert_eq!(report.due, 1);
        assert_eq!(report.notified, 1);
        assert!(sender.sent_to(1).is_none());
        assert!(sender.sent_to(2).is_some());
        assert_eq!(store.get(1).await.unwrap().last_notified, None);
    }

    #[derive(Default)]
    struct GatedSender {
        started: Notify,
        gate: Notify,
        sent: std::sync::Mutex<Vec<UserId>>,
    }

    #[async_trait]
    impl MessageSender for GatedSender {
        async fn send_message(&self, user_id: UserId, _text: &str) -> Result<(), TransportError> {
            self.started.notify_one();
            self.gate.notified().await;
            self.sent.lock().unwrap().push(user_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_lets_current_user_finish() {
        let store = store().await;
        subscribe(&store, 1, &["AAPL"], t0()).await;
        subscribe(&store, 2, &["AAPL"], t0()).await;

        let (_, lookup) = lookup(FakeProvider::new().with_quote("AAPL", 150.0, 148.0));
        let sender = Arc::new(GatedSender::default());
        let scheduler = Arc::new(NotificationScheduler::new(store.clone(), lookup, sender.clone()));

        let now = t0() + ChronoDuration::hours(2);
        let tick = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run_tick(now).await }
        });

        sender.started.notified().await;
        scheduler.request_stop();
        sender.gate.notify_one();

        let report = tick.await.unwrap();
        scheduler.shutdown().await;

        assert!(report.interrupted);
        assert_eq!(report.notified, 1);
        assert_eq!(*sender.sent.lock().unwrap(), vec![1]);
        assert_eq!(store.get(1).await.unwrap().last_notified, Some(now));
        assert_eq!(store.get(2).await.unwrap().last_notified, Some(t0()));
    }
}
