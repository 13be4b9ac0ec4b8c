//! Periodic schedule evaluation loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventBus, Publisher};
use crate::model::{DeviceRouting, RoutingSchedule};
use crate::observability::metrics;
use crate::scheduling::clock::{resolve_now, RouterClockProvider};
use crate::scheduling::killswitch::KillSwitchCoordinator;
use crate::scheduling::window::is_window_active;
use crate::scheduling::ScheduleError;
use crate::store::{RoutingStore, StoreError};

pub const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Counts from one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub routings: usize,
    pub activated: usize,
    pub deactivated: usize,
    pub skipped: usize,
    /// Routings left active by this pass.
    pub active: usize,
}

enum Transition {
    Activated,
    Deactivated,
    Unchanged,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared {
    store: Arc<dyn RoutingStore>,
    clock: Option<Arc<dyn RouterClockProvider>>,
    kill_switch: Option<Arc<dyn KillSwitchCoordinator>>,
    publisher: Publisher,
    max_clock_skew: Duration,
    running: AtomicBool,
    /// Serializes ticks from the loop and `evaluate`.
    tick_lock: Mutex<()>,
    evaluation_count: AtomicU64,
    last_evaluation: StdMutex<Option<DateTime<Utc>>>,
}

/// Configures a [`ScheduleEvaluator`]; only the store is mandatory.
pub struct ScheduleEvaluatorBuilder {
    store: Arc<dyn RoutingStore>,
    event_bus: Option<Arc<dyn EventBus>>,
    clock: Option<Arc<dyn RouterClockProvider>>,
    kill_switch: Option<Arc<dyn KillSwitchCoordinator>>,
    interval: Duration,
    max_clock_skew: Duration,
}

impl ScheduleEvaluatorBuilder {
    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Router time source; the system clock is used without one.
    pub fn clock(mut self, clock: Arc<dyn RouterClockProvider>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn kill_switch(mut self, coordinator: Arc<dyn KillSwitchCoordinator>) -> Self {
        self.kill_switch = Some(coordinator);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn max_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    pub fn build(self) -> ScheduleEvaluator {
        ScheduleEvaluator {
            shared: Arc::new(Shared {
                store: self.store,
                clock: self.clock,
                kill_switch: self.kill_switch,
                publisher: Publisher::new(self.event_bus, "schedule-evaluator"),
                max_clock_skew: self.max_clock_skew,
                running: AtomicBool::new(false),
                tick_lock: Mutex::new(()),
                evaluation_count: AtomicU64::new(0),
                last_evaluation: StdMutex::new(None),
            }),
            interval: self.interval,
            control: Mutex::new(None),
        }
    }
}

/// Keeps every routing's `active` flag in line with its schedules.
pub struct ScheduleEvaluator {
    shared: Arc<Shared>,
    interval: Duration,
    control: Mutex<Option<Running>>,
}

impl ScheduleEvaluator {
    pub fn builder(store: Arc<dyn RoutingStore>) -> ScheduleEvaluatorBuilder {
        ScheduleEvaluatorBuilder {
            store,
            event_bus: None,
            clock: None,
            kill_switch: None,
            interval: DEFAULT_EVALUATION_INTERVAL,
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
        }
    }

    /// Run one tick immediately, then keep ticking every interval.
    pub async fn start(&self) -> Result<(), ScheduleError> {
        let mut control = self.control.lock().await;
        if control.is_some() {
            return Err(ScheduleError::AlreadyRunning);
        }

        self.shared.running.store(true, Ordering::SeqCst);
        if let Err(e) = self.shared.tick().await {
            tracing::error!(error = %e, "Initial schedule evaluation failed");
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            self.interval,
            cancel.clone(),
        ));
        *control = Some(Running { cancel, handle });

        tracing::info!(interval_secs = self.interval.as_secs(), "Schedule evaluator started");
        Ok(())
    }

    /// Stop the loop. Returns once no tick is in flight.
    pub async fn stop(&self) -> Result<(), ScheduleError> {
        let running = self
            .control
            .lock()
            .await
            .take()
            .ok_or(ScheduleError::NotRunning)?;

        self.shared.running.store(false, Ordering::SeqCst);
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "Schedule evaluator task ended abnormally");
        }
        // Wait out an on-demand tick that raced with stop.
        drop(self.shared.tick_lock.lock().await);

        tracing::info!("Schedule evaluator stopped");
        Ok(())
    }

    /// Evaluate now, outside the regular interval.
    pub async fn evaluate(&self) -> Result<TickSummary, ScheduleError> {
        if !self.is_running() {
            return Err(ScheduleError::NotRunning);
        }
        Ok(self.shared.tick().await?)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn evaluation_count(&self) -> u64 {
        self.shared.evaluation_count.load(Ordering::SeqCst)
    }

    /// Latest router time seen by the last completed tick, or the system
    /// time when that tick evaluated no routing.
    pub fn last_evaluation(&self) -> Option<DateTime<Utc>> {
        *self
            .shared
            .last_evaluation
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}

async fn run_loop(shared: Arc<Shared>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = shared.tick().await {
                    tracing::error!(error = %e, "Schedule evaluation failed");
                }
            }
        }
    }
}

impl Shared {
    async fn tick(&self) -> Result<TickSummary, StoreError> {
        let _guard = self.tick_lock.lock().await;
        if !self.running.load(Ordering::SeqCst) {
            return Ok(TickSummary::default());
        }

        let schedules = self.store.list_enabled_schedules().await?;

        let mut by_routing: BTreeMap<String, Vec<RoutingSchedule>> = BTreeMap::new();
        for schedule in schedules {
            by_routing
                .entry(schedule.routing_id.clone())
                .or_default()
                .push(schedule);
        }

        let mut summary = TickSummary {
            routings: by_routing.len(),
            ..TickSummary::default()
        };

        let mut latest: Option<DateTime<Utc>> = None;
        for (routing_id, schedules) in &by_routing {
            match self.evaluate_routing(routing_id, schedules).await {
                Ok((transition, at, active)) => {
                    latest = latest.max(Some(at));
                    summary.active += usize::from(active);
                    match transition {
                        Transition::Activated => summary.activated += 1,
                        Transition::Deactivated => summary.deactivated += 1,
                        Transition::Unchanged => {}
                    }
                }
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!(
                        routing_id = %routing_id,
                        error = %e,
                        "Skipping routing for this evaluation"
                    );
                }
            }
        }

        let now = latest.unwrap_or_else(Utc::now);
        self.evaluation_count.fetch_add(1, Ordering::SeqCst);
        *self
            .last_evaluation
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(now);
        metrics::record_schedule_evaluation();
        metrics::set_active_routings(summary.active);

        tracing::debug!(
            %now,
            routings = summary.routings,
            activated = summary.activated,
            deactivated = summary.deactivated,
            skipped = summary.skipped,
            active = summary.active,
            "Schedule evaluation complete"
        );
        Ok(summary)
    }

    async fn evaluate_routing(
        &self,
        routing_id: &str,
        schedules: &[RoutingSchedule],
    ) -> Result<(Transition, DateTime<Utc>, bool), StoreError> {
        let routing = self.store.get_routing(routing_id).await?;
        let now =
            resolve_now(self.clock.as_deref(), &routing.router_id, self.max_clock_skew).await;
        let open = schedules.iter().find(|s| is_window_active(now, s));

        let transition = match (open, routing.active) {
            (Some(schedule), false) => {
                self.activate(&routing, schedule, now).await?;
                Transition::Activated
            }
            (None, true) => {
                self.deactivate(&routing, schedules, now).await?;
                Transition::Deactivated
            }
            _ => {
                tracing::debug!(routing_id, active = routing.active, "Routing already in desired state");
                Transition::Unchanged
            }
        };

        Ok((transition, now, open.is_some()))
    }

    async fn activate(
        &self,
        routing: &DeviceRouting,
        schedule: &RoutingSchedule,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.set_routing_active(&routing.id, true).await?;
        if let Err(e) = self.store.mark_schedule_activated(&schedule.id, now).await {
            tracing::warn!(schedule_id = %schedule.id, error = %e, "Failed to stamp schedule activation");
        }

        tracing::info!(
            routing_id = %routing.id,
            schedule_id = %schedule.id,
            device_mac = %routing.device_mac,
            "Routing activated by schedule"
        );
        metrics::record_schedule_transition(true);
        self.publisher
            .publish(Event::ScheduleActivated {
                schedule_id: schedule.id.clone(),
                routing_id: routing.id.clone(),
                device_mac: routing.device_mac.clone(),
                instance_id: routing.instance_id.clone(),
            })
            .await;

        if routing.kill_switch_enabled {
            if let Some(coordinator) = &self.kill_switch {
                match coordinator.resume_routing(routing).await {
                    Ok(()) => self.set_kill_switch(routing, false).await,
                    Err(e) => {
                        tracing::error!(routing_id = %routing.id, error = %e, "Failed to resume routing")
                    }
                }
            }
        }
        Ok(())
    }

    async fn deactivate(
        &self,
        routing: &DeviceRouting,
        schedules: &[RoutingSchedule],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.set_routing_active(&routing.id, false).await?;
        for schedule in schedules {
            if let Err(e) = self.store.mark_schedule_deactivated(&schedule.id, now).await {
                tracing::warn!(schedule_id = %schedule.id, error = %e, "Failed to stamp schedule deactivation");
            }
        }

        tracing::info!(
            routing_id = %routing.id,
            device_mac = %routing.device_mac,
            "Routing deactivated by schedule"
        );
        metrics::record_schedule_transition(false);
        self.publisher
            .publish(Event::ScheduleDeactivated {
                schedule_ids: schedules.iter().map(|s| s.id.clone()).collect(),
                routing_id: routing.id.clone(),
                device_mac: routing.device_mac.clone(),
                instance_id: routing.instance_id.clone(),
            })
            .await;

        if routing.kill_switch_enabled {
            if let Some(coordinator) = &self.kill_switch {
                match coordinator.suspend_routing(routing).await {
                    Ok(()) => self.set_kill_switch(routing, true).await,
                    Err(e) => {
                        tracing::error!(routing_id = %routing.id, error = %e, "Failed to suspend routing")
                    }
                }
            }
        }
        Ok(())
    }

    async fn set_kill_switch(&self, routing: &DeviceRouting, active: bool) {
        if let Err(e) = self.store.set_kill_switch_active(&routing.id, active).await {
            tracing::warn!(routing_id = %routing.id, error = %e, "Failed to record kill switch state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::clock::{ClockError, ManualClock};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn routing(id: &str) -> DeviceRouting {
        DeviceRouting {
            id: id.into(),
            router_id: "router-1".into(),
            device_mac: "AA:BB:CC:DD:EE:FF".into(),
            instance_id: "tor-1".into(),
            active: false,
            kill_switch_enabled: false,
            kill_switch_mode: Default::default(),
            kill_switch_active: false,
        }
    }

    fn schedule(id: &str, routing_id: &str, start: &str, end: &str) -> RoutingSchedule {
        RoutingSchedule {
            id: id.into(),
            routing_id: routing_id.into(),
            days: vec![1],
            start_time: start.into(),
            end_time: end.into(),
            timezone: "UTC".into(),
            enabled: true,
            last_activated: None,
            last_deactivated: None,
        }
    }

    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_start_stop_guards() {
        let evaluator = ScheduleEvaluator::builder(Arc::new(MemoryStore::new())).build();

        assert!(matches!(evaluator.evaluate().await, Err(ScheduleError::NotRunning)));
        assert!(matches!(evaluator.stop().await, Err(ScheduleError::NotRunning)));

        evaluator.start().await.unwrap();
        assert_eq!(evaluator.evaluation_count(), 1);
        assert!(matches!(evaluator.start().await, Err(ScheduleError::AlreadyRunning)));

        evaluator.stop().await.unwrap();
        assert!(!evaluator.is_running());
        assert!(matches!(evaluator.evaluate().await, Err(ScheduleError::NotRunning)));
    }

    #[tokio::test]
    async fn test_sibling_schedules_or_together() {
        let store = Arc::new(MemoryStore::new());
        store.put_routing(routing("r1"));
        store.put_schedule(schedule("morning", "r1", "06:00", "09:00"));
        store.put_schedule(schedule("evening", "r1", "18:00", "22:00"));

        let clock = Arc::new(ManualClock::new(monday(7, 0)));
        let evaluator = ScheduleEvaluator::builder(store.clone())
            .clock(clock.clone())
            .build();
        evaluator.start().await.unwrap();
        assert!(store.routing("r1").unwrap().active);
        assert!(store.schedule("morning").unwrap().last_activated.is_some());

        clock.set(monday(12, 0));
        let summary = evaluator.evaluate().await.unwrap();
        assert_eq!(summary.deactivated, 1);
        assert!(!store.routing("r1").unwrap().active);
        assert!(store.schedule("evening").unwrap().last_deactivated.is_some());

        clock.set(monday(19, 0));
        evaluator.evaluate().await.unwrap();
        assert!(store.routing("r1").unwrap().active);

        // Already active: no-op
        let summary = evaluator.evaluate().await.unwrap();
        assert_eq!(
            summary,
            TickSummary {
                routings: 1,
                active: 1,
                ..TickSummary::default()
            }
        );

        evaluator.stop().await.unwrap();
        assert_eq!(evaluator.last_evaluation(), Some(monday(19, 0)));
    }

    struct FleetClock {
        routers: std::collections::HashMap<&'static str, DateTime<Utc>>,
    }

    #[async_trait::async_trait]
    impl RouterClockProvider for FleetClock {
        async fn now(&self, router_id: &str) -> Result<DateTime<Utc>, ClockError> {
            self.routers
                .get(router_id)
                .copied()
                .ok_or_else(|| ClockError(format!("unknown router {router_id}")))
        }
    }

    #[tokio::test]
    async fn test_each_routing_uses_its_router_clock() {
        let store = Arc::new(MemoryStore::new());
        store.put_routing(routing("r1"));
        store.put_routing(DeviceRouting {
            router_id: "router-2".into(),
            ..routing("r2")
        });
        store.put_schedule(schedule("s1", "r1", "06:00", "09:00"));
        store.put_schedule(schedule("s2", "r2", "06:00", "09:00"));

        let clock = FleetClock {
            routers: [("router-1", monday(7, 0)), ("router-2", monday(12, 0))]
                .into_iter()
                .collect(),
        };
        let evaluator = ScheduleEvaluator::builder(store.clone())
            .clock(Arc::new(clock))
            .build();
        evaluator.start().await.unwrap();

        assert!(store.routing("r1").unwrap().active);
        assert!(!store.routing("r2").unwrap().active);
        assert_eq!(evaluator.last_evaluation(), Some(monday(12, 0)));

        let summary = evaluator.evaluate().await.unwrap();
        assert_eq!(summary.routings, 2);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.activated, 0);
        evaluator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_routing_is_skipped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.put_routing(routing("r1"));
        store.put_schedule(schedule("s1", "r1", "00:00", "23:59"));
        store.put_schedule(schedule("orphan", "ghost", "00:00", "23:59"));

        let evaluator = ScheduleEvaluator::builder(store.clone())
            .clock(Arc::new(ManualClock::new(monday(12, 0))))
            .build();
        evaluator.start().await.unwrap();

        let summary = evaluator.evaluate().await.unwrap();
        assert_eq!(summary.routings, 2);
        assert_eq!(summary.skipped, 1);
        assert!(store.routing("r1").unwrap().active);
        evaluator.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_on_interval() {
        let evaluator = ScheduleEvaluator::builder(Arc::new(MemoryStore::new()))
            .interval(Duration::from_secs(60))
            .build();
        evaluator.start().await.unwrap();
        assert_eq!(evaluator.evaluation_count(), 1);

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(evaluator.evaluation_count(), 3);

        evaluator.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(evaluator.evaluation_count(), 3);
    }
}
