//! Schedule evaluator control loop against the in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use service_orchestrator::events::{Event, MemoryEventBus};
use service_orchestrator::model::{DeviceRouting, KillSwitchMode, RoutingSchedule};
use service_orchestrator::scheduling::{
    KillSwitchCoordinator, KillSwitchError, ManualClock, ScheduleEvaluator, ScheduleInput,
};
use service_orchestrator::store::MemoryStore;

fn routing(id: &str, kill_switch: bool) -> DeviceRouting {
    DeviceRouting {
        id: id.into(),
        router_id: "router-1".into(),
        device_mac: "AA:BB:CC:00:11:22".into(),
        instance_id: "tor-1".into(),
        active: false,
        kill_switch_enabled: kill_switch,
        kill_switch_mode: KillSwitchMode::BlockAll,
        kill_switch_active: false,
    }
}

fn schedule(routing_id: &str, days: Vec<u8>, start: &str, end: &str, tz: &str) -> RoutingSchedule {
    ScheduleInput {
        routing_id: routing_id.into(),
        days,
        start_time: start.into(),
        end_time: end.into(),
        timezone: tz.into(),
        enabled: true,
    }
    .into_schedule()
    .unwrap()
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

#[derive(Default)]
struct RecordingKillSwitch {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl KillSwitchCoordinator for RecordingKillSwitch {
    async fn suspend_routing(&self, routing: &DeviceRouting) -> Result<(), KillSwitchError> {
        self.calls.lock().unwrap().push(format!("suspend:{}", routing.id));
        Ok(())
    }

    async fn resume_routing(&self, routing: &DeviceRouting) -> Result<(), KillSwitchError> {
        self.calls.lock().unwrap().push(format!("resume:{}", routing.id));
        Ok(())
    }
}

#[tokio::test]
async fn test_new_york_business_hours_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    store.put_routing(routing("r1", false));
    let tuesday = schedule("r1", vec![2], "09:00", "17:00", "America/New_York");
    let schedule_id = tuesday.id.clone();
    store.put_schedule(tuesday);

    // Tuesday 2024-01-02 10:00 in New York (UTC-5)
    let clock = Arc::new(ManualClock::new(utc(2024, 1, 2, 15, 0)));
    let bus = Arc::new(MemoryEventBus::new());
    let evaluator = ScheduleEvaluator::builder(store.clone())
        .clock(clock.clone())
        .event_bus(bus.clone())
        .build();

    evaluator.start().await.unwrap();
    assert!(store.routing("r1").unwrap().active);
    assert_eq!(
        store.schedule(&schedule_id).unwrap().last_activated,
        Some(utc(2024, 1, 2, 15, 0))
    );

    // 14:00 New York
    clock.set(utc(2024, 1, 2, 19, 0));
    let summary = evaluator.evaluate().await.unwrap();
    assert_eq!((summary.activated, summary.deactivated), (0, 0));
    assert!(store.routing("r1").unwrap().active);

    // 18:00 New York
    clock.set(utc(2024, 1, 2, 23, 0));
    evaluator.evaluate().await.unwrap();
    assert!(!store.routing("r1").unwrap().active);
    assert_eq!(
        store.schedule(&schedule_id).unwrap().last_deactivated,
        Some(utc(2024, 1, 2, 23, 0))
    );

    evaluator.stop().await.unwrap();
    assert_eq!(evaluator.evaluation_count(), 3);

    let kinds: Vec<_> = bus.events().iter().map(Event::kind).collect();
    assert_eq!(kinds, vec!["schedule.activated", "schedule.deactivated"]);
}

#[tokio::test]
async fn test_overnight_window_spans_midnight() {
    let store = Arc::new(MemoryStore::new());
    store.put_routing(routing("night", false));
    // Friday only, 22:00-06:00 UTC
    store.put_schedule(schedule("night", vec![5], "22:00", "06:00", "UTC"));

    // Saturday 2024-01-06 02:00
    let clock = Arc::new(ManualClock::new(utc(2024, 1, 6, 2, 0)));
    let evaluator = ScheduleEvaluator::builder(store.clone())
        .clock(clock.clone())
        .build();

    evaluator.start().await.unwrap();
    assert!(store.routing("night").unwrap().active);

    clock.set(utc(2024, 1, 6, 7, 0));
    evaluator.evaluate().await.unwrap();
    assert!(!store.routing("night").unwrap().active);

    evaluator.stop().await.unwrap();
}

#[tokio::test]
async fn test_kill_switch_follows_transitions() {
    let store = Arc::new(MemoryStore::new());
    store.put_routing(routing("guarded", true));
    store.put_routing(routing("plain", false));
    store.put_schedule(schedule("guarded", vec![1], "09:00", "17:00", "UTC"));
    store.put_schedule(schedule("plain", vec![1], "09:00", "17:00", "UTC"));

    // Monday 2024-01-01 12:00
    let clock = Arc::new(ManualClock::new(utc(2024, 1, 1, 12, 0)));
    let kill_switch = Arc::new(RecordingKillSwitch::default());
    let evaluator = ScheduleEvaluator::builder(store.clone())
        .clock(clock.clone())
        .kill_switch(kill_switch.clone())
        .build();

    evaluator.start().await.unwrap();
    clock.set(utc(2024, 1, 1, 18, 0));
    evaluator.evaluate().await.unwrap();
    evaluator.stop().await.unwrap();

    assert_eq!(
        *kill_switch.calls.lock().unwrap(),
        vec!["resume:guarded".to_string(), "suspend:guarded".to_string()]
    );
    assert!(store.routing("guarded").unwrap().kill_switch_active);
    assert!(!store.routing("plain").unwrap().kill_switch_active);
}

#[tokio::test]
async fn test_disabled_schedule_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    store.put_routing(routing("r1", false));
    let mut off = schedule("r1", vec![0, 1, 2, 3, 4, 5, 6], "00:00", "00:00", "UTC");
    off.enabled = false;
    store.put_schedule(off);

    let evaluator = ScheduleEvaluator::builder(store.clone())
        .clock(Arc::new(ManualClock::new(utc(2024, 1, 1, 12, 0))))
        .build();
    evaluator.start().await.unwrap();
    let summary = evaluator.evaluate().await.unwrap();
    evaluator.stop().await.unwrap();

    assert_eq!(summary.routings, 0);
    assert!(!store.routing("r1").unwrap().active);
}
