//! # Scheduler
//!
//! Drives the periodic tasks from a single `tokio::select!` loop that owns
//! the [`EngineState`].
//!
//! | Task | Default period | Kind |
//! |------|----------------|------|
//! | Own boat ingest | 300 s | spawned round trip |
//! | Own boat publish | 1 s | synchronous |
//! | Fleet ingest | 300 s | spawned round trip |
//! | Fleet publish | 15 s | synchronous |
//! | Waypoint submit | 10 s | spawned round trip |
//!
//! Round trips run in their own task and report back over a channel, so a
//! slow fetch never delays publishing. Only one round trip of each kind may
//! be in flight; a tick that fires while the previous one is still running
//! is skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::ingest::{fetch_fleet, fetch_own_boat, submit_waypoint};
use super::state::EngineState;
use crate::config::{FleetConfig, ScheduleConfig};
use crate::error::{Result, VlmBridgeError};
use crate::fleet::FleetSighting;
use crate::nav::geo::Position;
use crate::telemetry::delta::{own_boat_name, Delta, WaypointNotification};
use crate::telemetry::sink::TelemetrySink;
use crate::telemetry::types::OwnBoatFix;
use crate::vlm::protocol::TargetAck;
use crate::vlm::RaceService;

/// Capacity of the round trip result channel
const OUTCOME_CHANNEL_CAPACITY: usize = 16;

/// Task periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub boat_ingest: Duration,
    pub publish: Duration,
    pub fleet_ingest: Duration,
    pub fleet_publish: Duration,
    pub waypoint: Duration,
    pub fleet_enabled: bool,
    pub waypoint_enabled: bool,
}

impl Schedule {
    pub fn from_config(schedule: &ScheduleConfig, fleet: &FleetConfig, set_waypoint: bool) -> Self {
        Self {
            boat_ingest: Duration::from_secs(schedule.boat_ingest_interval_s),
            publish: Duration::from_millis(schedule.publish_interval_ms),
            fleet_ingest: Duration::from_secs(schedule.fleet_ingest_interval_s),
            fleet_publish: Duration::from_secs(schedule.fleet_publish_interval_s),
            waypoint: Duration::from_secs(schedule.waypoint_interval_s),
            fleet_enabled: fleet.enabled,
            waypoint_enabled: set_waypoint,
        }
    }
}

/// Result of a round trip, reported back to the loop
#[derive(Debug)]
enum Outcome {
    OwnBoat(Result<OwnBoatFix>),
    Fleet(Result<(Vec<FleetSighting>, DateTime<Utc>)>),
    Waypoint(Position, Result<TargetAck>),
}

/// Run-already-in-progress guard for one round trip kind
#[derive(Debug, Default)]
struct InFlight {
    name: &'static str,
    busy: bool,
    skipped: u64,
}

impl InFlight {
    fn new(name: &'static str) -> Self {
        Self { name, ..Self::default() }
    }

    /// Claim the guard; false if a round trip of this kind is still running.
    fn try_start(&mut self) -> bool {
        if self.busy {
            self.skipped += 1;
            debug!("{} still in flight, skipping tick ({} skipped)", self.name, self.skipped);
            return false;
        }
        self.busy = true;
        true
    }

    fn finish(&mut self) {
        self.busy = false;
    }
}

/// Counters reported at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub own_deltas: u64,
    pub fleet_deltas: u64,
    pub ingest_failures: u64,
    pub skipped_ticks: u64,
}

/// Periodic task driver
pub struct Scheduler {
    state: EngineState,
    service: Arc<dyn RaceService>,
    sinks: Vec<Box<dyn TelemetrySink>>,
    schedule: Schedule,
    outcome_tx: mpsc::Sender<Outcome>,
    outcome_rx: mpsc::Receiver<Outcome>,
    waypoint_rx: Option<mpsc::Receiver<WaypointNotification>>,
    boat_guard: InFlight,
    fleet_guard: InFlight,
    waypoint_guard: InFlight,
    stats: RunStats,
}

impl Scheduler {
    /// Create a scheduler publishing to `sinks`
    pub fn new(service: Arc<dyn RaceService>, sinks: Vec<Box<dyn TelemetrySink>>, schedule: Schedule) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            state: EngineState::new(),
            service,
            sinks,
            schedule,
            outcome_tx,
            outcome_rx,
            waypoint_rx: None,
            boat_guard: InFlight::new("Boat ingest"),
            fleet_guard: InFlight::new("Fleet ingest"),
            waypoint_guard: InFlight::new("Waypoint submit"),
            stats: RunStats::default(),
        }
    }

    /// Feed waypoint change notifications from the bus
    pub fn with_waypoint_notifications(mut self, rx: mpsc::Receiver<WaypointNotification>) -> Self {
        self.waypoint_rx = Some(rx);
        self
    }

    /// Run until `shutdown` completes, then return the final state.
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) -> (EngineState, RunStats) {
        tokio::pin!(shutdown);

        let mut boat_tick = interval(self.schedule.boat_ingest);
        let mut publish_tick = interval(self.schedule.publish);
        let mut fleet_tick = interval(self.schedule.fleet_ingest);
        let mut fleet_publish_tick = interval(self.schedule.fleet_publish);
        let mut waypoint_tick = interval(self.schedule.waypoint);
        for tick in [&mut boat_tick, &mut publish_tick, &mut fleet_tick, &mut fleet_publish_tick, &mut waypoint_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        let fleet_enabled = self.schedule.fleet_enabled;
        let waypoint_enabled = self.schedule.waypoint_enabled;
        let mut waypoints_open = self.waypoint_rx.is_some();

        info!(
            "Scheduler started: ingest every {:?}, publish every {:?}, fleet {}",
            self.schedule.boat_ingest,
            self.schedule.publish,
            if fleet_enabled { "on" } else { "off" }
        );

        loop {
            tokio::select! {
                _ = boat_tick.tick() => self.start_boat_ingest(),

                _ = publish_tick.tick() => self.publish_own_boat(),

                _ = fleet_tick.tick(), if fleet_enabled => self.start_fleet_ingest(),

                _ = fleet_publish_tick.tick(), if fleet_enabled => self.publish_fleet(),

                _ = waypoint_tick.tick(), if waypoint_enabled => self.start_waypoint_submit(),

                Some(outcome) = self.outcome_rx.recv() => self.commit(outcome),

                note = recv_waypoint(&mut self.waypoint_rx), if waypoints_open => match note {
                    Some(note) => self.state.note_waypoint(note),
                    None => {
                        debug!("Waypoint notification stream closed");
                        waypoints_open = false;
                    }
                },

                _ = &mut shutdown => {
                    info!("Scheduler stopping");
                    break;
                }
            }
        }

        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                warn!("Failed to flush sink: {}", e);
            }
        }

        self.stats.skipped_ticks = self.boat_guard.skipped + self.fleet_guard.skipped + self.waypoint_guard.skipped;
        info!(
            "Published {} own boat and {} fleet deltas, {} ingest failures, {} skipped ticks",
            self.stats.own_deltas, self.stats.fleet_deltas, self.stats.ingest_failures, self.stats.skipped_ticks
        );
        (self.state, self.stats)
    }

    fn start_boat_ingest(&mut self) {
        if !self.boat_guard.try_start() {
            return;
        }
        let service = Arc::clone(&self.service);
        self.spawn_round_trip(async move { fetch_own_boat(service.as_ref()).await }, Outcome::OwnBoat);
    }

    fn start_fleet_ingest(&mut self) {
        let Some(fix) = self.state.fix() else {
            debug!("No fix yet, fleet ingest waits");
            return;
        };
        let Some(race_id) = fix.race_id.clone() else {
            debug!("Boat is not racing, no fleet to track");
            return;
        };
        let own_boat_id = fix.boat_id.clone();

        if !self.fleet_guard.try_start() {
            return;
        }
        let service = Arc::clone(&self.service);
        self.spawn_round_trip(
            async move { fetch_fleet(service.as_ref(), &race_id, &own_boat_id).await },
            Outcome::Fleet,
        );
    }

    fn start_waypoint_submit(&mut self) {
        if !self.waypoint_guard.try_start() {
            return;
        }
        let Some(target) = self.state.next_waypoint_request() else {
            self.waypoint_guard.finish();
            return;
        };
        info!("Submitting waypoint {:.7},{:.7}", target.latitude, target.longitude);

        let service = Arc::clone(&self.service);
        self.spawn_round_trip(
            async move { submit_waypoint(service.as_ref(), target).await },
            move |result| Outcome::Waypoint(target, result),
        );
    }

    /// Run a round trip in its own task and report its outcome.
    ///
    /// The round trip is joined from a second task, so a panic still comes
    /// back as an error and releases the in-flight guard.
    fn spawn_round_trip<T, F, W>(&self, round_trip: F, wrap: W)
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
        W: FnOnce(Result<T>) -> Outcome + Send + 'static,
    {
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::spawn(round_trip).await {
                Ok(result) => result,
                Err(e) => Err(VlmBridgeError::from(e)),
            };
            // the loop is gone only at shutdown
            let _ = tx.send(wrap(result)).await;
        });
    }

    fn commit(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::OwnBoat(result) => {
                self.boat_guard.finish();
                match result {
                    Ok(fix) => {
                        let name = own_boat_name(&fix, Utc::now());
                        self.state.commit_fix(fix);
                        self.emit(&name);
                    }
                    Err(e) => self.ingest_failed("boat info", e),
                }
            }
            Outcome::Fleet(result) => {
                self.fleet_guard.finish();
                match result {
                    Ok((sightings, seen_at)) => {
                        self.state.commit_fleet(&sightings, seen_at);
                    }
                    Err(e) => self.ingest_failed("ranking", e),
                }
            }
            Outcome::Waypoint(target, result) => {
                self.waypoint_guard.finish();
                self.state.waypoint_submitted(target, result);
            }
        }
    }

    fn ingest_failed(&mut self, what: &str, e: VlmBridgeError) {
        self.stats.ingest_failures += 1;
        if e.is_retryable() {
            warn!("Failed to get {} from VLM, keeping previous data: {}", what, e);
        } else {
            error!("Failed to get {} from VLM: {}", what, e);
        }
    }

    fn publish_own_boat(&mut self) {
        match self.state.own_boat_delta(Utc::now()) {
            Some(delta) => {
                self.emit(&delta);
                self.stats.own_deltas += 1;
            }
            None => debug!("No fix yet, nothing to publish"),
        }
    }

    fn publish_fleet(&mut self) {
        let deltas = self.state.fleet_deltas(Utc::now());
        for delta in &deltas {
            self.emit(delta);
        }
        self.stats.fleet_deltas += deltas.len() as u64;
    }

    fn emit(&mut self, delta: &Delta) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.publish(delta) {
                warn!("Failed to publish delta: {}", e);
            }
        }
    }
}

/// Next notification, or never when there is no notification stream
async fn recv_waypoint(rx: &mut Option<mpsc::Receiver<WaypointNotification>>) -> Option<WaypointNotification> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::sink::mocks::MemorySink;
    use crate::vlm::protocol::{parse_body, BoatInfo, RankingResponse};
    use crate::vlm::service::MockRaceService;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BOAT_INFO: &[u8] = br#"{"LAT":45000,"LON":-5000,"BSP":6,"HDG":180,"TWD":270,"TWS":14,"LOC":12,
        "PIM":3,"PIP":"44.5,-6.0@-1","IDB":"Pen Duick","IDU":"4242","RAC":"77"}"#;

    const RANKING: &[u8] = br#"{"success":true,"ranking":{
        "1":{"idusers":"101","boatname":"Joshua","latitude":45.1,"longitude":-5.1,"country":"FR","loch":13},
        "2":{"idusers":"4242","boatname":"Pen Duick","latitude":45,"longitude":-5,"country":"FR","loch":12}}}"#;

    fn schedule() -> Schedule {
        Schedule {
            boat_ingest: Duration::from_secs(300),
            publish: Duration::from_secs(1),
            fleet_ingest: Duration::from_secs(300),
            fleet_publish: Duration::from_secs(15),
            waypoint: Duration::from_secs(10),
            fleet_enabled: true,
            waypoint_enabled: false,
        }
    }

    fn happy_service() -> MockRaceService {
        let mut mock = MockRaceService::new();
        mock.expect_boat_info().returning(|| parse_body::<BoatInfo>("boat info", BOAT_INFO));
        mock.expect_ranking().returning(|_| parse_body::<RankingResponse>("ranking", RANKING));
        mock
    }

    /// Service whose boat info never answers within the test
    struct StalledService {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RaceService for StalledService {
        async fn boat_info(&self) -> Result<BoatInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(100_000)).await;
            parse_body("boat info", BOAT_INFO)
        }

        async fn ranking(&self, _race_id: &str) -> Result<RankingResponse> {
            parse_body("ranking", RANKING)
        }

        async fn set_target(&self, _target: Position) -> Result<TargetAck> {
            Ok(TargetAck { success: true, raw: String::new() })
        }
    }

    /// Service whose first boat info call panics
    struct PanickingService {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RaceService for PanickingService {
        async fn boat_info(&self) -> Result<BoatInfo> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("boat info decoder blew up");
            }
            parse_body("boat info", BOAT_INFO)
        }

        async fn ranking(&self, _race_id: &str) -> Result<RankingResponse> {
            parse_body("ranking", RANKING)
        }

        async fn set_target(&self, _target: Position) -> Result<TargetAck> {
            Ok(TargetAck { success: true, raw: String::new() })
        }
    }

    #[test]
    fn test_in_flight_guard() {
        let mut guard = InFlight::new("Test");
        assert!(guard.try_start());
        assert!(!guard.try_start());
        assert!(!guard.try_start());
        assert_eq!(guard.skipped, 2);
        guard.finish();
        assert!(guard.try_start());
    }

    #[test]
    fn test_schedule_from_config() {
        let s = Schedule::from_config(&ScheduleConfig::default(), &FleetConfig::default(), true);
        assert_eq!(s.boat_ingest, Duration::from_secs(300));
        assert_eq!(s.publish, Duration::from_millis(1000));
        assert_eq!(s.fleet_publish, Duration::from_secs(15));
        assert!(s.fleet_enabled);
        assert!(s.waypoint_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_every_second_after_first_fix() {
        let sink = MemorySink::new();
        let scheduler = Scheduler::new(Arc::new(happy_service()), vec![Box::new(sink.clone())], schedule());

        let (state, stats) = scheduler.run(tokio::time::sleep(Duration::from_millis(10_500))).await;

        assert!(state.fix().is_some());
        assert!(stats.own_deltas >= 10, "published {}", stats.own_deltas);
        assert_eq!(stats.ingest_failures, 0);

        let deltas = sink.deltas();
        assert!(deltas.iter().any(|d| d.updates[0].values[0].path == "name"));
        assert!(deltas
            .iter()
            .any(|d| d.updates[0].values.iter().any(|v| v.path == "steering.autopilot.state")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fleet_tracked_once_race_is_known() {
        let sink = MemorySink::new();
        let scheduler = Scheduler::new(Arc::new(happy_service()), vec![Box::new(sink.clone())], schedule());

        // first fleet tick fires before the first fix lands, the next one at 300s
        let (state, stats) = scheduler.run(tokio::time::sleep(Duration::from_secs(320))).await;

        assert_eq!(state.fleet().len(), 1);
        assert!(state.fleet().get("101").is_some());
        assert!(stats.fleet_deltas >= 1);
        assert!(sink
            .deltas()
            .iter()
            .any(|d| d.context.as_deref() == Some("vessels.urn:mrn:imo:mmsi:999999898")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ingest_keeps_running() {
        let mut mock = MockRaceService::new();
        mock.expect_boat_info().returning(|| {
            Err(VlmBridgeError::Transport { status: 503, reason: "Service Unavailable".to_string() })
        });
        let sink = MemorySink::new();
        let scheduler = Scheduler::new(Arc::new(mock), vec![Box::new(sink.clone())], schedule());

        let (state, stats) = scheduler.run(tokio::time::sleep(Duration::from_secs(610))).await;

        assert!(state.fix().is_none());
        assert_eq!(stats.ingest_failures, 3);
        assert!(sink.deltas().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_ingest_releases_guard() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = PanickingService { calls: Arc::clone(&calls) };
        let scheduler = Scheduler::new(Arc::new(service), vec![], schedule());

        let (state, stats) = scheduler.run(tokio::time::sleep(Duration::from_secs(310))).await;

        // the tick at 300 s runs again after the panic at 0 s
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.ingest_failures, 1);
        assert_eq!(stats.skipped_ticks, 0);
        assert!(state.fix().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_ingest_is_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = StalledService { calls: Arc::clone(&calls) };
        let scheduler = Scheduler::new(Arc::new(service), vec![], schedule());

        let (_, stats) = scheduler.run(tokio::time::sleep(Duration::from_secs(1000))).await;

        // ticks at 0, 300, 600 and 900 s; only the first reaches the service
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.skipped_ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waypoint_notification_is_submitted_once() {
        let mut mock = happy_service();
        mock.expect_set_target()
            .withf(|target| *target == Position::new(44.75, -6.25))
            .times(1)
            .returning(|_| Ok(TargetAck { success: true, raw: "{\"success\":true}".to_string() }));

        let (tx, rx) = mpsc::channel(4);
        let mut schedule = schedule();
        schedule.waypoint_enabled = true;
        let scheduler = Scheduler::new(Arc::new(mock), vec![], schedule).with_waypoint_notifications(rx);

        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let note = WaypointNotification { position: Position::new(44.75, -6.25) };
            tx.send(note).await.unwrap();
            tokio::time::sleep(Duration::from_secs(20)).await;
            tx.send(note).await.unwrap();
        });

        let (state, _) = scheduler.run(tokio::time::sleep(Duration::from_secs(60))).await;
        feeder.await.unwrap();

        assert_eq!(state.fix().unwrap().waypoint, Some(Position::new(44.75, -6.25)));
        assert!(state.pending_waypoint().is_none());
    }
}
