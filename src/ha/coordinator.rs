//! HA Coordinator
//!
//! Drives one management node through its lifecycle:
//! - publishes this node's heartbeat record every cycle
//! - keeps a healthy recorded master, otherwise runs the chooser
//! - promotes itself when chosen, demotes itself when another healthy
//!   master is recorded while it also believes it is master
//!
//! The whole publish-merge-reconcile cycle runs under one mutex, so a
//! scheduled tick and a synchronous caller never interleave. Status reads
//! (`get_node_state`, `get_management_plane_sync_state`) never take that
//! mutex.
//!
//! Across nodes nothing is locked: agreement comes only from the shared
//! store and the deterministic chooser.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use super::chooser::{infer_failed_nodes, is_fresh, is_heartbeat_ok, AlphabeticMasterChooser, MasterChooser};
use super::clock::{Clock, SystemClock};
use super::config::HaConfig;
use super::delta::{Delta, MasterChange};
use super::errors::{HaError, HaErrorKind, HaResult};
use super::listener::PromotionListener;
use super::poller::PollTask;
use super::record::{ManagementNodeSyncRecord, ManagementPlaneSyncRecord};
use super::state::{HighAvailabilityMode, ManagementNodeState};
use crate::observability::{HaEvent, HaMetrics, Logger};
use crate::persist::{PersistenceError, SyncRecordPersister};
use crate::rebind::{RebindEngine, RebindHandle, RebindMode};

/// Snapshot loads attempted per cycle before giving up
const MAX_LOAD_ATTEMPTS: usize = 5;

/// How long `stop` waits for the final record to land
const STOP_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Injected dependencies, replaceable until `start`
#[derive(Clone)]
struct Collaborators {
    config: HaConfig,
    persister: Option<Arc<dyn SyncRecordPersister>>,
    clock: Arc<dyn Clock>,
    chooser: Arc<dyn MasterChooser>,
    listener: Option<Arc<dyn PromotionListener>>,
    rebind_engine: Option<Arc<dyn RebindEngine>>,
    uri: Option<String>,
}

/// What status readers see without taking the cycle lock
#[derive(Debug, Clone)]
struct StatusView {
    node_state: ManagementNodeState,
    transition_complete: bool,
    priority: Option<i64>,
    disabled: bool,
}

/// Guarded by the cycle lock
#[derive(Default)]
struct CycleState {
    started: bool,
    /// Standby status a demoted master returns to
    standby_target: Option<ManagementNodeState>,
    rebind_handle: Option<RebindHandle>,
}

struct CoordinatorInner {
    node_id: String,
    collaborators: RwLock<Collaborators>,
    cycle: Mutex<CycleState>,
    status: RwLock<StatusView>,
    cached: RwLock<Option<Arc<ManagementPlaneSyncRecord>>>,
    running: AtomicBool,
    poll_task: Mutex<Option<PollTask>>,
    metrics: HaMetrics,
}

/// High-availability coordinator for one management node
#[derive(Clone)]
pub struct HaCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for HaCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaCoordinator")
            .field("node_id", &self.inner.node_id)
            .field("node_state", &self.get_node_state())
            .field("running", &self.is_running())
            .finish()
    }
}

impl HaCoordinator {
    /// Create a coordinator for `node_id` with default configuration,
    /// the system clock and the alphabetic chooser.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                node_id: node_id.into(),
                collaborators: RwLock::new(Collaborators {
                    config: HaConfig::default(),
                    persister: None,
                    clock: Arc::new(SystemClock),
                    chooser: Arc::new(AlphabeticMasterChooser),
                    listener: None,
                    rebind_engine: None,
                    uri: None,
                }),
                cycle: Mutex::new(CycleState::default()),
                status: RwLock::new(StatusView {
                    node_state: ManagementNodeState::Initializing,
                    transition_complete: true,
                    priority: None,
                    disabled: false,
                }),
                cached: RwLock::new(None),
                running: AtomicBool::new(false),
                poll_task: Mutex::new(None),
                metrics: HaMetrics::new(),
            }),
        }
    }

    // =========================================================================
    // CONFIGURATION (before start)
    // =========================================================================

    pub fn with_config(self, config: HaConfig) -> Self {
        self.write_collaborators().config = config;
        self
    }

    pub fn with_persister(self, persister: Arc<dyn SyncRecordPersister>) -> Self {
        self.write_collaborators().persister = Some(persister);
        self
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.write_collaborators().clock = clock;
        self
    }

    pub fn with_chooser(self, chooser: Arc<dyn MasterChooser>) -> Self {
        self.write_collaborators().chooser = chooser;
        self
    }

    pub fn with_promotion_listener(self, listener: Arc<dyn PromotionListener>) -> Self {
        self.write_collaborators().listener = Some(listener);
        self
    }

    pub fn with_rebind_engine(self, engine: Arc<dyn RebindEngine>) -> Self {
        self.write_collaborators().rebind_engine = Some(engine);
        self
    }

    pub fn with_uri(self, uri: impl Into<String>) -> Self {
        self.write_collaborators().uri = Some(uri.into());
        self
    }

    pub fn with_priority(self, priority: i64) -> Self {
        self.write_status().priority = Some(priority);
        self
    }

    pub fn with_poll_period(self, poll_period: Option<Duration>) -> Self {
        self.write_collaborators().config.poll_period = poll_period;
        self
    }

    pub fn with_heartbeat_timeout(self, heartbeat_timeout: Duration) -> Self {
        self.write_collaborators().config.heartbeat_timeout = heartbeat_timeout;
        self
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn config(&self) -> HaConfig {
        self.read_collaborators().config.clone()
    }

    pub fn metrics(&self) -> &HaMetrics {
        &self.inner.metrics
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn priority(&self) -> Option<i64> {
        self.read_status().priority
    }

    /// Handle on the graph this node currently serves, if any.
    pub fn rebind_handle(&self) -> Option<RebindHandle> {
        self.lock_cycle().rebind_handle.clone()
    }

    /// This node's status as others should see it.
    ///
    /// Reports INITIALIZING while a standby transition is incomplete;
    /// MASTER and FAILED are reported as soon as they are set.
    pub fn get_node_state(&self) -> ManagementNodeState {
        let status = self.read_status();
        match status.node_state {
            ManagementNodeState::Master | ManagementNodeState::Failed => status.node_state,
            _ if !status.transition_complete => ManagementNodeState::Initializing,
            state => state,
        }
    }

    /// The plane as this node currently sees it. Never fails.
    ///
    /// Nodes whose heartbeats have lapsed show as FAILED, this node's own
    /// entry reflects its current local state, and this node is named
    /// master while it holds mastery. Without a persister the view holds
    /// only this node; when the store cannot be read the last good view
    /// is returned.
    pub fn get_management_plane_sync_state(&self) -> ManagementPlaneSyncRecord {
        let collab = self.collaborators();

        if self.read_status().disabled {
            return self.local_only_view(&collab);
        }
        let Some(persister) = collab.persister.as_ref() else {
            return self.local_only_view(&collab);
        };

        match self.load_with_retries(persister.as_ref()) {
            Ok(snapshot) => {
                let view = self.local_view(&snapshot, &collab);
                self.store_cached(view.clone());
                view
            }
            Err(_) => match self.read_cached() {
                Some(cached) => ManagementPlaneSyncRecord::clone(&cached),
                None => self.local_only_view(&collab),
            },
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Start coordinating in `mode`. May be called once.
    pub fn start(&self, mode: HighAvailabilityMode) -> HaResult<()> {
        let collab = self.collaborators();
        collab.config.validate()?;

        let mut cycle = self.lock_cycle();
        if cycle.started || self.read_status().node_state == ManagementNodeState::Terminated {
            return Err(HaError::already_started(format!(
                "coordinator for node {} already started",
                self.inner.node_id
            )));
        }
        if mode != HighAvailabilityMode::Disabled {
            if collab.persister.is_none() {
                return Err(HaError::not_configured(
                    "a persister must be attached before starting in any mode but DISABLED",
                ));
            }
            if collab.config.poll_period.is_some() && tokio::runtime::Handle::try_current().is_err() {
                return Err(HaError::scheduling(
                    "a poll period is configured but no tokio runtime is running",
                ));
            }
        }

        cycle.started = true;
        self.inner.running.store(true, Ordering::SeqCst);
        HaEvent::Start.emit(&[("mode", mode.mode_name()), ("node_id", &self.inner.node_id)]);

        self.apply_mode(&mut cycle, &collab, mode, true)?;
        if !self.is_running() {
            return Err(HaError::not_started(format!(
                "coordinator for node {} was stopped while starting",
                self.inner.node_id
            )));
        }
        Ok(())
    }

    /// Switch modes after `start`; before `start` this is `start(mode)`.
    pub fn change_mode(&self, mode: HighAvailabilityMode) -> HaResult<()> {
        let collab = self.collaborators();
        let mut cycle = self.lock_cycle();
        if !cycle.started {
            drop(cycle);
            return self.start(mode);
        }
        if !self.is_running() {
            return Err(HaError::not_started(format!(
                "coordinator for node {} has been stopped",
                self.inner.node_id
            )));
        }
        HaEvent::ModeChanged.emit(&[
            ("from", self.get_node_state().state_name()),
            ("mode", mode.mode_name()),
            ("node_id", &self.inner.node_id),
        ]);
        self.apply_mode(&mut cycle, &collab, mode, false)
    }

    /// Stop coordinating.
    ///
    /// Cancels the poll task, publishes a final TERMINATED record and,
    /// if this node was master, clears the master pointer when it still
    /// names this node. A tick already inside its cycle finishes first;
    /// none runs after `stop` returns.
    pub fn stop(&self) {
        let was_running = self.inner.running.swap(false, Ordering::SeqCst);
        self.cancel_poll_task();

        let collab = self.collaborators();
        let mut cycle = self.lock_cycle();
        // a start or mode change holding the cycle lock may have registered a task
        self.cancel_poll_task();

        let previous = self.read_status().node_state;
        if previous == ManagementNodeState::Terminated {
            return;
        }
        self.release_handle(&mut cycle, &collab);
        {
            let mut status = self.write_status();
            status.node_state = ManagementNodeState::Terminated;
            status.transition_complete = true;
        }

        if was_running && !self.read_status().disabled {
            if let Some(persister) = collab.persister.as_ref() {
                let mut delta = Delta::for_node(self.own_record(&collab));
                if previous == ManagementNodeState::Master {
                    delta = delta.with_master_change(MasterChange::ClearMaster(self.inner.node_id.clone()));
                }
                if let Err(e) = persister.delta(&delta) {
                    self.note_write_failure(&e);
                }
                if let Err(e) = persister.wait_for_writes_completed(STOP_WRITE_TIMEOUT) {
                    Logger::warn(
                        "HA_STOP_WRITE_TIMEOUT",
                        &[("error", &e.to_string()), ("node_id", &self.inner.node_id)],
                    );
                }
            }
        }

        HaEvent::Stop.emit(&[("from", previous.state_name()), ("node_id", &self.inner.node_id)]);
    }

    /// Set the election priority and republish immediately.
    pub fn set_priority(&self, priority: i64) {
        let collab = self.collaborators();
        let cycle = self.lock_cycle();
        self.write_status().priority = Some(priority);
        if cycle.started && self.is_running() && !self.read_status().disabled {
            self.publish_health(&collab);
        }
    }

    /// Change the poll period, re-registering the poll task while running.
    pub fn set_poll_period(&self, poll_period: Option<Duration>) -> HaResult<()> {
        let mut config = self.config();
        config.poll_period = poll_period;
        config.validate()?;

        self.write_collaborators().config.poll_period = poll_period;

        let cycle = self.lock_cycle();
        if cycle.started && self.is_running() && !self.read_status().disabled {
            self.register_poll_task(poll_period)?;
        }
        Ok(())
    }

    // =========================================================================
    // PUBLISH AND CHECK
    // =========================================================================

    /// Run one publish-merge-reconcile cycle and return the resulting view.
    ///
    /// `full_rescan` marks a cycle run outside the poll loop (start, mode
    /// change, tests); it suppresses the master-change notice for a node
    /// that is still settling in. A stopped coordinator publishes nothing
    /// and returns its current view.
    pub fn publish_and_check(&self, full_rescan: bool) -> HaResult<ManagementPlaneSyncRecord> {
        let collab = self.collaborators();
        let mut cycle = self.lock_cycle();

        if !cycle.started {
            return Err(HaError::not_started(format!(
                "coordinator for node {} has not been started",
                self.inner.node_id
            )));
        }
        if !self.is_running() {
            drop(cycle);
            return Ok(self.get_management_plane_sync_state());
        }
        if self.read_status().disabled {
            return Ok(self.local_only_view(&collab));
        }
        self.run_cycle(&mut cycle, &collab, full_rescan)
    }

    fn run_cycle(
        &self,
        cycle: &mut CycleState,
        collab: &Collaborators,
        full_rescan: bool,
    ) -> HaResult<ManagementPlaneSyncRecord> {
        self.mirror_step(cycle, collab);
        self.publish_health(collab);

        let persister = self.require_persister(collab)?;
        let snapshot = self.load_with_retries(persister.as_ref())?;
        self.check_master(cycle, collab, &snapshot, full_rescan)?;

        // the reconcile step may have written; read back what others will see
        let snapshot = match self.load_with_retries(persister.as_ref()) {
            Ok(reloaded) => reloaded,
            Err(_) => snapshot,
        };
        let view = self.local_view(&snapshot, collab);
        self.store_cached(view.clone());
        Ok(view)
    }

    fn check_master(
        &self,
        cycle: &mut CycleState,
        collab: &Collaborators,
        snapshot: &ManagementPlaneSyncRecord,
        full_rescan: bool,
    ) -> HaResult<()> {
        let local_state = self.read_status().node_state;
        if local_state == ManagementNodeState::Failed {
            return Ok(());
        }

        let own_id = self.inner.node_id.as_str();
        let timeout = collab.config.heartbeat_timeout;
        let now = collab.clock.now_millis();

        let current_master_id = snapshot.master_node_id();
        let current_master = snapshot.master_record();
        let own_record = snapshot.node(own_id);

        let master_healthy = current_master
            .map(|m| m.has_status(ManagementNodeState::Master) && is_heartbeat_ok(m, timeout, now))
            .unwrap_or(false);

        if master_healthy {
            if current_master_id == Some(own_id) {
                return Ok(());
            }
            if local_state == ManagementNodeState::Master {
                let other = current_master_id.unwrap_or_default();
                self.inner.metrics.increment_split_brain_detected();
                HaEvent::SplitBrainDetected.emit(&[
                    ("node_id", own_id),
                    ("recorded_master", other),
                ]);
                let target = self.standby_target(cycle, collab);
                self.demote(cycle, collab, target)?;
                HaEvent::SplitBrainResolved.emit(&[
                    ("demoted_to", target.state_name()),
                    ("master", other),
                    ("node_id", own_id),
                ]);
            }
            return Ok(());
        }

        let own_fresh = own_record.map(|r| is_fresh(r, timeout, now)).unwrap_or(false);
        if !own_fresh {
            HaEvent::OwnHeartbeatStale.emit(&[
                ("master", current_master_id.unwrap_or("")),
                ("node_id", own_id),
                ("reason", if own_record.is_none() { "missing" } else { "stale" }),
            ]);
            return Ok(());
        }

        if current_master_id == Some(own_id) && local_state != ManagementNodeState::Master {
            Logger::warn(
                "HA_SELF_MASTER_UNHEALTHY",
                &[("node_id", own_id), ("status", local_state.state_name())],
            );
            return Ok(());
        }

        if let Some(previous) = current_master_id {
            HaEvent::MasterHeartbeatTimeout.emit(&[("master", previous), ("node_id", own_id)]);
        }
        self.inner.metrics.increment_elections();

        let chosen = collab.chooser.choose(snapshot, timeout, own_id, now);
        let chosen_id = chosen.as_ref().map(|r| r.node_id.as_str());
        let we_are_chosen = chosen_id == Some(own_id);

        if we_are_chosen && local_state == ManagementNodeState::Master {
            HaEvent::MasterReasserted.emit(&[
                ("node_id", own_id),
                ("previous_master", current_master_id.unwrap_or("")),
            ]);
            self.publish_promotion(collab);
            return Ok(());
        }

        if !full_rescan {
            let uri = chosen.as_ref().and_then(|r| r.uri.as_deref()).unwrap_or("");
            HaEvent::MasterChangeDetected.emit(&[
                ("from", current_master_id.unwrap_or("")),
                ("node_id", own_id),
                ("to", chosen_id.unwrap_or("")),
                ("to_uri", uri),
            ]);
        }

        if we_are_chosen {
            self.promote(cycle, collab)?;
        }
        Ok(())
    }

    // =========================================================================
    // MODE CHANGES
    // =========================================================================

    fn apply_mode(
        &self,
        cycle: &mut CycleState,
        collab: &Collaborators,
        mode: HighAvailabilityMode,
        starting: bool,
    ) -> HaResult<()> {
        if mode == HighAvailabilityMode::Disabled {
            if self.read_status().disabled {
                return Ok(());
            }
            return self.enter_disabled(cycle, collab, starting);
        }

        if self.read_status().disabled {
            self.write_status().disabled = false;
            self.release_handle(cycle, collab);
            self.set_state(ManagementNodeState::Standby)?;
        }
        if let Some(target) = mode.standby_state() {
            cycle.standby_target = Some(target);
        }

        let local_state = self.read_status().node_state;
        if local_state == ManagementNodeState::Master {
            if let Some(target) = mode.standby_state() {
                self.demote(cycle, collab, target)?;
            }
        }

        match mode {
            HighAvailabilityMode::Auto => {
                if matches!(
                    self.read_status().node_state,
                    ManagementNodeState::Initializing | ManagementNodeState::Failed
                ) {
                    self.set_state(ManagementNodeState::Standby)?;
                }
                match self.run_cycle(cycle, collab, true) {
                    Ok(_) => {}
                    Err(e) if e.kind == HaErrorKind::Persistence => {}
                    Err(e) => return Err(e),
                }
                let target = self.standby_target(cycle, collab);
                if self.read_status().node_state == ManagementNodeState::Standby
                    && target != ManagementNodeState::Standby
                {
                    self.enter_standby(cycle, collab, target)?;
                }
            }
            HighAvailabilityMode::Master => {
                let persister = self.require_persister(collab)?;
                let snapshot = self.load_with_retries(persister.as_ref())?;
                let now = collab.clock.now_millis();
                if let Some(existing) = snapshot.master_record().filter(|m| {
                    m.node_id != self.inner.node_id
                        && m.has_status(ManagementNodeState::Master)
                        && is_heartbeat_ok(m, collab.config.heartbeat_timeout, now)
                }) {
                    return Err(HaError::master_conflict(format!(
                        "node {} is already a healthy master; cannot force {} to master",
                        existing.node_id, self.inner.node_id
                    )));
                }
                if self.read_status().node_state != ManagementNodeState::Master {
                    self.promote(cycle, collab)?;
                }
            }
            HighAvailabilityMode::Standby
            | HighAvailabilityMode::HotStandby
            | HighAvailabilityMode::WarmStandby => {
                let target = mode.standby_state().unwrap_or(ManagementNodeState::Standby);
                let current = self.read_status().node_state;
                if current != target {
                    if !current.is_standby() {
                        self.set_state(ManagementNodeState::Standby)?;
                    }
                    self.publish_health(collab);
                    self.enter_standby(cycle, collab, target)?;
                } else {
                    self.publish_health(collab);
                }
            }
            HighAvailabilityMode::Disabled => {}
        }

        self.register_poll_task(collab.config.poll_period)
    }

    fn enter_disabled(
        &self,
        cycle: &mut CycleState,
        collab: &Collaborators,
        starting: bool,
    ) -> HaResult<()> {
        self.cancel_poll_task();

        if starting {
            // single-node master, no coordination
            self.write_status().disabled = true;
            HaEvent::Disabled.emit(&[("node_id", &self.inner.node_id)]);
            if let Some(engine) = collab.rebind_engine.as_ref() {
                match engine.rebind(RebindMode::ReadWrite) {
                    Ok(handle) => cycle.rebind_handle = Some(handle),
                    Err(e) => {
                        self.set_state(ManagementNodeState::Failed)?;
                        HaEvent::RebindFailed.emit(&[
                            ("error", &e.to_string()),
                            ("node_id", &self.inner.node_id),
                        ]);
                        return Err(e.into());
                    }
                }
            }
            self.set_state(ManagementNodeState::Master)?;
            return Ok(());
        }

        HaEvent::Disabled.emit(&[
            ("from", self.read_status().node_state.state_name()),
            ("node_id", &self.inner.node_id),
        ]);
        self.demote(cycle, collab, ManagementNodeState::Failed)
    }

    /// Enter a standby status from STANDBY, activating its resources.
    fn enter_standby(
        &self,
        cycle: &mut CycleState,
        collab: &Collaborators,
        target: ManagementNodeState,
    ) -> HaResult<()> {
        match target {
            ManagementNodeState::HotStandby => {
                let engine = collab.rebind_engine.as_ref().ok_or_else(|| {
                    HaError::not_configured("HOT_STANDBY requires a rebind engine")
                })?;

                self.write_status().transition_complete = false;
                self.publish_health(collab);

                self.release_handle(cycle, collab);
                match engine.rebind(RebindMode::ReadOnly) {
                    Ok(handle) => {
                        let entities = handle.graph().len().to_string();
                        cycle.rebind_handle = Some(handle);
                        self.set_state(ManagementNodeState::HotStandby)?;
                        self.write_status().transition_complete = true;
                        self.publish_health(collab);
                        HaEvent::HotStandbyActive.emit(&[
                            ("entities", &entities),
                            ("node_id", &self.inner.node_id),
                        ]);
                        Ok(())
                    }
                    Err(e) => self.fail_standby_transition(collab, target, e.into()),
                }
            }
            ManagementNodeState::WarmStandby => {
                self.release_handle(cycle, collab);
                if let Some(engine) = collab.rebind_engine.as_ref() {
                    self.write_status().transition_complete = false;
                    if let Err(e) = engine.validate_model() {
                        return self.fail_standby_transition(collab, target, e.into());
                    }
                }
                self.set_state(ManagementNodeState::WarmStandby)?;
                self.write_status().transition_complete = true;
                self.publish_health(collab);
                HaEvent::WarmStandbyActive.emit(&[("node_id", &self.inner.node_id)]);
                Ok(())
            }
            ManagementNodeState::Standby => {
                self.release_handle(cycle, collab);
                self.set_state(ManagementNodeState::Standby)?;
                self.publish_health(collab);
                Ok(())
            }
            other => Err(HaError::illegal_transition(format!(
                "{} is not a standby state",
                other
            ))),
        }
    }

    fn fail_standby_transition(
        &self,
        collab: &Collaborators,
        target: ManagementNodeState,
        err: HaError,
    ) -> HaResult<()> {
        HaEvent::StandbyTransitionFailed.emit(&[
            ("error", &err.message),
            ("node_id", &self.inner.node_id),
            ("target", target.state_name()),
        ]);
        self.set_state(ManagementNodeState::Failed)?;
        self.write_status().transition_complete = true;
        self.publish_health(collab);
        Err(err)
    }

    // =========================================================================
    // PROMOTION / DEMOTION
    // =========================================================================

    fn promote(&self, cycle: &mut CycleState, collab: &Collaborators) -> HaResult<()> {
        if !self.is_running() {
            Logger::warn("HA_PROMOTION_IGNORED", &[("node_id", &self.inner.node_id), ("reason", "not running")]);
            return Ok(());
        }
        let from = self.read_status().node_state;

        if let Some(engine) = collab.rebind_engine.as_ref() {
            let result = match cycle.rebind_handle.take() {
                Some(handle) if from == ManagementNodeState::HotStandby => engine.promote(handle),
                Some(handle) => {
                    engine.release(&handle);
                    engine.rebind(RebindMode::ReadWrite)
                }
                None => engine.rebind(RebindMode::ReadWrite),
            };
            match result {
                Ok(handle) => cycle.rebind_handle = Some(handle),
                Err(e) => {
                    HaEvent::RebindFailed.emit(&[
                        ("error", &e.to_string()),
                        ("node_id", &self.inner.node_id),
                    ]);
                    self.set_state(ManagementNodeState::Failed)?;
                    self.write_status().transition_complete = true;
                    self.publish_health(collab);
                    return Err(e.into());
                }
            }
        }

        self.set_state(ManagementNodeState::Master)?;
        self.write_status().transition_complete = true;
        self.publish_promotion(collab);

        self.inner.metrics.increment_promotions();
        HaEvent::Promoted.emit(&[("from", from.state_name()), ("node_id", &self.inner.node_id)]);

        if let Some(listener) = collab.listener.as_ref() {
            listener.promoted_to_master(&self.inner.node_id);
        }
        Ok(())
    }

    /// Give up mastery (if held) and settle into `target`.
    fn demote(
        &self,
        cycle: &mut CycleState,
        collab: &Collaborators,
        target: ManagementNodeState,
    ) -> HaResult<()> {
        let from = self.read_status().node_state;
        let was_master = from == ManagementNodeState::Master;

        self.release_handle(cycle, collab);
        let settled = match target {
            ManagementNodeState::Failed => ManagementNodeState::Failed,
            _ => ManagementNodeState::Standby,
        };
        self.set_state(settled)?;
        self.write_status().transition_complete = true;

        if was_master {
            self.inner.metrics.increment_demotions();
            HaEvent::Demoted.emit(&[
                ("node_id", &self.inner.node_id),
                ("to", target.state_name()),
            ]);
        }
        self.publish_demotion(collab, was_master);

        if matches!(
            target,
            ManagementNodeState::HotStandby | ManagementNodeState::WarmStandby
        ) {
            self.enter_standby(cycle, collab, target)?;
        }
        Ok(())
    }

    fn standby_target(&self, cycle: &CycleState, collab: &Collaborators) -> ManagementNodeState {
        cycle
            .standby_target
            .unwrap_or(collab.config.default_standby)
    }

    fn mirror_step(&self, cycle: &CycleState, collab: &Collaborators) {
        if self.read_status().node_state != ManagementNodeState::HotStandby {
            return;
        }
        let (Some(engine), Some(handle)) = (collab.rebind_engine.as_ref(), cycle.rebind_handle.as_ref()) else {
            return;
        };
        match engine.mirror_step(handle) {
            Ok(_) => self.inner.metrics.increment_mirror_steps(),
            Err(e) => HaEvent::MirrorStepFailed.emit(&[
                ("error", &e.to_string()),
                ("node_id", &self.inner.node_id),
            ]),
        }
    }

    fn release_handle(&self, cycle: &mut CycleState, collab: &Collaborators) {
        if let Some(handle) = cycle.rebind_handle.take() {
            if let Some(engine) = collab.rebind_engine.as_ref() {
                engine.release(&handle);
            }
        }
    }

    // =========================================================================
    // PUBLICATION
    // =========================================================================

    fn own_record(&self, collab: &Collaborators) -> ManagementNodeSyncRecord {
        ManagementNodeSyncRecord::new(
            self.inner.node_id.clone(),
            self.get_node_state(),
            collab.clock.now_millis(),
        )
        .with_priority(self.read_status().priority)
        .with_uri(collab.uri.clone())
    }

    fn publish(&self, collab: &Collaborators, delta: Delta) {
        let Some(persister) = collab.persister.as_ref() else {
            return;
        };
        match persister.delta(&delta) {
            Ok(()) => {
                self.inner.metrics.increment_heartbeats_published();
                HaEvent::HeartbeatPublished.emit(&[
                    ("node_id", &self.inner.node_id),
                    ("status", self.get_node_state().state_name()),
                ]);
            }
            Err(e) => self.note_write_failure(&e),
        }
    }

    fn publish_health(&self, collab: &Collaborators) {
        self.publish(collab, Delta::for_node(self.own_record(collab)));
    }

    fn publish_promotion(&self, collab: &Collaborators) {
        self.publish(
            collab,
            Delta::for_node(self.own_record(collab))
                .with_master_change(MasterChange::SetMaster(self.inner.node_id.clone())),
        );
    }

    fn publish_demotion(&self, collab: &Collaborators, was_master: bool) {
        let mut delta = Delta::for_node(self.own_record(collab));
        if was_master {
            delta = delta.with_master_change(MasterChange::ClearMaster(self.inner.node_id.clone()));
        }
        self.publish(collab, delta);
    }

    fn note_write_failure(&self, err: &PersistenceError) {
        self.inner.metrics.increment_heartbeat_write_failures();
        HaEvent::HeartbeatWriteFailed.emit(&[
            ("error", &err.to_string()),
            ("node_id", &self.inner.node_id),
        ]);
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    fn load_with_retries(
        &self,
        persister: &dyn SyncRecordPersister,
    ) -> HaResult<ManagementPlaneSyncRecord> {
        let mut last_error = None;
        for _ in 0..MAX_LOAD_ATTEMPTS {
            match persister.load_sync_record() {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => last_error = Some(e),
            }
        }
        self.inner.metrics.increment_snapshot_load_failures();
        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        HaEvent::SnapshotLoadFailed.emit(&[
            ("attempts", &MAX_LOAD_ATTEMPTS.to_string()),
            ("error", &message),
            ("node_id", &self.inner.node_id),
        ]);
        Err(HaError::new(
            HaErrorKind::Persistence,
            format!(
                "failed to load management plane record {} consecutive times: {}",
                MAX_LOAD_ATTEMPTS, message
            ),
        ))
    }

    fn local_view(
        &self,
        snapshot: &ManagementPlaneSyncRecord,
        collab: &Collaborators,
    ) -> ManagementPlaneSyncRecord {
        let now = collab.clock.now_millis();
        let inferred = infer_failed_nodes(snapshot, collab.config.heartbeat_timeout, now);

        let mut builder = ManagementPlaneSyncRecord::builder();
        for record in inferred.management_nodes().values() {
            builder = builder.node(record.clone());
        }
        builder = builder.node(self.own_record(collab));

        let master = if self.read_status().node_state == ManagementNodeState::Master {
            Some(self.inner.node_id.clone())
        } else {
            inferred.master_node_id().map(str::to_string)
        };
        builder.master_node_id(master).build()
    }

    fn local_only_view(&self, collab: &Collaborators) -> ManagementPlaneSyncRecord {
        let master = (self.read_status().node_state == ManagementNodeState::Master)
            .then(|| self.inner.node_id.clone());
        ManagementPlaneSyncRecord::builder()
            .node(self.own_record(collab))
            .master_node_id(master)
            .build()
    }

    // =========================================================================
    // POLLING
    // =========================================================================

    /// Caller holds the cycle lock; a stopped coordinator registers nothing.
    fn register_poll_task(&self, poll_period: Option<Duration>) -> HaResult<()> {
        self.cancel_poll_task();
        if !self.is_running() {
            return Ok(());
        }
        let Some(period) = poll_period else {
            return Ok(());
        };

        let weak: Weak<CoordinatorInner> = Arc::downgrade(&self.inner);
        let task = PollTask::spawn(period, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let coordinator = HaCoordinator { inner };
            if let Err(e) = coordinator.poll_tick() {
                HaEvent::PollFailed.emit(&[
                    ("error", &e.to_string()),
                    ("node_id", coordinator.node_id()),
                ]);
            }
        })?;

        HaEvent::PollRegistered.emit(&[
            ("node_id", &self.inner.node_id),
            ("period_ms", &period.as_millis().to_string()),
        ]);
        *self.lock_poll_task() = Some(task);
        Ok(())
    }

    /// One scheduled cycle. A tick that reaches the cycle lock after `stop`
    /// does nothing.
    fn poll_tick(&self) -> HaResult<()> {
        let collab = self.collaborators();
        let mut cycle = self.lock_cycle();
        if !cycle.started || !self.is_running() || self.read_status().disabled {
            return Ok(());
        }
        self.run_cycle(&mut cycle, &collab, false).map(|_| ())
    }

    fn cancel_poll_task(&self) {
        if let Some(task) = self.lock_poll_task().take() {
            task.cancel();
        }
    }

    // =========================================================================
    // LOCK HELPERS
    // =========================================================================

    fn set_state(&self, to: ManagementNodeState) -> HaResult<()> {
        let mut status = self.write_status();
        status.node_state = status.node_state.transition(to)?;
        Ok(())
    }

    fn require_persister(&self, collab: &Collaborators) -> HaResult<Arc<dyn SyncRecordPersister>> {
        collab
            .persister
            .clone()
            .ok_or_else(|| HaError::not_configured("no persister attached"))
    }

    fn collaborators(&self) -> Collaborators {
        self.read_collaborators().clone()
    }

    fn read_collaborators(&self) -> RwLockReadGuard<'_, Collaborators> {
        self.inner
            .collaborators
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn write_collaborators(&self) -> RwLockWriteGuard<'_, Collaborators> {
        self.inner
            .collaborators
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn read_status(&self) -> RwLockReadGuard<'_, StatusView> {
        self.inner.status.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_status(&self) -> RwLockWriteGuard<'_, StatusView> {
        self.inner.status.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_cycle(&self) -> MutexGuard<'_, CycleState> {
        self.inner.cycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_poll_task(&self) -> MutexGuard<'_, Option<PollTask>> {
        self.inner.poll_task.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_cached(&self) -> Option<Arc<ManagementPlaneSyncRecord>> {
        self.inner
            .cached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store_cached(&self, view: ManagementPlaneSyncRecord) {
        *self.inner.cached.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(view));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ha::VirtualClock;
    use crate::persist::{InMemoryPersister, InMemoryPlaneStore};
    use ManagementNodeState::*;

    const T0: i64 = 1_700_000_000_000;

    fn node(
        id: &str,
        store: &InMemoryPlaneStore,
        clock: &VirtualClock,
    ) -> (HaCoordinator, Arc<InMemoryPersister>) {
        let persister = Arc::new(InMemoryPersister::new(store.clone()));
        let coordinator = HaCoordinator::new(id)
            .with_persister(persister.clone())
            .with_clock(Arc::new(clock.clone()))
            .with_poll_period(None);
        (coordinator, persister)
    }

    // =========================================================================
    // START
    // =========================================================================

    #[test]
    fn test_lone_node_becomes_master() {
        let store = InMemoryPlaneStore::new();
        let clock = VirtualClock::new(T0);
        let (a, _) = node("a", &store, &clock);

        a.start(HighAvailabilityMode::Auto).unwrap();

        assert_eq!(a.get_node_state(), Master);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.master_node_id(), Some("a"));
        assert_eq!(snapshot.node("a").unwrap().status, Some(Master));
        assert_eq!(a.metrics().promotions(), 1);
    }

    #[test]
    fn test_joining_node_keeps_existing_master() {
        let store = InMemoryPlaneStore::new();
        let clock = VirtualClock::new(T0);
        let (b, _) = node("b", &store, &clock);
        let (a, _) = node("a", &store, &clock);

        b.start(HighAvailabilityMode::Auto).unwrap();
        a.start(HighAvailabilityMode::Auto).unwrap();

        assert_eq!(b.get_node_state(), Master);
        assert_eq!(a.get_node_state(), Standby);
        assert_eq!(store.snapshot().master_node_id(), Some("b"));
    }

    #[test]
    fn test_start_twice_fails() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        a.start(HighAvailabilityMode::Auto).unwrap();

        let err = a.start(HighAvailabilityMode::Auto).unwrap_err();
        assert_eq!(err.kind, HaErrorKind::AlreadyStarted);
    }

    #[test]
    fn test_start_requires_persister() {
        let a = HaCoordinator::new("a").with_poll_period(None);
        let err = a.start(HighAvailabilityMode::Auto).unwrap_err();
        assert_eq!(err.kind, HaErrorKind::NotConfigured);
        assert_eq!(a.get_node_state(), Initializing);
    }

    #[test]
    fn test_start_with_poll_period_needs_runtime() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        let a = a.with_poll_period(Some(Duration::from_secs(1)));

        let err = a.start(HighAvailabilityMode::Auto).unwrap_err();
        assert_eq!(err.kind, HaErrorKind::Scheduling);
        assert_eq!(store.applied_deltas(), 0);
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        let a = a.with_heartbeat_timeout(Duration::ZERO);
        let err = a.start(HighAvailabilityMode::Auto).unwrap_err();
        assert_eq!(err.kind, HaErrorKind::ConfigurationError);
    }

    #[test]
    fn test_explicit_standby_does_not_elect() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));

        a.start(HighAvailabilityMode::Standby).unwrap();

        assert_eq!(a.get_node_state(), Standby);
        assert_eq!(store.snapshot().master_node_id(), None);
        assert_eq!(store.snapshot().node("a").unwrap().status, Some(Standby));
    }

    #[test]
    fn test_disabled_mode_is_local_master() {
        let a = HaCoordinator::new("a").with_clock(Arc::new(VirtualClock::new(T0)));
        a.start(HighAvailabilityMode::Disabled).unwrap();

        assert_eq!(a.get_node_state(), Master);
        let view = a.get_management_plane_sync_state();
        assert_eq!(view.master_node_id(), Some("a"));
        assert_eq!(view.management_nodes().len(), 1);
        assert_eq!(a.publish_and_check(false).unwrap(), view);
    }

    // =========================================================================
    // CYCLE
    // =========================================================================

    #[test]
    fn test_publish_before_start_fails() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        let err = a.publish_and_check(true).unwrap_err();
        assert_eq!(err.kind, HaErrorKind::NotStarted);
        assert_eq!(store.applied_deltas(), 0);
    }

    #[test]
    fn test_heartbeat_advances_with_clock() {
        let store = InMemoryPlaneStore::new();
        let clock = VirtualClock::new(T0);
        let (a, _) = node("a", &store, &clock);
        a.start(HighAvailabilityMode::Auto).unwrap();

        clock.advance(Duration::from_secs(5));
        a.publish_and_check(false).unwrap();

        assert_eq!(store.snapshot().node("a").unwrap().timestamp_utc, T0 + 5_000);
    }

    #[test]
    fn test_stale_own_heartbeat_blocks_election() {
        let store = InMemoryPlaneStore::new();
        let clock = VirtualClock::new(T0);
        let (a, _) = node("a", &store, &clock);
        let (b, pb) = node("b", &store, &clock);
        a.start(HighAvailabilityMode::Auto).unwrap();
        b.start(HighAvailabilityMode::Auto).unwrap();

        pb.set_writes_fail_silently(true);
        clock.advance(Duration::from_secs(60));
        b.publish_and_check(false).unwrap();

        assert_eq!(b.get_node_state(), Standby);
        assert_eq!(store.snapshot().master_node_id(), Some("a"));
    }

    #[test]
    fn test_load_failure_surfaces_after_retries() {
        let store = InMemoryPlaneStore::new();
        let (a, pa) = node("a", &store, &VirtualClock::new(T0));
        a.start(HighAvailabilityMode::Auto).unwrap();

        pa.set_loads_fail(true);
        let err = a.publish_and_check(false).unwrap_err();
        assert_eq!(err.kind, HaErrorKind::Persistence);
        assert_eq!(a.metrics().snapshot().snapshot_load_failures, 1);
        assert_eq!(a.get_node_state(), Master);

        // status reads fall back to the last good view
        let view = a.get_management_plane_sync_state();
        assert_eq!(view.master_node_id(), Some("a"));
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        let store = InMemoryPlaneStore::new();
        let (a, pa) = node("a", &store, &VirtualClock::new(T0));
        a.start(HighAvailabilityMode::Auto).unwrap();

        pa.set_writes_fail(true);
        assert!(a.publish_and_check(false).is_ok());
        assert!(a.metrics().snapshot().heartbeat_write_failures >= 1);
    }

    #[test]
    fn test_reasserts_overwritten_mastery() {
        let store = InMemoryPlaneStore::new();
        let clock = VirtualClock::new(T0);
        let (a, _) = node("a", &store, &clock);
        a.start(HighAvailabilityMode::Auto).unwrap();

        // another node took the pointer and then went silent
        store.apply(
            &Delta::for_node(ManagementNodeSyncRecord::new("z", Master, T0))
                .with_master_change(MasterChange::SetMaster("z".into())),
        );
        clock.advance(Duration::from_secs(31));
        a.publish_and_check(false).unwrap();

        assert_eq!(a.get_node_state(), Master);
        assert_eq!(store.snapshot().master_node_id(), Some("a"));
        assert_eq!(a.metrics().promotions(), 1);
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    #[test]
    fn test_view_marks_lapsed_nodes_failed() {
        let store = InMemoryPlaneStore::new();
        let clock = VirtualClock::new(T0);
        let (a, _) = node("a", &store, &clock);
        let (b, _) = node("b", &store, &clock);
        a.start(HighAvailabilityMode::Auto).unwrap();
        b.start(HighAvailabilityMode::Auto).unwrap();

        clock.advance(Duration::from_secs(31));
        let view = a.get_management_plane_sync_state();

        assert_eq!(view.node("b").unwrap().status, Some(Failed));
        assert_eq!(view.node("b").unwrap().timestamp_utc, T0);
        let own = view.node("a").unwrap();
        assert_eq!(own.status, Some(Master));
        assert_eq!(own.timestamp_utc, T0 + 31_000);
        // stored records are untouched
        assert_eq!(store.snapshot().node("b").unwrap().status, Some(Standby));
    }

    #[test]
    fn test_view_without_persister() {
        let a = HaCoordinator::new("a").with_priority(4).with_uri("https://a:8443");
        let view = a.get_management_plane_sync_state();
        let own = view.node("a").unwrap();
        assert_eq!(own.status, Some(Initializing));
        assert_eq!(own.priority, Some(4));
        assert_eq!(own.uri.as_deref(), Some("https://a:8443"));
        assert_eq!(view.master_node_id(), None);
    }

    // =========================================================================
    // STOP
    // =========================================================================

    #[test]
    fn test_stop_master_publishes_terminated_and_clears_pointer() {
        let store = InMemoryPlaneStore::new();
        let clock = VirtualClock::new(T0);
        let (a, _) = node("a", &store, &clock);
        a.start(HighAvailabilityMode::Auto).unwrap();

        a.stop();

        assert_eq!(a.get_node_state(), Terminated);
        assert!(!a.is_running());
        let snapshot = store.snapshot();
        assert_eq!(snapshot.node("a").unwrap().status, Some(Terminated));
        assert_eq!(snapshot.master_node_id(), None);
    }

    #[test]
    fn test_stop_is_idempotent_and_silences_cycles() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        a.start(HighAvailabilityMode::Auto).unwrap();
        a.stop();
        let writes = store.applied_deltas();

        a.stop();
        a.publish_and_check(false).unwrap();
        a.set_priority(7);

        assert_eq!(store.applied_deltas(), writes);
        assert_eq!(a.get_node_state(), Terminated);
        assert_eq!(
            a.start(HighAvailabilityMode::Auto).unwrap_err().kind,
            HaErrorKind::AlreadyStarted
        );
    }

    #[test]
    fn test_stop_before_start_writes_nothing() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        a.stop();
        assert_eq!(a.get_node_state(), Terminated);
        assert_eq!(store.applied_deltas(), 0);
    }

    // =========================================================================
    // MODE CHANGES
    // =========================================================================

    #[test]
    fn test_change_mode_before_start_starts() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        a.change_mode(HighAvailabilityMode::Auto).unwrap();
        assert_eq!(a.get_node_state(), Master);
    }

    #[test]
    fn test_master_demotes_on_standby_request() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        a.start(HighAvailabilityMode::Auto).unwrap();

        a.change_mode(HighAvailabilityMode::Standby).unwrap();

        assert_eq!(a.get_node_state(), Standby);
        assert_eq!(store.snapshot().master_node_id(), None);
        assert_eq!(a.metrics().demotions(), 1);

        a.change_mode(HighAvailabilityMode::Master).unwrap();
        assert_eq!(a.get_node_state(), Master);
        assert_eq!(store.snapshot().master_node_id(), Some("a"));
    }

    #[test]
    fn test_disable_after_start_fails_node() {
        let store = InMemoryPlaneStore::new();
        let clock = VirtualClock::new(T0);
        let (a, _) = node("a", &store, &clock);
        a.start(HighAvailabilityMode::Auto).unwrap();

        a.change_mode(HighAvailabilityMode::Disabled).unwrap();
        assert_eq!(a.get_node_state(), Failed);
        assert_eq!(store.snapshot().node("a").unwrap().status, Some(Failed));
        assert_eq!(store.snapshot().master_node_id(), None);

        // FAILED nodes take no election decisions
        clock.advance(Duration::from_secs(1));
        a.publish_and_check(false).unwrap();
        assert_eq!(a.get_node_state(), Failed);

        a.change_mode(HighAvailabilityMode::Auto).unwrap();
        assert_eq!(a.get_node_state(), Master);
    }

    #[test]
    fn test_hot_standby_without_engine_fails() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        let err = a.start(HighAvailabilityMode::HotStandby).unwrap_err();
        assert_eq!(err.kind, HaErrorKind::NotConfigured);
    }

    #[test]
    fn test_warm_standby_without_engine() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        a.start(HighAvailabilityMode::WarmStandby).unwrap();
        assert_eq!(a.get_node_state(), WarmStandby);
        assert_eq!(store.snapshot().node("a").unwrap().status, Some(WarmStandby));
    }

    #[test]
    fn test_set_priority_republishes() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        a.start(HighAvailabilityMode::Auto).unwrap();

        a.set_priority(9);

        assert_eq!(a.priority(), Some(9));
        assert_eq!(store.snapshot().node("a").unwrap().priority, Some(9));
    }

    #[test]
    fn test_set_poll_period_validates() {
        let a = HaCoordinator::new("a");
        let err = a.set_poll_period(Some(Duration::from_secs(60))).unwrap_err();
        assert_eq!(err.kind, HaErrorKind::ConfigurationError);

        a.set_poll_period(None).unwrap();
        assert_eq!(a.config().poll_period, None);
    }

    #[tokio::test]
    async fn test_poll_task_registered_only_while_running() {
        let store = InMemoryPlaneStore::new();
        let (a, _) = node("a", &store, &VirtualClock::new(T0));
        let a = a.with_poll_period(Some(Duration::from_millis(50)));

        a.start(HighAvailabilityMode::Auto).unwrap();
        assert!(a.lock_poll_task().is_some());

        a.stop();
        assert!(a.lock_poll_task().is_none());

        // registering from a stopped coordinator is refused, even under the cycle lock
        {
            let _cycle = a.lock_cycle();
            a.register_poll_task(Some(Duration::from_millis(50))).unwrap();
        }
        assert!(a.lock_poll_task().is_none());
        a.set_poll_period(Some(Duration::from_millis(10))).unwrap();
        assert!(a.lock_poll_task().is_none());
    }
}
