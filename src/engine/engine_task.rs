//! Central engine task driving resolution, proximity and the watch timeout.
//!
//! High-level flow each loop tick:
//! 1) Compute the next deadline (entry confirmation window, progress tick,
//!    or first-fix timeout).
//! 2) `select` waits for a front-end command or that deadline.
//! 3) Commands mutate the selection and run resolution; fixes feed the
//!    proximity tracker; deadlines service confirmation windows and the
//!    first-fix guard.
//!
//! All failures are converted to events at the point of detection; nothing
//! panics across the channel boundary.

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};

use crate::catalog::{Catalog, Restroom};

use super::proximity::{ProximityEvent, ProximityTracker};
use super::resolver::{self, Resolution};
use super::selection::SelectionState;
use super::types::{EngineCommand, EngineCommandReceiver, EngineEvent, EngineEventSender, Fix};
use super::watch::LocationWatch;

/// Mutable engine state: the selection, the per-building proximity map, the
/// watch subscription and the deferred-fix cache. Constructed once and owned
/// by the task; no hidden statics.
struct EngineContext {
    catalog: Catalog,
    selection: SelectionState,
    tracker: ProximityTracker,
    watch: LocationWatch,
    events: EngineEventSender,
    /// A chooser or notice the user must answer is open; fixes are deferred.
    blocking_choice_open: bool,
    /// Latest fix received while blocked, last-wins.
    deferred_fix: Option<Fix>,
}

impl EngineContext {
    fn new(catalog: Catalog, events: EngineEventSender) -> Self {
        EngineContext {
            catalog,
            selection: SelectionState::new(),
            tracker: ProximityTracker::new(),
            watch: LocationWatch::new(),
            events,
            blocking_choice_open: false,
            deferred_fix: None,
        }
    }

    async fn emit(&self, event: EngineEvent) {
        self.events.send(event).await;
    }

    async fn handle_command(&mut self, cmd: EngineCommand, now: Instant) {
        match cmd {
            EngineCommand::StartWatch => {
                if !self.watch.start(now) {
                    log::debug!("Watch already active, start ignored");
                }
            }
            EngineCommand::StopWatch => {
                self.watch.stop();
            }
            EngineCommand::LocationFix(fix) => {
                self.handle_fix(fix, now).await;
            }
            EngineCommand::LocationError(reason) => {
                log::warn!("Location unavailable: {}", reason);
                self.emit(EngineEvent::LocationUnavailable(reason)).await;
                self.manual_fallback().await;
            }
            EngineCommand::SelectCampus(name) => {
                self.select_campus(&name).await;
            }
            EngineCommand::SelectBuilding(name) => {
                self.select_building(&name).await;
            }
            EngineCommand::SelectFloor(floor) => {
                self.select_floor(floor).await;
            }
            EngineCommand::ConfirmFloorChoice { building, floor } => {
                self.confirm_floor_choice(&building, floor, now).await;
            }
            EngineCommand::PickFromCandidates(restroom) => {
                self.selection.apply_restroom(restroom.clone());
                self.emit(EngineEvent::Resolved(restroom)).await;
                self.finish_blocking(now).await;
            }
            EngineCommand::SelectRestroomDirect(restroom) => {
                self.select_restroom_direct(restroom).await;
            }
            EngineCommand::DismissNotice => {
                self.finish_blocking(now).await;
            }
        }
    }

    async fn handle_deadline(&mut self, now: Instant) {
        if self.watch.take_timeout(now) {
            log::warn!("No fix arrived within the first-fix window");
            self.emit(EngineEvent::FirstFixTimeout).await;
        }

        let events = self.tracker.poll(self.catalog.buildings(), now);
        self.dispatch_proximity(events, now).await;
    }

    /// Earliest instant the task needs to wake up for.
    fn next_deadline(&self) -> Option<Instant> {
        [self.tracker.next_deadline(), self.watch.timeout_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    async fn handle_fix(&mut self, fix: Fix, now: Instant) {
        if !self.watch.is_active() {
            log::debug!("Fix ignored, no active watch subscription");
            return;
        }
        if self.blocking_choice_open {
            // A blocking chooser/notice is open: cache the latest fix and
            // apply it in full once the UI is unblocked.
            self.deferred_fix = Some(fix);
            return;
        }
        self.apply_fix(fix, now).await;
    }

    async fn apply_fix(&mut self, fix: Fix, now: Instant) {
        log::debug!("Processing fix ({:.6}, {:.6})", fix.latitude, fix.longitude);
        self.watch.note_fix();

        let events = self.tracker.observe_fix(&fix, self.catalog.buildings(), now);
        self.dispatch_proximity(events, now).await;

        let ranked = resolver::global_ranking(&self.catalog, Some(&fix));
        self.emit(EngineEvent::ListRanked(ranked)).await;
    }

    async fn dispatch_proximity(&mut self, events: Vec<ProximityEvent>, _now: Instant) {
        for event in events {
            match event {
                ProximityEvent::EntryPending { building, remaining } => {
                    self.emit(EngineEvent::BuildingEntryPending {
                        building,
                        remaining_ms: remaining.as_millis(),
                    })
                    .await;
                }
                ProximityEvent::EntryCancelled { building } => {
                    self.emit(EngineEvent::BuildingEntryCancelled(building)).await;
                }
                ProximityEvent::EntryConfirmed { building } => {
                    log::info!("Entry confirmed: {}", building);
                    self.confirmed_entry(building).await;
                }
                ProximityEvent::NearestChanged { building, inside } => {
                    log::debug!("Nearest building now {} (inside: {})", building, inside);
                    self.emit(EngineEvent::NearestBuildingChanged {
                        building: building.clone(),
                        inside,
                    })
                    .await;
                    if !inside {
                        self.show_building_from_outside(&building).await;
                    }
                }
            }
        }
    }

    /// Entry confirmed: adopt the building and surface the floor chooser
    /// together with the nearest restroom candidate in that building.
    async fn confirmed_entry(&mut self, building: String) {
        self.adopt_building(&building).await;

        let in_building = self.catalog.restrooms_on(&building, None);
        let candidate = resolver::nearest_by_distance(&in_building, self.tracker.last_fix()).cloned();

        self.emit(EngineEvent::BuildingEntryConfirmed { building, candidate }).await;
        // The floor chooser is a blocking modal; fixes are deferred until it
        // is answered (ConfirmFloorChoice) or dismissed.
        self.blocking_choice_open = true;
    }

    /// Passing a building from outside its radius: adopt it for display and
    /// select the nearest restroom, matching the original outside-building
    /// flow.
    async fn show_building_from_outside(&mut self, building: &str) {
        self.adopt_building(building).await;
        if self.selection.building() != building {
            return;
        }

        let in_building = self.catalog.restrooms_on(building, None);
        let candidate = resolver::nearest_by_distance(&in_building, self.tracker.last_fix()).cloned();
        match candidate {
            Some(restroom) => {
                self.selection.apply_restroom(restroom.clone());
                self.emit(EngineEvent::Resolved(restroom)).await;
            }
            None => {
                self.selection.clear_restroom();
            }
        }
    }

    /// Put a building (and its owning campus) into the selection, notifying
    /// the pickers about changed option lists. Refuses buildings that no
    /// campus owns when no campus is selected yet.
    async fn adopt_building(&mut self, building: &str) {
        if !building.is_empty() {
            match self.catalog.campus_owning(building) {
                Some(campus) => {
                    let campus = campus.to_string();
                    let changed = self.selection.set_campus(&campus);
                    if changed.campus {
                        self.emit(EngineEvent::BuildingsForCampus(self.catalog.buildings_of_campus(&campus).to_vec()))
                            .await;
                    }
                }
                None if self.selection.campus().is_empty() => {
                    log::warn!("Building {} is not part of any campus, ignored", building);
                    return;
                }
                None => {}
            }
        }

        let changed = self.selection.set_building(building);
        if changed.any() {
            self.selection.clear_restroom();
        }
        if changed.building && !building.is_empty() {
            if let Some(info) = self.catalog.building_info(building) {
                self.emit(EngineEvent::FloorsForBuilding(info.total_floors)).await;
            }
        }
    }

    async fn select_campus(&mut self, name: &str) {
        let changed = self.selection.set_campus(name);
        if changed.any() {
            self.selection.clear_restroom();
        }
        if changed.campus && !name.is_empty() {
            self.emit(EngineEvent::BuildingsForCampus(self.catalog.buildings_of_campus(name).to_vec()))
                .await;
        }
    }

    async fn select_building(&mut self, name: &str) {
        self.adopt_building(name).await;
    }

    async fn select_floor(&mut self, floor: Option<i32>) {
        if floor.is_some() && self.selection.building().is_empty() {
            log::warn!("Floor selected without a building, ignored");
            return;
        }

        let changed = self.selection.set_floor(floor);
        if !self.selection.is_complete() {
            if changed.any() {
                self.selection.clear_restroom();
            }
            return;
        }

        let resolution = resolver::resolve_selection(
            &self.catalog,
            self.selection.campus(),
            self.selection.building(),
            self.selection.floor(),
            self.tracker.last_fix(),
        );
        self.handle_resolution(resolution).await;
    }

    async fn confirm_floor_choice(&mut self, building: &str, floor: i32, now: Instant) {
        // Answering the entry floor chooser ends its blocking state; the
        // resolution below may open a new one (ambiguous candidates).
        self.blocking_choice_open = false;

        self.adopt_building(building).await;
        if self.selection.building() != building {
            return;
        }
        self.selection.set_floor(Some(floor));

        let resolution = resolver::resolve_floor_choice(&self.catalog, self.selection.campus(), building, floor, self.tracker.last_fix());
        self.handle_resolution(resolution).await;
        self.apply_deferred(now).await;
    }

    async fn select_restroom_direct(&mut self, restroom: Restroom) {
        // Several records sharing the picked record's site need a chooser.
        let matches: Vec<Restroom> = self
            .catalog
            .all_restrooms()
            .iter()
            .filter(|r| r.same_site(&restroom))
            .cloned()
            .collect();

        if matches.len() > 1 {
            self.selection.clear_restroom();
            self.emit(EngineEvent::Ambiguous(matches)).await;
            self.blocking_choice_open = true;
        } else {
            self.selection.apply_restroom(restroom.clone());
            self.emit(EngineEvent::Resolved(restroom)).await;
        }
    }

    async fn handle_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Resolved(restroom) => {
                self.selection.apply_restroom(restroom.clone());
                self.emit(EngineEvent::Resolved(restroom)).await;

                let building = self.selection.building().to_string();
                let in_building = self.catalog.restrooms_on(&building, None);
                let ranked = resolver::rank_for_floor(&in_building, self.selection.floor(), self.tracker.last_fix());
                self.emit(EngineEvent::ListRanked(ranked)).await;
            }
            Resolution::Ambiguous(candidates) => {
                self.selection.clear_restroom();
                self.emit(EngineEvent::Ambiguous(candidates)).await;
                self.blocking_choice_open = true;
            }
            Resolution::NoRestroomInBuilding => {
                self.selection.clear_restroom();
                self.emit(EngineEvent::NoRestroomInBuilding(self.selection.building().to_string()))
                    .await;
                self.blocking_choice_open = true;
            }
            Resolution::NoMatch => {
                self.selection.clear_restroom();
                self.emit(EngineEvent::NoMatch).await;
            }
        }
    }

    /// Location provider failed: original manual-selection fallback picks
    /// the first campus so the pickers are populated.
    async fn manual_fallback(&mut self) {
        if let Some(campus) = self.catalog.first_campus() {
            let campus = campus.to_string();
            self.select_campus(&campus).await;
        }
    }

    async fn apply_deferred(&mut self, now: Instant) {
        if self.blocking_choice_open {
            return;
        }
        if let Some(fix) = self.deferred_fix.take() {
            log::debug!("Applying deferred fix");
            self.apply_fix(fix, now).await;
        }
    }

    async fn finish_blocking(&mut self, now: Instant) {
        self.blocking_choice_open = false;
        self.apply_deferred(now).await;
    }
}

/// Central engine task. Spawn once; communicates exclusively over the
/// command and event channels.
#[embassy_executor::task]
pub async fn engine_task(catalog: Catalog, command_rx: EngineCommandReceiver, event_tx: EngineEventSender) {
    log::info!(
        "Engine started: {} buildings, {} restrooms",
        catalog.buildings().len(),
        catalog.all_restrooms().len()
    );

    let mut ctx = EngineContext::new(catalog, event_tx);

    loop {
        // Sleep until the next confirmation/progress/timeout deadline, or
        // far in the future when nothing is pending.
        let deadline = ctx.next_deadline().unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        match select(command_rx.receive(), Timer::at(deadline)).await {
            Either::First(cmd) => {
                ctx.handle_command(cmd, Instant::now()).await;
            }
            Either::Second(()) => {
                ctx.handle_deadline(Instant::now()).await;
            }
        }
    }
}
