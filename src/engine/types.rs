//! Type definitions for the resolution engine.
//!
//! Contains the location fix structure, the command/event vocabulary spoken
//! over the engine channels, and the channel type aliases shared between
//! the engine task and the front-end.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Duration;

use crate::catalog::Restroom;

/// Dwell time inside a building's radius before an entry is confirmed.
pub const ENTRY_CONFIRMATION_WINDOW: Duration = Duration::from_millis(3000);
/// Interval between entry-progress notifications while a confirmation is pending.
pub const ENTRY_PROGRESS_TICK: Duration = Duration::from_millis(50);
/// One-shot guard on the very first fix after a watch is started.
pub const FIRST_FIX_TIMEOUT: Duration = Duration::from_secs(10);

/// Depth of the command channel (front-end -> engine).
pub const ENGINE_COMMAND_CHANNEL_SIZE: usize = 100;
/// Bounded channel carrying commands into the engine task.
pub type EngineCommandChannel = embassy_sync::channel::Channel<CriticalSectionRawMutex, EngineCommand, ENGINE_COMMAND_CHANNEL_SIZE>;
/// Receiver side of the command channel.
pub type EngineCommandReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, EngineCommand, ENGINE_COMMAND_CHANNEL_SIZE>;
/// Sender side of the command channel.
pub type EngineCommandSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, EngineCommand, ENGINE_COMMAND_CHANNEL_SIZE>;

/// Depth of the event channel (engine -> front-end).
pub const ENGINE_EVENT_CHANNEL_SIZE: usize = 100;
/// Bounded channel carrying notifications out of the engine task.
pub type EngineEventChannel = embassy_sync::channel::Channel<CriticalSectionRawMutex, EngineEvent, ENGINE_EVENT_CHANNEL_SIZE>;
/// Receiver side of the event channel.
pub type EngineEventReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, EngineEvent, ENGINE_EVENT_CHANNEL_SIZE>;
/// Sender side of the event channel.
pub type EngineEventSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, EngineEvent, ENGINE_EVENT_CHANNEL_SIZE>;

/// A single geolocation reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    /// Milliseconds since the epoch, as reported by the location provider.
    pub timestamp_ms: u64,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: u64) -> Self {
        Fix {
            latitude,
            longitude,
            altitude: None,
            heading: None,
            speed: None,
            timestamp_ms,
        }
    }
}

/// Commands accepted by the engine task (UI -> core).
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Start the location watch subscription. Idempotent.
    StartWatch,
    /// Stop the watch and cancel the pending first-fix timeout, leaving
    /// per-building confirmation timers untouched.
    StopWatch,
    /// A fresh fix from the active watch.
    LocationFix(Fix),
    /// The location provider failed; fall back to manual selection.
    LocationError(String),
    SelectCampus(String),
    SelectBuilding(String),
    SelectFloor(Option<i32>),
    /// Confirm a floor pick for a building (the entry/marker floor chooser).
    ConfirmFloorChoice { building: String, floor: i32 },
    /// Resolve a previously reported ambiguous candidate set.
    PickFromCandidates(Restroom),
    /// The user picked a record from a free-form list.
    SelectRestroomDirect(Restroom),
    /// Close the currently open blocking chooser or notice.
    DismissNotice,
}

/// Notifications emitted by the engine task (core -> UI). Pure data, no
/// engine-internal state.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Building names to offer after a campus change.
    BuildingsForCampus(Vec<String>),
    /// Floor count to offer after a building change.
    FloorsForBuilding(u32),
    /// A resolution produced exactly one restroom; it is now the selection.
    Resolved(Restroom),
    /// An incomplete query matched nothing. Not an error.
    NoMatch,
    /// Several records match; the UI must present a chooser (blocking).
    Ambiguous(Vec<Restroom>),
    BuildingEntryPending { building: String, remaining_ms: u64 },
    BuildingEntryCancelled(String),
    /// Entry confirmed after the dwell window; carries the nearest restroom
    /// candidate in that building, when one exists.
    BuildingEntryConfirmed { building: String, candidate: Option<Restroom> },
    NearestBuildingChanged { building: String, inside: bool },
    /// Ranked restroom list for display (building-ranked after a floor
    /// resolution, globally distance-sorted after a fix).
    ListRanked(Vec<RankedRestroom>),
    /// The building has no recorded restrooms at all (blocking notice).
    NoRestroomInBuilding(String),
    LocationUnavailable(String),
    /// No fix arrived within the first-fix window; the watch keeps running.
    FirstFixTimeout,
}

/// One entry of a ranked restroom list.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRestroom {
    pub restroom: Restroom,
    /// Distance from the user's fix, when both sides have coordinates.
    pub distance_m: Option<f64>,
    /// Signed floor difference towards the reference floor, when one exists.
    pub floor_delta: Option<i32>,
    /// "same", "+N above" or "N below"; None without a reference floor.
    pub floor_label: Option<String>,
    /// Compass direction from the fix towards the restroom.
    pub direction: Option<&'static str>,
}
