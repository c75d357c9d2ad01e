//! Building-entry detection with debounce.
//!
//! One independent state machine per building with a valid center:
//! OUTSIDE -> PENDING (inside detected, confirmation window running) ->
//! CONFIRMED (still inside when the window elapses) -> OUTSIDE on exit.
//! Exit is immediate from either PENDING or CONFIRMED; only PENDING exits
//! emit a cancellation so the progress UI can be hidden.
//!
//! The tracker is driven with explicit instants so the engine task owns the
//! actual timers: `next_deadline` reports when `poll` wants to run next.

use embassy_time::{Duration, Instant};
use std::collections::HashMap;

use crate::catalog::Building;
use crate::geo;

use super::types::{ENTRY_CONFIRMATION_WINDOW, ENTRY_PROGRESS_TICK, Fix};

#[derive(Debug, Clone, PartialEq)]
enum EntryState {
    /// Inside detected; waiting out the confirmation window.
    Pending { deadline: Instant, next_tick: Instant },
    /// Entry confirmed; no re-trigger until the user leaves.
    Confirmed,
}

/// Events produced while digesting fixes and timer deadlines.
#[derive(Debug, Clone, PartialEq)]
pub enum ProximityEvent {
    /// The (nearest building, inside-radius) pair changed.
    NearestChanged { building: String, inside: bool },
    /// Confirmation in progress; emitted on entry and every progress tick.
    EntryPending { building: String, remaining: Duration },
    /// The user left the radius before the window elapsed.
    EntryCancelled { building: String },
    /// The user stayed inside for the full window.
    EntryConfirmed { building: String },
}

pub struct ProximityTracker {
    /// Buildings currently PENDING or CONFIRMED; absence means OUTSIDE.
    states: HashMap<String, EntryState>,
    last_fix: Option<Fix>,
    last_nearest: Option<(String, bool)>,
}

impl ProximityTracker {
    pub fn new() -> Self {
        ProximityTracker {
            states: HashMap::new(),
            last_fix: None,
            last_nearest: None,
        }
    }

    /// The most recent fix fed into the tracker.
    pub fn last_fix(&self) -> Option<&Fix> {
        self.last_fix.as_ref()
    }

    /// Digest a fresh fix: update every building machine and re-evaluate the
    /// nearest building. Events come out in catalog order, with the nearest
    /// change (if any) last.
    pub fn observe_fix(&mut self, fix: &Fix, buildings: &[Building], now: Instant) -> Vec<ProximityEvent> {
        self.last_fix = Some(fix.clone());
        let mut events = Vec::new();
        let mut nearest: Option<(&Building, f64)> = None;

        for building in buildings {
            let Some((lat, lng)) = building.center else {
                continue;
            };
            let distance = geo::distance_meters(fix.latitude, fix.longitude, lat, lng);
            let inside = distance <= building.radius_m;

            // Strict comparison keeps the first building in catalog order on ties.
            if nearest.is_none_or(|(_, best)| distance < best) {
                nearest = Some((building, distance));
            }

            match self.states.get(&building.name) {
                None => {
                    if inside {
                        self.states.insert(
                            building.name.clone(),
                            EntryState::Pending {
                                deadline: now + ENTRY_CONFIRMATION_WINDOW,
                                next_tick: now + ENTRY_PROGRESS_TICK,
                            },
                        );
                        events.push(ProximityEvent::EntryPending {
                            building: building.name.clone(),
                            remaining: ENTRY_CONFIRMATION_WINDOW,
                        });
                    }
                }
                Some(EntryState::Pending { .. }) => {
                    if !inside {
                        // Exit before confirmation: cancel the timer, hide progress.
                        self.states.remove(&building.name);
                        events.push(ProximityEvent::EntryCancelled {
                            building: building.name.clone(),
                        });
                    }
                }
                Some(EntryState::Confirmed) => {
                    if !inside {
                        // Silent exit, no debounce.
                        self.states.remove(&building.name);
                    }
                }
            }
        }

        if let Some((building, distance)) = nearest {
            let pair = (building.name.clone(), distance <= building.radius_m);
            if self.last_nearest.as_ref() != Some(&pair) {
                self.last_nearest = Some(pair.clone());
                events.push(ProximityEvent::NearestChanged {
                    building: pair.0,
                    inside: pair.1,
                });
            }
        }

        events
    }

    /// Service due deadlines: confirmation windows that elapsed and progress
    /// ticks for still-pending entries.
    pub fn poll(&mut self, buildings: &[Building], now: Instant) -> Vec<ProximityEvent> {
        let mut events = Vec::new();
        let mut confirmed = Vec::new();
        let mut reset = Vec::new();

        for (name, state) in self.states.iter_mut() {
            let EntryState::Pending { deadline, next_tick } = state else {
                continue;
            };

            if *deadline <= now {
                // Re-check against the latest fix; the user may have left
                // exactly at expiry.
                let still_inside = match (&self.last_fix, buildings.iter().find(|b| b.name == *name)) {
                    (Some(fix), Some(building)) => is_inside(fix, building),
                    _ => false,
                };
                if still_inside {
                    confirmed.push(name.clone());
                } else {
                    reset.push(name.clone());
                }
            } else if *next_tick <= now {
                while *next_tick <= now {
                    *next_tick += ENTRY_PROGRESS_TICK;
                }
                events.push(ProximityEvent::EntryPending {
                    building: name.clone(),
                    remaining: deadline.checked_duration_since(now).unwrap_or(Duration::from_ticks(0)),
                });
            }
        }

        for name in reset {
            // Re-check failed: no event fires, state returns to OUTSIDE.
            self.states.remove(&name);
        }
        for name in confirmed {
            self.states.insert(name.clone(), EntryState::Confirmed);
            events.push(ProximityEvent::EntryConfirmed { building: name });
        }

        events
    }

    /// Earliest instant at which `poll` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.states
            .values()
            .filter_map(|state| match state {
                EntryState::Pending { deadline, next_tick } => Some((*deadline).min(*next_tick)),
                EntryState::Confirmed => None,
            })
            .min()
    }
}

fn is_inside(fix: &Fix, building: &Building) -> bool {
    match building.center {
        Some((lat, lng)) => geo::distance_meters(fix.latitude, fix.longitude, lat, lng) <= building.radius_m,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Roughly 1 degree of latitude = 111 km; 0.0005 deg ~ 55 m.
    const CENTER: (f64, f64) = (31.0, 121.0);

    fn library() -> Building {
        Building {
            name: "图书馆".to_string(),
            total_floors: 5,
            center: Some(CENTER),
            radius_m: 30.0,
        }
    }

    fn gym() -> Building {
        Building {
            name: "体育馆".to_string(),
            total_floors: 2,
            center: Some((31.002, 121.0)),
            radius_m: 30.0,
        }
    }

    fn inside_fix() -> Fix {
        Fix::new(CENTER.0, CENTER.1, 0)
    }

    fn outside_fix() -> Fix {
        Fix::new(31.001, 121.0, 0)
    }

    fn t(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn staying_inside_for_the_window_confirms_exactly_once() {
        let buildings = vec![library(), gym()];
        let mut tracker = ProximityTracker::new();

        let events = tracker.observe_fix(&inside_fix(), &buildings, t(0));
        assert!(events.contains(&ProximityEvent::EntryPending {
            building: "图书馆".to_string(),
            remaining: ENTRY_CONFIRMATION_WINDOW,
        }));
        assert!(events.contains(&ProximityEvent::NearestChanged {
            building: "图书馆".to_string(),
            inside: true,
        }));

        // Progress ticks fire while pending, no confirmation yet.
        let events = tracker.poll(&buildings, t(1000));
        assert!(events.iter().all(|e| matches!(e, ProximityEvent::EntryPending { .. })));

        // Window elapsed while still inside.
        let events = tracker.poll(&buildings, t(3000));
        assert_eq!(
            events,
            vec![ProximityEvent::EntryConfirmed {
                building: "图书馆".to_string()
            }]
        );

        // No re-trigger while the stay continues.
        let events = tracker.observe_fix(&inside_fix(), &buildings, t(4000));
        assert!(events.is_empty());
        assert!(tracker.poll(&buildings, t(10_000)).is_empty());
    }

    #[test]
    fn leaving_before_the_window_cancels_without_confirmation() {
        let buildings = vec![library()];
        let mut tracker = ProximityTracker::new();

        tracker.observe_fix(&inside_fix(), &buildings, t(0));
        let events = tracker.observe_fix(&outside_fix(), &buildings, t(1000));
        assert!(events.contains(&ProximityEvent::EntryCancelled {
            building: "图书馆".to_string()
        }));

        // Nothing confirms later; the timer is gone.
        assert_eq!(tracker.next_deadline(), None);
        assert!(tracker.poll(&buildings, t(5000)).is_empty());
    }

    #[test]
    fn re_entry_after_cancellation_starts_a_fresh_cycle() {
        let buildings = vec![library()];
        let mut tracker = ProximityTracker::new();

        tracker.observe_fix(&inside_fix(), &buildings, t(0));
        tracker.observe_fix(&outside_fix(), &buildings, t(1000));
        tracker.observe_fix(&inside_fix(), &buildings, t(2000));

        let events = tracker.poll(&buildings, t(5000));
        assert_eq!(
            events,
            vec![ProximityEvent::EntryConfirmed {
                building: "图书馆".to_string()
            }]
        );
    }

    #[test]
    fn exit_after_confirmation_is_silent_and_allows_re_entry() {
        let buildings = vec![library()];
        let mut tracker = ProximityTracker::new();

        tracker.observe_fix(&inside_fix(), &buildings, t(0));
        tracker.poll(&buildings, t(3000));

        let events = tracker.observe_fix(&outside_fix(), &buildings, t(4000));
        assert!(!events.iter().any(|e| matches!(e, ProximityEvent::EntryCancelled { .. })));

        let events = tracker.observe_fix(&inside_fix(), &buildings, t(5000));
        assert!(events.iter().any(|e| matches!(e, ProximityEvent::EntryPending { .. })));
    }

    #[test]
    fn nearest_building_outside_radius_reports_inside_false() {
        // 40 m from the center with a 30 m radius.
        let mut building = library();
        building.center = Some((31.0, 121.0));
        let fix = Fix::new(31.00036, 121.0, 0);

        let mut tracker = ProximityTracker::new();
        let events = tracker.observe_fix(&fix, &[building], t(0));
        assert_eq!(
            events,
            vec![ProximityEvent::NearestChanged {
                building: "图书馆".to_string(),
                inside: false,
            }]
        );
    }

    #[test]
    fn nearest_change_fires_only_on_transitions() {
        let buildings = vec![library(), gym()];
        let mut tracker = ProximityTracker::new();

        let events = tracker.observe_fix(&outside_fix(), &buildings, t(0));
        assert_eq!(events.len(), 1);
        // Same nearest pair again: silent.
        let events = tracker.observe_fix(&outside_fix(), &buildings, t(100));
        assert!(events.is_empty());

        // Move next to the gym.
        let events = tracker.observe_fix(&Fix::new(31.002, 121.0, 0), &buildings, t(200));
        assert!(events.contains(&ProximityEvent::NearestChanged {
            building: "体育馆".to_string(),
            inside: true,
        }));
    }

    #[test]
    fn progress_ticks_report_decreasing_remaining_time() {
        let buildings = vec![library()];
        let mut tracker = ProximityTracker::new();
        tracker.observe_fix(&inside_fix(), &buildings, t(0));

        let events = tracker.poll(&buildings, t(50));
        let ProximityEvent::EntryPending { remaining, .. } = &events[0] else {
            panic!("expected a pending tick, got {:?}", events);
        };
        assert_eq!(remaining.as_millis(), 2950);

        assert_eq!(tracker.next_deadline(), Some(t(100)));
    }

    #[test]
    fn overlapping_radii_allow_concurrent_pending_entries() {
        let mut a = library();
        a.radius_m = 500.0;
        let mut b = gym();
        b.radius_m = 500.0;
        let buildings = vec![a, b];

        let mut tracker = ProximityTracker::new();
        let events = tracker.observe_fix(&inside_fix(), &buildings, t(0));
        let pending = events
            .iter()
            .filter(|e| matches!(e, ProximityEvent::EntryPending { .. }))
            .count();
        assert_eq!(pending, 2);

        let confirmed = tracker.poll(&buildings, t(3000));
        assert_eq!(confirmed.len(), 2);
    }
}
