//! The single source of truth for the user's campus/building/floor/restroom
//! choice. Mutated only through the operations below; every mutation path
//! enforces the downstream-reset rule and re-checks the structural
//! invariants.

use crate::catalog::Restroom;

/// Which UI regions changed as the result of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangedRegions {
    pub campus: bool,
    pub building: bool,
    pub floor: bool,
    pub restroom: bool,
}

impl ChangedRegions {
    pub fn any(&self) -> bool {
        self.campus || self.building || self.floor || self.restroom
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    campus: String,
    building: String,
    floor: Option<i32>,
    restroom: Option<Restroom>,
}

impl SelectionState {
    pub fn new() -> Self {
        SelectionState::default()
    }

    pub fn campus(&self) -> &str {
        &self.campus
    }

    pub fn building(&self) -> &str {
        &self.building
    }

    pub fn floor(&self) -> Option<i32> {
        self.floor
    }

    pub fn restroom(&self) -> Option<&Restroom> {
        self.restroom.as_ref()
    }

    /// Campus, building and floor are all chosen.
    pub fn is_complete(&self) -> bool {
        !self.campus.is_empty() && !self.building.is_empty() && self.floor.is_some()
    }

    /// Set the campus. Clearing it, or switching to a different campus,
    /// invalidates building and floor.
    pub fn set_campus(&mut self, name: &str) -> ChangedRegions {
        let mut changed = ChangedRegions::default();
        if self.campus == name {
            return changed;
        }

        self.campus = name.to_string();
        changed.campus = true;
        if !self.building.is_empty() {
            self.building.clear();
            changed.building = true;
        }
        if self.floor.is_some() {
            self.floor = None;
            changed.floor = true;
        }
        self.check_invariants();
        changed
    }

    /// Set the building. The caller guarantees a campus is already selected
    /// when the name is non-empty. Changing the building clears the floor.
    pub fn set_building(&mut self, name: &str) -> ChangedRegions {
        let mut changed = ChangedRegions::default();
        if self.building == name {
            return changed;
        }

        self.building = name.to_string();
        changed.building = true;
        if self.floor.is_some() {
            self.floor = None;
            changed.floor = true;
        }
        self.check_invariants();
        changed
    }

    /// Set or clear the floor. No cascading.
    pub fn set_floor(&mut self, floor: Option<i32>) -> ChangedRegions {
        let mut changed = ChangedRegions::default();
        if self.floor != floor {
            self.floor = floor;
            changed.floor = true;
        }
        self.check_invariants();
        changed
    }

    /// Adopt a resolved restroom as the selection, taking campus, building
    /// and floor from the record itself. The canonical way a resolution
    /// result becomes "the selection".
    pub fn apply_restroom(&mut self, restroom: Restroom) -> ChangedRegions {
        let changed = ChangedRegions {
            campus: self.campus != restroom.campus,
            building: self.building != restroom.building,
            floor: self.floor != Some(restroom.floor),
            restroom: self.restroom.as_ref() != Some(&restroom),
        };

        self.campus = restroom.campus.clone();
        self.building = restroom.building.clone();
        self.floor = Some(restroom.floor);
        self.restroom = Some(restroom);
        self.check_invariants();
        changed
    }

    /// Drop the restroom without touching campus/building/floor.
    pub fn clear_restroom(&mut self) -> ChangedRegions {
        let mut changed = ChangedRegions::default();
        if self.restroom.is_some() {
            self.restroom = None;
            changed.restroom = true;
        }
        self.check_invariants();
        changed
    }

    // Violations here are programming errors, not user-facing conditions.
    fn check_invariants(&self) {
        assert!(
            self.building.is_empty() || !self.campus.is_empty(),
            "selection has a building without a campus"
        );
        assert!(
            self.floor.is_none() || !self.building.is_empty(),
            "selection has a floor without a building"
        );
    }
}
