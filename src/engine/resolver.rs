//! Restroom resolution: floor-exact search with escalation, nearest-by-floor
//! and nearest-by-distance candidate selection, and the ranked lists used
//! for display. All functions are pure over the catalog plus an optional
//! location fix; tie-breaks are deterministic.

use std::cmp::Ordering;

use crate::catalog::{Catalog, Restroom};
use crate::geo;

use super::types::{Fix, RankedRestroom};

/// Outcome of a resolution step.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Exactly one record; it becomes the selection.
    Resolved(Restroom),
    /// Several records share the requested site; the user must choose.
    /// Not a failure, a normal control-flow branch.
    Ambiguous(Vec<Restroom>),
    /// An incomplete query matched nothing; no escalation.
    NoMatch,
    /// The building has no recorded restrooms at all.
    NoRestroomInBuilding,
}

/// Distance from a fix to a restroom, when the record has coordinates.
pub fn distance_to(fix: &Fix, restroom: &Restroom) -> Option<f64> {
    restroom
        .coords()
        .map(|(lat, lng)| geo::distance_meters(fix.latitude, fix.longitude, lat, lng))
}

/// Filter restrooms on whichever selection fields are provided (empty
/// campus/building and None floor act as wildcards), in catalog order.
pub fn filter_selection<'a>(catalog: &'a Catalog, campus: &str, building: &str, floor: Option<i32>) -> Vec<&'a Restroom> {
    catalog
        .all_restrooms()
        .iter()
        .filter(|r| {
            (campus.is_empty() || r.campus == campus)
                && (building.is_empty() || r.building == building)
                && floor.is_none_or(|f| r.floor == f)
        })
        .collect()
}

/// Floor-exact search for a complete (campus, building, floor) query.
///
/// One match auto-resolves; several return the candidate set for a chooser;
/// zero escalates to the nearest-by-floor-difference search over the whole
/// building, or reports `NoRestroomInBuilding` when the building has no
/// records at all.
pub fn resolve_floor_choice(catalog: &Catalog, campus: &str, building: &str, floor: i32, fix: Option<&Fix>) -> Resolution {
    let matches = filter_selection(catalog, campus, building, Some(floor));
    match matches.len() {
        1 => Resolution::Resolved(matches[0].clone()),
        0 => {
            let in_building = catalog.restrooms_on(building, None);
            if in_building.is_empty() {
                Resolution::NoRestroomInBuilding
            } else {
                Resolution::Resolved(nearest_by_floor(&in_building, floor, fix).clone())
            }
        }
        _ => Resolution::Ambiguous(matches.into_iter().cloned().collect()),
    }
}

/// Resolve a partial selection. Complete queries go through the floor-exact
/// search; incomplete ones report `NoMatch` on zero hits instead of
/// escalating.
pub fn resolve_selection(catalog: &Catalog, campus: &str, building: &str, floor: Option<i32>, fix: Option<&Fix>) -> Resolution {
    let complete = !campus.is_empty() && !building.is_empty() && floor.is_some();
    if complete {
        return resolve_floor_choice(catalog, campus, building, floor.unwrap_or_default(), fix);
    }

    let matches = filter_selection(catalog, campus, building, floor);
    match matches.len() {
        1 if floor.is_some() => Resolution::Resolved(matches[0].clone()),
        _ => Resolution::NoMatch,
    }
}

/// Candidate with the smallest `abs(floor - target)`. Equidistant floors are
/// broken by geographic distance to the fix when both candidates and the fix
/// carry coordinates; otherwise the earlier record in catalog order wins.
///
/// Panics on an empty slice; callers check for empty buildings first.
pub fn nearest_by_floor<'a>(candidates: &[&'a Restroom], target_floor: i32, fix: Option<&Fix>) -> &'a Restroom {
    let mut best = candidates[0];
    let mut best_diff = (best.floor - target_floor).abs();

    for r in &candidates[1..] {
        let diff = (r.floor - target_floor).abs();
        if diff < best_diff {
            best = r;
            best_diff = diff;
        } else if diff == best_diff {
            if let Some(fix) = fix {
                if let (Some(d_new), Some(d_best)) = (distance_to(fix, r), distance_to(fix, best)) {
                    if d_new < d_best {
                        best = r;
                    }
                }
            }
        }
    }

    best
}

/// Candidate closest to the fix among records with coordinates; falls back
/// to the first record in catalog order when no fix or no coordinates are
/// available.
pub fn nearest_by_distance<'a>(candidates: &[&'a Restroom], fix: Option<&Fix>) -> Option<&'a Restroom> {
    let first = *candidates.first()?;
    let Some(fix) = fix else {
        return Some(first);
    };

    let mut best: Option<(&Restroom, f64)> = None;
    for r in candidates {
        if let Some(d) = distance_to(fix, r) {
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((r, d));
            }
        }
    }

    Some(best.map(|(r, _)| r).unwrap_or(first))
}

/// Ranked list for the multi-restroom suggestion panel.
///
/// Primary grouping by floor proximity tier (near <= 1, mid == 2, far > 2),
/// then `abs(floor_diff)` ascending, then distance ascending. Entries
/// without a computable floor difference sort after all tiers, among
/// themselves by floor then distance.
pub fn rank_for_floor(candidates: &[&Restroom], reference_floor: Option<i32>, fix: Option<&Fix>) -> Vec<RankedRestroom> {
    let mut entries: Vec<RankedRestroom> = candidates.iter().map(|r| make_entry(r, reference_floor, fix)).collect();

    entries.sort_by(|a, b| match (a.floor_delta, b.floor_delta) {
        (Some(da), Some(db)) => {
            let tier_a = floor_tier(da);
            let tier_b = floor_tier(db);
            tier_a
                .cmp(&tier_b)
                .then(da.abs().cmp(&db.abs()))
                .then(sort_distance(a).total_cmp(&sort_distance(b)))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a
            .restroom
            .floor
            .cmp(&b.restroom.floor)
            .then(sort_distance(a).total_cmp(&sort_distance(b))),
    });

    entries
}

/// Global list ordering: ascending distance when the fix is known (records
/// without coordinates sort last), catalog order otherwise.
pub fn global_ranking(catalog: &Catalog, fix: Option<&Fix>) -> Vec<RankedRestroom> {
    let mut entries: Vec<RankedRestroom> = catalog.all_restrooms().iter().map(|r| make_entry(r, None, fix)).collect();

    if fix.is_some() {
        entries.sort_by(|a, b| sort_distance(a).total_cmp(&sort_distance(b)));
    }

    entries
}

/// Display label for a relative floor: "same", "+N above" or "N below".
pub fn floor_label(delta: i32) -> String {
    match delta.cmp(&0) {
        Ordering::Equal => "same".to_string(),
        Ordering::Greater => format!("+{} above", delta),
        Ordering::Less => format!("{} below", -delta),
    }
}

fn make_entry(restroom: &Restroom, reference_floor: Option<i32>, fix: Option<&Fix>) -> RankedRestroom {
    let distance_m = fix.and_then(|f| distance_to(f, restroom));
    let floor_delta = reference_floor.map(|f| restroom.floor - f);
    let direction = fix.and_then(|f| {
        restroom
            .coords()
            .map(|(lat, lng)| geo::compass_label(geo::bearing_degrees(f.latitude, f.longitude, lat, lng)))
    });

    RankedRestroom {
        restroom: restroom.clone(),
        distance_m,
        floor_delta,
        floor_label: floor_delta.map(floor_label),
        direction,
    }
}

// Missing coordinates are treated as infinitely far for ordering.
fn sort_distance(entry: &RankedRestroom) -> f64 {
    entry.distance_m.unwrap_or(f64::INFINITY)
}

fn floor_tier(delta: i32) -> u8 {
    match delta.abs() {
        0 | 1 => 0,
        2 => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuildingRecord, CampusRecord, Catalog};

    fn restroom(floor: i32, attribute: &str, coords: Option<(f64, f64)>) -> Restroom {
        Restroom {
            campus: "A".to_string(),
            building: "图书馆".to_string(),
            floor,
            attribute: attribute.to_string(),
            nearby_room: None,
            description: None,
            notes: None,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
        }
    }

    fn catalog_with(restrooms: Vec<Restroom>) -> Catalog {
        Catalog::from_records(
            vec![CampusRecord {
                campus: "A".to_string(),
                buildings: vec!["图书馆".to_string()],
            }],
            vec![BuildingRecord {
                building: "图书馆".to_string(),
                total_floors: 5,
                center: Some("31.0, 121.0".to_string()),
                radius: Some(30.0),
            }],
            restrooms,
        )
        .unwrap()
    }

    fn fix_at(lat: f64, lng: f64) -> Fix {
        Fix::new(lat, lng, 0)
    }

    #[test]
    fn single_match_on_a_floor_auto_resolves() {
        let catalog = catalog_with(vec![restroom(2, "男厕", None), restroom(4, "无障碍", None)]);
        let result = resolve_floor_choice(&catalog, "A", "图书馆", 4, None);
        assert_eq!(result, Resolution::Resolved(restroom(4, "无障碍", None)));
    }

    #[test]
    fn multiple_matches_on_a_floor_are_ambiguous() {
        let catalog = catalog_with(vec![
            restroom(2, "男厕", None),
            restroom(2, "女厕", None),
            restroom(4, "无障碍", None),
        ]);
        let result = resolve_floor_choice(&catalog, "A", "图书馆", 2, None);
        assert_eq!(
            result,
            Resolution::Ambiguous(vec![restroom(2, "男厕", None), restroom(2, "女厕", None)])
        );
    }

    #[test]
    fn empty_floor_escalates_to_nearest_floor_difference() {
        // Floors 2 and 4 both differ from 3 by one; without a fix the
        // earlier record wins.
        let catalog = catalog_with(vec![
            restroom(2, "男厕", None),
            restroom(2, "女厕", None),
            restroom(4, "无障碍", None),
        ]);
        let result = resolve_floor_choice(&catalog, "A", "图书馆", 3, None);
        assert_eq!(result, Resolution::Resolved(restroom(2, "男厕", None)));
    }

    #[test]
    fn floor_tie_is_broken_by_distance_when_coordinates_exist() {
        let near = restroom(4, "无障碍", Some((31.0001, 121.0)));
        let far = restroom(2, "男厕", Some((31.01, 121.0)));
        let fix = fix_at(31.0, 121.0);

        // Both floors differ from 3 by one; the geographically closer record
        // wins regardless of catalog order.
        let catalog = catalog_with(vec![far.clone(), near.clone()]);
        assert_eq!(
            resolve_floor_choice(&catalog, "A", "图书馆", 3, Some(&fix)),
            Resolution::Resolved(near.clone())
        );

        let catalog = catalog_with(vec![near.clone(), far.clone()]);
        assert_eq!(
            resolve_floor_choice(&catalog, "A", "图书馆", 3, Some(&fix)),
            Resolution::Resolved(near)
        );
    }

    #[test]
    fn empty_building_reports_no_restroom() {
        let catalog = catalog_with(vec![]);
        let result = resolve_floor_choice(&catalog, "A", "图书馆", 1, None);
        assert_eq!(result, Resolution::NoRestroomInBuilding);
    }

    #[test]
    fn incomplete_queries_never_escalate() {
        let catalog = catalog_with(vec![restroom(2, "男厕", None)]);
        // Floor given but no building: zero matches simply report NoMatch.
        let result = resolve_selection(&catalog, "A", "", Some(9), None);
        assert_eq!(result, Resolution::NoMatch);
    }

    #[test]
    fn nearest_by_distance_prefers_coordinates_then_catalog_order() {
        let a = restroom(1, "男厕", None);
        let b = restroom(2, "女厕", Some((31.001, 121.0)));
        let c = restroom(3, "无障碍", Some((31.0001, 121.0)));
        let all = [&a, &b, &c];
        let fix = fix_at(31.0, 121.0);

        assert_eq!(nearest_by_distance(&all, Some(&fix)), Some(&c));
        // No fix: first in catalog order.
        assert_eq!(nearest_by_distance(&all, None), Some(&a));
        // No coordinates anywhere: first in catalog order.
        let d = restroom(4, "女厕", None);
        assert_eq!(nearest_by_distance(&[&a, &d], Some(&fix)), Some(&a));
        assert_eq!(nearest_by_distance(&[], Some(&fix)), None);
    }

    #[test]
    fn global_ranking_sorts_missing_coordinates_last() {
        let catalog = catalog_with(vec![
            restroom(1, "男厕", None),
            restroom(2, "女厕", Some((31.0027, 121.0))), // ~300 m
            restroom(3, "无障碍", Some((31.00009, 121.0))), // ~10 m
        ]);
        let fix = fix_at(31.0, 121.0);

        let ranked = global_ranking(&catalog, Some(&fix));
        assert_eq!(ranked[0].restroom.attribute, "无障碍");
        assert_eq!(ranked[1].restroom.attribute, "女厕");
        assert_eq!(ranked[2].restroom.attribute, "男厕");
        assert_eq!(ranked[2].distance_m, None);
        assert!(ranked[0].direction.is_some());
    }

    #[test]
    fn global_ranking_preserves_catalog_order_without_a_fix() {
        let catalog = catalog_with(vec![
            restroom(3, "无障碍", Some((31.0001, 121.0))),
            restroom(1, "男厕", None),
        ]);
        let ranked = global_ranking(&catalog, None);
        assert_eq!(ranked[0].restroom.attribute, "无障碍");
        assert_eq!(ranked[1].restroom.attribute, "男厕");
    }

    #[test]
    fn floor_ranking_groups_by_tier_before_distance() {
        let same = restroom(3, "同层", Some((31.01, 121.0)));
        let mid = restroom(5, "中层", Some((31.0001, 121.0)));
        let far = restroom(7, "远层", Some((31.00001, 121.0)));
        let fix = fix_at(31.0, 121.0);

        let ranked = rank_for_floor(&[&far, &mid, &same], Some(3), Some(&fix));
        // Tier wins over raw distance: same floor first although farthest.
        assert_eq!(ranked[0].restroom.attribute, "同层");
        assert_eq!(ranked[1].restroom.attribute, "中层");
        assert_eq!(ranked[2].restroom.attribute, "远层");
        assert_eq!(ranked[0].floor_label.as_deref(), Some("same"));
        assert_eq!(ranked[1].floor_label.as_deref(), Some("+2 above"));
        assert_eq!(ranked[2].floor_label.as_deref(), Some("+4 above"));
    }

    #[test]
    fn floor_labels_cover_both_directions() {
        assert_eq!(floor_label(0), "same");
        assert_eq!(floor_label(2), "+2 above");
        assert_eq!(floor_label(-1), "1 below");
    }
}
