// tests/ranking_top.rs
//
// Ranking engine: ordering, limits, allow-list monotonicity, and the
// deliberate divergence between the global and per-location calling modes.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

use pulse_broadcaster::analytics::ranking::{
    compute_ranking_set, top_ranked, top_ranked_for_location, RankingParams,
};
use pulse_broadcaster::window::{trailing_window, TimeWindow, WindowSpan};
use pulse_broadcaster::{Identity, Location, LocationSet, MemoryStore, Publication};

const LOCATIONS: [&str; 3] = ["Amsterdam", "Berlin", "Paris"];

fn store() -> MemoryStore {
    MemoryStore::new(LocationSet::new(LOCATIONS))
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 6, 10, 12, 0, 0).unwrap()
}

fn day_window() -> TimeWindow {
    trailing_window(now(), WindowSpan::Day, Duration::zero())
}

fn insert(store: &MemoryStore, loc: &str, identity: Option<&str>, minutes_ago: i64, weight: f64) {
    let mut p = Publication::new(
        "twitter",
        minutes_ago,
        Location::new(loc),
        now() - Duration::minutes(minutes_ago),
        weight,
    )
    .unwrap();
    if let Some(id) = identity {
        p = p.with_identity(Identity::parse(id).unwrap(), id.to_string());
    }
    store.insert(p).unwrap();
}

#[tokio::test]
async fn summed_weights_rank_and_truncate() {
    let s = store();
    insert(&s, "Berlin", Some("a"), 10, 5.0);
    insert(&s, "Berlin", Some("a"), 20, 5.0);
    insert(&s, "Berlin", Some("b"), 15, 7.0);

    let ranking = top_ranked(&s, day_window(), None, 1).await.unwrap();
    let berlin = &ranking[&Location::new("Berlin")];
    assert_eq!(berlin.len(), 1);
    assert_eq!(berlin[0].identity.as_str(), "a");
    assert_eq!(berlin[0].total_weight, 10.0);
}

#[tokio::test]
async fn identity_less_records_never_rank() {
    let s = store();
    insert(&s, "Paris", None, 10, 50.0);
    insert(&s, "Paris", Some("x"), 10, 1.0);

    let ranking = top_ranked(&s, day_window(), None, 10).await.unwrap();
    let paris = &ranking[&Location::new("Paris")];
    assert_eq!(paris.len(), 1);
    assert_eq!(paris[0].identity.as_str(), "x");
}

#[tokio::test]
async fn output_is_sorted_and_bounded_for_random_input() {
    let s = store();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let loc = LOCATIONS[rng.random_range(0..LOCATIONS.len())];
        let id = format!("user{}", rng.random_range(0..25));
        insert(&s, loc, Some(&id), rng.random_range(1..600), rng.random_range(0.0..9.0));
    }

    let limit = 10;
    let per_location: Vec<_> = LOCATIONS.iter().map(|l| Location::new(*l)).collect();
    for location in per_location {
        let entries = top_ranked_for_location(&s, day_window(), location, None, limit)
            .await
            .unwrap();
        assert!(entries.len() <= limit);
        for pair in entries.windows(2) {
            assert!(
                pair[0].total_weight >= pair[1].total_weight,
                "ranking must be non-increasing"
            );
        }
    }
}

#[tokio::test]
async fn allow_list_only_removes_entries() {
    let s = store();
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..120 {
        let loc = LOCATIONS[rng.random_range(0..LOCATIONS.len())];
        let id = format!("user{}", rng.random_range(0..12));
        insert(&s, loc, Some(&id), rng.random_range(1..600), rng.random_range(0.5..4.0));
    }

    let allow: BTreeSet<Identity> = ["user1", "user3", "user5", "user8"]
        .iter()
        .map(|i| Identity::parse(i).unwrap())
        .collect();

    let full = top_ranked(&s, day_window(), None, 500).await.unwrap();
    let filtered = top_ranked(&s, day_window(), Some(&allow), 500).await.unwrap();

    for (location, entries) in &filtered {
        let full_filtered: Vec<&Identity> = full[location]
            .iter()
            .filter(|e| allow.contains(&e.identity))
            .map(|e| &e.identity)
            .collect();
        let got: Vec<&Identity> = entries.iter().map(|e| &e.identity).collect();
        assert_eq!(
            got, full_filtered,
            "allow-list must only remove entries, never add or reorder survivors"
        );
    }
}

#[tokio::test]
async fn global_and_per_location_limits_diverge() {
    let s = store();
    // Amsterdam dominates globally; Berlin has one small publisher.
    for i in 0..5 {
        insert(&s, "Amsterdam", Some(&format!("big{i}")), 30, 50.0);
    }
    insert(&s, "Berlin", Some("minor"), 30, 1.0);

    let global = top_ranked(&s, day_window(), None, 3).await.unwrap();
    assert!(
        !global.contains_key(&Location::new("Berlin")),
        "global limit leaves no room for Berlin"
    );
    assert_eq!(global[&Location::new("Amsterdam")].len(), 3);

    let berlin = top_ranked_for_location(&s, day_window(), Location::new("Berlin"), None, 3)
        .await
        .unwrap();
    assert_eq!(berlin.len(), 1, "per-location mode still surfaces Berlin");

    // No qualifying records → empty vector, not an error.
    let paris = top_ranked_for_location(&s, day_window(), Location::new("Paris"), None, 3)
        .await
        .unwrap();
    assert!(paris.is_empty());
}

#[tokio::test]
async fn ranking_set_covers_every_span() {
    let s = store();
    insert(&s, "Amsterdam", Some("fresh"), 30, 2.0); // within the hour
    insert(&s, "Amsterdam", Some("steady"), 60 * 24 * 3, 9.0); // three days old

    let params = RankingParams {
        lag: Duration::zero(),
        allow_list: None,
        limit: 100,
    };
    let set = compute_ranking_set(&s, now(), &params).await.unwrap();

    let ams = Location::new("Amsterdam");
    assert_eq!(set.hour[&ams].len(), 1, "only the fresh record ranks hourly");
    assert_eq!(set.week[&ams].len(), 2);
    assert_eq!(set.all_time[&ams].len(), 2);
    assert_eq!(set.week[&ams][0].identity.as_str(), "steady");
}
