//! Proportional chunk scheduler: picks the next table an
//! idle worker should draw its next data chunk from. Kept pure and
//! stateless so it can be unit tested against boundary scenarios
//! without a dump reader, journal, or worker pool in the loop. The
//! coordinator's dispatch loop is the only caller for data dispatch.

use std::collections::HashMap;

/// One table currently offering at least one chunk to load.
#[derive(Debug, Clone)]
pub struct TableCandidate {
    pub schema: String,
    pub table: String,
    /// Bytes available to load right now (sum of not-yet-dispatched chunk
    /// sizes).
    pub available_bytes: u64,
    /// Whether this table has already had at least one chunk consumed.
    pub started: bool,
}

pub type TableKey = (String, String);

/// Picks the next table to draw a chunk from:
///
/// 1. If some ready table isn't currently in flight, prefer a started one
///    over a fresh one (ties broken by larger available bytes), and start
///    it unless we're already at the concurrency cap with an unstarted
///    candidate.
/// 2. Otherwise (every ready table is in flight and we're at the cap),
///    schedule proportionally: maximize `available_share - in_flight_share`
///    across started tables.
/// 3. If no table has ever started, there is nothing to schedule yet.
pub fn pick_next_table(
    ready: &[TableCandidate],
    in_flight: &HashMap<TableKey, u64>,
    max_concurrent_tables: usize,
) -> Option<TableKey> {
    let key_of = |t: &TableCandidate| (t.schema.clone(), t.table.clone());

    let not_in_flight: Vec<&TableCandidate> =
        ready.iter().filter(|t| !in_flight.contains_key(&key_of(t))).collect();

    if !not_in_flight.is_empty() {
        let best = not_in_flight
            .iter()
            .max_by(|a, b| (a.started, a.available_bytes).cmp(&(b.started, b.available_bytes)))
            .expect("non-empty");

        let started_count = ready.iter().filter(|t| t.started).count();
        if started_count < max_concurrent_tables || best.started {
            return Some(key_of(best));
        }
        // Fall through to proportional scheduling: we're at the cap and
        // the best unstarted candidate can't be started yet.
    }

    let started: Vec<&TableCandidate> = ready.iter().filter(|t| t.started).collect();
    if started.is_empty() {
        return None;
    }

    let total_in_flight: u64 = started.iter().map(|t| *in_flight.get(&key_of(t)).unwrap_or(&0)).sum();
    let total_available: u64 = started.iter().map(|t| t.available_bytes).sum();

    let mut best: Option<(&TableCandidate, f64)> = None;
    for t in &started {
        let flight = *in_flight.get(&key_of(t)).unwrap_or(&0) as f64;
        let w = if total_in_flight == 0 { 0.0 } else { flight / total_in_flight as f64 };
        let a = if total_available == 0 { 0.0 } else { t.available_bytes as f64 / total_available as f64 };
        let score = a - w;
        match &best {
            None => best = Some((t, score)),
            Some((_, best_score)) if score > *best_score => best = Some((t, score)),
            _ => {}
        }
    }
    best.map(|(t, _)| key_of(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(schema: &str, table: &str, bytes: u64, started: bool) -> TableCandidate {
        TableCandidate {
            schema: schema.into(),
            table: table.into(),
            available_bytes: bytes,
            started,
        }
    }

    #[test]
    fn picks_a_fresh_table_not_yet_in_flight() {
        let ready = vec![candidate("s", "a", 100_000_000, true), candidate("s", "b", 50_000_000, false)];
        let mut in_flight = HashMap::new();
        in_flight.insert(("s".to_string(), "a".to_string()), 50_000_000);

        let picked = pick_next_table(&ready, &in_flight, 4);
        assert_eq!(picked, Some(("s".to_string(), "b".to_string())));
    }

    #[test]
    fn proportional_pick_favors_table_with_less_relative_flight() {
        // w(A) = 0.8, w(B) = 0.2 of a 100-unit total in flight.
        // a(A) = a(B) = 0.5 of a 200-unit total available.
        let ready = vec![candidate("s", "a", 100, true), candidate("s", "b", 100, true)];
        let mut in_flight = HashMap::new();
        in_flight.insert(("s".to_string(), "a".to_string()), 80);
        in_flight.insert(("s".to_string(), "b".to_string()), 20);

        let picked = pick_next_table(&ready, &in_flight, 2);
        assert_eq!(picked, Some(("s".to_string(), "b".to_string())));
    }

    #[test]
    fn caps_concurrent_tables_before_proportional_kicks_in() {
        // Two tables already started and in flight (at the cap); a third,
        // fresh table must wait rather than being started.
        let ready = vec![
            candidate("s", "a", 10, true),
            candidate("s", "b", 10, true),
            candidate("s", "c", 1_000_000, false),
        ];
        let mut in_flight = HashMap::new();
        in_flight.insert(("s".to_string(), "a".to_string()), 5);
        in_flight.insert(("s".to_string(), "b".to_string()), 5);

        let picked = pick_next_table(&ready, &in_flight, 2);
        assert!(picked == Some(("s".to_string(), "a".to_string())) || picked == Some(("s".to_string(), "b".to_string())));
    }

    #[test]
    fn nothing_to_schedule_when_ready_is_empty() {
        let ready: Vec<TableCandidate> = Vec::new();
        let in_flight = HashMap::new();
        assert_eq!(pick_next_table(&ready, &in_flight, 4), None);
    }

    #[test]
    fn starts_first_table_when_none_in_flight_yet() {
        let ready = vec![candidate("s", "a", 10, false), candidate("s", "b", 1000, false)];
        let in_flight = HashMap::new();
        // Neither has started; larger available bytes wins the tie among
        // equally-unstarted candidates.
        let picked = pick_next_table(&ready, &in_flight, 4);
        assert_eq!(picked, Some(("s".to_string(), "b".to_string())));
    }
}
