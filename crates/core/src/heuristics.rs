//! Friction heuristics over a flushed session buffer.
//!
//! Everything here is a pure function of the input slice: no clock, no
//! randomness, so the same batch always yields byte-identical output.

use std::collections::HashMap;

use crate::events::{ActionCount, FrictionMetrics, InteractionEvent};

/// Consecutive clicks closer than this count as a rapid-click sequence.
pub const RAPID_CLICK_WINDOW_MS: i64 = 500;
/// Hover or idle dwell at or above this is a hesitation.
pub const HESITATION_DWELL_MS: f64 = 3000.0;

const RAGE_WEIGHT: f64 = 0.3;
const HESITATION_WEIGHT: f64 = 0.2;
const BACKTRACK_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct FrictionReport {
    pub summary: String,
    pub metrics: FrictionMetrics,
    pub page: Option<String>,
}

/// Human-readable digest of a batch: action histogram plus rapid-click warning.
pub fn summarize(events: &[InteractionEvent]) -> String {
    analyze(events).summary
}

pub fn analyze(events: &[InteractionEvent]) -> FrictionReport {
    let actions: Vec<String> = events
        .iter()
        .map(InteractionEvent::normalized_action)
        .collect();

    let histogram = histogram(&actions);
    let rapid_clicks = rapid_clicks(events, &actions);
    let hesitations = events
        .iter()
        .zip(&actions)
        .filter(|(event, action)| is_hesitation(event, action))
        .count();
    let backtracks = actions.iter().filter(|a| *a == "backtrack").count();

    let interactions = events.len();
    let friction_score = ((rapid_clicks as f64 * RAGE_WEIGHT
        + hesitations as f64 * HESITATION_WEIGHT
        + backtracks as f64 * BACKTRACK_WEIGHT)
        / interactions.max(1) as f64)
        .min(1.0);

    let metrics = FrictionMetrics {
        interactions,
        click_count: actions.iter().filter(|a| *a == "click").count(),
        rapid_clicks,
        hesitations,
        backtracks,
        avg_dwell_ms: average_dwell(events),
        friction_score,
        actions: histogram,
    };

    FrictionReport {
        summary: render_summary(interactions, &metrics.actions, rapid_clicks),
        page: last_page(events, &actions),
        metrics,
    }
}

/// Occurrence counts in first-seen order.
pub fn histogram(actions: &[String]) -> Vec<ActionCount> {
    let mut counts: Vec<ActionCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for action in actions {
        match index.get(action.as_str()) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(action, counts.len());
                counts.push(ActionCount {
                    action: action.clone(),
                    count: 1,
                });
            }
        }
    }
    counts
}

/// Number of consecutive click pairs (by timestamp) strictly closer than
/// [`RAPID_CLICK_WINDOW_MS`]. Clicks without a timestamp are ignored.
pub fn rapid_clicks(events: &[InteractionEvent], actions: &[String]) -> usize {
    let mut times: Vec<i64> = events
        .iter()
        .zip(actions)
        .filter(|(_, action)| *action == "click")
        .filter_map(|(event, _)| event.timestamp)
        .collect();

    if times.len() < 2 {
        return 0;
    }

    times.sort_unstable();
    times
        .windows(2)
        .filter(|pair| pair[1].saturating_sub(pair[0]) < RAPID_CLICK_WINDOW_MS)
        .count()
}

fn is_hesitation(event: &InteractionEvent, action: &str) -> bool {
    match action {
        "hesitation" => true,
        "hover" | "idle" => event
            .dwell_ms()
            .is_some_and(|dwell| dwell >= HESITATION_DWELL_MS),
        _ => false,
    }
}

fn average_dwell(events: &[InteractionEvent]) -> f64 {
    let dwells: Vec<f64> = events.iter().filter_map(InteractionEvent::dwell_ms).collect();
    if dwells.is_empty() {
        0.0
    } else {
        dwells.iter().sum::<f64>() / dwells.len() as f64
    }
}

fn last_page(events: &[InteractionEvent], actions: &[String]) -> Option<String> {
    events
        .iter()
        .rev()
        .find_map(|e| e.payload_str("page"))
        .or_else(|| {
            events
                .iter()
                .zip(actions)
                .rev()
                .find(|(_, action)| *action == "nav")
                .and_then(|(e, _)| e.payload_str("target"))
        })
        .map(str::to_string)
}

fn render_summary(interactions: usize, histogram: &[ActionCount], rapid_clicks: usize) -> String {
    let mut summary = format!("Session has {} interactions: ", interactions);
    summary.push_str(
        &histogram
            .iter()
            .map(|a| format!("{} {}", a.count, a.action))
            .collect::<Vec<_>>()
            .join(", "),
    );
    if rapid_clicks > 0 {
        summary.push_str(&format!(
            " [WARNING: {} rapid click sequences detected]",
            rapid_clicks
        ));
    }
    summary
}
