//! Plain-text rendering of route outcomes.

use std::fmt::Write;

use valhalla_bridge_lib::{RouteOutcome, Summary, Trip, Units};

pub fn render_outcome(outcome: &RouteOutcome, units: Units) -> String {
    match outcome {
        RouteOutcome::Trip(trip) => render_trip(trip, units),
        RouteOutcome::NoRoute { message } => format!("No route found: {message}\n"),
    }
}

/// One header line for the trip, then each leg with its numbered maneuvers.
pub fn render_trip(trip: &Trip, units: Units) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Route: {} leg(s), {}",
        trip.legs.len(),
        describe_summary(&trip.summary, units)
    );

    for (index, leg) in trip.legs.iter().enumerate() {
        let _ = writeln!(
            out,
            "Leg {}: {}",
            index + 1,
            describe_summary(&leg.summary, units)
        );
        for (step, maneuver) in leg.maneuvers.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {:>2}. {} ({:.2} {})",
                step + 1,
                maneuver.instruction,
                maneuver.length,
                unit_label(units)
            );
        }
    }
    out
}

fn describe_summary(summary: &Summary, units: Units) -> String {
    let mut text = format!(
        "{:.2} {}, {}",
        summary.length,
        unit_label(units),
        format_duration(summary.time)
    );
    if summary.has_toll {
        text.push_str(", tolls");
    }
    if summary.has_ferry {
        text.push_str(", ferry");
    }
    text
}

fn unit_label(units: Units) -> &'static str {
    match units {
        Units::Miles => "mi",
        Units::Kilometers => "km",
    }
}

/// `h:mm:ss` from seconds.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
