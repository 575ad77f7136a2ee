// caliper_cli/src/report.rs

use std::fmt::Write as _;

use anyhow::{Context, Result};
use caliper_core::measurement::units;

use crate::session::SessionReport;

pub fn to_json(report: &SessionReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report")
}

/// Human-readable summary, one line per measurement.
pub fn to_text(report: &SessionReport) -> String {
    let mut out = String::new();

    match &report.calibration {
        Some(c) => {
            let _ = writeln!(
                out,
                "Calibration: {:.6e} m/px ({:?}, {})",
                c.factor,
                c.source,
                c.calibrated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        None => out.push_str("Calibration: none\n"),
    }

    match (&report.orientation, report.tilt_degrees) {
        (Some(o), Some(tilt)) => {
            let _ = write!(
                out,
                "Device: tilt {:.1}°, pitch {:.1}°, roll {:.1}°",
                tilt, o.pitch_deg, o.roll_deg
            );
            if let Some(heading) = o.heading_deg {
                let _ = write!(out, ", heading {heading:.0}°");
            }
            out.push('\n');
        }
        _ => out.push_str("Device: no accelerometer data\n"),
    }
    let _ = writeln!(
        out,
        "Sensors: accuracy {:.0}%, {}{}",
        report.sensor_accuracy * 100.0,
        if report.device_stable { "stable" } else { "moving" },
        match report.rejected_samples {
            0 => String::new(),
            n => format!(", {n} samples rejected"),
        }
    );

    out.push('\n');
    for outcome in &report.outcomes {
        match (&outcome.result, &outcome.error) {
            (Some(r), _) => {
                let _ = writeln!(
                    out,
                    "{:<16} {:<9} {:>14}  {:>3.0}%  {}  [{}]",
                    outcome.label,
                    r.kind(),
                    units::format_number(r.value(), r.unit()),
                    r.confidence() * 100.0,
                    r.method(),
                    r.formatted_date()
                );
            }
            (None, Some(e)) => {
                let _ = writeln!(out, "{:<16} error: {e}", outcome.label);
            }
            (None, None) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{run, SessionConfig};
    use figment::{
        providers::{Format, Toml},
        Figment,
    };

    fn report() -> SessionReport {
        let session = SessionConfig::from_figment(Figment::from(Toml::string(
            r#"
            [calibration]
            method = "manual"
            known_distance_m = 1.0
            pixel_distance = 100.0

            [[measurements]]
            label = "edge"
            type = "distance"
            points = [{ x = 0.0, y = 0.0 }, { x = 100.0, y = 0.0 }]

            [[measurements]]
            label = "bad"
            type = "area"
            points = [{ x = 0.0, y = 0.0 }]
            "#,
        )))
        .unwrap();
        run(&session).unwrap()
    }

    #[test]
    fn text_report_lists_each_outcome() {
        let text = to_text(&report());
        assert!(text.contains("Calibration: 1.000000e-2 m/px (Manual"));
        assert!(text.contains("Device: no accelerometer data"));
        let edge = text.lines().find(|l| l.starts_with("edge")).unwrap();
        assert!(edge.contains("1 m"));
        assert!(edge.contains("calibrated_2d"));
        assert!(text.lines().any(|l| l.starts_with("bad") && l.contains("error")));
    }

    #[test]
    fn json_report_is_machine_readable() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&report()).unwrap()).unwrap();
        assert_eq!(json["outcomes"][0]["result"]["kind"], "DISTANCE");
        assert_eq!(json["outcomes"][0]["result"]["unit"], "m");
        assert!(json["outcomes"][1]["error"].is_string());
    }
}
