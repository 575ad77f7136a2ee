// caliper_core/src/measurement/units.rs

//! Stateless unit conversion.
//!
//! Each family converts through one canonical unit (m, m², m³, rad) using a
//! fixed table of factors. Unit strings are matched case-insensitively
//! against a symbol, a full name and a few common aliases.
//!
//! The `convert*` functions are strict and reject unknown units. The
//! `*_lenient` variants return the input unchanged instead, for callers that
//! relied on that passthrough.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::error::{MeasurementError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    Length,
    Area,
    Volume,
    Angle,
}

impl UnitFamily {
    pub const ALL: [UnitFamily; 4] = [
        UnitFamily::Length,
        UnitFamily::Area,
        UnitFamily::Volume,
        UnitFamily::Angle,
    ];

    fn table(self) -> &'static [UnitDef] {
        match self {
            UnitFamily::Length => LENGTH_UNITS,
            UnitFamily::Area => AREA_UNITS,
            UnitFamily::Volume => VOLUME_UNITS,
            UnitFamily::Angle => ANGLE_UNITS,
        }
    }
}

#[derive(Debug)]
struct UnitDef {
    symbol: &'static str,
    name: &'static str,
    aliases: &'static [&'static str],
    /// Canonical units per one of this unit.
    factor: f64,
}

impl UnitDef {
    fn matches(&self, normalized: &str) -> bool {
        self.symbol == normalized || self.name == normalized || self.aliases.contains(&normalized)
    }
}

const fn unit(
    symbol: &'static str,
    name: &'static str,
    aliases: &'static [&'static str],
    factor: f64,
) -> UnitDef {
    UnitDef {
        symbol,
        name,
        aliases,
        factor,
    }
}

const FOOT: f64 = 0.3048;
const INCH: f64 = 0.0254;
const GALLON: f64 = 3.785_411_784e-3;

static LENGTH_UNITS: &[UnitDef] = &[
    unit("m", "meters", &["meter", "metre", "metres"], 1.0),
    unit("cm", "centimeters", &["centimeter"], 1e-2),
    unit("mm", "millimeters", &["millimeter"], 1e-3),
    unit("km", "kilometers", &["kilometer"], 1e3),
    unit("ft", "feet", &["foot"], FOOT),
    unit("in", "inches", &["inch"], INCH),
    unit("yd", "yards", &["yard"], 3.0 * FOOT),
    unit("mi", "miles", &["mile"], 5280.0 * FOOT),
];

static AREA_UNITS: &[UnitDef] = &[
    unit("m²", "square meters", &["m^2", "sq m", "square meter"], 1.0),
    unit("cm²", "square centimeters", &["cm^2", "sq cm", "square centimeter"], 1e-4),
    unit("mm²", "square millimeters", &["mm^2", "sq mm", "square millimeter"], 1e-6),
    unit("ft²", "square feet", &["ft^2", "sq ft", "square foot"], FOOT * FOOT),
    unit("in²", "square inches", &["in^2", "sq in", "square inch"], INCH * INCH),
    unit("acre", "acres", &[], 4046.856_422_4),
    unit("hectare", "hectares", &["ha"], 1e4),
];

static VOLUME_UNITS: &[UnitDef] = &[
    unit("m³", "cubic meters", &["m^3", "cubic meter"], 1.0),
    unit("cm³", "cubic centimeters", &["cm^3", "cubic centimeter", "cc"], 1e-6),
    unit("mm³", "cubic millimeters", &["mm^3", "cubic millimeter"], 1e-9),
    unit("ft³", "cubic feet", &["ft^3", "cubic foot"], FOOT * FOOT * FOOT),
    unit("in³", "cubic inches", &["in^3", "cubic inch"], INCH * INCH * INCH),
    unit("l", "liters", &["liter", "litre", "litres"], 1e-3),
    unit("ml", "milliliters", &["milliliter", "millilitre", "millilitres"], 1e-6),
    unit("gal", "gallons", &["gallon"], GALLON),
    unit("qt", "quarts", &["quart"], GALLON / 4.0),
    unit("pt", "pints", &["pint"], GALLON / 8.0),
    unit("cup", "cups", &[], GALLON / 16.0),
    unit("fl oz", "fluid ounces", &["fluid ounce"], GALLON / 128.0),
];

static ANGLE_UNITS: &[UnitDef] = &[
    unit("rad", "radians", &["radian"], 1.0),
    unit("deg", "degrees", &["degree", "°"], PI / 180.0),
    unit("grad", "gradians", &["gradian", "gon", "gons"], PI / 200.0),
    unit(
        "rev",
        "revolutions",
        &["revolution", "turn", "turns", "rot", "rotation", "rotations"],
        TAU,
    ),
];

/// Lowercases and collapses runs of whitespace, so `"Sq  CM"` matches `"sq cm"`.
fn normalize(unit: &str) -> String {
    unit.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn lookup(family: UnitFamily, unit: &str) -> Option<&'static UnitDef> {
    let key = normalize(unit);
    family.table().iter().find(|def| def.matches(&key))
}

fn lookup_any(unit: &str) -> Option<(UnitFamily, &'static UnitDef)> {
    let key = normalize(unit);
    UnitFamily::ALL.iter().find_map(|&family| {
        family
            .table()
            .iter()
            .find(|def| def.matches(&key))
            .map(|def| (family, def))
    })
}

fn unsupported(unit: &str) -> MeasurementError {
    MeasurementError::UnsupportedUnit {
        unit: unit.to_owned(),
    }
}

// --- Strict conversion ---

/// Converts `value` between two units of the same family.
pub fn convert_in(family: UnitFamily, value: f64, from: &str, to: &str) -> Result<f64> {
    let src = lookup(family, from).ok_or_else(|| unsupported(from))?;
    let dst = lookup(family, to).ok_or_else(|| unsupported(to))?;
    Ok(value * src.factor / dst.factor)
}

pub fn convert_length(value: f64, from: &str, to: &str) -> Result<f64> {
    convert_in(UnitFamily::Length, value, from, to)
}

pub fn convert_area(value: f64, from: &str, to: &str) -> Result<f64> {
    convert_in(UnitFamily::Area, value, from, to)
}

pub fn convert_volume(value: f64, from: &str, to: &str) -> Result<f64> {
    convert_in(UnitFamily::Volume, value, from, to)
}

pub fn convert_angle(value: f64, from: &str, to: &str) -> Result<f64> {
    convert_in(UnitFamily::Angle, value, from, to)
}

/// Converts between any two known units, detecting the family from `from`.
pub fn convert(value: f64, from: &str, to: &str) -> Result<f64> {
    let (from_family, src) = lookup_any(from).ok_or_else(|| unsupported(from))?;
    let (to_family, dst) = lookup_any(to).ok_or_else(|| unsupported(to))?;
    if from_family != to_family {
        return Err(MeasurementError::IncompatibleUnits {
            from: from.to_owned(),
            to: to.to_owned(),
        });
    }
    Ok(value * src.factor / dst.factor)
}

// --- Lenient conversion ---

pub fn convert_length_lenient(value: f64, from: &str, to: &str) -> f64 {
    convert_length(value, from, to).unwrap_or(value)
}

pub fn convert_area_lenient(value: f64, from: &str, to: &str) -> f64 {
    convert_area(value, from, to).unwrap_or(value)
}

pub fn convert_volume_lenient(value: f64, from: &str, to: &str) -> f64 {
    convert_volume(value, from, to).unwrap_or(value)
}

pub fn convert_angle_lenient(value: f64, from: &str, to: &str) -> f64 {
    convert_angle(value, from, to).unwrap_or(value)
}

/// Unknown or mismatched units return `value` unchanged.
pub fn convert_lenient(value: f64, from: &str, to: &str) -> f64 {
    convert(value, from, to).unwrap_or(value)
}

// --- Unit metadata ---

pub fn family_of(unit: &str) -> Option<UnitFamily> {
    lookup_any(unit).map(|(family, _)| family)
}

/// The unit results of a family are reported in by default.
pub fn standard_unit(family: UnitFamily) -> &'static str {
    match family {
        UnitFamily::Length => "m",
        UnitFamily::Area => "m²",
        UnitFamily::Volume => "m³",
        UnitFamily::Angle => "deg",
    }
}

pub fn available_units(family: UnitFamily) -> Vec<&'static str> {
    family.table().iter().map(|def| def.symbol).collect()
}

/// Full plural name of a unit, or the input itself when unknown.
pub fn unit_name(unit: &str) -> String {
    lookup_any(unit)
        .map(|(_, def)| def.name.to_owned())
        .unwrap_or_else(|| unit.to_owned())
}

fn trim_zeros(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_owned()
    } else {
        s
    }
}

/// Formats a value with a precision that shrinks as its magnitude grows.
pub fn format_number(value: f64, unit: &str) -> String {
    let magnitude = value.abs();
    let number = if magnitude == 0.0 {
        "0".to_owned()
    } else if magnitude < 0.001 {
        format!("{value:.3e}")
    } else if magnitude < 0.01 {
        trim_zeros(format!("{value:.5}"))
    } else if magnitude < 0.1 {
        trim_zeros(format!("{value:.4}"))
    } else if magnitude < 1.0 {
        trim_zeros(format!("{value:.3}"))
    } else if magnitude < 10.0 {
        trim_zeros(format!("{value:.2}"))
    } else if magnitude < 100.0 {
        trim_zeros(format!("{value:.1}"))
    } else {
        format!("{value:.0}")
    };
    format!("{number} {unit}")
}

// --- Display unit selection ---

/// Picks mm, cm or m for a length in meters.
pub fn auto_length(meters: f64) -> (f64, &'static str) {
    let magnitude = meters.abs();
    if magnitude < 0.01 {
        (meters * 1e3, "mm")
    } else if magnitude < 1.0 {
        (meters * 1e2, "cm")
    } else {
        (meters, "m")
    }
}

/// Picks mm², cm² or m² for an area in square meters.
pub fn auto_area(square_meters: f64) -> (f64, &'static str) {
    let magnitude = square_meters.abs();
    if magnitude < 1e-4 {
        (square_meters * 1e6, "mm²")
    } else if magnitude < 1.0 {
        (square_meters * 1e4, "cm²")
    } else {
        (square_meters, "m²")
    }
}
