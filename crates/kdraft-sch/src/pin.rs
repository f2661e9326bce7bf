//! Pin geometry and the coordinate resolver.
//!
//! Maps a `(reference, pin)` endpoint to an absolute sheet coordinate. Known
//! two-terminal library parts use a fixed offset table so they can be wired
//! immediately after creation, before a codec reload populates their pin
//! tables. Everything else goes through the symbol's own pin table, by name
//! first and number second.

use serde::{Deserialize, Serialize};

use crate::SchSymbol;
use crate::position::{GRID_MM, Point};

/// Symbol-relative pin location as exposed by the codec collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinAt {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub name: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<PinAt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrical_type: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl Pin {
    /// A name of `~` is KiCad's placeholder for an unnamed pin.
    pub fn is_named(&self) -> bool {
        !self.name.is_empty() && self.name != "~"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Geometry for the pin is unavailable (empty or coordinate-less pin
    /// table). Callers may degrade to a label-based soft connection.
    #[error("pin '{pin}' on {reference} could not be located (no pin table data)")]
    PinUnresolved { reference: String, pin: String },
    /// The symbol's pin table is populated and names no such pin. This is a
    /// bad pin identifier, not missing data, and must not be degraded.
    #[error("pin '{pin}' not found on {reference} (available: {})", available.join(", "))]
    PinUnknown {
        reference: String,
        pin: String,
        available: Vec<String>,
    },
}

/// Device-library parts with exactly two electrical terminals. Pin 1 sits at
/// -2.54 mm and pin 2 at +2.54 mm from the anchor in the library drawings.
const TWO_TERMINAL_PARTS: &[&str] = &[
    "R",
    "R_Small",
    "C",
    "C_Small",
    "C_Polarized",
    "L",
    "L_Small",
    "D",
    "D_Small",
    "D_Schottky",
    "D_Zener",
    "LED",
    "Fuse",
];

/// Whether a library id names a supported two-terminal part.
pub fn is_two_terminal(lib_id: &str) -> bool {
    let name = lib_id.rsplit(':').next().unwrap_or(lib_id);
    TWO_TERMINAL_PARTS.contains(&name)
}

/// Symbol-relative offset for a pin of a two-terminal part.
///
/// Accepts pin numbers as well as the conventional polarity names so that a
/// planner may say `D1:A` instead of `D1:1`.
fn two_terminal_offset(pin: &str) -> Option<Point> {
    match pin {
        "1" | "A" | "+" => Some(Point::new(-GRID_MM, 0.0)),
        "2" | "K" | "-" => Some(Point::new(GRID_MM, 0.0)),
        _ => None,
    }
}

/// Resolve a pin identifier on a symbol to an absolute sheet coordinate.
///
/// Rotation and mirroring of the symbol are applied to the relative offset;
/// returning library-space coordinates here is exactly the bug class this
/// function exists to prevent.
pub fn resolve_pin(symbol: &SchSymbol, pin: &str) -> Result<Point, ResolveError> {
    if is_two_terminal(&symbol.lib_id) {
        if let Some(offset) = two_terminal_offset(pin) {
            return Ok(symbol.position.place(offset));
        }
    }

    // Pin table lookup: name match wins over number match.
    let found = symbol
        .pins
        .iter()
        .find(|p| p.is_named() && p.name == pin)
        .or_else(|| symbol.pins.iter().find(|p| p.number == pin));

    match found {
        Some(p) => {
            if let Some(at) = p.at {
                Ok(symbol.position.place(Point::new(at.x, at.y)))
            } else {
                // Entry exists but carries no coordinates.
                Err(ResolveError::PinUnresolved {
                    reference: symbol.reference.clone(),
                    pin: pin.to_string(),
                })
            }
        }
        None if !symbol.pins.is_empty() => Err(ResolveError::PinUnknown {
            reference: symbol.reference.clone(),
            pin: pin.to_string(),
            available: symbol
                .pins
                .iter()
                .map(|p| {
                    if p.is_named() {
                        format!("{} ({})", p.number, p.name)
                    } else {
                        p.number.clone()
                    }
                })
                .collect(),
        }),
        None => Err(ResolveError::PinUnresolved {
            reference: symbol.reference.clone(),
            pin: pin.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{GridPoint, Position};

    fn symbol(lib_id: &str, x: f64, y: f64, rotation: f64) -> SchSymbol {
        SchSymbol {
            position: Position {
                x,
                y,
                rotation,
                mirror: None,
            },
            ..SchSymbol::new("U1", lib_id)
        }
    }

    #[test]
    fn two_terminal_pins_resolve_without_pin_table() {
        let r = symbol("Device:R", 25.4, 25.4, 0.0);
        assert_eq!(
            resolve_pin(&r, "1").unwrap().grid_key(),
            GridPoint::from_mm(25.4 - GRID_MM, 25.4)
        );
        assert_eq!(
            resolve_pin(&r, "2").unwrap().grid_key(),
            GridPoint::from_mm(25.4 + GRID_MM, 25.4)
        );
    }

    #[test]
    fn diode_polarity_names_map_to_terminals() {
        let d = symbol("Device:LED", 0.0, 0.0, 0.0);
        assert_eq!(
            resolve_pin(&d, "A").unwrap().grid_key(),
            resolve_pin(&d, "1").unwrap().grid_key()
        );
        assert_eq!(
            resolve_pin(&d, "K").unwrap().grid_key(),
            resolve_pin(&d, "2").unwrap().grid_key()
        );
    }

    #[test]
    fn rotation_moves_two_terminal_pins() {
        let r = symbol("Device:R", 10.0, 10.0, 90.0);
        // Pin 1 offset (-2.54, 0) rotated 90 CCW lands below the anchor.
        assert_eq!(
            resolve_pin(&r, "1").unwrap().grid_key(),
            GridPoint::from_mm(10.0, 10.0 - GRID_MM)
        );
    }

    #[test]
    fn pin_table_lookup_prefers_name_over_number() {
        let mut u = symbol("Amp:OPA333", 0.0, 0.0, 0.0);
        u.pins = vec![
            Pin {
                name: "OUT".into(),
                number: "1".into(),
                at: Some(PinAt {
                    x: 7.62,
                    y: 0.0,
                    rotation: None,
                }),
                electrical_type: None,
                hidden: false,
            },
            Pin {
                // A pin *named* "1" must shadow the pin *numbered* "1".
                name: "1".into(),
                number: "3".into(),
                at: Some(PinAt {
                    x: -7.62,
                    y: 2.54,
                    rotation: None,
                }),
                electrical_type: None,
                hidden: false,
            },
        ];
        assert_eq!(
            resolve_pin(&u, "1").unwrap().grid_key(),
            GridPoint::from_mm(-7.62, 2.54)
        );
        assert_eq!(
            resolve_pin(&u, "OUT").unwrap().grid_key(),
            GridPoint::from_mm(7.62, 0.0)
        );
    }

    #[test]
    fn missing_pin_table_yields_pin_unresolved() {
        let u = symbol("Amp:OPA333", 0.0, 0.0, 0.0);
        let err = resolve_pin(&u, "OUT").unwrap_err();
        assert_eq!(
            err,
            ResolveError::PinUnresolved {
                reference: "U1".into(),
                pin: "OUT".into()
            }
        );
    }

    #[test]
    fn populated_table_without_a_match_yields_pin_unknown() {
        let mut u = symbol("Amp:OPA333", 0.0, 0.0, 0.0);
        u.pins = vec![Pin {
            name: "OUT".into(),
            number: "1".into(),
            at: Some(PinAt {
                x: 7.62,
                y: 0.0,
                rotation: None,
            }),
            electrical_type: None,
            hidden: false,
        }];
        match resolve_pin(&u, "99").unwrap_err() {
            ResolveError::PinUnknown { pin, available, .. } => {
                assert_eq!(pin, "99");
                assert_eq!(available, vec!["1 (OUT)"]);
            }
            other => panic!("expected PinUnknown, got {other:?}"),
        }
    }

    #[test]
    fn coordinate_less_entry_stays_unresolved() {
        // The table names the pin but gives it no position.
        let mut u = symbol("Amp:OPA333", 0.0, 0.0, 0.0);
        u.pins = vec![Pin {
            name: "OUT".into(),
            number: "1".into(),
            at: None,
            electrical_type: None,
            hidden: false,
        }];
        assert!(matches!(
            resolve_pin(&u, "OUT").unwrap_err(),
            ResolveError::PinUnresolved { .. }
        ));
    }
}
