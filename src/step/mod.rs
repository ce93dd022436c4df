//! STEP references in generated programs
//!
//! The first evaluation pass only builds placeholders for STEP bodies. The
//! references recovered from the program text list which files a run will
//! import and how each body is placed and finished.

pub mod library;

pub use library::{StepConfig, StepLibrary};

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use shapedelta_core::StepRotation;
use std::collections::HashMap;

static MAKE_STEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*(\w+)\s*=\s*csg\.makeStep\("([^"]*)"\)(.*)$"#).expect("makeStep pattern is valid")
});

static ROTATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.rotate\(\s*\[([^\]]*)\]\s*,\s*\[([^\]]*)\]\s*,\s*([^)]+?)\s*\)").expect("rotate pattern is valid")
});

static TRANSLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.translate\(\s*\[([^\]]*)\]\s*\)").expect("translate pattern is valid"));

static DISPLAY_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bdisplay(Fillet)?\(\s*(\w+)\s*,\s*"([^"]*)"(?:\s*,\s*([^)]+?))?\s*\)"#)
        .expect("display pattern is valid")
});

/// A displayed STEP body found in a program
#[derive(Debug, Clone, PartialEq)]
pub struct StepReference {
    /// Program variable holding the body
    pub shape_name: String,
    /// Display id
    pub id: String,
    pub guid: String,
    pub rotation: Option<StepRotation>,
    pub translation: Option<[f64; 3]>,
    /// Set when the body is displayed through `displayFillet`
    pub fillet_factor: Option<f64>,
}

struct DisplayCall {
    id: String,
    fillet_factor: Option<f64>,
}

fn parse_vector(text: &str) -> Option<[f64; 3]> {
    let values: Vec<f64> = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    <[f64; 3]>::try_from(values).ok()
}

/// First display call per variable
fn display_calls(text: &str) -> HashMap<&str, DisplayCall> {
    let mut calls = HashMap::new();
    for captures in DISPLAY_CALL.captures_iter(text) {
        let (Some(variable), Some(id)) = (captures.get(2), captures.get(3)) else {
            continue;
        };
        let fillet_factor = match (captures.get(1), captures.get(4)) {
            (Some(_), Some(factor)) => factor.as_str().trim().parse::<f64>().ok(),
            _ => None,
        };
        calls.entry(variable.as_str()).or_insert(DisplayCall {
            id: id.as_str().to_string(),
            fillet_factor,
        });
    }
    calls
}

/// Finds every `v = csg.makeStep("guid")...` statement whose variable is displayed
pub fn extract_step_references(text: &str) -> Vec<StepReference> {
    let mut references = Vec::new();
    let displays = display_calls(text);

    for captures in MAKE_STEP.captures_iter(text) {
        let shape_name = captures[1].to_string();
        let guid = captures[2].to_string();
        let rest = &captures[3];

        let Some(display) = displays.get(shape_name.as_str()) else {
            continue;
        };
        let id = display.id.clone();

        let rotation = match ROTATE.captures(rest) {
            Some(rot) => {
                let center = parse_vector(&rot[1]);
                let axis = parse_vector(&rot[2]);
                let angle = rot[3].trim().parse::<f64>().ok();
                match (center, axis, angle) {
                    (Some(center), Some(axis), Some(angle)) => Some(StepRotation { center, axis, angle }),
                    _ => {
                        warn!("Ignoring unparsable rotation for STEP {} ({})", guid, id);
                        None
                    }
                }
            }
            None => None,
        };

        let translation = match TRANSLATE.captures(rest) {
            Some(tr) => {
                let offset = parse_vector(&tr[1]);
                if offset.is_none() {
                    warn!("Ignoring unparsable translation for STEP {} ({})", guid, id);
                }
                offset
            }
            None => None,
        };

        references.push(StepReference {
            shape_name,
            id,
            guid,
            rotation,
            translation,
            fillet_factor: display.fillet_factor,
        });
    }

    references
}
