//! TOML camera policy file.
//!
//! ```toml
//! [[camera]]
//! id = "front-door"
//! classes = ["person", "car"]
//! default_threshold = 0.5
//! thresholds = { car = 0.7 }
//! active_window = { start = "22:00", end = "06:00" }
//! zones = [[[0, 0], [640, 0], [640, 480], [0, 480]]]
//! masks = [[[0, 0], [100, 0], [100, 100], [0, 100]]]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use super::{CameraPolicy, Polygon, TimeWindow};
use crate::detect::classes::class_index;

#[derive(Debug, Deserialize, Default)]
struct PolicyFile {
    #[serde(default, rename = "camera")]
    cameras: Vec<CameraPolicyFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CameraPolicyFile {
    id: String,
    #[serde(default)]
    classes: Vec<String>,
    default_threshold: Option<f32>,
    #[serde(default)]
    thresholds: HashMap<String, f32>,
    active_window: Option<WindowFile>,
    #[serde(default)]
    zones: Vec<Vec<[f64; 2]>>,
    #[serde(default)]
    masks: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Deserialize)]
struct WindowFile {
    start: String,
    end: String,
}

pub fn read_policy_file(path: &Path) -> Result<Vec<CameraPolicy>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file {}", path.display()))?;
    parse_policy_file(&raw).with_context(|| format!("invalid policy file {}", path.display()))
}

pub fn parse_policy_file(raw: &str) -> Result<Vec<CameraPolicy>> {
    let file: PolicyFile = toml::from_str(raw).context("parse policy TOML")?;
    let mut seen = HashSet::new();
    let mut policies = Vec::with_capacity(file.cameras.len());
    for camera in file.cameras {
        if !seen.insert(camera.id.clone()) {
            return Err(anyhow!("camera '{}' is defined more than once", camera.id));
        }
        let id = camera.id.clone();
        policies.push(camera.into_policy().with_context(|| format!("camera '{}'", id))?);
    }
    Ok(policies)
}

impl CameraPolicyFile {
    fn into_policy(self) -> Result<CameraPolicy> {
        let mut policy = CameraPolicy::new(&self.id)?;
        if let Some(default) = self.default_threshold {
            policy = policy.with_default_threshold(default)?;
        }

        let mut selected_names = HashSet::new();
        for name in &self.classes {
            let idx = lookup_class(name)?;
            selected_names.insert(idx);
            policy = policy.select(idx, None)?;
        }
        for (name, threshold) in &self.thresholds {
            let idx = lookup_class(name)?;
            if !selected_names.contains(&idx) {
                return Err(anyhow!(
                    "threshold given for class '{}' which is not in classes",
                    name
                ));
            }
            policy = policy.select(idx, Some(*threshold))?;
        }

        if let Some(window) = self.active_window {
            policy = policy.with_window(TimeWindow::parse(&window.start, &window.end)?);
        }
        for zone in self.zones {
            policy = policy.with_zone(to_polygon(zone).context("zone")?);
        }
        for mask in self.masks {
            policy = policy.with_mask(to_polygon(mask).context("mask")?);
        }
        Ok(policy)
    }
}

fn lookup_class(name: &str) -> Result<u32> {
    class_index(name).ok_or_else(|| anyhow!("unknown class '{}'", name))
}

fn to_polygon(points: Vec<[f64; 2]>) -> Result<Polygon> {
    Polygon::new(points.into_iter().map(|[x, y]| (x, y)).collect())
}
