//! Route configuration: instruction lists, skippable legs and announcement text.

use crate::{ExecutorConfig, PatrolError, PatrolPlan, Result, SkipPolicy};
use anyhow::Context;
use core::fmt;
use core::str::FromStr;
use path_compiler::compile_tokens;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Patrol routes selectable from the mode controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Corridor,
    Expo,
}

impl Route {
    pub const ALL: [Route; 2] = [Route::Corridor, Route::Expo];

    pub fn name(&self) -> &'static str {
        match self {
            Route::Corridor => "corridor",
            Route::Expo => "expo",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Route {
    type Err = PatrolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "corridor" => Ok(Route::Corridor),
            "expo" => Ok(Route::Expo),
            other => Err(PatrolError::UnknownRoute(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcements {
    pub start: String,
    pub skip: String,
    pub finished: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Tokens such as "M 1.5", "L", "R"
    pub instructions: Vec<String>,
    #[serde(default)]
    pub skippable: SkipPolicy,
    pub announcements: Announcements,
    #[serde(default = "default_step_prefix")]
    pub step_prefix: String,
}

fn default_step_prefix() -> String {
    "Step".to_string()
}

impl RouteConfig {
    pub fn corridor() -> Self {
        let instructions = [
            "M 1.365", "L", "M 4.095", "L", "M 1.365", "R", "M 2.475", "R", "M 13.65", "L",
            "M 0.6825", "L", "M 32.76", "L", "M 7.965", "R", "M 2.73", "R", "M 7.735", "L",
            "M 20.475", "L", "M 21.385", "R", "M 0.455", "R", "M 21.385", "R", "M 43.225", "R",
            "M 2.93", "L", "M 1.365", "R", "M 4.095", "R", "M 1.365",
        ];
        Self {
            instructions: instructions.iter().map(|s| s.to_string()).collect(),
            // Doorway legs that trip false obstacle detection
            skippable: SkipPolicy::legs([4, 5, 11, 12]),
            announcements: Announcements {
                start: "Starting patrol in 3 seconds.".to_string(),
                skip: "Skipping.".to_string(),
                finished: "Patrol finished.".to_string(),
            },
            step_prefix: default_step_prefix(),
        }
    }

    pub fn expo() -> Self {
        let instructions = [
            "M 11.25", "L", "M 7.65", "L", "M 4.05", "R", "M 3.6", "L", "M 4.05", "L", "M 11.25",
            "R", "M 3.15",
        ];
        Self {
            instructions: instructions.iter().map(|s| s.to_string()).collect(),
            skippable: SkipPolicy::none(),
            announcements: Announcements {
                start: "Starting Expo patrol in 3 seconds.".to_string(),
                skip: "Skipping.".to_string(),
                finished: "Expo Patrol finished.".to_string(),
            },
            step_prefix: "Expo Step".to_string(),
        }
    }

    pub fn builtin(route: Route) -> Self {
        match route {
            Route::Corridor => Self::corridor(),
            Route::Expo => Self::expo(),
        }
    }

    /// Compile the instruction list into a runnable plan.
    pub fn plan(&self, name: &str) -> Result<PatrolPlan> {
        let waypoints = compile_tokens(self.instructions.as_slice())?;
        if let Some(out_of_range) = self.skippable.iter().find(|&leg| leg >= waypoints.len()) {
            tracing::warn!(
                "Route {} marks leg {} skippable but has only {} legs",
                name,
                out_of_range,
                waypoints.len()
            );
        }
        Ok(PatrolPlan {
            route: name.to_string(),
            waypoints,
            skippable: self.skippable.clone(),
            announcements: self.announcements.clone(),
            step_prefix: self.step_prefix.clone(),
        })
    }
}

fn builtin_routes() -> BTreeMap<Route, RouteConfig> {
    Route::ALL
        .iter()
        .map(|&r| (r, RouteConfig::builtin(r)))
        .collect()
}

/// Executor settings plus the configured routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteBook {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default = "builtin_routes")]
    pub routes: BTreeMap<Route, RouteConfig>,
}

impl Default for RouteBook {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RouteBook {
    pub fn builtin() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            routes: builtin_routes(),
        }
    }

    /// Load a YAML route book; a missing file yields the built-in routes.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No route file at {}, using built-in routes", path.display());
            return Ok(Self::builtin());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading route file: {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let book: RouteBook = serde_yaml::from_str(raw)?;
        Ok(book)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn get(&self, route: Route) -> Option<&RouteConfig> {
        self.routes.get(&route)
    }

    pub fn plan(&self, route: Route) -> Result<PatrolPlan> {
        let config = self
            .get(route)
            .ok_or_else(|| PatrolError::UnknownRoute(route.to_string()))?;
        config.plan(route.name())
    }
}
