//! # Specs
//!
//! Named specifications a case can be gated on with
//! [`Requirement::Spec`](crate::testing::Requirement::Spec). Mature specs are
//! enabled unless a selection says otherwise. A selection is a comma-separated
//! list such as `path-gateway,+dnslink-gateway,-subdomain-gateway`:
//!
//! - bare names enable only the listed specs,
//! - `+name` enables a spec regardless of its maturity,
//! - `-name` disables it.
//!
//! Naming a collection (`trustless-gateway`) applies to all of its members.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SPECS_VAR: &str = "SPECS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    Wip,
    Draft,
    Reliable,
    Stable,
    Permanent,
    Deprecated,
}

impl Maturity {
    pub fn is_mature(self) -> bool {
        matches!(self, Maturity::Reliable | Maturity::Stable | Maturity::Permanent)
    }
}

impl fmt::Display for Maturity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Maturity::Wip => "wip",
            Maturity::Draft => "draft",
            Maturity::Reliable => "reliable",
            Maturity::Stable => "stable",
            Maturity::Permanent => "permanent",
            Maturity::Deprecated => "deprecated",
        };
        f.write_str(label)
    }
}

/// A spec, or a collection of specs when `members` is not empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    pub name: String,
    pub maturity: Maturity,
    pub members: Vec<String>,
}

impl Spec {
    pub fn leaf(name: impl Into<String>, maturity: Maturity) -> Self {
        Self {
            name: name.into(),
            maturity,
            members: Vec::new(),
        }
    }

    pub fn collection<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            maturity: Maturity::Stable,
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

/// The specs a run knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCatalog {
    specs: Vec<Spec>,
}

impl Default for SpecCatalog {
    fn default() -> Self {
        use Maturity::Stable;
        Self {
            specs: vec![
                Spec::leaf("trustless-block-gateway", Stable),
                Spec::leaf("trustless-car-gateway", Stable),
                Spec::leaf("trustless-ipns-gateway", Stable),
                Spec::collection(
                    "trustless-gateway",
                    [
                        "trustless-block-gateway",
                        "trustless-car-gateway",
                        "trustless-ipns-gateway",
                    ],
                ),
                Spec::leaf("path-gateway", Stable),
                Spec::leaf("dnslink-gateway", Stable),
                Spec::leaf("subdomain-gateway", Stable),
                Spec::leaf("redirects-file", Stable),
                Spec::leaf("ipns-resolver", Stable),
            ],
        }
    }
}

impl SpecCatalog {
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// Add or replace a spec.
    pub fn with(mut self, spec: Spec) -> Self {
        self.specs.retain(|known| known.name != spec.name);
        self.specs.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Spec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Leaf names under `name`; a leaf is its own only member.
    fn leaves<'a>(&'a self, spec: &'a Spec) -> Vec<&'a Spec> {
        if spec.members.is_empty() {
            return vec![spec];
        }
        spec.members
            .iter()
            .filter_map(|member| self.get(member))
            .flat_map(|member| self.leaves(member))
            .collect()
    }
}

/// Which specs are enabled for a run.
#[derive(Debug, Clone)]
pub struct SpecFilter {
    catalog: SpecCatalog,
    overrides: HashMap<String, bool>,
}

impl Default for SpecFilter {
    fn default() -> Self {
        Self {
            catalog: SpecCatalog::default(),
            overrides: HashMap::new(),
        }
    }
}

impl SpecFilter {
    /// Apply a selection; an empty selection keeps maturity defaults.
    pub fn new(catalog: SpecCatalog, selection: &str) -> Result<Self, ConfigError> {
        let mut only = Vec::new();
        let mut enable = Vec::new();
        let mut disable = Vec::new();

        for raw in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (target, name) = match raw.strip_prefix('+') {
                Some(name) => (&mut enable, name),
                None => match raw.strip_prefix('-') {
                    Some(name) => (&mut disable, name),
                    None => (&mut only, raw),
                },
            };
            let spec = catalog.get(name).ok_or_else(|| ConfigError::InvalidValue {
                key: SPECS_VAR.to_string(),
                value: selection.to_string(),
                reason: format!("unknown spec `{name}`"),
            })?;
            target.push(spec.clone());
        }

        let mut filter = Self {
            catalog,
            overrides: HashMap::new(),
        };
        if !only.is_empty() {
            let all: Vec<Spec> = filter.catalog.specs.clone();
            for spec in &all {
                filter.set(spec, false);
            }
            for spec in &only {
                filter.set(spec, true);
            }
        }
        for spec in &enable {
            filter.set(spec, true);
        }
        for spec in &disable {
            filter.set(spec, false);
        }
        Ok(filter)
    }

    fn set(&mut self, spec: &Spec, enabled: bool) {
        let names: Vec<String> = self
            .catalog
            .leaves(spec)
            .into_iter()
            .map(|leaf| leaf.name.clone())
            .collect();
        for name in names {
            self.overrides.insert(name, enabled);
        }
    }

    /// `None` for a spec the catalog does not know.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        let spec = self.catalog.get(name)?;
        let enabled = self.catalog.leaves(spec).into_iter().all(|leaf| {
            self.overrides
                .get(&leaf.name)
                .copied()
                .unwrap_or_else(|| leaf.maturity.is_mature())
        });
        Some(enabled)
    }
}
