use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub type AppId = String;
pub type RoleName = String;
pub type CloneIndex = u32;

/// Role-scoped clone identity, `role.index`.
///
/// Treat as opaque: take it from a backend response and hand it back
/// unchanged. Only the backend composes new ids; the `From` conversions
/// exist for ids that arrive as text (CLI input, stored reports) and carry
/// no authority of their own. An id the backend never issued is rejected
/// with `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloneId(String);

impl CloneId {
    pub(crate) fn compose(role_name: &str, index: CloneIndex) -> Self {
        Self(format!("{}.{}", role_name, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id into role and index, for diagnostics only.
    pub fn parts(&self) -> Option<(&str, CloneIndex)> {
        let (role, index) = self.0.rsplit_once('.')?;
        if role.is_empty() {
            return None;
        }
        index.parse().ok().map(|index| (role, index))
    }
}

impl fmt::Display for CloneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CloneId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CloneId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Creation identity of a cell, assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either identity of a clone; archive and restore accept both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "id", rename_all = "snake_case")]
pub enum CloneCellRef {
    CloneId(CloneId),
    CellId(CellId),
}

impl CloneCellRef {
    pub fn is_blank(&self) -> bool {
        match self {
            CloneCellRef::CloneId(id) => id.as_str().trim().is_empty(),
            CloneCellRef::CellId(id) => id.as_str().trim().is_empty(),
        }
    }
}

impl fmt::Display for CloneCellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneCellRef::CloneId(id) => write!(f, "{}", id),
            CloneCellRef::CellId(id) => write!(f, "cell {}", id),
        }
    }
}

impl From<CloneId> for CloneCellRef {
    fn from(id: CloneId) -> Self {
        CloneCellRef::CloneId(id)
    }
}

impl From<CellId> for CloneCellRef {
    fn from(id: CellId) -> Self {
        CloneCellRef::CellId(id)
    }
}

/// Opaque creation-time configuration of a clone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(BTreeMap<String, Value>);

impl Modifiers {
    pub const NETWORK_SEED: &'static str = "network_seed";
    pub const PROPERTIES: &'static str = "properties";
    pub const ORIGIN_TIME: &'static str = "origin_time";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set the network seed
    pub fn network_seed(self, seed: &str) -> Self {
        self.with(Self::NETWORK_SEED, Value::String(seed.to_string()))
    }

    /// Set application properties
    pub fn properties(self, properties: Value) -> Self {
        self.with(Self::PROPERTIES, properties)
    }

    /// Set origin time in microseconds
    pub fn origin_time(self, micros: i64) -> Self {
        self.with(Self::ORIGIN_TIME, Value::from(micros))
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneState {
    Active,
    Archived,
}

impl fmt::Display for CloneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneState::Active => f.write_str("active"),
            CloneState::Archived => f.write_str("archived"),
        }
    }
}

/// A clone instance as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneCell {
    pub clone_id: CloneId,
    pub cell_id: CellId,
    pub role_name: RoleName,
    pub index: CloneIndex,
    pub modifiers: Modifiers,
    pub state: CloneState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CloneCell {
    pub fn is_active(&self) -> bool {
        self.state == CloneState::Active
    }

    pub fn matches(&self, target: &CloneCellRef) -> bool {
        match target {
            CloneCellRef::CloneId(id) => &self.clone_id == id,
            CloneCellRef::CellId(id) => &self.cell_id == id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleView {
    pub role_name: RoleName,
    pub clone_limit: u32,
    pub clones: Vec<CloneCell>,
}

impl RoleView {
    pub fn active(&self) -> impl Iterator<Item = &CloneCell> {
        self.clones.iter().filter(|c| c.is_active())
    }

    pub fn archived(&self) -> impl Iterator<Item = &CloneCell> {
        self.clones.iter().filter(|c| !c.is_active())
    }

    pub fn at_capacity(&self) -> bool {
        self.clones.len() >= self.clone_limit as usize
    }
}

/// Point-in-time view of one installed application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationView {
    pub app_id: AppId,
    pub roles: BTreeMap<RoleName, RoleView>,
}

impl ApplicationView {
    pub fn role(&self, role_name: &str) -> Option<&RoleView> {
        self.roles.get(role_name)
    }

    pub fn find(&self, target: &CloneCellRef) -> Option<&CloneCell> {
        self.roles
            .values()
            .flat_map(|role| role.clones.iter())
            .find(|clone| clone.matches(target))
    }

    pub fn clone_count(&self, role_name: &str) -> usize {
        self.role(role_name).map_or(0, |role| role.clones.len())
    }
}
