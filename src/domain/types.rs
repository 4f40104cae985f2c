use serde::{Deserialize, Serialize};

/// Closed set of element variants a network may contain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ElementKind {
    Battery,
    Grid,
    Photovoltaics,
    ConstantLoad,
    ForecastLoad,
    Node,
    Connection,
    Inverter,
}

impl ElementKind {
    /// Links carry flow between two endpoints instead of owning a terminal.
    pub fn is_link(self) -> bool {
        matches!(self, ElementKind::Connection | ElementKind::Inverter)
    }

    pub fn is_node(self) -> bool {
        matches!(self, ElementKind::Node)
    }
}
