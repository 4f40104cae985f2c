pub mod battery;
pub mod connection;
pub mod element;
pub mod grid;
pub mod inverter;
pub mod load;
pub mod node;
pub mod period;
pub mod photovoltaics;
pub mod series;
pub mod types;

pub use battery::{Battery, BatteryConfig, CostDecay};
pub use connection::{Connection, ConnectionConfig};
pub use element::{Element, ElementModel, ElementReport, Link, Terminal, VariableSet};
pub use grid::{Grid, GridConfig};
pub use inverter::{Inverter, InverterConfig};
pub use load::{ConstantLoad, ConstantLoadConfig, ForecastLoad, ForecastLoadConfig};
pub use node::{Node, NodeConfig};
pub use period::{HorizonSpec, Period, Periods, TierSpec};
pub use photovoltaics::{Photovoltaics, PhotovoltaicsConfig};
pub use series::{ForecastPoint, TimeSeries};
pub use types::ElementKind;
