//! Explicit factory from element declarations to element instances.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::ElementConfig;
use crate::domain::{
    Battery, Connection, ConstantLoad, Element, ElementKind, ForecastLoad, Grid, Inverter, Node,
    Periods, Photovoltaics,
};
use crate::error::NetworkError;
use crate::forecast::resample::SeriesKind;
use crate::forecast::sources::{LiveState, ValueSource};

/// Everything a constructor may read while instantiating one element.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub periods: &'a Periods,
    pub state: &'a LiveState,
    pub now: DateTime<Utc>,
    pub max_state_age: Option<Duration>,
}

impl<'a> BuildContext<'a> {
    pub fn new(periods: &'a Periods, state: &'a LiveState, now: DateTime<Utc>) -> Self {
        Self {
            periods,
            state,
            now,
            max_state_age: None,
        }
    }

    pub fn with_max_state_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_state_age = max_age;
        self
    }

    /// Current scalar value of `source` on behalf of `element`.
    pub fn current(&self, element: &str, source: &ValueSource) -> Result<f64, NetworkError> {
        source
            .current(self.state, self.now, self.max_state_age)
            .map_err(|e| NetworkError::data(element, e.to_string()))
    }

    /// Per-period values of `source` on behalf of `element`.
    pub fn series(
        &self,
        element: &str,
        source: &ValueSource,
        kind: SeriesKind,
    ) -> Result<Vec<f64>, NetworkError> {
        source
            .series(self.state, kind, self.periods, self.now, self.max_state_age)
            .map_err(|e| NetworkError::data(element, format!("{kind} series: {e}")))
    }
}

pub type Constructor = fn(&ElementConfig, &BuildContext<'_>) -> Result<Element, NetworkError>;

/// Maps each [`ElementKind`] to its constructor.
///
/// Built once at startup and handed to the graph builder.
#[derive(Clone, Default)]
pub struct ElementRegistry {
    constructors: HashMap<ElementKind, Constructor>,
}

impl std::fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.constructors.keys().collect();
        kinds.sort();
        f.debug_struct("ElementRegistry").field("kinds", &kinds).finish()
    }
}

fn mismatch(expected: ElementKind, config: &ElementConfig) -> NetworkError {
    NetworkError::Internal(format!(
        "{expected} constructor received a {} declaration",
        config.kind()
    ))
}

macro_rules! constructor {
    ($fn_name:ident, $variant:ident, |$cfg:ident, $ctx:ident| $body:expr) => {
        fn $fn_name(
            config: &ElementConfig,
            #[allow(unused_variables)] $ctx: &BuildContext<'_>,
        ) -> Result<Element, NetworkError> {
            match config {
                ElementConfig::$variant($cfg) => Ok(Element::$variant($body)),
                other => Err(mismatch(ElementKind::$variant, other)),
            }
        }
    };
}

constructor!(build_battery, Battery, |c, ctx| Battery::from_config(c, ctx)?);
constructor!(build_grid, Grid, |c, ctx| Grid::from_config(c, ctx)?);
constructor!(build_photovoltaics, Photovoltaics, |c, ctx| {
    Photovoltaics::from_config(c, ctx)?
});
constructor!(build_constant_load, ConstantLoad, |c, ctx| ConstantLoad::from_config(c));
constructor!(build_forecast_load, ForecastLoad, |c, ctx| {
    ForecastLoad::from_config(c, ctx)?
});
constructor!(build_node, Node, |c, ctx| Node::new(&c.name));
constructor!(build_connection, Connection, |c, ctx| Connection::from_config(c)?);
constructor!(build_inverter, Inverter, |c, ctx| Inverter::from_config(c)?);

impl ElementRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in element kind.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(ElementKind::Battery, build_battery);
        registry.register(ElementKind::Grid, build_grid);
        registry.register(ElementKind::Photovoltaics, build_photovoltaics);
        registry.register(ElementKind::ConstantLoad, build_constant_load);
        registry.register(ElementKind::ForecastLoad, build_forecast_load);
        registry.register(ElementKind::Node, build_node);
        registry.register(ElementKind::Connection, build_connection);
        registry.register(ElementKind::Inverter, build_inverter);
        registry
    }

    pub fn register(&mut self, kind: ElementKind, constructor: Constructor) {
        self.constructors.insert(kind, constructor);
    }

    pub fn contains(&self, kind: ElementKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    pub fn build(
        &self,
        config: &ElementConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Element, NetworkError> {
        let kind = config.kind();
        let constructor = self.constructors.get(&kind).ok_or_else(|| {
            NetworkError::configuration(format!(
                "element `{}` has unregistered kind `{kind}`",
                config.name()
            ))
        })?;
        constructor(config, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HorizonSpec, NodeConfig, TierSpec};
    use strum::IntoEnumIterator;

    #[test]
    fn test_standard_registry_covers_every_kind() {
        let registry = ElementRegistry::standard();
        for kind in ElementKind::iter() {
            assert!(registry.contains(kind), "{kind} missing");
        }
    }

    #[test]
    fn test_unregistered_kind_is_configuration_error() {
        let periods = HorizonSpec::new(vec![TierSpec::minutes(1, 60).unwrap()])
            .unwrap()
            .build(Utc::now());
        let state = LiveState::new();
        let ctx = BuildContext::new(&periods, &state, Utc::now());
        let config = ElementConfig::Node(NodeConfig { name: "bus".into() });

        let err = ElementRegistry::empty().build(&config, &ctx).unwrap_err();
        assert!(matches!(err, NetworkError::Configuration(_)));

        let node = ElementRegistry::standard().build(&config, &ctx).unwrap();
        assert_eq!(node.kind(), ElementKind::Node);
        assert_eq!(node.name(), "bus");
    }

    #[test]
    fn test_constructor_rejects_foreign_declaration() {
        let periods = HorizonSpec::new(vec![TierSpec::minutes(1, 60).unwrap()])
            .unwrap()
            .build(Utc::now());
        let state = LiveState::new();
        let ctx = BuildContext::new(&periods, &state, Utc::now());
        let mut registry = ElementRegistry::empty();
        registry.register(ElementKind::Node, build_grid);

        let err = registry
            .build(&ElementConfig::Node(NodeConfig { name: "bus".into() }), &ctx)
            .unwrap_err();
        assert!(matches!(err, NetworkError::Internal(_)));
    }
}
