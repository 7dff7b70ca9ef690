//! Optional per-world subsystems.
//!
//! A feature is enabled at most once per world and gets a cleanup hook that
//! runs once per tick, after every system has run.

use std::any::{Any, TypeId, type_name};

use tracing::debug;

use crate::error::{BoxError, EcsError, EcsResult};

/// A pluggable per-world subsystem.
pub trait WorldFeature: Any + Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Called once when the feature is enabled.
    fn initialize(&mut self) {}

    /// Called once per tick by [`World::cleanup_update`](crate::World::cleanup_update).
    fn on_cleanup_update(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called once when the feature is disabled or the world is dropped.
    fn dispose(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Enabled features, in the order they were enabled.
#[derive(Default)]
pub struct FeatureRegistry {
    features: Vec<(TypeId, Box<dyn WorldFeature>)>,
}

impl FeatureRegistry {
    fn position<F: WorldFeature>(&self) -> Option<usize> {
        let type_id = TypeId::of::<F>();
        self.features.iter().position(|(id, _)| *id == type_id)
    }

    pub(crate) fn enable<F: WorldFeature>(&mut self, mut feature: F) -> EcsResult<()> {
        if self.position::<F>().is_some() {
            return Err(EcsError::FeatureAlreadyEnabled(feature.name()));
        }
        feature.initialize();
        debug!(feature = feature.name(), "enabled world feature");
        self.features.push((TypeId::of::<F>(), Box::new(feature)));
        Ok(())
    }

    pub(crate) fn disable<F: WorldFeature>(&mut self) -> bool {
        let Some(pos) = self.position::<F>() else {
            return false;
        };
        let (_, mut feature) = self.features.remove(pos);
        feature.dispose();
        debug!(feature = feature.name(), "disabled world feature");
        true
    }

    #[must_use]
    pub fn get<F: WorldFeature>(&self) -> Option<&F> {
        let pos = self.position::<F>()?;
        self.features[pos].1.as_any().downcast_ref()
    }

    pub fn get_mut<F: WorldFeature>(&mut self) -> Option<&mut F> {
        let pos = self.position::<F>()?;
        self.features[pos].1.as_any_mut().downcast_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Run every cleanup hook. A failing feature does not stop the ones
    /// after it; the first failure is returned.
    pub(crate) fn cleanup_update(&mut self) -> EcsResult<()> {
        let mut first_error = None;
        for (_, feature) in &mut self.features {
            if let Err(source) = feature.on_cleanup_update() {
                first_error.get_or_insert(EcsError::Feature {
                    name: feature.name(),
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) fn dispose_all(&mut self) {
        for (_, mut feature) in self.features.drain(..).rev() {
            feature.dispose();
        }
    }
}
