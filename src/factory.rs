//! Instance factory: session initialization, parameter-set discovery, and
//! per-set instance construction.
//!
//! Initialization joins two independent steps before anything else may
//! proceed: awaiting crypto-provider readiness and compiling the engine
//! module. Either failure is fatal for the whole session.

use std::sync::Arc;

use crate::error::OrchestratorError;
use crate::host::HostBinding;
use crate::instance::Instance;
use crate::engine::ParameterSetDescriptor;
use crate::provider::CryptoProvider;
use crate::reference_engine::EngineModule;

/// Discovers parameter sets and builds one isolated instance per set.
pub struct InstanceFactory {
    module: Arc<EngineModule>,
    provider: Arc<dyn CryptoProvider>,
}

impl InstanceFactory {
    /// Awaits provider readiness concurrently with compiling the engine
    /// module, then joins both. Runs exactly once per session.
    pub fn initialize(provider: Arc<dyn CryptoProvider>) -> Result<Self, OrchestratorError> {
        let (readiness, module) = rayon::join(|| provider.ready(), EngineModule::compile);
        readiness?;
        Ok(Self { module: Arc::new(module?), provider })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(module: EngineModule, provider: Arc<dyn CryptoProvider>) -> Self {
        Self { module: Arc::new(module), provider }
    }

    /// Returns the parameter-set manifest in stable discovery order.
    ///
    /// An empty manifest and an unstable order are both configuration
    /// defects, not recoverable conditions.
    pub fn discover(&self) -> Result<Vec<ParameterSetDescriptor>, OrchestratorError> {
        let manifest = self.module.manifest();
        if manifest.is_empty() {
            return Err(OrchestratorError::Discovery(
                "engine module exposes no parameter sets".to_string(),
            ));
        }
        for pair in manifest.windows(2) {
            if pair[0].id >= pair[1].id {
                return Err(OrchestratorError::Discovery(format!(
                    "manifest order is not deterministic: '{}' precedes '{}'",
                    pair[0].id, pair[1].id
                )));
            }
        }
        Ok(manifest)
    }

    /// Builds one instance per discovered parameter set, in discovery order.
    /// Each instance gets a dedicated engine instantiation and host binding.
    pub fn build_all(&self) -> Result<Vec<Instance>, OrchestratorError> {
        self.discover()?
            .iter()
            .map(|descriptor| {
                let binding = HostBinding::new(self.provider.clone());
                let engine = self.module.instantiate(&descriptor.id, binding.clone())?;
                Instance::new(Box::new(engine), binding)
            })
            .collect()
    }
}
