//! Shared application state for the CERTIFY daemon.
//!
//! Built once from the validated config: registers the bootstrap flows with
//! the dispatcher and prepares the relay and ERA contexts.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use certify_core::error::Result;
use certify_core::protocol::bootstrap::BootstrapCode;

use crate::config::CertifyConfig;
use crate::dispatch::Dispatcher;
use crate::era::{EraAgent, SecurityApiInterface};
use crate::obs::CertifyMetrics;
use crate::relay::RelayContext;
use crate::services::{
    AaManager, HighEndFlow, KeyDerivation, LowEndAFlow, LowEndBFlow, LowEndBackend, LowEndBootstrap,
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    dispatcher: Arc<Dispatcher>,
    relay: Arc<RelayContext>,
    era: Arc<EraAgent>,
}

struct AppStateInner {
    cfg: CertifyConfig,
    lenode_key: Vec<u8>,
    metrics: Arc<CertifyMetrics>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build application state with the executable-backed key derivation.
    pub fn new(cfg: CertifyConfig) -> Result<Self> {
        let deriver: Arc<dyn KeyDerivation> = Arc::new(AaManager::new(&cfg.bootstrap.aa_manager));
        Self::with_key_derivation(cfg, deriver)
    }

    /// Build application state around a given key-derivation backend.
    pub fn with_key_derivation(cfg: CertifyConfig, deriver: Arc<dyn KeyDerivation>) -> Result<Self> {
        let low_end: Arc<dyn LowEndBootstrap> = Arc::new(LowEndBackend::new(&cfg.bootstrap.low_end_a));
        Self::with_collaborators(cfg, deriver, low_end)
    }

    /// Build application state around given external enrolment collaborators.
    pub fn with_collaborators(
        cfg: CertifyConfig,
        deriver: Arc<dyn KeyDerivation>,
        low_end: Arc<dyn LowEndBootstrap>,
    ) -> Result<Self> {
        let metrics = Arc::new(CertifyMetrics::default());
        let shutdown = CancellationToken::new();
        let lenode_key = cfg.lenode.msk()?;

        let dispatcher = Dispatcher::new(cfg.bootstrap.max_frame_bytes, Arc::clone(&metrics));
        let report_success = cfg.bootstrap.aa_manager.report_success;

        // (1) high-end devices: one flow per derived key
        dispatcher.register(Arc::new(HighEndFlow::new(
            BootstrapCode::HighEndPrimary,
            cfg.bootstrap.psk_key.clone(),
            Arc::clone(&deriver),
            report_success,
        )));
        dispatcher.register(Arc::new(HighEndFlow::new(
            BootstrapCode::HighEndSecondary,
            cfg.bootstrap.msk_key.clone(),
            deriver,
            report_success,
        )));

        // (2) low-end COTS devices, enrolled by an external backend
        dispatcher.register(Arc::new(LowEndAFlow::new(low_end)));

        // (3) RISC-V le-nodes
        dispatcher.register(Arc::new(LowEndBFlow::new(
            lenode_key.clone(),
            cfg.lenode.max_payload_bytes,
            Arc::clone(&metrics),
        )));

        for code in BootstrapCode::ALL {
            if !dispatcher.registered_codes().contains(&code) {
                tracing::warn!(code = code.as_str(), "no bootstrap flow registered");
            }
        }

        let relay = RelayContext::from_config(&cfg.relay, Arc::clone(&metrics), shutdown.clone())?;
        let era = EraAgent::new(
            Arc::new(SecurityApiInterface::new(cfg.era.program.clone())),
            cfg.era.decrypt,
            Arc::clone(&metrics),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                lenode_key,
                metrics,
                shutdown,
            }),
            dispatcher: Arc::new(dispatcher),
            relay: Arc::new(relay),
            era: Arc::new(era),
        })
    }

    pub fn cfg(&self) -> &CertifyConfig {
        &self.inner.cfg
    }

    pub fn lenode_key(&self) -> &[u8] {
        &self.inner.lenode_key
    }

    pub fn metrics(&self) -> &CertifyMetrics {
        &self.inner.metrics
    }

    pub fn shutdown(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn relay(&self) -> Arc<RelayContext> {
        Arc::clone(&self.relay)
    }

    pub fn era(&self) -> Arc<EraAgent> {
        Arc::clone(&self.era)
    }
}
