use crate::dto::HealthRes;
use mixlab_core::FormulationService;

/// Health checks shared by every API surface.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Liveness: the process is up.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Mixlab is alive".into(),
        }
    }

    /// Readiness: the document store can serve requests.
    pub fn check_ready(service: &FormulationService) -> HealthRes {
        match service.readiness() {
            Ok(()) => HealthRes {
                ok: true,
                message: "Mixlab is ready".into(),
            },
            Err(e) => HealthRes {
                ok: false,
                message: format!("Mixlab is not ready: {e}"),
            },
        }
    }
}
