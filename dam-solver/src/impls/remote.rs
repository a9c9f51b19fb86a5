use crate::formulation::Formulation;
use crate::{Backend, BackendError, Incumbent, SolveOutcome, SolveSettings, Termination};
use dam_core::models::Map;
use std::time::{Duration, Instant};

// Extra time granted to the HTTP round trip on top of the engine time limit
const TRANSPORT_GRACE: Duration = Duration::from_secs(60);

/// Submits formulations to a remote solve service.
///
/// The model travels as CPLEX LP text together with the solve settings and
/// any variable values already known, which the service may use as a warm
/// start. The reply maps variable names to values.
#[derive(Clone, Debug)]
pub struct RemoteSolver {
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[derive(serde::Serialize)]
struct SolveRequest<'a> {
    name: &'a str,
    model: String,
    time_limit: f64,
    mip_gap: f64,
    feasibility_tolerance: f64,
    optimality_tolerance: f64,
    cutoff: Option<f64>,
    warm_start: Map<&'a str, f64>,
}

#[derive(serde::Deserialize)]
struct SolveReply {
    status: Termination,
    #[serde(default)]
    bound: Option<f64>,
    #[serde(default)]
    values: Map<String, f64>,
}

impl RemoteSolver {
    /// A client for the service at `endpoint`, waiting at most `time_limit` plus a grace period
    pub fn new(endpoint: impl Into<String>, time_limit: Duration) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(time_limit + TRANSPORT_GRACE)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    fn request<'a>(
        &self,
        formulation: &'a Formulation,
        settings: &SolveSettings,
    ) -> Result<SolveRequest<'a>, BackendError> {
        let mut model = Vec::new();
        formulation
            .write_lp(&mut model)
            .map_err(|error| BackendError::Protocol(error.to_string()))?;
        let model =
            String::from_utf8(model).map_err(|error| BackendError::Protocol(error.to_string()))?;

        let warm_start = formulation
            .variables()
            .iter()
            .filter_map(|v| v.value().map(|value| (v.name(), value)))
            .collect();

        Ok(SolveRequest {
            name: formulation.name(),
            model,
            time_limit: settings.time_limit.as_secs_f64(),
            mip_gap: settings.mip_gap,
            feasibility_tolerance: settings.feasibility_tolerance,
            optimality_tolerance: settings.optimality_tolerance,
            cutoff: settings.cutoff,
            warm_start,
        })
    }
}

impl Backend for RemoteSolver {
    fn name(&self) -> &str {
        &self.endpoint
    }

    fn solve(
        &self,
        formulation: &Formulation,
        settings: &SolveSettings,
    ) -> Result<SolveOutcome, BackendError> {
        let request = self.request(formulation, settings)?;
        let start = Instant::now();
        let reply: SolveReply = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()?
            .error_for_status()?
            .json()?;
        let elapsed = start.elapsed();

        match reply.status {
            Termination::Optimal | Termination::Feasible => {
                let values = formulation
                    .variables()
                    .iter()
                    .map(|v| {
                        reply.values.get(v.name()).copied().ok_or_else(|| {
                            BackendError::Protocol(format!("no value for variable {}", v.name()))
                        })
                    })
                    .collect::<Result<Vec<f64>, _>>()?;
                let objective = formulation.objective_at(&values);
                Ok(SolveOutcome {
                    termination: reply.status,
                    incumbent: Some(Incumbent { values, objective }),
                    bound: reply.bound,
                    elapsed,
                })
            }
            status => Ok(SolveOutcome::without_incumbent(status, elapsed)),
        }
    }
}
