//! Launch orchestrator.
//!
//! Sequences one SMART launch: decode -> authorize -> fetch -> normalize -> reconcile -> store ->
//! notify, and publishes `{ state, error, patient }` for the UI shell.
//!
//! ```text
//! Idle -> Decoding -> Authorizing -> FetchingPatient -> Reconciling -> Ready
//!            \______________\_______________\________________________-> Errored
//! ```
//!
//! Network steps run strictly one after another. There are no retries and no timeouts here; the
//! HTTP client's own limits apply. In development runtime mode a failure is logged and the run
//! settles in `Ready` without a patient so the app stays usable; in production it settles in
//! `Errored`.
//!
//! Every run starts from an empty patient context. A newer launch supersedes one still in
//! flight: the older run is dropped at its current await point and never publishes.

use crate::config::{AssistConfig, RuntimeMode};
use crate::error::LaunchError;
use crate::launch::{self, LaunchContext, LaunchParams};
use crate::reconcile::{reconcile, CanonicalPatient};
use crate::session::{AuthorizationRequest, ContextBridge, FhirAuthorizer};
use crate::store::{PatientContextStore, PatientSnapshot};
use crate::user::{AuthenticatedUser, UserDirectory};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LaunchState {
    Idle,
    Decoding,
    Authorizing,
    FetchingPatient,
    Reconciling,
    Ready,
    Errored,
}

impl LaunchState {
    /// `Ready` and `Errored` are terminal for a run.
    pub fn is_settled(self) -> bool {
        matches!(self, LaunchState::Ready | LaunchState::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LaunchState::Idle => "idle",
            LaunchState::Decoding => "decoding",
            LaunchState::Authorizing => "authorizing",
            LaunchState::FetchingPatient => "fetchingPatient",
            LaunchState::Reconciling => "reconciling",
            LaunchState::Ready => "ready",
            LaunchState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for LaunchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the UI shell renders from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchStatus {
    pub state: LaunchState,
    pub error: Option<String>,
    pub patient: PatientSnapshot,
}

impl LaunchStatus {
    fn idle() -> Self {
        Self {
            state: LaunchState::Idle,
            error: None,
            patient: None,
        }
    }

    /// The shell shows its loading indicator until the run settles.
    pub fn is_loading(&self) -> bool {
        !self.state.is_settled()
    }
}

/// Wait until `updates` reports a settled status. Returns `None` if the orchestrator is gone.
pub async fn wait_until_settled(updates: &mut watch::Receiver<LaunchStatus>) -> Option<LaunchStatus> {
    loop {
        {
            let status = updates.borrow_and_update();
            if status.state.is_settled() {
                return Some(status.clone());
            }
        }
        if updates.changed().await.is_err() {
            return None;
        }
    }
}

pub struct LaunchOrchestrator {
    config: Arc<AssistConfig>,
    authorizer: Arc<dyn FhirAuthorizer>,
    bridge: Arc<dyn ContextBridge>,
    users: Option<Arc<dyn UserDirectory>>,
    store: PatientContextStore,
    status: watch::Sender<LaunchStatus>,
    run_lock: Mutex<()>,
    generation: watch::Sender<u64>,
}

impl LaunchOrchestrator {
    pub fn new(
        config: Arc<AssistConfig>,
        authorizer: Arc<dyn FhirAuthorizer>,
        bridge: Arc<dyn ContextBridge>,
        store: PatientContextStore,
    ) -> Self {
        let (status, _) = watch::channel(LaunchStatus::idle());
        let (generation, _) = watch::channel(0);
        Self {
            config,
            authorizer,
            bridge,
            users: None,
            store,
            status,
            run_lock: Mutex::new(()),
            generation,
        }
    }

    /// Consult the signed-in user's affiliations during reconciliation.
    pub fn with_user_directory(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn status(&self) -> LaunchStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LaunchStatus> {
        self.status.subscribe()
    }

    pub fn store(&self) -> &PatientContextStore {
        &self.store
    }

    pub fn config(&self) -> &AssistConfig {
        &self.config
    }

    /// Clear the patient context and return to `Idle`.
    pub fn reset(&self) {
        self.store.clear();
        self.status.send_replace(LaunchStatus::idle());
        tracing::info!("patient context reset");
    }

    /// Run one launch to a settled status.
    ///
    /// Calling this while another run is in flight abandons the older run; it returns the status
    /// current at that moment. A run that is itself superseded before it starts does nothing.
    pub async fn run(&self, params: LaunchParams) -> LaunchStatus {
        let mut generation = 0;
        self.generation.send_modify(|current| {
            *current += 1;
            generation = *current;
        });
        let mut newer = self.generation.subscribe();

        let _guard = self.run_lock.lock().await;
        if *newer.borrow_and_update() != generation {
            return self.status();
        }

        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("smart_launch", %run_id, host_env = %self.config.host_env());
        tokio::select! {
            status = self.run_inner(params.normalized()).instrument(span.clone()) => status,
            _ = newer.changed() => {
                span.in_scope(|| tracing::info!("SMART launch superseded by a newer launch"));
                self.status()
            }
        }
    }

    async fn run_inner(&self, params: LaunchParams) -> LaunchStatus {
        self.store.clear();
        if !self.config.feature_flags().fhir_auth {
            tracing::info!("fhirAuth feature disabled; skipping SMART launch");
            return self.settle_ready(None, None);
        }

        let (raw_launch, iss) = match (params.launch, params.iss) {
            (Some(launch), Some(iss)) => (launch, iss),
            (None, None) => {
                tracing::info!("no launch parameters; running without patient context");
                return self.settle_ready(None, None);
            }
            (launch, iss) => {
                tracing::warn!(
                    has_launch = launch.is_some(),
                    has_iss = iss.is_some(),
                    "incomplete launch parameters; running without patient context"
                );
                return self.settle_ready(None, None);
            }
        };

        self.transition(LaunchState::Decoding);
        let context = match launch::decode(&raw_launch) {
            Ok(context) => context,
            Err(e) => return self.settle_failed(e.into()),
        };
        tracing::debug!(station = context.station_id(), "launch context decoded");

        self.transition(LaunchState::Authorizing);
        let request = AuthorizationRequest::from_config(&self.config, &iss, &raw_launch);
        let session = match self.authorizer.authorize(request).await {
            Ok(session) => session,
            Err(e) => return self.settle_failed(e.into()),
        };
        tracing::info!(%iss, "SMART authorization complete");

        self.transition(LaunchState::FetchingPatient);
        let resource = match session.read_patient().await {
            Ok(resource) => resource,
            Err(e) => return self.settle_failed(e.into()),
        };

        self.transition(LaunchState::Reconciling);
        let user = self.current_user().await;
        let normalized = fhir::normalize(&resource);
        let patient = reconcile(
            Some(&context),
            &normalized,
            resource.resource_id(),
            user.as_ref(),
        );
        let patient = self.publish(patient, &context).await;

        self.settle_ready(Some(patient), None)
    }

    async fn current_user(&self) -> Option<AuthenticatedUser> {
        let users = self.users.as_ref()?;
        match users.current_user().await {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "continuing without authenticated user");
                None
            }
        }
    }

    async fn publish(&self, patient: CanonicalPatient, context: &LaunchContext) -> Arc<CanonicalPatient> {
        let patient = self.store.set(patient);
        tracing::info!(
            station = %patient.station_id,
            launch_station = context.station_id(),
            "patient context resolved"
        );

        if let Err(e) = self.bridge.update_patient(&patient).await {
            tracing::warn!(error = %e, "failed to propagate patient context to container");
        }
        patient
    }

    fn transition(&self, state: LaunchState) {
        tracing::debug!(%state, "launch state");
        self.status.send_replace(LaunchStatus {
            state,
            error: None,
            patient: None,
        });
    }

    fn settle_ready(&self, patient: PatientSnapshot, error: Option<String>) -> LaunchStatus {
        let status = LaunchStatus {
            state: LaunchState::Ready,
            error,
            patient,
        };
        self.status.send_replace(status.clone());
        status
    }

    fn settle_failed(&self, error: LaunchError) -> LaunchStatus {
        let message = error.to_string();
        match self.config.runtime_mode() {
            RuntimeMode::Development => {
                tracing::warn!(
                    error = %message,
                    "SMART launch error - continuing with app for local development"
                );
                self.settle_ready(None, Some(message))
            }
            RuntimeMode::Production => {
                tracing::error!(error = %message, "SMART launch failed");
                let status = LaunchStatus {
                    state: LaunchState::Errored,
                    error: Some(message),
                    patient: None,
                };
                self.status.send_replace(status.clone());
                status
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSources, PkceMode};
    use crate::error::{AuthorizationError, BridgeError, FetchError, UserError};
    use crate::session::FhirSession;
    use crate::user::FacilityAffiliation;
    use async_trait::async_trait;
    use fhir::{HumanName, Identifier, PatientResource};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    const ISS: &str = "https://api.example.com/services/fhir/v0/r4";

    fn config(mode: &str, extra: &[(&str, &str)]) -> Arc<AssistConfig> {
        let mut env: HashMap<String, String> = [
            ("AUTH_CLIENT_ID", "Lighthouse_NP"),
            ("AUTH_SCOPES", "launch fhirUser openid profile patient/Patient.read"),
            ("SMART_CONTAINER_URL", "https://dev.cds.example.com/smart-container/"),
            ("RUNTIME_MODE", mode),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            env.insert(k.to_string(), v.to_string());
        }
        Arc::new(
            AssistConfig::resolve(&ConfigSources::new(HashMap::new(), env)).expect("test config"),
        )
    }

    fn valid_launch() -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD
            .encode(r#"{"patient":"ICN1234567890V123456","sta3n":"673","duz":"DUZ1234567"}"#)
    }

    fn veteran() -> PatientResource {
        PatientResource {
            resource_type: Some("Patient".into()),
            id: Some("1234567890V123456".into()),
            name: vec![HumanName {
                use_type: Some("official".into()),
                family: Some("Veteran".into()),
                given: vec!["John".into(), "Quincy".into()],
            }],
            identifier: vec![Identifier::new(
                "http://example.com/systems/ICN",
                "1234567890V123456",
            )],
            birth_date: Some("1950-01-15".into()),
            ..Default::default()
        }
    }

    struct FakeSession(Result<PatientResource, FetchError>);

    #[async_trait]
    impl FhirSession for FakeSession {
        async fn read_patient(&self) -> Result<PatientResource, FetchError> {
            self.0.clone()
        }
    }

    struct FakeAuthorizer {
        outcome: Result<Result<PatientResource, FetchError>, AuthorizationError>,
        requests: StdMutex<Vec<AuthorizationRequest>>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeAuthorizer {
        fn reading(patient: Result<PatientResource, FetchError>) -> Self {
            Self {
                outcome: Ok(patient),
                requests: StdMutex::new(Vec::new()),
                gate: None,
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                outcome: Err(AuthorizationError::new(message)),
                requests: StdMutex::new(Vec::new()),
                gate: None,
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn calls(&self) -> usize {
            self.requests.lock().expect("requests lock").len()
        }
    }

    #[async_trait]
    impl FhirAuthorizer for FakeAuthorizer {
        async fn authorize(
            &self,
            request: AuthorizationRequest,
        ) -> Result<Box<dyn FhirSession>, AuthorizationError> {
            self.requests.lock().expect("requests lock").push(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.outcome {
                Ok(read) => Ok(Box::new(FakeSession(read.clone()))),
                Err(e) => Err(e.clone()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingBridge {
        sent: StdMutex<Vec<CanonicalPatient>>,
        fail: bool,
    }

    #[async_trait]
    impl ContextBridge for RecordingBridge {
        async fn update_patient(&self, patient: &CanonicalPatient) -> Result<(), BridgeError> {
            self.sent.lock().expect("sent lock").push(patient.clone());
            if self.fail {
                return Err(BridgeError("container unreachable".into()));
            }
            Ok(())
        }
    }

    struct FixedUsers {
        result: Result<AuthenticatedUser, UserError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserDirectory for FixedUsers {
        async fn current_user(&self) -> Result<AuthenticatedUser, UserError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn orchestrator(
        config: Arc<AssistConfig>,
        authorizer: Arc<FakeAuthorizer>,
        bridge: Arc<RecordingBridge>,
    ) -> LaunchOrchestrator {
        LaunchOrchestrator::new(config, authorizer, bridge, PatientContextStore::new())
    }

    fn launch_params() -> LaunchParams {
        LaunchParams::new(Some(valid_launch()), Some(ISS.into()))
    }

    #[tokio::test]
    async fn completes_end_to_end_launch() {
        let authorizer = Arc::new(FakeAuthorizer::reading(Ok(veteran())));
        let bridge = Arc::new(RecordingBridge::default());
        let orchestrator = orchestrator(config("production", &[]), authorizer.clone(), bridge.clone());

        let status = orchestrator.run(launch_params()).await;

        assert_eq!(status.state, LaunchState::Ready);
        assert_eq!(status.error, None);
        let patient = status.patient.expect("patient resolved");
        assert_eq!(
            *patient,
            CanonicalPatient {
                resource_id: "1234567890V123456".into(),
                icn: "ICN1234567890V123456".into(),
                legacy_id: "1234567890V123456".into(),
                station_id: "673".into(),
                user_facility_id: Some("DUZ1234567".into()),
                first_name: "JOHN QUINCY".into(),
                last_name: "VETERAN".into(),
                date_of_birth: Some("1950-01-15".into()),
                ssn: None,
                mrn: None,
            }
        );

        assert_eq!(orchestrator.store().current(), Some(patient.clone()));
        assert_eq!(orchestrator.status().state, LaunchState::Ready);

        let sent = bridge.sent.lock().expect("sent lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].icn, "ICN1234567890V123456");

        let requests = authorizer.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].client_id, "Lighthouse_NP");
        assert_eq!(requests[0].scope, "launch fhirUser openid profile patient/Patient.read");
        assert_eq!(requests[0].redirect_uri.as_str(), "http://localhost:3000/index.html");
        assert_eq!(requests[0].pkce_mode, PkceMode::UnsafeV1);
        assert_eq!(requests[0].iss, ISS);
        assert_eq!(requests[0].launch, valid_launch());
    }

    #[tokio::test]
    async fn no_launch_parameters_in_development_skips_network() {
        let authorizer = Arc::new(FakeAuthorizer::reading(Ok(veteran())));
        let bridge = Arc::new(RecordingBridge::default());
        let orchestrator = orchestrator(config("development", &[]), authorizer.clone(), bridge.clone());

        let status = orchestrator.run(LaunchParams::default()).await;

        assert_eq!(status.state, LaunchState::Ready);
        assert!(status.patient.is_none());
        assert!(status.error.is_none());
        assert_eq!(authorizer.calls(), 0);
        assert!(bridge.sent.lock().expect("sent lock").is_empty());
        assert!(orchestrator.store().current().is_none());
    }

    #[tokio::test]
    async fn incomplete_parameters_are_treated_as_absent() {
        let authorizer = Arc::new(FakeAuthorizer::reading(Ok(veteran())));
        let orchestrator = orchestrator(
            config("production", &[]),
            authorizer.clone(),
            Arc::new(RecordingBridge::default()),
        );

        let status = orchestrator
            .run(LaunchParams::new(Some(valid_launch()), None))
            .await;
        assert_eq!(status.state, LaunchState::Ready);
        assert!(status.patient.is_none());
        assert_eq!(authorizer.calls(), 0);
    }

    #[tokio::test]
    async fn disabled_feature_flag_skips_launch() {
        let authorizer = Arc::new(FakeAuthorizer::reading(Ok(veteran())));
        let orchestrator = orchestrator(
            config("production", &[("FEATURE_FLAGS", r#"{"fhirAuth": false}"#)]),
            authorizer.clone(),
            Arc::new(RecordingBridge::default()),
        );

        let status = orchestrator.run(launch_params()).await;
        assert_eq!(status.state, LaunchState::Ready);
        assert_eq!(authorizer.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_launch_blocks_in_production() {
        let authorizer = Arc::new(FakeAuthorizer::reading(Ok(veteran())));
        let orchestrator = orchestrator(
            config("production", &[]),
            authorizer.clone(),
            Arc::new(RecordingBridge::default()),
        );

        let status = orchestrator
            .run(LaunchParams::new(Some("invalid-base64!@#".into()), Some(ISS.into())))
            .await;

        assert_eq!(status.state, LaunchState::Errored);
        assert_eq!(
            status.error.as_deref(),
            Some("Invalid launch parameter: not valid base64")
        );
        assert!(!status.is_loading());
        assert_eq!(authorizer.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_launch_degrades_in_development() {
        let authorizer = Arc::new(FakeAuthorizer::reading(Ok(veteran())));
        let orchestrator = orchestrator(
            config("development", &[]),
            authorizer.clone(),
            Arc::new(RecordingBridge::default()),
        );

        use base64::Engine as _;
        let missing_patient = base64::engine::general_purpose::STANDARD
            .encode(r#"{"sta3n":"673","duz":"DUZ1234567"}"#);
        let status = orchestrator
            .run(LaunchParams::new(Some(missing_patient), Some(ISS.into())))
            .await;

        assert_eq!(status.state, LaunchState::Ready);
        assert!(status.patient.is_none());
        assert_eq!(
            status.error.as_deref(),
            Some("Invalid launch parameter: missing or invalid patient")
        );
    }

    #[tokio::test]
    async fn authorization_error_message_is_unmodified() {
        let orchestrator = orchestrator(
            config("production", &[]),
            Arc::new(FakeAuthorizer::failing("Invalid authentication token")),
            Arc::new(RecordingBridge::default()),
        );

        let status = orchestrator.run(launch_params()).await;
        assert_eq!(status.state, LaunchState::Errored);
        assert_eq!(status.error.as_deref(), Some("Invalid authentication token"));
    }

    #[tokio::test]
    async fn fetch_errors_are_distinguished() {
        let cases = [
            (FetchError::NotFound, "Patient not found in FHIR server"),
            (
                FetchError::Api {
                    status: 403,
                    status_text: "Forbidden".into(),
                },
                "FHIR API error: 403 Forbidden",
            ),
            (
                FetchError::Unknown("Request timeout".into()),
                "Failed to fetch patient: Request timeout",
            ),
        ];

        for (error, expected) in cases {
            let bridge = Arc::new(RecordingBridge::default());
            let orchestrator = orchestrator(
                config("production", &[]),
                Arc::new(FakeAuthorizer::reading(Err(error))),
                bridge.clone(),
            );
            let status = orchestrator.run(launch_params()).await;
            assert_eq!(status.state, LaunchState::Errored);
            assert_eq!(status.error.as_deref(), Some(expected));
            assert!(orchestrator.store().current().is_none());
            assert!(bridge.sent.lock().expect("sent lock").is_empty());
        }
    }

    #[tokio::test]
    async fn bridge_failure_does_not_fail_the_launch() {
        let bridge = Arc::new(RecordingBridge {
            sent: StdMutex::new(Vec::new()),
            fail: true,
        });
        let orchestrator = orchestrator(
            config("production", &[]),
            Arc::new(FakeAuthorizer::reading(Ok(veteran()))),
            bridge.clone(),
        );

        let status = orchestrator.run(launch_params()).await;
        assert_eq!(status.state, LaunchState::Ready);
        assert!(status.error.is_none());
        assert!(orchestrator.store().current().is_some());
        assert_eq!(bridge.sent.lock().expect("sent lock").len(), 1);
    }

    #[tokio::test]
    async fn user_directory_failure_is_not_fatal() {
        let users = Arc::new(FixedUsers {
            result: Err(UserError("401 Unauthorized".into())),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(
            config("production", &[]),
            Arc::new(FakeAuthorizer::reading(Ok(veteran()))),
            Arc::new(RecordingBridge::default()),
        )
        .with_user_directory(users.clone());

        let status = orchestrator.run(launch_params()).await;
        assert_eq!(status.state, LaunchState::Ready);
        assert_eq!(users.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            status.patient.map(|p| p.station_id.clone()).as_deref(),
            Some("673")
        );
    }

    #[tokio::test]
    async fn launch_context_outranks_user_affiliations() {
        let users = Arc::new(FixedUsers {
            result: Ok(AuthenticatedUser::authenticated(vec![
                FacilityAffiliation::new("530", "123456789"),
                FacilityAffiliation::new("673", "DUZ-FROM-SSO"),
            ])),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(
            config("production", &[]),
            Arc::new(FakeAuthorizer::reading(Ok(veteran()))),
            Arc::new(RecordingBridge::default()),
        )
        .with_user_directory(users);

        let patient = orchestrator
            .run(launch_params())
            .await
            .patient
            .expect("patient resolved");
        assert_eq!(patient.station_id, "673");
        assert_eq!(patient.user_facility_id.as_deref(), Some("DUZ1234567"));
    }

    fn launch_for(patient: &str) -> LaunchParams {
        use base64::Engine as _;
        let raw = base64::engine::general_purpose::STANDARD.encode(format!(
            r#"{{"patient":"{patient}","sta3n":"673","duz":"DUZ1234567"}}"#
        ));
        LaunchParams::new(Some(raw), Some(ISS.into()))
    }

    async fn wait_for_state(updates: &mut watch::Receiver<LaunchStatus>, state: LaunchState) {
        while updates.borrow_and_update().state != state {
            updates.changed().await.expect("orchestrator alive");
        }
    }

    #[tokio::test]
    async fn newer_launch_supersedes_one_waiting_for_authorization() {
        let gate = Arc::new(Notify::new());
        let authorizer = Arc::new(FakeAuthorizer::reading(Ok(veteran())).gated(gate.clone()));
        let orchestrator = Arc::new(orchestrator(
            config("production", &[]),
            authorizer.clone(),
            Arc::new(RecordingBridge::default()),
        ));

        let mut updates = orchestrator.subscribe();
        let abandoned = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(launch_for("ICN-PATIENT-A")).await })
        };
        wait_for_state(&mut updates, LaunchState::Authorizing).await;

        let second = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(launch_for("ICN-PATIENT-B")).await })
        };
        let abandoned = abandoned.await.expect("abandoned run joins");
        assert!(abandoned.patient.is_none());

        gate.notify_one();
        let second = second.await.expect("second run joins");
        assert_eq!(second.state, LaunchState::Ready);
        assert_eq!(
            second.patient.map(|p| p.icn.clone()).as_deref(),
            Some("ICN-PATIENT-B")
        );
        assert_eq!(
            orchestrator.store().current().map(|p| p.icn.clone()).as_deref(),
            Some("ICN-PATIENT-B")
        );

        let requests = authorizer.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].launch, launch_for("ICN-PATIENT-B").launch.expect("launch"));
    }

    #[tokio::test]
    async fn relaunch_starts_without_previous_patient() {
        let gate = Arc::new(Notify::new());
        let authorizer = Arc::new(FakeAuthorizer::reading(Ok(veteran())).gated(gate.clone()));
        let orchestrator = Arc::new(orchestrator(
            config("production", &[]),
            authorizer,
            Arc::new(RecordingBridge::default()),
        ));

        gate.notify_one();
        assert!(orchestrator.run(launch_params()).await.patient.is_some());
        assert!(orchestrator.store().current().is_some());

        let mut updates = orchestrator.subscribe();
        let relaunch = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(launch_params()).await })
        };
        wait_for_state(&mut updates, LaunchState::Authorizing).await;
        assert!(orchestrator.status().patient.is_none());
        assert!(orchestrator.store().current().is_none());
        gate.notify_one();
        assert_eq!(relaunch.await.expect("relaunch joins").state, LaunchState::Ready);
        assert!(orchestrator.store().current().is_some());

        let failed = orchestrator
            .run(LaunchParams::new(Some("invalid-base64!@#".into()), Some(ISS.into())))
            .await;
        assert_eq!(failed.state, LaunchState::Errored);
        assert!(failed.patient.is_none());
        assert!(orchestrator.store().current().is_none());

        gate.notify_one();
        assert!(orchestrator.run(launch_params()).await.patient.is_some());
        let empty = orchestrator.run(LaunchParams::default()).await;
        assert_eq!(empty.state, LaunchState::Ready);
        assert!(empty.patient.is_none());
        assert!(orchestrator.store().current().is_none());
    }

    #[tokio::test]
    async fn development_degrade_clears_previous_patient() {
        let orchestrator = orchestrator(
            config("development", &[]),
            Arc::new(FakeAuthorizer::reading(Ok(veteran()))),
            Arc::new(RecordingBridge::default()),
        );
        orchestrator.run(launch_params()).await;
        assert!(orchestrator.store().current().is_some());

        let status = orchestrator
            .run(LaunchParams::new(Some("invalid-base64!@#".into()), Some(ISS.into())))
            .await;
        assert_eq!(status.state, LaunchState::Ready);
        assert!(status.error.is_some());
        assert!(orchestrator.store().current().is_none());
    }

    #[tokio::test]
    async fn reset_clears_patient_and_status() {
        let orchestrator = orchestrator(
            config("production", &[]),
            Arc::new(FakeAuthorizer::reading(Ok(veteran()))),
            Arc::new(RecordingBridge::default()),
        );
        orchestrator.run(launch_params()).await;
        assert!(orchestrator.store().current().is_some());

        orchestrator.reset();
        assert!(orchestrator.store().current().is_none());
        assert_eq!(orchestrator.status().state, LaunchState::Idle);
        assert!(orchestrator.status().is_loading());
    }
}
