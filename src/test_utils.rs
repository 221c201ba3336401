//! Shared test utilities: worker builders, arbitrary generators and in-memory
//! fakes for the ports.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use proptest::prelude::*;
use secrecy::{ExposeSecret, SecretString};

use crate::cloud::{CommandError, CommandOutput, CommandRunner};
use crate::credentials::jwt::AppClaims;
use crate::credentials::{
    Clock, CredentialMinter, MinterSettings, SecretStore, SecretStoreError,
};
use crate::dispatch::environment::WORKER_ID;
use crate::dispatch::{
    Dispatcher, DispatcherSettings, LaunchError, LaunchOutcome, LaunchProfile, TaskEnvironment,
    TaskLauncher, build_task_environment,
};
use crate::github::{GitHubApiError, GitHubAppApi, IssuedToken};
use crate::manifest::encode;
use crate::stack::{
    StackClient, StackClientError, StackDescription, StackEvent, StackSpec, UpdateResult,
};
use crate::types::{DeliveryId, InstallationId, RepoId};
use crate::webhooks::WebhookPayload;
use crate::workers::{
    Agent, Provider, RuntimeMode, TriggerFilter, WorkerDefinition, WorkerManifest, WorkerMetadata,
    WorkerRuntime, WorkerTrigger,
};

// ─── Clock ───

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[test]
fn manual_clock_clones_share_time() {
    let start = Utc::now();
    let clock = ManualClock::new(start);
    let other = clock.clone();
    clock.advance(chrono::Duration::seconds(30));
    assert_eq!(other.now(), start + chrono::Duration::seconds(30));
}

// ─── Builders ───

/// A minimal enabled worker listening to `issues`.
pub fn worker(id: &str) -> WorkerDefinition {
    worker_on(id, "issues")
}

/// A minimal enabled worker listening to `event`.
pub fn worker_on(id: &str, event: &str) -> WorkerDefinition {
    WorkerDefinition {
        metadata: WorkerMetadata {
            id: id.to_string(),
            worker_type: "test".to_string(),
            description: None,
            enabled: true,
            version: None,
        },
        triggers: vec![WorkerTrigger {
            provider: Provider::GitHub,
            event: event.to_string(),
            actions: None,
            filter: None,
        }],
        runtime: WorkerRuntime {
            agent: None,
            mode: None,
            prompt: "Do the thing.".to_string(),
            allow_push: None,
            max_duration_minutes: None,
            env: BTreeMap::new(),
        },
    }
}

// ─── Generators ───

pub fn arb_worker_id() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{0,12}".prop_map(String::from)
}

fn arb_text() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 .,]{0,30}".prop_map(String::from)
}

fn arb_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z][a-z0-9/_-]{0,10}".prop_map(String::from), 0..3)
}

pub fn arb_filter() -> impl Strategy<Value = TriggerFilter> {
    (
        prop::option::of(arb_names()),
        prop::option::of(arb_names()),
        prop::option::of(arb_names()),
        prop::option::of(any::<bool>()),
    )
        .prop_map(
            |(repository, base_branches, head_branches, draft)| TriggerFilter {
                repository,
                base_branches,
                head_branches,
                draft,
            },
        )
}

pub fn arb_trigger() -> impl Strategy<Value = WorkerTrigger> {
    (
        prop::sample::select(vec!["issues", "issue_comment", "pull_request", "push"]),
        prop::option::of(arb_names()),
        prop::option::of(arb_filter()),
    )
        .prop_map(|(event, actions, filter)| WorkerTrigger {
            provider: Provider::GitHub,
            event: event.to_string(),
            actions,
            filter,
        })
}

pub fn arb_runtime() -> impl Strategy<Value = WorkerRuntime> {
    (
        prop::option::of(prop_oneof![Just(Agent::Claude), Just(Agent::Opencode)]),
        prop::option::of(prop_oneof![
            Just(RuntimeMode::CommentOnly),
            Just(RuntimeMode::Apply)
        ]),
        arb_text(),
        prop::option::of(any::<bool>()),
        prop::option::of(prop::num::f64::POSITIVE | prop::num::f64::NORMAL),
        prop::collection::btree_map("[A-Z][A-Z_]{0,8}", "[a-z0-9]{0,8}", 0..3),
    )
        .prop_map(
            |(agent, mode, prompt, allow_push, max_duration_minutes, env)| WorkerRuntime {
                agent,
                mode,
                prompt,
                allow_push,
                max_duration_minutes,
                env,
            },
        )
}

pub fn arb_worker(id: String) -> impl Strategy<Value = WorkerDefinition> {
    (
        "[a-z]{1,8}",
        prop::option::of(arb_text()),
        any::<bool>(),
        prop::option::of("[0-9]\\.[0-9]"),
        prop::collection::vec(arb_trigger(), 1..3),
        arb_runtime(),
    )
        .prop_map(
            move |(worker_type, description, enabled, version, triggers, runtime)| {
                WorkerDefinition {
                    metadata: WorkerMetadata {
                        id: id.clone(),
                        worker_type,
                        description,
                        enabled,
                        version,
                    },
                    triggers,
                    runtime,
                }
            },
        )
}

/// Manifests of up to five workers with distinct ids.
pub fn arb_manifest() -> impl Strategy<Value = WorkerManifest> {
    prop::collection::btree_set(arb_worker_id(), 0..5).prop_flat_map(|ids| {
        ids.into_iter()
            .map(arb_worker)
            .collect::<Vec<_>>()
            .prop_map(|workers| {
                WorkerManifest::new(workers).unwrap_or_else(|_| WorkerManifest::empty())
            })
    })
}

// ─── Credential fakes ───

pub const TEST_APP_KEY: &str = include_str!("../tests/fixtures/app_key.pem");
pub const TEST_APP_PUBLIC_KEY: &str = include_str!("../tests/fixtures/app_key.pub.pem");
pub const KEY_PARAMETER: &str = "/workers/github-app/private-key";

/// In-memory secret store that counts reads. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeSecretStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    reads: Arc<AtomicUsize>,
}

impl FakeSecretStore {
    pub fn with_secret(name: &str, value: &str) -> Self {
        let store = FakeSecretStore::default();
        store.set(name, value);
        store
    }

    pub fn set(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SecretStore for FakeSecretStore {
    async fn get_secret(&self, name: &str) -> Result<SecretString, SecretStoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap()
            .get(name)
            .map(|v| SecretString::from(v.clone()))
            .ok_or_else(|| SecretStoreError::new(name, "ParameterNotFound"))
    }
}

/// GitHub app API fake.
///
/// Verifies each app JWT against the test public key, issues numbered tokens
/// valid for one hour of the shared clock, and counts exchanges.
#[derive(Debug, Clone)]
pub struct FakeGitHubApp {
    clock: ManualClock,
    exchanges: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    installations: Arc<Mutex<HashMap<String, u64>>>,
    last_issuer: Arc<Mutex<Option<String>>>,
}

impl FakeGitHubApp {
    pub fn new(clock: ManualClock) -> Self {
        FakeGitHubApp {
            clock,
            exchanges: Arc::default(),
            fail: Arc::default(),
            installations: Arc::default(),
            last_issuer: Arc::default(),
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn fail_exchanges(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn install(&self, full_name: &str, installation: u64) {
        self.installations
            .lock()
            .unwrap()
            .insert(full_name.to_string(), installation);
    }

    pub fn last_issuer(&self) -> Option<String> {
        self.last_issuer.lock().unwrap().clone()
    }

    fn check_jwt(&self, jwt: &SecretString) -> Result<(), GitHubApiError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        let key = DecodingKey::from_rsa_pem(TEST_APP_PUBLIC_KEY.as_bytes()).unwrap();
        let claims = jsonwebtoken::decode::<AppClaims>(jwt.expose_secret(), &key, &validation)
            .map_err(|e| {
                GitHubApiError::permanent_without_source(e.to_string()).with_status(401)
            })?
            .claims;
        *self.last_issuer.lock().unwrap() = Some(claims.iss);
        Ok(())
    }
}

impl GitHubAppApi for FakeGitHubApp {
    async fn repository_installation(
        &self,
        app_jwt: &SecretString,
        repo: &RepoId,
    ) -> Result<InstallationId, GitHubApiError> {
        self.check_jwt(app_jwt)?;
        self.installations
            .lock()
            .unwrap()
            .get(&repo.full_name())
            .copied()
            .and_then(InstallationId::new)
            .ok_or_else(|| GitHubApiError::permanent_without_source("Not Found").with_status(404))
    }

    async fn create_installation_token(
        &self,
        app_jwt: &SecretString,
        installation: InstallationId,
    ) -> Result<IssuedToken, GitHubApiError> {
        self.check_jwt(app_jwt)?;
        if self.fail.load(Ordering::SeqCst) {
            return Err(
                GitHubApiError::permanent_without_source("Bad credentials").with_status(401)
            );
        }
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IssuedToken {
            token: SecretString::from(format!("ghs_{}_{}", installation, n)),
            expires_at: self.clock.now() + chrono::Duration::hours(1),
        })
    }
}

// ─── Dispatch fakes ───

pub fn launch_profile() -> LaunchProfile {
    LaunchProfile {
        cluster: "workers".to_string(),
        task_definition: "worker-task:3".to_string(),
        container_name: "worker".to_string(),
        subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
        security_groups: vec!["sg-1".to_string()],
        assign_public_ip: false,
    }
}

/// Environment for worker `triage` on an `issues` delivery, token `ghs_test`.
pub fn task_environment() -> TaskEnvironment {
    let payload = WebhookPayload {
        action: Some("opened".to_string()),
        repository: Some(RepoId::new("acme", "repo")),
        issue_number: Some(7),
        ..WebhookPayload::default()
    };
    build_task_environment(
        "issues",
        &DeliveryId::new("d-1"),
        &payload,
        &worker("triage"),
        SecretString::from("ghs_test".to_string()),
    )
}

#[derive(Debug, Default)]
struct LauncherState {
    launches: Vec<BTreeMap<String, String>>,
    response: Option<LaunchOutcome>,
    error: Option<String>,
    failing_workers: Vec<String>,
}

/// Records each launch's full environment and starts numbered tasks.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    /// Environments of successful launches, token included.
    pub fn launches(&self) -> Vec<BTreeMap<String, String>> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn respond_with(&self, outcome: LaunchOutcome) {
        self.state.lock().unwrap().response = Some(outcome);
    }

    pub fn fail_with(&self, message: &str) {
        self.state.lock().unwrap().error = Some(message.to_string());
    }

    pub fn fail_for_worker(&self, worker_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_workers
            .push(worker_id.to_string());
    }
}

impl TaskLauncher for FakeLauncher {
    async fn run_task(
        &self,
        _profile: &LaunchProfile,
        environment: &TaskEnvironment,
    ) -> Result<LaunchOutcome, LaunchError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.error {
            return Err(LaunchError::Backend(message.clone()));
        }
        let worker_id = environment.get(WORKER_ID).unwrap_or_default();
        if state.failing_workers.iter().any(|w| w == worker_id) {
            return Err(LaunchError::Backend(format!("{} refused", worker_id)));
        }
        if let Some(outcome) = &state.response {
            return Ok(outcome.clone());
        }
        state
            .launches
            .push(environment.to_pairs().into_iter().collect());
        Ok(LaunchOutcome {
            task_arns: vec![format!("arn:aws:ecs:task/{}", state.launches.len())],
            failures: Vec::new(),
        })
    }
}

// ─── Stack fakes ───

#[derive(Debug, Default)]
struct FakeStackState {
    exists: bool,
    started: bool,
    status: Option<String>,
    status_reason: Option<String>,
    script: VecDeque<String>,
    events: Vec<StackEvent>,
    no_changes: bool,
    creates: usize,
    updates: usize,
}

/// Stack client whose status after a create or update follows a script.
///
/// Each describe after the operation starts takes the next scripted status;
/// the last one repeats. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeStackClient {
    state: Arc<Mutex<FakeStackState>>,
}

impl FakeStackClient {
    pub fn absent() -> Self {
        FakeStackClient::default()
    }

    pub fn existing(status: &str) -> Self {
        let client = FakeStackClient::default();
        {
            let mut state = client.state.lock().unwrap();
            state.exists = true;
            state.status = Some(status.to_string());
        }
        client
    }

    pub fn script<const N: usize>(&self, statuses: [&str; N]) {
        self.state.lock().unwrap().script = statuses.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_status_reason(&self, reason: &str) {
        self.state.lock().unwrap().status_reason = Some(reason.to_string());
    }

    pub fn set_events(&self, events: Vec<StackEvent>) {
        self.state.lock().unwrap().events = events;
    }

    pub fn no_changes(&self) {
        self.state.lock().unwrap().no_changes = true;
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn updates(&self) -> usize {
        self.state.lock().unwrap().updates
    }
}

impl StackClient for FakeStackClient {
    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>, StackClientError> {
        let mut state = self.state.lock().unwrap();
        if !state.exists {
            return Ok(None);
        }
        if state.started {
            let next = if state.script.len() > 1 {
                state.script.pop_front()
            } else {
                state.script.front().cloned()
            };
            if next.is_some() {
                state.status = next;
            }
        }
        Ok(state.status.clone().map(|status| StackDescription {
            name: name.to_string(),
            status,
            status_reason: state.status_reason.clone(),
        }))
    }

    async fn create_stack(&self, _spec: &StackSpec) -> Result<(), StackClientError> {
        let mut state = self.state.lock().unwrap();
        state.exists = true;
        state.started = true;
        state.creates += 1;
        Ok(())
    }

    async fn update_stack(&self, _spec: &StackSpec) -> Result<UpdateResult, StackClientError> {
        let mut state = self.state.lock().unwrap();
        state.updates += 1;
        if state.no_changes {
            return Ok(UpdateResult::NoChanges);
        }
        state.started = true;
        Ok(UpdateResult::Started)
    }

    async fn stack_events(&self, _name: &str) -> Result<Vec<StackEvent>, StackClientError> {
        Ok(self.state.lock().unwrap().events.clone())
    }
}

// ─── Command fakes ───

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

/// Command runner that replays queued outputs and records every call.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    outputs: Arc<Mutex<VecDeque<CommandOutput>>>,
}

impl FakeRunner {
    pub fn respond_ok(&self, stdout: &str) {
        self.outputs.lock().unwrap().push_back(CommandOutput {
            status: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        });
    }

    pub fn respond_err(&self, status: i32, stderr: &str) {
        self.outputs.lock().unwrap().push_back(CommandOutput {
            status: Some(status),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            stdin: stdin.map(<[u8]>::to_vec),
        });
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CommandOutput {
                status: Some(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
            }))
    }
}

// ─── Dispatcher harness ───

pub const WEBHOOK_SECRET_PARAMETER: &str = "/workers/webhook-secret";
pub const WEBHOOK_SECRET: &str = "shh";

pub type TestDispatcher = Dispatcher<FakeSecretStore, FakeGitHubApp, ManualClock, FakeLauncher>;

/// A dispatcher on fakes, with handles to inspect them.
pub struct Harness {
    pub dispatcher: TestDispatcher,
    pub store: FakeSecretStore,
    pub github: FakeGitHubApp,
    pub launcher: FakeLauncher,
    pub clock: ManualClock,
}

/// A dispatcher for app `12345` with `manifest` deployed and the webhook
/// secret set to [`WEBHOOK_SECRET`].
pub fn harness(manifest: WorkerManifest) -> Harness {
    let clock = ManualClock::new(chrono::Utc::now());
    let store = FakeSecretStore::with_secret(KEY_PARAMETER, TEST_APP_KEY);
    store.set(WEBHOOK_SECRET_PARAMETER, WEBHOOK_SECRET);
    let github = FakeGitHubApp::new(clock.clone());
    let launcher = FakeLauncher::default();
    let minter = CredentialMinter::new(
        MinterSettings::new("12345", KEY_PARAMETER),
        store.clone(),
        github.clone(),
        clock.clone(),
    )
    .unwrap();
    let dispatcher = Dispatcher::new(
        DispatcherSettings::new(WEBHOOK_SECRET_PARAMETER, launch_profile()),
        store.clone(),
        clock.clone(),
        minter,
        launcher.clone(),
        encode(&manifest).unwrap().into_values(),
    );
    Harness {
        dispatcher,
        store,
        github,
        launcher,
        clock,
    }
}

/// An `issues`/`opened` body for `acme/repo` issue 7, installation 42.
pub fn issues_opened_body() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "action": "opened",
        "issue": { "number": 7 },
        "repository": { "full_name": "acme/repo" },
        "installation": { "id": 42 }
    }))
    .unwrap()
}
