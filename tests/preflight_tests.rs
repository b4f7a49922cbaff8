//! Dry-run preflight pipeline tests
//!
//! Exercise the four-stage state machine against scripted channel and
//! policy fakes: the firewall short-circuit, value failures that let the
//! pipeline continue, and transport failures that abort it.

use async_trait::async_trait;
use serde_json::Value;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use zipld::config::{self, ZipldConfig};
use zipld::deploy::PreflightValidator;
use zipld::events::ProgressSink;
use zipld::policy::{NetworkPolicy, PolicyError};
use zipld::remote::{RemoteChannel, RemoteError};
use zipld::types::PreflightStatus;

static CONFIG: OnceLock<()> = OnceLock::new();

fn init_config() {
    CONFIG.get_or_init(|| config::init(ZipldConfig::default()));
}

/// Channel answering the three remote probes from canned values.
struct ScriptedChannel {
    home: String,
    dataset_count: String,
    tmp_used: String,
    fail_dataset: bool,
    commands_run: AtomicUsize,
}

impl ScriptedChannel {
    fn passing(username: &str) -> Self {
        Self {
            home: format!("/u/{username}"),
            dataset_count: "42".to_string(),
            tmp_used: "35%".to_string(),
            fail_dataset: false,
            commands_run: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteChannel for ScriptedChannel {
    async fn run_command(
        &self,
        _host: &str,
        _username: &str,
        command: &str,
    ) -> Result<String, RemoteError> {
        self.commands_run.fetch_add(1, Ordering::SeqCst);
        if command.contains("pwd") {
            Ok(self.home.clone())
        } else if command.contains("listcat") {
            if self.fail_dataset {
                return Err(RemoteError::Connection {
                    host: "sysa.example.com".to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(self.dataset_count.clone())
        } else if command.contains("df -kP") {
            Ok(self.tmp_used.clone())
        } else {
            Ok(String::new())
        }
    }

    async fn upload_file(
        &self,
        _host: &str,
        _username: &str,
        _local: &Path,
        _remote: &str,
    ) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn download_file(
        &self,
        _host: &str,
        _username: &str,
        _remote: &str,
        _local: &Path,
    ) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Policy fake with a fixed verdict.
struct StaticPolicy {
    allow: bool,
    error: bool,
}

#[async_trait]
impl NetworkPolicy for StaticPolicy {
    async fn has_egress_rule(&self, _ip: IpAddr) -> Result<bool, PolicyError> {
        if self.error {
            return Err(PolicyError::Malformed("policy service unreachable".to_string()));
        }
        Ok(self.allow)
    }
}

#[derive(Default)]
struct MemorySink(Mutex<Vec<Value>>);

impl MemorySink {
    fn states(&self) -> Vec<Value> {
        self.0.lock().expect("sink lock").clone()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: &str, payload: Value) {
        assert_eq!(event, "dry_run");
        self.0.lock().expect("sink lock").push(payload);
    }
}

fn validator(
    channel: ScriptedChannel,
    policy: StaticPolicy,
) -> (Arc<ScriptedChannel>, Arc<MemorySink>, PreflightValidator) {
    let channel = Arc::new(channel);
    let sink = Arc::new(MemorySink::default());
    let validator = PreflightValidator::new(channel.clone(), Arc::new(policy), sink.clone());
    (channel, sink, validator)
}

#[tokio::test]
async fn firewall_failure_short_circuits_remote_checks() {
    init_config();
    let (channel, sink, validator) = validator(
        ScriptedChannel::passing("ipluser"),
        StaticPolicy {
            allow: false,
            error: false,
        },
    );

    let report = validator.run("localhost", "ipluser", "SYSA.SYSLOG").await;

    assert_eq!(report.firewall_rules, PreflightStatus::Error);
    assert_eq!(report.check_ssh_login, PreflightStatus::Error);
    assert_eq!(report.check_dataset_access, PreflightStatus::Error);
    assert_eq!(report.check_tmp_space, PreflightStatus::Error);

    // No remote call is made once the firewall stage fails.
    assert_eq!(channel.commands_run.load(Ordering::SeqCst), 0);

    // The snapshot emitted at the moment of failure still shows the other
    // checks as wait; they never transition to done.
    let states = sink.states();
    assert_eq!(states.len(), 3);
    assert_eq!(states[1]["firewall_rules"], "error");
    assert_eq!(states[1]["check_ssh_login"], "wait");
    assert_eq!(states[1]["check_dataset_access"], "wait");
    assert_eq!(states[1]["check_tmp_space"], "wait");
    for state in &states {
        for check in ["check_ssh_login", "check_dataset_access", "check_tmp_space"] {
            assert_ne!(state[check], "done");
        }
    }
    assert_eq!(states[2]["check_tmp_space"], "error");
}

#[tokio::test]
async fn policy_error_is_treated_like_a_failed_firewall_check() {
    init_config();
    let (channel, _sink, validator) = validator(
        ScriptedChannel::passing("ipluser"),
        StaticPolicy {
            allow: false,
            error: true,
        },
    );

    let report = validator.run("localhost", "ipluser", "SYSA.SYSLOG").await;
    assert_eq!(report.firewall_rules, PreflightStatus::Error);
    assert_eq!(channel.commands_run.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn all_checks_pass_and_emit_one_state_per_stage() {
    init_config();
    let (_channel, sink, validator) = validator(
        ScriptedChannel::passing("ipluser"),
        StaticPolicy {
            allow: true,
            error: false,
        },
    );

    let report = validator.run("localhost", "ipluser", "SYSA.SYSLOG").await;
    assert!(report.all_done());

    // Initial all-wait state plus one emission per completed check.
    let states = sink.states();
    assert_eq!(states.len(), 5);
    assert_eq!(states[0]["firewall_rules"], "wait");
    assert_eq!(states[1]["firewall_rules"], "done");
    assert_eq!(states[1]["check_ssh_login"], "wait");
    assert_eq!(states[4]["check_tmp_space"], "done");
}

#[tokio::test]
async fn login_mismatch_is_an_error_but_pipeline_continues() {
    init_config();
    let mut channel = ScriptedChannel::passing("ipluser");
    channel.home = "/u/someoneelse".to_string();
    let (_channel, _sink, validator) = validator(
        channel,
        StaticPolicy {
            allow: true,
            error: false,
        },
    );

    let report = validator.run("localhost", "ipluser", "SYSA.SYSLOG").await;
    assert_eq!(report.firewall_rules, PreflightStatus::Done);
    assert_eq!(report.check_ssh_login, PreflightStatus::Error);
    assert_eq!(report.check_dataset_access, PreflightStatus::Done);
    assert_eq!(report.check_tmp_space, PreflightStatus::Done);
}

#[tokio::test]
async fn transport_failure_marks_unresolved_checks_error() {
    init_config();
    let mut channel = ScriptedChannel::passing("ipluser");
    channel.fail_dataset = true;
    let (_channel, sink, validator) = validator(
        channel,
        StaticPolicy {
            allow: true,
            error: false,
        },
    );

    let report = validator.run("localhost", "ipluser", "SYSA.SYSLOG").await;
    assert_eq!(report.firewall_rules, PreflightStatus::Done);
    assert_eq!(report.check_ssh_login, PreflightStatus::Done);
    assert_eq!(report.check_dataset_access, PreflightStatus::Error);
    assert_eq!(report.check_tmp_space, PreflightStatus::Error);

    let states = sink.states();
    let last = states.last().expect("final state");
    assert_eq!(last["check_dataset_access"], "error");
    assert_eq!(last["check_tmp_space"], "error");
}

#[tokio::test]
async fn tmp_usage_at_threshold_fails_the_space_check() {
    init_config();
    let mut channel = ScriptedChannel::passing("ipluser");
    channel.tmp_used = "60%".to_string();
    let (_channel, _sink, validator_at) = validator(
        channel,
        StaticPolicy {
            allow: true,
            error: false,
        },
    );

    let report = validator_at.run("localhost", "ipluser", "SYSA.SYSLOG").await;
    assert_eq!(report.check_tmp_space, PreflightStatus::Error);

    // One percent under the threshold passes.
    let mut channel = ScriptedChannel::passing("ipluser");
    channel.tmp_used = "59%".to_string();
    let (_channel, _sink, validator) = validator(
        channel,
        StaticPolicy {
            allow: true,
            error: false,
        },
    );
    let report = validator.run("localhost", "ipluser", "SYSA.SYSLOG").await;
    assert_eq!(report.check_tmp_space, PreflightStatus::Done);
}
