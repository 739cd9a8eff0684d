//! Integration tests for the clusterd binary.
//!
//! The end-to-end test starts a real master with real worker processes and
//! talks to it over HTTP.

use std::net::TcpListener;
use std::process::{Child, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use predicates::prelude::*;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};

const USER: &str = "baxture";
const PASS: &str = "ensuresers123";

fn clusterd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_clusterd"))
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn test_help() {
    clusterd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("internal-worker").not());
}

#[test]
fn test_serve_help_lists_options() {
    clusterd()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--timeout"))
        .stdout(predicate::str::contains("CLUSTERD_PORT"));
}

#[test]
fn test_worker_refuses_manual_start() {
    clusterd()
        .args(["worker", "--worker-id", "1", "--port", "4001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--internal-worker"));
}

#[test]
fn test_zero_workers_is_rejected() {
    clusterd()
        .args(["serve", "--workers", "0", "--port"])
        .arg(free_port().to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--workers must be at least 1"));
}

/// A running master, stopped with SIGTERM on drop.
struct Master {
    child: Child,
    base_url: String,
    client: Client,
}

impl Master {
    fn start(workers: usize) -> Self {
        let port = free_port();
        let base_port = free_port();
        let child = std::process::Command::new(env!("CARGO_BIN_EXE_clusterd"))
            .args(["-q", "serve", "--workers"])
            .arg(workers.to_string())
            .arg("--port")
            .arg(port.to_string())
            .arg("--worker-base-port")
            .arg(base_port.to_string())
            .env_remove("CLUSTERD_USERNAME")
            .env_remove("CLUSTERD_PASSWORD")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .expect("failed to start master");

        Self {
            child,
            base_url: format!("http://127.0.0.1:{}", port),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn health(&self) -> Option<Value> {
        self.client.get(self.url("/health")).send().ok()?.json().ok()
    }

    /// Poll `/health` until `check` accepts it.
    fn wait_for_health(&self, check: impl Fn(&Value) -> bool) -> Value {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            if let Some(health) = self.health()
                && check(&health)
            {
                return health;
            }
            assert!(Instant::now() < deadline, "pool did not reach expected state");
            thread::sleep(Duration::from_millis(100));
        }
    }
}

impl Drop for Master {
    fn drop(&mut self) {
        let _ = kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn worker_ids(health: &Value) -> Vec<u64> {
    health["workers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["id"].as_u64().unwrap())
        .collect()
}

#[test]
fn test_end_to_end() {
    let master = Master::start(2);
    let health = master.wait_for_health(|h| h["live_workers"] == 2);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["target_workers"], 2);
    assert_eq!(worker_ids(&health), vec![1, 2]);

    // Authorization is enforced inside the workers.
    let response = master.client.get(master.url("/api/users")).send().unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().unwrap();
    assert_eq!(body, json!({"message": "Authorization header is missing"}));

    let response = master
        .client
        .get(master.url("/api/users"))
        .basic_auth(USER, Some("wrong"))
        .send()
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Every worker starts from the same seed data.
    for _ in 0..4 {
        let response = master
            .client
            .get(master.url("/api/users/1"))
            .basic_auth(USER, Some(PASS))
            .send()
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body: Value = response.json().unwrap();
        assert_eq!(body["data"]["username"], "Alex");
    }

    let response = master
        .client
        .post(master.url("/api/users"))
        .basic_auth(USER, Some(PASS))
        .json(&json!({"username": "Maya", "age": 41, "hobbies": "Climbing"}))
        .send()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().unwrap();
    assert_eq!(body["message"], "User Created Successfully");
    assert_eq!(body["data"]["id"], "3");

    let response = master
        .client
        .put(master.url("/api/users/99"))
        .basic_auth(USER, Some(PASS))
        .json(&json!({"username": "x", "age": 1, "hobbies": ""}))
        .send()
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = master
        .client
        .get(master.url("/api/nothing"))
        .send()
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().unwrap();
    assert_eq!(body, json!({"message": "Route not found"}));

    // Kill a worker; the pool is restored under a fresh id.
    let victim = &health["workers"][0];
    let victim_id = victim["id"].as_u64().unwrap();
    let victim_pid = victim["pid"].as_i64().unwrap() as i32;
    kill(Pid::from_raw(victim_pid), Signal::SIGKILL).unwrap();

    let health = master.wait_for_health(|h| {
        let ids = worker_ids(h);
        h["live_workers"] == 2 && !ids.contains(&victim_id)
    });
    let ids = worker_ids(&health);
    assert!(ids.iter().all(|&id| id <= 3));
    assert!(ids.contains(&3));

    // Still serving.
    let response = master
        .client
        .get(master.url("/api/users"))
        .basic_auth(USER, Some(PASS))
        .send()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
