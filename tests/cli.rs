//! Integration tests for the asc CLI.
//!
//! Commands that talk to App Store Connect run against an in-process fake
//! (`tiny_http`) selected with `ASC_BASE_URL`.

use serde_json::{json, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_asc"));
    for var in [
        "ASC_ISSUER_ID",
        "ASC_KEY_ID",
        "ASC_PRIVATE_KEY_PATH",
        "ASC_APP_ID",
        "ASC_TIMEOUT",
        "ASC_BASE_URL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn fixture_key() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/AuthKey_TEST.p8")
}

/// A scratch directory holding `.asc/config.toml` with the test key.
fn setup_test_env() -> tempfile::TempDir {
    let work_dir = tempfile::TempDir::new().unwrap();
    let data_dir = work_dir.path().join(".asc");
    std::fs::create_dir_all(&data_dir).unwrap();
    let config = format!(
        "[api]\nissuer_id = \"test-issuer\"\nkey_id = \"TESTKEY123\"\nprivate_key = '{}'\n",
        fixture_key().display()
    );
    std::fs::write(data_dir.join("config.toml"), config).unwrap();
    work_dir
}

fn run(work_dir: &Path, base: Option<&str>, args: &[&str]) -> Output {
    let mut cmd = bin();
    cmd.current_dir(work_dir).arg("--data-dir").arg(work_dir.join(".asc")).args(args);
    if let Some(base) = base {
        cmd.env("ASC_BASE_URL", base);
    }
    cmd.output().expect("failed to run asc")
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"))
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ─── Fake App Store Connect ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    body: String,
}

struct FakeAsc {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeAsc {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn writes(&self) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.method != "GET").collect()
    }
}

/// Serve every request through `route(method, path)`; the query string is
/// ignored when routing.
fn fake_asc<F>(route: F) -> FakeAsc
where
    F: Fn(&str, &str) -> (u16, Value) + Send + 'static,
{
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    thread::spawn(move || {
        for mut req in server.incoming_requests() {
            let method = req.method().to_string();
            let path = req.url().split('?').next().unwrap_or_default().to_string();
            let mut body = String::new();
            let _ = req.as_reader().read_to_string(&mut body);
            log.lock().unwrap().push(Recorded {
                method: method.clone(),
                path: path.clone(),
                body,
            });
            let (status, value) = route(&method, &path);
            let _ = req.respond(tiny_http::Response::from_string(value.to_string()).with_status_code(status));
        }
    });
    FakeAsc { base, requests }
}

fn not_found() -> (u16, Value) {
    (
        404,
        json!({"errors": [{"status": "404", "code": "NOT_FOUND", "title": "Not found", "detail": "missing"}]}),
    )
}

fn list(items: Value) -> (u16, Value) {
    (200, json!({ "data": items, "links": {} }))
}

// ─── Basics ──────────────────────────────────────────────────────────────────

#[test]
fn help_works() {
    let output = bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("App Store Connect"));
}

#[test]
fn version_works() {
    let output = bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("asc"));
}

#[test]
fn unknown_flag_exits_one() {
    let output = bin().args(["status", "--nope"]).output().expect("failed to run");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn init_creates_data_dir() {
    let work_dir = tempfile::TempDir::new().unwrap();
    let output = bin()
        .arg("init")
        .current_dir(work_dir.path())
        .output()
        .expect("init failed");

    assert!(output.status.success());
    let config = std::fs::read_to_string(work_dir.path().join(".asc/config.toml")).unwrap();
    assert!(config.contains("[api]"));
}

// ─── status ──────────────────────────────────────────────────────────────────

fn status_route(submissions: Value) -> impl Fn(&str, &str) -> (u16, Value) + Send + 'static {
    move |_method, path| match path {
        "/v1/apps/app-1" => (
            200,
            json!({"data": {"type": "apps", "id": "app-1",
                            "attributes": {"name": "Demo", "bundleId": "com.example.demo"}}}),
        ),
        "/v1/builds" => list(json!([{
            "type": "builds", "id": "b1",
            "attributes": {"version": "42", "uploadedDate": "2026-01-01T00:00:00Z", "processingState": "VALID"}
        }])),
        "/v1/builds/b1/preReleaseVersion" => not_found(),
        "/v1/buildBetaDetails" | "/v1/betaAppReviewSubmissions" => list(json!([])),
        "/v1/apps/app-1/appStoreVersions" => list(json!([{
            "type": "appStoreVersions", "id": "v1",
            "attributes": {"versionString": "1.0", "platform": "IOS",
                           "appVersionState": "PREPARE_FOR_SUBMISSION", "createdDate": "2026-01-01T00:00:00Z"}
        }])),
        "/v1/appStoreVersions/v1/appStoreVersionPhasedRelease" => not_found(),
        "/v1/reviewSubmissions" => list(submissions.clone()),
        _ => not_found(),
    }
}

#[test]
fn status_happy_path_is_yellow() {
    let work_dir = setup_test_env();
    let asc = fake_asc(status_route(json!([])));

    let output = run(work_dir.path(), Some(&asc.base), &["status", "--app", "app-1"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let dash = stdout_json(&output);
    assert_eq!(dash["app"]["bundleId"], "com.example.demo");
    assert_eq!(dash["summary"]["health"], "yellow");
    assert_eq!(dash["summary"]["nextAction"], "Prepare metadata and submit for review.");
    assert_eq!(dash["summary"]["blockers"], json!([]));
    assert_eq!(dash["builds"]["latest"]["id"], "b1");
    assert_eq!(dash["phasedRelease"]["configured"], false);
    assert_eq!(dash["links"]["appStoreConnect"], "https://appstoreconnect.apple.com/apps/app-1");

    let paths: Vec<String> = asc.requests().into_iter().map(|r| r.path).collect();
    assert!(paths.contains(&"/v1/apps/app-1".to_string()), "{paths:?}");
    assert!(!paths.contains(&"/v1/apps".to_string()), "{paths:?}");
}

#[test]
fn status_unresolved_submission_is_red() {
    let work_dir = setup_test_env();
    let asc = fake_asc(status_route(json!([{
        "type": "reviewSubmissions", "id": "sub-9",
        "attributes": {"state": "UNRESOLVED_ISSUES", "submittedDate": "2026-01-02T00:00:00Z", "platform": "IOS"}
    }])));

    let output = run(work_dir.path(), Some(&asc.base), &["status", "--app", "app-1"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let dash = stdout_json(&output);
    assert_eq!(dash["summary"]["health"], "red");
    assert_eq!(
        dash["summary"]["blockers"],
        json!(["App Store review has unresolved issues", "submission sub-9 has unresolved issues"])
    );
}

#[test]
fn status_include_limits_sections() {
    let work_dir = setup_test_env();
    let asc = fake_asc(status_route(json!([])));

    let output = run(
        work_dir.path(),
        Some(&asc.base),
        &["status", "--app", "app-1", "--include", "appstore"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let dash = stdout_json(&output);
    assert_eq!(dash["appstore"]["state"], "PREPARE_FOR_SUBMISSION");
    assert!(dash.get("builds").is_none());
    assert!(dash.get("links").is_none());
    assert!(dash.get("summary").is_some());
    assert!(!asc.requests().iter().any(|r| r.path == "/v1/builds"));
}

#[test]
fn status_table_output() {
    let work_dir = setup_test_env();
    let asc = fake_asc(status_route(json!([])));

    let output = run(
        work_dir.path(),
        Some(&asc.base),
        &["status", "--app", "app-1", "--output", "table"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("STATUS"));
    assert!(stdout.contains("yellow"));
    assert!(stdout.contains("not configured"));
}

#[test]
fn status_bad_include_is_usage_error() {
    let work_dir = setup_test_env();
    let output = run(work_dir.path(), None, &["status", "--app", "app-1", "--include", "bogus"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.starts_with("Error: --include contains unsupported section \"bogus\""), "{err}");
    assert_eq!(err.matches("Error:").count(), 1, "{err}");
}

#[test]
fn status_requires_app() {
    let work_dir = setup_test_env();
    let output = run(work_dir.path(), None, &["status"]);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stderr(&output).trim(), "Error: --app is required (or set ASC_APP_ID)");
}

#[test]
fn status_server_error_is_scoped() {
    let work_dir = setup_test_env();
    let asc = fake_asc(|_, path| match path {
        "/v1/apps/app-1" => (500, json!({"errors": [{"status": "500", "title": "Oops"}]})),
        _ => not_found(),
    });

    let output = run(work_dir.path(), Some(&asc.base), &["status", "--app", "app-1"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Error: status: "), "{}", stderr(&output));
}

// ─── metadata ────────────────────────────────────────────────────────────────

fn metadata_route(method: &str, path: &str) -> (u16, Value) {
    match (method, path) {
        ("GET", "/v1/apps/app-1/appInfos") => list(json!([
            {"type": "appInfos", "id": "ai-1", "attributes": {"state": "PREPARE_FOR_SUBMISSION"}}
        ])),
        ("GET", "/v1/appInfos/ai-1/appInfoLocalizations") => list(json!([
            {"type": "appInfoLocalizations", "id": "ail-en", "attributes": {"locale": "en-US", "name": "Demo", "subtitle": "Fast"}},
            {"type": "appInfoLocalizations", "id": "ail-ja", "attributes": {"locale": "ja", "name": "デモ"}}
        ])),
        ("GET", "/v1/apps/app-1/appStoreVersions") => list(json!([
            {"type": "appStoreVersions", "id": "v-1", "attributes": {"versionString": "1.2.3", "platform": "IOS"}}
        ])),
        ("GET", "/v1/appStoreVersions/v-1/appStoreVersionLocalizations") => list(json!([
            {"type": "appStoreVersionLocalizations", "id": "vl-ja", "attributes": {"locale": "ja", "description": "説明"}},
            {"type": "appStoreVersionLocalizations", "id": "vl-en", "attributes": {"locale": "en-US", "description": " Hello ", "keywords": "a,b"}}
        ])),
        ("POST", _) | ("PATCH", _) => (200, json!({"data": {"type": "x", "id": "new-1"}})),
        _ => not_found(),
    }
}

#[test]
fn metadata_pull_writes_sorted_files() {
    let work_dir = setup_test_env();
    let asc = fake_asc(metadata_route);
    let md = work_dir.path().join("md");

    let output = run(
        work_dir.path(),
        Some(&asc.base),
        &["metadata", "pull", "--app", "app-1", "--version", "1.2.3", "--dir", md.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let result = stdout_json(&output);
    assert_eq!(result["fileCount"], 4);
    assert_eq!(
        result["files"],
        json!([
            "app-info/en-US.json",
            "app-info/ja.json",
            "version/1.2.3/en-US.json",
            "version/1.2.3/ja.json",
        ])
    );
    assert_eq!(result["includes"], json!(["localizations"]));

    let en = std::fs::read_to_string(md.join("version/1.2.3/en-US.json")).unwrap();
    assert_eq!(en, "{\"description\":\"Hello\",\"keywords\":\"a,b\"}\n");
    assert!(asc.writes().is_empty());
}

#[test]
fn metadata_pull_refuses_existing_files_without_force() {
    let work_dir = setup_test_env();
    let asc = fake_asc(metadata_route);
    let md = work_dir.path().join("md");
    std::fs::create_dir_all(md.join("app-info")).unwrap();
    std::fs::write(md.join("app-info/en-US.json"), "{}").unwrap();
    let args = ["metadata", "pull", "--app", "app-1", "--version", "1.2.3", "--dir", md.to_str().unwrap()];

    let output = run(work_dir.path(), Some(&asc.base), &args);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--force"), "{}", stderr(&output));

    let mut forced = args.to_vec();
    forced.push("--force");
    let output = run(work_dir.path(), Some(&asc.base), &forced);
    assert!(output.status.success(), "{}", stderr(&output));
}

#[test]
fn metadata_pull_usage_errors() {
    let work_dir = setup_test_env();
    let cases: [(&[&str], &str); 4] = [
        (&["metadata", "pull", "--version", "1.2.3", "--dir", "md"], "Error: --app is required (or set ASC_APP_ID)"),
        (&["metadata", "pull", "--app", "app-1", "--dir", "md"], "Error: --version is required"),
        (&["metadata", "pull", "--app", "app-1", "--version", "1.2.3"], "Error: --dir is required"),
        (
            &["metadata", "pull", "--app", "app-1", "--version", "1.2.3", "--dir", "md", "--include", "screenshots"],
            "Error: --include supports only \"localizations\"",
        ),
    ];
    for (args, want) in cases {
        let output = run(work_dir.path(), None, args);
        assert_eq!(output.status.code(), Some(1), "{args:?}");
        assert!(output.stdout.is_empty(), "{args:?}");
        assert_eq!(stderr(&output).trim(), want, "{args:?}");
    }
}

#[test]
fn metadata_validate_reports_issues_and_fails() {
    let work_dir = setup_test_env();
    let md = work_dir.path().join("md");
    std::fs::create_dir_all(md.join("app-info")).unwrap();
    std::fs::create_dir_all(md.join("version/1.0")).unwrap();
    std::fs::write(md.join("app-info/en-US.json"), json!({"name": "n".repeat(31)}).to_string()).unwrap();
    std::fs::write(md.join("version/1.0/en-US.json"), r#"{"description":"ok"}"#).unwrap();

    let output = run(work_dir.path(), None, &["metadata", "validate", "--dir", md.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));

    let report = stdout_json(&output);
    assert_eq!(report["valid"], false);
    assert_eq!(report["errorCount"], 1);
    assert_eq!(report["issues"][0]["field"], "name");
    assert_eq!(report["issues"][0]["length"], 31);
    assert_eq!(report["issues"][0]["limit"], 30);
    assert!(!stderr(&output).contains("Error:"));
}

#[test]
fn metadata_validate_passes_clean_tree() {
    let work_dir = setup_test_env();
    let md = work_dir.path().join("md");
    std::fs::create_dir_all(md.join("version/1.0")).unwrap();
    std::fs::write(md.join("version/1.0/en-US.json"), r#"{"whatsNew":"Fixes"}"#).unwrap();

    let output = run(work_dir.path(), None, &["metadata", "validate", "--dir", md.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout_json(&output)["valid"], true);
}

#[test]
fn metadata_push_dry_run_plans_without_writing() {
    let work_dir = setup_test_env();
    let asc = fake_asc(metadata_route);
    let md = work_dir.path().join("md");
    std::fs::create_dir_all(md.join("version/1.2.3")).unwrap();
    std::fs::write(md.join("version/1.2.3/en-US.json"), r#"{"description":"New"}"#).unwrap();
    std::fs::write(md.join("version/1.2.3/de-DE.json"), r#"{"description":"Neu"}"#).unwrap();

    let output = run(
        work_dir.path(),
        Some(&asc.base),
        &["metadata", "push", "--app", "app-1", "--version", "1.2.3", "--dir", md.to_str().unwrap(), "--dry-run"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let result = stdout_json(&output);
    assert_eq!(result["dryRun"], true);
    assert_eq!(result["versionId"], "v-1");
    let actions: Vec<(String, String)> = result["plan"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["locale"].as_str().unwrap().to_string(), s["action"].as_str().unwrap().to_string()))
        .collect();
    assert!(actions.contains(&("en-US".into(), "update".into())));
    assert!(actions.contains(&("de-DE".into(), "create".into())));
    assert!(asc.writes().is_empty());
}

#[test]
fn metadata_push_creates_and_updates() {
    let work_dir = setup_test_env();
    let asc = fake_asc(metadata_route);
    let md = work_dir.path().join("md");
    std::fs::create_dir_all(md.join("version/1.2.3")).unwrap();
    std::fs::write(md.join("version/1.2.3/en-US.json"), r#"{"description":"New"}"#).unwrap();
    std::fs::write(md.join("version/1.2.3/de-DE.json"), r#"{"description":"Neu"}"#).unwrap();

    let output = run(
        work_dir.path(),
        Some(&asc.base),
        &["metadata", "push", "--app", "app-1", "--version", "1.2.3", "--dir", md.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let writes = asc.writes();
    let patch = writes
        .iter()
        .find(|r| r.method == "PATCH")
        .expect("update request");
    assert_eq!(patch.path, "/v1/appStoreVersionLocalizations/vl-en");
    let post = writes.iter().find(|r| r.method == "POST").expect("create request");
    assert_eq!(post.path, "/v1/appStoreVersionLocalizations");
    let body: Value = serde_json::from_str(&post.body).unwrap();
    assert_eq!(body["data"]["attributes"]["locale"], "de-DE");
    assert_eq!(body["data"]["relationships"]["appStoreVersion"]["data"]["id"], "v-1");
}

// ─── migrate ─────────────────────────────────────────────────────────────────

#[test]
fn migrate_validate_flags_long_keywords() {
    let work_dir = setup_test_env();
    let fastlane = work_dir.path().join("fastlane/metadata");
    std::fs::create_dir_all(fastlane.join("en-US")).unwrap();
    std::fs::write(fastlane.join("en-US/keywords.txt"), "k".repeat(101)).unwrap();
    std::fs::write(fastlane.join("en-US/description.txt"), "Hello").unwrap();

    let output = run(
        work_dir.path(),
        None,
        &["migrate", "validate", "--fastlane-dir", fastlane.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(1));
    let result = stdout_json(&output);
    assert_eq!(result["valid"], false);
    assert_eq!(result["locales"], json!(["en-US"]));
    assert_eq!(result["issues"][0]["field"], "keywords");
}

#[test]
fn migrate_import_dry_run_lists_locales() {
    let work_dir = setup_test_env();
    let asc = fake_asc(metadata_route);
    let fastlane = work_dir.path().join("fastlane");
    std::fs::create_dir_all(fastlane.join("en-US")).unwrap();
    std::fs::write(fastlane.join("en-US/release_notes.txt"), "Bug fixes\n").unwrap();
    std::fs::write(fastlane.join("en-US/name.txt"), "Demo\n").unwrap();

    let output = run(
        work_dir.path(),
        Some(&asc.base),
        &[
            "migrate", "import", "--app", "app-1", "--version", "1.2.3",
            "--fastlane-dir", fastlane.to_str().unwrap(), "--dry-run",
        ],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let result = stdout_json(&output);
    assert_eq!(result["dryRun"], true);
    assert_eq!(result["localizations"], json!([{"locale": "en-US", "whatsNew": "Bug fixes"}]));
    assert_eq!(result["appInfoLocalizations"], json!([{"locale": "en-US", "name": "Demo"}]));
    assert!(asc.writes().is_empty());
}

#[test]
fn migrate_export_writes_fastlane_files() {
    let work_dir = setup_test_env();
    let asc = fake_asc(metadata_route);
    let out = work_dir.path().join("export");

    let output = run(
        work_dir.path(),
        Some(&asc.base),
        &["migrate", "export", "--app", "app-1", "--version", "1.2.3", "--output-dir", out.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let result = stdout_json(&output);
    assert_eq!(result["locales"], json!(["en-US", "ja"]));
    // en-US: description, keywords, name, subtitle. ja: description, name.
    assert_eq!(result["totalFiles"], 6);
    assert_eq!(std::fs::read_to_string(out.join("en-US/description.txt")).unwrap(), "Hello\n");
    assert_eq!(std::fs::read_to_string(out.join("ja/name.txt")).unwrap(), "デモ\n");
}

// ─── screenshots ─────────────────────────────────────────────────────────────

#[test]
fn screenshots_run_wait_only_plan() {
    let work_dir = setup_test_env();
    let plan = work_dir.path().join("plan.json");
    std::fs::write(
        &plan,
        r#"{
  // wait-only plan
  "version": 1,
  "app": { "bundle_id": "com.example.app" },
  "steps": [{ "action": "wait", "duration_ms": 1 }]
}"#,
    )
    .unwrap();

    let output = run(work_dir.path(), None, &["screenshots", "run", "--plan", plan.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));

    let result = stdout_json(&output);
    assert_eq!(result["bundle_id"], "com.example.app");
    assert_eq!(result["udid"], "booted");
    assert_eq!(result["steps"], json!([{"index": 1, "action": "wait", "status": "ok"}]));
}

#[test]
fn screenshots_run_bundle_id_override_passes_validation() {
    let work_dir = setup_test_env();
    let plan = work_dir.path().join("plan.json");
    std::fs::write(&plan, r#"{"version":1,"app":{},"steps":[{"action":"launch"}]}"#).unwrap();

    let output = run(
        work_dir.path(),
        None,
        &[
            "screenshots", "run", "--plan", plan.to_str().unwrap(),
            "--bundle-id", "com.override.app", "--dry-run",
        ],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout_json(&output)["bundle_id"], "com.override.app");
}

#[test]
fn screenshots_run_invalid_plan_fails() {
    let work_dir = setup_test_env();
    let plan = work_dir.path().join("plan.json");
    std::fs::write(&plan, r#"{"version":1,"app":{},"steps":[{"action":"launch"}]}"#).unwrap();

    let output = run(work_dir.path(), None, &["screenshots", "run", "--plan", plan.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stderr(&output).trim(), "Error: app.bundle_id is required");
}

fn write_manifest(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("manifest.json"),
        json!({"entries": [
            {"key": "k1", "screenshot_id": "home", "locale": "en-US", "device": "iphone", "status": "ready"},
            {"key": "k2", "screenshot_id": "home", "locale": "en-US", "device": "ipad", "status": "draft"}
        ]})
        .to_string(),
    )
    .unwrap();
}

#[test]
fn screenshots_review_approve_all_ready_is_idempotent() {
    let work_dir = setup_test_env();
    let review = work_dir.path().join("review");
    write_manifest(&review);
    let args = [
        "screenshots", "review", "approve", "--output-dir", review.to_str().unwrap(), "--all-ready",
    ];

    let first = run(work_dir.path(), None, &args);
    assert!(first.status.success(), "{}", stderr(&first));
    let result = stdout_json(&first);
    assert_eq!(result["matched"], 1);
    assert_eq!(result["added"], 1);
    assert_eq!(result["totalApproved"], 1);
    assert_eq!(result["keys"], json!(["k1"]));

    let second = run(work_dir.path(), None, &args);
    assert!(second.status.success(), "{}", stderr(&second));
    assert_eq!(stdout_json(&second)["added"], 0);

    let approvals: Value =
        serde_json::from_str(&std::fs::read_to_string(review.join("approved.json")).unwrap()).unwrap();
    assert_eq!(approvals, json!({"k1": true}));
}

#[test]
fn screenshots_review_approve_needs_a_selector() {
    let work_dir = setup_test_env();
    let review = work_dir.path().join("review");
    write_manifest(&review);

    let output = run(
        work_dir.path(),
        None,
        &["screenshots", "review", "approve", "--output-dir", review.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("provide at least one selector"));
}

#[test]
fn screenshots_review_open_dry_run() {
    let work_dir = setup_test_env();
    let review = work_dir.path().join("review");
    std::fs::create_dir_all(&review).unwrap();
    std::fs::write(review.join("index.html"), "<html></html>").unwrap();

    let output = run(
        work_dir.path(),
        None,
        &["screenshots", "review", "open", "--output-dir", review.to_str().unwrap(), "--dry-run"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    let result = stdout_json(&output);
    assert_eq!(result["opened"], false);
    assert_eq!(result["html_path"], review.join("index.html").display().to_string());
}
