use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kb");
    path
}

fn write_doc(path: &Path, header: &str, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("---\n{}---\n\n{}\n", header, body)).unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let android = root.join("corpus").join("android");
    write_doc(
        &android.join("01_beginners/01. Introduction to Android.md"),
        "canonical_id: \"android-01\"\nslug: \"intro\"\ntitle: \"Introduction to Android\"\nlevel: \"beginner\"\nnumber: 1\ntags: [\"architecture\", \"fundamentals\"]\nestimated_minutes: 20\n",
        "This is a test content about Android development basics.",
    );
    write_doc(
        &android.join("01_beginners/02. Activities and Lifecycle.md"),
        "canonical_id: \"android-02\"\nslug: \"activities\"\ntitle: \"Activities and Lifecycle\"\nnumber: 2\ntags: [\"lifecycle\"]\n",
        "Activities move through created, started, resumed and paused states.",
    );
    write_doc(
        &android.join("02_intermediate/03. Kotlin Coroutines.md"),
        "canonical_id: \"kotlin-03\"\nslug: \"coroutines\"\ntitle: \"Kotlin Coroutines\"\nnumber: 3\ntags: [\"kotlin\", \"coroutines\"]\nprerequisites: [\"activities\"]\n",
        "This is about Kotlin coroutines and async programming.",
    );

    let config_content = format!(
        r#"[db]
path = "{}/data/kb.sqlite"

[similarity]
warn_threshold = 0.5
reject_threshold = 0.6
"#,
        root.display()
    );

    let config_path = config_dir.join("kb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn corpus_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("corpus")
        .join("android")
}

fn run_kb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn reindexed() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let corpus = corpus_path(&config_path);
    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["reindex", corpus.to_str().unwrap(), "--progress", "off"],
    );
    assert!(success, "reindex failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

fn json_ids(stdout: &str) -> Vec<String> {
    let value: serde_json::Value = serde_json::from_str(stdout).unwrap();
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["canonical_id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_reindex_corpus() {
    let (_tmp, config_path) = setup_test_env();
    let corpus = corpus_path(&config_path);

    let (stdout, stderr, success) =
        run_kb(&config_path, &["reindex", corpus.to_str().unwrap()]);
    assert!(success, "reindex failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("reindex android"));
    assert!(stdout.contains("inserted: 3"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_reindex_idempotent() {
    let (_tmp, config_path) = reindexed();
    let corpus = corpus_path(&config_path);

    let (stdout, _, success) = run_kb(&config_path, &["reindex", corpus.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("inserted: 0"));
    assert!(stdout.contains("unchanged: 3"));

    let (stdout, _, _) = run_kb(&config_path, &["list", "--json"]);
    assert_eq!(json_ids(&stdout), vec!["android-01", "android-02", "kotlin-03"]);
}

#[test]
fn test_reindex_multiple_corpora() {
    let (tmp, config_path) = setup_test_env();
    let android = corpus_path(&config_path);
    let devops = tmp.path().join("corpus").join("devops");
    for i in 1..=20 {
        write_doc(
            &devops.join(format!("01_beginners/{:02}. Pipeline {}.md", i, i)),
            &format!(
                "canonical_id: \"devops-{:02}\"\nslug: \"pipeline-{}\"\ntitle: \"Pipeline {}\"\nnumber: {}\n",
                i, i, i, i
            ),
            "Stages, runners and artifacts.",
        );
    }

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &[
            "reindex",
            android.to_str().unwrap(),
            devops.to_str().unwrap(),
            "--progress",
            "off",
        ],
    );
    assert!(success, "reindex failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("reindex android"));
    assert!(stdout.contains("reindex devops"));
    assert!(stdout.contains("inserted: 20"));
    assert_eq!(stdout.matches("  failed: 0").count(), 2);

    let (stdout, _, _) = run_kb(&config_path, &["list", "--knowledgebase", "devops", "--json"]);
    assert_eq!(json_ids(&stdout).len(), 20);
}

#[test]
fn test_reindex_skips_malformed_file() {
    let (_tmp, config_path) = setup_test_env();
    let corpus = corpus_path(&config_path);
    fs::write(
        corpus.join("01_beginners/broken.md"),
        "---\nlevel: wizard\ncanonical_id: broken\n---\n\nbody\n",
    )
    .unwrap();

    let (stdout, stderr, success) =
        run_kb(&config_path, &["reindex", corpus.to_str().unwrap()]);
    assert!(success, "reindex failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("inserted: 3"));
    assert!(stdout.contains("failed: 1"));
    assert!(stderr.contains("broken.md"));
}

#[test]
fn test_reindex_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();
    let corpus = corpus_path(&config_path);

    let (stdout, _, success) = run_kb(
        &config_path,
        &["reindex", corpus.to_str().unwrap(), "--dry-run"],
    );
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("parseable: 3"));

    let (stdout, _, success) = run_kb(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_and_filters() {
    let (_tmp, config_path) = reindexed();

    let (stdout, stderr, success) = run_kb(&config_path, &["search", "coroutines", "--json"]);
    assert!(success, "search failed: {}", stderr);
    assert_eq!(json_ids(&stdout), vec!["kotlin-03"]);

    let (stdout, _, _) = run_kb(&config_path, &["search", "lifecycle", "--json"]);
    assert_eq!(json_ids(&stdout), vec!["android-02"]);

    let (stdout, _, _) = run_kb(&config_path, &["list", "--level", "beginners", "--json"]);
    assert_eq!(json_ids(&stdout), vec!["android-01", "android-02"]);

    let (stdout, _, _) = run_kb(
        &config_path,
        &["list", "--tag", "kotlin", "--tag", "lifecycle", "--json"],
    );
    assert_eq!(json_ids(&stdout), vec!["android-02", "kotlin-03"]);

    // FTS syntax characters are treated as text.
    let (_, stderr, success) = run_kb(&config_path, &["search", "coroutines AND", "--json"]);
    assert!(success, "search with FTS syntax failed: {}", stderr);
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = reindexed();

    let (stdout, _, success) = run_kb(&config_path, &["search", "kubernetes"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_get_by_slug_and_id() {
    let (_tmp, config_path) = reindexed();

    let (stdout, stderr, success) =
        run_kb(&config_path, &["get", "activities", "--knowledgebase", "android"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("--- Document ---"));
    assert!(stdout.contains("android-02"));

    let (stdout, _, success) = run_kb(&config_path, &["get", "--id", "kotlin-03", "--json"]);
    assert!(success);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["level"], "intermediate");
    assert_eq!(record["prerequisites"][0], "activities");
}

#[test]
fn test_get_missing() {
    let (_tmp, config_path) = reindexed();

    let (_, stderr, success) = run_kb(&config_path, &["get", "--id", "nope"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_resolve_filename_ladder() {
    let (_tmp, config_path) = reindexed();

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["resolve", "./02.%20Activities%20and%20Lifecycle.md", "--knowledgebase", "android"],
    );
    assert!(success, "resolve failed: {}", stderr);
    assert!(stdout.contains("android-02"));

    // Renumbered link still resolves after stripping the prefix.
    let (stdout, _, success) = run_kb(
        &config_path,
        &["resolve", "./14. Activities and Lifecycle.md"],
    );
    assert!(success);
    assert!(stdout.contains("android/activities"));
}

#[test]
fn test_roadmap_export() {
    let (tmp, config_path) = reindexed();
    let output = tmp.path().join("out").join("android.json");

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["roadmap", "android", "--output", output.to_str().unwrap()],
    );
    assert!(success, "roadmap failed: {}", stderr);
    assert!(stdout.contains("3 nodes"));

    let roadmap: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let edges: Vec<&str> = roadmap["edges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(edges, vec!["android-01-android-02", "android-02-kotlin-03"]);
}

#[test]
fn test_check_and_admit() {
    let (tmp, config_path) = reindexed();
    let drafts = tmp.path().join("drafts").join("android").join("01_beginners");

    let near = drafts.join("intro-dev.md");
    write_doc(
        &near,
        "canonical_id: \"android-09\"\nslug: \"intro-dev\"\ntitle: \"Introduction to Android Development\"\nnumber: 9\ntags: [\"architecture\", \"fundamentals\"]\n",
        "This is a test content about Android development basics and fundamentals.",
    );

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["check", near.to_str().unwrap(), "--knowledgebase", "android"],
    );
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("android-01"));
    assert!(stdout.contains("would be rejected"));

    let (stdout, _, success) = run_kb(
        &config_path,
        &["admit", near.to_str().unwrap(), "--knowledgebase", "android"],
    );
    assert!(!success, "near-duplicate was admitted");
    assert!(stdout.contains("rejected android-09"));

    let fresh = drafts.join("gradle.md");
    write_doc(
        &fresh,
        "canonical_id: \"android-10\"\nslug: \"gradle\"\ntitle: \"Gradle Build Variants\"\nnumber: 10\ntags: [\"gradle\"]\n",
        "Flavors, build types and signing configs for release pipelines.",
    );
    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["admit", fresh.to_str().unwrap(), "--knowledgebase", "android"],
    );
    assert!(success, "admit failed: {}", stderr);
    assert!(stdout.contains("admitted android-10 (inserted)"));

    // Second admission of the same id is a conflict.
    let (_, stderr, success) = run_kb(
        &config_path,
        &["admit", fresh.to_str().unwrap(), "--knowledgebase", "android"],
    );
    assert!(!success);
    assert!(stderr.contains("canonical_id"));
}

#[test]
fn test_check_infers_knowledgebase_past_topic_folder() {
    let (tmp, config_path) = reindexed();
    let draft = tmp
        .path()
        .join("drafts/android/ui/01_beginners/intro-dev.md");
    write_doc(
        &draft,
        "canonical_id: \"android-09\"\nslug: \"intro-dev\"\ntitle: \"Introduction to Android Development\"\nnumber: 9\ntags: [\"architecture\", \"fundamentals\"]\n",
        "This is a test content about Android development basics and fundamentals.",
    );

    let (stdout, stderr, success) = run_kb(&config_path, &["check", draft.to_str().unwrap()]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("android-01"));
    assert!(stdout.contains("would be rejected"));

    let orphan = tmp.path().join("drafts/misc/note.md");
    write_doc(&orphan, "canonical_id: \"misc-01\"\n", "Loose note.");
    let (_, stderr, success) = run_kb(&config_path, &["admit", orphan.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("--knowledgebase"));
}

#[test]
fn test_dupes_exit_code() {
    let (_tmp, config_path) = setup_test_env();
    let corpus = corpus_path(&config_path);

    let (stdout, _, success) = run_kb(&config_path, &["dupes", corpus.to_str().unwrap()]);
    assert!(success, "clean corpus reported dupes: {}", stdout);

    fs::copy(
        corpus.join("01_beginners/01. Introduction to Android.md"),
        corpus.join("01_beginners/01. Introduction to Android (copy).md"),
    )
    .unwrap();
    let (stdout, _, success) = run_kb(&config_path, &["dupes", corpus.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("canonical_id"));
}

#[test]
fn test_links_exit_code() {
    let (_tmp, config_path) = reindexed();
    let corpus = corpus_path(&config_path);
    let page = corpus.join("01_beginners/04. Further Reading.md");
    write_doc(
        &page,
        "canonical_id: \"android-04\"\ntitle: \"Further Reading\"\nnumber: 4\n",
        "- [Activities](./02.%20Activities%20and%20Lifecycle.md)\n- [Coroutines](./09.%20Kotlin%20Coroutines.md)",
    );

    let (stdout, stderr, success) = run_kb(&config_path, &["links", corpus.to_str().unwrap()]);
    assert!(success, "links failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("links android"));
    assert!(stdout.contains("  links: 2"));
    assert!(stdout.contains("  stale: 1"));
    assert!(stdout.contains("  broken: 0"));
    assert!(stdout.contains("03. Kotlin Coroutines.md"));

    let (_, _, success) = run_kb(&config_path, &["links", corpus.to_str().unwrap(), "--strict"]);
    assert!(!success);

    write_doc(
        &page,
        "canonical_id: \"android-04\"\ntitle: \"Further Reading\"\nnumber: 4\n",
        "- [Compose](./Jetpack%20Compose.md)",
    );
    let (stdout, stderr, success) = run_kb(&config_path, &["links", corpus.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("  broken: 1"));
    assert!(stdout.contains("./Jetpack%20Compose.md"));
    assert!(stderr.contains("unresolved link"));
}

#[test]
fn test_stats_and_topics() {
    let (_tmp, config_path) = reindexed();

    let (stdout, _, success) = run_kb(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("android"));

    let (stdout, _, success) = run_kb(&config_path, &["topics", "android"]);
    assert!(success);
    assert!(stdout.contains("No topics in android."));
}

#[test]
fn test_projects_pipeline() {
    let (tmp, config_path) = reindexed();
    let briefs = tmp.path().join("projects");
    write_doc(
        &briefs.join("android/01_beginners/todo.md"),
        "canonical_id: \"proj-todo\"\ntitle: \"Todo App\"\nestimated_hours: 4\n",
        "### Project Requirements\n- Persist items\n\n## Challenge 1: Setup (Easy)\n\n#### Step 1.1: Install SDK\nInstall the SDK and create a project.\n\n### Hints\n- Use the wizard\n",
    );

    let (stdout, stderr, success) =
        run_kb(&config_path, &["projects", "index", briefs.to_str().unwrap()]);
    assert!(success, "projects index failed: {}", stderr);
    assert!(stdout.contains("inserted: 1"));

    let (stdout, _, success) = run_kb(&config_path, &["projects", "show", "todo", "--json"]);
    assert!(success);
    let project: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(project["topic"], "android");
    assert_eq!(project["challenges"][0]["challenge_number"], 1);
    assert_eq!(project["challenges"][0]["steps"][0]["number"], 101);
    assert_eq!(project["challenges"][0]["steps"][0]["hints"][0], "Use the wizard");

    let (stdout, _, success) = run_kb(&config_path, &["projects", "topics"]);
    assert!(success);
    assert!(stdout.contains("Android Development"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_kb(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
