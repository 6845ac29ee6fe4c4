use assert_cmd::prelude::*;
use folio::models::ReadingProgress;
use folio::progress::save_progress;
use folio::state::{DurableState, State};
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const CHAPTER: &str = r#"<html><body>
<h1>Chapter One</h1>
<p>Hello <em>brave</em> world</p>
<p id="closing">The end.</p>
</body></html>"#;

fn folio(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("folio").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home);
    cmd.env_remove("FOLIO_LOG");
    cmd
}

fn chapter_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("ch1.xhtml");
    std::fs::write(&path, CHAPTER).unwrap();
    path
}

#[test]
fn test_blocks_lists_generated_and_source_ids() {
    let dir = TempDir::new().unwrap();
    let file = chapter_file(&dir);
    folio(dir.path())
        .arg("blocks")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicates::str::contains("__auto_0\tChapter One"))
        .stdout(predicates::str::contains("__auto_1\tHello brave world"))
        .stdout(predicates::str::contains("closing\tThe end."));
}

#[test]
fn test_blocks_custom_prefix() {
    let dir = TempDir::new().unwrap();
    let file = chapter_file(&dir);
    folio(dir.path())
        .args(["blocks", "--prefix", "b-"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicates::str::contains("b-1\tHello brave world"));
}

#[test]
fn test_resolve_prints_anchor() {
    let dir = TempDir::new().unwrap();
    let file = chapter_file(&dir);
    folio(dir.path())
        .arg("resolve")
        .arg(&file)
        .args(["--from", "__auto_1:6", "--to", "__auto_1:11"])
        .assert()
        .success()
        .stdout(predicates::str::contains("__auto_1\t6\t11\tbrave"));
}

#[test]
fn test_resolve_rejects_multi_block_selection() {
    let dir = TempDir::new().unwrap();
    let file = chapter_file(&dir);
    folio(dir.path())
        .arg("resolve")
        .arg(&file)
        .args(["--from", "__auto_1:3", "--to", "closing:3"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("more than one paragraph"));
}

#[test]
fn test_locate_reports_drift() {
    let dir = TempDir::new().unwrap();
    let file = chapter_file(&dir);
    folio(dir.path())
        .arg("locate")
        .arg(&file)
        .args(["__auto_1", "12", "17"])
        .assert()
        .success()
        .stdout(predicates::str::contains("world"));

    folio(dir.path())
        .arg("locate")
        .arg(&file)
        .args(["closing", "0", "40"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("anchor needs 40"));
}

#[test]
fn test_render_paints_annotations_from_file() {
    let dir = TempDir::new().unwrap();
    let file = chapter_file(&dir);
    let annotations = dir.path().join("annotations.json");
    std::fs::write(
        &annotations,
        r#"[
            {"id": "a1", "chapterHref": "ch1.xhtml", "anchorId": "__auto_1", "start": 6, "end": 11,
             "style": "underline", "text": "brave",
             "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"},
            {"id": "a2", "chapterHref": "ch2.xhtml", "anchorId": "__auto_1", "start": 0, "end": 5,
             "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"}
        ]"#,
    )
    .unwrap();

    folio(dir.path())
        .arg("render")
        .arg(&file)
        .arg("--annotations")
        .arg(&annotations)
        .assert()
        .success()
        .stdout(predicates::str::contains(r#"data-annotation-id="a1""#))
        .stdout(predicates::str::contains("folio-annotation-underline"))
        .stdout(predicates::str::contains(r#"data-annotation-id="a2""#).not());
}

#[test]
fn test_progress_reads_stored_position() {
    let dir = TempDir::new().unwrap();
    {
        let mut state = DurableState::new(Box::new(State::open(&dir.path().join("folio/states.db")).unwrap()));
        let progress = ReadingProgress {
            chapter_href: "ch2.xhtml".to_string(),
            anchor_block_id: Some("__auto_4".to_string()),
            scroll_percent: 0.5,
            chapter_title: Some("Two".to_string()),
            spine_index: Some(1),
            updated_at: chrono::Utc::now(),
        };
        save_progress(&mut state, "book-1", &progress);
    }

    folio(dir.path())
        .args(["progress", "book-1", "--chapters", "4"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Read 38% · Two"))
        .stdout(predicates::str::contains("__auto_4"));

    folio(dir.path())
        .args(["progress", "book-1", "--clear"])
        .assert()
        .success();

    folio(dir.path())
        .args(["progress", "book-1"])
        .assert()
        .success()
        .stdout(predicates::str::contains("No reading position stored"));
}

#[test]
fn test_progress_clear_fails_when_state_cannot_be_stored() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();
    let config_home = blocker.join("config");

    folio(&config_home)
        .args(["progress", "book-1"])
        .assert()
        .success()
        .stdout(predicates::str::contains("No reading position stored"));

    folio(&config_home)
        .args(["progress", "book-1", "--clear"])
        .assert()
        .failure()
        .stdout(predicates::str::contains("Cleared").not());
}
