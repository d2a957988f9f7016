//! Integration tests for the archive file reader.
//!
//! Exercises `git archive` buffering, tar parsing, the miss-vs-empty
//! outcome split, and the `read_file` lookup against real repositories.

mod fixture;

use fixture::TestRepo;

use repohist::{Error, LogOptions, TextMode};

/// The SHA-1 empty tree, present in every repository.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

fn snapshot_repo() -> (TestRepo, Vec<String>) {
    let repo = TestRepo::new();
    let mut hashes = Vec::new();

    repo.write("a.txt", "one\n");
    repo.write("dir/b.txt", "two\n");
    hashes.push(repo.commit_all("add files"));

    repo.write("a.txt", "ONE\n");
    hashes.push(repo.commit_all("shout a"));

    (repo, hashes)
}

#[test]
fn archive_lists_all_files_at_a_revision() {
    let (repo, hashes) = snapshot_repo();
    let archive = repo.repo().archive(&hashes[0], &[]).expect("archive");

    let mut names: Vec<String> = archive.files().map(|f| f.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "dir/b.txt"]);
}

#[test]
fn file_content_is_point_in_time() {
    let (repo, hashes) = snapshot_repo();
    let r = repo.repo();

    let old = r.archive(&hashes[0], &[]).unwrap();
    assert_eq!(old.file("a.txt").unwrap().data(), b"one\n");

    let new = r.archive(&hashes[1], &[]).unwrap();
    assert_eq!(new.file("a.txt").unwrap().data(), b"ONE\n");
    // The untouched file is identical at both revisions.
    assert_eq!(new.file("dir/b.txt").unwrap().data(), b"two\n");
}

#[test]
fn handles_share_one_buffer_and_read_lazily() {
    let (repo, hashes) = snapshot_repo();
    let archive = repo.repo().archive(&hashes[0], &[]).expect("archive");

    let a = archive.file("a.txt").unwrap();
    let b = archive.file("dir/b.txt").unwrap();
    // First read materializes, second returns the same bytes.
    assert_eq!(a.data(), a.data());
    assert_eq!(b.text(TextMode::Strict).unwrap(), "two\n");
    assert_eq!(a.size(), 4);
}

#[test]
fn mtime_is_the_commit_time() {
    let (repo, hashes) = snapshot_repo();
    let r = repo.repo();

    let commits: Vec<_> = r
        .log(&LogOptions::default())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let archive = r.archive(&hashes[0], &[]).unwrap();
    let file = archive.file("a.txt").unwrap();

    assert_eq!(file.mtime(), commits[0].committer.date.timestamp());
    assert_eq!(
        file.datetime().unwrap().timestamp(),
        commits[0].committer.date.timestamp()
    );
}

#[test]
fn path_filter_narrows_the_archive() {
    let (repo, hashes) = snapshot_repo();
    let archive = repo
        .repo()
        .archive(&hashes[0], &["dir/b.txt"])
        .expect("filtered archive");
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.files().next().unwrap().name(), "dir/b.txt");
}

#[test]
fn missing_path_with_filter_is_an_invocation_error() {
    let (repo, hashes) = snapshot_repo();
    let err = repo
        .repo()
        .archive(&hashes[0], &["no-such-file.txt"])
        .unwrap_err();
    match err {
        Error::Invocation { stderr, .. } => assert!(!stderr.is_empty()),
        other => panic!("expected Invocation, got {other:?}"),
    }
}

#[test]
fn empty_tree_without_filter_yields_zero_files() {
    let (repo, _) = snapshot_repo();
    let archive = repo.repo().archive(EMPTY_TREE, &[]).expect("empty tree");
    assert!(archive.is_empty());
}

#[test]
fn read_file_returns_historical_content() {
    let (repo, hashes) = snapshot_repo();
    let content = repo
        .repo()
        .read_file(&hashes[0], "a.txt")
        .expect("read_file")
        .expect("file exists");
    assert_eq!(content.data, b"one\n");
    assert_eq!(content.name, "a.txt");
    assert_eq!(content.text(TextMode::Strict).unwrap(), "one\n");
}

#[test]
fn read_file_miss_is_an_absent_result() {
    let (repo, hashes) = snapshot_repo();
    let result = repo
        .repo()
        .read_file(&hashes[0], "never-existed.txt")
        .expect("miss is not an error");
    assert!(result.is_none());
}

#[test]
fn read_file_with_invalid_revision_is_an_error() {
    let (repo, _) = snapshot_repo();
    let err = repo
        .repo()
        .read_file("bogus-revision", "a.txt")
        .unwrap_err();
    assert!(matches!(err, Error::Invocation { .. }));
}

#[test]
fn json_files_decode_through_the_handle() {
    let repo = TestRepo::new();
    repo.write("page.json", br#"{"page": 100, "lines": ["a", "b"]}"#.as_slice());
    let hash = repo.commit_all("add page");

    let archive = repo.repo().archive(&hash, &[]).unwrap();
    let value = archive.file("page.json").unwrap().json().unwrap();
    assert_eq!(value["page"], 100);
    assert_eq!(value["lines"][1], "b");
}

#[test]
fn commit_files_fetch_exactly_the_surviving_paths() {
    let (repo, _) = snapshot_repo();
    repo.write("c.txt", "three\n");
    repo.remove("a.txt");
    repo.commit_all("swap files");

    let r = repo.repo();
    let commits: Vec<_> = r
        .log(&LogOptions::default())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let last = commits.last().unwrap();

    let archive = r.commit_files(last).expect("commit files");
    let names: Vec<String> = archive.files().map(|f| f.name().to_string()).collect();
    assert_eq!(names, vec!["c.txt"]);
}

#[test]
fn commit_files_of_a_delete_only_commit_spawn_nothing() {
    let (repo, _) = snapshot_repo();
    repo.remove("a.txt");
    repo.commit_all("drop a");

    let r = repo.repo();
    let commits: Vec<_> = r
        .log(&LogOptions::default())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let archive = r.commit_files(commits.last().unwrap()).unwrap();
    assert!(archive.is_empty());
}

#[test]
fn independent_walks_can_interleave_archive_calls() {
    // A log walk driving one archive call per yielded commit: each owns
    // its own subprocess and buffer, so interleaving is safe.
    let (repo, _) = snapshot_repo();
    let r = repo.repo();

    let mut seen = Vec::new();
    for commit in r.log(&LogOptions::default()).unwrap() {
        let commit = commit.expect("commit parses");
        let archive = r.commit_files(&commit).expect("fetch snapshot delta");
        for file in archive.files() {
            seen.push((commit.hash.short(7).to_string(), file.name().to_string()));
        }
    }

    assert_eq!(seen.len(), 3); // a.txt + dir/b.txt, then a.txt again
}
