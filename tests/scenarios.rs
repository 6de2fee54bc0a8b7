//! End-to-end scenarios over real temporary repositories: object
//! round-trips, canonical trees, commit/HEAD movement, fast-forward and
//! conflicted merges, and hard reset.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use git_engine::config::Config;
use git_engine::errors::GitError;
use git_engine::hash::{HashKind, ObjectHash, get_hash_kind, set_hash_kind_for_test};
use git_engine::internal::object::blob::Blob;
use git_engine::internal::object::commit::Commit;
use git_engine::internal::object::signature::{Signature, SignatureType};
use git_engine::internal::object::tree::Tree;
use git_engine::internal::object::types::ObjectType;
use git_engine::internal::refs::{Head, RefExpectation, RefStore};
use git_engine::repo::Repository;
use git_engine::repo::commit::CommitOptions;
use git_engine::repo::merge::MergeOutcome;
use git_engine::repo::reset::ResetMode;
use git_engine::storage::ObjectStorage;

fn ada(t: SignatureType) -> Signature {
    Signature::from_parts(t, "Ada".into(), "ada@x".into(), 1700000000, "+0000".into())
}

fn opts() -> CommitOptions {
    CommitOptions {
        author: Some(ada(SignatureType::Author)),
        committer: Some(ada(SignatureType::Committer)),
        allow_empty: false,
    }
}

fn init_repo() -> (tempfile::TempDir, Repository) {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Repository::init(tmp.path()).unwrap();
    (tmp, repo)
}

/// S1: a single blob's framing, existence, read-back and prefix lookup.
#[test]
fn single_blob_round_trip() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let tmp = tempfile::tempdir().unwrap();
    let storage = ObjectStorage::init(tmp.path().join("objects"));

    let blob = Blob::from_content("hello\n");
    // canonical framing is `blob 6\0hello\n`
    assert_eq!(
        blob.id,
        ObjectHash::new(b"blob 6\x00hello\n"),
    );

    storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();
    assert!(storage.exist(&blob.id));
    assert_eq!(storage.get(&blob.id).unwrap(), b"hello\n");

    let prefix = &blob.id.to_string()[..4];
    assert_eq!(storage.resolve_prefix(prefix).unwrap(), blob.id);
}

/// S2: tree ids do not depend on staging order, and entries serialize in
/// canonical order.
#[test]
fn canonical_tree_is_order_independent() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);

    let build = |order: &[&str]| -> ObjectHash {
        let tmp = tempfile::tempdir().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        for name in order {
            fs::write(tmp.path().join(name), format!("content of {name}\n")).unwrap();
            repo.add(&[PathBuf::from(name)], false).unwrap();
        }
        let tree = repo.build_tree(&repo.load_index().unwrap()).unwrap();
        let names: Vec<&str> = tree.tree_items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a.txt", "b"]);
        tree.id
    };

    assert_eq!(build(&["b", "a", "a.txt"]), build(&["a", "a.txt", "b"]));
}

/// S3: commit moves HEAD, records the tree, and empty re-commits fail.
#[test]
fn commit_moves_head() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (tmp, repo) = init_repo();

    fs::write(tmp.path().join("README"), "# R\n").unwrap();
    repo.add(&[PathBuf::from("README")], false).unwrap();
    let id = repo.commit("init", opts()).unwrap();

    assert_eq!(repo.refs.head_commit().unwrap(), Some(id));
    let commit: Commit = repo.storage.load(&id).unwrap();
    assert_eq!(commit.author.name, "Ada");
    assert_eq!(commit.author.email, "ada@x");
    assert_eq!(commit.author.timestamp, 1700000000);

    let tree: Tree = repo.storage.load(&commit.tree_id).unwrap();
    assert_eq!(tree.tree_items.len(), 1);
    assert_eq!(tree.tree_items[0].name, "README");

    assert!(matches!(
        repo.commit("again", opts()),
        Err(GitError::NothingToCommit)
    ));
}

/// S4: merging a descendant fast-forwards without a merge commit.
#[test]
fn fast_forward_merge() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (tmp, repo) = init_repo();
    fs::write(tmp.path().join("base"), "b\n").unwrap();
    repo.add(&[], false).unwrap();
    repo.commit("base", opts()).unwrap();

    repo.checkout_new_branch("feature", false).unwrap();
    fs::write(tmp.path().join("f"), "f\n").unwrap();
    repo.add(&[], false).unwrap();
    let feature_tip = repo.commit("add f", opts()).unwrap();

    repo.checkout("main", false).unwrap();
    assert!(!tmp.path().join("f").exists());

    let outcome = repo.merge("feature", None).unwrap();
    assert_eq!(outcome, MergeOutcome::FastForward(feature_tip));
    assert_eq!(
        repo.refs.resolve("refs/heads/main").unwrap(),
        feature_tip
    );
    assert!(tmp.path().join("f").exists());

    // no merge commit was created
    let tip: Commit = repo.storage.load(&feature_tip).unwrap();
    assert_eq!(tip.parent_commit_ids.len(), 1);
}

/// S5: a content conflict leaves diff3 markers, conflict stages and
/// MERGE_HEAD behind.
#[test]
fn three_way_merge_with_conflict() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (tmp, repo) = init_repo();
    fs::write(tmp.path().join("x"), "A\n").unwrap();
    repo.add(&[], false).unwrap();
    repo.commit("base", opts()).unwrap();

    repo.checkout_new_branch("left", false).unwrap();
    fs::write(tmp.path().join("x"), "B\n").unwrap();
    repo.add(&[], false).unwrap();
    repo.commit("left", opts()).unwrap();

    repo.checkout("main", false).unwrap();
    repo.checkout_new_branch("right", false).unwrap();
    fs::write(tmp.path().join("x"), "C\n").unwrap();
    repo.add(&[], false).unwrap();
    repo.commit("right", opts()).unwrap();

    // on `left`, merge `right`: ours = B, theirs = C
    repo.checkout("left", false).unwrap();
    let result = repo.merge("right", None);
    assert!(matches!(result, Err(GitError::MergeConflict(1))));

    let content = fs::read_to_string(tmp.path().join("x")).unwrap();
    assert_eq!(
        content,
        "<<<<<<< ours\nB\n||||||| base\nA\n=======\nC\n>>>>>>> theirs\n"
    );

    let right_tip = repo.refs.resolve("refs/heads/right").unwrap();
    assert_eq!(
        fs::read_to_string(repo.git_dir().join("MERGE_HEAD")).unwrap(),
        format!("{right_tip}\n")
    );

    let index = repo.load_index().unwrap();
    assert_eq!(index.conflicted_paths(), vec!["x".to_string()]);
}

/// S6: hard reset rewinds HEAD, index and working tree, discarding a
/// local edit.
#[test]
fn hard_reset_discards_and_rewinds() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (tmp, repo) = init_repo();
    fs::write(tmp.path().join("x"), "v1").unwrap();
    repo.add(&[], false).unwrap();
    let first = repo.commit("one", opts()).unwrap();

    fs::write(tmp.path().join("x"), "v2").unwrap();
    repo.add(&[], false).unwrap();
    repo.commit("two", opts()).unwrap();

    fs::write(tmp.path().join("x"), "dirty").unwrap();
    repo.reset("HEAD~1", ResetMode::Hard).unwrap();

    assert_eq!(fs::read_to_string(tmp.path().join("x")).unwrap(), "v1");
    assert_eq!(repo.refs.head_commit().unwrap(), Some(first));
    let index = repo.load_index().unwrap();
    let entry = index.get("x", 0).unwrap();
    assert_eq!(entry.hash, repo.calc_file_blob_hash(&tmp.path().join("x")).unwrap());
}

/// Store idempotence: writing the same object twice leaves one object.
#[test]
fn store_is_idempotent() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let tmp = tempfile::tempdir().unwrap();
    let storage = ObjectStorage::init(tmp.path().join("objects"));

    let blob = Blob::from_content("idempotent\n");
    storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();
    let hex = blob.id.to_string();
    let path = tmp.path().join("objects").join(&hex[..2]).join(&hex[2..]);
    let first_bytes = fs::read(&path).unwrap();

    storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();
    assert_eq!(fs::read(&path).unwrap(), first_bytes);
}

/// Ref atomicity: concurrent writers never produce a torn value.
#[test]
fn concurrent_ref_updates_are_never_torn() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("refs/heads")).unwrap();
    fs::write(tmp.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();

    let candidates: Vec<ObjectHash> = (1u8..=8).map(|n| ObjectHash::Sha1([n; 20])).collect();
    let git_dir = tmp.path().to_path_buf();

    std::thread::scope(|scope| {
        for id in &candidates {
            let git_dir = git_dir.clone();
            scope.spawn(move || {
                let store = RefStore::new(git_dir);
                // contending writers retry on the transient lock
                loop {
                    match store.update("refs/heads/main", id, RefExpectation::Any) {
                        Ok(()) => break,
                        Err(GitError::LockBusy(_)) => std::thread::yield_now(),
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
    });

    let store = RefStore::new(tmp.path().to_path_buf());
    let value = store.resolve("refs/heads/main").unwrap();
    assert!(candidates.contains(&value), "observed {value}");
}

/// Commit round-trip: re-staging a checked-out commit reproduces its tree.
#[test]
fn commit_round_trip_reproduces_tree() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (tmp, repo) = init_repo();
    fs::create_dir_all(tmp.path().join("src")).unwrap();
    fs::write(tmp.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();
    fs::write(tmp.path().join("README"), "# R\n").unwrap();
    repo.add(&[], false).unwrap();
    let original = repo.commit("init", opts()).unwrap();

    repo.checkout(&original.to_string(), false).unwrap();
    repo.add(&[], false).unwrap();
    let mut allow_empty = opts();
    allow_empty.allow_empty = true;
    let replayed = repo.commit("replay", allow_empty).unwrap();

    let original_commit: Commit = repo.storage.load(&original).unwrap();
    let replayed_commit: Commit = repo.storage.load(&replayed).unwrap();
    assert_eq!(original_commit.tree_id, replayed_commit.tree_id);
}

/// Merge of a repository with itself is a no-op (H = S = B).
#[test]
fn merge_self_is_no_op() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (tmp, repo) = init_repo();
    fs::write(tmp.path().join("a"), "1\n").unwrap();
    repo.add(&[], false).unwrap();
    let tip = repo.commit("only", opts()).unwrap();

    assert_eq!(
        repo.merge("main", None).unwrap(),
        MergeOutcome::AlreadyUpToDate
    );
    assert_eq!(repo.refs.head_commit().unwrap(), Some(tip));
}

/// Detached HEAD round trip through checkout and commit.
#[test]
fn detached_head_commit_moves_head_itself() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (tmp, repo) = init_repo();
    fs::write(tmp.path().join("a"), "1\n").unwrap();
    repo.add(&[], false).unwrap();
    let first = repo.commit("one", opts()).unwrap();

    repo.checkout(&first.to_string(), false).unwrap();
    assert_eq!(repo.head().unwrap(), Head::Detached(first));

    fs::write(tmp.path().join("a"), "detached edit\n").unwrap();
    repo.add(&[], false).unwrap();
    let second = repo.commit("detached", opts()).unwrap();

    assert_eq!(repo.head().unwrap(), Head::Detached(second));
    // the branch did not move
    assert_eq!(repo.refs.resolve("refs/heads/main").unwrap(), first);
}

/// A repository declaring `extensions.objectformat = sha256` runs the
/// whole add/commit/reset flow on 32-byte ids: 64-hex commit ids, wide
/// ids embedded in trees, and a SHA-256 index trailer.
#[test]
fn sha256_repository_end_to_end() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let tmp = tempfile::tempdir().unwrap();

    // declare the object format before any object is written
    let git_dir = {
        let repo = Repository::init(tmp.path()).unwrap();
        repo.git_dir().to_path_buf()
    };
    let mut config = Config::load(git_dir.join("config")).unwrap();
    config.set("extensions", None, "objectformat", "sha256");
    config.save(git_dir.join("config")).unwrap();

    let repo = Repository::open(tmp.path()).unwrap();
    assert_eq!(get_hash_kind(), HashKind::Sha256);

    fs::write(tmp.path().join("wide"), "v1\n").unwrap();
    repo.add(&[], false).unwrap();
    let first = repo.commit("one", opts()).unwrap();
    assert_eq!(first.to_string().len(), 64);

    // trees carry raw 32-byte ids and decode back under the wide width
    let commit: Commit = repo.storage.load(&first).unwrap();
    let tree: Tree = repo.storage.load(&commit.tree_id).unwrap();
    assert_eq!(tree.tree_items.len(), 1);
    assert_eq!(tree.tree_items[0].id.kind(), HashKind::Sha256);

    fs::write(tmp.path().join("wide"), "v2 grew longer\n").unwrap();
    repo.add(&[], false).unwrap();
    let second = repo.commit("two", opts()).unwrap();
    assert_ne!(first, second);

    // the index round-trips through its SHA-256 trailer on every load
    let index = repo.load_index().unwrap();
    assert_eq!(
        index.get("wide", 0).unwrap().hash.kind(),
        HashKind::Sha256
    );

    // hard reset walks commits and trees back through wide-id decoding
    repo.reset("HEAD~1", ResetMode::Hard).unwrap();
    assert_eq!(fs::read_to_string(tmp.path().join("wide")).unwrap(), "v1\n");
    assert_eq!(repo.refs.head_commit().unwrap(), Some(first));
    assert!(repo.status().unwrap().is_clean());
}

/// Hash determinism over arbitrary content.
#[test]
fn blob_hash_is_deterministic() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);

    fn prop(data: Vec<u8>) -> bool {
        let a = Blob::from_content_bytes(data.clone());
        let b = Blob::from_content_bytes(data);
        a.id == b.id && ObjectHash::from_str(&a.id.to_string()).unwrap() == a.id
    }
    quickcheck::quickcheck(prop as fn(Vec<u8>) -> bool);
}
