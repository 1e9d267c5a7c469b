use std::fs::File;
use std::io::{Read, Write};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant, SystemTime};

use tempfile::TempDir;
use yao_fs::{Cancel, FileSystem, FsError, LocalFs, WalkFlow};

fn store() -> (TempDir, LocalFs) {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFs::new(dir.path()).unwrap();
    (dir, fs)
}

#[test]
fn write_read_round_trip() {
    let (_dir, fs) = store();
    let data = b"The quick brown fox";
    assert_eq!(fs.write_file("/docs/fox.txt", data, 0o640).unwrap(), data.len());

    assert_eq!(fs.read_file("/docs/fox.txt").unwrap(), data);
    assert_eq!(fs.size("/docs/fox.txt").unwrap(), data.len() as u64);
    #[cfg(unix)]
    assert_eq!(fs.mode("/docs/fox.txt").unwrap(), 0o640);
    assert!(fs.is_file("/docs/fox.txt"));
    assert!(fs.is_dir("/docs"));
    assert!(!fs.is_link("/docs/fox.txt"));
    assert!(fs.mod_time("/docs/fox.txt").unwrap() <= SystemTime::now());

    let mut text = String::new();
    fs.read_closer("/docs/fox.txt")
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text.as_bytes(), data);
}

#[test]
fn append_and_stream_writes() {
    let (_dir, fs) = store();
    fs.append_file("/log.txt", b"one\n", 0o644).unwrap();
    fs.append("/log.txt", &mut &b"two\n"[..], 0o644).unwrap();
    assert_eq!(fs.read_file("/log.txt").unwrap(), b"one\ntwo\n");

    assert_eq!(fs.write("/log.txt", &mut &b"reset"[..], 0o644).unwrap(), 5);
    fs.insert("/log.txt", 0, &mut &b">"[..], 0o644).unwrap();
    assert_eq!(fs.read_file("/log.txt").unwrap(), b">reset");

    {
        let mut w = fs.write_closer("/stream.bin", 0o600).unwrap();
        w.write_all(b"streamed").unwrap();
    }
    assert_eq!(fs.read_file("/stream.bin").unwrap(), b"streamed");
}

#[test]
fn remove_all_is_idempotent() {
    let (_dir, fs) = store();
    fs.remove_all("/never/created").unwrap();
    fs.remove("/never/created").unwrap();

    fs.write_file("/tree/a/b.txt", b"x", 0o644).unwrap();
    fs.remove_all("/tree").unwrap();
    assert!(!fs.exists("/tree").unwrap());
    fs.remove_all("/tree").unwrap();
}

#[test]
fn remove_refuses_non_empty_directories() {
    let (_dir, fs) = store();
    fs.write_file("/full/a.txt", b"x", 0o644).unwrap();
    assert!(fs.remove("/full").is_err());
    fs.remove("/full/a.txt").unwrap();
    fs.remove("/full").unwrap();
}

#[test]
fn mkdir_temp_patterns() {
    let (_dir, fs) = store();
    let logs = fs.mkdir_temp("/work", "*-logs").unwrap();
    assert!(logs.starts_with("/work/"));
    assert!(logs.ends_with("-logs"));
    assert!(fs.is_dir(&logs));

    let run = fs.mkdir_temp("/work", "run-").unwrap();
    assert!(run.starts_with("/work/run-"));

    fs.write_file("/plain", b"x", 0o644).unwrap();
    assert!(fs.mkdir_temp("/plain", "").is_err());

    let os_temp = fs.mkdir_temp("", "").unwrap();
    assert!(fs.is_dir(&os_temp));
    fs.remove_all(&os_temp).unwrap();
}

#[test]
fn recursive_read_dir_sees_every_file() {
    let (_dir, fs) = store();
    let files = ["/r/a.txt", "/r/x/b.txt", "/r/x/y/c.txt", "/r/z/d.txt"];
    for f in files {
        fs.write_file(f, b"-", 0o644).unwrap();
    }

    let all = fs.read_dir("/r", true).unwrap();
    for f in files {
        assert!(all.contains(&f.to_string()), "{} missing from {:?}", f, all);
    }
    assert!(!all.contains(&"/r".to_string()));
    let x = all.iter().position(|p| p == "/r/x").unwrap();
    let b = all.iter().position(|p| p == "/r/x/b.txt").unwrap();
    assert!(x < b);

    let top = fs.read_dir("/r", false).unwrap();
    assert_eq!(top, vec!["/r/a.txt", "/r/x", "/r/z"]);
}

#[test]
fn parent_components_are_rejected() {
    let (_dir, fs) = store();
    for path in ["/../outside", "a/../../b", ".."] {
        assert!(matches!(
            fs.read_dir(path, false),
            Err(FsError::InvalidPath { .. })
        ));
        assert!(fs.mkdir_all(path, 0o755).is_err());
        assert!(fs.copy("/x", path).is_err());
        assert!(fs.move_path(path, "/x").is_err());
        assert!(fs.abs(path).is_err());
    }
}

#[test]
fn allow_beats_deny() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFs::new(dir.path())
        .unwrap()
        .with_allow(["/data/**/*.txt"])
        .unwrap()
        .with_deny(["/data/**/*"])
        .unwrap();

    fs.write_file("/data/x.txt", b"ok", 0o644).unwrap();
    assert_eq!(fs.read_file("/data/x.txt").unwrap(), b"ok");
    fs.write_file("/data/deep/y.txt", b"ok", 0o644).unwrap();

    let err = fs.write_file("/data/y.bin", b"no", 0o644).unwrap_err();
    assert!(matches!(err, FsError::PermissionDenied { .. }));
    assert_eq!(err.status(), 403);

    fs.write_file("/elsewhere/z.bin", b"free", 0o644).unwrap();
}

#[test]
fn glob_and_walk() {
    let (_dir, fs) = store();
    for f in ["/g/a.txt", "/g/b.txt", "/g/c.md", "/g/sub/d.md"] {
        fs.write_file(f, b"-", 0o644).unwrap();
    }
    assert_eq!(fs.glob("/g/*.txt").unwrap(), vec!["/g/a.txt", "/g/b.txt"]);

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    fs.walk(
        "/g",
        &mut |path: &str, is_dir: bool| {
            if is_dir {
                dirs.push(path.to_string());
            } else {
                files.push(path.to_string());
            }
            Ok(WalkFlow::Continue)
        },
        &["*.md".to_string()],
        None,
    )
    .unwrap();
    assert_eq!(files, vec!["/g/c.md", "/g/sub/d.md"]);
    assert_eq!(dirs, vec!["/g/sub"]);
}

#[test]
fn copy_move_append_and_insert() {
    let (_dir, fs) = store();
    fs.write_file("/src/a.txt", b"alpha", 0o644).unwrap();
    fs.copy("/src", "/copy").unwrap();
    assert_eq!(fs.read_file("/copy/a.txt").unwrap(), b"alpha");
    assert!(fs.exists("/src/a.txt").unwrap());

    fs.write_file("/part", b"-beta", 0o644).unwrap();
    fs.move_append("/part", "/copy/a.txt").unwrap();
    assert!(!fs.exists("/part").unwrap());
    assert_eq!(fs.read_file("/copy/a.txt").unwrap(), b"alpha-beta");

    fs.write_file("/mid", b"[x]", 0o644).unwrap();
    fs.move_insert("/mid", "/copy/a.txt", 5).unwrap();
    assert_eq!(fs.read_file("/copy/a.txt").unwrap(), b"alpha[x]-beta");

    fs.move_path("/copy", "/moved/copy").unwrap();
    assert!(!fs.exists("/copy").unwrap());
    assert!(fs.is_file("/moved/copy/a.txt"));
}

#[test]
fn mime_type_sniffs_content() {
    let (_dir, fs) = store();
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    fs.write_file("/looks-like.txt", &png, 0o644).unwrap();
    fs.write_file("/plain.bin", b"just words", 0o644).unwrap();
    assert_eq!(fs.mime_type("/looks-like.txt").unwrap(), "image/png");
    assert_eq!(
        fs.mime_type("/plain.bin").unwrap(),
        "text/plain; charset=utf-8"
    );
}

#[test]
fn zip_and_unzip() {
    let (_dir, fs) = store();
    fs.write_file("/pack/one.txt", b"1", 0o644).unwrap();
    fs.write_file("/pack/two/two.txt", b"22", 0o644).unwrap();
    fs.zip("/pack", "/out/pack.zip").unwrap();

    let files = fs.unzip("/out/pack.zip", "/unpacked", None).unwrap();
    assert_eq!(files, vec!["/unpacked/one.txt", "/unpacked/two/two.txt"]);
    assert_eq!(fs.read_file("/unpacked/two/two.txt").unwrap(), b"22");
}

fn touch(fs: &LocalFs, path: &str, age_secs: u64) {
    fs.write_file(path, path.as_bytes(), 0o644).unwrap();
    let abs = fs.abs(path).unwrap();
    File::options()
        .write(true)
        .open(abs)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

fn list_fixture() -> (TempDir, LocalFs) {
    let (dir, fs) = store();
    touch(&fs, "/lib/a.txt", 300);
    touch(&fs, "/lib/foo.txt", 100);
    touch(&fs, "/lib/nested/b.TXT", 200);
    touch(&fs, "/lib/c.md", 50);
    touch(&fs, "/lib/d.md", 400);
    (dir, fs)
}

#[test]
fn list_paginates_newest_first() {
    let (_dir, fs) = list_fixture();
    let exts = vec![".txt".to_string()];

    let page = fs.list("/lib", &exts, 1, 2, &|_: &str| true, None).unwrap();
    assert_eq!(page.paths, vec!["/lib/foo.txt", "/lib/nested/b.TXT"]);
    assert_eq!((page.total, page.pages), (3, 2));

    let page = fs.list("/lib", &exts, 2, 2, &|_: &str| true, None).unwrap();
    assert_eq!(page.paths, vec!["/lib/a.txt"]);

    let page = fs.list("/lib", &exts, 9, 2, &|_: &str| true, None).unwrap();
    assert!(page.paths.is_empty());
    assert_eq!(page.total, 3);

    let page = fs.list("/lib", &exts, 1, 0, &|_: &str| true, None).unwrap();
    assert_eq!((page.paths.len(), page.pages), (0, 0));
}

#[test]
fn list_cache_is_reused_and_invalidated() {
    let (_dir, fs) = list_fixture();
    let exts = vec![".txt".to_string()];
    let all = |_: &str| true;

    assert_eq!(fs.list("/lib", &exts, 1, 2, &all, None).unwrap().total, 3);

    // Served from cache: the new file is not seen yet.
    touch(&fs, "/lib/late.txt", 0);
    assert_eq!(fs.list("/lib", &exts, 1, 2, &all, None).unwrap().total, 3);

    fs.clean_cache();
    assert_eq!(fs.list("/lib", &exts, 1, 2, &all, None).unwrap().total, 4);

    // A stricter predicate rejects cached entries and forces a rebuild.
    let only_foo = |p: &str| p.contains("foo");
    let page = fs.list("/lib", &exts, 1, 2, &only_foo, None).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.paths, vec!["/lib/foo.txt"]);

    // A different extension set is a different listing.
    let md = vec!["md".to_string()];
    assert_eq!(fs.list("/lib", &md, 1, 10, &all, None).unwrap().total, 2);
}

#[test]
fn list_reports_cancellation() {
    let (_dir, fs) = list_fixture();
    let cancel = AtomicBool::new(true);
    let err = fs
        .list("/lib", &[], 1, 10, &|_: &str| true, Some(&cancel))
        .unwrap_err();
    assert!(matches!(err, FsError::Cancelled { .. }));
}

struct Deadline(Instant);

impl Cancel for Deadline {
    fn is_cancelled(&self) -> bool {
        Instant::now() >= self.0
    }
}

#[test]
fn list_observes_deadline_passing_after_start() {
    let (_dir, fs) = list_fixture();
    let deadline = Deadline(Instant::now() + Duration::from_millis(300));
    let all = |_: &str| true;
    assert_eq!(fs.list("/lib", &[], 1, 10, &all, Some(&deadline)).unwrap().total, 5);

    std::thread::sleep(Duration::from_millis(400));
    fs.clean_cache();
    let err = fs.list("/lib", &[], 1, 10, &all, Some(&deadline)).unwrap_err();
    assert!(matches!(err, FsError::Cancelled { .. }));
}

#[test]
fn resize_rejects_unknown_output_format() {
    let (_dir, fs) = store();
    fs.write_file("/img.png", b"not really", 0o644).unwrap();
    let err = fs.resize("/img.png", "/img.gif", 10, 10).unwrap_err();
    assert!(matches!(err, FsError::Unsupported(_)));
}
