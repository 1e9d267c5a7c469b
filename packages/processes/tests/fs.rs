use std::io::Read;
use std::sync::Arc;

use tempfile::TempDir;
use yao_fs::{FileSystem, LocalFs};
use yao_process::{args, Process, Value};
use yao_processes::Download;

/// Mount a fresh store under `name` and load the handlers.
fn mount(name: &str) -> (TempDir, Arc<LocalFs>) {
    yao_processes::load();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalFs::new(dir.path()).unwrap());
    yao_fs::register(name, store.clone());
    (dir, store)
}

fn run(name: &str, args: Vec<Value>) -> Value {
    Process::of(name, args).unwrap().run()
}

#[test]
fn exists_on_missing_path_is_false() {
    let (_dir, _store) = mount("system");
    assert_eq!(run("fs.system.Exists", args!["/missing"]), Value::Bool(false));
}

#[test]
fn text_and_buffer_round_trip() {
    let (_dir, store) = mount("handlers_rw");
    let n = run("fs.handlers_rw.WriteFile", args!["/notes/a.txt", "Hello", 0o644]);
    assert_eq!(n, Value::Integer(5));
    run("fs.handlers_rw.AppendFile", args!["/notes/a.txt", " World"]);
    run("fs.handlers_rw.InsertFile", args!["/notes/a.txt", 5, ","]);
    assert_eq!(
        run("fs.handlers_rw.ReadFile", args!["/notes/a.txt"]),
        Value::from("Hello, World")
    );

    run(
        "fs.handlers_rw.WriteFileBuffer",
        vec![Value::from("/bin/data"), Value::Bytes(vec![0, 1, 2])],
    );
    assert_eq!(
        run("fs.handlers_rw.ReadFileBuffer", args!["/bin/data"]),
        Value::Bytes(vec![0, 1, 2])
    );
    assert_eq!(run("fs.handlers_rw.Size", args!["/bin/data"]), Value::Integer(3));
    assert_eq!(store.read_file("/notes/a.txt").unwrap(), b"Hello, World");
}

#[test]
fn buffer_handlers_reject_text() {
    let (_dir, _store) = mount("handlers_types");
    let err = Process::of("fs.handlers_types.WriteFileBuffer", args!["/a", "text"])
        .unwrap()
        .exec()
        .unwrap_err();
    assert_eq!(err.code, 400);
}

#[test]
fn directory_operations() {
    let (_dir, _store) = mount("handlers_dirs");
    run("fs.handlers_dirs.MkdirAll", args!["/a/b/c"]);
    run("fs.handlers_dirs.WriteFile", args!["/a/b/c/x.txt", "x"]);
    run("fs.handlers_dirs.WriteFile", args!["/a/y.md", "y"]);

    let all = run("fs.handlers_dirs.ReadDir", args!["/a", true]);
    let all: Vec<&str> = all.as_array().unwrap().iter().filter_map(Value::as_str).collect();
    assert!(all.contains(&"/a/b/c/x.txt"));
    assert!(all.contains(&"/a/y.md"));

    let found = run("fs.handlers_dirs.Glob", args!["/a/*.md"]);
    assert_eq!(found, Value::from(vec!["/a/y.md".to_string()]));

    assert_eq!(run("fs.handlers_dirs.IsDir", args!["/a/b"]), Value::Bool(true));
    assert_eq!(run("fs.handlers_dirs.IsFile", args!["/a/b"]), Value::Bool(false));

    run("fs.handlers_dirs.RemoveAll", args!["/a/b"]);
    assert_eq!(run("fs.handlers_dirs.Exists", args!["/a/b"]), Value::Bool(false));
    run("fs.handlers_dirs.RemoveAll", args!["/a/b"]);
}

#[test]
fn move_and_copy() {
    let (_dir, _store) = mount("handlers_move");
    run("fs.handlers_move.WriteFile", args!["/src.txt", "abc"]);
    run("fs.handlers_move.Copy", args!["/src.txt", "/copy.txt"]);
    run("fs.handlers_move.Move", args!["/src.txt", "/moved/dst.txt"]);
    run("fs.handlers_move.MoveAppend", args!["/copy.txt", "/moved/dst.txt"]);

    assert_eq!(run("fs.handlers_move.Exists", args!["/src.txt"]), Value::Bool(false));
    assert_eq!(run("fs.handlers_move.Exists", args!["/copy.txt"]), Value::Bool(false));
    assert_eq!(
        run("fs.handlers_move.ReadFile", args!["/moved/dst.txt"]),
        Value::from("abcabc")
    );
}

#[test]
fn path_escape_is_rejected() {
    let (_dir, _store) = mount("handlers_escape");
    let err = Process::of("fs.handlers_escape.ReadFile", args!["/../../etc/passwd"])
        .unwrap()
        .exec()
        .unwrap_err();
    assert_eq!(err.code, 400);
    assert!(err.to_string().starts_with("Exception|400"));
}

#[test]
fn mkdir_temp_pattern_cannot_leave_the_store() {
    let (dir, _store) = mount("handlers_mkdirtemp");
    run("fs.handlers_mkdirtemp.MkdirAll", args!["/sub"]);
    let err = Process::of("fs.handlers_mkdirtemp.MkdirTemp", args!["/sub", "../../escape-*"])
        .unwrap()
        .exec()
        .unwrap_err();
    assert_eq!(err.code, 400);

    let parent = dir.path().parent().unwrap();
    let escaped = std::fs::read_dir(parent)
        .unwrap()
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_string_lossy().starts_with("escape-"));
    assert!(!escaped);

    let created = run("fs.handlers_mkdirtemp.MkdirTemp", args!["/sub", "job-*"]);
    assert!(created.as_str().unwrap().starts_with("/sub/job-"));
}

#[test]
fn missing_file_is_not_found() {
    let (_dir, _store) = mount("handlers_missing");
    let err = Process::of("fs.handlers_missing.ReadFile", args!["/nope.txt"])
        .unwrap()
        .exec()
        .unwrap_err();
    assert_eq!(err.code, 404);
}

#[test]
fn download_streams_content() {
    let (_dir, _store) = mount("handlers_download");
    run("fs.handlers_download.WriteFile", args!["/hello.txt", "hello"]);

    let result = run("fs.handlers_download.Download", args!["/hello.txt"]);
    assert!(result
        .get("type")
        .and_then(Value::as_str)
        .unwrap()
        .starts_with("text/plain"));

    let download = result
        .get("content")
        .and_then(|c| c.downcast_ref::<Download>())
        .unwrap();
    let mut text = String::new();
    download.take().unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "hello");
    assert!(download.take().is_none());
}

#[test]
fn zip_and_unzip() {
    let (_dir, _store) = mount("handlers_zip");
    run("fs.handlers_zip.WriteFile", args!["/site/index.html", "<h1>hi</h1>"]);
    run("fs.handlers_zip.WriteFile", args!["/site/css/a.css", "h1{}"]);
    run("fs.handlers_zip.Zip", args!["/site", "/site.zip"]);

    let files = run("fs.handlers_zip.Unzip", args!["/site.zip", "/out"]);
    assert_eq!(files.as_array().unwrap().len(), 2);
    assert_eq!(
        run("fs.handlers_zip.ReadFile", args!["/out/css/a.css"]),
        Value::from("h1{}")
    );
}

#[test]
fn path_helpers() {
    let (_dir, _store) = mount("handlers_paths");
    assert_eq!(run("fs.handlers_paths.ExtName", args!["/a/b.tar.gz"]), Value::from("gz"));
    assert_eq!(run("fs.handlers_paths.BaseName", args!["/a/b.txt"]), Value::from("b.txt"));
    assert_eq!(run("fs.handlers_paths.DirName", args!["b.txt"]), Value::from("."));

    let abs = run("fs.handlers_paths.Abs", args!["/x/y.txt"]);
    assert!(abs.as_str().unwrap().ends_with("/x/y.txt"));
}
