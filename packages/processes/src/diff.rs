//! `diff.*`: unified diffs, patch application and search/replace edits.

use diffy::{DiffOptions, Line, Patch};
use yao_process::{handler, Exception, Handler, Process, Value};

pub(crate) fn handlers() -> Vec<(&'static str, Handler)> {
    vec![
        ("patch", handler(patch)),
        ("patchapply", handler(patch_apply)),
        ("apply", handler(apply)),
        ("replace", handler(replace)),
    ]
}

pub(crate) fn register() {
    yao_process::register_group("diff", handlers());
}

/// `diff.Patch(old, new, structured = false)`
fn patch(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let old = p.args_string(0);
    let new = p.args_string(1);
    if p.args_bool_or(2, false) {
        return Ok(Value::Array(line_records(&old, &new)));
    }
    Ok(Value::from(diffy::create_patch(&old, &new).to_string()))
}

/// `{op, text}` for every line of `old` and `new`, in order.
pub fn line_records(old: &str, new: &str) -> Vec<Value> {
    let context = old.lines().count().max(new.lines().count()) + 1;
    let patch = DiffOptions::new()
        .set_context_len(context)
        .create_patch(old, new);

    let record = |op: &str, text: &str| {
        let mut r = Value::map();
        r.insert("op", op);
        r.insert("text", text.trim_end_matches('\n'));
        r
    };
    if patch.hunks().is_empty() {
        return old.lines().map(|l| record("equal", l)).collect();
    }
    patch
        .hunks()
        .iter()
        .flat_map(|h| h.lines())
        .map(|line| match line {
            Line::Context(text) => record("equal", text),
            Line::Delete(text) => record("delete", text),
            Line::Insert(text) => record("insert", text),
        })
        .collect()
}

fn parse_patch<'a>(p: &Process, text: &'a str) -> Result<Patch<'a, str>, Exception> {
    Patch::from_str(text)
        .map_err(|e| Exception::bad_request(format!("{}: invalid patch: {}", p.name, e)))
}

/// `diff.PatchApply(source, patch)`: every hunk must apply.
fn patch_apply(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let source = p.args_string(0);
    let text = p.args_string(1);
    let patch = parse_patch(p, &text)?;
    let content = diffy::apply(&source, &patch)
        .map_err(|e| Exception::bad_request(format!("{}: {}", p.name, e)))?;
    Ok(Value::from(content))
}

/// `diff.Apply(source, patch)`: apply what fits, skip the rest.
fn apply(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let source = p.args_string(0);
    let text = p.args_string(1);
    let patch = parse_patch(p, &text)?;
    let (content, applied) = apply_lenient(&source, &patch);

    let mut result = Value::map();
    result.insert("content", content);
    result.insert("applied", applied);
    result.insert("total", patch.hunks().len());
    Ok(result)
}

/// Apply each hunk where its old lines are found, searching outward from
/// the position the hunk names. Returns the content and the number of
/// hunks applied.
pub fn apply_lenient(source: &str, patch: &Patch<'_, str>) -> (String, usize) {
    let trailing_newline = source.ends_with('\n');
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
    let mut applied = 0;
    // Net line shift from hunks applied so far.
    let mut shift: isize = 0;

    for hunk in patch.hunks() {
        let mut old = Vec::new();
        let mut new = Vec::new();
        for line in hunk.lines() {
            match line {
                Line::Context(t) => {
                    old.push(t.trim_end_matches('\n'));
                    new.push(t.trim_end_matches('\n'));
                }
                Line::Delete(t) => old.push(t.trim_end_matches('\n')),
                Line::Insert(t) => new.push(t.trim_end_matches('\n')),
            }
        }

        let hint = (hunk.old_range().start() as isize - 1 + shift).max(0) as usize;
        let Some(at) = find_block(&lines, &old, hint) else {
            tracing::debug!(start = hunk.old_range().start(), "hunk skipped");
            continue;
        };
        lines.splice(at..at + old.len(), new.iter().map(|s| s.to_string()));
        shift += new.len() as isize - old.len() as isize;
        applied += 1;
    }

    let mut content = lines.join("\n");
    if trailing_newline && !content.is_empty() {
        content.push('\n');
    }
    (content, applied)
}

/// The start of `block` in `lines` closest to `hint`, searching outward.
/// On equal distance the earlier position wins.
fn find_block(lines: &[String], block: &[&str], hint: usize) -> Option<usize> {
    let last = lines.len().checked_sub(block.len())?;
    let matches = |at: usize| lines[at..at + block.len()].iter().zip(block).all(|(a, b)| a == b);
    let hint = hint.min(last);
    for distance in 0..=last {
        if let Some(at) = hint.checked_sub(distance).filter(|&at| matches(at)) {
            return Some(at);
        }
        let above = hint + distance;
        if distance > 0 && above <= last && matches(above) {
            return Some(above);
        }
    }
    None
}

/// `diff.Replace(source, search, replace, all = false)`
fn replace(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(3)?;
    let source = p.args_string(0);
    let search = p.args_string(1);
    let replacement = p.args_string(2);
    if search.is_empty() {
        return Err(Exception::bad_request(format!("{}: search text is empty", p.name)));
    }
    if !source.contains(&search) {
        return Err(Exception::bad_request(format!(
            "{}: search text not found",
            p.name
        )));
    }
    let content = if p.args_bool_or(3, false) {
        source.replace(&search, &replacement)
    } else {
        source.replacen(&search, &replacement, 1)
    };
    Ok(Value::from(content))
}
