//! `pdf.info`, `pdf.split` and `pdf.convert` over poppler, MuPDF and
//! ImageMagick command-line tools.
//!
//! Paths are host paths. Output naming follows each tool:
//! - split: `<prefix>_<N>.pdf`, N from 1
//! - convert with pdftoppm: `<prefix>-<N>.<ext>`, N from 1 (zero padded by
//!   the tool)
//! - convert with ImageMagick: `<prefix>-<N>.<ext>`, N from 0

pub mod command;

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use yao_process::{handler, Exception, Handler, Process, Value};

pub use command::CommandError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_DPI: u32 = 150;

pub const ENV_PDFTOPPM: &str = "YAO_PDFTOPPM_PATH";
pub const ENV_MUTOOL: &str = "YAO_MUTOOL_PATH";
pub const ENV_IMAGEMAGICK: &str = "YAO_IMAGEMAGICK_PATH";

/// Resolved tool locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub pdftoppm: PathBuf,
    pub mutool: PathBuf,
    pub imagemagick: PathBuf,
}

impl Tools {
    /// Environment overrides, else platform defaults. On Linux, ImageMagick
    /// 6 installs `convert` instead of `magick`.
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        let imagemagick = env(ENV_IMAGEMAGICK).unwrap_or_else(|| {
            let magick = PathBuf::from("magick");
            if cfg!(target_os = "linux") && !command::available(&magick) {
                PathBuf::from("convert")
            } else {
                magick
            }
        });
        let tools = Tools {
            pdftoppm: env(ENV_PDFTOPPM).unwrap_or_else(|| PathBuf::from("pdftoppm")),
            mutool: env(ENV_MUTOOL).unwrap_or_else(|| PathBuf::from("mutool")),
            imagemagick,
        };
        tracing::debug!(?tools, "pdf tools resolved");
        tools
    }
}

/// Which converter renders pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    Pdftoppm,
    ImageMagick,
}

impl Converter {
    /// Index of the first page in this tool's output names.
    pub fn first_page(self) -> usize {
        match self {
            Converter::Pdftoppm => 1,
            Converter::ImageMagick => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn ext(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub format: ImageFormat,
    pub dpi: u32,
    pub prefix: String,
    /// `None` picks the first available tool, pdftoppm first.
    pub tool: Option<Converter>,
    pub timeout: Duration,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            dpi: DEFAULT_DPI,
            prefix: "page".to_string(),
            tool: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConvertOptions {
    /// `{format, dpi, prefix, tool, timeout}`
    pub fn from_map(map: &BTreeMap<String, Value>) -> Result<Self, Exception> {
        let mut options = ConvertOptions::default();
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
        };
        if let Some(format) = text("format") {
            options.format = match format.as_str() {
                "png" => ImageFormat::Png,
                "jpg" | "jpeg" => ImageFormat::Jpeg,
                other => {
                    return Err(Exception::bad_request(format!(
                        "unsupported image format {}",
                        other
                    )))
                }
            };
        }
        if let Some(tool) = text("tool") {
            options.tool = match tool.as_str() {
                "auto" => None,
                "pdftoppm" => Some(Converter::Pdftoppm),
                "imagemagick" | "magick" | "convert" => Some(Converter::ImageMagick),
                other => {
                    return Err(Exception::bad_request(format!("unknown converter {}", other)))
                }
            };
        }
        if let Some(dpi) = map.get("dpi").and_then(Value::as_i64) {
            if dpi > 0 {
                options.dpi = dpi as u32;
            }
        }
        if let Some(prefix) = map.get("prefix").and_then(Value::as_str) {
            if !prefix.is_empty() {
                options.prefix = prefix.to_string();
            }
        }
        if let Some(secs) = map.get("timeout").and_then(Value::as_i64) {
            if secs > 0 {
                options.timeout = Duration::from_secs(secs as u64);
            }
        }
        Ok(options)
    }
}

/// Page count from `mutool info` output.
pub fn parse_page_count(info: &str) -> Option<usize> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("Pages:"))
        .and_then(|n| n.trim().parse().ok())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn mutool_info(
    tools: &Tools,
    path: &Path,
    timeout: Duration,
) -> Result<(command::Output, usize), Exception> {
    let output = command::run(&tools.mutool, [OsStr::new("info"), path.as_os_str()], timeout)?;
    let pages = parse_page_count(&output.stdout).ok_or_else(|| {
        Exception::internal(format!("cannot read page count of {}", path.display()))
    })?;
    Ok((output, pages))
}

/// `{path, pages, version?}`
pub fn info(
    tools: &Tools,
    path: &Path,
    timeout: Duration,
) -> Result<BTreeMap<String, Value>, Exception> {
    let (output, pages) = mutool_info(tools, path, timeout)?;

    let mut info = BTreeMap::new();
    info.insert("path".to_string(), Value::from(path_string(path)));
    info.insert("pages".to_string(), Value::from(pages));
    if let Some(version) = output
        .stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("PDF-"))
    {
        info.insert("version".to_string(), Value::from(version.trim()));
    }
    Ok(info)
}

/// One PDF per page: `<dir>/<prefix>_<N>.pdf`.
pub fn split(
    tools: &Tools,
    path: &Path,
    dir: &Path,
    prefix: &str,
    timeout: Duration,
) -> Result<Vec<PathBuf>, Exception> {
    let (_, pages) = mutool_info(tools, path, timeout)?;
    std::fs::create_dir_all(dir).map_err(|e| Exception::internal(e.to_string()))?;

    let mut files = Vec::with_capacity(pages);
    for page in 1..=pages {
        let target = dir.join(format!("{}_{}.pdf", prefix, page));
        command::run(
            &tools.mutool,
            [
                "merge".to_string(),
                "-o".to_string(),
                path_string(&target),
                path_string(path),
                page.to_string(),
            ],
            timeout,
        )?;
        files.push(target);
    }
    tracing::debug!(path = %path.display(), pages, "pdf split");
    Ok(files)
}

/// Command-line arguments for rendering `path` into `dir`.
pub fn convert_args(
    converter: Converter,
    path: &Path,
    dir: &Path,
    options: &ConvertOptions,
) -> Vec<String> {
    match converter {
        Converter::Pdftoppm => {
            let format = match options.format {
                ImageFormat::Png => "-png",
                ImageFormat::Jpeg => "-jpeg",
            };
            vec![
                format.to_string(),
                "-r".to_string(),
                options.dpi.to_string(),
                path_string(path),
                path_string(&dir.join(&options.prefix)),
            ]
        }
        Converter::ImageMagick => vec![
            "-density".to_string(),
            options.dpi.to_string(),
            path_string(path),
            path_string(&dir.join(format!("{}-%d.{}", options.prefix, options.format.ext()))),
        ],
    }
}

/// `<prefix>-<N>.<ext>` files in `dir`, ordered by N.
pub fn list_pages(dir: &Path, prefix: &str, ext: &str) -> std::io::Result<Vec<PathBuf>> {
    let head = format!("{}-", prefix);
    let tail = format!(".{}", ext);
    let mut pages: Vec<(u64, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let n = name.strip_prefix(&head)?.strip_suffix(&tail)?.parse().ok()?;
            Some((n, entry.path()))
        })
        .collect();
    pages.sort();
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

pub fn convert(
    tools: &Tools,
    path: &Path,
    dir: &Path,
    options: &ConvertOptions,
) -> Result<Vec<PathBuf>, Exception> {
    let converter = match options.tool {
        Some(tool) => tool,
        None if command::available(&tools.pdftoppm) => Converter::Pdftoppm,
        None if command::available(&tools.imagemagick) => Converter::ImageMagick,
        None => {
            return Err(Exception::unavailable(
                "neither pdftoppm nor ImageMagick is available",
            ))
        }
    };
    let program = match converter {
        Converter::Pdftoppm => &tools.pdftoppm,
        Converter::ImageMagick => &tools.imagemagick,
    };
    std::fs::create_dir_all(dir).map_err(|e| Exception::internal(e.to_string()))?;
    command::run(program, convert_args(converter, path, dir, options), options.timeout)?;

    let pages = list_pages(dir, &options.prefix, options.format.ext())
        .map_err(|e| Exception::internal(e.to_string()))?;
    tracing::debug!(
        path = %path.display(),
        ?converter,
        first = converter.first_page(),
        pages = pages.len(),
        "pdf converted"
    );
    Ok(pages)
}

pub(crate) fn handlers() -> Vec<(&'static str, Handler)> {
    vec![
        ("info", handler(info_handler)),
        ("split", handler(split_handler)),
        ("convert", handler(convert_handler)),
    ]
}

pub(crate) fn register() {
    yao_process::register_group("pdf", handlers());
}

fn paths_value(paths: Vec<PathBuf>) -> Value {
    Value::from(paths.iter().map(|p| path_string(p)).collect::<Vec<String>>())
}

/// `pdf.info(path)`
fn info_handler(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let info = info(&Tools::from_env(), Path::new(&p.args_string(0)), DEFAULT_TIMEOUT)?;
    Ok(Value::from(info))
}

/// `pdf.split(path, output_dir, prefix?)`
fn split_handler(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let path = PathBuf::from(p.args_string(0));
    let default_prefix = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let prefix = p.args_string_or(2, &default_prefix);
    let files = split(
        &Tools::from_env(),
        &path,
        Path::new(&p.args_string(1)),
        &prefix,
        DEFAULT_TIMEOUT,
    )?;
    Ok(paths_value(files))
}

/// `pdf.convert(path, output_dir, options?)`
fn convert_handler(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let options = ConvertOptions::from_map(&p.args_map(2))?;
    let files = convert(
        &Tools::from_env(),
        Path::new(&p.args_string(0)),
        Path::new(&p.args_string(1)),
        &options,
    )?;
    Ok(paths_value(files))
}
