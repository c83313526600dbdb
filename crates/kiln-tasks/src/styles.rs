//! Stylesheet pipeline: Sass compilation, vendor prefixing, compact output
//! and source maps.

use std::fs;
use std::path::{Component, Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use rayon::prelude::*;

use crate::compact::{self, CompactOptions, Segment};
use crate::error::TaskError;
use crate::layout::{SourceFile, SourceSet};

/// Settings for the style pipeline.
#[derive(Debug, Clone)]
pub struct StyleOptions {
    /// Browserslist queries used for vendor prefixing
    pub browsers: Vec<String>,

    /// Digits kept after the decimal point
    pub precision: usize,

    /// Indentation inside at-rule blocks
    pub indent: String,

    /// Write a source map next to each stylesheet
    pub source_maps: bool,

    /// Map directory, relative to the stylesheet output directory
    pub maps_dir: PathBuf,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            browsers: vec!["last 2 versions".to_string(), "ie <= 9".to_string()],
            precision: 2,
            indent: "\t".to_string(),
            source_maps: true,
            maps_dir: PathBuf::from("maps"),
        }
    }
}

/// Errors from compiling a single stylesheet.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StyleError {
    #[error("Sass error: {0}")]
    Sass(String),

    #[error("CSS error: {0}")]
    Css(String),

    #[error("Invalid browser targets: {0}")]
    Targets(String),

    #[error("Source map error: {0}")]
    SourceMap(String),
}

/// A stylesheet written by the pipeline.
#[derive(Debug, Clone)]
pub struct CompiledStyle {
    /// Source file
    pub source: PathBuf,
    /// Written stylesheet
    pub output: PathBuf,
    /// Written source map
    pub map: Option<PathBuf>,
}

/// A source that failed to compile and produced no output.
#[derive(Debug, Clone)]
pub struct StyleFailure {
    pub source: PathBuf,
    pub message: String,
}

/// Result of a style task.
#[derive(Debug, Default, Clone)]
pub struct StyleReport {
    pub written: Vec<CompiledStyle>,
    pub failed: Vec<StyleFailure>,
    /// Sass partials that were not compiled on their own
    pub skipped: usize,
}

/// Processed stylesheet text and its source map.
#[derive(Debug, Clone)]
pub struct Processed {
    pub css: String,
    pub map: Option<String>,
}

enum Compiled {
    Written(CompiledStyle),
    Failed(StyleFailure),
    Partial,
}

/// Compiles style sources into the destination tree.
pub struct StylePipeline {
    options: StyleOptions,
    targets: Targets,
}

impl StylePipeline {
    /// Create a pipeline, resolving the browser queries once.
    pub fn new(options: StyleOptions) -> Result<Self, StyleError> {
        let browsers = Browsers::from_browserslist(options.browsers.iter().map(String::as_str))
            .map_err(|e| StyleError::Targets(e.to_string()))?;

        let targets = browsers.map(Targets::from).unwrap_or_default();

        Ok(Self { options, targets })
    }

    /// Compile every selected source into `dest`.
    ///
    /// Compile errors are logged and reported; only I/O errors fail the task.
    pub fn compile_all(&self, set: &SourceSet, dest: &Path) -> Result<StyleReport, TaskError> {
        let files = set.files()?;

        let results: Vec<Result<Compiled, TaskError>> = files
            .par_iter()
            .map(|file| self.compile_file(file, set.root(), dest))
            .collect();

        let mut report = StyleReport::default();
        for result in results {
            match result? {
                Compiled::Written(style) => report.written.push(style),
                Compiled::Failed(failure) => report.failed.push(failure),
                Compiled::Partial => report.skipped += 1,
            }
        }

        Ok(report)
    }

    fn compile_file(
        &self,
        file: &SourceFile,
        root: &Path,
        dest: &Path,
    ) -> Result<Compiled, TaskError> {
        let is_partial = file
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('_'));
        if is_partial {
            tracing::debug!("Skipping partial {}", file.path.display());
            return Ok(Compiled::Partial);
        }

        let source = fs::read_to_string(&file.path).map_err(|e| TaskError::io(&file.path, e))?;
        let name = slash_path(&file.relative);
        let css_relative = file.relative.with_extension("css");
        let map_relative = self.options.maps_dir.join(file.relative.with_extension("css.map"));

        let processed = self
            .compile_source(&file.path, &source, root)
            .and_then(|css| self.process(&css, &name));

        let processed = match processed {
            Ok(processed) => processed,
            Err(e) => {
                tracing::error!("{}: {}", file.path.display(), e);
                return Ok(Compiled::Failed(StyleFailure {
                    source: file.path.clone(),
                    message: e.to_string(),
                }));
            }
        };

        let output = dest.join(&css_relative);
        let mut css = processed.css;
        let mut map_path = None;

        if let Some(map) = processed.map {
            let path = dest.join(&map_relative);
            write_file(&path, &map)?;
            css.push_str(&format!(
                "\n/*# sourceMappingURL={} */\n",
                mapping_url(&css_relative, &map_relative)
            ));
            map_path = Some(path);
        }

        write_file(&output, &css)?;
        tracing::debug!("Compiled {} -> {}", file.path.display(), output.display());

        Ok(Compiled::Written(CompiledStyle {
            source: file.path.clone(),
            output,
            map: map_path,
        }))
    }

    /// Turn a source file into plain CSS. Sass sources go through `grass`.
    pub fn compile_source(
        &self,
        path: &Path,
        source: &str,
        root: &Path,
    ) -> Result<String, StyleError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let options = grass::Options::default()
            .style(grass::OutputStyle::Expanded)
            .load_path(path.parent().unwrap_or(Path::new(".")))
            .load_path(root)
            .quiet(true);

        let compiled = match ext.as_str() {
            "scss" => grass::from_string(source.to_string(), &options),
            "sass" => grass::from_path(path, &options),
            _ => return Ok(source.to_string()),
        };

        compiled.map_err(|e| StyleError::Sass(e.to_string()))
    }

    /// Prefix, print compact and build the source map for plain CSS.
    pub fn process(&self, css: &str, name: &str) -> Result<Processed, StyleError> {
        let mut sheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: name.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| StyleError::Css(e.to_string()))?;

        sheet
            .minify(MinifyOptions {
                targets: self.targets.clone(),
                ..MinifyOptions::default()
            })
            .map_err(|e| StyleError::Css(e.to_string()))?;

        let mut minified_map = SourceMap::new("/");
        minified_map.add_source(name);
        minified_map
            .set_source_content(0, css)
            .map_err(|e| StyleError::SourceMap(format!("{:?}", e)))?;

        let printed = sheet
            .to_css(PrinterOptions {
                minify: true,
                source_map: Some(&mut minified_map),
                targets: self.targets.clone(),
                ..PrinterOptions::default()
            })
            .map_err(|e| StyleError::Css(e.to_string()))?;

        let compacted = compact::format(
            &printed.code,
            &CompactOptions {
                indent: self.options.indent.clone(),
                precision: self.options.precision,
            },
        );

        let map = if self.options.source_maps {
            Some(carry_map(
                &mut minified_map,
                &compacted.segments,
                name,
                css,
            )?)
        } else {
            None
        };

        Ok(Processed {
            css: compacted.code,
            map,
        })
    }
}

/// Re-anchor the printer's single-line map onto the compact layout.
fn carry_map(
    minified: &mut SourceMap,
    segments: &[Segment],
    name: &str,
    content: &str,
) -> Result<String, StyleError> {
    let mut map = SourceMap::new("/");
    let source = map.add_source(name);
    map.set_source_content(source as usize, content)
        .map_err(|e| StyleError::SourceMap(format!("{:?}", e)))?;

    for segment in segments {
        let original = minified
            .find_closest_mapping(0, segment.input as u32)
            .and_then(|m| m.original);
        if let Some(original) = original {
            map.add_mapping(segment.line, segment.column, Some(original));
        }
    }

    map.to_json(None)
        .map_err(|e| StyleError::SourceMap(format!("{:?}", e)))
}

/// URL of the map as seen from the stylesheet's directory.
fn mapping_url(css_relative: &Path, map_relative: &Path) -> String {
    let depth = css_relative
        .parent()
        .map(|p| p.components().filter(|c| matches!(c, Component::Normal(_))).count())
        .unwrap_or(0);

    format!("{}{}", "../".repeat(depth), slash_path(map_relative))
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn write_file(path: &Path, contents: &str) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| TaskError::io(path, e))
}
