//! Figure Export
//! Writes a FigureSpec as pretty JSON or as a static PNG/SVG image.

use crate::charts::figure::FigureSpec;
use crate::charts::renderer::{RenderError, StaticChartRenderer};
use clap::ValueEnum;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported output format: {0} (expected .json, .png or .svg)")]
    UnsupportedFormat(PathBuf),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize figure: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Png,
    Svg,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("png") => Ok(Self::Png),
            Some("svg") => Ok(Self::Svg),
            _ => Err(ExportError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

/// Write `figure` to `path`, choosing the format from the file extension.
/// Parent directories are created as needed.
pub fn write_figure(
    figure: &FigureSpec,
    path: &Path,
    renderer: &StaticChartRenderer,
) -> Result<OutputFormat, ExportError> {
    let format = OutputFormat::from_path(path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    match format {
        OutputFormat::Json => {
            let json = figure.to_json_pretty()?;
            fs::write(path, json).map_err(|source| ExportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        OutputFormat::Png => renderer.render_png(figure, path)?,
        OutputFormat::Svg => renderer.render_svg(figure, path)?,
    }

    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("a/map.json")).unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("map.PNG")).unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::from_path(Path::new("map.svg")).unwrap(), OutputFormat::Svg);
        assert!(matches!(
            OutputFormat::from_path(Path::new("map.pdf")),
            Err(ExportError::UnsupportedFormat(_))
        ));
        assert!(OutputFormat::from_path(Path::new("map")).is_err());
    }

    #[test]
    fn test_write_json_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("figure.json");
        let figure = FigureSpec::placeholder("nothing to show");

        let format = write_figure(&figure, &path, &StaticChartRenderer::default()).unwrap();
        assert_eq!(format, OutputFormat::Json);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["layout"]["title"]["text"], "Unable to display chart: nothing to show");
        assert_eq!(written["data"].as_array().map(Vec::len), Some(0));
    }
}
