use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use gif_bus::{
    capture::{ScreenCapture, TestPattern},
    encoder::GifEncoder,
    pipeline::{Pipeline, Recording},
    quantizer::NeuQuantizer,
};
use tokio_util::sync::CancellationToken;

use crate::config::{SessionConfig, SourceKind};

fn open_capture(config: &SessionConfig) -> anyhow::Result<Arc<dyn ScreenCapture>> {
    match config.source {
        SourceKind::Test => {
            let screen = config.test_screen()?;
            Ok(Arc::new(TestPattern::new(screen.width, screen.height)))
        }
        #[cfg(feature = "x11grab")]
        SourceKind::X11grab => {
            gif_bus::init()?;
            Ok(Arc::new(gif_bus::x11grab::X11Grab::new(
                &config.display,
                config.fps,
            )))
        }
        #[cfg(not(feature = "x11grab"))]
        SourceKind::X11grab => {
            anyhow::bail!("x11grab source needs a build with `--features x11grab`")
        }
    }
}

/// Stop capturing on Ctrl-C. Frames already taken are still written out.
fn cancel_on_ctrl_c(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    log::warn!("ctrl+c handler unavailable: {}", e);
                    return;
                }
                log::info!("ctrl+c received, finishing recording");
                cancel.cancel();
            }
        }
    })
}

pub async fn record(config: &SessionConfig) -> anyhow::Result<Recording> {
    let pipeline_config = config.pipeline_config()?;
    let capture = open_capture(config)?;
    let quantizer =
        NeuQuantizer::new(config.colors, config.speed).context("invalid quantizer settings")?;
    let pipeline = Pipeline::new(
        pipeline_config,
        capture,
        Arc::new(quantizer),
        Arc::new(GifEncoder),
    );

    let ctrl_c = cancel_on_ctrl_c(pipeline.cancel_token());
    let result = pipeline.run().await;
    ctrl_c.abort();

    let recording = result.context("recording failed")?;
    write_atomically(&config.output, &recording.data).await?;
    log::info!(
        "wrote {} ({} frames, {}x{}, {:?})",
        config.output.display(),
        recording.frames,
        recording.width,
        recording.height,
        recording.span
    );
    Ok(recording)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Write to a sibling file and rename it into place, so `path` is never left half written.
pub async fn write_atomically(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let partial = partial_path(path);
    tokio::fs::write(&partial, data)
        .await
        .with_context(|| format!("writing {}", partial.display()))?;
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e).with_context(|| format!("renaming into {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomically_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gif");
        std::fs::write(&path, b"old").unwrap();

        write_atomically(&path, b"new").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn test_write_atomically_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.gif");
        assert!(write_atomically(&path, b"data").await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_record_test_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output: dir.path().join("clip.gif"),
            duration: 0.35,
            test_screen: "64x48".to_string(),
            region: Some("32x16+8+8".to_string()),
            colors: 16,
            ..SessionConfig::default()
        };

        let recording = record(&config).await.unwrap();
        assert!(recording.frames >= 1);
        assert_eq!((recording.width, recording.height), (32, 16));

        let data = std::fs::read(&config.output).unwrap();
        assert_eq!(&data[..6], b"GIF89a");
        assert_eq!(data, recording.data.as_ref());
    }

    #[tokio::test]
    async fn test_record_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output: dir.path().join("clip.gif"),
            test_screen: "64x48".to_string(),
            region: Some("128x128".to_string()),
            ..SessionConfig::default()
        };

        assert!(record(&config).await.is_err());
        assert!(!config.output.exists());
        assert!(!partial_path(&config.output).exists());
    }

    #[cfg(not(feature = "x11grab"))]
    #[test]
    fn test_x11grab_needs_feature() {
        let config = SessionConfig {
            source: SourceKind::X11grab,
            ..SessionConfig::default()
        };
        assert!(open_capture(&config).is_err());
    }
}
