use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::process::Command;
use uuid::Uuid;

use crate::app::{Result, SluiceError};
use crate::domain::EnrichedMessage;

/// Write the message into a fresh directory under
/// `<scratch_root>/<config_id>/` and return that directory.
///
/// Absent representations produce no file. The directory is left in place.
pub async fn materialize(
    scratch_root: &Path,
    config_id: i64,
    message: &EnrichedMessage,
) -> Result<PathBuf> {
    let dir = scratch_root
        .join(config_id.to_string())
        .join(Uuid::new_v4().to_string());
    fs::create_dir_all(&dir).await?;

    fs::write(dir.join("title.txt"), &message.body).await?;
    fs::write(dir.join("timestamp.txt"), message.timestamp.to_string()).await?;

    if let Some(ref markup) = message.markup {
        fs::write(dir.join("content.html"), markup).await?;
    }
    if let Some(ref screenshot) = message.screenshot {
        fs::write(dir.join("screenshot.png"), screenshot).await?;
    }
    if let Some(ref text) = message.plain_text {
        fs::write(dir.join("content.txt"), text).await?;
    }
    if !message.images.is_empty() {
        let images = dir.join("images");
        fs::create_dir_all(&images).await?;
        for (n, image) in message.images.iter().enumerate() {
            fs::write(images.join(format!("{}.{}", n, image.format)), &image.data).await?;
        }
    }

    Ok(dir)
}

/// Comma-joined `name:value` tags, or `None` when there are none.
pub fn tag_argument(tags: &[(String, String)]) -> String {
    if tags.is_empty() {
        return "None".to_string();
    }
    tags.iter()
        .map(|(name, value)| format!("{}:{}", name, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// Materialize the message and run `executable <tags> <dir>`.
///
/// A non-zero exit is an error; the caller only logs it.
pub async fn run(
    executable: &Path,
    scratch_root: &Path,
    config_id: i64,
    message: &EnrichedMessage,
) -> Result<PathBuf> {
    let dir = materialize(scratch_root, config_id, message).await?;

    let output = Command::new(executable)
        .arg(tag_argument(&message.tags))
        .arg(&dir)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SluiceError::Other(format!(
            "{} exited with {}: {}",
            executable.display(),
            output.status,
            stderr.trim()
        )));
    }

    tracing::debug!("{} handled {}", executable.display(), dir.display());
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GrabbedImage;

    fn message() -> EnrichedMessage {
        EnrichedMessage {
            timestamp: 1704067200,
            text: "release notes".into(),
            body: "release notes\n\n---\nhttps://x/y".into(),
            url: Some("https://x/y".into()),
            markup: Some("<p>release</p>".into()),
            images: vec![
                GrabbedImage {
                    data: vec![1],
                    format: "png".into(),
                },
                GrabbedImage {
                    data: vec![2],
                    format: "gif".into(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_tag_argument() {
        assert_eq!(tag_argument(&[]), "None");
        assert_eq!(
            tag_argument(&[("a".into(), "1".into()), ("b".into(), "2".into())]),
            "a:1,b:2"
        );
    }

    #[tokio::test]
    async fn test_materialize_layout() {
        let scratch = tempfile::tempdir().unwrap();
        let dir = materialize(scratch.path(), 3, &message()).await.unwrap();

        assert_eq!(dir.parent().unwrap(), scratch.path().join("3"));
        assert_eq!(
            std::fs::read_to_string(dir.join("title.txt")).unwrap(),
            "release notes\n\n---\nhttps://x/y"
        );
        assert_eq!(
            std::fs::read_to_string(dir.join("timestamp.txt")).unwrap(),
            "1704067200"
        );
        assert!(dir.join("content.html").exists());
        assert!(!dir.join("screenshot.png").exists());
        assert!(!dir.join("content.txt").exists());
        assert_eq!(std::fs::read(dir.join("images/0.png")).unwrap(), vec![1]);
        assert_eq!(std::fs::read(dir.join("images/1.gif")).unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_each_invocation_gets_its_own_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let first = materialize(scratch.path(), 1, &message()).await.unwrap();
        let second = materialize(scratch.path(), 1, &message()).await.unwrap();
        assert_ne!(first, second);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_failure() {
        let scratch = tempfile::tempdir().unwrap();

        tokio_test::assert_ok!(run(Path::new("true"), scratch.path(), 1, &message()).await);

        let failed = run(Path::new("false"), scratch.path(), 1, &message()).await;
        assert!(matches!(failed, Err(SluiceError::Other(_))));

        let missing = run(Path::new("/nonexistent/hook"), scratch.path(), 1, &message()).await;
        assert!(matches!(missing, Err(SluiceError::Io(_))));
    }
}
