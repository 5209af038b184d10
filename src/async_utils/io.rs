//! I/O utilities.
//!
//! Configuration files may be TOML or JSON, chosen by file extension. Reports
//! are written as pretty-printed JSON, either to a file or to standard output.

use tokio::{
    fs::{self, File},
    io::{AsyncWrite, AsyncWriteExt as _},
};

use crate::prelude::*;

/// Is this path a JSON file, judging by its extension?
fn is_json_path(path: &Path) -> bool {
    let ext = path.extension().unwrap_or_default();
    ext == "json" || ext == "jsonl"
}

/// Read TOML or JSON from a file.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    // Read all at once because our parsing libraries don't do async I/O.
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    if is_json_path(path) {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a value as pretty-printed JSON to a file or to standard output.
pub async fn write_json_pretty<T>(path: Option<&Path>, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let mut json =
        serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    json.push('\n');
    let mut wtr = create_writer(path).await?;
    wtr.write_all(json.as_bytes())
        .await
        .context("Failed to write JSON output")?;
    wtr.flush().await.context("Failed to flush JSON output")?;
    Ok(())
}
