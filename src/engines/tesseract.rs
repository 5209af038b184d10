//! Tesseract OCR engine.

use tokio::{fs, process::Command};

use crate::{async_utils::run_command, prelude::*};

use super::{OcrEngine, OcrPageInput, OcrPageOutput};

/// OCR engine wrapping the `tesseract` CLI tool.
pub struct TesseractOcrEngine {
    /// The `tesseract` binary.
    cmd: PathBuf,
    /// Language(s) passed with `-l`.
    lang: String,
    /// Version line reported by `tesseract --version`.
    version: String,
}

impl TesseractOcrEngine {
    /// Create a new `tesseract` engine, checking that the binary runs.
    #[instrument(level = "debug", skip_all, fields(cmd = %cmd.display()))]
    pub async fn new(cmd: &Path, lang: &str) -> Result<Self> {
        let mut version_cmd = Command::new(cmd);
        version_cmd.arg("--version");
        let output = run_command("tesseract", &mut version_cmd, None)
            .await
            .with_context(|| {
                format!(
                    "Tesseract not found at {:?}; install it or set TESSERACT_CMD",
                    cmd.display()
                )
            })?;
        // Older versions print this to stderr.
        let version = parse_version(&String::from_utf8_lossy(&output.stdout))
            .or_else(|| parse_version(&String::from_utf8_lossy(&output.stderr)))
            .unwrap_or_else(|| "unknown".to_owned());
        info!(version = %version, "Found Tesseract at {}", cmd.display());
        Ok(Self {
            cmd: cmd.to_owned(),
            lang: lang.to_owned(),
            version,
        })
    }
}

/// Find the version number in `tesseract --version` output.
fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("tesseract "))
        .map(|version| version.trim().trim_start_matches('v').to_owned())
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
    fn wants_rasterized_pages(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        format!("Tesseract OCR v{}", self.version)
    }

    #[instrument(level = "debug", skip_all, fields(page = input.page_number))]
    async fn ocr_page(&self, input: OcrPageInput) -> Result<OcrPageOutput> {
        let extension = mime_guess::get_mime_extensions_str(&input.page.mime_type)
            .and_then(|exts| exts.first())
            .ok_or_else(|| {
                anyhow!("cannot determine extension for {}", input.page.mime_type)
            })?;

        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join(format!("input.{}", extension));
        let output_path = tmpdir.path().join("output.txt");
        fs::write(&input_path, &input.page.data)
            .await
            .context("cannot write tesseract input file")?;

        // Tesseract adds `.txt` to the output base name itself.
        let mut cmd = Command::new(&self.cmd);
        cmd.arg(&input_path)
            .arg(output_path.with_extension(""))
            .arg("-l")
            .arg(&self.lang);
        run_command("tesseract", &mut cmd, None).await?;

        let text = fs::read_to_string(&output_path)
            .await
            .context("cannot read tesseract output file")?;
        Ok(OcrPageOutput { text })
    }
}
