//! The `rasterize` subcommand, which saves page images for use with other
//! OCR tools.

use clap::Args;
use futures::StreamExt as _;
use tokio::{fs, process::Command};

use crate::{
    async_utils::run_command,
    batch::{PageSource as _, PdfPageSource},
    page_iter::{Page, PageIterOptions},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// `rasterize` command line arguments.
#[derive(Debug, Args)]
pub struct RasterizeOpts {
    /// The PDF to render.
    pub input_path: PathBuf,

    /// Directory for `page_NNN.png` files (or `.jpg` etc. for image input).
    #[clap(long, default_value = "pdf_images")]
    pub out_dir: PathBuf,

    #[clap(flatten)]
    pub page_iter_opts: PageIterOptions,

    /// First page to render (1-based).
    #[clap(long, default_value = "1")]
    pub first_page: usize,

    /// Render at most this many pages.
    #[clap(long)]
    pub max_pages: Option<usize>,

    /// Also extract the images embedded in each page.
    #[clap(long)]
    pub embedded: bool,
}

/// The `rasterize` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_rasterize(ui: Ui, opts: &RasterizeOpts) -> Result<()> {
    let source = PdfPageSource::new(&opts.input_path, opts.page_iter_opts.clone(), true);
    let total_pages = source.page_count().await?;
    if opts.first_page == 0 || opts.first_page > total_pages {
        return Err(anyhow!(
            "first page {} is outside the document (pages 1-{})",
            opts.first_page,
            total_pages
        ));
    }
    let last_page = match opts.max_pages {
        Some(0) => return Err(anyhow!("--max-pages must be at least 1")),
        Some(max_pages) => total_pages.min(opts.first_page + max_pages - 1),
        None => total_pages,
    };

    fs::create_dir_all(&opts.out_dir)
        .await
        .with_context(|| format!("failed to create {:?}", opts.out_dir.display()))?;

    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "🖼️",
            msg: "Rendering pages",
            done_msg: "Rendered pages",
        },
        (last_page + 1 - opts.first_page) as u64,
    );
    let mut pages = source.pages(opts.first_page..=last_page).await?;
    let mut saved = 0;
    while let Some(page) = pages.next().await {
        let page = page?;
        let page_number = page.page_number.unwrap_or(opts.first_page + saved);
        let path = opts.out_dir.join(page_file_name(page_number, &page)?);
        fs::write(&path, &page.data)
            .await
            .with_context(|| format!("failed to write {:?}", path.display()))?;
        saved += 1;
        pb.inc(1);
    }
    pb.finish_using_style();

    if opts.embedded {
        let mut cmd = Command::new("pdfimages");
        cmd.arg("-png")
            .arg("-p")
            .arg("-f")
            .arg(opts.first_page.to_string())
            .arg("-l")
            .arg(last_page.to_string())
            .arg(&opts.input_path)
            .arg(opts.out_dir.join("embedded"));
        run_command("pdfimages", &mut cmd, None)
            .await
            .context("failed to extract embedded images")?;
    }

    ui.display_message(
        "✅",
        &format!(
            "Saved {} page images to {}",
            saved,
            opts.out_dir.display()
        ),
    );
    Ok(())
}

/// The file name for a saved page, like `page_007.png` or `page_001.jpg`.
fn page_file_name(page_number: usize, page: &Page) -> Result<String> {
    let extension = infer::get(&page.data)
        .map(|kind| kind.extension())
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&page.mime_type)
                .and_then(|exts| exts.first().copied())
        })
        .ok_or_else(|| anyhow!("cannot determine extension for {}", page.mime_type))?;
    Ok(format!("page_{page_number:03}.{extension}"))
}
