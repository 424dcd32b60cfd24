mod panic_handler;

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info};
use simplelog::{Config, WriteLogger};

use folio::EngineConfig;
use folio::pdf::{
    Bootstrap, ClientRect, Command, Document, Library, PageRenderer, PdfiumLoader, Point,
    PointerEvent, SelectionEngine, chunk_at, chunk_text,
};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Render, query and select text in PDF documents through PDFium")]
#[command(version)]
struct Cli {
    /// PDFium shared library, or a directory containing it
    #[arg(long, global = true)]
    pdfium_lib: Option<PathBuf>,

    /// Settings file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "folio.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page count and page sizes
    Info { file: PathBuf },

    /// Extract text
    Text {
        file: PathBuf,

        /// Only this page (1-based)
        #[arg(short, long)]
        page: Option<usize>,

        /// Split the output into overlapping chunks of this many characters
        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long, default_value_t = folio::pdf::DEFAULT_CHUNK_OVERLAP)]
        overlap: usize,

        /// Print only this chunk (0-based) as JSON
        #[arg(long, requires = "chunk_size")]
        chunk: Option<usize>,
    },

    /// Render one page to PNG
    Render {
        file: PathBuf,

        #[arg(short, long, default_value = "1")]
        page: usize,

        #[arg(short, long, default_value = "1.0")]
        scale: f64,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Case-insensitive search; one JSON object per hit
    Search {
        file: PathBuf,

        term: String,

        #[arg(long, default_value_t = folio::pdf::DEFAULT_CONTEXT)]
        context: usize,
    },

    /// Drag-select between two points (page units) and print the selection
    Select {
        file: PathBuf,

        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Drag start as X,Y
        #[arg(long, value_parser = parse_point)]
        from: Point,

        /// Drag end as X,Y
        #[arg(long, value_parser = parse_point)]
        to: Point,

        /// Also write the page with the highlight painted on
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn parse_point(value: &str) -> Result<Point, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {value:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate {v:?}: {e}"))
    };
    Ok(Point::new(parse(x)?, parse(y)?))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref());

    WriteLogger::init(
        config.log_level.to_level_filter(),
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Failed to create log file {:?}", cli.log_file))?,
    )?;
    panic_handler::initialize_panic_handler();
    info!("Starting folio");

    let mut loader = PdfiumLoader::new(cli.pdfium_lib.clone());
    let library = Bootstrap::new(config.bootstrap)
        .start(&mut loader, config.clone())
        .context("Failed to start PDFium")?;

    let result = run(&library, &config, cli.command);
    if let Err(e) = &result {
        error!("Command failed: {e:?}");
    }
    library.teardown();
    info!("Shutting down folio");
    result
}

fn open(library: &Library, file: &Path) -> Result<Document> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {file:?}"))?;
    library
        .load_document(&bytes)
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .with_context(|| format!("Failed to open {file:?}"))
}

fn run(library: &Library, config: &EngineConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Info { file } => {
            let document = open(library, &file)?;
            println!("pages: {}", document.page_count());
            for number in 1..=document.page_count() {
                let page = document.get_page(number)?;
                println!("{number}: {} x {}", page.width(), page.height());
            }
        }

        Commands::Text {
            file,
            page,
            chunk_size,
            overlap,
            chunk,
        } => {
            let document = open(library, &file)?;
            let numbers = match page {
                Some(number) => vec![number],
                None => (1..=document.page_count()).collect(),
            };
            let mut text = String::new();
            for number in numbers {
                text.push_str(&document.get_page(number)?.text()?);
                text.push('\n');
            }
            match (chunk_size, chunk) {
                (Some(size), Some(index)) => {
                    let Some(chunk) = chunk_at(&text, size, overlap, index) else {
                        bail!(
                            "Chunk index {index} out of range ({} chunks)",
                            chunk_text(&text, size, overlap).len()
                        );
                    };
                    println!("{}", serde_json::to_string_pretty(&chunk)?);
                }
                (Some(size), None) => {
                    for (i, chunk) in chunk_text(&text, size, overlap).iter().enumerate() {
                        println!("--- chunk {} ---\n{chunk}", i + 1);
                    }
                }
                (None, _) => print!("{text}"),
            }
        }

        Commands::Render {
            file,
            page,
            scale,
            out,
        } => {
            let document = open(library, &file)?;
            let renderer = render_page(&document, config, page, scale)?;
            let image = renderer
                .highlighted(page - 1, None)
                .context("Page has no surface")?;
            image
                .save(&out)
                .with_context(|| format!("Failed to write {out:?}"))?;
            println!("{out:?}: {} x {}", image.width(), image.height());
        }

        Commands::Search {
            file,
            term,
            context,
        } => {
            let document = open(library, &file)?;
            for number in 1..=document.page_count() {
                for hit in document.get_page(number)?.search(&term, context)? {
                    println!("{}", serde_json::to_string(&hit)?);
                }
            }
        }

        Commands::Select {
            file,
            page,
            from,
            to,
            out,
        } => {
            let document = open(library, &file)?;
            let renderer = render_page(&document, config, page, 1.0)?;
            let (css_width, css_height) = renderer.css_size(page - 1);
            let rect = ClientRect::new(0.0, 0.0, css_width, css_height);

            let mut engine = SelectionEngine::new(config.selection);
            engine.mouse_down(&renderer, &PointerEvent::new(page - 1, from, rect))?;
            engine.mouse_move(&renderer, &PointerEvent::new(page - 1, to, rect))?;
            let Some(selection) = engine.mouse_up(&renderer)? else {
                bail!("No text at {},{}", from.x, from.y);
            };
            println!("{}", serde_json::to_string_pretty(&selection)?);

            if let Some(out) = out {
                let image = renderer
                    .highlighted(page - 1, Some(&selection))
                    .context("Page has no surface")?;
                image
                    .save(&out)
                    .with_context(|| format!("Failed to write {out:?}"))?;
            }
        }
    }
    Ok(())
}

fn render_page(
    document: &Document,
    config: &EngineConfig,
    page: usize,
    scale: f64,
) -> Result<PageRenderer> {
    if page == 0 || page > document.page_count() {
        bail!(
            "Page {page} out of range (document has {} pages)",
            document.page_count()
        );
    }
    let mut renderer = PageRenderer::new(document.page_count(), &config.renderer);
    let mut failures = renderer.dispatch(document, Command::SetScale(scale));
    failures.extend(renderer.dispatch(
        document,
        Command::SetVisible {
            page: page - 1,
            visible: true,
        },
    ));
    if let Some((index, e)) = failures.into_iter().next() {
        bail!("Page {}: {}", index + 1, e.user_message());
    }
    Ok(renderer)
}
