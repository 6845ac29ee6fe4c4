use folio::{
    anchor::{
        ChapterContext, DecorationConfig, Selection, apply_annotations, assign_block_ids, boundary_at, locate_range,
        range_text, resolve_selection,
    },
    annotations::{AnnotationApi, HttpAnnotationApi, compare_block_ids},
    cli::{Cli, Command},
    config::Config,
    document::{ChapterDocument, DocumentTree, find_by_id},
    logging::{self, LogLevel},
    models::{Annotation, ProgressSummary},
    progress::{PROGRESS_KEY, load_progress},
    settings::Settings,
    state::{DurableState, KeyValueStore, State},
};

use clap::Parser;
use eyre::{Result, WrapErr, eyre};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogLevel::from_flags(cli.verbose, cli.debug));

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path.clone())?,
        None => match Config::new() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "could not load configuration, using defaults");
                Config::with_settings(Settings::default(), PathBuf::from("configuration.json"))
            }
        },
    };
    if let Some(api) = &cli.api {
        config.settings.api_base_url = api.clone();
    }
    let settings = &config.settings;

    match cli.command {
        Command::Blocks { file, prefix } => {
            let prefix = prefix.unwrap_or_else(|| settings.block_id_prefix.clone());
            list_blocks(&file, &prefix)
        }
        Command::Resolve {
            file,
            from,
            to,
            href,
            title,
        } => resolve(&file, &from, &to, href, &title, settings),
        Command::Locate {
            file,
            block,
            start,
            end,
        } => locate(&file, &block, start, end, settings),
        Command::Render {
            file,
            book,
            annotations,
            href,
        } => render(&file, book.as_deref(), annotations.as_deref(), href, settings),
        Command::Annotations { book, chapter } => list_annotations(&book, chapter.as_deref(), settings),
        Command::Progress {
            book,
            chapters,
            clear,
        } => progress(&book, chapters, clear),
    }
}

fn load_chapter(file: &Path, prefix: &str) -> Result<ChapterDocument> {
    let html = std::fs::read_to_string(file).wrap_err_with(|| format!("could not read {}", file.display()))?;
    let mut doc = ChapterDocument::parse(&html);
    assign_block_ids(&mut doc, prefix);
    Ok(doc)
}

fn default_href(file: &Path, href: Option<String>) -> String {
    href.unwrap_or_else(|| {
        file.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

fn annotation_api(settings: &Settings) -> Result<HttpAnnotationApi> {
    Ok(HttpAnnotationApi::new(
        &settings.api_base_url,
        Duration::from_secs(settings.request_timeout_secs),
    )?)
}

fn list_blocks(file: &Path, prefix: &str) -> Result<()> {
    let html = std::fs::read_to_string(file).wrap_err_with(|| format!("could not read {}", file.display()))?;
    let mut doc = ChapterDocument::parse(&html);
    for block in assign_block_ids(&mut doc, prefix) {
        println!("{}\t{}", block.id, block.text.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    Ok(())
}

fn parse_endpoint(value: &str) -> Result<(&str, usize)> {
    let (block, offset) = value
        .rsplit_once(':')
        .ok_or_else(|| eyre!("expected BLOCK:OFFSET, got '{}'", value))?;
    let offset = offset
        .parse()
        .wrap_err_with(|| format!("invalid offset in '{}'", value))?;
    Ok((block, offset))
}

fn resolve(file: &Path, from: &str, to: &str, href: Option<String>, title: &str, settings: &Settings) -> Result<()> {
    let doc = load_chapter(file, &settings.block_id_prefix)?;
    let href = default_href(file, href);

    let mut points = Vec::with_capacity(2);
    for endpoint in [from, to] {
        let (block_id, offset) = parse_endpoint(endpoint)?;
        let block = find_by_id(&doc, doc.root(), block_id).ok_or_else(|| eyre!("no block with id '{}'", block_id))?;
        let point =
            boundary_at(&doc, block, offset).ok_or_else(|| eyre!("offset {} is past the end of '{}'", offset, block_id))?;
        points.push(point);
    }
    let selection = Selection::new(points[0], points[1]);

    let anchor = resolve_selection(
        &doc,
        doc.root(),
        &selection,
        ChapterContext {
            href: &href,
            title,
        },
    )?;
    match anchor {
        Some(anchor) => {
            println!("{}\t{}\t{}\t{}", anchor.block_id, anchor.start, anchor.end, anchor.text);
            Ok(())
        }
        None => Err(eyre!("nothing to anchor: the selection is empty")),
    }
}

fn locate(file: &Path, block: &str, start: usize, end: usize, settings: &Settings) -> Result<()> {
    let doc = load_chapter(file, &settings.block_id_prefix)?;
    let range = locate_range(&doc, doc.root(), block, start, end)?;
    println!("{}", range_text(&doc, &range));
    Ok(())
}

fn render(
    file: &Path,
    book: Option<&str>,
    annotations_file: Option<&Path>,
    href: Option<String>,
    settings: &Settings,
) -> Result<()> {
    let mut doc = load_chapter(file, &settings.block_id_prefix)?;
    let href = default_href(file, href);

    let annotations: Vec<Annotation> = match (annotations_file, book) {
        (Some(path), _) => {
            let raw = std::fs::read_to_string(path).wrap_err_with(|| format!("could not read {}", path.display()))?;
            serde_json::from_str(&raw).wrap_err("annotations file is not a list of annotations")?
        }
        (None, Some(book)) => annotation_api(settings)?.list(book)?,
        (None, None) => Vec::new(),
    };
    let for_chapter: Vec<Annotation> = annotations
        .into_iter()
        .filter(|a| a.chapter_href == href && a.is_valid_range())
        .collect();

    let config = DecorationConfig::with_class_prefix(&settings.decoration_class_prefix);
    let report = apply_annotations(&mut doc, &for_chapter, &config);
    for (id, err) in &report.skipped {
        tracing::warn!(annotation = %id, error = %err, "annotation could not be placed");
    }
    println!("{}", doc.to_html());
    Ok(())
}

fn list_annotations(book: &str, chapter: Option<&str>, settings: &Settings) -> Result<()> {
    let mut annotations = annotation_api(settings)?.list(book)?;
    if let Some(chapter) = chapter {
        annotations.retain(|a| a.chapter_href == chapter);
    }
    annotations.sort_by(|a, b| {
        a.chapter_href
            .cmp(&b.chapter_href)
            .then_with(|| compare_block_ids(&a.anchor_block_id, &b.anchor_block_id))
            .then(a.start.cmp(&b.start))
    });
    for a in annotations {
        println!(
            "{}\t{}\t{}\t{}..{}\t{}\t{}",
            a.id,
            a.chapter_href,
            a.anchor_block_id,
            a.start,
            a.end,
            a.style.as_str(),
            a.text
        );
    }
    Ok(())
}

fn progress(book: &str, chapters: Option<usize>, clear: bool) -> Result<()> {
    if clear {
        // Straight to the database: a memory fallback would report a clear
        // that never reached disk.
        let mut state = State::new()?;
        state.remove(book, PROGRESS_KEY)?;
        println!("Cleared reading position for {}", book);
        return Ok(());
    }
    let mut state = DurableState::open_default();
    match load_progress(&mut state, book) {
        Some(progress) => {
            let summary = ProgressSummary::from_progress(&progress, chapters);
            println!("{}", summary.label());
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        None => println!("No reading position stored for {}", book),
    }
    Ok(())
}
