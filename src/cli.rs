use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

use atty::Stream;
use clap::{Parser, Subcommand};
use kanji_yomi::render::ToggleBody;
use kanji_yomi::router::ViewContent;
use kanji_yomi::{DataLayout, DirectorySource, EngineConfig, RouteState, Source, ViewRouter};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kanji-yomi", about = "Browse kanji reading reference tables", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Data directory holding pron_list/, words.json and wikt_index.json.
    #[arg(long, global = true, default_value = "./data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the reference documents.
    Files,
    /// Render the view for a location hash such as `#foo.md#12`.
    Show {
        /// Location hash; empty for the file list.
        #[arg(default_value = "")]
        location: String,
    },
    /// Show the tooltip for a character span of a document.
    Tooltip {
        /// Document file name, e.g. `foo.md`.
        file: String,
        /// Exact text of the character span.
        text: String,
    },
    /// Serve the data directory over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: std::net::SocketAddr,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let source = DirectorySource::new(DataLayout::new(cli.data.clone()));
    match cli.command {
        Command::Files => runtime.block_on(handle_files(source, cli.json)),
        Command::Show { location } => runtime.block_on(handle_show(source, location, cli.json)),
        Command::Tooltip { file, text } => {
            runtime.block_on(handle_tooltip(source, file, text, cli.json))
        }
        #[cfg(feature = "web")]
        Command::Serve { addr } => {
            let config = kanji_yomi::web::WebConfig {
                addr,
                data_root: cli.data,
            };
            runtime.block_on(kanji_yomi::web::serve(config))?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn handle_files(source: DirectorySource, as_json: bool) -> Result<(), Box<dyn Error>> {
    let files = source.file_list().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else {
        print_file_table(&files);
    }
    Ok(())
}

async fn handle_show(
    source: DirectorySource,
    location: String,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let router = ViewRouter::new(source, EngineConfig::with_default_groups());
    let outcome = router.start(&location).await;
    let state = router.state();
    let state = state.lock();
    if as_json {
        let route = RouteState::parse(&location);
        let report = match &state.content {
            ViewContent::Table { report, .. } => Some(json!({
                "anchors": report.anchors,
                "links": report.links,
                "character_spans": report.character_spans,
                "reading_spans": report.reading_spans,
                "unknown_characters": report.unknown_characters,
                "errors": report.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })),
            _ => None,
        };
        let payload = json!({
            "location": location,
            "filename": route.filename,
            "anchor": route.anchor,
            "controls_visible": state.controls_visible,
            "column_toggles": state.column_toggles.iter().map(|toggle| toggle.button_text()).collect::<Vec<_>>(),
            "report": report,
            "error": outcome.as_ref().err().map(ToString::to_string),
            "html": state.html(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", state.html());
    }
    outcome?;
    Ok(())
}

async fn handle_tooltip(
    source: DirectorySource,
    file: String,
    text: String,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let router = ViewRouter::new(source, EngineConfig::with_default_groups());
    let hash = RouteState {
        filename: Some(file.clone()),
        anchor: None,
    }
    .to_hash();
    router.start(&hash).await?;

    let element = router
        .state()
        .lock()
        .document()
        .and_then(|document| document.first_table())
        .and_then(|table| {
            table
                .characters()
                .find(|(_, span)| *span == text)
                .map(|(element, _)| element)
        })
        .ok_or_else(|| format!("No character span {text:?} in {file}"))?;
    let _ = router.hover(element, Instant::now()).await;

    let (content, toggles, html) = router
        .with_tooltips(|tips| {
            let session = tips.session(element)?;
            Some((
                session.content()?.clone(),
                session.toggles().to_vec(),
                tips.html(element)?,
            ))
        })
        .flatten()
        .ok_or_else(|| format!("No tooltip for {text:?}"))?;

    if as_json {
        let payload = json!({
            "file": file,
            "text": text,
            "characters": content.characters.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "html": html,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    render_markdown_block(&format!("Tooltip for {text}"), &content.markdown);
    for toggle in toggles {
        match toggle.body {
            ToggleBody::Loaded(body) => {
                println!("\nWiktionary ({}): {} bytes of content", toggle.character, body.len())
            }
            ToggleBody::Failed(message) => {
                println!("\nWiktionary ({}): {message}", toggle.character)
            }
        }
    }
    Ok(())
}

fn print_file_table(files: &[String]) {
    if files.is_empty() {
        println!("No reference documents found.");
        return;
    }
    let width = files
        .iter()
        .map(|file| file.chars().count())
        .max()
        .unwrap_or(4)
        .max("FILE".len());
    println!("{:<width$}  {}", "FILE", "LOCATION", width = width);
    println!("{:-<width$}  {}", "", "--------", width = width);
    for file in files {
        let hash = RouteState {
            filename: Some(file.clone()),
            anchor: None,
        }
        .to_hash();
        println!("{:<width$}  {}", file, hash, width = width);
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("{title}:");
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
