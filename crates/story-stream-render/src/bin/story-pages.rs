//! Resolve a story from a JSON snapshot and print its pages.
//!
//! Usage:
//!   cargo run -p story-stream-render --features cli --bin story-pages -- \
//!       [OPTIONS] <SNAPSHOT_JSON> <STORY_ID>
//!
//! Prints a JSON array of pages, each an array of blocks.

use std::path::PathBuf;

use story_stream::{ContentResolver, MemoryStorySource, StorySnapshot};
use story_stream_render::{LayoutConfig, LayoutEngine, RenderPage};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Output {
    Pages,
    Metrics,
    Blocks,
}

impl Output {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "pages" => Some(Self::Pages),
            "metrics" => Some(Self::Metrics),
            "blocks" => Some(Self::Blocks),
            _ => None,
        }
    }
}

struct Args {
    snapshot: PathBuf,
    story_id: String,
    width: f32,
    height: f32,
    padding: f32,
    output: Output,
    pretty: bool,
}

fn print_usage() {
    eprintln!("Usage: story-pages [OPTIONS] <SNAPSHOT_JSON> <STORY_ID>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --width <PX>                   Viewport width (default: 360)");
    eprintln!("  --height <PX>                  Viewport height (default: 640)");
    eprintln!("  --padding <PX>                 Side padding (default: 20)");
    eprintln!("  --output <pages|metrics|blocks> What to print (default: pages)");
    eprintln!("  --pretty                       Pretty-print JSON");
}

fn fail(msg: &str) -> ! {
    eprintln!("{}", msg);
    print_usage();
    std::process::exit(2);
}

fn parse_px(flag: &str, value: Option<&String>) -> f32 {
    match value.map(|v| v.parse::<f32>()) {
        Some(Ok(px)) => px,
        _ => fail(&format!("{} expects a number", flag)),
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let defaults = LayoutConfig::default();
    let mut width = defaults.viewport_width;
    let mut height = defaults.viewport_height;
    let mut padding = defaults.side_padding;
    let mut output = Output::Pages;
    let mut pretty = false;
    let mut positional = Vec::with_capacity(2);

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--width" => {
                i += 1;
                width = parse_px("--width", args.get(i));
            }
            "--height" => {
                i += 1;
                height = parse_px("--height", args.get(i));
            }
            "--padding" => {
                i += 1;
                padding = parse_px("--padding", args.get(i));
            }
            "--output" => {
                i += 1;
                output = args
                    .get(i)
                    .and_then(|v| Output::parse(v))
                    .unwrap_or_else(|| fail("--output expects pages, metrics or blocks"));
            }
            "--pretty" => pretty = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with("--") => fail(&format!("Unknown option: {}", other)),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let (Some(snapshot), Some(story_id), None) =
        (positional.next(), positional.next(), positional.next())
    else {
        fail("Expected exactly <SNAPSHOT_JSON> and <STORY_ID>");
    };
    Args {
        snapshot: PathBuf::from(snapshot),
        story_id,
        width,
        height,
        padding,
        output,
        pretty,
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

fn run(args: Args) -> Result<String, Box<dyn std::error::Error>> {
    let snapshot = StorySnapshot::from_json_file(&args.snapshot)?;
    let resolver = ContentResolver::new(MemoryStorySource::new(snapshot));
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let (blocks, summary) = runtime.block_on(resolver.load_story_with_summary(&args.story_id))?;
    eprintln!(
        "resolved {}: {} chapters, {} segments, {} blocks",
        args.story_id, summary.chapters, summary.segments_selected, summary.blocks
    );

    let engine = LayoutEngine::new(LayoutConfig::for_viewport(
        args.width,
        args.height,
        args.padding,
    ));
    let json = match args.output {
        Output::Blocks => to_json(&blocks, args.pretty)?,
        Output::Metrics => to_json(&engine.layout_blocks(&blocks), args.pretty)?,
        Output::Pages => {
            let pages: Vec<_> = engine
                .layout_blocks(&blocks)
                .into_iter()
                .map(RenderPage::into_blocks)
                .collect();
            to_json(&pages, args.pretty)?
        }
    };
    Ok(json)
}

fn main() {
    let args = parse_args();
    match run(args) {
        Ok(json) => println!("{}", json),
        Err(err) => {
            eprintln!("story-pages: {}", err);
            std::process::exit(1);
        }
    }
}
