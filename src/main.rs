use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};

use anyhow::{Context, bail};
use backdrop::config::{app_name, version};
use backdrop::effects::{BackgroundImage, BlurLevel, EffectKind, EffectUpdate};
use backdrop::segmentation::{ChromaKeyBackend, SegmentationBackend};
use backdrop::utils::{MemoryStreamStore, StreamStore};
use backdrop::{EffectController, EffectResult, Settings, StaticSource, VideoFrame};
use clap::{Arg, ArgAction, Command, value_parser};
use log::info;

const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // kill the process as soon as a worker task panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    let matches = Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .value_name("IMAGE")
                .help("Still image used as the camera frame.")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("blur")
                .short('b')
                .long("blur")
                .value_name("LEVEL")
                .help("Background blur strength (low/medium/high).")
                .default_value("medium"),
        )
        .arg(
            Arg::new("background")
                .long("background")
                .value_name("IMAGE")
                .help("Replace the background with this image instead of blurring it.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .value_name("PX")
                .requires("height")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .value_name("PX")
                .requires("width")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("mirror")
                .long("mirror")
                .help("Flip the output horizontally.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("key-color")
                .long("key-color")
                .value_name("RRGGBB")
                .help("Backdrop color treated as background.")
                .default_value("00b140"),
        )
        .arg(
            Arg::new("tolerance")
                .long("tolerance")
                .value_name("0-255")
                .default_value("80")
                .value_parser(value_parser!(u8)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("JSON")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("frames")
                .short('n')
                .long("frames")
                .value_name("N")
                .help("Composited frames to wait for before writing the output.")
                .default_value("30")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PNG")
                .default_value("backdrop.png")
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let settings = match matches.get_one::<PathBuf>("config") {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let source_path = matches
        .get_one::<PathBuf>("source")
        .context("missing --source")?;
    let frame = image::open(source_path)
        .with_context(|| format!("cannot open source image {}", source_path.display()))?
        .to_rgba8();
    let source = Arc::new(StaticSource::new(VideoFrame::from_rgba_image(frame)));

    let effect = match matches.get_one::<PathBuf>("background") {
        Some(path) => EffectKind::Replace(BackgroundImage::open(path)?),
        None => {
            let level = matches
                .get_one::<String>("blur")
                .map(|s| BlurLevel::parse(s))
                .unwrap_or_default();
            EffectKind::Blur(level)
        }
    };

    let mut update = EffectUpdate::new()
        .source(source)
        .effect(effect)
        .mirror(matches.get_flag("mirror"));
    if let (Some(&w), Some(&h)) = (
        matches.get_one::<u32>("width"),
        matches.get_one::<u32>("height"),
    ) {
        update = update.size(w, h);
    }

    let key = ChromaKeyBackend::parse_key(
        matches
            .get_one::<String>("key-color")
            .map(String::as_str)
            .unwrap_or_default(),
    )?;
    let tolerance = matches.get_one::<u8>("tolerance").copied().unwrap_or(80);
    let factory = move || -> EffectResult<Arc<dyn SegmentationBackend>> {
        Ok(Arc::new(ChromaKeyBackend::new(key, tolerance)))
    };

    let store = Arc::new(MemoryStreamStore::new());
    let controller =
        EffectController::new(Arc::new(factory), settings).with_stream_store(store.clone());

    let output = controller
        .reconfigure(update)
        .await
        .context("cannot start background effect")?;
    let stream_key = &controller.settings().stream_key;
    let mut handle = store.get(stream_key).unwrap_or(output);
    info!(
        "Publishing {} ({}x{}) as '{stream_key}'",
        handle.id(),
        handle.dimensions().0,
        handle.dimensions().1
    );

    let wanted = matches.get_one::<u64>("frames").copied().unwrap_or(30).max(1);
    let mut last = None;
    for _ in 0..wanted {
        match tokio::time::timeout(FRAME_TIMEOUT, handle.next_frame()).await {
            Ok(Some(frame)) => last = Some(frame),
            Ok(None) => break,
            Err(_) => bail!("no frame composited within {FRAME_TIMEOUT:?}"),
        }
    }

    let Some(frame) = last else {
        controller.disable().await;
        bail!("output stream ended before any frame was composited");
    };
    let output_path = matches
        .get_one::<PathBuf>("output")
        .context("missing --output")?;
    frame
        .to_rgba_image()?
        .save(output_path)
        .with_context(|| format!("cannot write {}", output_path.display()))?;
    info!("Wrote frame {} to {}", frame.sequence, output_path.display());

    info!("{}", controller.health().summary());
    controller.disable().await;
    Ok(())
}
