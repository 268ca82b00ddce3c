use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use fingercount::{
    app::{self, Control, FingerCounter},
    gui,
    hand::detection::PalmDetector,
    perception::NetworkPerception,
    video::{
        files::ImageSequence,
        webcam::{Webcam, WebcamOptions},
        FrameSource,
    },
};

const WINDOW: &str = "fingercount";

#[derive(Parser, Debug)]
#[command(version, about = "Counts raised fingers in a webcam feed")]
struct Options {
    /// Palm detection network (ONNX)
    #[arg(long, env = "FINGERCOUNT_PALM_MODEL")]
    palm_model: PathBuf,

    /// Hand landmark network (ONNX)
    #[arg(long, env = "FINGERCOUNT_LANDMARK_MODEL")]
    landmark_model: PathBuf,

    /// Read frames from an image file or a directory of images instead of the webcam
    #[arg(long)]
    input: Option<PathBuf>,

    /// Name of the webcam to open (default: $FINGERCOUNT_WEBCAM_NAME, or the first one found)
    #[arg(long, conflicts_with = "input")]
    webcam: Option<String>,

    /// Desired webcam frame rate
    #[arg(long, conflicts_with = "input")]
    fps: Option<u32>,

    /// Minimum palm detection confidence
    #[arg(long, default_value_t = PalmDetector::DEFAULT_THRESHOLD)]
    detection_threshold: f32,

    /// Minimum hand presence confidence
    #[arg(long, default_value_t = NetworkPerception::DEFAULT_PRESENCE_THRESHOLD)]
    presence_threshold: f32,

    /// Maximum number of hands counted per frame
    #[arg(long, default_value_t = NetworkPerception::DEFAULT_MAX_HANDS)]
    max_hands: usize,

    /// Do not mirror frames horizontally
    #[arg(long)]
    no_mirror: bool,

    /// Do not open a window, print the total of every frame to stdout instead
    #[arg(long)]
    headless: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Save every annotated frame as a PNG into this directory
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    fingercount::init_logger!();

    let opts = Options::parse();
    if opts.headless {
        run(opts)
    } else {
        gui::run(move || run(opts))
    }
}

fn open_source(opts: &Options) -> anyhow::Result<Box<dyn FrameSource>> {
    if let Some(path) = &opts.input {
        return Ok(Box::new(ImageSequence::open(path)?));
    }

    let mut options = WebcamOptions::default();
    if let Some(name) = &opts.webcam {
        options = options.name(name.clone());
    }
    if let Some(fps) = opts.fps {
        options = options.fps(fps);
    }
    Ok(Box::new(Webcam::open(options)?))
}

fn run(opts: Options) -> anyhow::Result<()> {
    let mut perception = NetworkPerception::load(&opts.palm_model, &opts.landmark_model)?;
    perception.set_detection_threshold(opts.detection_threshold);
    perception.set_presence_threshold(opts.presence_threshold);
    perception.set_max_hands(opts.max_hands);

    let mut counter = FingerCounter::new(perception);
    counter.set_mirror(!opts.no_mirror);

    if let Some(dir) = &opts.output {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
    }

    let mut source = open_source(&opts)?;
    let mut index = 0;
    let frames = app::run(&mut source, &mut counter, opts.frames, |frame| {
        if opts.headless {
            println!("{}", frame.count.total());
        }

        if !opts.headless || opts.output.is_some() {
            let image = frame.annotated();
            if let Some(dir) = &opts.output {
                image.save(dir.join(format!("frame-{index:06}.png")))?;
            }
            if !opts.headless {
                gui::show_image(WINDOW, &image)?;
            }
        }
        index += 1;

        if !opts.headless && gui::quit_requested() {
            return Ok(Control::Quit);
        }
        Ok(Control::Continue)
    })?;

    log::info!("processed {} frames", frames);
    Ok(())
}
