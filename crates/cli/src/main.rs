use anyhow::{Context, Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use pixfit_core::{
    config::Config,
    cropper::{ResizeHandle, to_binary_file},
    geometry::Size,
    image_processing::{ImageProcessor, OutputBinary, OutputFormat},
    init,
    source::{InputFile, SourceImage},
    upload::{ImageUploadService, LocalUploader, UploadKind},
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Compress, crop and upload images", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shrink images to fit within a bounding box and re-encode them
    Fit {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        max_width: Option<u32>,

        #[arg(long)]
        max_height: Option<u32>,

        /// Lossy quality in (0, 1]
        #[arg(short, long)]
        quality: Option<f32>,

        /// jpeg, png or webp
        #[arg(short, long)]
        format: Option<OutputFormat>,

        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Produce a square avatar by scaling to cover and center-cropping
    Avatar {
        input: PathBuf,

        /// Side of the output square in pixels
        #[arg(short, long)]
        size: Option<u32>,

        #[arg(short, long)]
        quality: Option<f32>,

        #[arg(short, long)]
        format: Option<OutputFormat>,

        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Replay crop gestures over a letterboxed preview and export the square
    Crop {
        input: PathBuf,

        /// Preview container size, e.g. 800x600
        #[arg(long)]
        container: Size,

        /// Move the selection by DX,DY display pixels (repeatable)
        #[arg(long, value_parser = parse_drag, allow_hyphen_values = true)]
        drag: Vec<(f64, f64)>,

        /// Resize from a corner by DX,DY,HANDLE, e.g. 40,0,bottom-right (repeatable)
        #[arg(long, value_parser = parse_resize, allow_hyphen_values = true)]
        resize: Vec<(f64, f64, ResizeHandle)>,

        /// Output JPEG path (defaults to <stem>_crop.jpg)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Compress an image for its upload kind and store it
    Upload {
        input: PathBuf,

        /// post, ticket or avatar
        #[arg(short, long, default_value = "post")]
        kind: UploadKind,

        /// Id of the uploading user
        #[arg(short, long)]
        user: String,
    },
}

enum Gesture {
    Drag(f64, f64),
    Resize(f64, f64, ResizeHandle),
}

#[tokio::main]
async fn main() -> Result<()> {
    init();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches)?;
    let config = Config::load().context("Failed to load configuration")?;

    match args.command {
        Command::Fit {
            inputs,
            max_width,
            max_height,
            quality,
            format,
            out_dir,
        } => {
            let mut options = config.fit;
            if let Some(w) = max_width {
                options.max_width = w;
            }
            if let Some(h) = max_height {
                options.max_height = h;
            }
            if let Some(q) = quality {
                options.quality = q;
            }
            if let Some(f) = format {
                options.format = f;
            }
            options.validate().context("Invalid fit options")?;

            let spinner = spinner(format!("Compressing {} image(s)...", inputs.len()))?;
            let jobs = inputs.iter().map(|path| async move {
                let file = InputFile::from_path(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                ImageProcessor::resize_to_fit(&file, &options)
                    .await
                    .with_context(|| format!("Failed to compress {}", path.display()))
            });
            let results = join_all(jobs).await;
            spinner.finish_and_clear();

            let mut failures = 0;
            for (path, result) in inputs.iter().zip(results) {
                match result.and_then(|binary| write_output(&out_dir, &binary)) {
                    Ok(written) => println!("{} -> {}", path.display(), written.display()),
                    Err(e) => {
                        failures += 1;
                        eprintln!("{:#}", e);
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} image(s) failed", failures, inputs.len());
            }
        }

        Command::Avatar {
            input,
            size,
            quality,
            format,
            out_dir,
        } => {
            let mut options = config.avatar;
            if let Some(s) = size {
                options.target_size = s;
            }
            if let Some(q) = quality {
                options.quality = q;
            }
            if let Some(f) = format {
                options.format = f;
            }

            let file = InputFile::from_path(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let spinner = spinner(format!("Rendering {}px avatar...", options.target_size))?;
            let result = ImageProcessor::resize_to_square_avatar(&file, &options).await;
            spinner.finish_and_clear();

            let binary = result.context("Failed to render avatar")?;
            let written = write_output(&out_dir, &binary)?;
            println!("{} -> {}", input.display(), written.display());
        }

        Command::Crop {
            input,
            container,
            drag,
            resize,
            out,
        } => {
            let file = InputFile::from_path(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let source = SourceImage::decode(file.bytes)
                .await
                .with_context(|| format!("Failed to decode {}", input.display()))?;

            let mut cropper = pixfit_core::SquareCropper::with_min_size(config.min_crop_size);
            cropper
                .init(source.natural_size(), container)
                .context("Failed to initialise the cropper")?;

            let sub = matches
                .subcommand_matches("crop")
                .context("crop arguments missing")?;
            for gesture in ordered_gestures(sub, drag, resize) {
                match gesture {
                    Gesture::Drag(dx, dy) => cropper.drag(dx, dy)?,
                    Gesture::Resize(dx, dy, handle) => cropper.resize(dx, dy, handle)?,
                };
            }

            let rect = cropper.crop_rect().context("Cropper has no selection")?;
            println!("{}", serde_json::to_string_pretty(&rect)?);

            let data_url = cropper.commit(&source).context("Failed to extract the crop")?;
            let out = out.unwrap_or_else(|| default_crop_path(&input));
            let name = out
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "crop.jpg".to_string());
            let binary = to_binary_file(data_url.as_str(), name)?;
            std::fs::write(&out, &binary.bytes)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            log::info!("wrote {} ({} bytes)", out.display(), binary.bytes.len());
        }

        Command::Upload { input, kind, user } => {
            let file = InputFile::from_path(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let uploader =
                LocalUploader::from_config(&config).context("Failed to set up local storage")?;
            let service = ImageUploadService::new(config, uploader);

            let spinner = spinner(format!("Uploading to {}...", kind.bucket()))?;
            let result = service.upload(kind, &file, &user).await;
            spinner.finish_and_clear();

            let outcome = result.with_context(|| format!("Failed to upload {}", input.display()))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                bail!("upload rejected");
            }
        }
    }

    Ok(())
}

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn write_output(dir: &Path, binary: &OutputBinary) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(&binary.file_name);
    std::fs::write(&path, &binary.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn default_crop_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    PathBuf::from(format!("{}_crop.jpg", stem))
}

/// Interleaves `--drag` and `--resize` values in command-line order.
fn ordered_gestures(
    matches: &ArgMatches,
    drags: Vec<(f64, f64)>,
    resizes: Vec<(f64, f64, ResizeHandle)>,
) -> Vec<Gesture> {
    let drag_at = matches.indices_of("drag").into_iter().flatten();
    let resize_at = matches.indices_of("resize").into_iter().flatten();

    let mut gestures: Vec<(usize, Gesture)> = drag_at
        .zip(drags)
        .map(|(i, (dx, dy))| (i, Gesture::Drag(dx, dy)))
        .chain(
            resize_at
                .zip(resizes)
                .map(|(i, (dx, dy, h))| (i, Gesture::Resize(dx, dy, h))),
        )
        .collect();
    gestures.sort_by_key(|(i, _)| *i);
    gestures.into_iter().map(|(_, g)| g).collect()
}

fn parse_drag(value: &str) -> std::result::Result<(f64, f64), String> {
    match parse_deltas(value)?.as_slice() {
        [dx, dy] => Ok((*dx, *dy)),
        _ => Err(format!("expected DX,DY, got '{}'", value)),
    }
}

fn parse_resize(value: &str) -> std::result::Result<(f64, f64, ResizeHandle), String> {
    let (deltas, handle) = value
        .rsplit_once(',')
        .ok_or_else(|| format!("expected DX,DY,HANDLE, got '{}'", value))?;
    let handle: ResizeHandle = handle.parse().map_err(|e| format!("{}", e))?;
    let (dx, dy) = parse_drag(deltas)?;
    Ok((dx, dy, handle))
}

fn parse_deltas(value: &str) -> std::result::Result<Vec<f64>, String> {
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", part))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gesture_arguments() {
        assert_eq!(parse_drag("-20,15.5").unwrap(), (-20.0, 15.5));
        assert!(parse_drag("1").is_err());
        assert!(parse_drag("a,b").is_err());

        let (dx, dy, handle) = parse_resize("40,0,bottom-right").unwrap();
        assert_eq!((dx, dy, handle), (40.0, 0.0, ResizeHandle::BottomRight));
        assert!(parse_resize("40,0").is_err());
        assert!(parse_resize("1,2,middle").is_err());
    }

    #[test]
    fn gestures_keep_command_line_order() {
        let matches = Args::command()
            .try_get_matches_from([
                "pixfit",
                "crop",
                "in.png",
                "--container",
                "800x600",
                "--resize",
                "10,0,top-left",
                "--drag",
                "-5,5",
                "--resize",
                "3,3,bottom-right",
            ])
            .unwrap();
        let args = Args::from_arg_matches(&matches).unwrap();
        let Command::Crop { drag, resize, .. } = args.command else {
            panic!("expected crop");
        };

        let sub = matches.subcommand_matches("crop").unwrap();
        let kinds: Vec<&str> = ordered_gestures(sub, drag, resize)
            .iter()
            .map(|g| match g {
                Gesture::Drag(..) => "drag",
                Gesture::Resize(..) => "resize",
            })
            .collect();
        assert_eq!(kinds, ["resize", "drag", "resize"]);
    }
}
