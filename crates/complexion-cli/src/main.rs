use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use complexion_core::decode;
use complexion_core::runtime::DEFAULT_CANONICAL_SIZE;
use complexion_core::{
    AlignmentResult, AnalysisPipeline, LandmarkAligner, LandmarkDetector, LandmarkSet,
    MeshDetector, PixelBuffer, QualityConfig, QualityGate, SkinMetrics, TensorRuntime,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "complexion", version, about = "Complexion face photo analysis CLI")]
struct Cli {
    /// TOML settings file with a [quality] table
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing face_landmark.onnx (default: $COMPLEXION_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a photo is good enough for analysis
    Validate {
        image: PathBuf,
        /// Resolution and aspect-ratio checks only
        #[arg(long)]
        quick: bool,
    },
    /// Align a photo onto the geometry of a baseline photo
    Align {
        source: PathBuf,
        target: PathBuf,
        /// Where to write the aligned image
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Align several photos onto one baseline
    BatchAlign {
        baseline: PathBuf,
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Directory for aligned images (aligned_<name>.png)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Gate and score a photo
    Analyze {
        image: PathBuf,
        /// Landmark JSON (array of {x, y, z}); detected with the face-mesh model when omitted
        #[arg(long)]
        landmarks: Option<PathBuf>,
        /// Previous SkinMetrics JSON, for trend tags
        #[arg(long)]
        previous: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_CANONICAL_SIZE)]
        canonical_size: usize,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlignedPhoto<'a> {
    source: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(flatten)]
    result: &'a AlignmentResult,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Validate { image, quick } => {
            let bytes = read(image)?;
            let gate = QualityGate::new(quality_config(cli.config.as_deref())?);
            if *quick {
                let buffer = decode::decode_image(&bytes)?;
                print_json(&serde_json::json!({
                    "width": buffer.width(),
                    "height": buffer.height(),
                    "valid": gate.quick_validate(&buffer),
                }))?;
            } else {
                print_json(&gate.validate_encoded(&bytes))?;
            }
        }
        Commands::Align {
            source,
            target,
            output,
        } => {
            let src = load_image(source)?;
            let tgt = load_image(target)?;
            let mut aligner = LandmarkAligner::new(load_detector(cli.model_dir.as_deref())?);
            let aligned = aligner.align(&src, &tgt)?;
            drop(src);

            if let Some(path) = output {
                save(&aligned.aligned_image, path)?;
            }
            print_json(&AlignedPhoto {
                source,
                output: output.clone(),
                result: &aligned.result,
            })?;
        }
        Commands::BatchAlign {
            baseline,
            images,
            output_dir,
        } => {
            let base = load_image(baseline)?;
            let photos = images
                .iter()
                .map(|p| load_image(p))
                .collect::<Result<Vec<_>>>()?;

            let mut aligner = LandmarkAligner::new(load_detector(cli.model_dir.as_deref())?);
            let aligned = aligner.align_many(&base, &photos)?;
            drop(photos);

            let mut entries = Vec::with_capacity(aligned.len());
            for (source, a) in images.iter().zip(&aligned) {
                let output = match output_dir {
                    Some(dir) => {
                        let path = dir.join(aligned_name(source));
                        save(&a.aligned_image, &path)?;
                        Some(path)
                    }
                    None => None,
                };
                entries.push(AlignedPhoto {
                    source,
                    output,
                    result: &a.result,
                });
            }
            tracing::info!(count = entries.len(), "batch alignment complete");
            print_json(&entries)?;
        }
        Commands::Analyze {
            image,
            landmarks,
            previous,
            canonical_size,
        } => {
            let buffer = load_image(image)?;
            let landmarks = match landmarks {
                Some(path) => read_json::<LandmarkSet>(path)?,
                None => load_detector(cli.model_dir.as_deref())?
                    .detect(&buffer)?
                    .context("no face detected in photo")?,
            };
            let previous = previous
                .as_deref()
                .map(read_json::<SkinMetrics>)
                .transpose()?;

            let mut pipeline = AnalysisPipeline::new(
                quality_config(cli.config.as_deref())?,
                TensorRuntime::new(*canonical_size),
            );
            let outcome = pipeline.analyze_against(buffer, &landmarks, previous.as_ref())?;
            print_json(&outcome)?;
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_image(path: &Path) -> Result<PixelBuffer> {
    let bytes = read(path)?;
    decode::decode_image(&bytes).with_context(|| format!("failed to decode {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = read(path)?;
    serde_json::from_slice(&bytes).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn quality_config(path: Option<&Path>) -> Result<QualityConfig> {
    let Some(path) = path else {
        return Ok(QualityConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    QualityConfig::from_toml(&text)
        .with_context(|| format!("invalid config file {}", path.display()))
}

fn load_detector(model_dir: Option<&Path>) -> Result<MeshDetector> {
    let dir = model_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(complexion_core::default_model_dir);
    let path = dir.join(complexion_core::FACE_MESH_MODEL);
    let Some(path) = path.to_str() else {
        bail!("model path is not valid UTF-8: {}", path.display());
    };
    Ok(MeshDetector::load(path)?)
}

fn save(buffer: &PixelBuffer, path: &Path) -> Result<()> {
    decode::to_rgb_image(buffer)?
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote aligned image");
    Ok(())
}

fn aligned_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string());
    format!("aligned_{stem}.png")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_batch_align_requires_images() {
        assert!(Cli::try_parse_from(["complexion", "batch-align", "base.jpg"]).is_err());
        let cli =
            Cli::try_parse_from(["complexion", "batch-align", "base.jpg", "a.jpg", "b.jpg"])
                .unwrap();
        match cli.command {
            Commands::BatchAlign { images, .. } => assert_eq!(images.len(), 2),
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["complexion", "validate", "x.png", "--config", "c.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("c.toml")));
    }

    #[test]
    fn test_aligned_name() {
        assert_eq!(aligned_name(Path::new("/tmp/visit-2.jpeg")), "aligned_visit-2.png");
    }

    #[test]
    fn test_missing_config_file_defaults() {
        assert_eq!(quality_config(None).unwrap(), QualityConfig::default());
        assert!(quality_config(Some(Path::new("/nonexistent.toml"))).is_err());
    }
}
