use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use personar_core::source::{encode_data_url, load_file};
use personar_core::{
    build_registry, load_models, recognize_faces, FaceAnalyzer, FaceMatcher, FaceModels,
    IdentitySources,
};
use personar_hw::{preferred_device, resolve_device, CameraSession};
use personar_live::{
    place_all, profile_identities, spawn_engine, CameraFeed, DetectionLoop, LiveConfig,
    RegistrySession,
};
use personar_profile::{BioClient, Onboarding, ProfilePatch, ProfileStore, SignupBasics};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "personar", about = "PersonAR live identity cards")]
struct Cli {
    /// Profiles file (TOML). Overrides PERSONAR_PROFILES_PATH.
    #[arg(long, global = true)]
    profiles: Option<PathBuf>,

    /// Acceptance distance. Overrides PERSONAR_MATCH_THRESHOLD.
    #[arg(long, global = true)]
    threshold: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognise known people in the camera feed and print card placements
    Live {
        /// V4L2 device (default: selection heuristic)
        #[arg(short, long)]
        device: Option<String>,
    },
    /// List capture devices
    Cameras,
    /// Recognise the faces in one image
    Recognize {
        image: PathBuf,
    },
    /// Build the known-face registry and report what was enrolled
    Registry,
    /// Generate a status line and bio
    Bio {
        /// Name to write about
        #[arg(long)]
        name: String,
        /// Writing style
        #[arg(long)]
        style: Option<String>,
        /// Store the result on this profile
        #[arg(long)]
        apply: Option<String>,
    },
    /// Manage stored profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// List stored profiles
    List,
    /// Create a profile through the signup flow
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        handle: String,
        /// Reference photo (up to 3)
        #[arg(long = "photo", required = true)]
        photos: Vec<PathBuf>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        /// Mark as not available
        #[arg(long)]
        quiet: bool,
        /// Reject photos in which no face is found (loads the models)
        #[arg(long)]
        verify: bool,
    },
    /// Edit the identity fields of a stored profile
    Edit {
        label: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Mark as available
        #[arg(long, conflicts_with = "quiet")]
        available: bool,
        /// Mark as not available
        #[arg(long)]
        quiet: bool,
    },
    /// Remove a profile
    Remove {
        label: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = LiveConfig::from_env();
    if let Some(path) = cli.profiles {
        config.profiles_path = Some(path);
    }
    if let Some(threshold) = cli.threshold {
        config.match_threshold = threshold;
    }

    match cli.command {
        Commands::Live { device } => {
            if device.is_some() {
                config.camera_device = device;
            }
            run_live(config).await?;
        }
        Commands::Cameras => {
            let devices = CameraSession::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            let preferred = preferred_device(&devices).map(|d| d.path.clone());
            for d in &devices {
                let mark = if Some(&d.path) == preferred.as_ref() { "*" } else { " " };
                println!("{mark} {}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Recognize { image } => {
            let store = open_store(&config)?;
            let mut models = load(&config).await?;
            let matcher = local_matcher(&mut models, &store, &config)?;
            let frame = load_file(&image)?;
            let faces = recognize_faces(&mut models, &frame, &matcher)?;
            let cards = place_all(
                &faces,
                frame.dimensions(),
                &config.geometry(),
                config.match_threshold,
                &store.snapshot(),
            );
            for face in &faces {
                println!(
                    "{}",
                    json!({
                        "label": face.label.to_string(),
                        "distance": face.distance,
                        "box": [face.bbox.x, face.bbox.y, face.bbox.width, face.bbox.height],
                        "confidence": face.bbox.confidence,
                    })
                );
            }
            println!("{} face(s), {} card(s)", faces.len(), cards.len());
        }
        Commands::Registry => {
            let store = open_store(&config)?;
            let mut models = load(&config).await?;
            let registry = build_registry(&mut models, &identities(&store, &config));
            for label in store.labels() {
                let count = registry.get(&label).map_or(0, |e| e.descriptors.len());
                println!("{label}: {count} descriptor(s)");
            }
        }
        Commands::Bio { name, style, apply } => {
            let client = BioClient::from_env()?;
            let Some(generated) = client.generate(&name, style.as_deref()).await else {
                bail!("bio generation failed");
            };
            println!("status: {}", generated.status);
            println!("bio:    {}", generated.bio);
            if let Some(label) = apply {
                let store = open_store(&config)?;
                store.update(&label, generated.as_patch())?;
                save_store(&store, &config)?;
            }
        }
        Commands::Profile { command } => profile_command(command, &config).await?,
    }

    Ok(())
}

async fn run_live(config: LiveConfig) -> Result<()> {
    let store = open_store(&config)?;

    let models = load(&config).await?;
    let engine = spawn_engine(models)?;

    let session = RegistrySession::new(engine.clone(), config.known_faces_dir.clone(), config.match_threshold);
    let (matcher, _session_task) = session.spawn(store.subscribe());

    let device = resolve_device(config.camera_device.as_deref(), &CameraSession::list_devices())?;
    let mut camera = CameraFeed::start(&device).await?;

    let mut detection = DetectionLoop::new(&config, engine, matcher, store.subscribe());

    let mut overlays = detection.overlays();
    tokio::spawn(async move {
        while overlays.changed().await.is_ok() {
            let cards = overlays.borrow_and_update().clone();
            let summary: Vec<_> = cards
                .iter()
                .map(|c| {
                    json!({
                        "label": c.label,
                        "x": c.x,
                        "y": c.y,
                        "scale": c.scale,
                        "name": c.profile.full_name,
                        "handle": c.profile.handle,
                        "status": c.profile.status,
                        "presence": c.profile.presence(),
                    })
                })
                .collect();
            println!("{}", serde_json::Value::Array(summary));
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping");
        }
        flag.store(false, Ordering::Relaxed);
    });

    tracing::info!(device = %device, "live view running");
    detection.run(&mut camera, || running.load(Ordering::Relaxed)).await?;
    Ok(())
}

async fn profile_command(command: ProfileCommand, config: &LiveConfig) -> Result<()> {
    match command {
        ProfileCommand::List => {
            let store = open_store(config)?;
            for (label, p) in &store.snapshot().profiles {
                let verified = if p.is_verified { " ✓" } else { "" };
                println!("{label}: {} @{}{verified} [{}]  {}", p.full_name, p.handle, p.presence(), p.location);
            }
        }
        ProfileCommand::Add {
            name,
            email,
            handle,
            photos,
            status,
            bio,
            quiet,
            verify,
        } => {
            let mut flow = Onboarding::new();
            flow.basics = SignupBasics {
                full_name: name,
                email,
                handle,
            };
            flow.next()?;

            let mut models = if verify { Some(load(config).await?) } else { None };
            for (slot, path) in photos.iter().enumerate() {
                if let Some(models) = models.as_mut() {
                    let image = load_file(path)?;
                    if models.analyze_single(&image)?.is_none() {
                        bail!("no face found in {}", path.display());
                    }
                }
                flow.capture(slot, photo_data_url(path)?)?;
            }
            flow.next()?;

            if let Some(status) = status {
                flow.status = status;
            }
            flow.bio = bio.unwrap_or_default();
            flow.is_available = !quiet;

            let (label, profile) = flow.finalize()?;
            let store = open_store(config)?;
            store.add(&label, profile)?;
            save_store(&store, config)?;
            println!("Added profile {label}");
        }
        ProfileCommand::Edit {
            label,
            status,
            bio,
            location,
            available,
            quiet,
        } => {
            let patch = edit_patch(status, bio, location, available, quiet);
            let store = open_store(config)?;
            let profile = store.update(&label, patch)?;
            save_store(&store, config)?;
            println!("Updated {label}: {} [{}]", profile.status, profile.presence());
        }
        ProfileCommand::Remove { label } => {
            let store = open_store(config)?;
            if store.remove(&label).is_none() {
                bail!("no profile named {label}");
            }
            save_store(&store, config)?;
            println!("Removed profile {label}");
        }
    }
    Ok(())
}

fn edit_patch(
    status: Option<String>,
    bio: Option<String>,
    location: Option<String>,
    available: bool,
    quiet: bool,
) -> ProfilePatch {
    let is_available = match (available, quiet) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    ProfilePatch {
        status,
        bio,
        location,
        is_available,
        ..ProfilePatch::default()
    }
}

fn open_store(config: &LiveConfig) -> Result<ProfileStore> {
    Ok(match &config.profiles_path {
        Some(path) => ProfileStore::open(path)?,
        None => ProfileStore::seeded(),
    })
}

fn save_store(store: &ProfileStore, config: &LiveConfig) -> Result<()> {
    let Some(path) = &config.profiles_path else {
        bail!("changes need a profiles file: pass --profiles or set PERSONAR_PROFILES_PATH");
    };
    store.save(path)?;
    Ok(())
}

async fn load(config: &LiveConfig) -> Result<FaceModels> {
    load_models(&config.model_paths())
        .await
        .with_context(|| format!("loading models from {}", config.model_dir.display()))
}

fn identities(store: &ProfileStore, config: &LiveConfig) -> Vec<IdentitySources> {
    profile_identities(&store.snapshot(), &config.known_faces_dir)
}

fn local_matcher(models: &mut FaceModels, store: &ProfileStore, config: &LiveConfig) -> Result<FaceMatcher> {
    let registry = build_registry(models, &identities(store, config));
    FaceMatcher::new(registry, config.match_threshold).context("no known face could be enrolled")
}

fn photo_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let format = image::guess_format(&bytes).with_context(|| format!("{} is not an image", path.display()))?;
    Ok(encode_data_url(format.to_mime_type(), &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ProfileCommand {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Profile { command } => command,
            _ => panic!("not a profile command"),
        }
    }

    #[test]
    fn test_profile_edit_maps_onto_patch() {
        let ProfileCommand::Edit { label, status, bio, location, available, quiet } = parse(&[
            "personar", "profile", "edit", "Owen", "--status", "Heads down", "--quiet",
        ]) else {
            panic!("not an edit");
        };
        assert_eq!(label, "Owen");

        let patch = edit_patch(status, bio, location, available, quiet);
        assert_eq!(patch.status.as_deref(), Some("Heads down"));
        assert_eq!(patch.is_available, Some(false));
        assert!(patch.bio.is_none() && patch.location.is_none());
        assert!(patch.full_name.is_none());
    }

    #[test]
    fn test_profile_edit_availability_flags() {
        assert_eq!(edit_patch(None, None, None, true, false).is_available, Some(true));
        assert_eq!(edit_patch(None, None, None, false, false).is_available, None);
        assert!(Cli::try_parse_from(["personar", "profile", "edit", "Jun", "--available", "--quiet"]).is_err());
    }

    #[test]
    fn test_edit_patch_applies_to_store() {
        let store = ProfileStore::seeded();
        let patch = edit_patch(None, None, Some("Da Nang".into()), false, true);
        let updated = store.update("Khoi", patch).unwrap();
        assert_eq!(updated.location, "Da Nang");
        assert!(!updated.is_available);
    }
}
