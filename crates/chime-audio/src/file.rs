//! Loaded sound files.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use chime_core::{LoadError, Result};
use tracing::{debug, info};

use crate::asset::SoundAsset;
use crate::channel::SoundChannel;
use crate::resample;
use crate::resolve::ResourceResolver;
use crate::system::SoundSystem;

/// A decoded sound bound to the system that plays it.
///
/// Immutable once loaded and playable any number of times.
#[derive(Clone)]
pub struct SoundFile {
    asset: SoundAsset,
    system: SoundSystem,
}

impl SoundFile {
    pub fn new(asset: SoundAsset, system: &SoundSystem) -> Self {
        Self {
            asset,
            system: system.clone(),
        }
    }

    /// Resolve `path`, decode it, and prepare it for the system's output.
    ///
    /// Decoding runs on the blocking pool. When the backend reports its output
    /// format and `optimize_on_load` is set, the asset is converted once here
    /// rather than on every play.
    pub async fn load(
        path: &str,
        resolver: &dyn ResourceResolver,
        system: &SoundSystem,
    ) -> Result<Self> {
        let data = resolver.resolve(path).await?;
        let asset = decode(data, extension_of(Path::new(path)), system).await?;
        info!("Loaded {path} ({:?})", asset.duration());
        Ok(Self::new(asset, system))
    }

    /// Load a sound straight from the filesystem.
    pub async fn from_path(path: impl AsRef<Path>, system: &SoundSystem) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(path.display().to_string())
            } else {
                LoadError::NotFound(format!("{}: {e}", path.display()))
            }
        })?;

        let asset = decode(Bytes::from(data), extension_of(path), system).await?;
        info!("Loaded {} ({:?})", path.display(), asset.duration());
        Ok(Self::new(asset, system))
    }

    /// Play this sound on a new channel of its system.
    pub fn play(&self) -> SoundChannel {
        self.system.play(self)
    }

    pub const fn asset(&self) -> &SoundAsset {
        &self.asset
    }

    pub fn duration(&self) -> Duration {
        self.asset.duration()
    }

    pub const fn system(&self) -> &SoundSystem {
        &self.system
    }
}

impl AsRef<SoundAsset> for SoundFile {
    fn as_ref(&self) -> &SoundAsset {
        &self.asset
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

async fn decode(
    data: Bytes,
    extension: Option<String>,
    system: &SoundSystem,
) -> std::result::Result<SoundAsset, LoadError> {
    let decoder = system.decoder().clone();
    let target = if system.config().optimize_on_load {
        system.backend().output_format()
    } else {
        None
    };

    system
        .scheduler()
        .runtime()
        .spawn_blocking(move || {
            let asset = decoder.decode(data, extension.as_deref())?;
            match target {
                Some(format) if !resample::matches(&asset, format) => {
                    debug!(
                        "Optimizing asset for {} Hz/{} ch output",
                        format.sample_rate, format.channels
                    );
                    resample::conform(&asset, format).map_err(|e| LoadError::Decode(e.to_string()))
                }
                _ => Ok(asset),
            }
        })
        .await
        .map_err(|e| LoadError::Decode(format!("Decoder task failed: {e}")))?
}
