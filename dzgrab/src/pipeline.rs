use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::{Config, Credential};
use crate::decoder::{self, BlockDecoder, TransferOptions};
use crate::error::{AcquireError, MetadataError};
use crate::helpers::{ensure_directory, output_path};
use crate::keys::derive_key;
use crate::link::AssetId;
use crate::metadata::fetch_metadata;
use crate::resolver::{self, Delivery, HttpProbe};
use crate::session::authenticate;

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub path: PathBuf,
    pub bytes: u64,
    /// Only the 30 second preview could be fetched.
    pub preview: bool,
}

/// Login, track lookup, url resolution and download, in that order. The
/// first failing stage ends the run; a partial file is left where it is.
pub async fn acquire(
    config: &Config,
    credential: &Credential,
    track: &AssetId,
    out_dir: &Path,
) -> Result<Acquired, AcquireError> {
    info!("Downloading track id: {}", track);

    let session = authenticate(config, credential).await?;

    let meta = fetch_metadata(&session, track.as_str()).await?;
    info!("Track: {} - {}", meta.artist(), meta.title());
    if !meta.streamable() {
        error!("Track is not available for streaming/download");
        return Err(MetadataError::Restricted.into());
    }

    let prober = HttpProbe::new(session.client().clone(), config.probe_timeout());
    let delivery = resolver::resolve(&session, &prober, &meta).await?;

    let block_decoder = match &delivery {
        Delivery::Full { .. } => Some(BlockDecoder::new(
            &derive_key(track.as_str()),
            config.on_decode_failure,
        )?),
        Delivery::Preview { .. } => None,
    };

    ensure_directory(out_dir)
        .await
        .map_err(|source| AcquireError::OutputDir {
            path: out_dir.to_path_buf(),
            source,
        })?;
    let path = output_path(out_dir, &meta);

    let options = TransferOptions {
        read_timeout: config.request_timeout(),
        show_progress: config.show_progress,
    };
    let bytes = decoder::download(session.client(), delivery.url(), block_decoder, &path, &options).await?;
    info!("Downloaded: {} ({} bytes)", path.display(), bytes);

    Ok(Acquired {
        path,
        bytes,
        preview: delivery.is_preview(),
    })
}

/// [`acquire`] flattened to the pass/fail answer the cli needs.
pub async fn run(config: &Config, credential: &Credential, track: &AssetId, out_dir: &Path) -> bool {
    match acquire(config, credential, track, out_dir).await {
        Ok(acquired) => {
            if acquired.preview {
                warn!("Only a preview was saved to {}", acquired.path.display());
            }
            true
        }
        Err(e) => {
            error!("Download failed: {}", e);
            false
        }
    }
}
