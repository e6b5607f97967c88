use std::sync::Arc;

use async_trait::async_trait;

use super::{
    client::{ApiError, SpotifyClient},
    gateway::{GatewayError, RemoteGateway},
};
use crate::{
    types::{
        AlbumMeta, Page, PlaylistMeta, PlaylistTrackItem, RemoteTrack, SourceKind, SourceSnapshot,
        Track,
    },
    utils,
};

const PLAYLIST_FIELDS: &str = "id,name,tracks.total,external_urls";
const PLAYLIST_ITEM_FIELDS: &str = "items(added_at,track(name,artists(name))),next";

/// Name and size of a source, as shown before anything is downloaded.
#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub name: String,
    pub total_tracks: u32,
}

/// The remote metadata the sync engine needs about sources.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn summary(&self, source_id: &str) -> Result<SourceSummary, GatewayError>;

    async fn snapshot(&self, source_id: &str) -> Result<SourceSnapshot, GatewayError>;

    async fn user_playlists(&self, user_id: &str) -> Result<Vec<PlaylistMeta>, GatewayError>;
}

fn unsupported(source_id: &str) -> GatewayError {
    GatewayError::Remote(ApiError::Status {
        status: 400,
        message: format!("'{}' is not a playlist or album", source_id),
    })
}

fn parse_source(source_id: &str) -> Result<(SourceKind, String), GatewayError> {
    let kind = utils::source_kind(source_id).ok_or_else(|| unsupported(source_id))?;
    let id = utils::source_spotify_id(source_id).ok_or_else(|| unsupported(source_id))?;
    Ok((kind, id.to_string()))
}

fn remote_track(track: Track, added_at: Option<&str>) -> RemoteTrack {
    RemoteTrack {
        artists: track.artists.into_iter().map(|a| a.name).collect(),
        title: track.name,
        added_at: added_at.and_then(utils::parse_remote_date),
    }
}

/// [`Catalog`] backed by the Spotify Web API, every request routed through
/// the rate-limit gateway.
pub struct SpotifyCatalog {
    client: SpotifyClient,
    gateway: Arc<RemoteGateway>,
}

impl SpotifyCatalog {
    pub fn new(client: SpotifyClient, gateway: Arc<RemoteGateway>) -> Self {
        Self { client, gateway }
    }

    async fn playlist_meta(&self, id: &str) -> Result<PlaylistMeta, GatewayError> {
        let path = format!("playlists/{}?fields={}", id, PLAYLIST_FIELDS);
        self.gateway
            .call(|| self.client.get_json::<PlaylistMeta>(&path))
            .await
    }

    async fn album_meta(&self, id: &str) -> Result<AlbumMeta, GatewayError> {
        let path = format!("albums/{}", id);
        self.gateway
            .call(|| self.client.get_json::<AlbumMeta>(&path))
            .await
    }
}

#[async_trait]
impl Catalog for SpotifyCatalog {
    async fn summary(&self, source_id: &str) -> Result<SourceSummary, GatewayError> {
        let (kind, id) = parse_source(source_id)?;
        match kind {
            SourceKind::Playlist => {
                let meta = self.playlist_meta(&id).await?;
                Ok(SourceSummary {
                    name: meta.name,
                    total_tracks: meta.tracks.total,
                })
            }
            SourceKind::Album => {
                let meta = self.album_meta(&id).await?;
                Ok(SourceSummary {
                    name: meta.name,
                    total_tracks: meta.tracks.total,
                })
            }
        }
    }

    async fn snapshot(&self, source_id: &str) -> Result<SourceSnapshot, GatewayError> {
        let (kind, id) = parse_source(source_id)?;
        let client = &self.client;

        match kind {
            SourceKind::Playlist => {
                let meta = self.playlist_meta(&id).await?;
                let first = format!(
                    "playlists/{}/tracks?limit=100&fields={}",
                    id, PLAYLIST_ITEM_FIELDS
                );
                let items = self
                    .gateway
                    .paginate(|cursor: Option<String>| {
                        let path = cursor.unwrap_or_else(|| first.clone());
                        async move { client.get_json::<Page<PlaylistTrackItem>>(&path).await }
                    })
                    .collect_all()
                    .await?;

                let tracks: Vec<RemoteTrack> = items
                    .into_iter()
                    .filter_map(|item| {
                        let added_at = item.added_at;
                        item.track.map(|t| remote_track(t, added_at.as_deref()))
                    })
                    .collect();
                let remote_updated_at = tracks.iter().filter_map(|t| t.added_at).max();

                Ok(SourceSnapshot {
                    name: meta.name,
                    tracks,
                    remote_updated_at,
                })
            }
            SourceKind::Album => {
                let meta = self.album_meta(&id).await?;
                let first = format!("albums/{}/tracks?limit=50", id);
                let items = self
                    .gateway
                    .paginate(|cursor: Option<String>| {
                        let path = cursor.unwrap_or_else(|| first.clone());
                        async move { client.get_json::<Page<Track>>(&path).await }
                    })
                    .collect_all()
                    .await?;

                Ok(SourceSnapshot {
                    name: meta.name,
                    tracks: items.into_iter().map(|t| remote_track(t, None)).collect(),
                    remote_updated_at: meta
                        .release_date
                        .as_deref()
                        .and_then(utils::parse_remote_date),
                })
            }
        }
    }

    async fn user_playlists(&self, user_id: &str) -> Result<Vec<PlaylistMeta>, GatewayError> {
        let client = &self.client;
        let first = format!("users/{}/playlists?limit=50", user_id);
        self.gateway
            .paginate(|cursor: Option<String>| {
                let path = cursor.unwrap_or_else(|| first.clone());
                async move { client.get_json::<Page<PlaylistMeta>>(&path).await }
            })
            .collect_all()
            .await
    }
}
