use super::stream_service::StreamService;
use crate::domain::hls::{join_url, StreamIndexPlaylist};
use crate::domain::stream::{Application, Channels, MASTER_PLAYLIST, VALID_MASTER_PLAYLIST_EXTENSIONS};
use crate::domain::template;
use crate::ports::storage::StoragePort;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the playlist listing every published master playlist.
pub struct PlaylistService<S> {
    application: Application,
    channels: Arc<Channels>,
    streams: StreamService,
    storage: S,
}

impl<S: StoragePort> PlaylistService<S> {
    pub fn new(
        application: Application,
        channels: Arc<Channels>,
        streams: StreamService,
        storage: S,
    ) -> Self {
        Self {
            application,
            channels,
            streams,
            storage,
        }
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    /// Playlist of the public URL of every master playlist found on disk, or
    /// `None` when the all streams playlist is disabled.
    pub async fn all_streams_playlist(&self) -> Option<String> {
        if !self.application.all_streams_playlist.enabled {
            return None;
        }

        let extensions: Vec<String> = VALID_MASTER_PLAYLIST_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .collect();
        let mut keys: Vec<&String> = self.channels.keys().collect();
        keys.sort();

        let mut playlist = StreamIndexPlaylist::new();
        for key in keys {
            let stream = &self.channels[key];
            let pattern = self.streams.data_pattern(&stream.master_playlist_template());
            let found = match self.storage.search_files(&pattern, &extensions).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(channel = %key, error = %e, "Error searching for master playlists");
                    continue;
                }
            };

            for (_, vars) in found.iter() {
                let channel_path = match template::render(key, vars) {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(channel = %key, error = %e, "Error replacing placeholders");
                        continue;
                    }
                };
                let uri = join_url(
                    &self.application.public_path,
                    &[&channel_path, MASTER_PLAYLIST],
                );
                debug!(uri = %uri, "Adding master playlist");
                playlist.add_stream(uri);
            }
        }
        Some(playlist.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stream::{fixtures, AllStreamsPlaylist, StreamType};
    use crate::ports::storage::{Discovered, MockStoragePort, StorageError};
    use std::collections::HashMap;

    fn application(enabled: bool) -> Application {
        Application {
            public_path: "https://cdn.example.com/".to_string(),
            all_streams_playlist: AllStreamsPlaylist {
                enabled,
                path: "/all.m3u8".to_string(),
            },
        }
    }

    fn channels() -> Arc<Channels> {
        Arc::new(HashMap::from([
            (
                "videos/{name}".to_string(),
                fixtures::stream(StreamType::VideoEncoded, "vod/{name}"),
            ),
            (
                "shows".to_string(),
                fixtures::stream(StreamType::VideoEncoded, "shows"),
            ),
        ]))
    }

    #[tokio::test]
    async fn test_disabled_playlist() {
        let service = PlaylistService::new(
            application(false),
            channels(),
            StreamService::new("/srv"),
            MockStoragePort::new(),
        );
        assert_eq!(service.all_streams_playlist().await, None);
    }

    #[tokio::test]
    async fn test_lists_public_master_playlists() {
        let mut storage = MockStoragePort::new();
        storage
            .expect_search_files()
            .withf(|pattern: &str, exts: &[String]| {
                pattern == "/srv/vod/{name}/master.m3u8" && exts == [".m3u8".to_string()]
            })
            .returning(|_, _| {
                Ok(Discovered {
                    paths: vec![
                        "/srv/vod/a/master.m3u8".to_string(),
                        "/srv/vod/b/master.m3u8".to_string(),
                    ],
                    vars: vec![
                        HashMap::from([("name".to_string(), "a".to_string())]),
                        HashMap::from([("name".to_string(), "b".to_string())]),
                    ],
                })
            });
        storage
            .expect_search_files()
            .withf(|pattern: &str, _: &[String]| pattern == "/srv/shows/master.m3u8")
            .returning(|pattern, _| {
                Err(StorageError::io(
                    pattern,
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ))
            });

        let service = PlaylistService::new(
            application(true),
            channels(),
            StreamService::new("/srv"),
            storage,
        );
        let content = service.all_streams_playlist().await.unwrap();

        assert_eq!(
            content,
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=0\n\
             https://cdn.example.com/videos/a/master.m3u8\n\
             https://cdn.example.com/videos/b/master.m3u8\n"
        );
    }
}
