/// Playlist referencing the master playlist of every published stream.
pub struct StreamIndexPlaylist {
    pub version: u8,
    pub bandwidth: u64,
    pub uris: Vec<String>,
}

impl StreamIndexPlaylist {
    pub fn new() -> Self {
        Self {
            version: 3,
            bandwidth: 0,
            uris: Vec::new(),
        }
    }

    pub fn add_stream(&mut self, uri: String) {
        self.uris.push(uri);
    }

    pub fn render(&self) -> String {
        let mut out = String::from("#EXTM3U\n");
        out.push_str(&format!("#EXT-X-VERSION:{}\n", self.version));
        out.push_str(&format!("#EXT-X-STREAM-INF:BANDWIDTH={}\n", self.bandwidth));
        for uri in &self.uris {
            out.push_str(uri);
            out.push('\n');
        }
        out
    }
}

impl Default for StreamIndexPlaylist {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins URL parts with single slashes, keeping the scheme of `base` intact.
pub fn join_url(base: &str, parts: &[&str]) -> String {
    let mut joined = base.trim_end_matches('/').to_string();
    for part in parts {
        let part = part.trim_matches('/');
        if !part.is_empty() {
            joined.push('/');
            joined.push_str(part);
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_playlist_content() {
        let mut playlist = StreamIndexPlaylist::new();
        playlist.add_stream("https://cdn.example.com/videos/a/master.m3u8".to_string());
        playlist.add_stream("https://cdn.example.com/videos/b/master.m3u8".to_string());

        let content = playlist.render();
        assert!(content.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(content.contains("#EXT-X-STREAM-INF:BANDWIDTH=0"));
        assert!(content.contains("videos/a/master.m3u8\n"));
        assert!(content.ends_with("videos/b/master.m3u8\n"));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://host/", &["/videos/a/", "master.m3u8"]),
            "https://host/videos/a/master.m3u8"
        );
        assert_eq!(join_url("http://host", &["", "/x"]), "http://host/x");
        assert_eq!(join_url("", &["a", "b"]), "/a/b");
    }
}
