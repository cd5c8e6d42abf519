use crate::domain::pattern::Variables;
use crate::domain::stream::{Stream, DEFAULT_QUALITY, MASTER_PLAYLIST};
use crate::domain::template::{self, TemplateError};
use std::path::PathBuf;

pub const QUALITY_VAR: &str = "quality";
pub const RESOURCE_VAR: &str = "resource";

/// Resolves where stream files live under the data directory.
#[derive(Clone, Debug)]
pub struct StreamService {
    data_dir: String,
}

impl StreamService {
    pub fn new(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &str {
        &self.data_dir
    }

    /// `template` placed under the data directory, cleaned, placeholders kept.
    pub fn data_pattern(&self, template: &str) -> String {
        template::clean(&format!("{}/{}", self.data_dir, template))
    }

    /// Directory holding the files of `stream` for the given variables.
    ///
    /// `quality` defaults to `default`. Unless the stream path places the
    /// quality itself, every resource but the master playlist lives in a
    /// per-quality sub-directory.
    pub fn storage_path(&self, stream: &Stream, vars: &Variables) -> Result<PathBuf, TemplateError> {
        let mut vars = vars.clone();
        vars.entry(QUALITY_VAR.to_string())
            .or_insert_with(|| DEFAULT_QUALITY.to_string());

        // Sanitized like any other value.
        let quality_placeholder = format!("{{{}}}", QUALITY_VAR);
        let mut storage_template = stream.path.clone();
        let is_master = vars.get(RESOURCE_VAR).map(String::as_str) == Some(MASTER_PLAYLIST);
        if !stream.path.contains(&quality_placeholder) && !is_master {
            storage_template.push('/');
            storage_template.push_str(&quality_placeholder);
        }

        let rendered = template::render(&storage_template, &vars)?;
        Ok(PathBuf::from(self.data_pattern(&rendered)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stream::{fixtures, StreamType};

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_storage_path_appends_quality() {
        let service = StreamService::new("/srv/data");
        let stream = fixtures::stream(StreamType::VideoEncoded, "videos/{name}");

        let path = service
            .storage_path(&stream, &vars(&[("name", "movie"), ("quality", "720p")]))
            .unwrap();
        assert_eq!(path, PathBuf::from("/srv/data/videos/movie/720p"));

        let path = service
            .storage_path(&stream, &vars(&[("name", "movie")]))
            .unwrap();
        assert_eq!(path, PathBuf::from("/srv/data/videos/movie/default"));
    }

    #[test]
    fn test_storage_path_master_playlist_has_no_quality() {
        let service = StreamService::new("./data");
        let stream = fixtures::stream(StreamType::VideoEncoded, "videos/{name}");

        let path = service
            .storage_path(
                &stream,
                &vars(&[("name", "movie"), ("quality", "720p"), ("resource", "master.m3u8")]),
            )
            .unwrap();
        assert_eq!(path, PathBuf::from("data/videos/movie"));
    }

    #[test]
    fn test_storage_path_with_quality_placeholder() {
        let service = StreamService::new("/srv");
        let stream = fixtures::stream(StreamType::VideoEncoded, "{quality}/videos/{name}");

        let path = service
            .storage_path(&stream, &vars(&[("name", "movie"), ("quality", "360p")]))
            .unwrap();
        assert_eq!(path, PathBuf::from("/srv/360p/videos/movie"));
    }

    #[test]
    fn test_storage_path_rejects_unsafe_values() {
        let service = StreamService::new("/srv");
        let stream = fixtures::stream(StreamType::Live, "live/{username}");

        let result = service.storage_path(&stream, &vars(&[("username", "../etc")]));
        assert!(result.is_err());
        let result = service.storage_path(&stream, &vars(&[("username", "a"), ("quality", "x/y")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_data_pattern_is_clean() {
        let service = StreamService::new("./data/");
        assert_eq!(
            service.data_pattern("uploads/{user}/{FILENAME}"),
            "data/uploads/{user}/{FILENAME}"
        );
    }
}
