//! HTTP probe pipeline
//!
//! A headless stand-in for a media player: a load fetches the source URL and
//! checks that it is a parseable HLS playlist. A failed request is reported
//! as a fatal network error, an unparseable body as a fatal media error.

use m3u8_rs::Playlist;
use reqwest::Client;
use streambank_core::{LoadToken, MediaPipeline, PipelineErrorKind, PipelineEvents};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of probing one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Master { variants: usize },
    Media { segments: usize, live: bool },
}

/// Classify a fetched body
pub fn inspect(body: &[u8]) -> Result<ProbeOutcome, String> {
    match m3u8_rs::parse_playlist_res(body) {
        Ok(Playlist::MasterPlaylist(master)) => Ok(ProbeOutcome::Master {
            variants: master.variants.len(),
        }),
        Ok(Playlist::MediaPlaylist(media)) => Ok(ProbeOutcome::Media {
            segments: media.segments.len(),
            live: !media.end_list,
        }),
        Err(e) => Err(format!("{:?}", e)),
    }
}

/// Media pipeline that validates sources over HTTP
pub struct HttpProbePipeline {
    client: Client,
    events: Option<PipelineEvents>,
    source: Option<(String, LoadToken)>,
    task: Option<JoinHandle<()>>,
}

impl HttpProbePipeline {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            events: None,
            source: None,
            task: None,
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl MediaPipeline for HttpProbePipeline {
    fn is_supported(&self) -> bool {
        true
    }

    fn attach(&mut self, events: PipelineEvents) {
        self.events = Some(events);
    }

    fn load_source(&mut self, url: &str, token: LoadToken) {
        self.source = Some((url.to_string(), token));
    }

    fn start_load(&mut self) {
        self.abort();
        let (Some(events), Some((url, token))) = (self.events.clone(), self.source.clone()) else {
            return;
        };
        let client = self.client.clone();

        self.task = Some(tokio::spawn(async move {
            debug!(url = %url, token = %token, "Probing source");
            let response = match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    warn!(url = %url, status = response.status().as_u16(), "Source returned error status");
                    events.error(token, PipelineErrorKind::Network, true);
                    return;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Source unreachable");
                    events.error(token, PipelineErrorKind::Network, true);
                    return;
                }
            };

            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %url, error = %e, "Source body interrupted");
                    events.error(token, PipelineErrorKind::Network, true);
                    return;
                }
            };

            match inspect(&body) {
                Ok(outcome) => {
                    debug!(url = %url, ?outcome, "Source playable");
                    events.ready(token);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Source is not a playable playlist");
                    events.error(token, PipelineErrorKind::Media, true);
                }
            }
        }));
    }

    fn stop_load(&mut self) {
        self.abort();
    }

    fn recover_media_error(&mut self) {
        self.start_load();
    }

    fn destroy(&mut self) {
        self.abort();
        self.source = None;
        self.events = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_media_playlist() {
        let body = b"#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:6.0,\nseg0.ts\n#EXTINF:6.0,\nseg1.ts\n";
        assert_eq!(
            inspect(body),
            Ok(ProbeOutcome::Media {
                segments: 2,
                live: true
            })
        );
    }

    #[test]
    fn test_inspect_master_playlist() {
        let body = b"#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n360p.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=1400000,RESOLUTION=1280x720\n720p.m3u8\n";
        assert_eq!(inspect(body), Ok(ProbeOutcome::Master { variants: 2 }));
    }

    #[test]
    fn test_inspect_garbage() {
        assert!(inspect(b"<html>not a playlist</html>").is_err());
    }
}
