// Process-wide stream registry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::{MediaSource, SourceConfig, SourceError, SourceSubscriber};

/// Seconds an empty source lingers before it is destroyed
const SOURCE_GRACE_PERIOD_SECONDS: u64 = 10;

/// Registry mapping stream URLs to their media sources
///
/// Sources are created on the first publish or play for a name and
/// destroyed a grace period after both sides are gone.
pub struct SourceRegistry {
    config: SourceConfig,
    sources: Mutex<HashMap<String, Arc<Mutex<MediaSource>>>>,
}

impl SourceRegistry {
    /// Creates an empty registry
    pub fn new(config: SourceConfig) -> SourceRegistry {
        SourceRegistry {
            config,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Gets or creates the source for a stream URL
    pub async fn get_or_create(&self, stream_url: &str) -> Arc<Mutex<MediaSource>> {
        let mut sources = self.sources.lock().await;

        match sources.get(stream_url) {
            Some(s) => s.clone(),
            None => {
                let source = Arc::new(Mutex::new(MediaSource::new(
                    stream_url,
                    self.config.clone(),
                )));

                sources.insert(stream_url.to_string(), source.clone());

                source
            }
        }
    }

    /// Looks up an existing source
    pub async fn get(&self, stream_url: &str) -> Option<Arc<Mutex<MediaSource>>> {
        let sources = self.sources.lock().await;
        sources.get(stream_url).cloned()
    }

    /// Takes the publisher slot of a stream
    ///
    /// # Return value
    ///
    /// Returns the source on success, or PublisherConflict when the
    /// stream is already being published
    pub async fn attach_publisher(
        &self,
        stream_url: &str,
        publisher_id: u64,
    ) -> Result<Arc<Mutex<MediaSource>>, SourceError> {
        let source = self.get_or_create(stream_url).await;

        let mut source_v = source.lock().await;
        source_v.attach_publisher(publisher_id)?;
        drop(source_v);

        Ok(source)
    }

    /// Attaches a subscriber to a stream
    pub async fn attach_subscriber(
        &self,
        stream_url: &str,
        subscriber: SourceSubscriber,
    ) -> Arc<Mutex<MediaSource>> {
        let source = self.get_or_create(stream_url).await;

        let mut source_v = source.lock().await;
        source_v.attach_subscriber(subscriber);
        drop(source_v);

        source
    }

    /// Releases the publisher slot and schedules cleanup
    pub async fn detach_publisher(self: &Arc<Self>, stream_url: &str, publisher_id: u64) {
        let source = match self.get(stream_url).await {
            Some(s) => s,
            None => {
                return;
            }
        };

        let mut source_v = source.lock().await;
        source_v.detach_publisher(publisher_id);
        let idle = source_v.is_idle();
        drop(source_v);

        if idle {
            self.schedule_release(stream_url);
        }
    }

    /// Detaches a subscriber and schedules cleanup
    pub async fn detach_subscriber(self: &Arc<Self>, stream_url: &str, subscriber_id: u64) {
        let source = match self.get(stream_url).await {
            Some(s) => s,
            None => {
                return;
            }
        };

        let mut source_v = source.lock().await;
        source_v.detach_subscriber(subscriber_id);
        let idle = source_v.is_idle();
        drop(source_v);

        if idle {
            self.schedule_release(stream_url);
        }
    }

    /// Destroys an idle source after the grace period
    ///
    /// The source survives if a publisher or subscriber shows up in the
    /// meantime.
    fn schedule_release(self: &Arc<Self>, stream_url: &str) {
        let registry = self.clone();
        let stream_url = stream_url.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(SOURCE_GRACE_PERIOD_SECONDS)).await;

            let mut sources = registry.sources.lock().await;

            if let Some(source) = sources.get(&stream_url) {
                let source_v = source.lock().await;

                if source_v.is_idle() {
                    drop(source_v);
                    sources.remove(&stream_url);
                }
            }
        });
    }

    /// Number of registered sources
    pub async fn source_count(&self) -> usize {
        let sources = self.sources.lock().await;
        sources.len()
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::channel;

    #[tokio::test]
    async fn test_publisher_conflict_via_registry() {
        let registry = Arc::new(SourceRegistry::new(SourceConfig::default()));

        registry.attach_publisher("live/demo", 1).await.unwrap();

        assert_eq!(
            registry.attach_publisher("live/demo", 2).await.err(),
            Some(SourceError::PublisherConflict)
        );

        // A different stream name is unaffected
        assert!(registry.attach_publisher("live/other", 2).await.is_ok());
    }

    #[tokio::test]
    async fn test_source_created_on_play_before_publish() {
        let registry = Arc::new(SourceRegistry::new(SourceConfig::default()));

        let (tx, mut rx) = channel(4);
        registry
            .attach_subscriber("live/demo", SourceSubscriber::new(7, tx))
            .await;

        assert_eq!(registry.source_count().await, 1);

        // No publisher yet: the subscriber is not primed
        assert!(rx.try_recv().is_err());

        // The publisher arrives on the same source
        let source = registry.attach_publisher("live/demo", 1).await.unwrap();
        assert_eq!(source.lock().await.subscriber_count(), 1);
    }
}
