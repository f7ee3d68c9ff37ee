//! Venue registry
//!
//! Maps venue identifiers to connection factories and tracks every
//! connection created, keyed by broker and connection id.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use mdstream_metadata::BrokerMapping;
use tracing::info;

use crate::error::RegistryError;
use crate::traits::{ConnectionFactory, ConnectionRequest, FeedConnection};

pub struct ConnectionRegistry {
    mapping: BrokerMapping,
    factories: HashMap<String, Arc<dyn ConnectionFactory>>,
    /// broker -> connection id -> connection
    connections: DashMap<String, HashMap<String, Arc<dyn FeedConnection>>>,
}

impl ConnectionRegistry {
    pub fn new(mapping: BrokerMapping) -> Self {
        Self {
            mapping,
            factories: HashMap::new(),
            connections: DashMap::new(),
        }
    }

    /// Register the factory serving a venue, replacing any previous one
    pub fn register(&mut self, venue: impl Into<String>, factory: Arc<dyn ConnectionFactory>) {
        self.factories.insert(venue.into(), factory);
    }

    pub fn with_factory(mut self, venue: impl Into<String>, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.register(venue, factory);
        self
    }

    pub fn mapping(&self) -> &BrokerMapping {
        &self.mapping
    }

    /// Create a connection for `broker` under `connection_id`
    pub async fn create_connection(
        &self,
        broker: &str,
        connection_id: &str,
        new_updates: bool,
    ) -> Result<Arc<dyn FeedConnection>, RegistryError> {
        let venue = self.mapping.venue_for(broker);
        let factory = self
            .factories
            .get(&venue)
            .ok_or_else(|| RegistryError::UnknownVenue {
                broker: broker.to_string(),
                venue: venue.clone(),
            })?;

        let request = ConnectionRequest {
            broker: broker.to_string(),
            venue: venue.clone(),
            connection_id: connection_id.to_string(),
            new_updates,
        };
        let connection = factory.create(&request).await?;

        self.connections
            .entry(broker.to_string())
            .or_default()
            .insert(connection_id.to_string(), Arc::clone(&connection));

        info!(broker = %broker, venue = %venue, connection = %connection_id, "Created connection");
        Ok(connection)
    }

    pub fn connection(&self, broker: &str, connection_id: &str) -> Option<Arc<dyn FeedConnection>> {
        self.connections
            .get(broker)
            .and_then(|by_id| by_id.get(connection_id).cloned())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|by_id| by_id.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryVenue;

    #[tokio::test]
    async fn test_create_tracks_connection() {
        let venue = Arc::new(InMemoryVenue::new());
        let registry = ConnectionRegistry::new(BrokerMapping::default())
            .with_factory("binance", venue.clone());

        let conn = registry
            .create_connection("BINANCE", "BINANCE-trades-streamer", true)
            .await
            .unwrap();

        assert_eq!(conn.id(), "BINANCE-trades-streamer");
        assert_eq!(registry.connection_count(), 1);
        assert!(registry
            .connection("BINANCE", "BINANCE-trades-streamer")
            .is_some());
        assert!(registry.connection("BINANCE", "other").is_none());
    }

    #[tokio::test]
    async fn test_unknown_venue() {
        let registry = ConnectionRegistry::new(BrokerMapping::default());
        let result = registry
            .create_connection("GATEIO", "GATEIO-trades-streamer", true)
            .await;

        match result {
            Err(RegistryError::UnknownVenue { broker, venue }) => {
                assert_eq!(broker, "GATEIO");
                assert_eq!(venue, "gate");
            }
            _ => panic!("expected UnknownVenue"),
        }
    }
}
