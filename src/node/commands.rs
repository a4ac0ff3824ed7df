//! Command processing against the resource and peer registries
//!
//! Every request yields an ordered list of [`OutboundMessage`]s. Rejections
//! are ordinary responses carrying an error frame; only internal failures
//! (a poisoned lock, an unserializable value) surface as `Err` and close the
//! connection.
use std::sync::Arc;

use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{CommandError, MagpieError, Result};
use crate::protocol::{Command, OutboundMessage, Request, Response};
use crate::registry::resource::{absolute_uri, local_file_uri};
use crate::registry::{Peer, PeerRegistry, Resource, ResourceRegistry, FILE_SCHEME, OWNER_WILDCARD};
use crate::transport::PeerConnector;

enum Failure {
    Rejected(CommandError),
    Internal(MagpieError),
}

impl From<CommandError> for Failure {
    fn from(err: CommandError) -> Self {
        Failure::Rejected(err)
    }
}

impl From<MagpieError> for Failure {
    fn from(err: MagpieError) -> Self {
        Failure::Internal(err)
    }
}

type Outcome = std::result::Result<Vec<OutboundMessage>, Failure>;

pub struct CommandProcessor {
    secret: String,
    resources: ResourceRegistry,
    peers: PeerRegistry,
    connector: Arc<dyn PeerConnector>,
    // held by every handler that checks-then-mutates a registry
    mutation_lock: Mutex<()>,
}

impl CommandProcessor {
    pub fn new(
        secret: impl Into<String>,
        resources: ResourceRegistry,
        peers: PeerRegistry,
        connector: Arc<dyn PeerConnector>,
    ) -> Self {
        Self {
            secret: secret.into(),
            resources,
            peers,
            connector,
            mutation_lock: Mutex::new(()),
        }
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    fn origin(&self) -> String {
        self.peers.this_server().origin()
    }

    /// Decode one request frame and run it
    pub async fn process(&self, request: &str) -> Result<Vec<OutboundMessage>> {
        match self.dispatch(request).await {
            Ok(messages) => Ok(messages),
            Err(Failure::Rejected(err)) => {
                debug!("Rejected request: {}", err);
                Ok(vec![err.into()])
            }
            Err(Failure::Internal(err)) => Err(err),
        }
    }

    async fn dispatch(&self, request: &str) -> Outcome {
        let value: Value =
            serde_json::from_str(request).map_err(|_| CommandError::MalformedRequest)?;
        let command: Command = value
            .get("command")
            .and_then(Value::as_str)
            .ok_or(CommandError::MalformedRequest)?
            .parse()?;
        debug!("Processing {}", command);

        match command {
            Command::Publish => self.publish(&value).await,
            Command::Remove => self.remove(&value).await,
            Command::Share => self.share(&value).await,
            Command::Query => self.query(&value).await,
            Command::Fetch => self.fetch(&value).await,
            Command::Exchange => self.exchange(&value).await,
        }
    }

    async fn publish(&self, request: &Value) -> Outcome {
        let resource = resource_field(request, "resource", CommandError::MissingResource)?;
        if resource.has_wildcard_owner() {
            return Err(CommandError::InvalidResource.into());
        }
        match absolute_uri(&resource.uri) {
            Some(url) if url.scheme() != FILE_SCHEME => {}
            _ => return Err(CommandError::CannotPublish.into()),
        }

        let _guard = self.mutation_lock.lock().await;
        self.store(resource, CommandError::CannotPublish)?;
        Ok(vec![Response::Success.into()])
    }

    async fn remove(&self, request: &Value) -> Outcome {
        let resource = resource_field(request, "resource", CommandError::MissingResource)?;
        if resource.has_wildcard_owner() {
            return Err(CommandError::InvalidResource.into());
        }
        if absolute_uri(&resource.uri).is_none() {
            return Err(CommandError::CannotRemove.into());
        }

        let _guard = self.mutation_lock.lock().await;
        match self.resources.remove_first(|r| r.same_identity(&resource))? {
            Some(removed) => {
                debug!("Removed resource {} from channel '{}'", removed.uri, removed.channel);
                Ok(vec![Response::Success.into()])
            }
            None => Err(CommandError::CannotRemove.into()),
        }
    }

    async fn share(&self, request: &Value) -> Outcome {
        let (Some(_), Some(secret)) = (request.get("resource"), request.get("secret")) else {
            return Err(CommandError::MissingResourceOrSecret.into());
        };
        if secret.as_str() != Some(self.secret.as_str()) {
            return Err(CommandError::IncorrectSecret.into());
        }

        let mut resource = resource_field(request, "resource", CommandError::MissingResource)?;
        if resource.has_wildcard_owner() {
            return Err(CommandError::InvalidResource.into());
        }
        let url = local_file_uri(&resource.uri).ok_or(CommandError::CannotShare)?;
        let path = url.to_file_path().map_err(|_| CommandError::CannotShare)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(CommandError::CannotShare.into()),
        }
        resource.origin = Some(self.origin());

        let _guard = self.mutation_lock.lock().await;
        self.store(resource, CommandError::CannotShare)?;
        Ok(vec![Response::Success.into()])
    }

    /// Insert or replace, refusing a (channel, uri) already held by another owner
    fn store(&self, resource: Resource, conflict: CommandError) -> std::result::Result<(), Failure> {
        if self
            .resources
            .any(|r| r.same_location(&resource) && r.owner != resource.owner)?
        {
            return Err(conflict.into());
        }
        let uri = resource.uri.clone();
        let replaced = self.resources.insert_or_replace(resource)?;
        debug!(
            "{} resource {}",
            if replaced { "Replaced" } else { "Stored" },
            uri
        );
        Ok(())
    }

    async fn query(&self, request: &Value) -> Outcome {
        let relay = match (request.get("resourceTemplate"), request.get("relay")) {
            (Some(_), Some(Value::Bool(relay))) => *relay,
            _ => return Err(CommandError::MissingTemplate.into()),
        };
        let template =
            resource_field(request, "resourceTemplate", CommandError::MissingTemplate)?;
        if template.has_wildcard_owner() {
            return Err(CommandError::InvalidTemplate.into());
        }

        let mut candidates = {
            let _guard = self.mutation_lock.lock().await;
            self.resources.query(&template, &self.origin())?
        };
        if relay {
            candidates.extend(self.relay(&template).await);
        }

        let mut messages = Vec::with_capacity(candidates.len() + 2);
        messages.push(Response::Success.into());
        for candidate in &candidates {
            let frame = candidate.to_json().map_err(MagpieError::from)?;
            messages.push(OutboundMessage::Frame(frame));
        }
        messages.push(Response::ResultSize(candidates.len()).into());
        Ok(messages)
    }

    /// Forward the query once to every other known server.
    ///
    /// Peers are queried concurrently; their results are merged in peer-list
    /// order. Unreachable peers contribute nothing.
    async fn relay(&self, template: &Resource) -> Vec<Resource> {
        let peers = match self.peers.others() {
            Ok(peers) => peers,
            Err(e) => {
                warn!("Cannot list peers for relay: {}", e);
                return Vec::new();
            }
        };
        if peers.is_empty() {
            return Vec::new();
        }

        let forwarded = Request::Query {
            relay: false,
            resource_template: Resource {
                owner: String::new(),
                channel: String::new(),
                origin: None,
                size: None,
                ..template.clone()
            },
        };
        let request = match forwarded.to_json() {
            Ok(request) => request,
            Err(e) => {
                warn!("Cannot encode relayed query: {}", e);
                return Vec::new();
            }
        };

        let handles: Vec<_> = peers
            .into_iter()
            .map(|peer| {
                let connector = Arc::clone(&self.connector);
                let request = request.clone();
                tokio::spawn(async move {
                    let result = connector.send_request(&peer, &request).await;
                    (peer, result)
                })
            })
            .collect();

        let mut found = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((peer, Ok(frames))) => {
                    let before = found.len();
                    found.extend(frames.iter().filter_map(|f| Resource::from_peer_frame(f)));
                    debug!("Relay to {} returned {} resources", peer, found.len() - before);
                }
                Ok((peer, Err(e))) => debug!("Relay to {} failed: {}", peer, e),
                Err(e) => warn!("Relay task failed: {}", e),
            }
        }
        found
    }

    async fn fetch(&self, request: &Value) -> Outcome {
        let template =
            resource_field(request, "resourceTemplate", CommandError::MissingTemplate)?;
        let url = local_file_uri(&template.uri).ok_or(CommandError::InvalidTemplate)?;
        if template.has_wildcard_owner() {
            return Err(CommandError::InvalidTemplate.into());
        }

        let stored = self
            .resources
            .find_first(|r| r.same_location(&template))?
            .ok_or(CommandError::NoMatchingResource)?;
        let path = url
            .to_file_path()
            .map_err(|_| CommandError::ResourceMissing)?;
        let size = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(CommandError::ResourceMissing.into()),
        };

        let mut resource = stored.sanitized(&self.origin());
        resource.owner = OWNER_WILDCARD.to_string();
        resource.size = Some(size);
        let description = resource.to_json().map_err(MagpieError::from)?;

        Ok(vec![
            Response::Success.into(),
            OutboundMessage::Frame(description),
            OutboundMessage::File { path, size },
            Response::ResultSize(1).into(),
        ])
    }

    async fn exchange(&self, request: &Value) -> Outcome {
        let entries = request
            .get("serverList")
            .and_then(Value::as_array)
            .ok_or(CommandError::InvalidServerList)?;

        let _guard = self.mutation_lock.lock().await;
        let mut added = 0;
        for entry in entries {
            match Peer::from_json(entry) {
                Some(peer) => {
                    if self.peers.add(peer)? {
                        added += 1;
                    }
                }
                None => debug!("Skipping malformed server entry {}", entry),
            }
        }
        debug!("Exchange received {} servers, {} new", entries.len(), added);
        Ok(vec![Response::Success.into()])
    }
}

/// Resource object under `key`; absent or structurally invalid yields `missing`
fn resource_field(
    request: &Value,
    key: &str,
    missing: CommandError,
) -> std::result::Result<Resource, CommandError> {
    request
        .get(key)
        .and_then(Resource::from_request)
        .ok_or(missing)
}
