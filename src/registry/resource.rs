//! Resource and peer records shared by the registries and the wire protocol
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Reserved owner value: never a real owner, used to redact owners in results
pub const OWNER_WILDCARD: &str = "*";

/// URI scheme of resources backed by a file on the serving host
pub const FILE_SCHEME: &str = "file";

/// A published or shared item held in a server's registry.
///
/// Identity within a channel is the `(uri, owner)` pair. `origin` and `size`
/// are assigned by servers and never taken from clients.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Resource {
    pub name: String,
    pub tags: Vec<String>,
    pub description: String,
    pub uri: String,
    pub channel: String,
    pub owner: String,
    #[serde(rename = "ezserver", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(rename = "resourceSize", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Resource {
    /// Parse a resource or template supplied by a client.
    ///
    /// Returns `None` when the value is not an object or a known key carries
    /// the wrong JSON type.
    pub fn from_request(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let mut resource: Resource = serde_json::from_value(value.clone()).ok()?;
        resource.origin = None;
        resource.size = None;
        Some(resource.normalized())
    }

    /// Parse a resource frame returned by a peer, keeping its origin as sent.
    ///
    /// Frames without a string `uri` key (status and count frames) are not resources.
    pub fn from_peer_frame(frame: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(frame).ok()?;
        if !value.get("uri").is_some_and(Value::is_string) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Strip surrounding whitespace and NUL characters from every string field
    pub fn normalized(mut self) -> Self {
        self.name = clean(&self.name);
        self.description = clean(&self.description);
        self.uri = clean(&self.uri);
        self.channel = clean(&self.channel);
        self.owner = clean(&self.owner);
        self.tags = self.tags.iter().map(|t| clean(t)).collect();
        self
    }

    pub fn has_wildcard_owner(&self) -> bool {
        self.owner == OWNER_WILDCARD
    }

    /// Value copy handed out in results: owner redacted, origin stamped
    pub fn sanitized(&self, origin: &str) -> Self {
        let mut copy = self.clone();
        if !copy.owner.is_empty() {
            copy.owner = OWNER_WILDCARD.to_string();
        }
        copy.origin = Some(origin.to_string());
        copy
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Whether `self` and `other` claim the same (channel, uri)
    pub fn same_location(&self, other: &Resource) -> bool {
        self.channel == other.channel && self.uri == other.uri
    }

    /// Whether `self` and `other` are the same stored entry
    pub fn same_identity(&self, other: &Resource) -> bool {
        self.same_location(other) && self.owner == other.owner
    }
}

fn clean(value: &str) -> String {
    value.replace('\0', "").trim().to_string()
}

/// Parse `uri` as an absolute URI
pub fn absolute_uri(uri: &str) -> Option<Url> {
    Url::parse(uri).ok()
}

/// Host, user info or port present
pub fn has_authority(url: &Url) -> bool {
    url.host_str().is_some_and(|host| !host.is_empty())
        || !url.username().is_empty()
        || url.port().is_some()
}

/// Parse `uri` as an absolute `file` URI naming a path on this host.
///
/// The authority is checked on the raw text as well: the parser folds
/// `file://localhost/...` into an empty host, which still counts as an
/// authority here.
pub fn local_file_uri(uri: &str) -> Option<Url> {
    let url = absolute_uri(uri)?;
    if url.scheme() != FILE_SCHEME || has_authority(&url) {
        return None;
    }
    let (_, rest) = uri.trim_start().split_once(':')?;
    match rest.strip_prefix("//") {
        Some(after) if !after.starts_with('/') => None,
        _ => Some(url),
    }
}

/// Identity of a server in the federation.
///
/// Equality and hashing use `hostname` and `port` only; `address` is the
/// dial address when the hostname is an IP literal.
#[derive(Clone, Debug, Serialize)]
pub struct Peer {
    pub hostname: String,
    pub port: u16,
    #[serde(skip)]
    pub address: Option<IpAddr>,
}

impl Peer {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        let hostname = hostname.into();
        let address = hostname.parse::<IpAddr>().ok();
        Self {
            hostname,
            port,
            address,
        }
    }

    /// Parse one `serverList` entry; `None` for malformed entries
    pub fn from_json(value: &Value) -> Option<Self> {
        let hostname = clean(value.get("hostname")?.as_str()?);
        if hostname.is_empty() {
            return None;
        }
        let port = u16::try_from(value.get("port")?.as_u64()?).ok()?;
        Some(Self::new(hostname, port))
    }

    /// Address handed to the socket layer, resolved at dial time for names
    pub fn dial_target(&self) -> String {
        match self.address {
            Some(ip) => SocketAddr::new(ip, self.port).to_string(),
            None => format!("{}:{}", self.hostname, self.port),
        }
    }

    /// `hostname:port`, the form stamped into results as origin
    pub fn origin(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.hostname == other.hostname && self.port == other.port
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hostname.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_resource_defaults_and_cleanup() {
        let value = json!({
            "uri": " http://example.com/a ",
            "owner": "alice\0",
            "tags": [" Music ", "jazz"],
            "ezserver": "spoofed:1",
            "resourceSize": 10
        });
        let resource = Resource::from_request(&value).unwrap();
        assert_eq!(resource.uri, "http://example.com/a");
        assert_eq!(resource.owner, "alice");
        assert_eq!(resource.tags, vec!["Music", "jazz"]);
        assert_eq!(resource.channel, "");
        assert_eq!(resource.origin, None);
        assert_eq!(resource.size, None);
    }

    #[test]
    fn test_request_resource_wrong_types() {
        assert!(Resource::from_request(&json!({"tags": "a,b"})).is_none());
        assert!(Resource::from_request(&json!({"name": 5})).is_none());
        assert!(Resource::from_request(&json!(["uri"])).is_none());
        assert!(Resource::from_request(&json!("resource")).is_none());
    }

    #[test]
    fn test_peer_frame_requires_uri() {
        assert!(Resource::from_peer_frame(r#"{"response":"success"}"#).is_none());
        assert!(Resource::from_peer_frame(r#"{"resultSize":3}"#).is_none());
        let resource =
            Resource::from_peer_frame(r#"{"uri":"x://y","owner":"*","ezserver":"h:1"}"#).unwrap();
        assert_eq!(resource.origin.as_deref(), Some("h:1"));
    }

    #[test]
    fn test_sanitized_copy() {
        let stored = Resource {
            uri: "x://y".to_string(),
            owner: "alice".to_string(),
            ..Default::default()
        };
        let copy = stored.sanitized("host:3000");
        assert_eq!(copy.owner, OWNER_WILDCARD);
        assert_eq!(copy.origin.as_deref(), Some("host:3000"));
        assert_eq!(stored.owner, "alice");

        let anonymous = Resource::default().sanitized("host:3000");
        assert_eq!(anonymous.owner, "");
    }

    #[test]
    fn test_serialized_keys() {
        let resource = Resource {
            uri: "file:///tmp/a".to_string(),
            origin: Some("h:1".to_string()),
            size: Some(4),
            ..Default::default()
        };
        let value: Value = serde_json::from_str(&resource.to_json().unwrap()).unwrap();
        assert_eq!(value["ezserver"], "h:1");
        assert_eq!(value["resourceSize"], 4);

        let plain = Resource::default().to_json().unwrap();
        assert!(!plain.contains("resourceSize"));
        assert!(!plain.contains("ezserver"));
    }

    #[test]
    fn test_uri_locality() {
        let local = local_file_uri("file:///tmp/data.bin").unwrap();
        assert_eq!(local.path(), "/tmp/data.bin");
        assert!(local_file_uri("FILE:///tmp/data.bin").is_some());

        assert!(local_file_uri("file://otherhost/tmp/data.bin").is_none());
        assert!(local_file_uri("file://localhost/tmp/data.bin").is_none());
        assert!(local_file_uri("file://LOCALHOST/tmp/data.bin").is_none());
        assert!(local_file_uri("file://user@/tmp/data.bin").is_none());
        assert!(local_file_uri("http://example.com/").is_none());
        assert!(local_file_uri("relative/path").is_none());

        assert!(absolute_uri("relative/path").is_none());
        assert!(absolute_uri("").is_none());
    }

    #[test]
    fn test_peer_identity_ignores_address() {
        let mut a = Peer::new("10.0.0.1", 3000);
        let b = Peer::new("10.0.0.1", 3000);
        a.address = None;
        assert_eq!(a, b);
        assert_ne!(Peer::new("10.0.0.1", 3001), b);
        assert_eq!(b.dial_target(), "10.0.0.1:3000");
        assert_eq!(Peer::new("node-a", 80).dial_target(), "node-a:80");
    }

    #[test]
    fn test_peer_from_json() {
        let peer = Peer::from_json(&json!({"hostname": "node-a", "port": 3000})).unwrap();
        assert_eq!(peer.to_string(), "node-a:3000");
        assert!(Peer::from_json(&json!({"hostname": "node-a"})).is_none());
        assert!(Peer::from_json(&json!({"hostname": "node-a", "port": 70000})).is_none());
        assert!(Peer::from_json(&json!({"hostname": "", "port": 1})).is_none());
        assert!(Peer::from_json(&json!({"hostname": 1, "port": 1})).is_none());
    }
}
