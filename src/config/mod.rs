//! Config module - Node configuration built from value literals.
//!
//! The factories take every environment-dependent input through a
//! [`HostResolver`], so the same resolver always yields the same config.

mod host;

pub use host::*;

use crate::auth::AuthorizationMode;
use crate::identity::ResourceIdentity;
use crate::scope::{RouteConfig, DEFAULT_MAX_REQUEST_BODY_BYTES};
use crate::serializer::{MEDIA_TYPE_JSON, MEDIA_TYPE_YAML};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tracing::warn;

pub const GROUP_NAME: &str = "edgecore.config.kubeedge.io";
pub const API_VERSION: &str = "v1alpha1";
pub const KIND: &str = "EdgeCore";

pub const DATABASE_DRIVER_NAME: &str = "sqlite3";
pub const DATABASE_ALIAS_NAME: &str = "default";
pub const DATABASE_DATA_SOURCE: &str = "/var/lib/kubeedge/edgecore.db";

pub const DEFAULT_KUBELET_CONFIG: &str = "/etc/kubeedge/kubeconfig";
pub const DEFAULT_CA_FILE: &str = "/etc/kubeedge/ca/rootCA.crt";
pub const DEFAULT_CERT_FILE: &str = "/etc/kubeedge/certs/server.crt";
pub const DEFAULT_KEY_FILE: &str = "/etc/kubeedge/certs/server.key";
pub const DEFAULT_MQTT_CA_FILE: &str = "/etc/kubeedge/ca/rootCA.crt";
pub const DEFAULT_MQTT_CERT_FILE: &str = "/etc/kubeedge/certs/server.crt";
pub const DEFAULT_MQTT_KEY_FILE: &str = "/etc/kubeedge/certs/server.key";

pub const DEFAULT_PROJECT_ID: &str = "e632aba927ea4ac2b575ec1603d56f10";
pub const DEFAULT_HEARTBEAT_SECONDS: i32 = 15;
pub const DEFAULT_WEBSOCKET_PORT: u16 = 10000;
pub const DEFAULT_QUIC_PORT: u16 = 10001;
pub const DEFAULT_HTTPS_PORT: u16 = 10002;
pub const DEFAULT_TUNNEL_PORT: u16 = 10004;
pub const DEFAULT_META_SERVER_ADDR: &str = "127.0.0.1:10550";
pub const DEFAULT_MQTT_SERVER_EXTERNAL: &str = "tcp://127.0.0.1:1883";
pub const DEFAULT_MQTT_SERVER_INTERNAL: &str = "tcp://127.0.0.1:1884";
pub const DEFAULT_POD_STATUS_SYNC_INTERVAL: i32 = 60;
pub const DEFAULT_REMOTE_QUERY_TIMEOUT: i32 = 60;

/// Message group and module the meta manager sends remote queries to.
pub const GROUP_NAME_HUB: &str = "hub";
pub const MODULE_NAME_EDGE_HUB: &str = "websocket";

/// MQTT broker modes.
pub const MQTT_MODE_INTERNAL: u8 = 0;
pub const MQTT_MODE_BOTH: u8 = 1;
pub const MQTT_MODE_EXTERNAL: u8 = 2;

/// ConfigError is returned when a config document cannot be read or written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCoreConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DataBase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Modules>,
}

impl EdgeCoreConfig {
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Returns the meta server section, if configured.
    pub fn meta_server(&self) -> Option<&MetaServer> {
        self.modules
            .as_ref()?
            .meta_manager
            .as_ref()?
            .meta_server
            .as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataBase {
    pub driver_name: String,
    pub alias_name: String,
    pub data_source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Modules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edged: Option<Edged>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_hub: Option<EdgeHub>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_bus: Option<EventBus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_manager: Option<MetaManager>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_bus: Option<ServiceBus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_twin: Option<DeviceTwin>,
    #[serde(rename = "dbTest", skip_serializing_if = "Option::is_none")]
    pub db_test: Option<DBTest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_stream: Option<EdgeStream>,
}

/// Edged holds the kubelet settings the node overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Edged {
    pub hostname_override: String,
    #[serde(rename = "nodeIP")]
    pub node_ip: String,
    pub kube_config: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_status_update_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_stats_agg_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_gc_high_threshold_percent: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_gc_low_threshold_percent: Option<i32>,
    pub custom_interface_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeHub {
    pub enable: bool,
    pub heartbeat: i32,
    #[serde(rename = "projectID")]
    pub project_id: String,
    pub tls_ca_file: String,
    pub tls_cert_file: String,
    pub tls_private_key_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quic: Option<EdgeHubEndpoint>,
    #[serde(rename = "websocket", skip_serializing_if = "Option::is_none")]
    pub web_socket: Option<EdgeHubEndpoint>,
    pub http_server: String,
    pub token: String,
    pub rotate_certificates: bool,
}

/// EdgeHubEndpoint is a QUIC or websocket connection to the cloud.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeHubEndpoint {
    pub enable: bool,
    pub handshake_timeout: i32,
    pub read_deadline: i32,
    pub server: String,
    pub write_deadline: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventBus {
    pub enable: bool,
    #[serde(rename = "mqttQOS")]
    pub mqtt_qos: u8,
    pub mqtt_retain: bool,
    pub mqtt_session_queue_size: i32,
    pub mqtt_server_external: String,
    pub mqtt_server_internal: String,
    #[serde(rename = "mqttSubClientID")]
    pub mqtt_sub_client_id: String,
    #[serde(rename = "mqttPubClientID")]
    pub mqtt_pub_client_id: String,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_mode: u8,
    #[serde(rename = "eventBusTLS", skip_serializing_if = "Option::is_none")]
    pub tls: Option<EventBusTLS>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusTLS {
    pub enable: bool,
    #[serde(rename = "tlsMqttCAFile")]
    pub tls_mqtt_ca_file: String,
    #[serde(rename = "tlsMqttCertFile")]
    pub tls_mqtt_cert_file: String,
    #[serde(rename = "tlsMqttPrivateKeyFile")]
    pub tls_mqtt_private_key_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaManager {
    pub enable: bool,
    pub context_send_group: String,
    pub context_send_module: String,
    pub pod_status_sync_interval: i32,
    pub remote_query_timeout: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_server: Option<MetaServer>,
}

fn default_media_types() -> Vec<String> {
    vec![MEDIA_TYPE_JSON.to_string(), MEDIA_TYPE_YAML.to_string()]
}

fn default_max_request_body_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BODY_BYTES
}

/// MetaServer configures the local API endpoint and the defaults every
/// route it serves is assembled with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaServer {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub server: String,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    #[serde(default = "default_media_types")]
    pub media_types: Vec<String>,
    #[serde(default)]
    pub authorization_mode: AuthorizationMode,
}

impl Default for MetaServer {
    fn default() -> Self {
        MetaServer {
            enable: false,
            server: String::new(),
            max_request_body_bytes: DEFAULT_MAX_REQUEST_BODY_BYTES,
            media_types: default_media_types(),
            authorization_mode: AuthorizationMode::default(),
        }
    }
}

impl MetaServer {
    /// Returns the route configuration for `identity` under these defaults.
    pub fn route_config(&self, identity: ResourceIdentity) -> RouteConfig {
        let mut route = RouteConfig::new(identity);
        route.max_request_body_bytes = self.max_request_body_bytes;
        route.media_types = self.media_types.clone();
        route.authorization_mode = self.authorization_mode;
        route
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceBus {
    pub enable: bool,
    pub server: String,
    pub port: u16,
    pub timeout: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceTwin {
    pub enable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DBTest {
    pub enable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeStream {
    pub enable: bool,
    #[serde(rename = "tlsTunnelCAFile")]
    pub tls_tunnel_ca_file: String,
    #[serde(rename = "tlsTunnelCertFile")]
    pub tls_tunnel_cert_file: String,
    #[serde(rename = "tlsTunnelPrivateKeyFile")]
    pub tls_tunnel_private_key_file: String,
    #[serde(rename = "handshakeTimeout")]
    pub handshake_timeout: i32,
    #[serde(rename = "readDeadline")]
    pub read_deadline: i32,
    pub server: String,
    #[serde(rename = "writeDeadline")]
    pub write_deadline: i32,
}

/// Resolved host facts shared by both factories.
struct LocalHost {
    hostname: String,
    ip: IpAddr,
}

fn resolve_local_host(resolver: &dyn HostResolver) -> LocalHost {
    let hostname = resolver.hostname();
    let ip = resolver.local_ip(&hostname).unwrap_or_else(|| {
        warn!(%hostname, "no local IP found, binding edge hub endpoints to loopback");
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    });
    LocalHost { hostname, ip }
}

fn join_host_port(ip: IpAddr, port: u16) -> String {
    SocketAddr::new(ip, port).to_string()
}

fn type_meta() -> (String, String) {
    (format!("{}/{}", GROUP_NAME, API_VERSION), KIND.to_string())
}

fn edged(host: &LocalHost) -> Edged {
    Edged {
        hostname_override: host.hostname.clone(),
        node_ip: host.ip.to_string(),
        kube_config: DEFAULT_KUBELET_CONFIG.to_string(),
        content_type: MEDIA_TYPE_JSON.to_string(),
        ..Edged::default()
    }
}

fn websocket(host: &LocalHost) -> EdgeHubEndpoint {
    EdgeHubEndpoint {
        enable: true,
        handshake_timeout: 30,
        read_deadline: 15,
        server: join_host_port(host.ip, DEFAULT_WEBSOCKET_PORT),
        write_deadline: 15,
    }
}

fn https_server(host: &LocalHost) -> String {
    format!("https://{}", join_host_port(host.ip, DEFAULT_HTTPS_PORT))
}

/// Builds the full node configuration.
pub fn new_default_edge_core_config(resolver: &dyn HostResolver) -> EdgeCoreConfig {
    let host = resolve_local_host(resolver);
    let (api_version, kind) = type_meta();

    EdgeCoreConfig {
        api_version,
        kind,
        database: Some(DataBase {
            driver_name: DATABASE_DRIVER_NAME.to_string(),
            alias_name: DATABASE_ALIAS_NAME.to_string(),
            data_source: DATABASE_DATA_SOURCE.to_string(),
        }),
        modules: Some(Modules {
            edged: Some(Edged {
                authorization_mode: Some("AlwaysAllow".to_string()),
                node_status_update_frequency: Some("10s".to_string()),
                volume_stats_agg_period: Some("1m0s".to_string()),
                image_gc_high_threshold_percent: Some(80),
                image_gc_low_threshold_percent: Some(40),
                ..edged(&host)
            }),
            edge_hub: Some(EdgeHub {
                enable: true,
                heartbeat: DEFAULT_HEARTBEAT_SECONDS,
                project_id: DEFAULT_PROJECT_ID.to_string(),
                tls_ca_file: DEFAULT_CA_FILE.to_string(),
                tls_cert_file: DEFAULT_CERT_FILE.to_string(),
                tls_private_key_file: DEFAULT_KEY_FILE.to_string(),
                quic: Some(EdgeHubEndpoint {
                    enable: false,
                    handshake_timeout: 30,
                    read_deadline: 15,
                    server: join_host_port(host.ip, DEFAULT_QUIC_PORT),
                    write_deadline: 15,
                }),
                web_socket: Some(websocket(&host)),
                http_server: https_server(&host),
                token: String::new(),
                rotate_certificates: true,
            }),
            event_bus: Some(EventBus {
                enable: true,
                mqtt_qos: 0,
                mqtt_retain: false,
                mqtt_session_queue_size: 100,
                mqtt_server_external: DEFAULT_MQTT_SERVER_EXTERNAL.to_string(),
                mqtt_server_internal: DEFAULT_MQTT_SERVER_INTERNAL.to_string(),
                mqtt_mode: MQTT_MODE_EXTERNAL,
                tls: Some(EventBusTLS {
                    enable: false,
                    tls_mqtt_ca_file: DEFAULT_MQTT_CA_FILE.to_string(),
                    tls_mqtt_cert_file: DEFAULT_MQTT_CERT_FILE.to_string(),
                    tls_mqtt_private_key_file: DEFAULT_MQTT_KEY_FILE.to_string(),
                }),
                ..EventBus::default()
            }),
            meta_manager: Some(MetaManager {
                enable: true,
                context_send_group: GROUP_NAME_HUB.to_string(),
                context_send_module: MODULE_NAME_EDGE_HUB.to_string(),
                pod_status_sync_interval: DEFAULT_POD_STATUS_SYNC_INTERVAL,
                remote_query_timeout: DEFAULT_REMOTE_QUERY_TIMEOUT,
                meta_server: Some(MetaServer {
                    enable: true,
                    server: DEFAULT_META_SERVER_ADDR.to_string(),
                    ..MetaServer::default()
                }),
            }),
            service_bus: Some(ServiceBus {
                enable: false,
                server: "127.0.0.1".to_string(),
                port: 9060,
                timeout: 60,
            }),
            device_twin: Some(DeviceTwin { enable: true }),
            db_test: Some(DBTest { enable: false }),
            edge_stream: Some(EdgeStream {
                enable: false,
                tls_tunnel_ca_file: DEFAULT_CA_FILE.to_string(),
                tls_tunnel_cert_file: DEFAULT_CERT_FILE.to_string(),
                tls_tunnel_private_key_file: DEFAULT_KEY_FILE.to_string(),
                handshake_timeout: 30,
                read_deadline: 15,
                server: join_host_port(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_TUNNEL_PORT),
                write_deadline: 15,
            }),
        }),
    }
}

/// Builds the minimal node configuration: the sections an operator
/// usually edits, with everything else left to defaults.
pub fn new_min_edge_core_config(resolver: &dyn HostResolver) -> EdgeCoreConfig {
    let host = resolve_local_host(resolver);
    let (api_version, kind) = type_meta();

    EdgeCoreConfig {
        api_version,
        kind,
        database: Some(DataBase {
            data_source: DATABASE_DATA_SOURCE.to_string(),
            ..DataBase::default()
        }),
        modules: Some(Modules {
            edged: Some(edged(&host)),
            edge_hub: Some(EdgeHub {
                heartbeat: DEFAULT_HEARTBEAT_SECONDS,
                tls_ca_file: DEFAULT_CA_FILE.to_string(),
                tls_cert_file: DEFAULT_CERT_FILE.to_string(),
                tls_private_key_file: DEFAULT_KEY_FILE.to_string(),
                web_socket: Some(websocket(&host)),
                http_server: https_server(&host),
                ..EdgeHub::default()
            }),
            event_bus: Some(EventBus {
                mqtt_server_external: DEFAULT_MQTT_SERVER_EXTERNAL.to_string(),
                mqtt_server_internal: DEFAULT_MQTT_SERVER_INTERNAL.to_string(),
                mqtt_mode: MQTT_MODE_EXTERNAL,
                ..EventBus::default()
            }),
            ..Modules::default()
        }),
    }
}
